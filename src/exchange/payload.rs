//! Wire payloads for order requests
//!
//! Monetary values never travel as JSON numbers: [`serialize_payload`] renders
//! every [`Money`] as its exact decimal string. Everything else is emitted
//! unchanged, recursing through lists and maps.

use std::collections::BTreeMap;

use serde_json::{Map, Value};

use crate::oms::types::{OrderSide, OrderType, PositionSide};
use crate::{Money, Symbol};

/// Request body tree whose monetary leaves are typed
#[derive(Debug, Clone, PartialEq)]
pub enum WirePayload {
    Null,
    Bool(bool),
    Int(i64),
    Text(String),
    Money(Money),
    List(Vec<WirePayload>),
    Map(BTreeMap<String, WirePayload>),
}

impl WirePayload {
    /// Build a map payload from key/value pairs
    pub fn object<K, I>(entries: I) -> Self
    where
        K: Into<String>,
        I: IntoIterator<Item = (K, WirePayload)>,
    {
        WirePayload::Map(entries.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }
}

impl From<Money> for WirePayload {
    fn from(value: Money) -> Self {
        WirePayload::Money(value)
    }
}

impl From<bool> for WirePayload {
    fn from(value: bool) -> Self {
        WirePayload::Bool(value)
    }
}

impl From<i64> for WirePayload {
    fn from(value: i64) -> Self {
        WirePayload::Int(value)
    }
}

impl From<&str> for WirePayload {
    fn from(value: &str) -> Self {
        WirePayload::Text(value.to_string())
    }
}

impl From<String> for WirePayload {
    fn from(value: String) -> Self {
        WirePayload::Text(value)
    }
}

impl From<&Symbol> for WirePayload {
    fn from(value: &Symbol) -> Self {
        WirePayload::Text(value.as_str().to_string())
    }
}

impl<T: Into<WirePayload>> From<Option<T>> for WirePayload {
    fn from(value: Option<T>) -> Self {
        value.map_or(WirePayload::Null, Into::into)
    }
}

/// Render a payload as JSON with money as exact decimal strings
pub fn serialize_payload(payload: &WirePayload) -> Value {
    match payload {
        WirePayload::Null => Value::Null,
        WirePayload::Bool(b) => Value::Bool(*b),
        WirePayload::Int(i) => Value::from(*i),
        WirePayload::Text(s) => Value::String(s.clone()),
        WirePayload::Money(m) => Value::String(m.to_string()),
        WirePayload::List(items) => Value::Array(items.iter().map(serialize_payload).collect()),
        WirePayload::Map(entries) => Value::Object(
            entries
                .iter()
                .map(|(key, value)| (key.clone(), serialize_payload(value)))
                .collect::<Map<String, Value>>(),
        ),
    }
}

/// Reduce-only market order closing (part of) a position
#[derive(Debug, Clone, PartialEq)]
pub struct CloseOrderRequest {
    pub symbol: Symbol,
    /// Position being closed; the order side is its opposite
    pub position_side: PositionSide,
    pub amount: Money,
    pub client_order_id: String,
}

impl CloseOrderRequest {
    pub fn side(&self) -> OrderSide {
        self.position_side.closing_side()
    }

    pub fn to_payload(&self) -> WirePayload {
        WirePayload::object([
            ("symbol", (&self.symbol).into()),
            ("side", self.side().as_str().into()),
            ("orderType", OrderType::Market.as_str().into()),
            ("size", self.amount.into()),
            ("reduceOnly", true.into()),
            ("holdSide", self.position_side.as_str().into()),
            ("clientOid", self.client_order_id.clone().into()),
        ])
    }
}

/// Cancel every working order, optionally restricted to one symbol
#[derive(Debug, Clone, PartialEq)]
pub struct CancelAllRequest {
    pub symbol: Option<Symbol>,
}

impl CancelAllRequest {
    pub fn to_payload(&self) -> WirePayload {
        match &self.symbol {
            Some(symbol) => WirePayload::object([("symbol", symbol.into())]),
            None => WirePayload::Map(BTreeMap::new()),
        }
    }
}
