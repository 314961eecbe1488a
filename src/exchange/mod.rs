//! Exchange connectivity
//!
//! [`ExchangeApi`] is the seam between the trade executor and a venue. The
//! production implementation is [`client::RestClient`]; tests substitute a
//! scripted mock.
//!
//! Every call resolves to either an [`ApiEnvelope`] (the exchange answered,
//! successfully or not) or a [`TransportError`] (no usable answer).

pub mod auth;
pub mod circuit_breaker;
pub mod client;
pub mod payload;

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

pub use auth::Credentials;
pub use circuit_breaker::{CircuitBreaker, CircuitBreakerConfig, CircuitState};
pub use client::RestClient;
pub use payload::{serialize_payload, CancelAllRequest, CloseOrderRequest, WirePayload};

/// Application-level response: `{code, msg, data}`
#[derive(Debug, Clone, PartialEq)]
pub struct ApiEnvelope {
    /// Numeric or string code as the venue sent it
    pub code: Value,
    pub msg: String,
    pub data: Value,
    /// Whether `code` is a success code for the venue that sent it
    pub success: bool,
}

impl ApiEnvelope {
    /// Successful envelope wrapping `data`
    pub fn ok(data: Value) -> Self {
        Self {
            code: Value::String("0".to_string()),
            msg: "success".to_string(),
            data,
            success: true,
        }
    }

    /// Failed envelope with an exchange error code
    pub fn error(code: impl Into<String>, msg: impl Into<String>) -> Self {
        Self {
            code: Value::String(code.into()),
            msg: msg.into(),
            data: Value::Null,
            success: false,
        }
    }

    /// Interpret a decoded body as an envelope; `None` when it has no `code`.
    ///
    /// Only `0` / `"0"` count as success.
    pub fn from_value(value: Value) -> Option<Self> {
        Self::from_value_with(value, &[])
    }

    /// Like [`ApiEnvelope::from_value`], also accepting the venue's own
    /// success codes (`"00000"` on Bitget)
    pub fn from_value_with(mut value: Value, success_codes: &[String]) -> Option<Self> {
        let object = value.as_object_mut()?;
        let code = object.remove("code").filter(|code| !code.is_null())?;
        let msg = object
            .remove("msg")
            .or_else(|| object.remove("message"))
            .map(|msg| match msg {
                Value::String(s) => s,
                Value::Null => String::new(),
                other => other.to_string(),
            })
            .unwrap_or_default();
        let data = object.remove("data").unwrap_or(Value::Null);
        let success = is_success_code(&code, success_codes);
        Some(Self {
            code,
            msg,
            data,
            success,
        })
    }

    pub fn is_success(&self) -> bool {
        self.success
    }

    /// Code as text, for error reporting
    pub fn code_text(&self) -> String {
        match &self.code {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        }
    }

    /// Records carried in `data`: array items, a wrapped list, or the object itself
    pub fn records(&self) -> Vec<&Value> {
        match &self.data {
            Value::Array(items) => items.iter().collect(),
            Value::Object(object) => match ["list", "entrustedList"]
                .iter()
                .find_map(|key| object.get(*key))
            {
                Some(Value::Array(items)) => items.iter().collect(),
                Some(_) => Vec::new(),
                None => vec![&self.data],
            },
            _ => Vec::new(),
        }
    }
}

fn is_success_code(code: &Value, extra: &[String]) -> bool {
    match code {
        Value::Number(n) => n.as_i64() == Some(0),
        Value::String(s) => {
            let s = s.trim();
            s == "0" || extra.iter().any(|code| code == s)
        }
        _ => false,
    }
}

/// Failure to obtain an envelope from the exchange
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    /// Connection, timeout or body-read failure; the request may have been processed
    #[error("network error: {0}")]
    Network(String),

    /// 5xx without a parsable envelope
    #[error("server error (HTTP {status}): {body}")]
    Server { status: u16, body: String },

    /// 4xx without a parsable envelope
    #[error("request rejected (HTTP {status}): {body}")]
    Rejected { status: u16, body: String },

    /// Success status with an unreadable body
    #[error("undecodable response: {0}")]
    Decode(String),

    /// Refused locally by the circuit breaker; nothing was sent
    #[error("circuit breaker open, request not sent")]
    CircuitOpen,

    #[error("missing API credentials")]
    MissingCredentials,
}

impl TransportError {
    /// Failures that leave the request outcome unknown
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            TransportError::Network(_) | TransportError::Server { .. } | TransportError::Decode(_)
        )
    }
}

/// Operations the trade executor needs from a venue.
///
/// Order writes take the serialized wire body (see [`serialize_payload`]).
#[async_trait]
pub trait ExchangeApi: Send + Sync {
    /// Submit an order.
    async fn place_order(&self, body: Value) -> Result<ApiEnvelope, TransportError>;

    /// Cancel every working order matching the body (usually one symbol).
    async fn cancel_all_orders(&self, body: Value) -> Result<ApiEnvelope, TransportError>;

    /// Authoritative snapshot of all positions.
    async fn fetch_positions(&self) -> Result<ApiEnvelope, TransportError>;

    /// Authoritative snapshot of working orders.
    async fn fetch_open_orders(&self) -> Result<ApiEnvelope, TransportError>;
}
