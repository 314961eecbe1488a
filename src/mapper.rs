//! Normalization of exchange records into OMS orders and positions
//!
//! Exchanges disagree on field names (`qty` / `size` / `amount`, `avgOpenPrice`
//! / `entryPrice`, ...). Each canonical field is read from an ordered alias
//! list; the first non-null alias wins. Numeric fields are accepted either as
//! strings (the precision-safe form produced by [`crate::decoder::SafeDecoder`])
//! or as JSON numbers, and are always parsed into exact [`Money`] values.

use serde_json::Value;
use tracing::warn;

use crate::error::MapperError;
use crate::oms::types::{MarginMode, Order, OrderSide, OrderStatus, OrderSync, OrderType, Position, PositionSide};
use crate::{now_millis, Money, Symbol};

/// Largest integer an IEEE-754 double represents exactly (2^53 - 1)
pub const MAX_SAFE_INTEGER: u64 = 9_007_199_254_740_991;

const SYMBOL: &[&str] = &["symbol", "instId", "contract"];
const POSITION_QTY: &[&str] = &["qty", "size", "amount", "positionAmt", "total"];
const ENTRY_PRICE: &[&str] = &["avgOpenPrice", "entryPrice", "averagePrice", "openPriceAvg"];
const UNREALIZED_PNL: &[&str] = &["unrealizedPNL", "unrealizedPnl", "unRealizedProfit", "upl"];
const LIQUIDATION_PRICE: &[&str] = &["liquidationPrice", "liqPrice", "liqPx"];
const LEVERAGE: &[&str] = &["leverage", "lever"];
const MARGIN_MODE: &[&str] = &["marginMode", "marginType", "mgnMode"];
const POSITION_SIDE: &[&str] = &["side", "positionSide", "holdSide"];
const EVENT: &[&str] = &["event", "action"];
const UPDATED_AT: &[&str] = &["lastUpdated", "updateTime", "uTime", "timestamp", "cTime"];

const ORDER_ID: &[&str] = &["orderId", "ordId", "id"];
const CLIENT_ORDER_ID: &[&str] = &["clientOrderId", "clientOid", "clOrdId"];
const ORDER_TYPE: &[&str] = &["type", "orderType", "ordType"];
const ORDER_STATUS: &[&str] = &["status", "state"];
const ORDER_PRICE: &[&str] = &["price", "px"];
const ORDER_QTY: &[&str] = &["amount", "origQty", "qty", "size", "sz"];
const FILLED_QTY: &[&str] = &["filledAmount", "executedQty", "filledQty", "accFillSz", "baseVolume"];
const AVG_PRICE: &[&str] = &["avgPrice", "avgPx", "priceAvg"];
const ORDER_TIME: &[&str] = &["timestamp", "updateTime", "uTime", "cTime", "time"];

fn field<'a>(raw: &'a Value, aliases: &[&str]) -> Option<&'a Value> {
    aliases
        .iter()
        .filter_map(|alias| raw.get(*alias))
        .find(|value| !value.is_null())
}

fn text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn decimal(raw: &Value, aliases: &[&str], name: &'static str) -> Result<Option<Money>, MapperError> {
    let Some(value) = field(raw, aliases) else {
        return Ok(None);
    };
    let literal = match value {
        Value::String(s) if s.trim().is_empty() => return Ok(None),
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        other => {
            return Err(MapperError::InvalidDecimal {
                field: name,
                value: other.to_string(),
            })
        }
    };
    literal
        .parse::<Money>()
        .map(Some)
        .map_err(|_| MapperError::InvalidDecimal {
            field: name,
            value: literal,
        })
}

fn millis(raw: &Value, aliases: &[&str]) -> Option<i64> {
    match field(raw, aliases)? {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn contains_any(raw: &Value, aliases: &[&str], needles: &[&str]) -> bool {
    aliases
        .iter()
        .filter_map(|alias| raw.get(*alias).and_then(Value::as_str))
        .map(str::to_ascii_lowercase)
        .any(|value| needles.iter().any(|needle| value.contains(needle)))
}

fn is_close_event(raw: &Value) -> bool {
    field(raw, EVENT)
        .and_then(Value::as_str)
        .is_some_and(|event| event.eq_ignore_ascii_case("CLOSE"))
}

// ==================== POSITIONS ====================

/// Map a raw position record.
///
/// Lenient: absent fields take neutral defaults. Use [`ingest_position`] for
/// records about to enter the store.
///
/// - Side is short when any of `side` / `positionSide` / `holdSide` contains
///   "sell" or "short", or when no side is given and the quantity is negative.
/// - A `CLOSE` event forces the amount to zero whatever quantity is supplied.
/// - `avgOpenPrice` takes precedence over `entryPrice`.
pub fn map_to_oms_position(raw: &Value) -> Result<Position, MapperError> {
    let symbol = Symbol::new(field(raw, SYMBOL).and_then(text).unwrap_or_default());
    let quantity = decimal(raw, POSITION_QTY, "amount")?.unwrap_or(Money::ZERO);

    let side = if contains_any(raw, POSITION_SIDE, &["sell", "short"]) {
        PositionSide::Short
    } else if field(raw, POSITION_SIDE).is_none() && quantity.is_negative() {
        PositionSide::Short
    } else {
        PositionSide::Long
    };

    let amount = if is_close_event(raw) {
        Money::ZERO
    } else {
        quantity.abs()
    };

    let margin_mode = if contains_any(raw, MARGIN_MODE, &["isolated"]) {
        MarginMode::Isolated
    } else {
        MarginMode::Cross
    };

    Ok(Position {
        symbol,
        side,
        amount,
        entry_price: decimal(raw, ENTRY_PRICE, "entryPrice")?.unwrap_or(Money::ZERO),
        unrealized_pnl: decimal(raw, UNREALIZED_PNL, "unrealizedPnl")?.unwrap_or(Money::ZERO),
        leverage: decimal(raw, LEVERAGE, "leverage")?.unwrap_or(Money::ONE),
        margin_mode,
        liquidation_price: decimal(raw, LIQUIDATION_PRICE, "liquidationPrice")?,
        last_updated: millis(raw, UPDATED_AT),
    })
}

/// Reject position records that lack required fields
pub fn validate_position(raw: &Value) -> Result<(), MapperError> {
    if !raw.is_object() {
        return Err(MapperError::InvalidValue {
            field: "position",
            value: raw.to_string(),
        });
    }
    if field(raw, SYMBOL).and_then(text).is_none() {
        return Err(MapperError::MissingField("symbol"));
    }
    if !is_close_event(raw) && field(raw, POSITION_QTY).is_none() {
        return Err(MapperError::MissingField("amount"));
    }
    Ok(())
}

/// Validate then map a position record bound for the store
pub fn ingest_position(raw: &Value) -> Result<Position, MapperError> {
    validate_position(raw)?;
    map_to_oms_position(raw)
}

// ==================== ORDERS ====================

/// True for an order id that arrived as a JSON number too large for a double.
///
/// Such an id means the payload bypassed precision-safe decoding somewhere
/// upstream; any other consumer of the same payload may have corrupted it.
pub fn is_unsafe_numeric_id(value: &Value) -> bool {
    let Value::Number(n) = value else {
        return false;
    };
    let safe = n
        .as_u64()
        .map(|v| v <= MAX_SAFE_INTEGER)
        .or_else(|| n.as_i64().map(|v| v.unsigned_abs() <= MAX_SAFE_INTEGER))
        .unwrap_or(false);
    !safe
}

/// Map exchange status vocabulary onto the canonical set; unknown values are pending
pub fn map_status(raw: &str) -> OrderStatus {
    match raw.trim().to_ascii_uppercase().as_str() {
        "FILLED" => OrderStatus::Filled,
        "CANCELED" | "CANCELLED" => OrderStatus::Cancelled,
        "REJECTED" => OrderStatus::Rejected,
        "EXPIRED" => OrderStatus::Expired,
        _ => OrderStatus::Pending,
    }
}

/// Map a raw order record
pub fn map_to_oms_order(raw: &Value) -> Result<Order, MapperError> {
    let id_value = field(raw, ORDER_ID).ok_or(MapperError::MissingField("orderId"))?;
    let id = text(id_value).ok_or(MapperError::MissingField("orderId"))?;
    if is_unsafe_numeric_id(id_value) {
        warn!(
            order_id = %id,
            "Numeric order id exceeds the safe-integer range; payload skipped precision-safe decoding"
        );
    }

    let side = if contains_any(raw, &["side"], &["sell"]) {
        OrderSide::Sell
    } else {
        OrderSide::Buy
    };
    let order_type = if contains_any(raw, ORDER_TYPE, &["market"]) {
        OrderType::Market
    } else {
        OrderType::Limit
    };
    let status = field(raw, ORDER_STATUS)
        .and_then(Value::as_str)
        .map_or(OrderStatus::Pending, map_status);

    let amount = decimal(raw, ORDER_QTY, "amount")?.unwrap_or(Money::ZERO);
    let filled_amount = decimal(raw, FILLED_QTY, "filledAmount")?.unwrap_or(Money::ZERO);
    if amount.is_negative() {
        return Err(MapperError::InvalidValue {
            field: "amount",
            value: amount.to_string(),
        });
    }
    if filled_amount.is_negative() || filled_amount > amount {
        return Err(MapperError::InvalidValue {
            field: "filledAmount",
            value: format!("{filled_amount} (amount {amount})"),
        });
    }

    Ok(Order {
        id,
        client_order_id: field(raw, CLIENT_ORDER_ID).and_then(text),
        symbol: Symbol::new(field(raw, SYMBOL).and_then(text).unwrap_or_default()),
        side,
        order_type,
        status,
        price: decimal(raw, ORDER_PRICE, "price")?,
        amount,
        filled_amount,
        avg_price: decimal(raw, AVG_PRICE, "avgPrice")?,
        timestamp: millis(raw, ORDER_TIME).unwrap_or_else(now_millis),
        sync: OrderSync::Confirmed,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decoder::SafeDecoder;
    use serde_json::json;

    #[test]
    fn test_close_event_forces_zero_amount() {
        let position = map_to_oms_position(&json!({"event": "CLOSE", "qty": "100"})).unwrap();
        assert!(position.amount.is_zero());
        assert_eq!(position.amount, Money::ZERO);
    }

    #[test]
    fn test_avg_open_price_wins() {
        let position =
            map_to_oms_position(&json!({"avgOpenPrice": "200", "entryPrice": "100"})).unwrap();
        assert_eq!(position.entry_price.to_string(), "200");
    }

    #[test]
    fn test_quantity_aliases() {
        for key in ["qty", "size", "amount"] {
            let position = map_to_oms_position(&json!({"symbol": "BTCUSDT", key: "0.75"})).unwrap();
            assert_eq!(position.amount.to_string(), "0.75", "alias {key}");
        }
    }

    #[test]
    fn test_side_inference() {
        let cases = [
            (json!({"side": "SELL"}), PositionSide::Short),
            (json!({"positionSide": "SHORT"}), PositionSide::Short),
            (json!({"holdSide": "short"}), PositionSide::Short),
            (json!({"holdSide": "long"}), PositionSide::Long),
            (json!({"side": "buy"}), PositionSide::Long),
            (json!({}), PositionSide::Long),
            (json!({"positionAmt": "-0.5"}), PositionSide::Short),
        ];
        for (raw, expected) in cases {
            assert_eq!(map_to_oms_position(&raw).unwrap().side, expected, "{raw}");
        }
    }

    #[test]
    fn test_negative_quantity_is_absolute() {
        let position = map_to_oms_position(&json!({"symbol": "BTCUSDT", "positionAmt": "-0.5"})).unwrap();
        assert_eq!(position.amount.to_string(), "0.5");
    }

    #[test]
    fn test_full_position_record() {
        let raw = json!({
            "symbol": "ETHUSDT",
            "holdSide": "long",
            "total": "3.25",
            "openPriceAvg": "3120.55",
            "unrealizedPNL": "-14.2",
            "leverage": "10",
            "marginMode": "isolated",
            "liquidationPrice": "2801.1",
            "uTime": "1700000000123"
        });
        let position = map_to_oms_position(&raw).unwrap();
        assert_eq!(position.symbol, Symbol::new("ETHUSDT"));
        assert_eq!(position.amount.to_string(), "3.25");
        assert_eq!(position.entry_price.to_string(), "3120.55");
        assert_eq!(position.unrealized_pnl.to_string(), "-14.2");
        assert_eq!(position.leverage.to_string(), "10");
        assert_eq!(position.margin_mode, MarginMode::Isolated);
        assert_eq!(position.liquidation_price.unwrap().to_string(), "2801.1");
        assert_eq!(position.last_updated, Some(1_700_000_000_123));
    }

    #[test]
    fn test_liq_price_alias_and_numeric_values() {
        let position = map_to_oms_position(&json!({"size": 2, "liqPrice": 95.5})).unwrap();
        assert_eq!(position.amount.to_string(), "2");
        assert_eq!(position.liquidation_price.unwrap().to_string(), "95.5");
    }

    #[test]
    fn test_invalid_decimal_rejected() {
        let err = map_to_oms_position(&json!({"qty": "lots"})).unwrap_err();
        assert!(matches!(err, MapperError::InvalidDecimal { field: "amount", .. }));
    }

    #[test]
    fn test_validation_requires_quantity() {
        let err = ingest_position(&json!({"symbol": "BTCUSDT", "side": "long"})).unwrap_err();
        assert_eq!(err, MapperError::MissingField("amount"));

        let err = ingest_position(&json!({"qty": "1"})).unwrap_err();
        assert_eq!(err, MapperError::MissingField("symbol"));

        assert!(ingest_position(&json!("not an object")).is_err());

        // A close event needs no quantity
        let closed = ingest_position(&json!({"symbol": "BTCUSDT", "event": "close"})).unwrap();
        assert!(closed.amount.is_zero());
    }

    #[test]
    fn test_order_status_mapping() {
        assert_eq!(map_status("NEW"), OrderStatus::Pending);
        assert_eq!(map_status("PARTIALLY_FILLED"), OrderStatus::Pending);
        assert_eq!(map_status("FILLED"), OrderStatus::Filled);
        assert_eq!(map_status("CANCELED"), OrderStatus::Cancelled);
        assert_eq!(map_status("CANCELLED"), OrderStatus::Cancelled);
        assert_eq!(map_status("REJECTED"), OrderStatus::Rejected);
        assert_eq!(map_status("EXPIRED"), OrderStatus::Expired);
        assert_eq!(map_status("filled"), OrderStatus::Filled);
        assert_eq!(map_status("SOMETHING_NEW"), OrderStatus::Pending);
    }

    #[test]
    fn test_order_id_coerced_to_string() {
        let order = map_to_oms_order(&json!({"orderId": 42, "symbol": "BTCUSDT", "qty": "1"})).unwrap();
        assert_eq!(order.id, "42");
        assert_eq!(order.sync, OrderSync::Confirmed);
    }

    #[test]
    fn test_unsafe_numeric_id_detection() {
        assert!(!is_unsafe_numeric_id(&json!(42)));
        assert!(!is_unsafe_numeric_id(&json!(9_007_199_254_740_991u64)));
        assert!(is_unsafe_numeric_id(&json!(9_007_199_254_740_992u64)));
        assert!(!is_unsafe_numeric_id(&json!("1234567890123456789")));
    }

    #[test]
    fn test_large_numeric_id_kept_exact() {
        // Bypasses SafeDecoder: arbitrary_precision still keeps the literal
        let raw: Value = serde_json::from_str(r#"{"orderId": 1234567890123456789, "qty": "1"}"#).unwrap();
        assert!(is_unsafe_numeric_id(&raw["orderId"]));
        let order = map_to_oms_order(&raw).unwrap();
        assert_eq!(order.id, "1234567890123456789");
    }

    #[test]
    fn test_decoded_order_payload() {
        let raw = SafeDecoder::parse(
            r#"{"orderId": 1234567890123456789, "clientOid": "oms-1", "symbol": "BTCUSDT",
                "side": "sell", "orderType": "market", "status": "PARTIALLY_FILLED",
                "size": "12.345", "baseVolume": "2.5", "priceAvg": "64000.1", "cTime": 1700000000000}"#,
        )
        .unwrap();
        let order = map_to_oms_order(&raw).unwrap();
        assert_eq!(order.id, "1234567890123456789");
        assert_eq!(order.client_order_id.as_deref(), Some("oms-1"));
        assert_eq!(order.side, OrderSide::Sell);
        assert_eq!(order.order_type, OrderType::Market);
        assert_eq!(order.status, OrderStatus::Pending);
        assert_eq!(order.amount.to_string(), "12.345");
        assert_eq!(order.filled_amount.to_string(), "2.5");
        assert_eq!(order.avg_price.unwrap().to_string(), "64000.1");
        assert_eq!(order.timestamp, 1_700_000_000_000);
    }

    #[test]
    fn test_order_requires_id() {
        assert_eq!(
            map_to_oms_order(&json!({"symbol": "BTCUSDT"})).unwrap_err(),
            MapperError::MissingField("orderId")
        );
        assert_eq!(
            map_to_oms_order(&json!({"orderId": ""})).unwrap_err(),
            MapperError::MissingField("orderId")
        );
    }

    #[test]
    fn test_order_amount_invariants() {
        let overfilled = map_to_oms_order(&json!({"orderId": "1", "qty": "1", "executedQty": "2"}));
        assert!(matches!(
            overfilled,
            Err(MapperError::InvalidValue { field: "filledAmount", .. })
        ));

        let negative = map_to_oms_order(&json!({"orderId": "1", "qty": "-1"}));
        assert!(matches!(negative, Err(MapperError::InvalidValue { field: "amount", .. })));
    }
}
