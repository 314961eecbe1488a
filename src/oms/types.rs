//! Core OMS types
//!
//! Defines orders, positions, and related enumerations.
//! Uses Money type for all prices and quantities.

use crate::{Money, Symbol};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// Order ID type - exchange-assigned or client-assigned string
pub type OrderId = String;

static CLIENT_ORDER_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Generate a client order id for locally originated orders (thread-safe, lock-free)
///
/// The id doubles as the exchange-side client order id so the authoritative
/// acknowledgement can be matched back to the optimistic placeholder.
pub fn next_client_order_id() -> OrderId {
    let seq = CLIENT_ORDER_COUNTER.fetch_add(1, Ordering::Relaxed);
    format!("oms{}{:06}", crate::now_millis(), seq % 1_000_000)
}

/// Order direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderSide {
    Buy,
    Sell,
}

impl OrderSide {
    pub fn as_str(self) -> &'static str {
        match self {
            OrderSide::Buy => "buy",
            OrderSide::Sell => "sell",
        }
    }
}

impl fmt::Display for OrderSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Order type - determines execution logic on the exchange
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderType {
    /// Rest on the book at the given price
    Limit,

    /// Execute immediately against the book
    Market,
}

impl OrderType {
    pub fn as_str(self) -> &'static str {
        match self {
            OrderType::Limit => "limit",
            OrderType::Market => "market",
        }
    }
}

/// Canonical order status
///
/// `Filled`, `Cancelled`, `Rejected` and `Expired` are terminal: once an
/// order reaches one of them no further status transition is accepted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus {
    /// Working on the exchange (new or partially filled) or awaiting acknowledgement
    Pending,

    /// Order completely filled
    Filled,

    /// Order cancelled
    Cancelled,

    /// Order rejected by the exchange
    Rejected,

    /// Order expired
    Expired,
}

impl OrderStatus {
    pub fn is_terminal(self) -> bool {
        !matches!(self, OrderStatus::Pending)
    }
}

/// Where an order record stands relative to exchange confirmation
///
/// ```text
///            add_optimistic_order
///  (absent) ─────────────────────▶ Optimistic ──authoritative upsert──▶ Confirmed
///                                      │
///                     network failure  │
///                                      ▼
///                                 Unconfirmed
///
///  Optimistic | Unconfirmed ──older than stale threshold──▶ Stale ──older than gc threshold──▶ (removed)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderSync {
    /// Came from the exchange (acknowledgement or sync)
    Confirmed,

    /// Local placeholder awaiting acknowledgement
    Optimistic,

    /// Submission got no definitive answer; held for reconciliation
    Unconfirmed,

    /// Placeholder outlived the stale threshold; removed once it outlives the gc threshold
    Stale { unconfirmed: bool },
}

/// Order record as cached by the OMS
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub id: OrderId,
    pub client_order_id: Option<String>,
    pub symbol: Symbol,
    pub side: OrderSide,
    pub order_type: OrderType,
    pub status: OrderStatus,
    pub price: Option<Money>,
    pub amount: Money,
    pub filled_amount: Money,
    pub avg_price: Option<Money>,
    /// Epoch milliseconds
    pub timestamp: i64,
    pub sync: OrderSync,
}

impl Order {
    /// Create a pending, confirmed order stamped with the current time
    pub fn new(
        id: impl Into<OrderId>,
        symbol: Symbol,
        side: OrderSide,
        order_type: OrderType,
        amount: Money,
    ) -> Self {
        Self {
            id: id.into(),
            client_order_id: None,
            symbol,
            side,
            order_type,
            status: OrderStatus::Pending,
            price: None,
            amount,
            filled_amount: Money::ZERO,
            avg_price: None,
            timestamp: crate::now_millis(),
            sync: OrderSync::Confirmed,
        }
    }

    pub fn with_status(mut self, status: OrderStatus) -> Self {
        self.status = status;
        self
    }

    pub fn with_price(mut self, price: Money) -> Self {
        self.price = Some(price);
        self
    }

    pub fn with_timestamp(mut self, timestamp: i64) -> Self {
        self.timestamp = timestamp;
        self
    }

    pub fn with_client_order_id(mut self, client_order_id: impl Into<String>) -> Self {
        self.client_order_id = Some(client_order_id.into());
        self
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    pub fn is_optimistic(&self) -> bool {
        !matches!(self.sync, OrderSync::Confirmed)
    }

    pub fn is_unconfirmed(&self) -> bool {
        matches!(
            self.sync,
            OrderSync::Unconfirmed | OrderSync::Stale { unconfirmed: true }
        )
    }

    pub fn is_stale(&self) -> bool {
        matches!(self.sync, OrderSync::Stale { .. })
    }

    pub fn age_ms(&self, now_ms: i64) -> i64 {
        now_ms.saturating_sub(self.timestamp)
    }
}

/// Position direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PositionSide {
    Long,
    Short,
}

impl PositionSide {
    /// Order side that reduces a position of this side
    pub fn closing_side(self) -> OrderSide {
        match self {
            PositionSide::Long => OrderSide::Sell,
            PositionSide::Short => OrderSide::Buy,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            PositionSide::Long => "long",
            PositionSide::Short => "short",
        }
    }
}

impl fmt::Display for PositionSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for PositionSide {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "long" | "buy" => Ok(PositionSide::Long),
            "short" | "sell" => Ok(PositionSide::Short),
            other => Err(format!("unknown position side: {other}")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MarginMode {
    #[default]
    Cross,
    Isolated,
}

/// Positions are keyed by symbol and side (hedge mode holds both sides at once)
pub type PositionKey = (Symbol, PositionSide);

/// Position record as cached by the OMS
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub symbol: Symbol,
    pub side: PositionSide,
    pub amount: Money,
    pub entry_price: Money,
    pub unrealized_pnl: Money,
    pub leverage: Money,
    pub margin_mode: MarginMode,
    pub liquidation_price: Option<Money>,
    /// Epoch milliseconds; stamped by the store when absent
    pub last_updated: Option<i64>,
}

impl Position {
    pub fn new(symbol: Symbol, side: PositionSide, amount: Money) -> Self {
        Self {
            symbol,
            side,
            amount,
            entry_price: Money::ZERO,
            unrealized_pnl: Money::ZERO,
            leverage: Money::ONE,
            margin_mode: MarginMode::Cross,
            liquidation_price: None,
            last_updated: None,
        }
    }

    pub fn key(&self) -> PositionKey {
        (self.symbol.clone(), self.side)
    }

    pub fn is_open(&self) -> bool {
        !self.amount.is_zero()
    }

    /// Milliseconds since the last authoritative update; unknown age counts as stale
    pub fn age_ms(&self, now_ms: i64) -> i64 {
        self.last_updated
            .map_or(i64::MAX, |updated| now_ms.saturating_sub(updated))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_order_id_generation() {
        let id1 = next_client_order_id();
        let id2 = next_client_order_id();
        assert_ne!(id1, id2);
        assert!(id1.starts_with("oms"));
    }

    #[test]
    fn test_terminal_statuses() {
        assert!(!OrderStatus::Pending.is_terminal());
        for status in [
            OrderStatus::Filled,
            OrderStatus::Cancelled,
            OrderStatus::Rejected,
            OrderStatus::Expired,
        ] {
            assert!(status.is_terminal(), "{status:?} should be terminal");
        }
    }

    #[test]
    fn test_sync_flags() {
        let mut order = Order::new(
            "1",
            Symbol::new("BTCUSDT"),
            OrderSide::Buy,
            OrderType::Market,
            Money::ONE,
        );
        assert!(!order.is_optimistic());

        order.sync = OrderSync::Optimistic;
        assert!(order.is_optimistic());
        assert!(!order.is_unconfirmed());
        assert!(!order.is_stale());

        order.sync = OrderSync::Unconfirmed;
        assert!(order.is_optimistic());
        assert!(order.is_unconfirmed());

        order.sync = OrderSync::Stale { unconfirmed: true };
        assert!(order.is_stale());
        assert!(order.is_unconfirmed());
    }

    #[test]
    fn test_closing_side() {
        assert_eq!(PositionSide::Long.closing_side(), OrderSide::Sell);
        assert_eq!(PositionSide::Short.closing_side(), OrderSide::Buy);
        assert_eq!("SHORT".parse::<PositionSide>(), Ok(PositionSide::Short));
        assert!("flat".parse::<PositionSide>().is_err());
    }

    #[test]
    fn test_position_age() {
        let mut position = Position::new(Symbol::new("ETHUSDT"), PositionSide::Long, Money::ONE);
        assert_eq!(position.age_ms(1_000), i64::MAX);
        position.last_updated = Some(400);
        assert_eq!(position.age_ms(1_000), 600);
    }
}
