//! Order Management System (OMS)
//!
//! In-memory mirror of exchange orders and positions:
//! - Bounded order cache with finalized-first FIFO eviction
//! - Optimistic placeholders with a two-stage stale/GC watchdog
//! - Position cache keyed by symbol and side, pruning flat positions only
//!
//! The store is an explicit instance owned by its caller; create one per
//! account (or per test) and share it through [`SharedOrderStore`].

pub mod store;
pub mod types;
pub mod watchdog;

// Re-export core types
pub use store::{OrderStore, SharedOrderStore, SweepReport, MAX_ORDERS, MAX_POSITIONS};
pub use types::{
    next_client_order_id, MarginMode, Order, OrderId, OrderSide, OrderStatus, OrderSync,
    OrderType, Position, PositionKey, PositionSide,
};
pub use watchdog::Watchdog;
