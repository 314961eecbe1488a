//! Crypto Order Management
//!
//! An in-memory order management system for derivatives trading with a
//! safety layer for closing positions:
//! - [`oms`]: bounded order/position cache with optimistic placeholders
//! - [`mapper`]: normalization of heterogeneous exchange records
//! - [`decoder`]: precision-preserving JSON decoding
//! - [`exchange`]: exchange boundary trait, wire payloads and REST client
//! - [`executor`]: flash close, partial close, cancel-all and close-all

pub mod config;
pub mod decoder;
pub mod error;
pub mod exchange;
pub mod executor;
pub mod mapper;
pub mod oms;
pub mod types;

pub use config::Config;
pub use error::{ExecutionError, ExecutionResult, MapperError};
pub use executor::{CloseOutcome, CloseRequest, TradeExecutor};
pub use oms::{OrderStore, SharedOrderStore};
pub use types::*;
