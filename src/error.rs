//! Error taxonomy for the mapper, decoder and trade executor
//!
//! The order store has no error type: it is a best-effort cache and every
//! operation on it succeeds.

use thiserror::Error;

use crate::oms::types::PositionSide;
use crate::types::Symbol;

/// Failure to turn a raw exchange record into an OMS record
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MapperError {
    #[error("required field missing: {0}")]
    MissingField(&'static str),

    #[error("field {field} is not an exact decimal: {value}")]
    InvalidDecimal { field: &'static str, value: String },

    #[error("field {field} has an unusable value: {value}")]
    InvalidValue { field: &'static str, value: String },
}

/// Failure to parse raw payload text
#[derive(Debug, Error)]
#[error("payload is not valid JSON: {0}")]
pub struct DecodeError(#[from] pub serde_json::Error);

/// Outcome of a failed trade-executor operation
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExecutionError {
    /// Position absent from the store even after an authoritative refresh.
    #[error("no open {side} position for {symbol}")]
    NotFound { symbol: Symbol, side: PositionSide },

    /// Upstream data or caller input is missing a required value.
    #[error("validation failed: {0}")]
    Validation(String),

    /// No definitive answer was received; the outcome on the exchange is unknown.
    #[error("network failure, outcome unknown: {0}")]
    TransientNetwork(String),

    /// The exchange answered with an application-level error.
    #[error("exchange rejected request (code {code}): {msg}")]
    TerminalApi { code: String, msg: String },

    /// The request was refused locally and never left the process.
    #[error("request not sent: {0}")]
    RequestNotSent(String),

    /// Some operations of a fan-out failed.
    #[error("{failed} of {total} operations failed: {}", .errors.join("; "))]
    PartialFailure {
        failed: usize,
        total: usize,
        errors: Vec<String>,
    },
}

impl ExecutionError {
    /// Outcome unknown: optimistic state must be kept for reconciliation.
    pub fn is_transient(&self) -> bool {
        matches!(self, ExecutionError::TransientNetwork(_))
    }

    /// Outcome known-failed: optimistic state can be dropped.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ExecutionError::TerminalApi { .. } | ExecutionError::RequestNotSent(_)
        )
    }
}

impl From<MapperError> for ExecutionError {
    fn from(err: MapperError) -> Self {
        ExecutionError::Validation(err.to_string())
    }
}

pub type ExecutionResult<T> = Result<T, ExecutionError>;
