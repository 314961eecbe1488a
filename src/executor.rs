//! Trade execution safety layer
//!
//! Closes positions against the exchange while keeping the [`OrderStore`]
//! honest about what is known:
//!
//! - Close quantities come from the cached position verbatim, never rounded
//! - Every close is registered as an optimistic placeholder before it is sent
//! - A transient failure keeps the placeholder, flagged unconfirmed, because
//!   the close may have executed
//! - A terminal failure removes the placeholder immediately
//!
//! [`OrderStore`]: crate::oms::OrderStore

use std::collections::HashSet;
use std::sync::Arc;

use futures::future::join_all;
use serde_json::Value;
use tracing::{debug, error, info, warn};

use crate::config::{CancelFailurePolicy, ExecutorConfig};
use crate::error::{ExecutionError, ExecutionResult};
use crate::exchange::{
    serialize_payload, ApiEnvelope, CancelAllRequest, CloseOrderRequest, ExchangeApi,
    TransportError,
};
use crate::mapper::{ingest_position, map_to_oms_order};
use crate::oms::{
    next_client_order_id, Order, OrderId, OrderSide, OrderType, Position, PositionSide,
    SharedOrderStore,
};
use crate::{now_millis, Money, Symbol};

/// Close of all or part of one position
#[derive(Debug, Clone, PartialEq)]
pub struct CloseRequest {
    pub symbol: Symbol,
    pub side: PositionSide,
    /// Partial close quantity; `None` closes the whole position
    pub amount: Option<Money>,
    /// Close the full cached amount, resyncing first if the cache is stale.
    /// Overrides `amount`.
    pub force_full_close: bool,
}

impl CloseRequest {
    pub fn full(symbol: Symbol, side: PositionSide) -> Self {
        Self {
            symbol,
            side,
            amount: None,
            force_full_close: false,
        }
    }

    pub fn partial(symbol: Symbol, side: PositionSide, amount: Money) -> Self {
        Self {
            amount: Some(amount),
            ..Self::full(symbol, side)
        }
    }

    pub fn forced(mut self) -> Self {
        self.force_full_close = true;
        self
    }
}

/// Accepted close order
#[derive(Debug, Clone, PartialEq)]
pub struct CloseOutcome {
    /// Id of the optimistic placeholder, also sent as the client order id
    pub client_order_id: OrderId,
    /// Exchange-assigned id, when the acknowledgement carried one
    pub exchange_order_id: Option<String>,
    pub symbol: Symbol,
    pub side: OrderSide,
    pub amount: Money,
}

/// Result of applying one authoritative snapshot
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RefreshReport {
    pub applied: usize,
    pub skipped: usize,
    /// Cached positions missing from the snapshot, set to zero
    pub zeroed: usize,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncReport {
    pub positions: RefreshReport,
    pub orders: RefreshReport,
}

/// Map an exchange answer onto the execution error taxonomy
pub fn classify(result: Result<ApiEnvelope, TransportError>) -> ExecutionResult<ApiEnvelope> {
    match result {
        Ok(envelope) if envelope.is_success() => Ok(envelope),
        Ok(envelope) => Err(ExecutionError::TerminalApi {
            code: envelope.code_text(),
            msg: envelope.msg,
        }),
        Err(TransportError::Rejected { status, body }) => Err(ExecutionError::TerminalApi {
            code: format!("HTTP {status}"),
            msg: body,
        }),
        Err(e @ (TransportError::CircuitOpen | TransportError::MissingCredentials)) => {
            Err(ExecutionError::RequestNotSent(e.to_string()))
        }
        Err(e) => Err(ExecutionError::TransientNetwork(e.to_string())),
    }
}

pub struct TradeExecutor {
    exchange: Arc<dyn ExchangeApi>,
    store: SharedOrderStore,
    config: ExecutorConfig,
}

impl TradeExecutor {
    pub fn new(exchange: Arc<dyn ExchangeApi>, store: SharedOrderStore, config: ExecutorConfig) -> Self {
        Self {
            exchange,
            store,
            config,
        }
    }

    pub fn store(&self) -> &SharedOrderStore {
        &self.store
    }

    pub fn config(&self) -> &ExecutorConfig {
        &self.config
    }

    // ==================== CLOSING ====================

    /// Cancel working orders for `symbol`, then close the whole position with
    /// a reduce-only market order.
    ///
    /// A failed cancel is handled per [`CancelFailurePolicy`]; `force` lets
    /// the close go ahead under `AbortUnlessForced`. The amount sent is the
    /// one cached after the cancel returns, not the one seen before it.
    pub async fn flash_close_position(
        &self,
        symbol: &Symbol,
        side: PositionSide,
        force: bool,
    ) -> ExecutionResult<CloseOutcome> {
        let resolved = self.resolve_position(symbol, side).await?;

        if let Err(e) = self.cancel_all_orders(symbol, true).await {
            match (self.config.cancel_failure_policy, force) {
                (CancelFailurePolicy::AbortUnlessForced, false) => {
                    warn!(%symbol, %side, error = %e, "Cancel before flash close failed, aborting");
                    return Err(e);
                }
                _ => {
                    warn!(%symbol, %side, error = %e, "Cancel before flash close failed, closing anyway");
                }
            }
        }

        let position = self.revalidate_position(symbol, side).await?;
        if position.amount != resolved.amount {
            info!(
                %symbol,
                %side,
                before = %resolved.amount,
                after = %position.amount,
                "Position changed during cancel, closing current amount"
            );
        }

        let amount = position.amount;
        self.submit_close(&position, amount).await
    }

    /// Close all or part of a position without touching working orders
    pub async fn close_position(&self, request: CloseRequest) -> ExecutionResult<CloseOutcome> {
        let CloseRequest {
            symbol,
            side,
            amount,
            force_full_close,
        } = request;

        let mut position = self.resolve_position(&symbol, side).await?;
        if force_full_close {
            position = self.revalidate_position(&symbol, side).await?;
        }

        let amount = match amount {
            Some(amount) if !force_full_close => {
                if !amount.is_positive() {
                    return Err(ExecutionError::Validation(format!(
                        "close amount must be positive, got {amount}"
                    )));
                }
                if amount > position.amount {
                    return Err(ExecutionError::Validation(format!(
                        "close amount {amount} exceeds {side} position {} on {symbol}",
                        position.amount
                    )));
                }
                amount
            }
            _ => position.amount,
        };

        self.submit_close(&position, amount).await
    }

    /// Cancel every working order on `symbol`.
    ///
    /// With `throw_on_error = false` a failure is logged and swallowed.
    pub async fn cancel_all_orders(&self, symbol: &Symbol, throw_on_error: bool) -> ExecutionResult<()> {
        let request = CancelAllRequest {
            symbol: Some(symbol.clone()),
        };
        let body = serialize_payload(&request.to_payload());

        match classify(self.exchange.cancel_all_orders(body).await) {
            Ok(_) => {
                info!(%symbol, "Cancelled working orders");
                Ok(())
            }
            Err(e) if throw_on_error => Err(e),
            Err(e) => {
                warn!(%symbol, error = %e, "Cancel all orders failed, ignoring");
                Ok(())
            }
        }
    }

    /// Close every open cached position concurrently.
    ///
    /// All closes run to completion; any failures are reported together as
    /// [`ExecutionError::PartialFailure`].
    pub async fn close_all_positions(&self) -> ExecutionResult<Vec<CloseOutcome>> {
        let targets: Vec<(Symbol, PositionSide)> = self
            .store
            .lock()
            .get_positions()
            .into_iter()
            .filter(|position| position.is_open())
            .map(|position| (position.symbol.clone(), position.side))
            .collect();

        if targets.is_empty() {
            info!("No open positions to close");
            return Ok(Vec::new());
        }

        let results = join_all(
            targets
                .iter()
                .map(|(symbol, side)| self.close_position(CloseRequest::full(symbol.clone(), *side))),
        )
        .await;

        let total = results.len();
        let mut outcomes = Vec::with_capacity(total);
        let mut errors = Vec::new();
        for ((symbol, side), result) in targets.iter().zip(results) {
            match result {
                Ok(outcome) => outcomes.push(outcome),
                Err(e) => errors.push(format!("{symbol} {side}: {e}")),
            }
        }

        if errors.is_empty() {
            info!(closed = total, "Closed all positions");
            Ok(outcomes)
        } else {
            error!(failed = errors.len(), total, "Close all positions partially failed");
            Err(ExecutionError::PartialFailure {
                failed: errors.len(),
                total,
                errors,
            })
        }
    }

    // ==================== SYNC ====================

    /// Replace cached positions with the exchange snapshot
    pub async fn refresh_positions(&self) -> ExecutionResult<RefreshReport> {
        let envelope = classify(self.exchange.fetch_positions().await)?;
        let now = now_millis();

        let mut report = RefreshReport::default();
        let mut fresh = Vec::new();
        for raw in envelope.records() {
            match ingest_position(raw) {
                Ok(mut position) => {
                    // Freshness of the cache, not of the exchange record
                    position.last_updated = Some(now);
                    fresh.push(position);
                }
                Err(e) => {
                    warn!(error = %e, "Skipping invalid position record");
                    report.skipped += 1;
                }
            }
        }
        let seen: HashSet<_> = fresh.iter().map(Position::key).collect();

        let mut store = self.store.lock();
        if report.skipped == 0 {
            let vanished: Vec<Position> = store
                .get_positions()
                .into_iter()
                .filter(|position| position.is_open() && !seen.contains(&position.key()))
                .cloned()
                .collect();
            for mut position in vanished {
                debug!(symbol = %position.symbol, side = %position.side, "Position absent from snapshot, zeroing");
                position.amount = Money::ZERO;
                position.last_updated = Some(now);
                store.update_position(position);
                report.zeroed += 1;
            }
        } else {
            warn!(skipped = report.skipped, "Snapshot incomplete, keeping positions it did not list");
        }

        report.applied = fresh.len();
        for position in fresh {
            store.update_position(position);
        }

        info!(
            applied = report.applied,
            skipped = report.skipped,
            zeroed = report.zeroed,
            "Positions refreshed"
        );
        Ok(report)
    }

    /// Upsert working orders from the exchange snapshot
    pub async fn refresh_orders(&self) -> ExecutionResult<RefreshReport> {
        let envelope = classify(self.exchange.fetch_open_orders().await)?;

        let mut report = RefreshReport::default();
        let mut orders = Vec::new();
        for raw in envelope.records() {
            match map_to_oms_order(raw) {
                Ok(order) => orders.push(order),
                Err(e) => {
                    warn!(error = %e, "Skipping invalid order record");
                    report.skipped += 1;
                }
            }
        }

        report.applied = orders.len();
        let mut store = self.store.lock();
        for order in orders {
            store.update_order(order);
        }

        info!(applied = report.applied, skipped = report.skipped, "Orders refreshed");
        Ok(report)
    }

    /// Refresh positions then orders
    pub async fn sync(&self) -> ExecutionResult<SyncReport> {
        let positions = self.refresh_positions().await?;
        let orders = self.refresh_orders().await?;
        Ok(SyncReport { positions, orders })
    }

    // ==================== INTERNALS ====================

    fn cached_open_position(&self, symbol: &Symbol, side: PositionSide) -> Option<Position> {
        self.store
            .lock()
            .get_position(symbol, side)
            .filter(|position| position.is_open())
            .cloned()
    }

    /// Cached open position, refreshing from the exchange once on a miss
    async fn resolve_position(&self, symbol: &Symbol, side: PositionSide) -> ExecutionResult<Position> {
        if let Some(position) = self.cached_open_position(symbol, side) {
            return Ok(position);
        }

        debug!(%symbol, %side, "Position not cached, refreshing from exchange");
        self.refresh_positions().await?;

        self.cached_open_position(symbol, side).ok_or_else(|| {
            warn!(%symbol, %side, "Position not found after refresh");
            ExecutionError::NotFound {
                symbol: symbol.clone(),
                side,
            }
        })
    }

    /// Position as cached right before submission.
    ///
    /// Resyncs once when the entry is older than `position_stale_ms`. A
    /// position that went flat in the meantime is `NotFound`.
    async fn revalidate_position(&self, symbol: &Symbol, side: PositionSide) -> ExecutionResult<Position> {
        let not_found = || ExecutionError::NotFound {
            symbol: symbol.clone(),
            side,
        };
        let stale_after = i64::try_from(self.config.position_stale_ms).unwrap_or(i64::MAX);

        let Some(position) = self.cached_open_position(symbol, side) else {
            warn!(%symbol, %side, "Position went flat before close was sent");
            return Err(not_found());
        };
        let age_ms = position.age_ms(now_millis());
        if age_ms <= stale_after {
            return Ok(position);
        }

        debug!(%symbol, %side, age_ms, "Cached position stale, resyncing before close");
        self.refresh_positions().await?;
        self.cached_open_position(symbol, side).ok_or_else(|| {
            warn!(%symbol, %side, "Position gone after resync");
            not_found()
        })
    }

    /// Register a placeholder and send the reduce-only close
    async fn submit_close(&self, position: &Position, amount: Money) -> ExecutionResult<CloseOutcome> {
        let client_order_id = next_client_order_id();
        let request = CloseOrderRequest {
            symbol: position.symbol.clone(),
            position_side: position.side,
            amount,
            client_order_id: client_order_id.clone(),
        };
        let side = request.side();

        let placeholder = Order::new(
            client_order_id.clone(),
            position.symbol.clone(),
            side,
            OrderType::Market,
            amount,
        )
        .with_client_order_id(client_order_id.clone());
        self.store.lock().add_optimistic_order(placeholder);

        info!(
            symbol = %position.symbol,
            %side,
            %amount,
            client_order_id = %client_order_id,
            "Submitting reduce-only close"
        );
        let body = serialize_payload(&request.to_payload());

        match classify(self.exchange.place_order(body).await) {
            Ok(envelope) => Ok(CloseOutcome {
                exchange_order_id: envelope.data.get("orderId").and_then(order_id_text),
                client_order_id,
                symbol: position.symbol.clone(),
                side,
                amount,
            }),
            Err(e) if e.is_transient() => {
                if !self.store.lock().mark_unconfirmed(&client_order_id) {
                    warn!(client_order_id = %client_order_id, "Placeholder no longer pending, not flagged");
                }
                error!(
                    client_order_id = %client_order_id,
                    error = %e,
                    "Close outcome unknown, placeholder kept as unconfirmed"
                );
                Err(e)
            }
            Err(e) => {
                self.store.lock().discard_optimistic(&client_order_id);
                error!(client_order_id = %client_order_id, error = %e, "Close rejected");
                Err(e)
            }
        }
    }
}

fn order_id_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_success() {
        let envelope = ApiEnvelope::ok(Value::Null);
        assert_eq!(classify(Ok(envelope.clone())), Ok(envelope));
    }

    #[test]
    fn test_classify_api_error_is_terminal() {
        let err = classify(Ok(ApiEnvelope::error("22002", "no position to close"))).unwrap_err();
        assert_eq!(
            err,
            ExecutionError::TerminalApi {
                code: "22002".into(),
                msg: "no position to close".into()
            }
        );
        assert!(err.is_terminal());
    }

    #[test]
    fn test_classify_transport_errors() {
        assert!(classify(Err(TransportError::Network("reset".into())))
            .unwrap_err()
            .is_transient());
        assert!(classify(Err(TransportError::Server {
            status: 504,
            body: String::new()
        }))
        .unwrap_err()
        .is_transient());
        assert!(classify(Err(TransportError::Decode("garbage".into())))
            .unwrap_err()
            .is_transient());
        assert!(matches!(
            classify(Err(TransportError::Rejected {
                status: 401,
                body: "bad sign".into()
            })),
            Err(ExecutionError::TerminalApi { .. })
        ));
        assert!(matches!(
            classify(Err(TransportError::CircuitOpen)),
            Err(ExecutionError::RequestNotSent(_))
        ));
    }

    #[test]
    fn test_close_request_builders() {
        let symbol = Symbol::new("BTCUSDT");
        let request = CloseRequest::partial(symbol.clone(), PositionSide::Long, Money::ONE).forced();
        assert_eq!(request.amount, Some(Money::ONE));
        assert!(request.force_full_close);
        assert_eq!(CloseRequest::full(symbol, PositionSide::Short).amount, None);
    }
}
