//! Bounded order and position cache
//!
//! The store mirrors exchange state; it is never the system of record. Writes
//! are never rejected: when the order map is full the oldest finalized order
//! is evicted, and failing that the oldest order of any status. Losing sight
//! of one active order is accepted because the next authoritative sync
//! restores it.
//!
//! Insertion order is tracked with monotonically increasing sequence numbers
//! held in two ordered indexes (all orders, finalized orders), so both
//! eviction candidates are found without scanning the map.

use parking_lot::Mutex;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::config::OmsConfig;
use crate::now_millis;
use crate::oms::types::{Order, OrderId, OrderSync, Position, PositionKey, PositionSide};
use crate::Symbol;

/// Default order capacity
pub const MAX_ORDERS: usize = 2000;

/// Default position capacity
pub const MAX_POSITIONS: usize = 50;

/// Store handle shared between the executor and the watchdog.
///
/// The lock is only ever taken for a single synchronous operation and never
/// held across an await point.
pub type SharedOrderStore = Arc<Mutex<OrderStore>>;

#[derive(Debug)]
struct Slot {
    order: Order,
    seq: u64,
}

/// Result of one watchdog sweep
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub marked_stale: usize,
    pub removed: usize,
}

#[derive(Debug)]
pub struct OrderStore {
    orders: HashMap<OrderId, Slot>,
    /// Insertion sequence → order id, oldest first
    arrival: BTreeMap<u64, OrderId>,
    /// Insertion sequences of orders in a terminal status
    finalized: BTreeSet<u64>,
    next_seq: u64,
    positions: HashMap<PositionKey, Position>,
    config: OmsConfig,
}

impl OrderStore {
    pub fn new(config: OmsConfig) -> Self {
        Self {
            orders: HashMap::new(),
            arrival: BTreeMap::new(),
            finalized: BTreeSet::new(),
            next_seq: 0,
            positions: HashMap::new(),
            config,
        }
    }

    pub fn with_defaults() -> Self {
        Self::new(OmsConfig::default())
    }

    /// Wrap a new store for sharing with the executor and watchdog
    pub fn shared(config: OmsConfig) -> SharedOrderStore {
        Arc::new(Mutex::new(Self::new(config)))
    }

    pub fn config(&self) -> &OmsConfig {
        &self.config
    }

    // ==================== ORDERS ====================

    /// Authoritative upsert by order id (exchange acknowledgement or sync)
    pub fn update_order(&mut self, order: Order) {
        self.upsert(order, OrderSync::Confirmed);
    }

    /// Insert a local placeholder shown before the exchange confirms it
    pub fn add_optimistic_order(&mut self, order: Order) {
        self.upsert(order, OrderSync::Optimistic);
    }

    fn upsert(&mut self, mut order: Order, sync: OrderSync) {
        order.sync = sync;

        if sync == OrderSync::Confirmed {
            self.supersede_placeholder(&order);
        }

        if let Some(slot) = self.orders.get_mut(&order.id) {
            if sync != OrderSync::Confirmed && slot.order.sync == OrderSync::Confirmed {
                debug!(order_id = %order.id, "Order already confirmed, ignoring optimistic write");
                return;
            }
            let current = slot.order.status;
            if current.is_terminal() && order.status != current {
                warn!(
                    order_id = %order.id,
                    from = ?current,
                    to = ?order.status,
                    "Ignoring transition out of terminal status"
                );
                return;
            }
            if order.status.is_terminal() {
                self.finalized.insert(slot.seq);
            }
            slot.order = order;
            return;
        }

        if self.orders.len() >= self.config.max_orders.max(1) {
            self.evict_one();
        }

        let seq = self.next_seq;
        self.next_seq += 1;
        if order.status.is_terminal() {
            self.finalized.insert(seq);
        }
        self.arrival.insert(seq, order.id.clone());
        self.orders.insert(order.id.clone(), Slot { order, seq });
    }

    /// Drop the placeholder an acknowledged order was submitted under
    fn supersede_placeholder(&mut self, order: &Order) {
        let Some(client_id) = order.client_order_id.as_deref() else {
            return;
        };
        if client_id == order.id {
            return;
        }
        let is_placeholder = self
            .orders
            .get(client_id)
            .is_some_and(|slot| slot.order.is_optimistic());
        if is_placeholder {
            debug!(placeholder = %client_id, order_id = %order.id, "Placeholder superseded");
            self.remove_order(client_id);
        }
    }

    /// Free one slot: oldest finalized order first, else the oldest order
    fn evict_one(&mut self) {
        let (seq, finalized) = match self.finalized.first() {
            Some(&seq) => (seq, true),
            None => match self.arrival.keys().next() {
                Some(&seq) => (seq, false),
                None => return,
            },
        };
        let Some(id) = self.arrival.get(&seq).cloned() else {
            return;
        };

        if finalized {
            debug!(order_id = %id, "Evicting finalized order");
        } else {
            warn!(
                order_id = %id,
                capacity = self.config.max_orders,
                "Order cache full with no finalized orders, evicting oldest active order"
            );
        }
        self.remove_order(&id);
    }

    pub fn remove_order(&mut self, id: &str) -> Option<Order> {
        let slot = self.orders.remove(id)?;
        self.arrival.remove(&slot.seq);
        self.finalized.remove(&slot.seq);
        Some(slot.order)
    }

    /// Remove an order only while it is still an unacknowledged placeholder
    pub fn discard_optimistic(&mut self, id: &str) -> Option<Order> {
        let is_placeholder = self
            .orders
            .get(id)
            .is_some_and(|slot| slot.order.is_optimistic());
        if is_placeholder {
            self.remove_order(id)
        } else {
            None
        }
    }

    /// Flag a placeholder whose submission got no definitive answer.
    ///
    /// Returns `false` when the order is gone or was already confirmed by an
    /// authoritative update.
    pub fn mark_unconfirmed(&mut self, id: &str) -> bool {
        let Some(slot) = self.orders.get_mut(id) else {
            return false;
        };
        slot.order.sync = match slot.order.sync {
            OrderSync::Confirmed => return false,
            OrderSync::Optimistic | OrderSync::Unconfirmed => OrderSync::Unconfirmed,
            OrderSync::Stale { .. } => OrderSync::Stale { unconfirmed: true },
        };
        true
    }

    pub fn get_order(&self, id: &str) -> Option<&Order> {
        self.orders.get(id).map(|slot| &slot.order)
    }

    /// All cached orders, oldest first
    pub fn get_all_orders(&self) -> Vec<&Order> {
        self.arrival
            .values()
            .filter_map(|id| self.orders.get(id))
            .map(|slot| &slot.order)
            .collect()
    }

    pub fn order_count(&self) -> usize {
        self.orders.len()
    }

    /// Watchdog sweep for placeholders that never got acknowledged.
    ///
    /// Placeholders older than `threshold` are marked stale but kept, since a
    /// slow acknowledgement may still arrive. Stale placeholders older than the
    /// configured gc age are deleted. Both stages run in the same pass.
    pub fn remove_orphaned_optimistic(&mut self, threshold: Duration) -> SweepReport {
        self.remove_orphaned_optimistic_at(threshold, now_millis())
    }

    pub fn remove_orphaned_optimistic_at(&mut self, threshold: Duration, now_ms: i64) -> SweepReport {
        let stale_after = i64::try_from(threshold.as_millis()).unwrap_or(i64::MAX);
        let gc_after = i64::try_from(self.config.optimistic_gc_ms).unwrap_or(i64::MAX);

        let mut report = SweepReport::default();
        let mut expired = Vec::new();

        for slot in self.orders.values_mut() {
            let order = &mut slot.order;
            let age = order.age_ms(now_ms);

            match order.sync {
                OrderSync::Confirmed => continue,
                OrderSync::Optimistic | OrderSync::Unconfirmed if age >= stale_after => {
                    let unconfirmed = order.sync == OrderSync::Unconfirmed;
                    order.sync = OrderSync::Stale { unconfirmed };
                    report.marked_stale += 1;
                    info!(order_id = %order.id, age_ms = age, unconfirmed, "Optimistic order marked stale");
                }
                _ => {}
            }

            if order.is_stale() && age >= gc_after {
                expired.push(order.id.clone());
            }
        }

        for id in expired {
            if let Some(order) = self.remove_order(&id) {
                warn!(
                    order_id = %id,
                    symbol = %order.symbol,
                    age_ms = order.age_ms(now_ms),
                    "Stale optimistic order garbage-collected"
                );
                report.removed += 1;
            }
        }

        report
    }

    // ==================== POSITIONS ====================

    /// Authoritative upsert by (symbol, side)
    pub fn update_position(&mut self, mut position: Position) {
        if position.last_updated.is_none() {
            position.last_updated = Some(now_millis());
        }
        self.positions.insert(position.key(), position);

        if self.positions.len() > self.config.max_positions {
            self.prune_flat_positions();
        }
    }

    /// Drop zero-amount positions; open positions are never evicted
    fn prune_flat_positions(&mut self) {
        let before = self.positions.len();
        self.positions.retain(|_, position| position.is_open());
        let pruned = before - self.positions.len();

        if pruned > 0 {
            debug!(pruned, remaining = self.positions.len(), "Pruned flat positions");
        }
        if self.positions.len() > self.config.max_positions {
            warn!(
                open = self.positions.len(),
                capacity = self.config.max_positions,
                "Position cache over capacity with only open positions"
            );
        }
    }

    pub fn get_position(&self, symbol: &Symbol, side: PositionSide) -> Option<&Position> {
        self.positions.get(&(symbol.clone(), side))
    }

    /// All cached positions ordered by symbol then side
    pub fn get_positions(&self) -> Vec<&Position> {
        let mut positions: Vec<&Position> = self.positions.values().collect();
        positions.sort_by(|a, b| (&a.symbol, a.side).cmp(&(&b.symbol, b.side)));
        positions
    }

    pub fn position_count(&self) -> usize {
        self.positions.len()
    }

    /// Clear all orders and positions
    pub fn reset(&mut self) {
        self.orders.clear();
        self.arrival.clear();
        self.finalized.clear();
        self.positions.clear();
    }
}

impl Default for OrderStore {
    fn default() -> Self {
        Self::with_defaults()
    }
}
