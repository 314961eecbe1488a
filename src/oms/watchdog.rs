//! Periodic sweep for abandoned optimistic orders
//!
//! Runs [`OrderStore::remove_orphaned_optimistic`] on a fixed interval in a
//! background task. Each sweep takes the store lock once, so it never
//! interleaves with another store operation mid-step.

use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info};

use crate::config::OmsConfig;
use crate::oms::store::{SharedOrderStore, SweepReport};

/// Handle to a running watchdog task
pub struct Watchdog {
    shutdown_tx: mpsc::Sender<()>,
    handle: JoinHandle<()>,
}

impl Watchdog {
    /// Start sweeping `store` every `watchdog_interval_ms`
    pub fn spawn(store: SharedOrderStore, config: &OmsConfig) -> Self {
        let period = Duration::from_millis(config.watchdog_interval_ms.max(1));
        let threshold = Duration::from_millis(config.optimistic_stale_ms);
        let (shutdown_tx, mut shutdown_rx) = mpsc::channel::<()>(1);

        let handle = tokio::spawn(async move {
            let mut ticker = interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            info!(interval_ms = period.as_millis() as u64, "Optimistic order watchdog started");

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let report = store.lock().remove_orphaned_optimistic(threshold);
                        if report != SweepReport::default() {
                            debug!(
                                marked_stale = report.marked_stale,
                                removed = report.removed,
                                "Watchdog sweep"
                            );
                        }
                    }
                    _ = shutdown_rx.recv() => {
                        info!("Optimistic order watchdog stopped");
                        break;
                    }
                }
            }
        });

        Self {
            shutdown_tx,
            handle,
        }
    }

    /// Stop the sweep loop and wait for the task to finish
    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(()).await;
        let _ = self.handle.await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::now_millis;
    use crate::oms::store::OrderStore;
    use crate::oms::types::{Order, OrderSide, OrderType};
    use crate::{Money, Symbol};

    fn placeholder(id: &str, age_ms: i64) -> Order {
        Order::new(
            id,
            Symbol::new("BTCUSDT"),
            OrderSide::Sell,
            OrderType::Market,
            Money::ONE,
        )
        .with_timestamp(now_millis() - age_ms)
    }

    #[tokio::test]
    async fn test_watchdog_sweeps_store() {
        let config = OmsConfig {
            watchdog_interval_ms: 10,
            ..OmsConfig::default()
        };
        let store = OrderStore::shared(config.clone());
        {
            let mut guard = store.lock();
            guard.add_optimistic_order(placeholder("fresh", 0));
            guard.add_optimistic_order(placeholder("slow", 60_000));
            guard.add_optimistic_order(placeholder("abandoned", 600_000));
        }

        let watchdog = Watchdog::spawn(store.clone(), &config);
        tokio::time::sleep(Duration::from_millis(50)).await;
        watchdog.shutdown().await;

        let guard = store.lock();
        assert!(!guard.get_order("fresh").unwrap().is_stale());
        assert!(guard.get_order("slow").unwrap().is_stale());
        assert!(guard.get_order("abandoned").is_none());
    }

    #[tokio::test]
    async fn test_shutdown_stops_task() {
        let config = OmsConfig::default();
        let store = OrderStore::shared(config.clone());
        let watchdog = Watchdog::spawn(store, &config);
        tokio::time::timeout(Duration::from_secs(1), watchdog.shutdown())
            .await
            .expect("watchdog did not stop");
    }
}
