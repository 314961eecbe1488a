//! Command implementations

pub mod close;
pub mod decode;
pub mod query;

use anyhow::{Context, Result};
use crypto_oms::exchange::RestClient;
use crypto_oms::oms::Watchdog;
use crypto_oms::{Config, OrderStore, TradeExecutor};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};

/// Everything a trading command needs, synced and with the watchdog running
pub struct Session {
    pub executor: TradeExecutor,
    watchdog: Watchdog,
}

impl Session {
    pub async fn start(config_path: Option<PathBuf>) -> Result<Self> {
        let config = match &config_path {
            Some(path) => {
                let config = Config::from_file(path)?;
                info!("Loaded configuration from: {}", path.display());
                config
            }
            None => Config::from_env()?,
        };

        let client = RestClient::new(&config.exchange)?;
        if !client.has_credentials() {
            warn!("No API credentials configured (set OMS_API_KEY, OMS_API_SECRET and OMS_API_PASSPHRASE)");
        }
        info!("Exchange: {}", config.exchange.base_url);

        let store = OrderStore::shared(config.oms.clone());
        let watchdog = Watchdog::spawn(store.clone(), &config.oms);
        let executor = TradeExecutor::new(Arc::new(client), store, config.executor.clone());

        match executor.sync().await {
            Ok(report) => {
                info!(
                    "Initial sync: {} positions, {} orders",
                    report.positions.applied, report.orders.applied
                );
                Ok(Self { executor, watchdog })
            }
            Err(e) => {
                watchdog.shutdown().await;
                Err(e).context("Initial sync failed")
            }
        }
    }

    /// Stop background tasks
    pub async fn finish(self) {
        self.watchdog.shutdown().await;
    }
}
