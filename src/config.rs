//! Configuration management
//!
//! Handles loading and parsing of JSON configuration files with environment
//! variable support for API credentials. Every section and field has a
//! default, so an empty object (or no file at all) is a valid configuration.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use crate::oms::store::{MAX_ORDERS, MAX_POSITIONS};

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub exchange: ExchangeConfig,
    pub oms: OmsConfig,
    pub executor: ExecutorConfig,
}

impl Config {
    /// Load configuration from JSON file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let mut config: Config =
            serde_json::from_str(&contents).context("Failed to parse config JSON")?;
        config.apply_env();
        config.validate()?;
        Ok(config)
    }

    /// Defaults plus environment overrides, for running without a config file
    pub fn from_env() -> Result<Self> {
        let mut config = Config::default();
        config.apply_env();
        config.validate()?;
        Ok(config)
    }

    /// Load API credentials and endpoint from environment if set
    fn apply_env(&mut self) {
        if let Ok(api_key) = std::env::var("OMS_API_KEY") {
            self.exchange.api_key = Some(api_key);
        }
        if let Ok(api_secret) = std::env::var("OMS_API_SECRET") {
            self.exchange.api_secret = Some(api_secret);
        }
        if let Ok(passphrase) = std::env::var("OMS_API_PASSPHRASE") {
            self.exchange.api_passphrase = Some(passphrase);
        }
        if let Ok(base_url) = std::env::var("OMS_BASE_URL") {
            self.exchange.base_url = base_url;
        }
    }

    pub fn validate(&self) -> Result<()> {
        anyhow::ensure!(self.oms.max_orders > 0, "oms.max_orders must be > 0");
        anyhow::ensure!(self.oms.max_positions > 0, "oms.max_positions must be > 0");
        anyhow::ensure!(
            self.oms.optimistic_gc_ms >= self.oms.optimistic_stale_ms,
            "oms.optimistic_gc_ms ({}) must be >= oms.optimistic_stale_ms ({})",
            self.oms.optimistic_gc_ms,
            self.oms.optimistic_stale_ms
        );
        anyhow::ensure!(
            self.oms.watchdog_interval_ms > 0,
            "oms.watchdog_interval_ms must be > 0"
        );
        anyhow::ensure!(
            !self.exchange.base_url.is_empty(),
            "exchange.base_url must not be empty"
        );
        Ok(())
    }
}

/// Exchange connection configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExchangeConfig {
    pub base_url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_secret: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_passphrase: Option<String>,
    /// Envelope codes meaning success, on top of `0` / `"0"`
    pub success_codes: Vec<String>,
    /// Contract family sent with every request
    pub product_type: String,
    pub timeout_secs: u64,
    /// Retries for read requests; order writes are never retried
    pub max_retries: u32,
    /// First retry delay, doubled per attempt
    pub retry_backoff_ms: u64,
    /// Consecutive transient failures that open the circuit breaker
    pub failure_threshold: u32,
    pub reset_timeout_secs: u64,
}

impl Default for ExchangeConfig {
    fn default() -> Self {
        ExchangeConfig {
            base_url: "https://api.bitget.com".to_string(),
            api_key: None,
            api_secret: None,
            api_passphrase: None,
            success_codes: vec!["00000".to_string()],
            product_type: "USDT-FUTURES".to_string(),
            timeout_secs: 10,
            max_retries: 2,
            retry_backoff_ms: 250,
            failure_threshold: 5,
            reset_timeout_secs: 30,
        }
    }
}

/// Order store limits and optimistic-order watchdog timing
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OmsConfig {
    pub max_orders: usize,
    pub max_positions: usize,
    /// Age at which an unacknowledged placeholder is marked stale
    pub optimistic_stale_ms: u64,
    /// Age at which a stale placeholder is deleted
    pub optimistic_gc_ms: u64,
    pub watchdog_interval_ms: u64,
}

impl Default for OmsConfig {
    fn default() -> Self {
        OmsConfig {
            max_orders: MAX_ORDERS,
            max_positions: MAX_POSITIONS,
            optimistic_stale_ms: 30_000,
            optimistic_gc_ms: 5 * 60_000,
            watchdog_interval_ms: 5_000,
        }
    }
}

/// What a failed pre-close cancel does to a flash close
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CancelFailurePolicy {
    /// Abort the close unless the caller forces it
    #[default]
    AbortUnlessForced,
    /// Log the failure and close anyway
    Proceed,
}

/// Trade executor configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutorConfig {
    /// Cached positions older than this are resynced before a forced full close
    pub position_stale_ms: u64,
    pub cancel_failure_policy: CancelFailurePolicy,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        ExecutorConfig {
            position_stale_ms: 200,
            cancel_failure_policy: CancelFailurePolicy::AbortUnlessForced,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.oms.max_orders, 2000);
        assert_eq!(config.oms.max_positions, 50);
        assert_eq!(config.oms.optimistic_stale_ms, 30_000);
        assert_eq!(config.oms.optimistic_gc_ms, 300_000);
        assert_eq!(config.oms.watchdog_interval_ms, 5_000);
        assert_eq!(config.executor.position_stale_ms, 200);
        assert_eq!(
            config.executor.cancel_failure_policy,
            CancelFailurePolicy::AbortUnlessForced
        );
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config: Config = serde_json::from_str(
            r#"{"oms": {"max_orders": 10}, "executor": {"cancel_failure_policy": "proceed"}}"#,
        )
        .unwrap();
        assert_eq!(config.oms.max_orders, 10);
        assert_eq!(config.oms.max_positions, 50);
        assert_eq!(config.executor.cancel_failure_policy, CancelFailurePolicy::Proceed);
        assert_eq!(config.exchange.timeout_secs, 10);
        assert_eq!(config.exchange.success_codes, vec!["00000".to_string()]);
    }

    #[test]
    fn test_validate_rejects_inverted_thresholds() {
        let mut config = Config::default();
        config.oms.optimistic_gc_ms = 1_000;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_from_file() {
        let path = std::env::temp_dir().join(format!("crypto_oms_config_{}.json", std::process::id()));
        fs::write(&path, r#"{"exchange": {"base_url": "http://localhost:9999", "max_retries": 0}}"#)
            .unwrap();
        let config = Config::from_file(&path).unwrap();
        let _ = fs::remove_file(&path);

        assert_eq!(config.exchange.max_retries, 0);
        assert_eq!(config.exchange.failure_threshold, 5);
    }

    #[test]
    fn test_missing_file_is_error() {
        assert!(Config::from_file("/nonexistent/crypto-oms.json").is_err());
    }
}
