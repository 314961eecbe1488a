//! Circuit breaker for the exchange REST client
//!
//! Counts consecutive transient failures (network errors, 5xx). Once the
//! threshold is reached the circuit opens and requests are refused locally
//! until the reset timeout elapses; then a single trial request is let through.
//! Exchange rejections are definitive answers and never trip the breaker.

use std::time::Duration;
use tokio::time::Instant;
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CircuitState {
    #[default]
    Closed,
    Open,
    /// Reset timeout elapsed; the next result decides
    HalfOpen,
}

#[derive(Debug, Clone)]
pub struct CircuitBreakerConfig {
    pub failure_threshold: u32,
    pub reset_timeout: Duration,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            reset_timeout: Duration::from_secs(30),
        }
    }
}

#[derive(Debug)]
pub struct CircuitBreaker {
    state: CircuitState,
    consecutive_failures: u32,
    opened_at: Option<Instant>,
    config: CircuitBreakerConfig,
}

impl CircuitBreaker {
    pub fn new(config: CircuitBreakerConfig) -> Self {
        Self {
            state: CircuitState::Closed,
            consecutive_failures: 0,
            opened_at: None,
            config,
        }
    }

    pub fn state(&self) -> CircuitState {
        self.state
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }

    /// Whether a request may be sent now
    pub fn allow_request(&mut self) -> bool {
        match self.state {
            CircuitState::Closed | CircuitState::HalfOpen => true,
            CircuitState::Open => {
                let elapsed = self
                    .opened_at
                    .map_or(true, |opened| opened.elapsed() >= self.config.reset_timeout);
                if elapsed {
                    info!("Circuit breaker half-open, probing exchange");
                    self.state = CircuitState::HalfOpen;
                }
                elapsed
            }
        }
    }

    /// Any definitive answer from the exchange, including a rejection
    pub fn on_success(&mut self) {
        if self.state != CircuitState::Closed {
            info!("Circuit breaker closed");
        }
        self.state = CircuitState::Closed;
        self.consecutive_failures = 0;
        self.opened_at = None;
    }

    pub fn on_transient_failure(&mut self) {
        self.consecutive_failures = self.consecutive_failures.saturating_add(1);
        let trip = match self.state {
            CircuitState::HalfOpen => true,
            CircuitState::Closed => self.consecutive_failures >= self.config.failure_threshold.max(1),
            CircuitState::Open => false,
        };
        if trip {
            warn!(
                failures = self.consecutive_failures,
                "Circuit breaker opened"
            );
            self.state = CircuitState::Open;
            self.opened_at = Some(Instant::now());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn breaker(threshold: u32, reset: Duration) -> CircuitBreaker {
        CircuitBreaker::new(CircuitBreakerConfig {
            failure_threshold: threshold,
            reset_timeout: reset,
        })
    }

    #[test]
    fn test_opens_after_threshold() {
        let mut cb = breaker(3, Duration::from_secs(60));
        cb.on_transient_failure();
        cb.on_transient_failure();
        assert_eq!(cb.state(), CircuitState::Closed);
        assert!(cb.allow_request());

        cb.on_transient_failure();
        assert_eq!(cb.state(), CircuitState::Open);
        assert!(!cb.allow_request());
    }

    #[test]
    fn test_success_resets_count() {
        let mut cb = breaker(2, Duration::from_secs(60));
        cb.on_transient_failure();
        cb.on_success();
        cb.on_transient_failure();
        assert_eq!(cb.state(), CircuitState::Closed);
        assert_eq!(cb.consecutive_failures(), 1);
    }

    #[test]
    fn test_half_open_trial_request() {
        let mut cb = breaker(1, Duration::from_millis(1));
        cb.on_transient_failure();
        assert_eq!(cb.state(), CircuitState::Open);

        std::thread::sleep(Duration::from_millis(5));
        assert!(cb.allow_request());
        assert_eq!(cb.state(), CircuitState::HalfOpen);

        // Failed trial reopens immediately
        cb.on_transient_failure();
        assert_eq!(cb.state(), CircuitState::Open);

        std::thread::sleep(Duration::from_millis(5));
        assert!(cb.allow_request());
        cb.on_success();
        assert_eq!(cb.state(), CircuitState::Closed);
    }
}
