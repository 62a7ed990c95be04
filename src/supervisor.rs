// MIT License - Copyright (c) 2026 Peter Wright
// Process orchestration: interface startup, reconnect loop, shutdown

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tracing::{error, info, warn};

use crate::config::RetryToml;
use crate::engine::{Engine, SessionEnd};
use crate::error::{GatewayError, Result};
use crate::interface::{Interface, InterfaceManager, StopReport};
use crate::transport::Transport;

/// Floor applied to every retry delay.
pub const MIN_RETRY_DELAY: Duration = Duration::from_millis(100);

/// Backoff between connection attempts.
///
/// Applies the same way to the first connection and to every reconnect.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub initial_delay: Duration,
    pub max_delay: Duration,
    /// Consecutive failed attempts before giving up; `None` retries forever.
    pub max_attempts: Option<u32>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_millis(1000),
            max_delay: Duration::from_millis(30000),
            max_attempts: None,
        }
    }
}

impl From<&RetryToml> for RetryPolicy {
    fn from(toml: &RetryToml) -> Self {
        Self {
            initial_delay: Duration::from_millis(toml.initial_delay_ms),
            max_delay: Duration::from_millis(toml.max_delay_ms),
            max_attempts: toml.max_attempts,
        }
    }
}

impl RetryPolicy {
    /// Delay after the `failures`-th consecutive failure (1-based).
    pub fn delay_for(&self, failures: u32) -> Duration {
        let exponent = failures.saturating_sub(1).min(5);
        let delay = self.initial_delay.saturating_mul(1 << exponent);
        delay.min(self.max_delay).max(MIN_RETRY_DELAY)
    }

    /// Whether another attempt is allowed after `failures` consecutive failures.
    pub fn allows_retry(&self, failures: u32) -> bool {
        self.max_attempts.is_none_or(|max| failures < max)
    }
}

/// Result of trying to start one interface.
#[derive(Debug)]
pub struct InterfaceStartup {
    pub name: String,
    pub result: Result<()>,
}

impl InterfaceStartup {
    pub fn is_ok(&self) -> bool {
        self.result.is_ok()
    }
}

/// Start and register each candidate. A failure is logged and skipped.
pub async fn start_interfaces(
    manager: &InterfaceManager,
    candidates: Vec<(Arc<dyn Interface>, bool)>,
) -> Vec<InterfaceStartup> {
    let mut results = Vec::with_capacity(candidates.len());
    for (interface, initial) in candidates {
        let name = interface.name().to_string();
        let result = manager.start_interface(interface, initial).await;
        match &result {
            Ok(()) => info!("Interface {} started", name),
            Err(e) => warn!("Interface {} not started: {}", name, e),
        }
        results.push(InterfaceStartup { name, result });
    }
    let started = results.iter().filter(|r| r.is_ok()).count();
    info!("{} of {} interfaces running", started, results.len());
    results
}

/// Owns the connect / poll / reconnect loop.
pub struct Supervisor {
    manager: InterfaceManager,
    engine: Engine,
    transport: Box<dyn Transport>,
    retry: RetryPolicy,
    shutdown: watch::Receiver<bool>,
}

impl Supervisor {
    pub fn new(
        manager: InterfaceManager,
        engine: Engine,
        transport: Box<dyn Transport>,
        retry: RetryPolicy,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        Self {
            manager,
            engine,
            transport,
            retry,
            shutdown,
        }
    }

    /// Run until shutdown or until the retry policy gives up.
    ///
    /// Interfaces are always stopped before returning. Returns the stop
    /// reports on clean shutdown and `ConnectAttemptsExhausted` otherwise.
    pub async fn run(mut self) -> Result<Vec<StopReport>> {
        info!("Supervising panel on {}", self.transport.describe());
        let mut failures: u32 = 0;

        let outcome = loop {
            if *self.shutdown.borrow() {
                break Ok(());
            }

            let end = self
                .engine
                .run_session(self.transport.as_mut(), &mut self.shutdown)
                .await;
            if let Err(e) = self.transport.disconnect().await {
                warn!("Error closing {}: {}", self.transport.describe(), e);
            }
            self.engine.mark_disconnected().await;

            match end {
                SessionEnd::Shutdown => break Ok(()),
                SessionEnd::Failed {
                    error,
                    reached_polling,
                } => {
                    if reached_polling {
                        failures = 0;
                    }
                    failures += 1;
                    if !error.is_retryable() {
                        warn!("Non-transport error ends session: {}", error);
                    }
                    if !self.retry.allows_retry(failures) {
                        error!("Giving up after {} failed connection attempts", failures);
                        break Err(GatewayError::ConnectAttemptsExhausted { attempts: failures });
                    }
                    let delay = self.retry.delay_for(failures);
                    info!("Reconnecting in {:.1}s (attempt {})", delay.as_secs_f64(), failures + 1);
                    tokio::select! {
                        _ = tokio::time::sleep(delay) => {}
                        changed = self.shutdown.changed() => {
                            if changed.is_err() || *self.shutdown.borrow() {
                                break Ok(());
                            }
                        }
                    }
                }
            }
        };

        let reports = self.manager.stop().await;
        outcome.map(|()| reports)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_delay_doubles_then_caps() {
        let policy = RetryPolicy {
            initial_delay: Duration::from_millis(1000),
            max_delay: Duration::from_millis(10000),
            max_attempts: None,
        };
        assert_eq!(policy.delay_for(1), Duration::from_millis(1000));
        assert_eq!(policy.delay_for(2), Duration::from_millis(2000));
        assert_eq!(policy.delay_for(4), Duration::from_millis(8000));
        assert_eq!(policy.delay_for(5), Duration::from_millis(10000));
        assert_eq!(policy.delay_for(50), Duration::from_millis(10000));
    }

    #[test]
    fn test_exponent_stops_growing() {
        let policy = RetryPolicy {
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(3600),
            max_attempts: None,
        };
        assert_eq!(policy.delay_for(6), Duration::from_millis(3200));
        assert_eq!(policy.delay_for(7), Duration::from_millis(3200));
    }

    #[test]
    fn test_delay_never_below_floor() {
        let policy = RetryPolicy {
            initial_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
            max_attempts: None,
        };
        assert_eq!(policy.delay_for(1), MIN_RETRY_DELAY);
        assert_eq!(policy.delay_for(0), MIN_RETRY_DELAY);
    }

    #[test]
    fn test_attempt_limit() {
        let unlimited = RetryPolicy::default();
        assert!(unlimited.allows_retry(u32::MAX - 1));

        let limited = RetryPolicy {
            max_attempts: Some(3),
            ..RetryPolicy::default()
        };
        assert!(limited.allows_retry(2));
        assert!(!limited.allows_retry(3));
    }

    #[test]
    fn test_from_toml() {
        let toml = RetryToml {
            initial_delay_ms: 250,
            max_delay_ms: 4000,
            max_attempts: Some(7),
        };
        let policy = RetryPolicy::from(&toml);
        assert_eq!(policy.initial_delay, Duration::from_millis(250));
        assert_eq!(policy.max_attempts, Some(7));
    }
}
