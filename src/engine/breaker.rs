use super::guard;
use crate::error::{BreakerError, CircuitOpenError};
use std::future::Future;
use std::sync::Mutex;
use std::time::Duration;
use tokio::time::Instant;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BreakerPhase {
    Closed,
    Open,
    HalfOpen,
}

#[derive(Debug, Clone, Copy)]
pub struct BreakerConfig {
    pub failure_threshold: u32,
    pub cooldown: Duration,
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 3,
            cooldown: Duration::from_secs(30),
        }
    }
}

#[derive(Debug)]
struct BreakerState {
    phase: BreakerPhase,
    consecutive_failures: u32,
    opened_at: Option<Instant>,
    probe_in_flight: bool,
}

/// Process-wide breaker in front of the content adapter.
///
/// `Closed -> Open` after `failure_threshold` consecutive failures. While open,
/// calls are refused without invoking the operation. Once `cooldown` has
/// elapsed the next call becomes the single half-open probe: success closes
/// the breaker, failure re-opens it with a fresh cooldown. Other calls that
/// arrive while the probe is outstanding are refused.
pub struct CircuitBreaker {
    config: BreakerConfig,
    state: Mutex<BreakerState>,
}

/// Puts the breaker back to Open if a half-open probe is dropped unfinished.
struct ProbeGuard<'a> {
    breaker: &'a CircuitBreaker,
    armed: bool,
}

impl Drop for ProbeGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            let mut st = guard(&self.breaker.state);
            st.probe_in_flight = false;
            st.phase = BreakerPhase::Open;
        }
    }
}

impl CircuitBreaker {
    pub fn new(config: BreakerConfig) -> Self {
        Self {
            config,
            state: Mutex::new(BreakerState {
                phase: BreakerPhase::Closed,
                consecutive_failures: 0,
                opened_at: None,
                probe_in_flight: false,
            }),
        }
    }

    pub fn phase(&self) -> BreakerPhase {
        guard(&self.state).phase
    }

    pub fn consecutive_failures(&self) -> u32 {
        guard(&self.state).consecutive_failures
    }

    pub fn opened_at(&self) -> Option<Instant> {
        guard(&self.state).opened_at
    }

    /// Run `op` unless the breaker is open.
    pub async fn call<T, E, F, Fut>(&self, op: F) -> Result<T, BreakerError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let is_probe = self.admit().map_err(BreakerError::Open)?;
        let mut probe = ProbeGuard {
            breaker: self,
            armed: is_probe,
        };

        let result = op().await;
        probe.armed = false;

        match result {
            Ok(value) => {
                self.record_success();
                Ok(value)
            }
            Err(e) => {
                self.record_failure();
                Err(BreakerError::Inner(e))
            }
        }
    }

    /// Returns `Ok(true)` when the admitted call is the half-open probe.
    fn admit(&self) -> Result<bool, CircuitOpenError> {
        let mut st = guard(&self.state);
        match st.phase {
            BreakerPhase::Closed => Ok(false),
            BreakerPhase::Open => {
                let elapsed = st
                    .opened_at
                    .map(|at| at.elapsed())
                    .unwrap_or(self.config.cooldown);
                if elapsed < self.config.cooldown {
                    tracing::debug!(retry_in = ?(self.config.cooldown - elapsed), "breaker open, call refused");
                    return Err(CircuitOpenError {
                        retry_in: self.config.cooldown - elapsed,
                    });
                }
                st.phase = BreakerPhase::HalfOpen;
                st.probe_in_flight = true;
                tracing::info!("breaker half-open, probing");
                Ok(true)
            }
            BreakerPhase::HalfOpen => {
                if st.probe_in_flight {
                    return Err(CircuitOpenError {
                        retry_in: Duration::ZERO,
                    });
                }
                st.probe_in_flight = true;
                Ok(true)
            }
        }
    }

    fn record_success(&self) {
        let mut st = guard(&self.state);
        st.consecutive_failures = 0;
        if st.phase == BreakerPhase::HalfOpen {
            st.phase = BreakerPhase::Closed;
            st.opened_at = None;
            st.probe_in_flight = false;
            tracing::info!("breaker closed after successful probe");
        }
    }

    fn record_failure(&self) {
        let mut st = guard(&self.state);
        st.consecutive_failures = st.consecutive_failures.saturating_add(1);
        match st.phase {
            BreakerPhase::HalfOpen => {
                st.phase = BreakerPhase::Open;
                st.opened_at = Some(Instant::now());
                st.probe_in_flight = false;
                tracing::warn!(failures = st.consecutive_failures, "probe failed, breaker re-opened");
            }
            BreakerPhase::Closed if st.consecutive_failures >= self.config.failure_threshold => {
                st.phase = BreakerPhase::Open;
                st.opened_at = Some(Instant::now());
                tracing::warn!(
                    failures = st.consecutive_failures,
                    cooldown_s = self.config.cooldown.as_secs(),
                    "breaker opened"
                );
            }
            _ => {}
        }
    }
}
