//! Circuit breaker with half-open recovery probing
//!
//! One breaker per upstream endpoint, shared across call-sites through an
//! explicit [`CircuitBreakerRegistry`] that is constructed once and passed by
//! reference — no process-global state. A blocked call is expected control
//! flow, so it is a [`BreakerOutcome`] variant rather than an error.

use dashmap::DashMap;
use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{info, warn};

use services_common::{BreakerConfig, GatewayError};

/// Breaker state per named dependency
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum CircuitState {
    /// Calls pass through; consecutive failures are counted
    Closed,
    /// Calls are rejected until the recovery timeout elapses
    Open,
    /// One trial call at a time is allowed through
    HalfOpen,
}

/// Result of a breaker-guarded call
#[derive(Debug)]
pub enum BreakerOutcome<T> {
    /// The call went through and succeeded
    Ok(T),
    /// The breaker rejected the call without executing it
    CircuitOpen,
    /// The call went through and failed
    Failed(GatewayError),
}

impl<T> BreakerOutcome<T> {
    pub fn ok(self) -> Option<T> {
        match self {
            BreakerOutcome::Ok(v) => Some(v),
            _ => None,
        }
    }

    pub fn is_circuit_open(&self) -> bool {
        matches!(self, BreakerOutcome::CircuitOpen)
    }
}

/// Observability snapshot of one breaker
#[derive(Debug, Clone, Serialize)]
pub struct BreakerSnapshot {
    pub state: CircuitState,
    pub consecutive_failures: u32,
    /// Seconds until an open circuit allows a probe; zero when not open
    pub seconds_until_probe: u64,
}

#[derive(Debug)]
struct BreakerInner {
    state: CircuitState,
    consecutive_failures: u32,
    half_open_successes: u32,
    /// Last state-change or failure time; gates Open -> HalfOpen
    changed_at: Instant,
    probe_in_flight: bool,
}

pub struct CircuitBreaker {
    name: String,
    config: BreakerConfig,
    inner: Mutex<BreakerInner>,
}

impl CircuitBreaker {
    pub fn new(name: impl Into<String>, config: BreakerConfig) -> Self {
        Self {
            name: name.into(),
            config,
            inner: Mutex::new(BreakerInner {
                state: CircuitState::Closed,
                consecutive_failures: 0,
                half_open_successes: 0,
                changed_at: Instant::now(),
                probe_in_flight: false,
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn state(&self) -> CircuitState {
        self.inner.lock().state
    }

    fn recovery_timeout(&self) -> Duration {
        Duration::from_secs(self.config.recovery_timeout_secs)
    }

    /// Decide whether a call may proceed right now. An open circuit whose
    /// recovery timeout has elapsed moves to half-open and admits the caller
    /// as the probe; a stale half-open probe (caller cancelled mid-flight)
    /// is taken over after another recovery timeout.
    fn try_acquire(&self) -> bool {
        let mut inner = self.inner.lock();
        match inner.state {
            CircuitState::Closed => true,
            CircuitState::Open => {
                if inner.changed_at.elapsed() >= self.recovery_timeout() {
                    inner.state = CircuitState::HalfOpen;
                    inner.half_open_successes = 0;
                    inner.probe_in_flight = true;
                    inner.changed_at = Instant::now();
                    info!(breaker = %self.name, "circuit half-open, probing");
                    true
                } else {
                    false
                }
            }
            CircuitState::HalfOpen => {
                if !inner.probe_in_flight {
                    inner.probe_in_flight = true;
                    true
                } else if inner.changed_at.elapsed() >= self.recovery_timeout() {
                    // Stale probe; admit a replacement
                    inner.changed_at = Instant::now();
                    true
                } else {
                    false
                }
            }
        }
    }

    pub fn record_success(&self) {
        let mut inner = self.inner.lock();
        match inner.state {
            CircuitState::Closed => {
                inner.consecutive_failures = 0;
            }
            CircuitState::HalfOpen => {
                inner.probe_in_flight = false;
                inner.half_open_successes += 1;
                if inner.half_open_successes >= self.config.half_open_successes_to_close {
                    inner.state = CircuitState::Closed;
                    inner.consecutive_failures = 0;
                    inner.half_open_successes = 0;
                    inner.changed_at = Instant::now();
                    info!(breaker = %self.name, "circuit closed");
                }
            }
            // Success arriving for a call that started before the reopen
            CircuitState::Open => {}
        }
    }

    pub fn record_failure(&self) {
        let mut inner = self.inner.lock();
        match inner.state {
            CircuitState::Closed => {
                inner.consecutive_failures += 1;
                if inner.consecutive_failures >= self.config.failure_threshold {
                    inner.state = CircuitState::Open;
                    inner.changed_at = Instant::now();
                    warn!(
                        breaker = %self.name,
                        failures = inner.consecutive_failures,
                        "circuit opened"
                    );
                }
            }
            CircuitState::HalfOpen => {
                inner.probe_in_flight = false;
                inner.half_open_successes = 0;
                inner.state = CircuitState::Open;
                inner.changed_at = Instant::now();
                warn!(breaker = %self.name, "probe failed, circuit re-opened");
            }
            CircuitState::Open => {
                // Refresh the recovery timer; timeout counts from last failure
                inner.changed_at = Instant::now();
            }
        }
    }

    /// Operator escape hatch: force closed and clear counters
    pub fn reset(&self) {
        let mut inner = self.inner.lock();
        inner.state = CircuitState::Closed;
        inner.consecutive_failures = 0;
        inner.half_open_successes = 0;
        inner.probe_in_flight = false;
        inner.changed_at = Instant::now();
        info!(breaker = %self.name, "circuit manually reset");
    }

    pub fn snapshot(&self) -> BreakerSnapshot {
        let inner = self.inner.lock();
        let seconds_until_probe = match inner.state {
            CircuitState::Open => self
                .recovery_timeout()
                .saturating_sub(inner.changed_at.elapsed())
                .as_secs(),
            _ => 0,
        };
        BreakerSnapshot {
            state: inner.state,
            consecutive_failures: inner.consecutive_failures,
            seconds_until_probe,
        }
    }

    /// Run `fut` through the breaker, recording the outcome.
    pub async fn call<T, F>(&self, fut: F) -> BreakerOutcome<T>
    where
        F: Future<Output = Result<T, GatewayError>>,
    {
        if !self.try_acquire() {
            return BreakerOutcome::CircuitOpen;
        }
        match fut.await {
            Ok(value) => {
                self.record_success();
                BreakerOutcome::Ok(value)
            }
            Err(err) => {
                self.record_failure();
                BreakerOutcome::Failed(err)
            }
        }
    }
}

/// Keyed get-or-create registry so call-sites share breaker state per
/// upstream endpoint
pub struct CircuitBreakerRegistry {
    config: BreakerConfig,
    breakers: DashMap<String, Arc<CircuitBreaker>>,
}

impl CircuitBreakerRegistry {
    pub fn new(config: BreakerConfig) -> Self {
        Self {
            config,
            breakers: DashMap::new(),
        }
    }

    pub fn get_or_create(&self, name: &str) -> Arc<CircuitBreaker> {
        self.breakers
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(CircuitBreaker::new(name, self.config)))
            .clone()
    }

    /// Snapshot of every known breaker, for observability
    pub fn states(&self) -> FxHashMap<String, BreakerSnapshot> {
        self.breakers
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().snapshot()))
            .collect()
    }

    pub fn reset_all(&self) {
        for entry in self.breakers.iter() {
            entry.value().reset();
        }
    }
}
