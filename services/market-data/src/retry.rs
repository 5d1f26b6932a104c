//! Retry/backoff policy for gateway fetches
//!
//! One policy object replaces the per-call-site retry loops: bounded
//! attempts, exponential backoff with a cap, composed with the circuit
//! breaker. Only transient failures retry; a rate limit waits the full
//! backoff; an open circuit aborts immediately.

use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, warn};

use services_common::{GatewayError, RetryConfig};

use crate::circuit_breaker::{BreakerOutcome, CircuitBreaker};

/// Upstream endpoint class, used for breaker naming and log context
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EndpointClass {
    Ticker,
    Ohlcv,
    Trades,
    Orderbook,
    OpenInterest,
}

impl EndpointClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            EndpointClass::Ticker => "ticker",
            EndpointClass::Ohlcv => "ohlcv",
            EndpointClass::Trades => "trades",
            EndpointClass::Orderbook => "orderbook",
            EndpointClass::OpenInterest => "open_interest",
        }
    }
}

/// Bounded-attempt retry with exponential backoff
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    class: EndpointClass,
    config: RetryConfig,
}

impl RetryPolicy {
    pub fn new(class: EndpointClass, config: RetryConfig) -> Self {
        Self { class, config }
    }

    /// Backoff before the attempt following `attempt` (1-based)
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = self
            .config
            .backoff_multiplier
            .powi(attempt.saturating_sub(1) as i32);
        let ms = (self.config.initial_backoff_ms as f64 * factor) as u64;
        Duration::from_millis(ms.min(self.config.max_backoff_ms))
    }

    /// Whether this error class is worth another attempt
    fn should_retry(err: &GatewayError) -> bool {
        err.is_transient() || matches!(err, GatewayError::RateLimited(_))
    }

    /// Run `op` through the breaker with bounded retries.
    pub async fn run<T, F, Fut>(&self, breaker: &CircuitBreaker, mut op: F) -> BreakerOutcome<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, GatewayError>>,
    {
        let mut attempt = 0;
        loop {
            attempt += 1;
            match breaker.call(op()).await {
                BreakerOutcome::Ok(value) => return BreakerOutcome::Ok(value),
                BreakerOutcome::CircuitOpen => {
                    debug!(
                        endpoint = self.class.as_str(),
                        breaker = breaker.name(),
                        "circuit open, not attempting"
                    );
                    return BreakerOutcome::CircuitOpen;
                }
                BreakerOutcome::Failed(err) => {
                    if !Self::should_retry(&err) || attempt >= self.config.max_attempts {
                        return BreakerOutcome::Failed(err);
                    }
                    let delay = self.backoff(attempt);
                    warn!(
                        endpoint = self.class.as_str(),
                        attempt,
                        max_attempts = self.config.max_attempts,
                        ?delay,
                        error = %err,
                        "fetch failed, retrying"
                    );
                    sleep(delay).await;
                }
            }
        }
    }
}
