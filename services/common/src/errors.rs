//! Common error types for services

use thiserror::Error;

/// Errors surfaced by the exchange gateway contract
#[derive(Debug, Clone, Error)]
pub enum GatewayError {
    /// Request exceeded its deadline
    #[error("request timed out: {0}")]
    Timeout(String),

    /// Upstream rejected the request for rate-limit reasons
    #[error("rate limited: {0}")]
    RateLimited(String),

    /// Transport-level connection failure
    #[error("connection failed: {0}")]
    ConnectionFailed(String),

    /// Response could not be decoded into the expected shape
    #[error("malformed response: {0}")]
    MalformedResponse(String),

    /// Symbol is not available on this exchange
    #[error("symbol not supported: {0}")]
    SymbolNotSupported(String),
}

impl GatewayError {
    /// Whether a retry of the same request can reasonably succeed.
    ///
    /// Rate limits are handled separately (backoff, never immediate retry);
    /// malformed responses and unsupported symbols never retry.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Timeout(_) | Self::ConnectionFailed(_))
    }
}

/// Resource allocation failures
#[derive(Debug, Clone, Error)]
pub enum ResourceError {
    #[error("task limit exceeded: {active} active, limit {limit}")]
    TaskLimitExceeded { active: usize, limit: usize },

    #[error("connection limit exceeded: {active} active, limit {limit}")]
    ConnectionLimitExceeded { active: usize, limit: usize },

    #[error("memory limit exceeded: {requested_mb} MB requested, {available_mb} MB available")]
    MemoryLimitExceeded { requested_mb: u64, available_mb: u64 },
}

/// Data quality failures, contained at the scorer boundary
#[derive(Debug, Clone, Error)]
pub enum DataQualityError {
    #[error("insufficient data: {0}")]
    InsufficientData(String),

    #[error("value out of range: {0}")]
    OutOfRange(String),
}
