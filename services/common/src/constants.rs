//! Engine-wide default constants
//!
//! Single source of truth for all magic numbers; the configuration tree in
//! [`crate::config`] derives its `Default` impls from these values.

/// Circuit breaker defaults
pub mod breaker {
    /// Consecutive failures that open a circuit
    pub const FAILURE_THRESHOLD: u32 = 5;
    /// Seconds a circuit stays open before a recovery probe is allowed
    pub const RECOVERY_TIMEOUT_SECS: u64 = 30;
    /// Consecutive half-open probe successes required to close the circuit
    pub const HALF_OPEN_SUCCESSES_TO_CLOSE: u32 = 2;
}

/// Retry/backoff defaults
pub mod retry {
    /// Bounded attempt count per fetch (first attempt included)
    pub const MAX_ATTEMPTS: u32 = 3;
    pub const INITIAL_BACKOFF_MS: u64 = 250;
    pub const BACKOFF_MULTIPLIER: f64 = 2.0;
    pub const MAX_BACKOFF_MS: u64 = 5_000;
}

/// Resource manager defaults
pub mod resources {
    pub const MAX_TASKS: usize = 64;
    pub const MAX_CONNECTIONS: usize = 32;
    /// Per-task memory hint ceiling in megabytes
    pub const MAX_TASK_MEMORY_MB: u64 = 256;
    /// Total tracked memory ceiling in megabytes
    pub const MAX_TOTAL_MEMORY_MB: u64 = 2_048;
    pub const MONITOR_INTERVAL_SECS: u64 = 10;
    /// Warn when tracked memory exceeds this share of the ceiling
    pub const MEMORY_WARN_PCT: f64 = 85.0;
    /// Warn when active tasks exceed this share of `MAX_TASKS`
    pub const LOAD_WARN_PCT: f64 = 90.0;
}

/// Cache defaults
pub mod cache {
    /// Result cache TTL, tuned to the monitoring cycle interval
    pub const RESULT_TTL_SECS: u64 = 15;
    pub const CLEANUP_INTERVAL_SECS: u64 = 30;
    /// Open-interest history ring capacity (newest-first)
    pub const OI_HISTORY_CAP: usize = 500;
    /// Floor for per-timeframe freshness windows
    pub const MIN_FRESHNESS_SECS: u64 = 30;
    pub const OHLCV_LIMIT: usize = 100;
    pub const ORDERBOOK_DEPTH: usize = 20;
    pub const TRADES_LIMIT: usize = 200;
}

/// Scoring defaults
pub mod scoring {
    pub const SCORE_MIN: f64 = 0.0;
    pub const SCORE_MAX: f64 = 100.0;
    /// Neutral midpoint of the component score scale
    pub const NEUTRAL_SCORE: f64 = 50.0;
    /// Empirically tuned damping coefficient in `consensus = exp(-k * variance)`.
    /// Calibrated against backtests; changing it alters signal semantics.
    pub const CONSENSUS_DAMPING: f64 = 2.0;
    pub const BUY_THRESHOLD: f64 = 60.0;
    pub const SELL_THRESHOLD: f64 = 40.0;
}

/// Monitoring loop defaults
pub mod monitor {
    pub const CYCLE_INTERVAL_SECS: u64 = 30;
    /// Hard timeout on one full cycle across all symbols
    pub const CYCLE_TIMEOUT_SECS: u64 = 45;
    pub const MAX_BACKOFF_SECS: u64 = 300;
    /// Quiet period after which the cycle error counter decays by one
    pub const ERROR_DECAY_AFTER_SECS: u64 = 600;
    /// Per-component lifecycle history cap
    pub const LIFECYCLE_HISTORY_CAP: usize = 1_000;
}
