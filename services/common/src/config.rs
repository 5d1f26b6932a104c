//! Engine configuration
//!
//! One immutable configuration tree supplied at startup. Loading (files,
//! env) is owned by embedders; defaults come from [`crate::constants`].

use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

use crate::constants::{breaker, cache, monitor, resources, retry, scoring};
use crate::types::market::Timeframe;
use crate::types::score::Component;

/// Top-level engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Symbols tracked by the monitoring loop
    pub symbols: Vec<String>,

    /// Timeframes fetched per symbol
    pub timeframes: Vec<Timeframe>,

    /// Scoring weights and thresholds
    pub scoring: ScoringConfig,

    /// Circuit breaker settings
    pub breaker: BreakerConfig,

    /// Retry/backoff settings
    pub retry: RetryConfig,

    /// Resource manager limits
    pub resources: ResourceConfig,

    /// Market data cache settings
    pub market_data: MarketDataConfig,

    /// Result cache settings
    pub result_cache: ResultCacheConfig,

    /// Monitoring loop settings
    pub monitor: MonitorConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            symbols: vec!["BTCUSDT".to_string(), "ETHUSDT".to_string()],
            timeframes: vec![Timeframe::M5, Timeframe::M15, Timeframe::H1, Timeframe::H4],
            scoring: ScoringConfig::default(),
            breaker: BreakerConfig::default(),
            retry: RetryConfig::default(),
            resources: ResourceConfig::default(),
            market_data: MarketDataConfig::default(),
            result_cache: ResultCacheConfig::default(),
            monitor: MonitorConfig::default(),
        }
    }
}

/// Scoring weights and the quality-adjustment constants
///
/// `consensus_damping` and the neutral blend are empirically calibrated;
/// they are configuration, not derived values, so backtests can tune them
/// without code changes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoringConfig {
    /// Per-component weights, designed to sum to 1; renormalized over the
    /// available subset at aggregation time
    pub weights: FxHashMap<Component, f64>,

    /// Damping coefficient `k` in `consensus = exp(-k * variance)`
    pub consensus_damping: f64,

    /// Adjusted score at or above this labels the signal bullish
    pub buy_threshold: f64,

    /// Adjusted score at or below this labels the signal bearish
    pub sell_threshold: f64,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        let mut weights = FxHashMap::default();
        weights.insert(Component::Technical, 0.25);
        weights.insert(Component::Volume, 0.15);
        weights.insert(Component::Orderflow, 0.20);
        weights.insert(Component::Orderbook, 0.15);
        weights.insert(Component::Sentiment, 0.10);
        weights.insert(Component::PriceStructure, 0.15);
        Self {
            weights,
            consensus_damping: scoring::CONSENSUS_DAMPING,
            buy_threshold: scoring::BUY_THRESHOLD,
            sell_threshold: scoring::SELL_THRESHOLD,
        }
    }
}

/// Circuit breaker settings, shared by all per-dependency breakers
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct BreakerConfig {
    /// Consecutive failures that open the circuit
    pub failure_threshold: u32,

    /// Seconds the circuit stays open before a recovery probe
    pub recovery_timeout_secs: u64,

    /// Consecutive half-open successes required to close
    pub half_open_successes_to_close: u32,
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: breaker::FAILURE_THRESHOLD,
            recovery_timeout_secs: breaker::RECOVERY_TIMEOUT_SECS,
            half_open_successes_to_close: breaker::HALF_OPEN_SUCCESSES_TO_CLOSE,
        }
    }
}

/// Retry/backoff settings applied per endpoint class
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Attempts per fetch, first attempt included
    pub max_attempts: u32,
    pub initial_backoff_ms: u64,
    pub backoff_multiplier: f64,
    pub max_backoff_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: retry::MAX_ATTEMPTS,
            initial_backoff_ms: retry::INITIAL_BACKOFF_MS,
            backoff_multiplier: retry::BACKOFF_MULTIPLIER,
            max_backoff_ms: retry::MAX_BACKOFF_MS,
        }
    }
}

/// Resource manager limits
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ResourceConfig {
    pub max_tasks: usize,
    pub max_connections: usize,
    /// Ceiling for a single task's memory hint, megabytes
    pub max_task_memory_mb: u64,
    /// Ceiling for the sum of tracked memory hints, megabytes
    pub max_total_memory_mb: u64,
    /// Stats sampling period, seconds
    pub monitor_interval_secs: u64,
    /// Warn above this memory utilization percentage
    pub memory_warn_pct: f64,
    /// Warn above this task-saturation percentage
    pub load_warn_pct: f64,
}

impl Default for ResourceConfig {
    fn default() -> Self {
        Self {
            max_tasks: resources::MAX_TASKS,
            max_connections: resources::MAX_CONNECTIONS,
            max_task_memory_mb: resources::MAX_TASK_MEMORY_MB,
            max_total_memory_mb: resources::MAX_TOTAL_MEMORY_MB,
            monitor_interval_secs: resources::MONITOR_INTERVAL_SECS,
            memory_warn_pct: resources::MEMORY_WARN_PCT,
            load_warn_pct: resources::LOAD_WARN_PCT,
        }
    }
}

/// Market data cache settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarketDataConfig {
    /// Freshness window overrides in seconds, keyed by timeframe; anything
    /// absent uses `Timeframe::default_freshness_secs`
    pub freshness_overrides_secs: FxHashMap<Timeframe, u64>,

    /// Bars requested per OHLCV fetch
    pub ohlcv_limit: usize,

    /// Orderbook depth per side
    pub orderbook_depth: usize,

    /// Recent trades requested per fetch
    pub trades_limit: usize,

    /// Synthesize a finer series from a fresh coarser one when the finer
    /// fetch fails (result is flagged synthetic)
    pub enable_resample_fallback: bool,
}

impl Default for MarketDataConfig {
    fn default() -> Self {
        Self {
            freshness_overrides_secs: FxHashMap::default(),
            ohlcv_limit: cache::OHLCV_LIMIT,
            orderbook_depth: cache::ORDERBOOK_DEPTH,
            trades_limit: cache::TRADES_LIMIT,
            enable_resample_fallback: true,
        }
    }
}

impl MarketDataConfig {
    /// Effective freshness window for a timeframe
    pub fn freshness_secs(&self, timeframe: Timeframe) -> u64 {
        self.freshness_overrides_secs
            .get(&timeframe)
            .copied()
            .unwrap_or_else(|| timeframe.default_freshness_secs())
    }
}

/// Result cache settings
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ResultCacheConfig {
    pub ttl_secs: u64,
    pub cleanup_interval_secs: u64,
}

impl Default for ResultCacheConfig {
    fn default() -> Self {
        Self {
            ttl_secs: cache::RESULT_TTL_SECS,
            cleanup_interval_secs: cache::CLEANUP_INTERVAL_SECS,
        }
    }
}

/// Monitoring loop settings
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct MonitorConfig {
    /// Target period between cycles, seconds
    pub cycle_interval_secs: u64,
    /// Hard timeout for one full cycle, seconds
    pub cycle_timeout_secs: u64,
    /// Backoff cap after repeated cycle timeouts, seconds
    pub max_backoff_secs: u64,
    /// Quiet period after which the error counter decays by one, seconds
    pub error_decay_after_secs: u64,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            cycle_interval_secs: monitor::CYCLE_INTERVAL_SECS,
            cycle_timeout_secs: monitor::CYCLE_TIMEOUT_SECS,
            max_backoff_secs: monitor::MAX_BACKOFF_SECS,
            error_decay_after_secs: monitor::ERROR_DECAY_AFTER_SECS,
        }
    }
}
