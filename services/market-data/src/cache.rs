//! Market data cache
//!
//! Per-symbol snapshot store. A refresh fetches every configured feed
//! independently — each one breaker-guarded and retried on its own — then
//! swaps the assembled snapshot in atomically, so a cancelled or failed
//! refresh can never leave a half-updated snapshot behind.

use chrono::Utc;
use rustc_hash::FxHashMap;
use serde::Serialize;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use services_common::{
    MarketDataConfig, MarketSnapshot, OhlcvBar, OhlcvSeries, OpenInterest, ResourceError,
    RetryConfig, Timeframe,
};

use crate::circuit_breaker::{BreakerOutcome, CircuitBreakerRegistry};
use crate::gateway::ExchangeGateway;
use crate::resources::ResourceManager;
use crate::retry::{EndpointClass, RetryPolicy};

/// Memory hint registered per in-flight refresh
const REFRESH_TASK_MEMORY_HINT_MB: u64 = 8;

/// Cache-level counters snapshot
#[derive(Debug, Clone, Copy, Serialize)]
pub struct MarketDataCacheStats {
    pub symbols: usize,
    pub refreshes: u64,
    pub feed_failures: u64,
    pub circuit_rejections: u64,
    pub synthetic_series: u64,
}

#[derive(Default)]
struct Counters {
    refreshes: AtomicU64,
    feed_failures: AtomicU64,
    circuit_rejections: AtomicU64,
    synthetic_series: AtomicU64,
}

/// Per-feed outcome summary for one refresh
#[derive(Debug, Clone, Default)]
pub struct RefreshReport {
    pub symbol: String,
    /// Feeds fetched fresh from the gateway
    pub fetched: Vec<String>,
    /// Feeds reused from the previous snapshot within their freshness window
    pub reused: Vec<String>,
    /// Feeds whose fetch failed after retries
    pub failed: Vec<String>,
    /// Feeds skipped because their circuit was open
    pub skipped_circuit_open: Vec<String>,
    /// Timeframes filled by resampling a coarser series
    pub synthetic: Vec<Timeframe>,
}

impl RefreshReport {
    fn new(symbol: &str) -> Self {
        Self {
            symbol: symbol.to_string(),
            ..Self::default()
        }
    }
}

pub struct MarketDataCache {
    config: MarketDataConfig,
    timeframes: Vec<Timeframe>,
    retry: RetryConfig,
    gateway: Arc<dyn ExchangeGateway>,
    breakers: Arc<CircuitBreakerRegistry>,
    resources: Arc<ResourceManager>,
    snapshots: RwLock<FxHashMap<String, MarketSnapshot>>,
    counters: Counters,
}

impl MarketDataCache {
    pub fn new(
        config: MarketDataConfig,
        timeframes: Vec<Timeframe>,
        retry: RetryConfig,
        gateway: Arc<dyn ExchangeGateway>,
        breakers: Arc<CircuitBreakerRegistry>,
        resources: Arc<ResourceManager>,
    ) -> Self {
        Self {
            config,
            timeframes,
            retry,
            gateway,
            breakers,
            resources,
            snapshots: RwLock::new(FxHashMap::default()),
            counters: Counters::default(),
        }
    }

    /// Current snapshot for a symbol
    pub async fn snapshot(&self, symbol: &str) -> Option<MarketSnapshot> {
        self.snapshots.read().await.get(symbol).cloned()
    }

    pub async fn stats(&self) -> MarketDataCacheStats {
        MarketDataCacheStats {
            symbols: self.snapshots.read().await.len(),
            refreshes: self.counters.refreshes.load(Ordering::Relaxed),
            feed_failures: self.counters.feed_failures.load(Ordering::Relaxed),
            circuit_rejections: self.counters.circuit_rejections.load(Ordering::Relaxed),
            synthetic_series: self.counters.synthetic_series.load(Ordering::Relaxed),
        }
    }

    /// Refresh every feed for one symbol and swap in the new snapshot.
    ///
    /// Fails only on resource exhaustion (the caller skips this symbol's
    /// cycle); individual feed failures are absorbed into the report.
    pub async fn refresh(&self, symbol: &str) -> Result<RefreshReport, ResourceError> {
        let lease = self
            .resources
            .acquire_task(
                &format!("refresh:{symbol}"),
                Some(REFRESH_TASK_MEMORY_HINT_MB),
            )
            .await?;
        self.counters.refreshes.fetch_add(1, Ordering::Relaxed);
        let report = self.refresh_inner(symbol).await;
        lease.release().await;
        Ok(report)
    }

    async fn refresh_inner(&self, symbol: &str) -> RefreshReport {
        let now = Utc::now();
        let prev = self.snapshot(symbol).await;
        let mut snap = MarketSnapshot::new(symbol, now);
        let mut report = RefreshReport::new(symbol);

        self.refresh_ohlcv(symbol, prev.as_ref(), &mut snap, &mut report)
            .await;
        self.fill_resampled(&mut snap, &mut report);
        self.refresh_orderbook(symbol, &mut snap, &mut report).await;
        self.refresh_trades(symbol, &mut snap, &mut report).await;
        self.refresh_ticker(symbol, &mut snap, &mut report).await;
        self.refresh_open_interest(symbol, prev.as_ref(), &mut snap, &mut report)
            .await;

        debug!(
            symbol,
            fetched = report.fetched.len(),
            reused = report.reused.len(),
            failed = report.failed.len(),
            circuit_open = report.skipped_circuit_open.len(),
            "snapshot refreshed"
        );

        // Atomic swap: readers see either the old snapshot or this one
        self.snapshots
            .write()
            .await
            .insert(symbol.to_string(), snap);
        report
    }

    async fn refresh_ohlcv(
        &self,
        symbol: &str,
        prev: Option<&MarketSnapshot>,
        snap: &mut MarketSnapshot,
        report: &mut RefreshReport,
    ) {
        let now = snap.ts;
        let policy = RetryPolicy::new(EndpointClass::Ohlcv, self.retry);
        for tf in &self.timeframes {
            let label = format!("ohlcv:{}", tf.as_str());
            if let Some(prev_series) = prev.and_then(|p| p.series(*tf)) {
                if !prev_series.synthetic
                    && prev_series.is_fresh(now, self.config.freshness_secs(*tf))
                {
                    snap.series.insert(*tf, prev_series.clone());
                    report.reused.push(label);
                    continue;
                }
            }
            let breaker = self.breakers.get_or_create(&format!("gateway:{label}"));
            let outcome = policy
                .run(&breaker, || {
                    self.gateway
                        .fetch_ohlcv(symbol, *tf, self.config.ohlcv_limit)
                })
                .await;
            match outcome {
                BreakerOutcome::Ok(bars) => {
                    snap.series.insert(*tf, OhlcvSeries::new(*tf, bars));
                    report.fetched.push(label);
                }
                BreakerOutcome::CircuitOpen => {
                    self.counters
                        .circuit_rejections
                        .fetch_add(1, Ordering::Relaxed);
                    self.carry_stale_series(symbol, prev, *tf, snap);
                    report.skipped_circuit_open.push(label);
                }
                BreakerOutcome::Failed(err) => {
                    self.counters.feed_failures.fetch_add(1, Ordering::Relaxed);
                    warn!(symbol, timeframe = tf.as_str(), error = %err, "ohlcv fetch failed");
                    self.carry_stale_series(symbol, prev, *tf, snap);
                    report.failed.push(label);
                }
            }
        }
    }

    /// Keep the previous series (stale, possibly synthetic) rather than
    /// dropping the timeframe entirely; its `fetched_at` still tells
    /// consumers how old it is.
    fn carry_stale_series(
        &self,
        symbol: &str,
        prev: Option<&MarketSnapshot>,
        tf: Timeframe,
        snap: &mut MarketSnapshot,
    ) {
        if let Some(prev_series) = prev.and_then(|p| p.series(tf)) {
            debug!(symbol, timeframe = tf.as_str(), "carrying stale series");
            snap.series.insert(tf, prev_series.clone());
        }
    }

    /// Synthesize missing finer timeframes from a fresh coarser series.
    /// The result is flagged synthetic so scorers discount it.
    fn fill_resampled(&self, snap: &mut MarketSnapshot, report: &mut RefreshReport) {
        if !self.config.enable_resample_fallback {
            return;
        }
        let now = snap.ts;
        for tf in &self.timeframes {
            if snap.series.contains_key(tf) {
                continue;
            }
            let source = self.timeframes.iter().find_map(|src| {
                let series = snap.series.get(src)?;
                let usable = !series.synthetic
                    && series.is_fresh(now, self.config.freshness_secs(*src))
                    && series.timeframe.duration_seconds() > tf.duration_seconds()
                    && series.timeframe.duration_seconds() % tf.duration_seconds() == 0;
                usable.then(|| series.clone())
            });
            if let Some(source) = source {
                if let Some(synthetic) = resample_series(&source, *tf) {
                    info!(
                        symbol = %snap.symbol,
                        target = tf.as_str(),
                        source = source.timeframe.as_str(),
                        "synthesized series from coarser timeframe"
                    );
                    self.counters
                        .synthetic_series
                        .fetch_add(1, Ordering::Relaxed);
                    snap.series.insert(*tf, synthetic);
                    report.synthetic.push(*tf);
                }
            }
        }
    }

    async fn refresh_orderbook(
        &self,
        symbol: &str,
        snap: &mut MarketSnapshot,
        report: &mut RefreshReport,
    ) {
        let policy = RetryPolicy::new(EndpointClass::Orderbook, self.retry);
        let breaker = self.breakers.get_or_create("gateway:orderbook");
        let outcome = policy
            .run(&breaker, || {
                self.gateway
                    .fetch_orderbook(symbol, self.config.orderbook_depth)
            })
            .await;
        snap.orderbook = self.unpack_feed(symbol, "orderbook", outcome, report);
    }

    async fn refresh_trades(
        &self,
        symbol: &str,
        snap: &mut MarketSnapshot,
        report: &mut RefreshReport,
    ) {
        let policy = RetryPolicy::new(EndpointClass::Trades, self.retry);
        let breaker = self.breakers.get_or_create("gateway:trades");
        let outcome = policy
            .run(&breaker, || {
                self.gateway.fetch_trades(symbol, self.config.trades_limit)
            })
            .await;
        snap.trades = self.unpack_feed(symbol, "trades", outcome, report);
    }

    async fn refresh_ticker(
        &self,
        symbol: &str,
        snap: &mut MarketSnapshot,
        report: &mut RefreshReport,
    ) {
        let policy = RetryPolicy::new(EndpointClass::Ticker, self.retry);
        let breaker = self.breakers.get_or_create("gateway:ticker");
        let outcome = policy
            .run(&breaker, || self.gateway.fetch_ticker(symbol))
            .await;
        snap.ticker = self.unpack_feed(symbol, "ticker", outcome, report);
    }

    async fn refresh_open_interest(
        &self,
        symbol: &str,
        prev: Option<&MarketSnapshot>,
        snap: &mut MarketSnapshot,
        report: &mut RefreshReport,
    ) {
        let policy = RetryPolicy::new(EndpointClass::OpenInterest, self.retry);
        let breaker = self.breakers.get_or_create("gateway:open_interest");
        // Open interest is cumulative state: carry it across refreshes and
        // fold new readings in, instead of rebuilding from scratch
        let mut oi = prev.and_then(|p| p.open_interest.clone());
        let outcome = policy
            .run(&breaker, || self.gateway.fetch_open_interest(symbol))
            .await;
        if let Some(value) = self.unpack_feed(symbol, "open_interest", outcome, report) {
            match oi.as_mut() {
                Some(state) => state.apply_reading(value, snap.ts),
                None => oi = Some(OpenInterest::new(value, snap.ts)),
            }
        }
        snap.open_interest = oi;
    }

    /// Common outcome handling for the single-shot feeds: success yields the
    /// value, circuit-open and failure yield `None` and update counters.
    fn unpack_feed<T>(
        &self,
        symbol: &str,
        label: &str,
        outcome: BreakerOutcome<T>,
        report: &mut RefreshReport,
    ) -> Option<T> {
        match outcome {
            BreakerOutcome::Ok(value) => {
                report.fetched.push(label.to_string());
                Some(value)
            }
            BreakerOutcome::CircuitOpen => {
                self.counters
                    .circuit_rejections
                    .fetch_add(1, Ordering::Relaxed);
                report.skipped_circuit_open.push(label.to_string());
                None
            }
            BreakerOutcome::Failed(err) => {
                self.counters.feed_failures.fetch_add(1, Ordering::Relaxed);
                warn!(symbol, feed = label, error = %err, "feed fetch failed");
                report.failed.push(label.to_string());
                None
            }
        }
    }
}

/// Split each coarse bar into `coarse/target` identical sub-bars with the
/// volume spread evenly — a deliberately low-fidelity approximation whose
/// `synthetic` flag tells scorers not to trust it like real data.
pub fn resample_series(source: &OhlcvSeries, target: Timeframe) -> Option<OhlcvSeries> {
    let src_secs = source.timeframe.duration_seconds();
    let tgt_secs = target.duration_seconds();
    if tgt_secs >= src_secs || src_secs % tgt_secs != 0 {
        return None;
    }
    // SAFETY: both durations are small positive constants
    let per_bar = (src_secs / tgt_secs) as usize;
    let mut bars = Vec::with_capacity(source.len() * per_bar);
    for bar in &source.bars {
        for i in 0..per_bar {
            bars.push(OhlcvBar {
                open_time: bar.open_time + chrono::Duration::seconds(tgt_secs * i as i64),
                open: bar.open,
                high: bar.high,
                low: bar.low,
                close: bar.close,
                volume: bar.volume / per_bar as f64,
            });
        }
    }
    Some(OhlcvSeries {
        timeframe: target,
        bars,
        synthetic: true,
        fetched_at: source.fetched_at,
    })
}
