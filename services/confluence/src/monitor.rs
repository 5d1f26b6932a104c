//! Monitoring loop
//!
//! Fixed-period recompute cycles over every tracked symbol. One cycle:
//! refresh market data, score, aggregate, write through the result cache —
//! per symbol, in parallel tasks that fail independently. The whole cycle
//! runs under a hard timeout; timeouts feed an error counter that drives a
//! capped exponential backoff and decays again after a quiet period.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinSet;
use tokio::time::{Instant, sleep, timeout};
use tracing::{debug, info, warn};

use crate::EngineInner;

/// Delay before the next cycle, doubling per consecutive timeout up to the cap
fn backoff_delay(base: Duration, consecutive_timeouts: u32, max: Duration) -> Duration {
    let factor = 1u64 << consecutive_timeouts.min(16);
    base.saturating_mul(factor as u32).min(max)
}

pub(crate) async fn run(inner: Arc<EngineInner>, mut shutdown: watch::Receiver<bool>) {
    let cfg = inner.config.monitor;
    let base = Duration::from_secs(cfg.cycle_interval_secs);
    let max_backoff = Duration::from_secs(cfg.max_backoff_secs);
    let cycle_timeout = Duration::from_secs(cfg.cycle_timeout_secs);
    let decay_after = Duration::from_secs(cfg.error_decay_after_secs);

    let mut consecutive_timeouts: u32 = 0;
    let mut last_timeout: Option<Instant> = None;

    info!(
        symbols = inner.config.symbols.len(),
        interval_secs = cfg.cycle_interval_secs,
        "monitoring loop started"
    );

    loop {
        let delay = backoff_delay(base, consecutive_timeouts, max_backoff);
        tokio::select! {
            _ = sleep(delay) => {}
            _ = shutdown.changed() => {
                if *shutdown.borrow() {
                    break;
                }
                continue;
            }
        }

        // Dropping the cycle future on timeout aborts its JoinSet, which
        // cancels the per-symbol tasks; snapshot swaps are atomic so a
        // cancelled refresh cannot leave partial cache state behind.
        match timeout(cycle_timeout, run_cycle(&inner)).await {
            Ok(()) => {
                if consecutive_timeouts > 0
                    && last_timeout.is_some_and(|t| t.elapsed() >= decay_after)
                {
                    consecutive_timeouts -= 1;
                    last_timeout = Some(Instant::now());
                    debug!(consecutive_timeouts, "cycle error counter decayed");
                }
            }
            Err(_) => {
                consecutive_timeouts += 1;
                last_timeout = Some(Instant::now());
                let next = backoff_delay(base, consecutive_timeouts, max_backoff);
                warn!(
                    consecutive_timeouts,
                    next_delay_secs = next.as_secs(),
                    "monitoring cycle timed out, backing off"
                );
            }
        }
    }

    info!("monitoring loop stopped");
}

/// One full pass over the tracked symbols, all in parallel
async fn run_cycle(inner: &Arc<EngineInner>) {
    let mut tasks = JoinSet::new();
    for symbol in &inner.config.symbols {
        let inner = Arc::clone(inner);
        let symbol = symbol.clone();
        tasks.spawn(async move {
            let outcome = process_symbol(&inner, &symbol).await;
            (symbol, outcome)
        });
    }

    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok((symbol, Ok(()))) => debug!(symbol = %symbol, "symbol cycle complete"),
            // Per-symbol failures never abort the cycle for the others
            Ok((symbol, Err(err))) => {
                warn!(symbol = %symbol, error = %format!("{err:#}"), "symbol cycle failed");
            }
            Err(join_err) => warn!(error = %join_err, "symbol task aborted"),
        }
    }
}

/// Refresh + recompute one symbol, writing through the result cache
async fn process_symbol(inner: &Arc<EngineInner>, symbol: &str) -> anyhow::Result<()> {
    match inner.market_data.refresh(symbol).await {
        Ok(report) => {
            if !report.failed.is_empty() || !report.skipped_circuit_open.is_empty() {
                debug!(
                    symbol,
                    failed = report.failed.len(),
                    circuit_open = report.skipped_circuit_open.len(),
                    "refresh was partial"
                );
            }
        }
        // Resource exhaustion skips this symbol's cycle; retried next cycle
        Err(err) => {
            warn!(symbol, error = %err, "refresh rejected, skipping cycle");
            return Ok(());
        }
    }

    // Force a fresh aggregation while concurrent on-demand callers still
    // share the in-flight computation
    inner.results.invalidate(symbol);
    let result = inner
        .results
        .get_or_compute(symbol, || crate::compute_confluence(inner, symbol))
        .await?;
    debug!(
        symbol,
        adjusted = result.adjusted_score,
        confidence = result.confidence,
        "cycle wrote result"
    );
    Ok(())
}
