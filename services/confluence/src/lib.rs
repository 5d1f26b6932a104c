//! Confluence Engine
//!
//! Fuses six independently computed market signal components (technical,
//! volume, orderflow, orderbook, sentiment, price structure) into one
//! quality-adjusted confluence score per symbol, on top of a resilience
//! stack (circuit breakers, bounded resources, single-flight result cache)
//! that keeps producing output while the exchange misbehaves.

pub mod aggregator;
pub mod lifecycle;
pub mod monitor;
pub mod result_cache;
pub mod scorers;

use std::sync::Arc;
use std::time::Duration;
use anyhow::Result;
use chrono::Utc;
use rustc_hash::FxHashMap;
use tokio::sync::{Mutex, watch};
use tokio::task::JoinHandle;
use tracing::{info, warn};

use market_data::{
    BreakerSnapshot, CircuitBreakerRegistry, ExchangeGateway, MarketDataCache,
    MarketDataCacheStats, ResourceManager, ResourceStats,
};
use services_common::{Component, ComponentScore, ConfluenceResult, EngineConfig};

use lifecycle::{ComponentState, ComponentStateManager, components};
use result_cache::{ResultCache, ResultCacheStats};
use scorers::ComponentScorer;

/// Grace period for background tasks to finish on shutdown
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

pub(crate) struct EngineInner {
    pub(crate) config: EngineConfig,
    pub(crate) market_data: MarketDataCache,
    pub(crate) scorers: Vec<Box<dyn ComponentScorer>>,
    pub(crate) results: Arc<ResultCache>,
    pub(crate) lifecycle: ComponentStateManager,
    pub(crate) resources: Arc<ResourceManager>,
    pub(crate) breakers: Arc<CircuitBreakerRegistry>,
}

/// Score one symbol from whatever snapshot the cache currently holds.
/// A symbol with no snapshot still produces a (low-reliability) result.
pub(crate) async fn compute_confluence(
    inner: &Arc<EngineInner>,
    symbol: &str,
) -> Result<ConfluenceResult> {
    let snapshot = inner.market_data.snapshot(symbol).await;
    let components: Vec<ComponentScore> = match &snapshot {
        Some(snap) => inner.scorers.iter().map(|s| s.score(snap)).collect(),
        None => Component::ALL
            .iter()
            .map(|c| ComponentScore::neutral(*c))
            .collect(),
    };
    Ok(aggregator::aggregate(
        symbol,
        components,
        &inner.config.scoring,
        Utc::now(),
    ))
}

/// The assembled scoring pipeline
pub struct ConfluenceEngine {
    inner: Arc<EngineInner>,
    shutdown_tx: watch::Sender<bool>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl ConfluenceEngine {
    /// Build the engine with the standard six scorers
    pub fn new(config: EngineConfig, gateway: Arc<dyn ExchangeGateway>) -> Self {
        Self::with_scorers(config, gateway, scorers::default_scorers())
    }

    /// Build the engine with a custom scorer set
    pub fn with_scorers(
        config: EngineConfig,
        gateway: Arc<dyn ExchangeGateway>,
        scorers: Vec<Box<dyn ComponentScorer>>,
    ) -> Self {
        let breakers = Arc::new(CircuitBreakerRegistry::new(config.breaker));
        let resources = Arc::new(ResourceManager::new(config.resources));
        let market_data = MarketDataCache::new(
            config.market_data.clone(),
            config.timeframes.clone(),
            config.retry,
            gateway,
            Arc::clone(&breakers),
            Arc::clone(&resources),
        );
        let results = Arc::new(ResultCache::new(config.result_cache));

        let lifecycle = ComponentStateManager::new();
        for component in [
            components::MARKET_DATA_CACHE,
            components::RESULT_CACHE,
            components::RESOURCE_MANAGER,
            components::MONITORING_LOOP,
        ] {
            lifecycle.register(component);
        }

        let (shutdown_tx, _) = watch::channel(false);
        Self {
            inner: Arc::new(EngineInner {
                config,
                market_data,
                scorers,
                results,
                lifecycle,
                resources,
                breakers,
            }),
            shutdown_tx,
            tasks: Mutex::new(Vec::new()),
        }
    }

    /// Start the background loops: resource sampler, result-cache sweeper,
    /// monitoring loop.
    pub async fn start(&self) -> Result<()> {
        let lifecycle = &self.inner.lifecycle;
        for component in [
            components::MARKET_DATA_CACHE,
            components::RESULT_CACHE,
            components::RESOURCE_MANAGER,
            components::MONITORING_LOOP,
        ] {
            lifecycle.transition(component, ComponentState::Initializing)?;
            lifecycle.transition(component, ComponentState::Ready)?;
            lifecycle.transition(component, ComponentState::Running)?;
        }

        let mut tasks = self.tasks.lock().await;
        tasks.push(
            self.inner
                .resources
                .spawn_sampler(self.shutdown_tx.subscribe()),
        );
        tasks.push(
            self.inner
                .results
                .spawn_cleanup(self.shutdown_tx.subscribe()),
        );
        tasks.push(tokio::spawn(monitor::run(
            Arc::clone(&self.inner),
            self.shutdown_tx.subscribe(),
        )));

        info!(
            symbols = self.inner.config.symbols.len(),
            "confluence engine started"
        );
        Ok(())
    }

    /// Stop the background loops and cancel in-flight work
    pub async fn shutdown(&self) {
        for component in [
            components::MARKET_DATA_CACHE,
            components::RESULT_CACHE,
            components::RESOURCE_MANAGER,
            components::MONITORING_LOOP,
        ] {
            let _ = self
                .inner
                .lifecycle
                .transition(component, ComponentState::ShuttingDown);
        }
        let _ = self.shutdown_tx.send(true);

        let mut tasks = self.tasks.lock().await;
        for mut task in tasks.drain(..) {
            if tokio::time::timeout(SHUTDOWN_GRACE, &mut task).await.is_err() {
                warn!("background task did not stop within grace period, aborting");
                task.abort();
            }
        }

        for component in [
            components::MARKET_DATA_CACHE,
            components::RESULT_CACHE,
            components::RESOURCE_MANAGER,
            components::MONITORING_LOOP,
        ] {
            let _ = self
                .inner
                .lifecycle
                .transition(component, ComponentState::Terminated);
        }
        info!("confluence engine stopped");
    }

    /// Cached confluence result for a symbol; `None` while pending
    pub fn get_confluence(&self, symbol: &str) -> Option<ConfluenceResult> {
        self.inner.results.get(symbol)
    }

    /// Refresh market data and recompute now, sharing any in-flight
    /// computation for the same symbol.
    pub async fn compute_now(&self, symbol: &str) -> Result<ConfluenceResult> {
        if let Err(err) = self.inner.market_data.refresh(symbol).await {
            // Score from the existing snapshot rather than failing the caller
            warn!(symbol, error = %err, "refresh rejected, scoring cached snapshot");
        }
        self.inner.results.invalidate(symbol);
        self.inner
            .results
            .get_or_compute(symbol, || compute_confluence(&self.inner, symbol))
            .await
    }

    pub fn cache_stats(&self) -> ResultCacheStats {
        self.inner.results.stats()
    }

    pub async fn market_data_stats(&self) -> MarketDataCacheStats {
        self.inner.market_data.stats().await
    }

    pub fn component_states(&self) -> FxHashMap<String, ComponentState> {
        self.inner.lifecycle.states()
    }

    pub fn circuit_states(&self) -> FxHashMap<String, BreakerSnapshot> {
        self.inner.breakers.states()
    }

    pub async fn resource_stats(&self) -> ResourceStats {
        self.inner.resources.stats().await
    }

    /// Lifecycle handle, e.g. for `wait_for_state` in embedders and tests
    pub fn lifecycle(&self) -> &ComponentStateManager {
        &self.inner.lifecycle
    }
}
