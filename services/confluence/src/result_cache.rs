//! Single-flight result cache
//!
//! TTL cache of final [`ConfluenceResult`]s keyed by symbol. For any key, at
//! most one computation runs at a time: concurrent callers serialize on a
//! per-key async mutex and pick up the winner's entry instead of duplicating
//! work. Expired entries are evicted lazily on access and by a background
//! sweep loop.

use dashmap::DashMap;
use serde::Serialize;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::{Mutex, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, interval};
use tracing::debug;

use services_common::{ConfluenceResult, ResultCacheConfig};

/// Cache counters snapshot
#[derive(Debug, Clone, Copy, Serialize)]
pub struct ResultCacheStats {
    pub entries: usize,
    pub hits: u64,
    pub misses: u64,
    pub invalidations: u64,
    pub cleanups: u64,
    pub computations: u64,
}

struct Entry {
    result: ConfluenceResult,
    created: Instant,
    ttl: Duration,
}

impl Entry {
    fn is_expired(&self, now: Instant) -> bool {
        now.duration_since(self.created) > self.ttl
    }
}

pub struct ResultCache {
    config: ResultCacheConfig,
    entries: DashMap<String, Entry>,
    /// Per-key computation locks for single-flight semantics
    inflight: DashMap<String, Arc<Mutex<()>>>,
    hits: AtomicU64,
    misses: AtomicU64,
    invalidations: AtomicU64,
    cleanups: AtomicU64,
    computations: AtomicU64,
}

impl ResultCache {
    pub fn new(config: ResultCacheConfig) -> Self {
        Self {
            config,
            entries: DashMap::new(),
            inflight: DashMap::new(),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            invalidations: AtomicU64::new(0),
            cleanups: AtomicU64::new(0),
            computations: AtomicU64::new(0),
        }
    }

    /// Live value without counter side effects
    fn lookup(&self, symbol: &str) -> Option<ConfluenceResult> {
        let now = Instant::now();
        {
            // Scope the shard guard before any removal on the same key
            let entry = self.entries.get(symbol)?;
            if !entry.is_expired(now) {
                return Some(entry.result.clone());
            }
        }
        self.entries.remove_if(symbol, |_, entry| entry.is_expired(now));
        None
    }

    /// Cached result for a symbol; expired entries are evicted on access
    pub fn get(&self, symbol: &str) -> Option<ConfluenceResult> {
        match self.lookup(symbol) {
            Some(result) => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                Some(result)
            }
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    pub fn insert(&self, result: ConfluenceResult) {
        self.entries.insert(
            result.symbol.clone(),
            Entry {
                result,
                created: Instant::now(),
                ttl: Duration::from_secs(self.config.ttl_secs),
            },
        );
    }

    pub fn invalidate(&self, symbol: &str) {
        if self.entries.remove(symbol).is_some() {
            self.invalidations.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Return the cached value or run `compute`, guaranteeing at most one
    /// concurrent computation per symbol. Callers that arrive during an
    /// in-flight computation await it and share its result.
    pub async fn get_or_compute<F, Fut>(
        &self,
        symbol: &str,
        compute: F,
    ) -> anyhow::Result<ConfluenceResult>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = anyhow::Result<ConfluenceResult>>,
    {
        if let Some(result) = self.get(symbol) {
            return Ok(result);
        }
        let lock = self
            .inflight
            .entry(symbol.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        let _guard = lock.lock().await;

        // A concurrent caller may have finished while we waited for the lock
        if let Some(result) = self.lookup(symbol) {
            return Ok(result);
        }

        let result = compute().await?;
        self.computations.fetch_add(1, Ordering::Relaxed);
        self.insert(result.clone());
        Ok(result)
    }

    /// Remove expired entries; returns how many were dropped
    pub fn sweep(&self) -> usize {
        let now = Instant::now();
        let before = self.entries.len();
        self.entries.retain(|_, entry| !entry.is_expired(now));
        let removed = before - self.entries.len();
        if removed > 0 {
            self.cleanups.fetch_add(removed as u64, Ordering::Relaxed);
            debug!(removed, "result cache sweep");
        }
        removed
    }

    /// Spawn the periodic sweep loop
    pub fn spawn_cleanup(self: &Arc<Self>, mut shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
        let cache = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = interval(Duration::from_secs(cache.config.cleanup_interval_secs));
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        cache.sweep();
                    }
                    _ = shutdown.changed() => {
                        if *shutdown.borrow() {
                            break;
                        }
                    }
                }
            }
        })
    }

    pub fn stats(&self) -> ResultCacheStats {
        ResultCacheStats {
            entries: self.entries.len(),
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            invalidations: self.invalidations.load(Ordering::Relaxed),
            cleanups: self.cleanups.load(Ordering::Relaxed),
            computations: self.computations.load(Ordering::Relaxed),
        }
    }
}
