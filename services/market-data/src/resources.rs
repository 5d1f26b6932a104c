//! Resource manager
//!
//! Bounds concurrently in-flight tasks and connections and tracks memory
//! hints. All mutation is serialized through one async mutex so counts stay
//! consistent under concurrent allocation/release. A periodic sampler logs
//! warnings when utilization crosses the configured thresholds; it takes no
//! corrective action — that is a policy extension point.

use chrono::{DateTime, Utc};
use rustc_hash::{FxHashMap, FxHashSet};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, watch};
use tokio::task::JoinHandle;
use tokio::time::interval;
use tracing::{debug, warn};

use services_common::{ResourceConfig, ResourceError};

/// Point-in-time utilization snapshot
#[derive(Debug, Clone, Copy, Serialize)]
pub struct ResourceStats {
    pub active_tasks: usize,
    pub active_connections: usize,
    /// Sum of tracked memory hints, megabytes
    pub allocated_memory_mb: u64,
    /// Tracked memory as a percentage of the configured ceiling
    pub memory_pct: f64,
    /// Active tasks as a percentage of `max_tasks`
    pub load_pct: f64,
    pub ts: DateTime<Utc>,
}

#[derive(Default)]
struct Tracking {
    /// Active task id -> memory hint (MB)
    tasks: FxHashMap<String, u64>,
    connections: FxHashSet<String>,
    allocated_mb: u64,
}

pub struct ResourceManager {
    config: ResourceConfig,
    tracking: Mutex<Tracking>,
}

impl ResourceManager {
    pub fn new(config: ResourceConfig) -> Self {
        Self {
            config,
            tracking: Mutex::new(Tracking::default()),
        }
    }

    /// Register a task, enforcing the task-count and memory ceilings.
    /// Re-allocating an existing id replaces its memory hint.
    pub async fn allocate_task(
        &self,
        id: &str,
        memory_hint_mb: Option<u64>,
    ) -> Result<(), ResourceError> {
        let mut tracking = self.tracking.lock().await;
        let hint = memory_hint_mb.unwrap_or(0);

        if !tracking.tasks.contains_key(id) && tracking.tasks.len() >= self.config.max_tasks {
            return Err(ResourceError::TaskLimitExceeded {
                active: tracking.tasks.len(),
                limit: self.config.max_tasks,
            });
        }
        if hint > self.config.max_task_memory_mb {
            return Err(ResourceError::MemoryLimitExceeded {
                requested_mb: hint,
                available_mb: self.config.max_task_memory_mb,
            });
        }
        let already = tracking.tasks.get(id).copied().unwrap_or(0);
        let projected = tracking.allocated_mb - already + hint;
        if projected > self.config.max_total_memory_mb {
            return Err(ResourceError::MemoryLimitExceeded {
                requested_mb: hint,
                available_mb: self
                    .config
                    .max_total_memory_mb
                    .saturating_sub(tracking.allocated_mb - already),
            });
        }

        tracking.tasks.insert(id.to_string(), hint);
        tracking.allocated_mb = projected;
        Ok(())
    }

    /// Remove a task unconditionally; unknown ids are a no-op.
    pub async fn release_task(&self, id: &str) {
        let mut tracking = self.tracking.lock().await;
        if let Some(hint) = tracking.tasks.remove(id) {
            tracking.allocated_mb = tracking.allocated_mb.saturating_sub(hint);
        }
    }

    /// Allocate a task and get a lease that releases it on drop.
    pub async fn acquire_task(
        self: &Arc<Self>,
        id: &str,
        memory_hint_mb: Option<u64>,
    ) -> Result<TaskLease, ResourceError> {
        self.allocate_task(id, memory_hint_mb).await?;
        Ok(TaskLease {
            manager: Arc::clone(self),
            id: id.to_string(),
            released: false,
        })
    }

    pub async fn register_connection(&self, id: &str) -> Result<(), ResourceError> {
        let mut tracking = self.tracking.lock().await;
        if !tracking.connections.contains(id)
            && tracking.connections.len() >= self.config.max_connections
        {
            return Err(ResourceError::ConnectionLimitExceeded {
                active: tracking.connections.len(),
                limit: self.config.max_connections,
            });
        }
        tracking.connections.insert(id.to_string());
        Ok(())
    }

    pub async fn unregister_connection(&self, id: &str) {
        self.tracking.lock().await.connections.remove(id);
    }

    pub async fn stats(&self) -> ResourceStats {
        let tracking = self.tracking.lock().await;
        let memory_pct = if self.config.max_total_memory_mb > 0 {
            tracking.allocated_mb as f64 / self.config.max_total_memory_mb as f64 * 100.0
        } else {
            0.0
        };
        let load_pct = if self.config.max_tasks > 0 {
            tracking.tasks.len() as f64 / self.config.max_tasks as f64 * 100.0
        } else {
            0.0
        };
        ResourceStats {
            active_tasks: tracking.tasks.len(),
            active_connections: tracking.connections.len(),
            allocated_memory_mb: tracking.allocated_mb,
            memory_pct,
            load_pct,
            ts: Utc::now(),
        }
    }

    /// Spawn the periodic utilization sampler.
    pub fn spawn_sampler(self: &Arc<Self>, mut shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
        let manager = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = interval(Duration::from_secs(manager.config.monitor_interval_secs));
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let stats = manager.stats().await;
                        if stats.memory_pct > manager.config.memory_warn_pct {
                            warn!(
                                memory_pct = stats.memory_pct,
                                allocated_mb = stats.allocated_memory_mb,
                                "memory utilization above threshold"
                            );
                        }
                        if stats.load_pct > manager.config.load_warn_pct {
                            warn!(
                                load_pct = stats.load_pct,
                                active_tasks = stats.active_tasks,
                                "task load above threshold"
                            );
                        }
                        debug!(
                            tasks = stats.active_tasks,
                            connections = stats.active_connections,
                            memory_mb = stats.allocated_memory_mb,
                            "resource sample"
                        );
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
}

/// RAII task registration. Prefer the explicit async [`TaskLease::release`];
/// the drop path covers cancellation by spawning the release when a runtime
/// is still available.
pub struct TaskLease {
    manager: Arc<ResourceManager>,
    id: String,
    released: bool,
}

impl TaskLease {
    pub async fn release(mut self) {
        self.released = true;
        self.manager.release_task(&self.id).await;
    }
}

impl Drop for TaskLease {
    fn drop(&mut self) {
        if !self.released {
            let manager = Arc::clone(&self.manager);
            let id = std::mem::take(&mut self.id);
            if let Ok(handle) = tokio::runtime::Handle::try_current() {
                handle.spawn(async move {
                    manager.release_task(&id).await;
                });
            }
        }
    }
}
