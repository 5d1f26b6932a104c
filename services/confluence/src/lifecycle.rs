//! Component lifecycle state machine
//!
//! Tracks a validated state machine per named subsystem component. Every
//! transition runs through the allowed-transition table plus any validators
//! registered for that `(from, to)` pair; rejected transitions leave the
//! state unchanged. Successful transitions append to a capped timestamped
//! history and dispatch to on-enter handlers.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use parking_lot::RwLock;
use rustc_hash::FxHashMap;
use serde::Serialize;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::Notify;
use tokio::time::{Instant, timeout};
use tracing::{debug, warn};

use services_common::constants::monitor::LIFECYCLE_HISTORY_CAP;

/// Well-known component names
pub mod components {
    pub const MARKET_DATA_CACHE: &str = "market_data_cache";
    pub const RESULT_CACHE: &str = "result_cache";
    pub const MONITORING_LOOP: &str = "monitoring_loop";
    pub const RESOURCE_MANAGER: &str = "resource_manager";
}

/// Lifecycle state of one component
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ComponentState {
    Uninitialized,
    Initializing,
    Ready,
    Running,
    Paused,
    Error,
    ShuttingDown,
    Terminated,
}

impl ComponentState {
    /// Built-in allowed-transition table
    fn can_transition_to(self, to: ComponentState) -> bool {
        use ComponentState::*;
        match (self, to) {
            (Uninitialized, Initializing) => true,
            (Initializing, Ready) => true,
            (Ready, Running) => true,
            (Running, Paused) | (Paused, Running) => true,
            (Ready | Running | Paused | Error, ShuttingDown) => true,
            (ShuttingDown, Terminated) => true,
            // Error is reachable from any non-terminal state
            (from, Error) => from != Terminated && from != Error,
            _ => false,
        }
    }
}

/// Transition rejection
#[derive(Debug, Clone, Error)]
pub enum StateTransitionError {
    #[error("invalid transition for {component}: {from:?} -> {to:?}")]
    InvalidTransition {
        component: String,
        from: ComponentState,
        to: ComponentState,
    },

    #[error("transition vetoed for {component}: {from:?} -> {to:?}")]
    ValidatorRejected {
        component: String,
        from: ComponentState,
        to: ComponentState,
    },

    #[error("unknown component: {0}")]
    UnknownComponent(String),
}

/// One recorded transition
#[derive(Debug, Clone, Serialize)]
pub struct StateTransition {
    pub from: ComponentState,
    pub to: ComponentState,
    pub ts: DateTime<Utc>,
}

type Validator = Box<dyn Fn(&str, ComponentState, ComponentState) -> bool + Send + Sync>;
type Handler = Box<dyn Fn(&str, ComponentState) + Send + Sync>;

struct ComponentRecord {
    state: ComponentState,
    history: Vec<StateTransition>,
}

pub struct ComponentStateManager {
    components: DashMap<String, ComponentRecord>,
    validators: RwLock<FxHashMap<(ComponentState, ComponentState), Vec<Validator>>>,
    handlers: RwLock<FxHashMap<ComponentState, Vec<Handler>>>,
    changed: Notify,
    history_cap: usize,
}

impl Default for ComponentStateManager {
    fn default() -> Self {
        Self::new()
    }
}

impl ComponentStateManager {
    pub fn new() -> Self {
        Self {
            components: DashMap::new(),
            validators: RwLock::new(FxHashMap::default()),
            handlers: RwLock::new(FxHashMap::default()),
            changed: Notify::new(),
            history_cap: LIFECYCLE_HISTORY_CAP,
        }
    }

    /// Register a component in `Uninitialized`; re-registration is a no-op
    pub fn register(&self, component: &str) {
        self.components
            .entry(component.to_string())
            .or_insert_with(|| ComponentRecord {
                state: ComponentState::Uninitialized,
                history: Vec::new(),
            });
    }

    pub fn state(&self, component: &str) -> Option<ComponentState> {
        self.components.get(component).map(|r| r.state)
    }

    /// All component states, for observability
    pub fn states(&self) -> FxHashMap<String, ComponentState> {
        self.components
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().state))
            .collect()
    }

    pub fn history(&self, component: &str) -> Vec<StateTransition> {
        self.components
            .get(component)
            .map(|r| r.history.clone())
            .unwrap_or_default()
    }

    /// Veto hook for a specific `(from, to)` pair
    pub fn add_validator<F>(&self, from: ComponentState, to: ComponentState, validator: F)
    where
        F: Fn(&str, ComponentState, ComponentState) -> bool + Send + Sync + 'static,
    {
        self.validators
            .write()
            .entry((from, to))
            .or_default()
            .push(Box::new(validator));
    }

    /// Callback invoked after a component enters `state`
    pub fn on_enter<F>(&self, state: ComponentState, handler: F)
    where
        F: Fn(&str, ComponentState) + Send + Sync + 'static,
    {
        self.handlers
            .write()
            .entry(state)
            .or_default()
            .push(Box::new(handler));
    }

    /// Attempt a transition. On rejection the state is unchanged.
    pub fn transition(
        &self,
        component: &str,
        to: ComponentState,
    ) -> Result<(), StateTransitionError> {
        let from = {
            let mut record = self.components.get_mut(component).ok_or_else(|| {
                StateTransitionError::UnknownComponent(component.to_string())
            })?;
            let from = record.state;

            if !from.can_transition_to(to) {
                warn!(component, ?from, ?to, "invalid lifecycle transition");
                return Err(StateTransitionError::InvalidTransition {
                    component: component.to_string(),
                    from,
                    to,
                });
            }
            let vetoed = {
                let validators = self.validators.read();
                validators
                    .get(&(from, to))
                    .is_some_and(|vs| vs.iter().any(|v| !v(component, from, to)))
            };
            if vetoed {
                warn!(component, ?from, ?to, "lifecycle transition vetoed");
                return Err(StateTransitionError::ValidatorRejected {
                    component: component.to_string(),
                    from,
                    to,
                });
            }

            record.state = to;
            record.history.push(StateTransition {
                from,
                to,
                ts: Utc::now(),
            });
            if record.history.len() > self.history_cap {
                let excess = record.history.len() - self.history_cap;
                record.history.drain(0..excess);
            }
            from
        };

        debug!(component, ?from, ?to, "lifecycle transition");
        self.changed.notify_waiters();

        let handlers = self.handlers.read();
        if let Some(hs) = handlers.get(&to) {
            for handler in hs {
                handler(component, to);
            }
        }
        Ok(())
    }

    /// Cooperatively wait until `component` reaches `target`. Returns `true`
    /// once reached, `false` when the timeout elapses first — never an error.
    pub async fn wait_for_state(
        &self,
        component: &str,
        target: ComponentState,
        wait_timeout: Option<Duration>,
    ) -> bool {
        let deadline = wait_timeout.map(|t| Instant::now() + t);
        loop {
            // Create the listener before checking so a transition between
            // check and await cannot be missed
            let notified = self.changed.notified();
            if self.state(component) == Some(target) {
                return true;
            }
            match deadline {
                None => notified.await,
                Some(deadline) => {
                    let remaining = deadline.saturating_duration_since(Instant::now());
                    if remaining.is_zero() {
                        return false;
                    }
                    if timeout(remaining, notified).await.is_err() {
                        return self.state(component) == Some(target);
                    }
                }
            }
        }
    }
}
