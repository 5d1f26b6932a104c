//! Tracing subscriber setup
//!
//! Entry points are owned by embedders, so subscriber installation lives
//! here instead of a `main.rs`. Safe to call more than once.

use tracing_subscriber::EnvFilter;

/// Install the global fmt subscriber with `RUST_LOG`-style filtering.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .try_init();
}
