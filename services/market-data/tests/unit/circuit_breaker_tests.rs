//! Circuit breaker state machine tests

use std::time::Duration;

use market_data::{BreakerOutcome, CircuitBreaker, CircuitBreakerRegistry, CircuitState};
use services_common::{BreakerConfig, GatewayError};

fn config(threshold: u32, recovery_secs: u64) -> BreakerConfig {
    BreakerConfig {
        failure_threshold: threshold,
        recovery_timeout_secs: recovery_secs,
        half_open_successes_to_close: 2,
    }
}

async fn failing_call(cb: &CircuitBreaker) -> BreakerOutcome<u32> {
    cb.call(async { Err(GatewayError::Timeout("5s".to_string())) })
        .await
}

async fn ok_call(cb: &CircuitBreaker) -> BreakerOutcome<u32> {
    cb.call(async { Ok(7) }).await
}

#[tokio::test(start_paused = true)]
async fn test_opens_after_threshold_and_fails_fast() {
    let cb = CircuitBreaker::new("dep", config(3, 30));

    for _ in 0..3 {
        assert!(matches!(failing_call(&cb).await, BreakerOutcome::Failed(_)));
    }
    assert_eq!(cb.state(), CircuitState::Open);

    // Calls are rejected without executing while open
    let outcome = ok_call(&cb).await;
    assert!(outcome.is_circuit_open());
    assert_eq!(cb.state(), CircuitState::Open);
}

#[tokio::test(start_paused = true)]
async fn test_half_open_after_recovery_then_closes_on_two_successes() {
    let cb = CircuitBreaker::new("dep", config(3, 30));
    for _ in 0..3 {
        failing_call(&cb).await;
    }
    assert_eq!(cb.state(), CircuitState::Open);

    tokio::time::advance(Duration::from_secs(31)).await;

    // First call after the timeout is the half-open probe
    assert!(matches!(ok_call(&cb).await, BreakerOutcome::Ok(7)));
    assert_eq!(cb.state(), CircuitState::HalfOpen);

    // Second consecutive success closes the circuit
    assert!(matches!(ok_call(&cb).await, BreakerOutcome::Ok(7)));
    assert_eq!(cb.state(), CircuitState::Closed);
}

#[tokio::test(start_paused = true)]
async fn test_half_open_failure_reopens_and_resets_timer() {
    let cb = CircuitBreaker::new("dep", config(2, 30));
    failing_call(&cb).await;
    failing_call(&cb).await;
    assert_eq!(cb.state(), CircuitState::Open);

    tokio::time::advance(Duration::from_secs(31)).await;
    assert!(matches!(failing_call(&cb).await, BreakerOutcome::Failed(_)));
    assert_eq!(cb.state(), CircuitState::Open);

    // Timer restarted: still rejecting before a fresh recovery window
    tokio::time::advance(Duration::from_secs(15)).await;
    assert!(ok_call(&cb).await.is_circuit_open());

    tokio::time::advance(Duration::from_secs(16)).await;
    assert!(matches!(ok_call(&cb).await, BreakerOutcome::Ok(_)));
}

#[tokio::test(start_paused = true)]
async fn test_success_in_closed_resets_counter() {
    let cb = CircuitBreaker::new("dep", config(3, 30));
    failing_call(&cb).await;
    failing_call(&cb).await;
    ok_call(&cb).await;
    failing_call(&cb).await;
    failing_call(&cb).await;
    assert_eq!(cb.state(), CircuitState::Closed);
    failing_call(&cb).await;
    assert_eq!(cb.state(), CircuitState::Open);
}

#[tokio::test(start_paused = true)]
async fn test_reset_forces_closed() {
    let cb = CircuitBreaker::new("dep", config(1, 3600));
    failing_call(&cb).await;
    assert_eq!(cb.state(), CircuitState::Open);

    cb.reset();
    assert_eq!(cb.state(), CircuitState::Closed);
    assert!(matches!(ok_call(&cb).await, BreakerOutcome::Ok(_)));
    assert_eq!(cb.snapshot().consecutive_failures, 0);
}

#[tokio::test(start_paused = true)]
async fn test_registry_get_or_create_shares_and_snapshots() {
    let registry = CircuitBreakerRegistry::new(config(1, 30));
    let a = registry.get_or_create("gateway:ohlcv:5m");
    a.record_failure();

    // Same key sees the shared state
    let b = registry.get_or_create("gateway:ohlcv:5m");
    assert_eq!(b.state(), CircuitState::Open);

    let states = registry.states();
    assert_eq!(states.len(), 1);
    assert_eq!(states["gateway:ohlcv:5m"].state, CircuitState::Open);
    assert!(states["gateway:ohlcv:5m"].seconds_until_probe > 0);

    registry.reset_all();
    assert_eq!(a.state(), CircuitState::Closed);
}
