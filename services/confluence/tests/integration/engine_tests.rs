//! Engine facade integration tests over the mock gateway

use std::sync::Arc;

use confluence_engine::ConfluenceEngine;
use confluence_engine::lifecycle::{ComponentState, components};
use services_common::{Component, EngineConfig, GatewayError, SentimentLabel};
use test_utils::MockGateway;

fn engine_with(gateway: MockGateway) -> ConfluenceEngine {
    test_utils::init_test_tracing();
    ConfluenceEngine::new(EngineConfig::default(), Arc::new(gateway))
}

#[tokio::test]
async fn test_bullish_market_produces_bullish_signal() {
    let engine = engine_with(MockGateway::new().with_trend(0.004));
    let result = engine.compute_now("BTCUSDT").await.unwrap();

    assert!(result.base_score > 50.0, "base {}", result.base_score);
    assert!(!result.low_reliability);
    assert!(result.consensus > 0.0);
    // Directional label comes from the adjusted score, never the base
    if result.sentiment == SentimentLabel::Bullish {
        assert!(result.adjusted_score >= engine_config_buy_threshold());
    }
}

fn engine_config_buy_threshold() -> f64 {
    EngineConfig::default().scoring.buy_threshold
}

#[tokio::test(start_paused = true)]
async fn test_failing_feeds_reduce_confidence_not_availability_of_result() {
    // Healthy engine first, as the comparison baseline
    let healthy = engine_with(MockGateway::new().with_trend(0.004));
    let full = healthy.compute_now("BTCUSDT").await.unwrap();

    // Same market, but trades / orderbook / ticker / OI feeds all down
    let gateway = MockGateway::new().with_trend(0.004);
    for endpoint in ["trades", "orderbook", "ticker", "open_interest"] {
        gateway.queue_failures(
            endpoint,
            GatewayError::ConnectionFailed("down".to_string()),
            100,
        );
    }
    let degraded_engine = engine_with(gateway);
    let degraded = degraded_engine.compute_now("BTCUSDT").await.unwrap();

    // A result is still produced, with the starved components flagged
    let unavailable: Vec<Component> = degraded
        .components
        .iter()
        .filter(|c| !c.available)
        .map(|c| c.component)
        .collect();
    assert!(unavailable.contains(&Component::Orderflow));
    assert!(unavailable.contains(&Component::Orderbook));
    assert!(unavailable.contains(&Component::Sentiment));

    let full_available = full.components.iter().filter(|c| c.available).count();
    let degraded_available = degraded.components.iter().filter(|c| c.available).count();
    assert!(degraded_available < full_available);
}

#[tokio::test]
async fn test_get_confluence_pending_until_computed() {
    let engine = engine_with(MockGateway::new());
    assert!(engine.get_confluence("BTCUSDT").is_none(), "pending before any cycle");

    engine.compute_now("BTCUSDT").await.unwrap();
    let cached = engine.get_confluence("BTCUSDT").expect("cached after compute");
    assert_eq!(cached.symbol, "BTCUSDT");
    assert!(engine.cache_stats().computations >= 1);
}

#[tokio::test]
async fn test_observability_surfaces() {
    let engine = engine_with(MockGateway::new());
    engine.compute_now("BTCUSDT").await.unwrap();

    let md_stats = engine.market_data_stats().await;
    assert_eq!(md_stats.symbols, 1);
    assert_eq!(md_stats.refreshes, 1);

    let circuits = engine.circuit_states();
    assert!(circuits.keys().any(|k| k.starts_with("gateway:ohlcv")));

    let states = engine.component_states();
    assert_eq!(
        states[components::MONITORING_LOOP],
        ComponentState::Uninitialized,
        "loop not started in this test"
    );

    let resources = engine.resource_stats().await;
    assert_eq!(resources.active_tasks, 0, "refresh lease released");
}

#[tokio::test]
async fn test_lifecycle_walk_through_start_and_shutdown() {
    let engine = engine_with(MockGateway::new());
    engine.start().await.unwrap();

    assert!(
        engine
            .lifecycle()
            .wait_for_state(
                components::MONITORING_LOOP,
                ComponentState::Running,
                Some(std::time::Duration::from_secs(1)),
            )
            .await
    );

    engine.shutdown().await;
    let states = engine.component_states();
    for component in [
        components::MARKET_DATA_CACHE,
        components::RESULT_CACHE,
        components::MONITORING_LOOP,
    ] {
        assert_eq!(states[component], ComponentState::Terminated, "{component}");
    }
}
