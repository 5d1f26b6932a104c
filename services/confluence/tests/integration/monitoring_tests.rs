//! Monitoring loop integration tests (paused-clock)

use std::sync::Arc;
use std::time::Duration;

use confluence_engine::ConfluenceEngine;
use services_common::EngineConfig;
use test_utils::MockGateway;

fn fast_config() -> EngineConfig {
    let mut config = EngineConfig::default();
    config.symbols = vec!["BTCUSDT".to_string(), "ETHUSDT".to_string()];
    config.monitor.cycle_interval_secs = 1;
    config.monitor.cycle_timeout_secs = 5;
    config.result_cache.ttl_secs = 120;
    config
}

#[tokio::test(start_paused = true)]
async fn test_loop_populates_results_for_all_symbols() {
    test_utils::init_test_tracing();
    let engine = ConfluenceEngine::new(fast_config(), Arc::new(MockGateway::new()));
    engine.start().await.unwrap();

    // Let a few cycles run on the paused clock
    tokio::time::sleep(Duration::from_secs(10)).await;

    for symbol in ["BTCUSDT", "ETHUSDT"] {
        let result = engine.get_confluence(symbol).unwrap_or_else(|| {
            panic!("{symbol} should have a result after several cycles")
        });
        assert_eq!(result.symbol, symbol);
        assert_eq!(result.components.len(), 6);
    }
    let stats = engine.cache_stats();
    assert!(stats.computations >= 2, "one per symbol at least");

    engine.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_hanging_gateway_times_out_without_partial_state() {
    let mut config = fast_config();
    config.monitor.cycle_timeout_secs = 2;
    // Every fetch stalls far past the cycle timeout
    let gateway = MockGateway::new().with_latency(Duration::from_secs(60));
    let engine = ConfluenceEngine::new(config, Arc::new(gateway));
    engine.start().await.unwrap();

    tokio::time::sleep(Duration::from_secs(20)).await;

    // No cycle ever completed: no result, and no half-written snapshot
    assert!(engine.get_confluence("BTCUSDT").is_none());
    let md_stats = engine.market_data_stats().await;
    assert_eq!(md_stats.symbols, 0, "cancelled refresh must not swap state");

    // Shutdown remains clean while cycles are being cancelled
    engine.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_results_refresh_as_cycles_continue() {
    let engine = ConfluenceEngine::new(fast_config(), Arc::new(MockGateway::new()));
    engine.start().await.unwrap();

    tokio::time::sleep(Duration::from_secs(3)).await;
    let first = engine.get_confluence("BTCUSDT").expect("first cycle result");

    tokio::time::sleep(Duration::from_secs(5)).await;
    let later = engine.get_confluence("BTCUSDT").expect("later cycle result");
    assert!(later.ts >= first.ts, "monitoring keeps writing through");

    engine.shutdown().await;
}
