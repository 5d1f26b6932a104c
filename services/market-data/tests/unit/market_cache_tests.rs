//! Market data cache tests

use std::sync::Arc;

use market_data::{CircuitBreakerRegistry, MarketDataCache, ResourceManager};
use services_common::{
    BreakerConfig, GatewayError, MarketDataConfig, ResourceConfig, RetryConfig, Timeframe,
};
use test_utils::MockGateway;

struct Fixture {
    gateway: Arc<MockGateway>,
    cache: MarketDataCache,
    breakers: Arc<CircuitBreakerRegistry>,
}

fn fixture(gateway: MockGateway, retry: RetryConfig, breaker: BreakerConfig) -> Fixture {
    let gateway = Arc::new(gateway);
    let breakers = Arc::new(CircuitBreakerRegistry::new(breaker));
    let gateway_dyn: Arc<dyn market_data::ExchangeGateway> = gateway.clone();
    let cache = MarketDataCache::new(
        MarketDataConfig::default(),
        vec![Timeframe::M5, Timeframe::M15],
        retry,
        gateway_dyn,
        Arc::clone(&breakers),
        Arc::new(ResourceManager::new(ResourceConfig::default())),
    );
    Fixture {
        gateway,
        cache,
        breakers,
    }
}

fn default_fixture(gateway: MockGateway) -> Fixture {
    fixture(gateway, RetryConfig::default(), BreakerConfig::default())
}

#[tokio::test(start_paused = true)]
async fn test_fresh_series_is_reused_not_refetched() {
    let f = default_fixture(MockGateway::new());

    let first = f.cache.refresh("BTCUSDT").await.unwrap();
    assert!(first.fetched.iter().any(|l| l == "ohlcv:5m"));

    let second = f.cache.refresh("BTCUSDT").await.unwrap();
    assert!(second.reused.iter().any(|l| l == "ohlcv:5m"));
    assert_eq!(f.gateway.calls("ohlcv:5m"), 1, "fresh series not refetched");
    // Fast-moving feeds are always refetched
    assert_eq!(f.gateway.calls("orderbook"), 2);
}

#[tokio::test(start_paused = true)]
async fn test_failed_timeframe_is_isolated_and_resampled() {
    let gateway = MockGateway::new();
    // Exhaust all three attempts for the 5m fetch only
    gateway.queue_failures(
        "ohlcv:5m",
        GatewayError::Timeout("slow".to_string()),
        3,
    );
    let f = default_fixture(gateway);

    let report = f.cache.refresh("BTCUSDT").await.unwrap();
    assert!(report.failed.iter().any(|l| l == "ohlcv:5m"));
    assert!(report.fetched.iter().any(|l| l == "ohlcv:15m"));
    assert_eq!(report.synthetic, vec![Timeframe::M5]);

    let snap = f.cache.snapshot("BTCUSDT").await.unwrap();
    let m5 = snap.series(Timeframe::M5).expect("synthesized series");
    assert!(m5.synthetic, "fallback series must carry provenance");
    assert!(!snap.series(Timeframe::M15).unwrap().synthetic);
    assert_eq!(f.cache.stats().await.synthetic_series, 1);
}

#[tokio::test(start_paused = true)]
async fn test_open_interest_previous_and_history_update() {
    let f = default_fixture(MockGateway::new());

    f.cache.refresh("BTCUSDT").await.unwrap();
    let oi1 = f
        .cache
        .snapshot("BTCUSDT")
        .await
        .unwrap()
        .open_interest
        .unwrap();
    assert_eq!(oi1.previous, None);
    assert_eq!(oi1.history.len(), 1);

    // The mock moves OI on every poll, so the next reading is distinct
    f.cache.refresh("BTCUSDT").await.unwrap();
    let oi2 = f
        .cache
        .snapshot("BTCUSDT")
        .await
        .unwrap()
        .open_interest
        .unwrap();
    assert_eq!(oi2.previous, Some(oi1.current));
    assert_eq!(oi2.history.len(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_duplicate_open_interest_reading_is_noop() {
    let f = default_fixture(MockGateway::new().with_flat_open_interest());

    f.cache.refresh("BTCUSDT").await.unwrap();
    f.cache.refresh("BTCUSDT").await.unwrap();
    let oi = f
        .cache
        .snapshot("BTCUSDT")
        .await
        .unwrap()
        .open_interest
        .unwrap();
    assert_eq!(oi.previous, None, "equal reading must not rotate previous");
    assert_eq!(oi.history.len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_open_circuit_skips_feed_without_calling_gateway() {
    let gateway = MockGateway::new();
    gateway.queue_failures("trades", GatewayError::ConnectionFailed("down".to_string()), 1);
    let f = fixture(
        gateway,
        RetryConfig {
            max_attempts: 1,
            ..RetryConfig::default()
        },
        BreakerConfig {
            failure_threshold: 1,
            recovery_timeout_secs: 3600,
            half_open_successes_to_close: 2,
        },
    );

    let first = f.cache.refresh("BTCUSDT").await.unwrap();
    assert!(first.failed.iter().any(|l| l == "trades"));

    let second = f.cache.refresh("BTCUSDT").await.unwrap();
    assert!(second.skipped_circuit_open.iter().any(|l| l == "trades"));
    assert_eq!(f.gateway.calls("trades"), 1, "open circuit fails fast");

    let snap = f.cache.snapshot("BTCUSDT").await.unwrap();
    assert!(snap.trades.is_none());
    // Breaker state is visible through the registry
    let states = f.breakers.states();
    assert_eq!(
        states["gateway:trades"].state,
        market_data::CircuitState::Open
    );
}

#[tokio::test]
async fn test_stale_series_carried_when_fetch_fails() {
    let mut config = MarketDataConfig::default();
    config.freshness_overrides_secs.insert(Timeframe::M15, 1);

    let gateway = Arc::new(MockGateway::new());
    let gateway_dyn: Arc<dyn market_data::ExchangeGateway> = gateway.clone();
    let cache = MarketDataCache::new(
        config,
        vec![Timeframe::M5, Timeframe::M15],
        RetryConfig {
            max_attempts: 1,
            ..RetryConfig::default()
        },
        gateway_dyn,
        Arc::new(CircuitBreakerRegistry::new(BreakerConfig::default())),
        Arc::new(ResourceManager::new(ResourceConfig::default())),
    );

    cache.refresh("BTCUSDT").await.unwrap();
    let before_m15 = cache
        .snapshot("BTCUSDT")
        .await
        .unwrap()
        .series(Timeframe::M15)
        .unwrap()
        .clone();

    // Let the 1s window lapse, then fail the refetch
    tokio::time::sleep(std::time::Duration::from_millis(2500)).await;
    gateway.queue_failures("ohlcv:15m", GatewayError::Timeout("slow".to_string()), 1);

    let report = cache.refresh("BTCUSDT").await.unwrap();
    assert!(report.failed.iter().any(|l| l == "ohlcv:15m"));
    // M5 stays within its default window and is reused
    assert!(report.reused.iter().any(|l| l == "ohlcv:5m"));

    let after = cache.snapshot("BTCUSDT").await.unwrap();
    let carried = after.series(Timeframe::M15).expect("stale series carried");
    assert_eq!(carried.fetched_at, before_m15.fetched_at);
    assert_eq!(carried.len(), before_m15.len());
}
