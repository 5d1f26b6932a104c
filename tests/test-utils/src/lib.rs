//! Shared test fixtures: a scriptable mock exchange gateway and snapshot
//! builders used by the service integration tests.

use std::collections::VecDeque;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use once_cell::sync::Lazy;
use parking_lot::Mutex;
use rustc_hash::FxHashMap;

use market_data::ExchangeGateway;
use services_common::{
    BookLevel, GatewayError, MarketSnapshot, OhlcvBar, OhlcvSeries, OpenInterest, OrderBook,
    PublicTrade, Ticker, Timeframe,
};

static TRACING: Lazy<()> = Lazy::new(|| {
    services_common::telemetry::init_tracing();
});

/// Install the test tracing subscriber once per process
pub fn init_test_tracing() {
    Lazy::force(&TRACING);
}

/// Deterministic mock gateway with scriptable per-endpoint failures.
///
/// Endpoint labels: `"ticker"`, `"trades"`, `"orderbook"`, `"open_interest"`,
/// `"ohlcv:<tf>"` (e.g. `"ohlcv:5m"`), or the catch-all `"ohlcv"`.
pub struct MockGateway {
    /// Per-bar fractional drift of the generated price walk
    trend: f64,
    base_price: f64,
    latency: Option<Duration>,
    failures: Mutex<FxHashMap<String, VecDeque<GatewayError>>>,
    calls: DashMap<String, u64>,
    open_interest: Mutex<f64>,
    /// Increment applied to open interest per fetch; 0 keeps it flat
    oi_step: f64,
}

impl Default for MockGateway {
    fn default() -> Self {
        Self::new()
    }
}

impl MockGateway {
    pub fn new() -> Self {
        Self {
            trend: 0.001,
            base_price: 100.0,
            latency: None,
            failures: Mutex::new(FxHashMap::default()),
            calls: DashMap::new(),
            open_interest: Mutex::new(10_000.0),
            oi_step: 25.0,
        }
    }

    /// Bullish/bearish drift of the generated data (fraction per bar)
    pub fn with_trend(mut self, trend: f64) -> Self {
        self.trend = trend;
        self
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    pub fn with_flat_open_interest(mut self) -> Self {
        self.oi_step = 0.0;
        self
    }

    /// Queue `times` consecutive failures for an endpoint
    pub fn queue_failures(&self, endpoint: &str, err: GatewayError, times: usize) {
        let mut failures = self.failures.lock();
        let queue = failures.entry(endpoint.to_string()).or_default();
        for _ in 0..times {
            queue.push_back(err.clone());
        }
    }

    /// How many times an endpoint was called (failures included)
    pub fn calls(&self, endpoint: &str) -> u64 {
        self.calls.get(endpoint).map(|c| *c).unwrap_or(0)
    }

    async fn enter(&self, endpoint: &str) -> Result<(), GatewayError> {
        *self.calls.entry(endpoint.to_string()).or_insert(0) += 1;
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
        let scripted = {
            let mut failures = self.failures.lock();
            let direct = failures.get_mut(endpoint).and_then(VecDeque::pop_front);
            match direct {
                Some(err) => Some(err),
                None => endpoint
                    .split_once(':')
                    .and_then(|(class, _)| failures.get_mut(class))
                    .and_then(VecDeque::pop_front),
            }
        };
        match scripted {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    fn price_at(&self, step: usize) -> f64 {
        // Smooth drift with a small deterministic wobble
        self.base_price
            * (1.0 + self.trend * step as f64 + 0.002 * (step as f64 * 0.7).sin())
    }
}

#[async_trait]
impl ExchangeGateway for MockGateway {
    async fn fetch_ticker(&self, _symbol: &str) -> Result<Ticker, GatewayError> {
        self.enter("ticker").await?;
        let last = self.price_at(300);
        Ok(Ticker {
            last_price: last,
            bid: last * 0.9995,
            ask: last * 1.0005,
            volume_24h: 5_000_000.0,
            change_24h_pct: self.trend * 50.0,
            ts: Utc::now(),
        })
    }

    async fn fetch_ohlcv(
        &self,
        _symbol: &str,
        timeframe: Timeframe,
        limit: usize,
    ) -> Result<Vec<OhlcvBar>, GatewayError> {
        self.enter(&format!("ohlcv:{}", timeframe.as_str())).await?;
        let now = Utc::now();
        let step_secs = timeframe.duration_seconds();
        let bars = (0..limit)
            .map(|i| {
                let close = self.price_at(i);
                let open = self.price_at(i.saturating_sub(1));
                OhlcvBar {
                    open_time: now - chrono::Duration::seconds(step_secs * (limit - i) as i64),
                    open,
                    high: open.max(close) * 1.001,
                    low: open.min(close) * 0.999,
                    close,
                    volume: 50.0 + 10.0 * ((i as f64) * 0.3).sin(),
                }
            })
            .collect();
        Ok(bars)
    }

    async fn fetch_trades(
        &self,
        _symbol: &str,
        limit: usize,
    ) -> Result<Vec<PublicTrade>, GatewayError> {
        self.enter("trades").await?;
        let now = Utc::now();
        // Buy share tracks the trend direction
        let buy_share = (0.5 + self.trend * 100.0).clamp(0.1, 0.9);
        let buys = (limit as f64 * buy_share) as usize;
        let trades = (0..limit)
            .map(|i| PublicTrade {
                price: self.price_at(200 + i),
                qty: 1.0 + (i % 7) as f64 * 0.5,
                is_buy: i < buys,
                ts: now - chrono::Duration::milliseconds((limit - i) as i64 * 100),
            })
            .collect();
        Ok(trades)
    }

    async fn fetch_orderbook(
        &self,
        _symbol: &str,
        depth: usize,
    ) -> Result<OrderBook, GatewayError> {
        self.enter("orderbook").await?;
        let mid = self.price_at(300);
        let tilt = (1.0 + self.trend * 200.0).clamp(0.2, 5.0);
        let bids = (0..depth)
            .map(|i| BookLevel {
                price: mid * (1.0 - 0.0001 * (i + 1) as f64),
                qty: 10.0 * tilt,
            })
            .collect();
        let asks = (0..depth)
            .map(|i| BookLevel {
                price: mid * (1.0 + 0.0001 * (i + 1) as f64),
                qty: 10.0 / tilt,
            })
            .collect();
        Ok(OrderBook {
            bids,
            asks,
            ts: Utc::now(),
        })
    }

    async fn fetch_open_interest(&self, _symbol: &str) -> Result<f64, GatewayError> {
        self.enter("open_interest").await?;
        let mut oi = self.open_interest.lock();
        *oi += self.oi_step * self.trend.signum();
        Ok(*oi)
    }
}

/// Ordered bar series with a constant per-bar drift
pub fn trending_series(
    timeframe: Timeframe,
    bars: usize,
    base_price: f64,
    drift: f64,
) -> OhlcvSeries {
    let start = Utc::now() - chrono::Duration::seconds(timeframe.duration_seconds() * bars as i64);
    let bars: Vec<OhlcvBar> = (0..bars)
        .map(|i| {
            let close = base_price * (1.0 + drift * i as f64);
            let open = base_price * (1.0 + drift * i.saturating_sub(1) as f64);
            OhlcvBar {
                open_time: start + chrono::Duration::seconds(timeframe.duration_seconds() * i as i64),
                open,
                high: open.max(close) * 1.001,
                low: open.min(close) * 0.999,
                close,
                volume: 25.0,
            }
        })
        .collect();
    OhlcvSeries::new(timeframe, bars)
}

/// Snapshot with every feed populated and leaning in `drift`'s direction
pub fn full_snapshot(symbol: &str, drift: f64) -> MarketSnapshot {
    let ts: DateTime<Utc> = Utc::now();
    let mut snap = MarketSnapshot::new(symbol, ts);
    for tf in [Timeframe::M5, Timeframe::M15, Timeframe::H1] {
        snap.series.insert(tf, trending_series(tf, 80, 100.0, drift));
    }

    let buys = if drift >= 0.0 { 70 } else { 30 };
    snap.trades = Some(
        (0..100)
            .map(|i| PublicTrade {
                price: 100.0,
                qty: 1.0 + (i % 5) as f64,
                is_buy: i < buys,
                ts,
            })
            .collect(),
    );

    let tilt = if drift >= 0.0 { 2.0 } else { 0.5 };
    snap.orderbook = Some(OrderBook {
        bids: (0..10)
            .map(|i| BookLevel {
                price: 99.9 - i as f64 * 0.1,
                qty: 10.0 * tilt,
            })
            .collect(),
        asks: (0..10)
            .map(|i| BookLevel {
                price: 100.1 + i as f64 * 0.1,
                qty: 10.0 / tilt,
            })
            .collect(),
        ts,
    });

    let mut oi = OpenInterest::new(10_000.0, ts - chrono::Duration::seconds(120));
    oi.apply_reading(10_000.0 * (1.0 + drift.signum() * 0.03), ts);
    snap.open_interest = Some(oi);

    snap.ticker = Some(Ticker {
        last_price: 100.0,
        bid: 99.95,
        ask: 100.05,
        volume_24h: 1_000_000.0,
        change_24h_pct: drift * 40.0,
        ts,
    });
    snap
}
