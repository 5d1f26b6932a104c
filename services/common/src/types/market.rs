//! Market data snapshot types
//!
//! A [`MarketSnapshot`] is the unit handed to the component scorers: one
//! symbol, several timeframes of OHLCV, plus optional orderbook, trades and
//! open-interest feeds. Snapshots are built by the market data cache and are
//! read-only to consumers; a refresh replaces the whole snapshot atomically.

use chrono::{DateTime, Utc};
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

use crate::constants::cache::{MIN_FRESHNESS_SECS, OI_HISTORY_CAP};

/// Timeframe for aggregation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Timeframe {
    /// 1 minute bars
    M1,
    /// 5 minute bars
    M5,
    /// 15 minute bars
    M15,
    /// 1 hour bars
    H1,
    /// 4 hour bars
    H4,
    /// Daily bars
    D1,
}

impl Timeframe {
    /// All timeframes, finest first
    pub const ALL: [Timeframe; 6] = [
        Timeframe::M1,
        Timeframe::M5,
        Timeframe::M15,
        Timeframe::H1,
        Timeframe::H4,
        Timeframe::D1,
    ];

    /// Get duration in seconds
    pub fn duration_seconds(&self) -> i64 {
        match self {
            Timeframe::M1 => 60,
            Timeframe::M5 => 300,
            Timeframe::M15 => 900,
            Timeframe::H1 => 3600,
            Timeframe::H4 => 14400,
            Timeframe::D1 => 86400,
        }
    }

    /// Exchange-style label ("5m", "1h", ...)
    pub fn as_str(&self) -> &'static str {
        match self {
            Timeframe::M1 => "1m",
            Timeframe::M5 => "5m",
            Timeframe::M15 => "15m",
            Timeframe::H1 => "1h",
            Timeframe::H4 => "4h",
            Timeframe::D1 => "1d",
        }
    }

    /// Default freshness window: one bar duration, floored so the fastest
    /// timeframes are not refetched on every access.
    pub fn default_freshness_secs(&self) -> u64 {
        // SAFETY: duration_seconds() is a positive constant table
        (self.duration_seconds() as u64).max(MIN_FRESHNESS_SECS)
    }
}

/// OHLCV bar
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct OhlcvBar {
    /// Open time
    pub open_time: DateTime<Utc>,
    /// Open price
    pub open: f64,
    /// High price
    pub high: f64,
    /// Low price
    pub low: f64,
    /// Close price
    pub close: f64,
    /// Volume
    pub volume: f64,
}

impl OhlcvBar {
    /// Whether all fields are finite and internally consistent
    pub fn is_valid(&self) -> bool {
        let finite = [self.open, self.high, self.low, self.close, self.volume]
            .iter()
            .all(|v| v.is_finite());
        finite
            && self.high >= self.low
            && self.high >= self.open.min(self.close)
            && self.low <= self.open.max(self.close)
            && self.volume >= 0.0
    }
}

/// One timeframe's ordered bar series inside a snapshot
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OhlcvSeries {
    /// Timeframe
    pub timeframe: Timeframe,
    /// Bars, strictly ascending by `open_time`
    pub bars: Vec<OhlcvBar>,
    /// True when this series was resampled from a coarser timeframe instead
    /// of fetched; downstream scorers must discount it.
    pub synthetic: bool,
    /// When this series was fetched (or synthesized)
    pub fetched_at: DateTime<Utc>,
}

impl OhlcvSeries {
    /// Build a series from raw bars, dropping invalid bars and enforcing the
    /// ordered/non-overlapping invariant (sorted by open time, deduplicated).
    pub fn new(timeframe: Timeframe, mut bars: Vec<OhlcvBar>) -> Self {
        bars.retain(OhlcvBar::is_valid);
        bars.sort_by_key(|b| b.open_time);
        bars.dedup_by_key(|b| b.open_time);
        Self {
            timeframe,
            bars,
            synthetic: false,
            fetched_at: Utc::now(),
        }
    }

    /// Mark this series as a resampled approximation
    pub fn into_synthetic(mut self) -> Self {
        self.synthetic = true;
        self
    }

    pub fn len(&self) -> usize {
        self.bars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bars.is_empty()
    }

    pub fn last(&self) -> Option<&OhlcvBar> {
        self.bars.last()
    }

    /// Close prices in chronological order
    pub fn closes(&self) -> Vec<f64> {
        self.bars.iter().map(|b| b.close).collect()
    }

    /// Whether the series is fresh within the given window
    pub fn is_fresh(&self, now: DateTime<Utc>, freshness_secs: u64) -> bool {
        // SAFETY: freshness windows are bounded well below i64::MAX seconds
        (now - self.fetched_at).num_seconds() <= freshness_secs as i64
    }
}

/// One side's level in an L2 orderbook
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BookLevel {
    /// Price level
    pub price: f64,
    /// Quantity at this level
    pub qty: f64,
}

/// L2 orderbook snapshot
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderBook {
    /// Bid levels, best first
    pub bids: Vec<BookLevel>,
    /// Ask levels, best first
    pub asks: Vec<BookLevel>,
    /// Snapshot timestamp
    pub ts: DateTime<Utc>,
}

impl OrderBook {
    pub fn best_bid(&self) -> Option<&BookLevel> {
        self.bids.first()
    }

    pub fn best_ask(&self) -> Option<&BookLevel> {
        self.asks.first()
    }

    /// Mid price, if both sides are present
    pub fn mid_price(&self) -> Option<f64> {
        match (self.best_bid(), self.best_ask()) {
            (Some(b), Some(a)) => Some((b.price + a.price) / 2.0),
            _ => None,
        }
    }

    /// Total quantity on the bid side
    pub fn bid_depth(&self) -> f64 {
        self.bids.iter().map(|l| l.qty).sum()
    }

    /// Total quantity on the ask side
    pub fn ask_depth(&self) -> f64 {
        self.asks.iter().map(|l| l.qty).sum()
    }
}

/// Public trade print
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PublicTrade {
    /// Trade price
    pub price: f64,
    /// Trade quantity
    pub qty: f64,
    /// True when the aggressor was the buyer
    pub is_buy: bool,
    /// Trade timestamp
    pub ts: DateTime<Utc>,
}

/// One historical open-interest reading
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct OpenInterestPoint {
    pub value: f64,
    pub ts: DateTime<Utc>,
}

/// Open-interest state for a symbol
///
/// `previous` moves to the old `current` only when a new reading actually
/// differs, so duplicate polls do not spam the history ring.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenInterest {
    /// Latest reading
    pub current: f64,
    /// Reading before the latest distinct change
    pub previous: Option<f64>,
    /// Newest-first history, capped at `OI_HISTORY_CAP`
    pub history: VecDeque<OpenInterestPoint>,
    /// Timestamp of the latest reading
    pub ts: DateTime<Utc>,
}

impl OpenInterest {
    pub fn new(value: f64, ts: DateTime<Utc>) -> Self {
        let mut history = VecDeque::with_capacity(16);
        history.push_front(OpenInterestPoint { value, ts });
        Self {
            current: value,
            previous: None,
            history,
            ts,
        }
    }

    /// Fold in a new reading. A value equal to the stored `current` only
    /// bumps the timestamp; a distinct value rotates `previous` and appends
    /// to the capped history.
    pub fn apply_reading(&mut self, value: f64, ts: DateTime<Utc>) {
        if value == self.current {
            self.ts = ts;
            return;
        }
        self.previous = Some(self.current);
        self.current = value;
        self.ts = ts;
        self.history.push_front(OpenInterestPoint { value, ts });
        self.history.truncate(OI_HISTORY_CAP);
    }

    /// Fractional change of `current` against `previous`, if any
    pub fn delta_pct(&self) -> Option<f64> {
        self.previous.filter(|p| *p != 0.0).map(|p| (self.current - p) / p)
    }
}

/// Ticker summary
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Ticker {
    pub last_price: f64,
    pub bid: f64,
    pub ask: f64,
    /// Rolling 24h quote volume
    pub volume_24h: f64,
    /// Fractional 24h price change (0.05 = +5%)
    pub change_24h_pct: f64,
    pub ts: DateTime<Utc>,
}

/// Full per-symbol market state handed to the scorers
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarketSnapshot {
    /// Symbol
    pub symbol: String,
    /// When this snapshot was assembled
    pub ts: DateTime<Utc>,
    /// OHLCV per timeframe
    pub series: FxHashMap<Timeframe, OhlcvSeries>,
    /// L2 orderbook, when the feed was available
    pub orderbook: Option<OrderBook>,
    /// Recent public trades, when the feed was available
    pub trades: Option<Vec<PublicTrade>>,
    /// Open-interest state, when the feed was available
    pub open_interest: Option<OpenInterest>,
    /// Ticker summary, when the feed was available
    pub ticker: Option<Ticker>,
}

impl MarketSnapshot {
    pub fn new(symbol: impl Into<String>, ts: DateTime<Utc>) -> Self {
        Self {
            symbol: symbol.into(),
            ts,
            series: FxHashMap::default(),
            orderbook: None,
            trades: None,
            open_interest: None,
            ticker: None,
        }
    }

    /// Series for a timeframe
    pub fn series(&self, timeframe: Timeframe) -> Option<&OhlcvSeries> {
        self.series.get(&timeframe)
    }

    /// Finest non-synthetic series with at least `min_bars` bars, falling
    /// back to a synthetic one if that is all the snapshot holds.
    pub fn primary_series(&self, min_bars: usize) -> Option<&OhlcvSeries> {
        let usable = |s: &&OhlcvSeries| s.len() >= min_bars;
        Timeframe::ALL
            .iter()
            .filter_map(|tf| self.series.get(tf))
            .filter(|s| !s.synthetic)
            .find(usable)
            .or_else(|| {
                Timeframe::ALL
                    .iter()
                    .filter_map(|tf| self.series.get(tf))
                    .find(usable)
            })
    }
}
