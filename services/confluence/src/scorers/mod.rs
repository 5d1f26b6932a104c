//! Component scorers
//!
//! One scorer per signal component. The shared contract: a scorer never
//! fails — on missing, malformed or synthetic-only data it returns the
//! neutral score flagged unavailable, and on valid data a value in
//! [0, 100] where 50 is neutral, above 50 bullish-leaning, below bearish.

mod orderbook;
mod orderflow;
mod price_structure;
mod sentiment;
mod technical;
mod volume;

pub use orderbook::OrderbookScorer;
pub use orderflow::OrderflowScorer;
pub use price_structure::PriceStructureScorer;
pub use sentiment::SentimentScorer;
pub use technical::TechnicalScorer;
pub use volume::VolumeScorer;

use services_common::{Component, ComponentScore, MarketSnapshot};

/// Capability interface for the pluggable signal components
pub trait ComponentScorer: Send + Sync {
    /// Which component this scorer produces
    fn component(&self) -> Component;

    /// Score one snapshot. Must not panic; absence of data is signaled via
    /// the `available` flag on the returned score.
    fn score(&self, snapshot: &MarketSnapshot) -> ComponentScore;
}

/// The standard six-scorer set
pub fn default_scorers() -> Vec<Box<dyn ComponentScorer>> {
    vec![
        Box::new(TechnicalScorer::default()),
        Box::new(VolumeScorer::default()),
        Box::new(OrderflowScorer::default()),
        Box::new(OrderbookScorer::default()),
        Box::new(SentimentScorer::default()),
        Box::new(PriceStructureScorer::default()),
    ]
}

/// Map a composite in [-1, 1] onto the shared 0-100 score scale
pub(crate) fn composite_to_score(composite: f64) -> f64 {
    50.0 + 50.0 * composite.clamp(-1.0, 1.0)
}

/// Full EMA series, seeded with the first value
pub(crate) fn ema_series(values: &[f64], period: usize) -> Vec<f64> {
    if values.is_empty() || period == 0 {
        return Vec::new();
    }
    let alpha = 2.0 / (period as f64 + 1.0);
    let mut out = Vec::with_capacity(values.len());
    let mut ema = values[0];
    for v in values {
        ema = alpha * v + (1.0 - alpha) * ema;
        out.push(ema);
    }
    out
}

/// Latest EMA value, None when the series is shorter than the period
pub(crate) fn ema(values: &[f64], period: usize) -> Option<f64> {
    if values.len() < period {
        return None;
    }
    ema_series(values, period).last().copied()
}

/// Wilder-smoothed RSI over closes, None when there is not enough history
pub(crate) fn rsi(closes: &[f64], period: usize) -> Option<f64> {
    if closes.len() < period + 1 {
        return None;
    }
    let mut gains = 0.0;
    let mut losses = 0.0;
    for w in closes[..=period].windows(2) {
        let delta = w[1] - w[0];
        if delta >= 0.0 {
            gains += delta;
        } else {
            losses -= delta;
        }
    }
    let mut avg_gain = gains / period as f64;
    let mut avg_loss = losses / period as f64;
    for w in closes[period..].windows(2) {
        let delta = w[1] - w[0];
        let (gain, loss) = if delta >= 0.0 { (delta, 0.0) } else { (0.0, -delta) };
        avg_gain = (avg_gain * (period as f64 - 1.0) + gain) / period as f64;
        avg_loss = (avg_loss * (period as f64 - 1.0) + loss) / period as f64;
    }
    if avg_loss == 0.0 {
        return Some(100.0);
    }
    let rs = avg_gain / avg_loss;
    Some(100.0 - 100.0 / (1.0 + rs))
}
