//! Technical indicator scorer: RSI, MACD histogram, EMA alignment

use services_common::{Component, ComponentScore, MarketSnapshot};

use super::{ComponentScorer, composite_to_score, ema, ema_series, rsi};

const RSI_PERIOD: usize = 14;
const MACD_FAST: usize = 12;
const MACD_SLOW: usize = 26;
const MACD_SIGNAL: usize = 9;
const EMA_FAST: usize = 20;
const EMA_SLOW: usize = 50;

pub struct TechnicalScorer {
    /// Bars required before the indicators are trusted
    min_bars: usize,
}

impl Default for TechnicalScorer {
    fn default() -> Self {
        Self { min_bars: EMA_SLOW + 10 }
    }
}

impl TechnicalScorer {
    fn composite(&self, closes: &[f64]) -> Option<(f64, f64, f64, f64)> {
        let last_close = *closes.last()?;
        if last_close <= 0.0 {
            return None;
        }

        let rsi_value = rsi(closes, RSI_PERIOD)?;
        let rsi_component = ((rsi_value - 50.0) / 50.0).clamp(-1.0, 1.0);

        // MACD histogram, normalized as a percentage of price; 1% saturates
        let fast = ema_series(closes, MACD_FAST);
        let slow = ema_series(closes, MACD_SLOW);
        let macd_line: Vec<f64> = fast.iter().zip(&slow).map(|(f, s)| f - s).collect();
        let signal = ema_series(&macd_line, MACD_SIGNAL);
        let histogram = macd_line.last()? - signal.last()?;
        let hist_pct = histogram / last_close * 100.0;
        let macd_component = hist_pct.clamp(-1.0, 1.0);

        // Fast/slow EMA spread as a percentage of the slow EMA; 2% saturates
        let ema_fast = ema(closes, EMA_FAST)?;
        let ema_slow = ema(closes, EMA_SLOW)?;
        if ema_slow <= 0.0 {
            return None;
        }
        let spread_pct = (ema_fast - ema_slow) / ema_slow * 100.0;
        let ema_component = (spread_pct / 2.0).clamp(-1.0, 1.0);

        let composite =
            0.40 * rsi_component + 0.35 * macd_component + 0.25 * ema_component;
        Some((composite, rsi_value, hist_pct, spread_pct))
    }
}

impl ComponentScorer for TechnicalScorer {
    fn component(&self) -> Component {
        Component::Technical
    }

    fn score(&self, snapshot: &MarketSnapshot) -> ComponentScore {
        let Some(series) = snapshot.primary_series(self.min_bars) else {
            return ComponentScore::neutral(self.component());
        };
        let closes = series.closes();
        let Some((composite, rsi_value, hist_pct, spread_pct)) = self.composite(&closes) else {
            return ComponentScore::neutral(self.component());
        };

        let score = ComponentScore::new(self.component(), composite_to_score(composite))
            .with_breakdown([
                ("rsi", rsi_value),
                ("macd_hist_pct", hist_pct),
                ("ema_spread_pct", spread_pct),
            ]);
        if series.synthetic {
            score.degraded()
        } else {
            score
        }
    }
}
