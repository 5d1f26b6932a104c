//! Price structure scorer: swing trend plus range position

use services_common::{Component, ComponentScore, MarketSnapshot};

use super::{ComponentScorer, composite_to_score};

const LOOKBACK: usize = 20;
/// Swing windows the lookback splits into
const WINDOWS: usize = 4;

pub struct PriceStructureScorer {
    min_bars: usize,
}

impl Default for PriceStructureScorer {
    fn default() -> Self {
        Self { min_bars: LOOKBACK }
    }
}

impl ComponentScorer for PriceStructureScorer {
    fn component(&self) -> Component {
        Component::PriceStructure
    }

    fn score(&self, snapshot: &MarketSnapshot) -> ComponentScore {
        let Some(series) = snapshot.primary_series(self.min_bars) else {
            return ComponentScore::neutral(self.component());
        };
        let bars = &series.bars[series.len() - LOOKBACK..];

        let high = bars.iter().map(|b| b.high).fold(f64::MIN, f64::max);
        let low = bars.iter().map(|b| b.low).fold(f64::MAX, f64::min);
        let close = bars[LOOKBACK - 1].close;
        if !(high > low) {
            // Degenerate flat range carries no structure information
            return ComponentScore::neutral(self.component());
        }
        // Where the close sits in the recent range: 1 at the high, -1 at the low
        let range_position = ((close - low) / (high - low)) * 2.0 - 1.0;

        // Higher-highs/higher-lows across successive swing windows
        let window_len = LOOKBACK / WINDOWS;
        let mut trend_steps = 0.0;
        for w in 1..WINDOWS {
            let prev = &bars[(w - 1) * window_len..w * window_len];
            let curr = &bars[w * window_len..(w + 1) * window_len];
            let prev_high = prev.iter().map(|b| b.high).fold(f64::MIN, f64::max);
            let curr_high = curr.iter().map(|b| b.high).fold(f64::MIN, f64::max);
            let prev_low = prev.iter().map(|b| b.low).fold(f64::MAX, f64::min);
            let curr_low = curr.iter().map(|b| b.low).fold(f64::MAX, f64::min);

            if curr_high > prev_high && curr_low >= prev_low {
                trend_steps += 1.0;
            } else if curr_low < prev_low && curr_high <= prev_high {
                trend_steps -= 1.0;
            }
        }
        let structure_trend = trend_steps / (WINDOWS - 1) as f64;

        let composite = 0.5 * range_position + 0.5 * structure_trend;
        let score = ComponentScore::new(self.component(), composite_to_score(composite))
            .with_breakdown([
                ("range_position", range_position),
                ("structure_trend", structure_trend),
            ]);
        if series.synthetic { score.degraded() } else { score }
    }
}
