//! Volume scorer: direction-weighted volume delta with surge emphasis

use services_common::{Component, ComponentScore, MarketSnapshot};

use super::{ComponentScorer, composite_to_score};

const LOOKBACK: usize = 20;
const RECENT: usize = 5;

pub struct VolumeScorer {
    min_bars: usize,
}

impl Default for VolumeScorer {
    fn default() -> Self {
        Self { min_bars: LOOKBACK + RECENT }
    }
}

impl ComponentScorer for VolumeScorer {
    fn component(&self) -> Component {
        Component::Volume
    }

    fn score(&self, snapshot: &MarketSnapshot) -> ComponentScore {
        let Some(series) = snapshot.primary_series(self.min_bars) else {
            return ComponentScore::neutral(self.component());
        };
        let bars = &series.bars[series.len() - LOOKBACK..];

        let mut up_volume = 0.0;
        let mut down_volume = 0.0;
        for bar in bars {
            if bar.close > bar.open {
                up_volume += bar.volume;
            } else if bar.close < bar.open {
                down_volume += bar.volume;
            }
        }
        let total = up_volume + down_volume;
        if total <= 0.0 {
            return ComponentScore::neutral(self.component());
        }
        let delta = (up_volume - down_volume) / total;

        // Volume surge: recent bars against the lookback baseline
        let recent_avg: f64 =
            bars[LOOKBACK - RECENT..].iter().map(|b| b.volume).sum::<f64>() / RECENT as f64;
        let baseline_avg: f64 = bars.iter().map(|b| b.volume).sum::<f64>() / LOOKBACK as f64;
        let surge_ratio = if baseline_avg > 0.0 {
            recent_avg / baseline_avg
        } else {
            1.0
        };

        // A surge amplifies the directional read, a lull mutes it
        let composite = (delta * surge_ratio.clamp(0.5, 2.0)).clamp(-1.0, 1.0);

        let score = ComponentScore::new(self.component(), composite_to_score(composite))
            .with_breakdown([("volume_delta", delta), ("surge_ratio", surge_ratio)]);
        if series.synthetic { score.degraded() } else { score }
    }
}
