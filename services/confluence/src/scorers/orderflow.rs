//! Orderflow scorer: taker imbalance, large-trade flow, open-interest delta

use services_common::{Component, ComponentScore, MarketSnapshot, PublicTrade};

use super::{ComponentScorer, composite_to_score};

/// Multiple of the average trade size that qualifies as a large trade
const LARGE_TRADE_FACTOR: f64 = 4.0;
/// Open-interest change that saturates the OI component (5%)
const OI_SATURATION_PCT: f64 = 0.05;

#[derive(Default)]
pub struct OrderflowScorer;

impl OrderflowScorer {
    fn taker_imbalance(trades: &[PublicTrade]) -> Option<(f64, f64)> {
        let buy: f64 = trades.iter().filter(|t| t.is_buy).map(|t| t.qty).sum();
        let sell: f64 = trades.iter().filter(|t| !t.is_buy).map(|t| t.qty).sum();
        let total = buy + sell;
        if total <= 0.0 {
            return None;
        }
        let imbalance = (buy - sell) / total;

        // Large prints carry more information than the tape average
        let avg = total / trades.len() as f64;
        let threshold = avg * LARGE_TRADE_FACTOR;
        let large_buy: f64 = trades
            .iter()
            .filter(|t| t.is_buy && t.qty >= threshold)
            .map(|t| t.qty)
            .sum();
        let large_sell: f64 = trades
            .iter()
            .filter(|t| !t.is_buy && t.qty >= threshold)
            .map(|t| t.qty)
            .sum();
        let large_total = large_buy + large_sell;
        let large_imbalance = if large_total > 0.0 {
            (large_buy - large_sell) / large_total
        } else {
            0.0
        };
        Some((imbalance, large_imbalance))
    }
}

impl ComponentScorer for OrderflowScorer {
    fn component(&self) -> Component {
        Component::Orderflow
    }

    fn score(&self, snapshot: &MarketSnapshot) -> ComponentScore {
        let tape = snapshot
            .trades
            .as_deref()
            .filter(|t| !t.is_empty())
            .and_then(Self::taker_imbalance);
        let oi_component = snapshot
            .open_interest
            .as_ref()
            .and_then(|oi| oi.delta_pct())
            .map(|pct| (pct / OI_SATURATION_PCT).clamp(-1.0, 1.0));

        match (tape, oi_component) {
            (Some((imbalance, large_imbalance)), oi) => {
                let oi_value = oi.unwrap_or(0.0);
                // OI weight drops out when the feed is missing
                let composite = if oi.is_some() {
                    0.5 * imbalance + 0.3 * large_imbalance + 0.2 * oi_value
                } else {
                    0.6 * imbalance + 0.4 * large_imbalance
                };
                ComponentScore::new(self.component(), composite_to_score(composite))
                    .with_breakdown([
                        ("taker_imbalance", imbalance),
                        ("large_trade_imbalance", large_imbalance),
                        ("oi_delta", oi_value),
                    ])
            }
            (None, Some(oi_value)) => {
                // OI alone is a weak read; halve its pull
                ComponentScore::new(self.component(), composite_to_score(oi_value * 0.5))
                    .with_breakdown([("oi_delta", oi_value)])
            }
            (None, None) => ComponentScore::neutral(self.component()),
        }
    }
}
