//! Sentiment scorer
//!
//! Positioning proxy built from the ticker's 24h momentum and open-interest
//! flow: rising OI behind a move is conviction, falling OI against it is
//! unwinding. Without a ticker there is no price context, so the score is
//! unavailable.

use services_common::{Component, ComponentScore, MarketSnapshot};

use super::{ComponentScorer, composite_to_score};

/// 24h move that saturates the momentum component (10%)
const MOMENTUM_SATURATION_PCT: f64 = 0.10;
/// Open-interest change that saturates the flow component (5%)
const OI_SATURATION_PCT: f64 = 0.05;

#[derive(Default)]
pub struct SentimentScorer;

impl ComponentScorer for SentimentScorer {
    fn component(&self) -> Component {
        Component::Sentiment
    }

    fn score(&self, snapshot: &MarketSnapshot) -> ComponentScore {
        let Some(ticker) = snapshot.ticker.as_ref() else {
            return ComponentScore::neutral(self.component());
        };
        if !ticker.change_24h_pct.is_finite() {
            return ComponentScore::neutral(self.component());
        }

        let momentum = (ticker.change_24h_pct / MOMENTUM_SATURATION_PCT).clamp(-1.0, 1.0);

        let oi_flow = snapshot
            .open_interest
            .as_ref()
            .and_then(|oi| oi.delta_pct())
            .map(|pct| (pct / OI_SATURATION_PCT).clamp(-1.0, 1.0));

        let composite = match oi_flow {
            // OI growth amplifies the prevailing direction; OI decline
            // fades it (position unwinding, not fresh conviction)
            Some(flow) => {
                let direction = if momentum >= 0.0 { 1.0 } else { -1.0 };
                0.6 * momentum + 0.4 * flow * direction
            }
            None => momentum,
        };

        ComponentScore::new(self.component(), composite_to_score(composite)).with_breakdown([
            ("price_momentum", momentum),
            ("oi_flow", oi_flow.unwrap_or(0.0)),
        ])
    }
}
