//! Orderbook scorer: depth imbalance damped by spread quality

use services_common::{Component, ComponentScore, MarketSnapshot};

use super::{ComponentScorer, composite_to_score};

/// Spread (as a fraction of mid) at which book quality halves
const SPREAD_HALF_LIFE: f64 = 0.001;

#[derive(Default)]
pub struct OrderbookScorer;

impl ComponentScorer for OrderbookScorer {
    fn component(&self) -> Component {
        Component::Orderbook
    }

    fn score(&self, snapshot: &MarketSnapshot) -> ComponentScore {
        let Some(book) = snapshot.orderbook.as_ref() else {
            return ComponentScore::neutral(self.component());
        };
        let (Some(best_bid), Some(best_ask)) = (book.best_bid(), book.best_ask()) else {
            return ComponentScore::neutral(self.component());
        };
        let Some(mid) = book.mid_price() else {
            return ComponentScore::neutral(self.component());
        };
        if mid <= 0.0 || best_ask.price < best_bid.price {
            return ComponentScore::neutral(self.component());
        }

        let bid_depth = book.bid_depth();
        let ask_depth = book.ask_depth();
        let total_depth = bid_depth + ask_depth;
        if total_depth <= 0.0 {
            return ComponentScore::neutral(self.component());
        }
        let imbalance = (bid_depth - ask_depth) / total_depth;

        // A wide spread means the resting depth is soft information; pull
        // the read toward neutral instead of trusting it outright
        let spread_frac = (best_ask.price - best_bid.price) / mid;
        let quality = SPREAD_HALF_LIFE / (SPREAD_HALF_LIFE + spread_frac.max(0.0));

        let composite = imbalance * quality;
        ComponentScore::new(self.component(), composite_to_score(composite)).with_breakdown([
            ("depth_imbalance", imbalance),
            ("spread_pct", spread_frac * 100.0),
            ("book_quality", quality),
        ])
    }
}
