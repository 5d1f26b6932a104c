//! Component score and confluence result types
//!
//! All six scorers share one convention: values live in [0, 100] with 50 as
//! the neutral midpoint, above 50 bullish-leaning, below 50 bearish-leaning.
//! "No data" is a flag, never an exception and never a silent zero.

use chrono::{DateTime, Utc};
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

use crate::constants::scoring::{NEUTRAL_SCORE, SCORE_MAX, SCORE_MIN};

/// Signal component identity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Component {
    Technical,
    Volume,
    Orderflow,
    Orderbook,
    Sentiment,
    PriceStructure,
}

impl Component {
    /// All components in canonical order
    pub const ALL: [Component; 6] = [
        Component::Technical,
        Component::Volume,
        Component::Orderflow,
        Component::Orderbook,
        Component::Sentiment,
        Component::PriceStructure,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Component::Technical => "technical",
            Component::Volume => "volume",
            Component::Orderflow => "orderflow",
            Component::Orderbook => "orderbook",
            Component::Sentiment => "sentiment",
            Component::PriceStructure => "price_structure",
        }
    }
}

/// One component's contribution to the confluence score
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComponentScore {
    /// Which component produced this score
    pub component: Component,
    /// Score in [0, 100]; 50 is neutral. Meaningful only when `available`.
    pub value: f64,
    /// False when the scorer had insufficient (or synthetic-only) data
    pub available: bool,
    /// Optional sub-indicator breakdown (name -> value)
    pub breakdown: FxHashMap<String, f64>,
}

impl ComponentScore {
    /// Score from a computed value; clamped into range, and degraded to
    /// neutral-unavailable when the input is not finite.
    pub fn new(component: Component, value: f64) -> Self {
        if !value.is_finite() {
            return Self::neutral(component);
        }
        Self {
            component,
            value: value.clamp(SCORE_MIN, SCORE_MAX),
            available: true,
            breakdown: FxHashMap::default(),
        }
    }

    /// Neutral, flagged-unavailable score (the "insufficient data" result)
    pub fn neutral(component: Component) -> Self {
        Self {
            component,
            value: NEUTRAL_SCORE,
            available: false,
            breakdown: FxHashMap::default(),
        }
    }

    /// Attach a sub-indicator breakdown
    pub fn with_breakdown(
        mut self,
        entries: impl IntoIterator<Item = (&'static str, f64)>,
    ) -> Self {
        self.breakdown
            .extend(entries.into_iter().map(|(k, v)| (k.to_string(), v)));
        self
    }

    /// Keep the computed value but flag it unavailable (degraded provenance)
    pub fn degraded(mut self) -> Self {
        self.available = false;
        self
    }

    /// Score mapped onto [-1, 1] around the neutral midpoint
    pub fn normalized(&self) -> f64 {
        (self.value - NEUTRAL_SCORE) / NEUTRAL_SCORE
    }
}

/// Directional label derived from the adjusted score
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SentimentLabel {
    Bullish,
    Bearish,
    Neutral,
}

/// Final fused output for one symbol, immutable after creation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfluenceResult {
    /// Symbol
    pub symbol: String,
    /// Weighted component score before quality adjustment, in [0, 100]
    pub base_score: f64,
    /// Base score dampened toward neutral in proportion to confidence
    pub adjusted_score: f64,
    /// Signal confidence in [0, 1]
    pub confidence: f64,
    /// Cross-component agreement in [0, 1]
    pub consensus: f64,
    /// `base_score - adjusted_score`
    pub quality_impact: f64,
    /// Per-component scores that fed the aggregation
    pub components: Vec<ComponentScore>,
    /// Directional label from the adjusted score
    pub sentiment: SentimentLabel,
    /// Set when fewer than two components were available
    pub low_reliability: bool,
    /// Aggregation timestamp
    pub ts: DateTime<Utc>,
}
