//! Confluence aggregation and quality adjustment
//!
//! Fuses the per-component scores into one weighted base score, then dampens
//! it toward neutral in proportion to confidence. Confidence is signal
//! magnitude times cross-component consensus, so a score without agreement
//! behind it visibly regresses toward 50 instead of being reported at face
//! value — that suppression is the engine's defining contract.

use chrono::{DateTime, Utc};
use tracing::debug;

use services_common::{ComponentScore, ConfluenceResult, ScoringConfig, SentimentLabel};

/// Fuse component scores into a [`ConfluenceResult`].
///
/// Weights are renormalized over the available components; a zero total
/// weight degrades to equal weighting. Fewer than two available components
/// flags the result low-reliability instead of failing.
pub fn aggregate(
    symbol: &str,
    components: Vec<ComponentScore>,
    config: &ScoringConfig,
    ts: DateTime<Utc>,
) -> ConfluenceResult {
    let available: Vec<&ComponentScore> = components.iter().filter(|c| c.available).collect();
    let low_reliability = available.len() < 2;

    let normalized: Vec<f64> = available.iter().map(|c| c.normalized()).collect();
    let weights = renormalized_weights(&available, config);

    let weighted_sum: f64 = normalized
        .iter()
        .zip(&weights)
        .map(|(n, w)| n * w)
        .sum();

    let variance = population_variance(&normalized);
    let consensus = (-config.consensus_damping * variance).exp();
    let confidence = (weighted_sum.abs() * consensus).clamp(0.0, 1.0);

    let base_score = (weighted_sum * 50.0 + 50.0).clamp(0.0, 100.0);
    let adjusted_score = 50.0 + (base_score - 50.0) * confidence;
    let quality_impact = base_score - adjusted_score;

    let sentiment = if adjusted_score >= config.buy_threshold {
        SentimentLabel::Bullish
    } else if adjusted_score <= config.sell_threshold {
        SentimentLabel::Bearish
    } else {
        SentimentLabel::Neutral
    };

    debug!(
        symbol,
        base_score,
        adjusted_score,
        confidence,
        consensus,
        available = available.len(),
        "aggregated confluence"
    );

    ConfluenceResult {
        symbol: symbol.to_string(),
        base_score,
        adjusted_score,
        confidence,
        consensus,
        quality_impact,
        components,
        sentiment,
        low_reliability,
        ts,
    }
}

/// Non-negative weights over the available components, renormalized to sum
/// to 1; equal weighting when nothing is configured.
fn renormalized_weights(available: &[&ComponentScore], config: &ScoringConfig) -> Vec<f64> {
    let raw: Vec<f64> = available
        .iter()
        .map(|c| {
            config
                .weights
                .get(&c.component)
                .copied()
                .unwrap_or(0.0)
                .max(0.0)
        })
        .collect();
    let total: f64 = raw.iter().sum();
    if total > 0.0 {
        raw.iter().map(|w| w / total).collect()
    } else if !available.is_empty() {
        vec![1.0 / available.len() as f64; available.len()]
    } else {
        Vec::new()
    }
}

/// Population variance; zero when fewer than two values
fn population_variance(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let mean = values.iter().sum::<f64>() / values.len() as f64;
    values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / values.len() as f64
}
