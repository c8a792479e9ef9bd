//! Weighted linear severity scoring for correlated events.

use crate::config::ScoringWeights;
use crate::types::event::{CorrelatedEvent, CorrelatedEvidence};

/// Score above which a correlated event is labelled high severity.
pub const HIGH_SEVERITY_CUTOFF: f64 = 0.7;

/// Weighted linear combination of the evidence features present on the event,
/// plus a flat cross-correlation bonus, clamped to [0, 1].
pub fn score(event: &CorrelatedEvent, weights: &ScoringWeights) -> f64 {
    let mut total = 0.0;

    match &event.evidence {
        CorrelatedEvidence::FraudAttempt {
            weight_discrepancy_pct,
            recognition_confidence,
            ..
        } => {
            total += (weight_discrepancy_pct / 100.0).min(1.0) * weights.weight_discrepancy;
            total += (1.0 - recognition_confidence) * weights.recognition_confidence;
        }
        CorrelatedEvidence::CustomerDifficulty { .. } => {}
    }

    // Every correlated event carries the cross-stream bonus by construction
    total += weights.cross_correlation;

    total.clamp(0.0, 1.0)
}

/// Severity bucket for a score.
pub fn severity_label(score: f64) -> &'static str {
    if score > HIGH_SEVERITY_CUTOFF {
        "high"
    } else {
        "medium"
    }
}
