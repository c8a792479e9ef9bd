//! Cross-stream correlation: joins detector findings from different streams
//! at the same station within a time window into composite events.

use crate::config::CorrelationConfig;
use crate::detectors::pos::WeightDiscrepancy;
use crate::detectors::queue::{DwellAnomaly, DwellAnomalyKind};
use crate::detectors::recognition::LowConfidenceEvent;
use crate::types::event::{
    ConfidenceTier, CorrelatedEvent, CorrelatedEvidence, CorrelatedKind, RelatedFinding,
};
use chrono::NaiveDateTime;
use tracing::debug;

fn within_window(a: NaiveDateTime, b: NaiveDateTime, window_secs: i64) -> bool {
    (a - b).num_seconds().abs() <= window_secs
}

/// Correlate findings across streams. The window boundary is inclusive.
pub fn correlate(
    weight_discrepancies: &[WeightDiscrepancy],
    low_confidence: &[LowConfidenceEvent],
    dwell_anomalies: &[DwellAnomaly],
    config: &CorrelationConfig,
) -> Vec<CorrelatedEvent> {
    let mut events = Vec::new();

    correlate_fraud_attempts(weight_discrepancies, low_confidence, config, &mut events);
    correlate_customer_difficulty(
        dwell_anomalies,
        weight_discrepancies,
        low_confidence,
        config,
        &mut events,
    );

    debug!(correlated = events.len(), "correlation complete");
    events
}

/// A weight discrepancy paired with poor recognition at the same station is
/// the strongest composite signal the pipeline produces.
fn correlate_fraud_attempts(
    weight_discrepancies: &[WeightDiscrepancy],
    low_confidence: &[LowConfidenceEvent],
    config: &CorrelationConfig,
    events: &mut Vec<CorrelatedEvent>,
) {
    for discrepancy in weight_discrepancies {
        for recognition in low_confidence {
            if recognition.station_id != discrepancy.station_id {
                continue;
            }
            if !within_window(
                discrepancy.timestamp,
                recognition.timestamp,
                config.window_secs,
            ) {
                continue;
            }
            events.push(CorrelatedEvent {
                timestamp: discrepancy.timestamp,
                station_id: discrepancy.station_id.clone(),
                kind: CorrelatedKind::CorrelatedFraudAttempt,
                confidence: ConfidenceTier::High,
                description: "Weight discrepancy combined with low recognition confidence"
                    .to_string(),
                evidence: CorrelatedEvidence::FraudAttempt {
                    product_name: discrepancy.product_name.clone(),
                    weight_discrepancy_pct: discrepancy.weight_difference_pct,
                    customer_id: discrepancy.customer_id.clone(),
                    predicted_product: recognition.predicted_product.clone(),
                    recognition_confidence: recognition.accuracy,
                },
            });
        }
    }
}

/// A long dwell with technical issues nearby reads as a struggling customer,
/// which still warrants review but with weaker confidence.
fn correlate_customer_difficulty(
    dwell_anomalies: &[DwellAnomaly],
    weight_discrepancies: &[WeightDiscrepancy],
    low_confidence: &[LowConfidenceEvent],
    config: &CorrelationConfig,
    events: &mut Vec<CorrelatedEvent>,
) {
    for anomaly in dwell_anomalies {
        if anomaly.kind != DwellAnomalyKind::HighDwellTime {
            continue;
        }

        let mut related_issues = Vec::new();
        for discrepancy in weight_discrepancies {
            if discrepancy.station_id == anomaly.station_id
                && within_window(anomaly.timestamp, discrepancy.timestamp, config.window_secs)
            {
                related_issues.push(RelatedFinding {
                    source: "pos".to_string(),
                    timestamp: discrepancy.timestamp,
                    summary: format!(
                        "Weight discrepancy of {:.1}% for {}",
                        discrepancy.weight_difference_pct, discrepancy.product_name
                    ),
                });
            }
        }
        for recognition in low_confidence {
            if recognition.station_id == anomaly.station_id
                && within_window(anomaly.timestamp, recognition.timestamp, config.window_secs)
            {
                related_issues.push(RelatedFinding {
                    source: "recognition".to_string(),
                    timestamp: recognition.timestamp,
                    summary: format!(
                        "Low recognition confidence ({:.2}) for {}",
                        recognition.accuracy, recognition.predicted_product
                    ),
                });
            }
        }

        if related_issues.is_empty() {
            continue;
        }

        events.push(CorrelatedEvent {
            timestamp: anomaly.timestamp,
            station_id: anomaly.station_id.clone(),
            kind: CorrelatedKind::CustomerDifficultyWithFraud,
            confidence: ConfidenceTier::Medium,
            description: format!(
                "Extended dwell time ({:.1}s) with technical issues",
                anomaly.dwell_time
            ),
            evidence: CorrelatedEvidence::CustomerDifficulty {
                dwell_time: anomaly.dwell_time,
                customer_count: anomaly.customer_count,
                related_issues,
            },
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::event::Severity;
    use crate::types::record::{format_timestamp, parse_timestamp};

    fn discrepancy(timestamp: &str, station: &str) -> WeightDiscrepancy {
        WeightDiscrepancy {
            timestamp: parse_timestamp(timestamp).unwrap(),
            station_id: station.to_string(),
            customer_id: "C001".to_string(),
            sku: "PRD_F_01".to_string(),
            product_name: "Milk 1L".to_string(),
            expected_weight: 1500.0,
            actual_weight: 2000.0,
            weight_difference_pct: 33.3,
            price: 250.0,
            severity: Severity::Medium,
        }
    }

    fn recognition(timestamp: &str, station: &str) -> LowConfidenceEvent {
        LowConfidenceEvent {
            timestamp: parse_timestamp(timestamp).unwrap(),
            station_id: station.to_string(),
            predicted_product: "PRD_F_02".to_string(),
            accuracy: 0.45,
            severity: Severity::High,
        }
    }

    fn dwell(timestamp: &str, station: &str, kind: DwellAnomalyKind, secs: f64) -> DwellAnomaly {
        DwellAnomaly {
            timestamp: parse_timestamp(timestamp).unwrap(),
            station_id: station.to_string(),
            kind,
            dwell_time: secs,
            customer_count: 2,
            severity: Severity::High,
        }
    }

    fn config() -> CorrelationConfig {
        CorrelationConfig::default()
    }

    #[test]
    fn test_fraud_attempt_within_window() {
        let events = correlate(
            &[discrepancy("2025-08-13T16:05:00", "SCC1")],
            &[recognition("2025-08-13T16:03:00", "SCC1")],
            &[],
            &config(),
        );
        assert_eq!(events.len(), 1);
        let event = &events[0];
        assert_eq!(event.kind, CorrelatedKind::CorrelatedFraudAttempt);
        assert_eq!(event.confidence, ConfidenceTier::High);
        // Composite carries the POS timestamp
        assert_eq!(format_timestamp(event.timestamp), "2025-08-13T16:05:00");
        match &event.evidence {
            CorrelatedEvidence::FraudAttempt {
                customer_id,
                recognition_confidence,
                ..
            } => {
                assert_eq!(customer_id, "C001");
                assert!((recognition_confidence - 0.45).abs() < 1e-9);
            }
            other => panic!("unexpected evidence: {other:?}"),
        }
    }

    #[test]
    fn test_window_boundary_is_inclusive() {
        // Exactly 300s apart joins; 301s does not
        let at_boundary = correlate(
            &[discrepancy("2025-08-13T16:05:00", "SCC1")],
            &[recognition("2025-08-13T16:00:00", "SCC1")],
            &[],
            &config(),
        );
        assert_eq!(at_boundary.len(), 1);

        let beyond = correlate(
            &[discrepancy("2025-08-13T16:05:01", "SCC1")],
            &[recognition("2025-08-13T16:00:00", "SCC1")],
            &[],
            &config(),
        );
        assert!(beyond.is_empty());
    }

    #[test]
    fn test_different_stations_never_join() {
        let events = correlate(
            &[discrepancy("2025-08-13T16:05:00", "SCC1")],
            &[recognition("2025-08-13T16:05:00", "SCC2")],
            &[],
            &config(),
        );
        assert!(events.is_empty());
    }

    #[test]
    fn test_customer_difficulty_collects_related_issues() {
        let events = correlate(
            &[discrepancy("2025-08-13T16:04:00", "SCC1")],
            &[recognition("2025-08-13T16:03:00", "SCC1")],
            &[dwell(
                "2025-08-13T16:05:00",
                "SCC1",
                DwellAnomalyKind::HighDwellTime,
                450.0,
            )],
            &config(),
        );
        // The fraud attempt plus the difficulty event
        assert_eq!(events.len(), 2);
        let difficulty = events
            .iter()
            .find(|e| e.kind == CorrelatedKind::CustomerDifficultyWithFraud)
            .unwrap();
        assert_eq!(difficulty.confidence, ConfidenceTier::Medium);
        assert_eq!(
            difficulty.description,
            "Extended dwell time (450.0s) with technical issues"
        );
        match &difficulty.evidence {
            CorrelatedEvidence::CustomerDifficulty { related_issues, .. } => {
                assert_eq!(related_issues.len(), 2);
            }
            other => panic!("unexpected evidence: {other:?}"),
        }
    }

    #[test]
    fn test_dwell_without_related_issues_is_ignored() {
        let events = correlate(
            &[],
            &[],
            &[dwell(
                "2025-08-13T16:05:00",
                "SCC1",
                DwellAnomalyKind::HighDwellTime,
                450.0,
            )],
            &config(),
        );
        assert!(events.is_empty());
    }

    #[test]
    fn test_low_dwell_is_not_difficulty() {
        let events = correlate(
            &[discrepancy("2025-08-13T16:05:00", "SCC1")],
            &[],
            &[dwell(
                "2025-08-13T16:05:00",
                "SCC1",
                DwellAnomalyKind::LowDwellTime,
                5.0,
            )],
            &config(),
        );
        assert!(events.is_empty());
    }
}
