//! Product recognition detectors: low-confidence predictions, scanner
//! avoidance after a run of poor recognitions, and chronically
//! hard-to-recognize products.

use crate::config::DetectorConfig;
use crate::stats;
use crate::types::event::{CandidateEvent, CandidateKind, Severity};
use crate::types::record::{format_timestamp, RecognitionEvent};
use chrono::NaiveDateTime;
use serde::Serialize;
use serde_json::{json, Map};
use std::collections::BTreeMap;
use tracing::debug;

fn ts<S: serde::Serializer>(value: &NaiveDateTime, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_str(&format_timestamp(*value))
}

/// A prediction below the acceptable confidence threshold.
#[derive(Debug, Clone, Serialize)]
pub struct LowConfidenceEvent {
    #[serde(serialize_with = "ts")]
    pub timestamp: NaiveDateTime,
    pub station_id: String,
    pub predicted_product: String,
    pub accuracy: f64,
    pub severity: Severity,
}

/// A long silence at a station right after repeated poor recognitions,
/// suggesting the customer stopped presenting items to the scanner.
#[derive(Debug, Clone, Serialize)]
pub struct ScannerAvoidanceEvent {
    #[serde(serialize_with = "ts")]
    pub gap_start: NaiveDateTime,
    #[serde(serialize_with = "ts")]
    pub gap_end: NaiveDateTime,
    pub station_id: String,
    pub gap_seconds: f64,
    pub preceding_low_confidence_count: usize,
}

/// A product the vision system persistently struggles with.
#[derive(Debug, Clone, Serialize)]
pub struct ProblematicProduct {
    pub predicted_product: String,
    pub prediction_count: usize,
    pub low_confidence_count: usize,
    pub low_confidence_rate: f64,
    pub mean_accuracy: f64,
}

/// Aggregate confidence statistics for the run.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ConfidenceSummary {
    pub total_predictions: usize,
    pub mean_accuracy: f64,
    pub median_accuracy: f64,
    pub low_confidence_count: usize,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct RecognitionReport {
    pub low_confidence_events: Vec<LowConfidenceEvent>,
    pub scanner_avoidance_events: Vec<ScannerAvoidanceEvent>,
    pub problematic_products: Vec<ProblematicProduct>,
    pub summary: ConfidenceSummary,
}

impl RecognitionReport {
    pub fn candidates(&self) -> Vec<CandidateEvent> {
        let mut pool = Vec::new();
        for event in &self.low_confidence_events {
            let mut evidence = Map::new();
            evidence.insert(
                "predicted_product".into(),
                json!(event.predicted_product),
            );
            evidence.insert("accuracy".into(), json!(event.accuracy));
            pool.push(CandidateEvent {
                timestamp: event.timestamp,
                location: Some(event.station_id.clone()),
                kind: CandidateKind::LowConfidence,
                severity: event.severity,
                evidence,
            });
        }
        for event in &self.scanner_avoidance_events {
            let mut evidence = Map::new();
            evidence.insert("gap_seconds".into(), json!(event.gap_seconds));
            evidence.insert(
                "preceding_low_confidence_count".into(),
                json!(event.preceding_low_confidence_count),
            );
            evidence.insert("gap_end".into(), json!(format_timestamp(event.gap_end)));
            pool.push(CandidateEvent {
                timestamp: event.gap_start,
                location: Some(event.station_id.clone()),
                kind: CandidateKind::ScannerAvoidanceAfterLowConfidence,
                severity: Severity::High,
                evidence,
            });
        }
        pool
    }
}

/// Run all recognition detectors over the prediction stream.
pub fn analyze(events: &[RecognitionEvent], config: &DetectorConfig) -> RecognitionReport {
    let mut events: Vec<&RecognitionEvent> = events.iter().collect();
    events.sort_by_key(|e| e.timestamp);

    let low_confidence_events = detect_low_confidence(&events, config);
    let scanner_avoidance_events = detect_scanner_avoidance(&events, config);
    let problematic_products = find_problematic_products(&events, config);
    let summary = summarize(&events, config);

    debug!(
        low_confidence = low_confidence_events.len(),
        avoidance = scanner_avoidance_events.len(),
        problematic = problematic_products.len(),
        "recognition analysis complete"
    );

    RecognitionReport {
        low_confidence_events,
        scanner_avoidance_events,
        problematic_products,
        summary,
    }
}

fn detect_low_confidence(
    events: &[&RecognitionEvent],
    config: &DetectorConfig,
) -> Vec<LowConfidenceEvent> {
    events
        .iter()
        .filter(|e| e.accuracy < config.recognition_threshold)
        .map(|e| {
            let severity = if e.accuracy < 0.5 {
                Severity::High
            } else {
                Severity::Medium
            };
            LowConfidenceEvent {
                timestamp: e.timestamp,
                station_id: e.station_id.clone(),
                predicted_product: e.predicted_product.clone(),
                accuracy: e.accuracy,
                severity,
            }
        })
        .collect()
}

/// A gap longer than the configured threshold counts as avoidance only when
/// at least two of the (up to five) predictions before the gap were poor.
fn detect_scanner_avoidance(
    events: &[&RecognitionEvent],
    config: &DetectorConfig,
) -> Vec<ScannerAvoidanceEvent> {
    let mut by_station: BTreeMap<&str, Vec<&RecognitionEvent>> = BTreeMap::new();
    for event in events {
        by_station.entry(&event.station_id).or_default().push(event);
    }

    let mut avoidance = Vec::new();
    for (station_id, station_events) in by_station {
        for i in 1..station_events.len() {
            let prev = station_events[i - 1];
            let curr = station_events[i];
            let gap = (curr.timestamp - prev.timestamp).num_seconds() as f64;
            if gap <= config.scanner_gap_secs {
                continue;
            }
            let window_start = i.saturating_sub(5);
            let low_before = station_events[window_start..i]
                .iter()
                .filter(|e| e.accuracy < 0.6)
                .count();
            if low_before >= 2 {
                avoidance.push(ScannerAvoidanceEvent {
                    gap_start: prev.timestamp,
                    gap_end: curr.timestamp,
                    station_id: station_id.to_string(),
                    gap_seconds: gap,
                    preceding_low_confidence_count: low_before,
                });
            }
        }
    }

    avoidance
}

fn find_problematic_products(
    events: &[&RecognitionEvent],
    config: &DetectorConfig,
) -> Vec<ProblematicProduct> {
    let mut by_product: BTreeMap<&str, Vec<f64>> = BTreeMap::new();
    for event in events {
        by_product
            .entry(&event.predicted_product)
            .or_default()
            .push(event.accuracy);
    }

    let mut products = Vec::new();
    for (product, accuracies) in by_product {
        if accuracies.len() < 5 {
            continue;
        }
        let low_count = accuracies
            .iter()
            .filter(|&&a| a < config.recognition_threshold)
            .count();
        let low_rate = low_count as f64 / accuracies.len() as f64;
        let mean_accuracy = stats::mean(&accuracies);
        if low_rate > 0.4 || mean_accuracy < 0.65 {
            products.push(ProblematicProduct {
                predicted_product: product.to_string(),
                prediction_count: accuracies.len(),
                low_confidence_count: low_count,
                low_confidence_rate: low_rate,
                mean_accuracy,
            });
        }
    }

    products
}

fn summarize(events: &[&RecognitionEvent], config: &DetectorConfig) -> ConfidenceSummary {
    let accuracies: Vec<f64> = events.iter().map(|e| e.accuracy).collect();
    ConfidenceSummary {
        total_predictions: events.len(),
        mean_accuracy: stats::mean(&accuracies),
        median_accuracy: stats::median(&accuracies),
        low_confidence_count: accuracies
            .iter()
            .filter(|&&a| a < config.recognition_threshold)
            .count(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::record::parse_timestamp;

    fn event(timestamp: &str, station: &str, product: &str, accuracy: f64) -> RecognitionEvent {
        RecognitionEvent {
            timestamp: parse_timestamp(timestamp).unwrap(),
            station_id: station.to_string(),
            predicted_product: product.to_string(),
            accuracy,
        }
    }

    fn config() -> DetectorConfig {
        DetectorConfig::default()
    }

    #[test]
    fn test_low_confidence_severity_split() {
        let events = vec![
            event("2025-08-13T16:00:00", "SCC1", "PRD_F_01", 0.95),
            event("2025-08-13T16:00:10", "SCC1", "PRD_F_02", 0.65),
            event("2025-08-13T16:00:20", "SCC1", "PRD_F_03", 0.40),
        ];
        let report = analyze(&events, &config());
        assert_eq!(report.low_confidence_events.len(), 2);
        assert_eq!(report.low_confidence_events[0].severity, Severity::Medium);
        assert_eq!(report.low_confidence_events[1].severity, Severity::High);
    }

    #[test]
    fn test_threshold_boundary_is_exclusive() {
        let events = vec![event("2025-08-13T16:00:00", "SCC1", "PRD_F_01", 0.7)];
        let report = analyze(&events, &config());
        assert!(report.low_confidence_events.is_empty());
    }

    #[test]
    fn test_scanner_avoidance_after_poor_recognitions() {
        let events = vec![
            event("2025-08-13T16:00:00", "SCC1", "PRD_F_01", 0.55),
            event("2025-08-13T16:00:10", "SCC1", "PRD_F_02", 0.50),
            // 90s silence after two poor predictions
            event("2025-08-13T16:01:40", "SCC1", "PRD_F_03", 0.90),
        ];
        let report = analyze(&events, &config());
        assert_eq!(report.scanner_avoidance_events.len(), 1);
        let a = &report.scanner_avoidance_events[0];
        assert_eq!(a.preceding_low_confidence_count, 2);
        assert!((a.gap_seconds - 90.0).abs() < 1e-9);
    }

    #[test]
    fn test_gap_without_poor_recognitions_is_ignored() {
        let events = vec![
            event("2025-08-13T16:00:00", "SCC1", "PRD_F_01", 0.95),
            event("2025-08-13T16:00:10", "SCC1", "PRD_F_02", 0.92),
            event("2025-08-13T16:05:00", "SCC1", "PRD_F_03", 0.90),
        ];
        let report = analyze(&events, &config());
        assert!(report.scanner_avoidance_events.is_empty());
    }

    #[test]
    fn test_gaps_do_not_cross_stations() {
        let events = vec![
            event("2025-08-13T16:00:00", "SCC1", "PRD_F_01", 0.50),
            event("2025-08-13T16:00:05", "SCC2", "PRD_F_02", 0.50),
            event("2025-08-13T16:05:00", "SCC1", "PRD_F_03", 0.90),
        ];
        let report = analyze(&events, &config());
        // Only one poor prediction preceded SCC1's gap
        assert!(report.scanner_avoidance_events.is_empty());
    }

    #[test]
    fn test_problematic_product_by_rate() {
        // 3 of 5 predictions below threshold: rate 0.6 > 0.4
        let events: Vec<_> = [0.60, 0.65, 0.68, 0.90, 0.95]
            .iter()
            .enumerate()
            .map(|(i, &a)| {
                event(
                    &format!("2025-08-13T16:00:{:02}", i),
                    "SCC1",
                    "PRD_T_01",
                    a,
                )
            })
            .collect();
        let report = analyze(&events, &config());
        assert_eq!(report.problematic_products.len(), 1);
        let p = &report.problematic_products[0];
        assert_eq!(p.prediction_count, 5);
        assert!((p.low_confidence_rate - 0.6).abs() < 1e-9);
    }

    #[test]
    fn test_few_predictions_never_problematic() {
        let events: Vec<_> = (0..4)
            .map(|i| {
                event(
                    &format!("2025-08-13T16:00:{:02}", i),
                    "SCC1",
                    "PRD_T_01",
                    0.1,
                )
            })
            .collect();
        let report = analyze(&events, &config());
        assert!(report.problematic_products.is_empty());
    }

    #[test]
    fn test_summary_counts() {
        let events = vec![
            event("2025-08-13T16:00:00", "SCC1", "PRD_F_01", 0.8),
            event("2025-08-13T16:00:10", "SCC1", "PRD_F_02", 0.6),
        ];
        let report = analyze(&events, &config());
        assert_eq!(report.summary.total_predictions, 2);
        assert_eq!(report.summary.low_confidence_count, 1);
        assert!((report.summary.mean_accuracy - 0.7).abs() < 1e-9);
    }
}
