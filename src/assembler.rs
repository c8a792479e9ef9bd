//! Final event assembly: promotes qualifying detector findings and all
//! correlated events into the canonical output schema, then sorts the log
//! ascending by timestamp.

use crate::config::ScoringWeights;
use crate::detectors::inventory::InventoryReport;
use crate::detectors::pos::PosReport;
use crate::detectors::queue::{DwellAnomalyKind, QueueReport};
use crate::detectors::recognition::RecognitionReport;
use crate::scoring;
use crate::types::event::{
    ConfidenceTier, CorrelatedEvent, FinalEvent, Severity, STORE_FLOOR,
};
use crate::types::record::format_timestamp;
use serde_json::{json, Map, Value};
use tracing::debug;

// Fixed confidences for single-stream promotions. Correlated events are
// scored instead.
const SHRINKAGE_CONFIDENCE: f64 = 0.8;
const WEIGHT_CONFIDENCE: f64 = 0.85;
const BARCODE_CONFIDENCE: f64 = 0.75;
const AVOIDANCE_CONFIDENCE: f64 = 0.6;
const DIFFICULTY_CONFIDENCE: f64 = 0.5;

const CORRELATED_HIGH_CONFIDENCE: f64 = 0.9;
const CORRELATED_MEDIUM_CONFIDENCE: f64 = 0.7;

/// Build the sorted canonical event log from the detector reports and the
/// correlation output.
pub fn assemble(
    inventory: &InventoryReport,
    pos: &PosReport,
    recognition: &RecognitionReport,
    queue: &QueueReport,
    correlated: &[CorrelatedEvent],
    weights: &ScoringWeights,
) -> Vec<FinalEvent> {
    let mut events = Vec::new();

    promote_inventory(inventory, &mut events);
    promote_pos(pos, &mut events);
    promote_recognition(recognition, &mut events);
    promote_queue(queue, &mut events);
    promote_correlated(correlated, weights, &mut events);

    // Canonical timestamps make lexicographic and chronological order agree
    events.sort_by(|a, b| a.timestamp.cmp(&b.timestamp));

    debug!(events = events.len(), "event log assembled");
    events
}

fn promote_inventory(report: &InventoryReport, events: &mut Vec<FinalEvent>) {
    for shrinkage in &report.shrinkage_events {
        let mut metadata = Map::new();
        metadata.insert("product".into(), json!(shrinkage.product));
        metadata.insert("previous_qty".into(), json!(shrinkage.previous_qty));
        metadata.insert("current_qty".into(), json!(shrinkage.current_qty));
        metadata.insert(
            "decrease_percentage".into(),
            json!(shrinkage.decrease_percentage),
        );
        events.push(FinalEvent {
            timestamp: format_timestamp(shrinkage.timestamp),
            event_type: "INVENTORY_SHRINKAGE".to_string(),
            location: STORE_FLOOR.to_string(),
            severity: shrinkage.severity.as_lower().to_string(),
            confidence: SHRINKAGE_CONFIDENCE,
            description: format!(
                "Inventory decrease of {:.1}% for {}",
                shrinkage.decrease_percentage, shrinkage.product
            ),
            metadata,
        });
    }
}

fn promote_pos(report: &PosReport, events: &mut Vec<FinalEvent>) {
    for discrepancy in &report.weight_discrepancies {
        let mut metadata = Map::new();
        metadata.insert("customer_id".into(), json!(discrepancy.customer_id));
        metadata.insert("sku".into(), json!(discrepancy.sku));
        metadata.insert("expected_weight".into(), json!(discrepancy.expected_weight));
        metadata.insert("actual_weight".into(), json!(discrepancy.actual_weight));
        metadata.insert(
            "weight_difference_pct".into(),
            json!(discrepancy.weight_difference_pct),
        );
        events.push(FinalEvent {
            timestamp: format_timestamp(discrepancy.timestamp),
            event_type: "WEIGHT_DISCREPANCY".to_string(),
            location: discrepancy.station_id.clone(),
            severity: discrepancy.severity.as_lower().to_string(),
            confidence: WEIGHT_CONFIDENCE,
            description: format!(
                "Weight discrepancy of {:.1}% for {}",
                discrepancy.weight_difference_pct, discrepancy.product_name
            ),
            metadata,
        });
    }

    for swap in &report.barcode_swaps {
        let mut metadata = Map::new();
        metadata.insert("customer_id".into(), json!(swap.customer_id));
        metadata.insert("sku".into(), json!(swap.sku));
        metadata.insert("price".into(), json!(swap.price));
        metadata.insert("price_ratio".into(), json!(swap.price_ratio));
        events.push(FinalEvent {
            timestamp: format_timestamp(swap.timestamp),
            event_type: "BARCODE_SWITCHING".to_string(),
            location: swap.station_id.clone(),
            severity: "high".to_string(),
            confidence: BARCODE_CONFIDENCE,
            description: "Suspected barcode switching - unusually low price per weight"
                .to_string(),
            metadata,
        });
    }
}

/// Only severe recognition failures stand on their own in the final log;
/// moderate ones matter solely as correlation inputs.
fn promote_recognition(report: &RecognitionReport, events: &mut Vec<FinalEvent>) {
    for low in &report.low_confidence_events {
        if low.severity != Severity::High {
            continue;
        }
        let mut metadata = Map::new();
        metadata.insert("predicted_product".into(), json!(low.predicted_product));
        metadata.insert("accuracy".into(), json!(low.accuracy));
        events.push(FinalEvent {
            timestamp: format_timestamp(low.timestamp),
            event_type: "SCANNER_AVOIDANCE".to_string(),
            location: low.station_id.clone(),
            severity: "medium".to_string(),
            confidence: AVOIDANCE_CONFIDENCE,
            description: format!(
                "Very low product recognition confidence ({:.2})",
                low.accuracy
            ),
            metadata,
        });
    }
}

fn promote_queue(report: &QueueReport, events: &mut Vec<FinalEvent>) {
    for anomaly in &report.dwell_anomalies {
        if anomaly.kind != DwellAnomalyKind::HighDwellTime || anomaly.severity != Severity::High {
            continue;
        }
        let mut metadata = Map::new();
        metadata.insert("dwell_time".into(), json!(anomaly.dwell_time));
        metadata.insert("customer_count".into(), json!(anomaly.customer_count));
        events.push(FinalEvent {
            timestamp: format_timestamp(anomaly.timestamp),
            event_type: "CHECKOUT_DIFFICULTY".to_string(),
            location: anomaly.station_id.clone(),
            severity: "medium".to_string(),
            confidence: DIFFICULTY_CONFIDENCE,
            description: format!("Unusually high dwell time: {:.1}s", anomaly.dwell_time),
            metadata,
        });
    }
}

fn promote_correlated(
    correlated: &[CorrelatedEvent],
    weights: &ScoringWeights,
    events: &mut Vec<FinalEvent>,
) {
    for event in correlated {
        let score = scoring::score(event, weights);
        let confidence = match event.confidence {
            ConfidenceTier::High => CORRELATED_HIGH_CONFIDENCE,
            _ => CORRELATED_MEDIUM_CONFIDENCE,
        };
        let metadata = match serde_json::to_value(&event.evidence) {
            Ok(Value::Object(map)) => map,
            _ => Map::new(),
        };
        events.push(FinalEvent {
            timestamp: format_timestamp(event.timestamp),
            event_type: event.kind.as_str().to_string(),
            location: event.station_id.clone(),
            severity: scoring::severity_label(score).to_string(),
            confidence,
            description: event.description.clone(),
            metadata,
        });
    }
}
