//! Inventory snapshot detectors: shrinkage between adjacent snapshots and
//! statistical quantity anomalies per product.

use crate::config::DetectorConfig;
use crate::stats;
use crate::types::event::{CandidateEvent, CandidateKind, Severity};
use crate::types::record::{format_timestamp, InventorySnapshot};
use chrono::NaiveDateTime;
use serde::Serialize;
use serde_json::{json, Map};
use tracing::debug;

/// A significant quantity decrease between two adjacent snapshots.
#[derive(Debug, Clone, Serialize)]
pub struct ShrinkageEvent {
    #[serde(serialize_with = "ts")]
    pub timestamp: NaiveDateTime,
    pub product: String,
    pub previous_qty: i64,
    pub current_qty: i64,
    pub decrease_percentage: f64,
    pub severity: Severity,
}

/// A quantity observation far from the product's mean level.
#[derive(Debug, Clone, Serialize)]
pub struct QuantityAnomaly {
    #[serde(serialize_with = "ts")]
    pub timestamp: NaiveDateTime,
    pub product: String,
    pub quantity: i64,
    pub z_score: f64,
    pub mean_quantity: f64,
    /// LOW when below the mean, HIGH when above
    pub direction: Severity,
}

fn ts<S: serde::Serializer>(value: &NaiveDateTime, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_str(&format_timestamp(*value))
}

/// Store-wide inventory trend summary.
#[derive(Debug, Clone, Serialize)]
pub struct InventoryTrends {
    pub total_products: usize,
    pub initial_total: i64,
    pub final_total: i64,
    pub net_change: i64,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct InventoryReport {
    pub shrinkage_events: Vec<ShrinkageEvent>,
    pub anomalies: Vec<QuantityAnomaly>,
    pub trends: Option<InventoryTrends>,
}

impl InventoryReport {
    pub fn candidates(&self) -> Vec<CandidateEvent> {
        let mut pool = Vec::with_capacity(self.shrinkage_events.len() + self.anomalies.len());
        for event in &self.shrinkage_events {
            let mut evidence = Map::new();
            evidence.insert("product".into(), json!(event.product));
            evidence.insert("previous_qty".into(), json!(event.previous_qty));
            evidence.insert("current_qty".into(), json!(event.current_qty));
            evidence.insert(
                "decrease_percentage".into(),
                json!(event.decrease_percentage),
            );
            pool.push(CandidateEvent {
                timestamp: event.timestamp,
                location: None,
                kind: CandidateKind::InventoryShrinkage,
                severity: event.severity,
                evidence,
            });
        }
        for anomaly in &self.anomalies {
            let mut evidence = Map::new();
            evidence.insert("product".into(), json!(anomaly.product));
            evidence.insert("quantity".into(), json!(anomaly.quantity));
            evidence.insert("z_score".into(), json!(anomaly.z_score));
            evidence.insert("mean_quantity".into(), json!(anomaly.mean_quantity));
            pool.push(CandidateEvent {
                timestamp: anomaly.timestamp,
                location: None,
                kind: CandidateKind::InventoryAnomaly,
                severity: anomaly.direction,
                evidence,
            });
        }
        pool
    }
}

/// Run both inventory detectors over the snapshot stream.
///
/// Snapshots are sorted by timestamp first so out-of-order input is tolerated.
pub fn analyze(snapshots: &[InventorySnapshot], config: &DetectorConfig) -> InventoryReport {
    let mut sorted: Vec<&InventorySnapshot> = snapshots.iter().collect();
    sorted.sort_by_key(|s| s.timestamp);

    let shrinkage_events = detect_shrinkage(&sorted, config.shrinkage_threshold_pct);
    let anomalies = detect_quantity_anomalies(&sorted, config.z_score_threshold);
    let trends = summarize_trends(&sorted);

    debug!(
        shrinkage = shrinkage_events.len(),
        anomalies = anomalies.len(),
        "Inventory analysis complete"
    );

    InventoryReport {
        shrinkage_events,
        anomalies,
        trends,
    }
}

/// Compare each pair of adjacent snapshots product by product.
///
/// Products absent from either snapshot are skipped rather than treated as
/// zero, and a zero previous quantity never produces an event.
fn detect_shrinkage(sorted: &[&InventorySnapshot], threshold_pct: f64) -> Vec<ShrinkageEvent> {
    let mut events = Vec::new();

    for pair in sorted.windows(2) {
        let (prev, curr) = (pair[0], pair[1]);
        for (product, &prev_qty) in &prev.quantities {
            let Some(&curr_qty) = curr.quantities.get(product) else {
                continue;
            };
            if prev_qty <= 0 {
                continue;
            }
            // Multiply before dividing so integer decreases hit threshold
            // boundaries exactly (3/100 is not representable, 300/100 is).
            let decrease_pct = (prev_qty - curr_qty) as f64 * 100.0 / prev_qty as f64;
            if decrease_pct >= threshold_pct {
                let severity = if decrease_pct >= 10.0 {
                    Severity::High
                } else {
                    Severity::Medium
                };
                events.push(ShrinkageEvent {
                    timestamp: curr.timestamp,
                    product: product.clone(),
                    previous_qty: prev_qty,
                    current_qty: curr_qty,
                    decrease_percentage: decrease_pct,
                    severity,
                });
            }
        }
    }

    events
}

/// Z-score outlier detection over each product's full quantity series.
/// Products with zero variance are skipped.
fn detect_quantity_anomalies(
    sorted: &[&InventorySnapshot],
    z_threshold: f64,
) -> Vec<QuantityAnomaly> {
    let mut products: Vec<&String> = sorted
        .iter()
        .flat_map(|s| s.quantities.keys())
        .collect::<std::collections::BTreeSet<_>>()
        .into_iter()
        .collect();
    products.sort();

    let mut anomalies = Vec::new();

    for product in products {
        let series: Vec<(NaiveDateTime, i64)> = sorted
            .iter()
            .filter_map(|s| s.quantities.get(product).map(|&q| (s.timestamp, q)))
            .collect();
        let values: Vec<f64> = series.iter().map(|&(_, q)| q as f64).collect();

        let mean = stats::mean(&values);
        let stdev = stats::stddev_population(&values);
        if stdev == 0.0 {
            continue;
        }

        for &(timestamp, quantity) in &series {
            let z = ((quantity as f64 - mean) / stdev).abs();
            if z > z_threshold {
                anomalies.push(QuantityAnomaly {
                    timestamp,
                    product: product.clone(),
                    quantity,
                    z_score: z,
                    mean_quantity: mean,
                    direction: if (quantity as f64) < mean {
                        Severity::Low
                    } else {
                        Severity::High
                    },
                });
            }
        }
    }

    anomalies
}

fn summarize_trends(sorted: &[&InventorySnapshot]) -> Option<InventoryTrends> {
    let first = sorted.first()?;
    let last = sorted.last()?;

    let initial_total: i64 = first.quantities.values().sum();
    let final_total: i64 = last.quantities.values().sum();

    Some(InventoryTrends {
        total_products: last.quantities.len(),
        initial_total,
        final_total,
        net_change: final_total - initial_total,
    })
}
