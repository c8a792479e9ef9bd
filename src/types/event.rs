//! Anomaly event data structures shared across the pipeline stages.

use crate::types::record::format_timestamp;
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Severity label attached to detector findings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Severity {
    Low,
    Medium,
    High,
}

impl Severity {
    /// Lowercase form used by the canonical output schema.
    pub fn as_lower(&self) -> &'static str {
        match self {
            Severity::Low => "low",
            Severity::Medium => "medium",
            Severity::High => "high",
        }
    }
}

/// Confidence tier assigned by the correlation engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ConfidenceTier {
    Low,
    Medium,
    High,
}

/// Kind discriminant for detector findings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CandidateKind {
    InventoryShrinkage,
    InventoryAnomaly,
    WeightDiscrepancy,
    BarcodeSwap,
    FrequentDiscrepancyCustomer,
    HighValueDiscrepancy,
    RapidScanning,
    LowConfidence,
    ScannerAvoidanceAfterLowConfidence,
    HighDwellTime,
    LowDwellTime,
    MissingTagStreak,
    SuspiciousTagMovement,
    DuplicateEpc,
    TagSkuMismatch,
    TagTemporalAnomaly,
}

impl CandidateKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            CandidateKind::InventoryShrinkage => "INVENTORY_SHRINKAGE",
            CandidateKind::InventoryAnomaly => "INVENTORY_ANOMALY",
            CandidateKind::WeightDiscrepancy => "WEIGHT_DISCREPANCY",
            CandidateKind::BarcodeSwap => "BARCODE_SWAP",
            CandidateKind::FrequentDiscrepancyCustomer => "FREQUENT_DISCREPANCY_CUSTOMER",
            CandidateKind::HighValueDiscrepancy => "HIGH_VALUE_DISCREPANCY",
            CandidateKind::RapidScanning => "RAPID_SCANNING",
            CandidateKind::LowConfidence => "LOW_CONFIDENCE",
            CandidateKind::ScannerAvoidanceAfterLowConfidence => {
                "SCANNER_AVOIDANCE_AFTER_LOW_CONFIDENCE"
            }
            CandidateKind::HighDwellTime => "HIGH_DWELL_TIME",
            CandidateKind::LowDwellTime => "LOW_DWELL_TIME",
            CandidateKind::MissingTagStreak => "MISSING_TAG_STREAK",
            CandidateKind::SuspiciousTagMovement => "SUSPICIOUS_TAG_MOVEMENT",
            CandidateKind::DuplicateEpc => "DUPLICATE_EPC",
            CandidateKind::TagSkuMismatch => "TAG_SKU_MISMATCH",
            CandidateKind::TagTemporalAnomaly => "TAG_TEMPORAL_ANOMALY",
        }
    }
}

/// A detector's raw, unscored anomaly signal. Detectors keep typed findings
/// internally; this uniform view is what reporting collaborators consume.
#[derive(Debug, Clone, Serialize)]
pub struct CandidateEvent {
    #[serde(serialize_with = "serialize_ts")]
    pub timestamp: NaiveDateTime,
    /// Station or floor location; `None` for store-wide or per-customer signals
    pub location: Option<String>,
    pub kind: CandidateKind,
    pub severity: Severity,
    pub evidence: Map<String, Value>,
}

fn serialize_ts<S: serde::Serializer>(ts: &NaiveDateTime, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_str(&format_timestamp(*ts))
}

/// Composite event kind produced only by the correlation engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CorrelatedKind {
    CorrelatedFraudAttempt,
    CustomerDifficultyWithFraud,
}

impl CorrelatedKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            CorrelatedKind::CorrelatedFraudAttempt => "CORRELATED_FRAUD_ATTEMPT",
            CorrelatedKind::CustomerDifficultyWithFraud => "CUSTOMER_DIFFICULTY_WITH_FRAUD",
        }
    }
}

/// A finding referenced as supporting evidence by a correlated event.
#[derive(Debug, Clone, Serialize)]
pub struct RelatedFinding {
    pub source: String,
    #[serde(serialize_with = "serialize_ts")]
    pub timestamp: NaiveDateTime,
    pub summary: String,
}

/// Evidence composed from the contributing findings.
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum CorrelatedEvidence {
    FraudAttempt {
        product_name: String,
        weight_discrepancy_pct: f64,
        customer_id: String,
        predicted_product: String,
        recognition_confidence: f64,
    },
    CustomerDifficulty {
        dwell_time: f64,
        customer_count: u32,
        related_issues: Vec<RelatedFinding>,
    },
}

/// A composite anomaly formed by joining findings across streams within the
/// correlation time window.
#[derive(Debug, Clone, Serialize)]
pub struct CorrelatedEvent {
    #[serde(serialize_with = "serialize_ts")]
    pub timestamp: NaiveDateTime,
    pub station_id: String,
    pub kind: CorrelatedKind,
    pub confidence: ConfidenceTier,
    pub description: String,
    pub evidence: CorrelatedEvidence,
}

/// Canonical output record; the full event log is sorted ascending by
/// timestamp and is the only externally-contracted artifact.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FinalEvent {
    pub timestamp: String,
    pub event_type: String,
    /// Station id, or `STORE_FLOOR` for store-wide events
    pub location: String,
    pub severity: String,
    pub confidence: f64,
    pub description: String,
    pub metadata: Map<String, Value>,
}

/// Sentinel location for events not scoped to a station.
pub const STORE_FLOOR: &str = "STORE_FLOOR";
