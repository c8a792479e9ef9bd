//! Typed stream records parsed from the raw telemetry envelope.
//!
//! Every input stream shares the same NDJSON envelope; the `data` payload
//! shape differs per stream. Records are parse-validated at ingestion so the
//! detectors never see missing fields.

use anyhow::{anyhow, Context, Result};
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Universal envelope for all five telemetry streams, one per NDJSON line.
#[derive(Debug, Clone, Deserialize)]
pub struct RawEvent {
    /// ISO-8601 timestamp, e.g. `2025-08-13T16:00:01`
    pub timestamp: String,
    /// Originating station, absent for store-wide streams
    #[serde(default)]
    pub station_id: Option<String>,
    /// Stream status marker (`Active`, etc.)
    #[serde(default)]
    pub status: String,
    /// Stream-specific payload
    #[serde(default)]
    pub data: serde_json::Value,
}

/// Parse an ISO-8601 timestamp, tolerating fractional seconds.
pub fn parse_timestamp(value: &str) -> Result<NaiveDateTime> {
    NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S%.f")
        .with_context(|| format!("invalid timestamp: {value}"))
}

/// Format a timestamp back into the canonical input format so lexicographic
/// and chronological ordering agree.
pub fn format_timestamp(ts: NaiveDateTime) -> String {
    ts.format("%Y-%m-%dT%H:%M:%S").to_string()
}

fn require_station(raw: &RawEvent) -> Result<String> {
    raw.station_id
        .clone()
        .ok_or_else(|| anyhow!("record is missing station_id"))
}

/// Store-wide inventory levels at one point in time.
#[derive(Debug, Clone)]
pub struct InventorySnapshot {
    pub timestamp: NaiveDateTime,
    /// Product SKU to on-hand quantity
    pub quantities: BTreeMap<String, i64>,
}

impl InventorySnapshot {
    pub fn from_raw(raw: &RawEvent) -> Result<Self> {
        let quantities: BTreeMap<String, i64> = serde_json::from_value(raw.data.clone())
            .context("inventory payload is not a product->quantity map")?;
        Ok(Self {
            timestamp: parse_timestamp(&raw.timestamp)?,
            quantities,
        })
    }
}

#[derive(Debug, Clone, Deserialize)]
struct PosPayload {
    customer_id: String,
    sku: String,
    product_name: String,
    price: f64,
    weight_g: f64,
}

/// A single scanned item at a point-of-sale station.
#[derive(Debug, Clone)]
pub struct PosTransaction {
    pub timestamp: NaiveDateTime,
    pub station_id: String,
    pub customer_id: String,
    pub sku: String,
    pub product_name: String,
    pub price: f64,
    /// Weight registered by the scale, in grams
    pub weight_g: f64,
}

impl PosTransaction {
    pub fn from_raw(raw: &RawEvent) -> Result<Self> {
        let payload: PosPayload =
            serde_json::from_value(raw.data.clone()).context("invalid POS payload")?;
        Ok(Self {
            timestamp: parse_timestamp(&raw.timestamp)?,
            station_id: require_station(raw)?,
            customer_id: payload.customer_id,
            sku: payload.sku,
            product_name: payload.product_name,
            price: payload.price,
            weight_g: payload.weight_g,
        })
    }
}

#[derive(Debug, Clone, Deserialize)]
struct RecognitionPayload {
    predicted_product: String,
    accuracy: f64,
}

/// A vision-system product prediction with its confidence score.
#[derive(Debug, Clone)]
pub struct RecognitionEvent {
    pub timestamp: NaiveDateTime,
    pub station_id: String,
    pub predicted_product: String,
    /// Confidence in [0, 1]
    pub accuracy: f64,
}

impl RecognitionEvent {
    pub fn from_raw(raw: &RawEvent) -> Result<Self> {
        let payload: RecognitionPayload =
            serde_json::from_value(raw.data.clone()).context("invalid recognition payload")?;
        Ok(Self {
            timestamp: parse_timestamp(&raw.timestamp)?,
            station_id: require_station(raw)?,
            predicted_product: payload.predicted_product,
            accuracy: payload.accuracy,
        })
    }
}

#[derive(Debug, Clone, Deserialize)]
struct QueuePayload {
    customer_count: u32,
    average_dwell_time: f64,
}

/// One queue-monitoring observation for a station.
#[derive(Debug, Clone)]
pub struct QueueObservation {
    pub timestamp: NaiveDateTime,
    pub station_id: String,
    pub customer_count: u32,
    /// Average dwell time in seconds
    pub average_dwell_time: f64,
}

impl QueueObservation {
    pub fn from_raw(raw: &RawEvent) -> Result<Self> {
        let payload: QueuePayload =
            serde_json::from_value(raw.data.clone()).context("invalid queue payload")?;
        Ok(Self {
            timestamp: parse_timestamp(&raw.timestamp)?,
            station_id: require_station(raw)?,
            customer_count: payload.customer_count,
            average_dwell_time: payload.average_dwell_time,
        })
    }
}

#[derive(Debug, Clone, Deserialize)]
struct RfidPayload {
    epc: Option<String>,
    location: Option<String>,
    sku: Option<String>,
}

/// One RFID reader observation; `epc` is null when no tag was detected.
#[derive(Debug, Clone, Serialize)]
pub struct RfidReading {
    #[serde(serialize_with = "serialize_ts")]
    pub timestamp: NaiveDateTime,
    pub station_id: String,
    pub epc: Option<String>,
    pub location: Option<String>,
    pub sku: Option<String>,
}

fn serialize_ts<S: serde::Serializer>(ts: &NaiveDateTime, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_str(&format_timestamp(*ts))
}

impl RfidReading {
    pub fn from_raw(raw: &RawEvent) -> Result<Self> {
        let payload: RfidPayload =
            serde_json::from_value(raw.data.clone()).context("invalid RFID payload")?;
        Ok(Self {
            timestamp: parse_timestamp(&raw.timestamp)?,
            station_id: require_station(raw)?,
            epc: payload.epc,
            location: payload.location,
            sku: payload.sku,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn raw(timestamp: &str, station: Option<&str>, data: serde_json::Value) -> RawEvent {
        RawEvent {
            timestamp: timestamp.to_string(),
            station_id: station.map(|s| s.to_string()),
            status: "Active".to_string(),
            data,
        }
    }

    #[test]
    fn test_timestamp_round_trip() {
        let ts = parse_timestamp("2025-08-13T16:00:01").unwrap();
        assert_eq!(format_timestamp(ts), "2025-08-13T16:00:01");
        // Fractional seconds are accepted on input
        assert!(parse_timestamp("2025-08-13T16:00:01.250").is_ok());
        assert!(parse_timestamp("yesterday").is_err());
    }

    #[test]
    fn test_inventory_snapshot_from_raw() {
        let event = raw(
            "2025-08-13T16:00:00",
            None,
            json!({"PRD_F_01": 120, "PRD_T_04": 35}),
        );
        let snapshot = InventorySnapshot::from_raw(&event).unwrap();
        assert_eq!(snapshot.quantities.get("PRD_F_01"), Some(&120));
        assert_eq!(snapshot.quantities.len(), 2);
    }

    #[test]
    fn test_pos_transaction_requires_station() {
        let payload = json!({
            "customer_id": "C001",
            "sku": "PRD_F_03",
            "product_name": "Milk 1L",
            "price": 250.0,
            "weight_g": 1050.0
        });
        let ok = PosTransaction::from_raw(&raw("2025-08-13T16:00:01", Some("SCC1"), payload.clone()));
        assert!(ok.is_ok());

        let missing = PosTransaction::from_raw(&raw("2025-08-13T16:00:01", None, payload));
        assert!(missing.is_err());
    }

    #[test]
    fn test_rfid_reading_allows_null_epc() {
        let event = raw(
            "2025-08-13T16:00:05",
            Some("RFID1"),
            json!({"epc": null, "location": null, "sku": null}),
        );
        let reading = RfidReading::from_raw(&event).unwrap();
        assert!(reading.epc.is_none());
    }
}
