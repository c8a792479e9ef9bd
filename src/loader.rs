//! NDJSON stream loaders with partial-input tolerance.
//!
//! A missing or empty file yields an empty record list and the run continues;
//! a line that fails to parse or lacks required fields is skipped. Neither is
//! fatal to the stream.

use crate::types::record::{
    InventorySnapshot, PosTransaction, QueueObservation, RawEvent, RecognitionEvent, RfidReading,
};
use anyhow::Result;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;
use tracing::{debug, warn};

/// Read a stream file into raw envelopes, skipping malformed lines.
fn read_raw_events(path: &Path, stream: &str) -> Vec<RawEvent> {
    let file = match File::open(path) {
        Ok(file) => file,
        Err(e) => {
            warn!(stream = %stream, path = %path.display(), error = %e, "Input file unavailable, continuing with empty stream");
            return Vec::new();
        }
    };

    let mut events = Vec::new();
    let mut skipped = 0usize;

    for (line_no, line) in BufReader::new(file).lines().enumerate() {
        let line = match line {
            Ok(line) => line,
            Err(e) => {
                warn!(stream = %stream, line = line_no + 1, error = %e, "Failed to read line");
                skipped += 1;
                continue;
            }
        };
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<RawEvent>(&line) {
            Ok(event) => events.push(event),
            Err(e) => {
                warn!(stream = %stream, line = line_no + 1, error = %e, "Skipping malformed record");
                skipped += 1;
            }
        }
    }

    debug!(
        stream = %stream,
        loaded = events.len(),
        skipped = skipped,
        "Stream loaded"
    );

    events
}

/// Parse raw envelopes into typed records, skipping those that fail validation.
fn parse_records<T>(
    raw_events: Vec<RawEvent>,
    stream: &str,
    parse: impl Fn(&RawEvent) -> Result<T>,
) -> Vec<T> {
    let mut records = Vec::with_capacity(raw_events.len());
    for raw in &raw_events {
        match parse(raw) {
            Ok(record) => records.push(record),
            Err(e) => {
                warn!(stream = %stream, timestamp = %raw.timestamp, error = %e, "Skipping invalid record");
            }
        }
    }
    records
}

pub fn load_inventory<P: AsRef<Path>>(path: P) -> Vec<InventorySnapshot> {
    let raw = read_raw_events(path.as_ref(), "inventory");
    parse_records(raw, "inventory", InventorySnapshot::from_raw)
}

pub fn load_pos_transactions<P: AsRef<Path>>(path: P) -> Vec<PosTransaction> {
    let raw = read_raw_events(path.as_ref(), "pos");
    parse_records(raw, "pos", PosTransaction::from_raw)
}

pub fn load_recognition_events<P: AsRef<Path>>(path: P) -> Vec<RecognitionEvent> {
    let raw = read_raw_events(path.as_ref(), "recognition");
    parse_records(raw, "recognition", RecognitionEvent::from_raw)
}

pub fn load_queue_observations<P: AsRef<Path>>(path: P) -> Vec<QueueObservation> {
    let raw = read_raw_events(path.as_ref(), "queue");
    parse_records(raw, "queue", QueueObservation::from_raw)
}

pub fn load_rfid_readings<P: AsRef<Path>>(path: P) -> Vec<RfidReading> {
    let raw = read_raw_events(path.as_ref(), "rfid");
    parse_records(raw, "rfid", RfidReading::from_raw)
}
