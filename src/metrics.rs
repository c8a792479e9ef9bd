//! Per-run batch metrics: stream volumes, detector finding counts, stage
//! timings, and the final event distribution.

use crate::types::event::FinalEvent;
use serde::Serialize;
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::info;
use uuid::Uuid;

#[derive(Debug, Clone, Default, Serialize)]
pub struct StreamCounts {
    pub inventory: usize,
    pub pos: usize,
    pub recognition: usize,
    pub queue: usize,
    pub rfid: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct RunMetrics {
    pub run_id: String,
    pub records: StreamCounts,
    /// Raw detector findings per stream, before promotion
    pub candidates: BTreeMap<String, usize>,
    /// Load-and-detect wall time per stream
    pub stream_timings_ms: BTreeMap<String, u128>,
    pub correlated_events: usize,
    pub final_events: usize,
    pub events_by_type: BTreeMap<String, usize>,
    pub events_by_severity: BTreeMap<String, usize>,
    pub elapsed_ms: u128,
}

impl RunMetrics {
    pub fn new() -> Self {
        Self {
            run_id: Uuid::new_v4().to_string(),
            records: StreamCounts::default(),
            candidates: BTreeMap::new(),
            stream_timings_ms: BTreeMap::new(),
            correlated_events: 0,
            final_events: 0,
            events_by_type: BTreeMap::new(),
            events_by_severity: BTreeMap::new(),
            elapsed_ms: 0,
        }
    }

    pub fn record_candidates(&mut self, stream: &str, count: usize) {
        self.candidates.insert(stream.to_string(), count);
    }

    pub fn record_stream_timing(&mut self, stream: &str, elapsed: Duration) {
        self.stream_timings_ms
            .insert(stream.to_string(), elapsed.as_millis());
    }

    pub fn record_events(&mut self, events: &[FinalEvent]) {
        self.final_events = events.len();
        for event in events {
            *self
                .events_by_type
                .entry(event.event_type.clone())
                .or_default() += 1;
            *self
                .events_by_severity
                .entry(event.severity.clone())
                .or_default() += 1;
        }
    }

    pub fn record_elapsed(&mut self, elapsed: Duration) {
        self.elapsed_ms = elapsed.as_millis();
    }

    pub fn print_summary(&self) {
        info!(run_id = %self.run_id, elapsed_ms = self.elapsed_ms, "run complete");
        info!(
            inventory = self.records.inventory,
            pos = self.records.pos,
            recognition = self.records.recognition,
            queue = self.records.queue,
            rfid = self.records.rfid,
            "records loaded"
        );
        for (stream, count) in &self.candidates {
            let elapsed = self.stream_timings_ms.get(stream).copied().unwrap_or(0);
            info!(stream = %stream, findings = count, elapsed_ms = elapsed, "detector findings");
        }
        info!(
            correlated = self.correlated_events,
            total = self.final_events,
            "events assembled"
        );
        for (event_type, count) in &self.events_by_type {
            info!(event_type = %event_type, count = count, "event type");
        }
        for (severity, count) in &self.events_by_severity {
            info!(severity = %severity, count = count, "event severity");
        }
    }
}

impl Default for RunMetrics {
    fn default() -> Self {
        Self::new()
    }
}
