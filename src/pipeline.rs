//! End-to-end pipeline orchestration: load the five streams, run their
//! detectors on blocking worker threads, correlate, score, and assemble the
//! canonical event log.

use crate::assembler;
use crate::config::AppConfig;
use crate::correlation;
use crate::detectors::inventory::{self, InventoryReport};
use crate::detectors::pos::{self, PosReport, ProductMaster};
use crate::detectors::queue::{self, QueueReport};
use crate::detectors::recognition::{self, RecognitionReport};
use crate::detectors::rfid::{self, RfidReport};
use crate::loader;
use crate::metrics::RunMetrics;
use crate::types::event::{CandidateEvent, FinalEvent};
use anyhow::{Context, Result};
use std::time::Instant;
use tokio::task;
use tracing::info;

/// Everything a run produces: the canonical log, the per-stream reports, the
/// raw candidate pool, and batch metrics.
pub struct PipelineOutput {
    pub events: Vec<FinalEvent>,
    pub inventory: InventoryReport,
    pub pos: PosReport,
    pub recognition: RecognitionReport,
    pub queue: QueueReport,
    pub rfid: RfidReport,
    pub candidates: Vec<CandidateEvent>,
    pub metrics: RunMetrics,
}

/// Run the full pipeline. Stream loading and detection are CPU and file
/// bound, so each stream gets its own blocking task.
pub async fn run(config: AppConfig) -> Result<PipelineOutput> {
    let started = Instant::now();
    let mut metrics = RunMetrics::new();
    info!(run_id = %metrics.run_id, "starting analysis run");

    let detectors = config.detectors.clone();

    let inventory_task = {
        let path = config.input.inventory.clone();
        let detectors = detectors.clone();
        task::spawn_blocking(move || {
            let clock = Instant::now();
            let snapshots = loader::load_inventory(&path);
            let report = inventory::analyze(&snapshots, &detectors);
            (snapshots.len(), report, clock.elapsed())
        })
    };
    let pos_task = {
        let path = config.input.pos.clone();
        let detectors = detectors.clone();
        task::spawn_blocking(move || {
            let clock = Instant::now();
            let transactions = loader::load_pos_transactions(&path);
            let master = ProductMaster::new();
            let report = pos::analyze(&transactions, &master, &detectors);
            (transactions.len(), report, clock.elapsed())
        })
    };
    let recognition_task = {
        let path = config.input.recognition.clone();
        let detectors = detectors.clone();
        task::spawn_blocking(move || {
            let clock = Instant::now();
            let predictions = loader::load_recognition_events(&path);
            let report = recognition::analyze(&predictions, &detectors);
            (predictions.len(), report, clock.elapsed())
        })
    };
    let queue_task = {
        let path = config.input.queue.clone();
        let detectors = detectors.clone();
        task::spawn_blocking(move || {
            let clock = Instant::now();
            let observations = loader::load_queue_observations(&path);
            let report = queue::analyze(&observations, &detectors);
            (observations.len(), report, clock.elapsed())
        })
    };
    let rfid_task = {
        let path = config.input.rfid.clone();
        task::spawn_blocking(move || {
            let clock = Instant::now();
            let readings = loader::load_rfid_readings(&path);
            let report = rfid::analyze(&readings);
            (readings.len(), report, clock.elapsed())
        })
    };

    let (inventory_count, inventory_report, inventory_elapsed) =
        inventory_task.await.context("inventory task panicked")?;
    let (pos_count, pos_report, pos_elapsed) = pos_task.await.context("POS task panicked")?;
    let (recognition_count, recognition_report, recognition_elapsed) =
        recognition_task.await.context("recognition task panicked")?;
    let (queue_count, queue_report, queue_elapsed) =
        queue_task.await.context("queue task panicked")?;
    let (rfid_count, rfid_report, rfid_elapsed) =
        rfid_task.await.context("RFID task panicked")?;

    metrics.records.inventory = inventory_count;
    metrics.records.pos = pos_count;
    metrics.records.recognition = recognition_count;
    metrics.records.queue = queue_count;
    metrics.records.rfid = rfid_count;
    metrics.record_stream_timing("inventory", inventory_elapsed);
    metrics.record_stream_timing("pos", pos_elapsed);
    metrics.record_stream_timing("recognition", recognition_elapsed);
    metrics.record_stream_timing("queue", queue_elapsed);
    metrics.record_stream_timing("rfid", rfid_elapsed);

    let correlated = correlation::correlate(
        &pos_report.weight_discrepancies,
        &recognition_report.low_confidence_events,
        &queue_report.dwell_anomalies,
        &config.correlation,
    );
    metrics.correlated_events = correlated.len();

    let events = assembler::assemble(
        &inventory_report,
        &pos_report,
        &recognition_report,
        &queue_report,
        &correlated,
        &config.scoring,
    );

    let mut candidates = Vec::new();
    for (stream, pool) in [
        ("inventory", inventory_report.candidates()),
        ("pos", pos_report.candidates()),
        ("recognition", recognition_report.candidates()),
        ("queue", queue_report.candidates()),
        ("rfid", rfid_report.candidates()),
    ] {
        metrics.record_candidates(stream, pool.len());
        candidates.extend(pool);
    }
    metrics.record_events(&events);
    metrics.record_elapsed(started.elapsed());

    Ok(PipelineOutput {
        events,
        inventory: inventory_report,
        pos: pos_report,
        recognition: recognition_report,
        queue: queue_report,
        rfid: rfid_report,
        candidates,
        metrics,
    })
}
