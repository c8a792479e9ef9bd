//! Retail loss-prevention analytics pipeline.
//!
//! Five NDJSON telemetry streams (inventory snapshots, POS transactions,
//! product recognition, queue monitoring, RFID readings) pass through
//! per-stream heuristic detectors, cross-stream correlation, and severity
//! scoring to produce a single sorted event log.

pub mod assembler;
pub mod config;
pub mod correlation;
pub mod detectors;
pub mod loader;
pub mod metrics;
pub mod pipeline;
pub mod scoring;
pub mod stats;
pub mod types;

pub use config::AppConfig;
pub use pipeline::{run, PipelineOutput};
pub use types::event::FinalEvent;
