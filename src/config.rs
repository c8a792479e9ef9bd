//! Configuration management for the loss-prevention pipeline

use anyhow::{bail, Context, Result};
use config::{Config, File};
use serde::Deserialize;
use std::path::Path;

/// Main application configuration
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub input: InputConfig,
    #[serde(default)]
    pub output: OutputConfig,
    #[serde(default)]
    pub detectors: DetectorConfig,
    #[serde(default)]
    pub correlation: CorrelationConfig,
    #[serde(default)]
    pub scoring: ScoringWeights,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Input stream file paths
#[derive(Debug, Clone, Deserialize)]
pub struct InputConfig {
    pub inventory: String,
    pub pos: String,
    pub recognition: String,
    pub queue: String,
    pub rfid: String,
}

impl Default for InputConfig {
    fn default() -> Self {
        Self {
            inventory: "data/input/inventory_snapshots.jsonl".to_string(),
            pos: "data/input/pos_transactions.jsonl".to_string(),
            recognition: "data/input/product_recognition.jsonl".to_string(),
            queue: "data/input/queue_monitoring.jsonl".to_string(),
            rfid: "data/input/rfid_readings.jsonl".to_string(),
        }
    }
}

/// Output artifact paths
#[derive(Debug, Clone, Deserialize)]
pub struct OutputConfig {
    /// Canonical sorted event log, one JSON record per line
    pub events: String,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            events: "output/events.jsonl".to_string(),
        }
    }
}

/// Detector thresholds; every field has a default matching the shipped tuning
#[derive(Debug, Clone, Deserialize)]
pub struct DetectorConfig {
    /// Minimum inventory decrease (percent) to flag as shrinkage, inclusive
    #[serde(default = "default_shrinkage_threshold")]
    pub shrinkage_threshold_pct: f64,
    /// Standard deviations from the mean for inventory quantity anomalies
    #[serde(default = "default_z_score_threshold")]
    pub z_score_threshold: f64,
    /// Acceptable weight variance (percent) before a transaction is flagged
    #[serde(default = "default_weight_tolerance")]
    pub weight_tolerance_pct: f64,
    /// Price above which a transaction is treated as high-value
    #[serde(default = "default_high_value_price")]
    pub high_value_price: f64,
    /// Tighter weight tolerance (percent) applied to high-value transactions
    #[serde(default = "default_high_value_tolerance")]
    pub high_value_tolerance_pct: f64,
    /// Minimum acceptable recognition confidence
    #[serde(default = "default_recognition_threshold")]
    pub recognition_threshold: f64,
    /// Recognition gap (seconds) suggesting scanner avoidance
    #[serde(default = "default_scanner_gap_secs")]
    pub scanner_gap_secs: f64,
    /// Dwell time (seconds) above which a station visit is suspicious
    #[serde(default = "default_dwell_high_secs")]
    pub dwell_high_secs: f64,
    /// Dwell time (seconds) below which occupied stations suggest avoidance
    #[serde(default = "default_dwell_low_secs")]
    pub dwell_low_secs: f64,
    /// Customer count above which a station is congested
    #[serde(default = "default_congestion_threshold")]
    pub congestion_threshold: u32,
}

fn default_shrinkage_threshold() -> f64 {
    3.0
}

fn default_z_score_threshold() -> f64 {
    2.0
}

fn default_weight_tolerance() -> f64 {
    15.0
}

fn default_high_value_price() -> f64 {
    500.0
}

fn default_high_value_tolerance() -> f64 {
    25.0
}

fn default_recognition_threshold() -> f64 {
    0.7
}

fn default_scanner_gap_secs() -> f64 {
    60.0
}

fn default_dwell_high_secs() -> f64 {
    300.0
}

fn default_dwell_low_secs() -> f64 {
    10.0
}

fn default_congestion_threshold() -> u32 {
    2
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            shrinkage_threshold_pct: default_shrinkage_threshold(),
            z_score_threshold: default_z_score_threshold(),
            weight_tolerance_pct: default_weight_tolerance(),
            high_value_price: default_high_value_price(),
            high_value_tolerance_pct: default_high_value_tolerance(),
            recognition_threshold: default_recognition_threshold(),
            scanner_gap_secs: default_scanner_gap_secs(),
            dwell_high_secs: default_dwell_high_secs(),
            dwell_low_secs: default_dwell_low_secs(),
            congestion_threshold: default_congestion_threshold(),
        }
    }
}

/// Cross-stream correlation configuration
#[derive(Debug, Clone, Deserialize)]
pub struct CorrelationConfig {
    /// Time window (seconds) for joining findings across streams, inclusive
    #[serde(default = "default_window_secs")]
    pub window_secs: i64,
}

fn default_window_secs() -> i64 {
    300
}

impl Default for CorrelationConfig {
    fn default() -> Self {
        Self {
            window_secs: default_window_secs(),
        }
    }
}

/// Evidence feature weights for correlated-event severity scoring
#[derive(Debug, Clone, Deserialize)]
pub struct ScoringWeights {
    #[serde(default = "default_weight_discrepancy_weight")]
    pub weight_discrepancy: f64,
    #[serde(default = "default_recognition_weight")]
    pub recognition_confidence: f64,
    #[serde(default = "default_dwell_weight")]
    pub dwell_time: f64,
    #[serde(default = "default_inventory_weight")]
    pub inventory_shrinkage: f64,
    #[serde(default = "default_correlation_weight")]
    pub cross_correlation: f64,
}

fn default_weight_discrepancy_weight() -> f64 {
    0.30
}

fn default_recognition_weight() -> f64 {
    0.25
}

fn default_dwell_weight() -> f64 {
    0.20
}

fn default_inventory_weight() -> f64 {
    0.15
}

fn default_correlation_weight() -> f64 {
    0.10
}

impl Default for ScoringWeights {
    fn default() -> Self {
        Self {
            weight_discrepancy: default_weight_discrepancy_weight(),
            recognition_confidence: default_recognition_weight(),
            dwell_time: default_dwell_weight(),
            inventory_shrinkage: default_inventory_weight(),
            cross_correlation: default_correlation_weight(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,
    /// Log format (json, pretty)
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
        }
    }
}

impl AppConfig {
    /// Load configuration from the default path
    pub fn load() -> Result<Self> {
        Self::load_from_path("config/config.toml")
    }

    /// Load configuration from a specific path and validate all thresholds
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let config = Config::builder()
            .add_source(File::from(path.as_ref()))
            .build()
            .context("Failed to build configuration")?;

        let config: AppConfig = config
            .try_deserialize()
            .context("Failed to deserialize configuration")?;

        config.validate()?;
        Ok(config)
    }

    /// Reject invalid thresholds up front rather than clamping them silently.
    pub fn validate(&self) -> Result<()> {
        let d = &self.detectors;
        if d.shrinkage_threshold_pct < 0.0 {
            bail!(
                "shrinkage_threshold_pct must be non-negative, got {}",
                d.shrinkage_threshold_pct
            );
        }
        if d.z_score_threshold <= 0.0 {
            bail!(
                "z_score_threshold must be positive, got {}",
                d.z_score_threshold
            );
        }
        if d.weight_tolerance_pct < 0.0 || d.high_value_tolerance_pct < 0.0 {
            bail!("weight tolerances must be non-negative");
        }
        if !(0.0..=1.0).contains(&d.recognition_threshold) {
            bail!(
                "recognition_threshold must be within [0, 1], got {}",
                d.recognition_threshold
            );
        }
        if d.scanner_gap_secs < 0.0 || d.dwell_high_secs < 0.0 || d.dwell_low_secs < 0.0 {
            bail!("time thresholds must be non-negative");
        }
        if d.dwell_low_secs >= d.dwell_high_secs {
            bail!(
                "dwell_low_secs ({}) must be below dwell_high_secs ({})",
                d.dwell_low_secs,
                d.dwell_high_secs
            );
        }
        if d.high_value_price < 0.0 {
            bail!(
                "high_value_price must be non-negative, got {}",
                d.high_value_price
            );
        }
        if self.correlation.window_secs < 0 {
            bail!(
                "correlation window_secs must be non-negative, got {}",
                self.correlation.window_secs
            );
        }
        let w = &self.scoring;
        for (name, value) in [
            ("weight_discrepancy", w.weight_discrepancy),
            ("recognition_confidence", w.recognition_confidence),
            ("dwell_time", w.dwell_time),
            ("inventory_shrinkage", w.inventory_shrinkage),
            ("cross_correlation", w.cross_correlation),
        ] {
            if value < 0.0 {
                bail!(
                    "scoring weight {} must be non-negative, got {}",
                    name,
                    value
                );
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.detectors.shrinkage_threshold_pct, 3.0);
        assert_eq!(config.detectors.recognition_threshold, 0.7);
        assert_eq!(config.correlation.window_secs, 300);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_negative_threshold_rejected() {
        let mut config = AppConfig::default();
        config.detectors.shrinkage_threshold_pct = -1.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_out_of_range_confidence_rejected() {
        let mut config = AppConfig::default();
        config.detectors.recognition_threshold = 1.5;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_inverted_dwell_thresholds_rejected() {
        let mut config = AppConfig::default();
        config.detectors.dwell_low_secs = 400.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_load_rejects_invalid_threshold_file() {
        use std::io::Write;

        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(file, "[detectors]\nrecognition_threshold = 1.5").unwrap();

        assert!(AppConfig::load_from_path(file.path()).is_err());
    }

    #[test]
    fn test_scoring_weights_default() {
        let weights = ScoringWeights::default();
        assert_eq!(weights.weight_discrepancy, 0.30);
        assert_eq!(weights.cross_correlation, 0.10);
    }
}
