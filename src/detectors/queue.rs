//! Queue monitoring detectors: dwell-time anomalies, congestion periods, and
//! station efficiency summaries.

use crate::config::DetectorConfig;
use crate::stats;
use crate::types::event::{CandidateEvent, CandidateKind, Severity};
use crate::types::record::{format_timestamp, QueueObservation};
use chrono::{NaiveDateTime, Timelike};
use serde::Serialize;
use serde_json::{json, Map};
use std::collections::BTreeMap;
use tracing::debug;

fn ts<S: serde::Serializer>(value: &NaiveDateTime, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_str(&format_timestamp(*value))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DwellAnomalyKind {
    HighDwellTime,
    LowDwellTime,
}

/// An observation whose average dwell time falls outside the expected band.
#[derive(Debug, Clone, Serialize)]
pub struct DwellAnomaly {
    #[serde(serialize_with = "ts")]
    pub timestamp: NaiveDateTime,
    pub station_id: String,
    pub kind: DwellAnomalyKind,
    pub dwell_time: f64,
    pub customer_count: u32,
    pub severity: Severity,
}

/// A contiguous run of observations with the customer count above threshold.
#[derive(Debug, Clone, Serialize)]
pub struct CongestionPeriod {
    #[serde(serialize_with = "ts")]
    pub start: NaiveDateTime,
    #[serde(serialize_with = "ts")]
    pub end: NaiveDateTime,
    pub peak_customer_count: u32,
    pub observations: usize,
}

/// Congestion history for one station.
#[derive(Debug, Clone, Serialize)]
pub struct StationCongestion {
    pub station_id: String,
    pub periods: Vec<CongestionPeriod>,
    pub total_observations: usize,
    /// Share of observations spent congested
    pub congestion_rate: f64,
}

/// Throughput summary for one station over the whole run.
#[derive(Debug, Clone, Serialize)]
pub struct StationEfficiency {
    pub station_id: String,
    pub average_dwell_time: f64,
    pub average_customer_count: f64,
    /// Customers served per second of dwell, scaled by typical occupancy
    pub efficiency_score: f64,
    /// Share of observations with at least one customer present
    pub utilization: f64,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct QueueReport {
    pub dwell_anomalies: Vec<DwellAnomaly>,
    pub congestion: Vec<StationCongestion>,
    /// Count of congested observations per hour of day, store-wide
    pub hourly_congestion: BTreeMap<u32, usize>,
    pub efficiency: Vec<StationEfficiency>,
}

impl QueueReport {
    pub fn candidates(&self) -> Vec<CandidateEvent> {
        self.dwell_anomalies
            .iter()
            .map(|anomaly| {
                let mut evidence = Map::new();
                evidence.insert("dwell_time".into(), json!(anomaly.dwell_time));
                evidence.insert("customer_count".into(), json!(anomaly.customer_count));
                let kind = match anomaly.kind {
                    DwellAnomalyKind::HighDwellTime => CandidateKind::HighDwellTime,
                    DwellAnomalyKind::LowDwellTime => CandidateKind::LowDwellTime,
                };
                CandidateEvent {
                    timestamp: anomaly.timestamp,
                    location: Some(anomaly.station_id.clone()),
                    kind,
                    severity: anomaly.severity,
                    evidence,
                }
            })
            .collect()
    }
}

/// Run all queue detectors over the observation stream.
pub fn analyze(observations: &[QueueObservation], config: &DetectorConfig) -> QueueReport {
    let mut observations: Vec<&QueueObservation> = observations.iter().collect();
    observations.sort_by_key(|o| o.timestamp);

    let dwell_anomalies = detect_dwell_anomalies(&observations, config);
    let (congestion, hourly_congestion) = analyze_congestion(&observations, config);
    let efficiency = station_efficiency(&observations);

    debug!(
        anomalies = dwell_anomalies.len(),
        stations = efficiency.len(),
        "queue analysis complete"
    );

    QueueReport {
        dwell_anomalies,
        congestion,
        hourly_congestion,
        efficiency,
    }
}

fn detect_dwell_anomalies(
    observations: &[&QueueObservation],
    config: &DetectorConfig,
) -> Vec<DwellAnomaly> {
    let mut anomalies = Vec::new();

    for obs in observations {
        // Empty stations carry no dwell signal
        if obs.customer_count == 0 {
            continue;
        }
        if obs.average_dwell_time > config.dwell_high_secs {
            let severity = if obs.average_dwell_time > 600.0 {
                Severity::High
            } else {
                Severity::Medium
            };
            anomalies.push(DwellAnomaly {
                timestamp: obs.timestamp,
                station_id: obs.station_id.clone(),
                kind: DwellAnomalyKind::HighDwellTime,
                dwell_time: obs.average_dwell_time,
                customer_count: obs.customer_count,
                severity,
            });
        } else if obs.average_dwell_time < config.dwell_low_secs {
            anomalies.push(DwellAnomaly {
                timestamp: obs.timestamp,
                station_id: obs.station_id.clone(),
                kind: DwellAnomalyKind::LowDwellTime,
                dwell_time: obs.average_dwell_time,
                customer_count: obs.customer_count,
                severity: Severity::Medium,
            });
        }
    }

    anomalies
}

type CongestionFindings = (Vec<StationCongestion>, BTreeMap<u32, usize>);

fn analyze_congestion(
    observations: &[&QueueObservation],
    config: &DetectorConfig,
) -> CongestionFindings {
    let mut by_station: BTreeMap<&str, Vec<&QueueObservation>> = BTreeMap::new();
    let mut hourly: BTreeMap<u32, usize> = BTreeMap::new();

    for obs in observations {
        by_station.entry(&obs.station_id).or_default().push(obs);
        if obs.customer_count > config.congestion_threshold {
            *hourly.entry(obs.timestamp.hour()).or_default() += 1;
        }
    }

    let mut stations = Vec::new();
    for (station_id, station_obs) in by_station {
        let mut periods = Vec::new();
        let mut current: Option<CongestionPeriod> = None;

        for obs in &station_obs {
            if obs.customer_count > config.congestion_threshold {
                match current.as_mut() {
                    Some(period) => {
                        period.end = obs.timestamp;
                        period.peak_customer_count =
                            period.peak_customer_count.max(obs.customer_count);
                        period.observations += 1;
                    }
                    None => {
                        current = Some(CongestionPeriod {
                            start: obs.timestamp,
                            end: obs.timestamp,
                            peak_customer_count: obs.customer_count,
                            observations: 1,
                        });
                    }
                }
            } else if let Some(period) = current.take() {
                periods.push(period);
            }
        }
        if let Some(period) = current {
            periods.push(period);
        }

        let congested: usize = periods.iter().map(|p| p.observations).sum();
        let total = station_obs.len();
        stations.push(StationCongestion {
            station_id: station_id.to_string(),
            periods,
            total_observations: total,
            congestion_rate: if total > 0 {
                congested as f64 / total as f64
            } else {
                0.0
            },
        });
    }

    (stations, hourly)
}

fn station_efficiency(observations: &[&QueueObservation]) -> Vec<StationEfficiency> {
    let mut by_station: BTreeMap<&str, Vec<&QueueObservation>> = BTreeMap::new();
    for obs in observations {
        by_station.entry(&obs.station_id).or_default().push(obs);
    }

    let mut stations = Vec::new();
    for (station_id, station_obs) in by_station {
        // Throughput is measured over active observations only; empty-station
        // rows count toward utilization but not the averages.
        let active: Vec<&&QueueObservation> = station_obs
            .iter()
            .filter(|o| o.customer_count > 0)
            .collect();
        let dwells: Vec<f64> = active.iter().map(|o| o.average_dwell_time).collect();
        let counts: Vec<f64> = active.iter().map(|o| o.customer_count as f64).collect();
        let avg_dwell = stats::mean(&dwells);
        let avg_count = stats::mean(&counts);
        let occupied = active.len();

        stations.push(StationEfficiency {
            station_id: station_id.to_string(),
            average_dwell_time: avg_dwell,
            average_customer_count: avg_count,
            efficiency_score: if avg_dwell > 0.0 {
                (1.0 / avg_dwell) * avg_count
            } else {
                0.0
            },
            utilization: if station_obs.is_empty() {
                0.0
            } else {
                occupied as f64 / station_obs.len() as f64
            },
        });
    }

    stations
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::record::parse_timestamp;

    fn obs(timestamp: &str, station: &str, count: u32, dwell: f64) -> QueueObservation {
        QueueObservation {
            timestamp: parse_timestamp(timestamp).unwrap(),
            station_id: station.to_string(),
            customer_count: count,
            average_dwell_time: dwell,
        }
    }

    fn config() -> DetectorConfig {
        DetectorConfig::default()
    }

    #[test]
    fn test_high_dwell_severity_split() {
        let observations = vec![
            obs("2025-08-13T16:00:00", "SCC1", 2, 450.0),
            obs("2025-08-13T16:01:00", "SCC1", 2, 700.0),
        ];
        let report = analyze(&observations, &config());
        assert_eq!(report.dwell_anomalies.len(), 2);
        assert_eq!(report.dwell_anomalies[0].severity, Severity::Medium);
        assert_eq!(report.dwell_anomalies[1].severity, Severity::High);
        assert_eq!(
            report.dwell_anomalies[0].kind,
            DwellAnomalyKind::HighDwellTime
        );
    }

    #[test]
    fn test_low_dwell_requires_customers() {
        let observations = vec![
            obs("2025-08-13T16:00:00", "SCC1", 0, 0.0),
            obs("2025-08-13T16:01:00", "SCC1", 3, 5.0),
        ];
        let report = analyze(&observations, &config());
        assert_eq!(report.dwell_anomalies.len(), 1);
        assert_eq!(
            report.dwell_anomalies[0].kind,
            DwellAnomalyKind::LowDwellTime
        );
        assert_eq!(report.dwell_anomalies[0].severity, Severity::Medium);
    }

    #[test]
    fn test_boundary_dwell_is_not_anomalous() {
        let observations = vec![
            obs("2025-08-13T16:00:00", "SCC1", 2, 300.0),
            obs("2025-08-13T16:01:00", "SCC1", 2, 10.0),
        ];
        let report = analyze(&observations, &config());
        assert!(report.dwell_anomalies.is_empty());
    }

    #[test]
    fn test_congestion_periods_are_contiguous_runs() {
        let observations = vec![
            obs("2025-08-13T16:00:00", "SCC1", 4, 60.0),
            obs("2025-08-13T16:01:00", "SCC1", 5, 60.0),
            obs("2025-08-13T16:02:00", "SCC1", 1, 60.0),
            obs("2025-08-13T16:03:00", "SCC1", 3, 60.0),
        ];
        let report = analyze(&observations, &config());
        assert_eq!(report.congestion.len(), 1);
        let station = &report.congestion[0];
        assert_eq!(station.periods.len(), 2);
        assert_eq!(station.periods[0].peak_customer_count, 5);
        assert_eq!(station.periods[0].observations, 2);
        assert!((station.congestion_rate - 0.75).abs() < 1e-9);
    }

    #[test]
    fn test_threshold_count_is_not_congested() {
        let observations = vec![obs("2025-08-13T16:00:00", "SCC1", 2, 60.0)];
        let report = analyze(&observations, &config());
        assert!(report.congestion[0].periods.is_empty());
    }

    #[test]
    fn test_hourly_congestion_histogram() {
        let observations = vec![
            obs("2025-08-13T16:00:00", "SCC1", 4, 60.0),
            obs("2025-08-13T16:30:00", "SCC2", 5, 60.0),
            obs("2025-08-13T17:00:00", "SCC1", 4, 60.0),
        ];
        let report = analyze(&observations, &config());
        assert_eq!(report.hourly_congestion.get(&16), Some(&2));
        assert_eq!(report.hourly_congestion.get(&17), Some(&1));
    }

    #[test]
    fn test_station_efficiency() {
        let observations = vec![
            obs("2025-08-13T16:00:00", "SCC1", 2, 100.0),
            obs("2025-08-13T16:01:00", "SCC1", 0, 0.0),
        ];
        let report = analyze(&observations, &config());
        assert_eq!(report.efficiency.len(), 1);
        let e = &report.efficiency[0];
        assert!((e.average_dwell_time - 100.0).abs() < 1e-9);
        assert!((e.average_customer_count - 2.0).abs() < 1e-9);
        assert!((e.utilization - 0.5).abs() < 1e-9);
        assert!((e.efficiency_score - (1.0 / 100.0) * 2.0).abs() < 1e-9);
    }

    #[test]
    fn test_efficiency_ignores_empty_station_rows() {
        // Empty rows must not dilute the reported averages
        let observations = vec![
            obs("2025-08-13T16:00:00", "SCC1", 4, 200.0),
            obs("2025-08-13T16:01:00", "SCC1", 0, 0.0),
        ];
        let report = analyze(&observations, &config());
        let e = &report.efficiency[0];
        assert!((e.average_dwell_time - 200.0).abs() < 1e-9);
        assert!((e.average_customer_count - 4.0).abs() < 1e-9);
        assert!((e.utilization - 0.5).abs() < 1e-9);
    }
}
