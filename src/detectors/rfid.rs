//! RFID stream detectors: read coverage, missing-tag streaks, tag journeys,
//! suspicious movement patterns, duplicate EPC sightings, tag/SKU mismatches,
//! and per-tag temporal gaps.

use crate::types::event::{CandidateEvent, CandidateKind, Severity};
use crate::types::record::{format_timestamp, RfidReading};
use chrono::NaiveDateTime;
use serde::Serialize;
use serde_json::{json, Map};
use std::collections::{BTreeMap, BTreeSet};
use tracing::debug;

fn ts<S: serde::Serializer>(value: &NaiveDateTime, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_str(&format_timestamp(*value))
}

const MISSING_STREAK_MIN: usize = 10;
const EXCESSIVE_LOCATION_COUNT: usize = 5;
const TEMPORAL_GAP_SECS: i64 = 3600;
const TEMPORAL_GAP_HIGH_SECS: i64 = 7200;

/// Read coverage for one scope (the whole stream or one station).
#[derive(Debug, Clone, Default, Serialize)]
pub struct CoverageStats {
    pub total_readings: usize,
    pub valid_readings: usize,
    pub coverage_rate: f64,
}

impl CoverageStats {
    fn from_counts(total: usize, valid: usize) -> Self {
        Self {
            total_readings: total,
            valid_readings: valid,
            coverage_rate: if total > 0 {
                valid as f64 / total as f64
            } else {
                0.0
            },
        }
    }
}

/// A chronological run of readings with no tag detected.
#[derive(Debug, Clone, Serialize)]
pub struct MissingTagEvent {
    #[serde(serialize_with = "ts")]
    pub start: NaiveDateTime,
    #[serde(serialize_with = "ts")]
    pub end: NaiveDateTime,
    pub station_id: String,
    pub consecutive_misses: usize,
}

/// The locations one tag passed through, consecutive duplicates collapsed.
#[derive(Debug, Clone, Serialize)]
pub struct TagJourney {
    pub epc: String,
    pub visits: Vec<String>,
    #[serde(serialize_with = "ts")]
    pub first_seen: NaiveDateTime,
    #[serde(serialize_with = "ts")]
    pub last_seen: NaiveDateTime,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MovementPattern {
    ExcessiveMovement,
    RapidBackAndForth,
}

/// A tag journey matching a known suspicious movement pattern.
#[derive(Debug, Clone, Serialize)]
pub struct SuspiciousMovement {
    pub epc: String,
    pub pattern: MovementPattern,
    pub visits: Vec<String>,
    #[serde(serialize_with = "ts")]
    pub first_seen: NaiveDateTime,
}

/// The same tag sighted in more than one place within the same minute.
#[derive(Debug, Clone, Serialize)]
pub struct DuplicateEpcIncident {
    pub epc: String,
    /// Minute bucket, `YYYY-MM-DDTHH:MM`
    pub minute: String,
    pub locations: Vec<String>,
    pub stations: Vec<String>,
    pub severity: Severity,
    #[serde(serialize_with = "ts")]
    pub timestamp: NaiveDateTime,
}

/// One EPC reported under more than one SKU.
#[derive(Debug, Clone, Serialize)]
pub struct TagSkuMismatch {
    pub epc: String,
    pub skus: Vec<String>,
    #[serde(serialize_with = "ts")]
    pub first_seen: NaiveDateTime,
}

/// A long silence in one tag's read history.
#[derive(Debug, Clone, Serialize)]
pub struct TemporalAnomaly {
    pub epc: String,
    #[serde(serialize_with = "ts")]
    pub gap_start: NaiveDateTime,
    #[serde(serialize_with = "ts")]
    pub gap_end: NaiveDateTime,
    pub gap_seconds: i64,
    pub severity: Severity,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct RfidReport {
    pub coverage: CoverageStats,
    pub station_coverage: BTreeMap<String, CoverageStats>,
    pub missing_tag_events: Vec<MissingTagEvent>,
    pub journeys: Vec<TagJourney>,
    pub suspicious_movements: Vec<SuspiciousMovement>,
    pub duplicate_epcs: Vec<DuplicateEpcIncident>,
    pub sku_mismatches: Vec<TagSkuMismatch>,
    pub temporal_anomalies: Vec<TemporalAnomaly>,
}

impl RfidReport {
    pub fn candidates(&self) -> Vec<CandidateEvent> {
        let mut pool = Vec::new();
        for event in &self.missing_tag_events {
            let mut evidence = Map::new();
            evidence.insert(
                "consecutive_misses".into(),
                json!(event.consecutive_misses),
            );
            evidence.insert("end".into(), json!(format_timestamp(event.end)));
            pool.push(CandidateEvent {
                timestamp: event.start,
                location: Some(event.station_id.clone()),
                kind: CandidateKind::MissingTagStreak,
                severity: Severity::Medium,
                evidence,
            });
        }
        for movement in &self.suspicious_movements {
            let mut evidence = Map::new();
            evidence.insert("epc".into(), json!(movement.epc));
            evidence.insert("pattern".into(), json!(movement.pattern));
            evidence.insert("visits".into(), json!(movement.visits));
            pool.push(CandidateEvent {
                timestamp: movement.first_seen,
                location: None,
                kind: CandidateKind::SuspiciousTagMovement,
                severity: Severity::Medium,
                evidence,
            });
        }
        for incident in &self.duplicate_epcs {
            let mut evidence = Map::new();
            evidence.insert("epc".into(), json!(incident.epc));
            evidence.insert("locations".into(), json!(incident.locations));
            evidence.insert("stations".into(), json!(incident.stations));
            pool.push(CandidateEvent {
                timestamp: incident.timestamp,
                location: None,
                kind: CandidateKind::DuplicateEpc,
                severity: incident.severity,
                evidence,
            });
        }
        for mismatch in &self.sku_mismatches {
            let mut evidence = Map::new();
            evidence.insert("epc".into(), json!(mismatch.epc));
            evidence.insert("skus".into(), json!(mismatch.skus));
            pool.push(CandidateEvent {
                timestamp: mismatch.first_seen,
                location: None,
                kind: CandidateKind::TagSkuMismatch,
                severity: Severity::High,
                evidence,
            });
        }
        for anomaly in &self.temporal_anomalies {
            let mut evidence = Map::new();
            evidence.insert("epc".into(), json!(anomaly.epc));
            evidence.insert("gap_seconds".into(), json!(anomaly.gap_seconds));
            pool.push(CandidateEvent {
                timestamp: anomaly.gap_start,
                location: None,
                kind: CandidateKind::TagTemporalAnomaly,
                severity: anomaly.severity,
                evidence,
            });
        }
        pool
    }
}

/// Run all RFID detectors over the reading stream.
pub fn analyze(readings: &[RfidReading]) -> RfidReport {
    let mut readings: Vec<&RfidReading> = readings.iter().collect();
    readings.sort_by_key(|r| r.timestamp);

    let (coverage, station_coverage) = coverage_stats(&readings);
    let missing_tag_events = detect_missing_tag_streaks(&readings);
    let journeys = build_journeys(&readings);
    let suspicious_movements = detect_suspicious_movements(&journeys);
    let duplicate_epcs = detect_duplicate_epcs(&readings);
    let sku_mismatches = detect_sku_mismatches(&readings);
    let temporal_anomalies = detect_temporal_anomalies(&readings);

    debug!(
        readings = coverage.total_readings,
        missing_streaks = missing_tag_events.len(),
        suspicious = suspicious_movements.len(),
        duplicates = duplicate_epcs.len(),
        "RFID analysis complete"
    );

    RfidReport {
        coverage,
        station_coverage,
        missing_tag_events,
        journeys,
        suspicious_movements,
        duplicate_epcs,
        sku_mismatches,
        temporal_anomalies,
    }
}

fn coverage_stats(readings: &[&RfidReading]) -> (CoverageStats, BTreeMap<String, CoverageStats>) {
    let mut per_station: BTreeMap<&str, (usize, usize)> = BTreeMap::new();
    let mut valid = 0usize;

    for reading in readings {
        let entry = per_station.entry(&reading.station_id).or_default();
        entry.0 += 1;
        if reading.epc.is_some() {
            entry.1 += 1;
            valid += 1;
        }
    }

    let global = CoverageStats::from_counts(readings.len(), valid);
    let stations = per_station
        .into_iter()
        .map(|(station, (total, valid))| {
            (station.to_string(), CoverageStats::from_counts(total, valid))
        })
        .collect();

    (global, stations)
}

fn detect_missing_tag_streaks(readings: &[&RfidReading]) -> Vec<MissingTagEvent> {
    let mut events = Vec::new();
    let mut streak: Vec<&RfidReading> = Vec::new();

    let mut flush = |streak: &mut Vec<&RfidReading>| {
        if streak.len() >= MISSING_STREAK_MIN {
            events.push(MissingTagEvent {
                start: streak[0].timestamp,
                end: streak[streak.len() - 1].timestamp,
                station_id: streak[0].station_id.clone(),
                consecutive_misses: streak.len(),
            });
        }
        streak.clear();
    };

    for reading in readings {
        if reading.epc.is_none() {
            streak.push(reading);
        } else {
            flush(&mut streak);
        }
    }
    flush(&mut streak);

    events
}

fn build_journeys(readings: &[&RfidReading]) -> Vec<TagJourney> {
    let mut by_epc: BTreeMap<&str, Vec<&RfidReading>> = BTreeMap::new();
    for reading in readings {
        if let Some(epc) = &reading.epc {
            by_epc.entry(epc).or_default().push(reading);
        }
    }

    let mut journeys = Vec::new();
    for (epc, tag_readings) in by_epc {
        let mut visits: Vec<String> = Vec::new();
        for reading in &tag_readings {
            if let Some(location) = &reading.location {
                if visits.last().map(|v| v.as_str()) != Some(location.as_str()) {
                    visits.push(location.clone());
                }
            }
        }
        journeys.push(TagJourney {
            epc: epc.to_string(),
            visits,
            first_seen: tag_readings[0].timestamp,
            last_seen: tag_readings[tag_readings.len() - 1].timestamp,
        });
    }

    journeys
}

fn detect_suspicious_movements(journeys: &[TagJourney]) -> Vec<SuspiciousMovement> {
    let mut suspicious = Vec::new();

    for journey in journeys {
        let distinct: BTreeSet<&str> = journey.visits.iter().map(String::as_str).collect();
        if distinct.len() > EXCESSIVE_LOCATION_COUNT {
            suspicious.push(SuspiciousMovement {
                epc: journey.epc.clone(),
                pattern: MovementPattern::ExcessiveMovement,
                visits: journey.visits.clone(),
                first_seen: journey.first_seen,
            });
        }
        // A -> B -> A oscillation, reported once per tag
        let oscillates = journey
            .visits
            .windows(3)
            .any(|w| w[0] == w[2] && w[0] != w[1]);
        if oscillates {
            suspicious.push(SuspiciousMovement {
                epc: journey.epc.clone(),
                pattern: MovementPattern::RapidBackAndForth,
                visits: journey.visits.clone(),
                first_seen: journey.first_seen,
            });
        }
    }

    suspicious
}

fn detect_duplicate_epcs(readings: &[&RfidReading]) -> Vec<DuplicateEpcIncident> {
    // epc + minute bucket -> sightings
    let mut buckets: BTreeMap<(String, String), Vec<&RfidReading>> = BTreeMap::new();
    for reading in readings {
        if let Some(epc) = &reading.epc {
            let minute = reading.timestamp.format("%Y-%m-%dT%H:%M").to_string();
            buckets
                .entry((epc.clone(), minute))
                .or_default()
                .push(reading);
        }
    }

    let mut incidents = Vec::new();
    for ((epc, minute), sightings) in buckets {
        let locations: BTreeSet<String> = sightings
            .iter()
            .filter_map(|r| r.location.clone())
            .collect();
        let stations: BTreeSet<String> =
            sightings.iter().map(|r| r.station_id.clone()).collect();

        if locations.len() > 1 || stations.len() > 1 {
            let severity = if locations.len() > 1 {
                Severity::High
            } else {
                Severity::Medium
            };
            incidents.push(DuplicateEpcIncident {
                epc,
                minute,
                locations: locations.into_iter().collect(),
                stations: stations.into_iter().collect(),
                severity,
                timestamp: sightings[0].timestamp,
            });
        }
    }

    incidents
}

fn detect_sku_mismatches(readings: &[&RfidReading]) -> Vec<TagSkuMismatch> {
    let mut by_epc: BTreeMap<&str, (NaiveDateTime, BTreeSet<&str>)> = BTreeMap::new();
    for reading in readings {
        let (Some(epc), Some(sku)) = (&reading.epc, &reading.sku) else {
            continue;
        };
        by_epc
            .entry(epc)
            .or_insert_with(|| (reading.timestamp, BTreeSet::new()))
            .1
            .insert(sku);
    }

    by_epc
        .into_iter()
        .filter(|(_, (_, skus))| skus.len() > 1)
        .map(|(epc, (first_seen, skus))| TagSkuMismatch {
            epc: epc.to_string(),
            skus: skus.into_iter().map(str::to_string).collect(),
            first_seen,
        })
        .collect()
}

fn detect_temporal_anomalies(readings: &[&RfidReading]) -> Vec<TemporalAnomaly> {
    let mut by_epc: BTreeMap<&str, Vec<NaiveDateTime>> = BTreeMap::new();
    for reading in readings {
        if let Some(epc) = &reading.epc {
            by_epc.entry(epc).or_default().push(reading.timestamp);
        }
    }

    let mut anomalies = Vec::new();
    for (epc, timestamps) in by_epc {
        for pair in timestamps.windows(2) {
            let gap = (pair[1] - pair[0]).num_seconds();
            if gap > TEMPORAL_GAP_SECS {
                let severity = if gap > TEMPORAL_GAP_HIGH_SECS {
                    Severity::High
                } else {
                    Severity::Medium
                };
                anomalies.push(TemporalAnomaly {
                    epc: epc.to_string(),
                    gap_start: pair[0],
                    gap_end: pair[1],
                    gap_seconds: gap,
                    severity,
                });
            }
        }
    }

    anomalies
}
