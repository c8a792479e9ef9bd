//! Synthetic telemetry generator for local pipeline runs.
//!
//! Writes the five input streams under a target directory (default
//! `data/input`), seeding a handful of anomalies so every detector has
//! something to find.

use anyhow::{Context, Result};
use chrono::{Duration, NaiveDate, NaiveDateTime};
use rand::seq::SliceRandom;
use rand::Rng;
use serde_json::json;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

const STATIONS: [&str; 4] = ["SCC1", "SCC2", "SCC3", "SCC4"];
const LOCATIONS: [&str; 5] = ["ENTRANCE", "AISLE_1", "AISLE_2", "CHECKOUT", "EXIT"];
const PRODUCTS: [(&str, &str, f64, f64); 6] = [
    ("PRD_F_03", "Milk 1L", 250.0, 400.0),
    ("PRD_B_01", "Cola 2L", 180.0, 500.0),
    ("PRD_S_02", "Chips", 120.0, 200.0),
    ("PRD_V_05", "Tomatoes 1kg", 90.0, 300.0),
    ("PRD_H_01", "Shampoo", 320.0, 150.0),
    ("PRD_A_03", "Batteries", 450.0, 100.0),
];

fn main() -> Result<()> {
    let dir = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "data/input".to_string());
    let dir = Path::new(&dir);
    std::fs::create_dir_all(dir)
        .with_context(|| format!("failed to create {}", dir.display()))?;

    let base = NaiveDate::from_ymd_opt(2025, 8, 13)
        .and_then(|d| d.and_hms_opt(16, 0, 0))
        .context("invalid base timestamp")?;
    let mut rng = rand::thread_rng();

    generate_inventory(dir, base, &mut rng)?;
    generate_pos(dir, base, &mut rng)?;
    generate_recognition(dir, base, &mut rng)?;
    generate_queue(dir, base, &mut rng)?;
    generate_rfid(dir, base, &mut rng)?;

    println!("wrote 5 streams to {}", dir.display());
    Ok(())
}

fn writer(dir: &Path, name: &str) -> Result<BufWriter<File>> {
    let path = dir.join(name);
    let file =
        File::create(&path).with_context(|| format!("failed to create {}", path.display()))?;
    Ok(BufWriter::new(file))
}

fn fmt(ts: NaiveDateTime) -> String {
    ts.format("%Y-%m-%dT%H:%M:%S").to_string()
}

fn generate_inventory(dir: &Path, base: NaiveDateTime, rng: &mut impl Rng) -> Result<()> {
    let mut out = writer(dir, "inventory_snapshots.jsonl")?;
    let mut quantities: Vec<i64> = PRODUCTS.iter().map(|_| rng.gen_range(50..150)).collect();

    for snapshot in 0..12 {
        for qty in quantities.iter_mut() {
            *qty -= rng.gen_range(0..3);
        }
        // One sudden drop midway through the run
        if snapshot == 6 {
            quantities[0] = (quantities[0] as f64 * 0.8) as i64;
        }

        let data: serde_json::Map<String, serde_json::Value> = PRODUCTS
            .iter()
            .zip(&quantities)
            .map(|((sku, _, _, _), qty)| (sku.to_string(), json!(qty)))
            .collect();
        let line = json!({
            "timestamp": fmt(base + Duration::minutes(snapshot * 10)),
            "station_id": null,
            "status": "Active",
            "data": data,
        });
        writeln!(out, "{line}")?;
    }
    out.flush()?;
    Ok(())
}

fn generate_pos(dir: &Path, base: NaiveDateTime, rng: &mut impl Rng) -> Result<()> {
    let mut out = writer(dir, "pos_transactions.jsonl")?;

    for i in 0..200i64 {
        let (sku, name, price, weight) = *PRODUCTS.choose(rng).unwrap();
        let station = *STATIONS.choose(rng).unwrap();
        let customer = format!("C{:03}", rng.gen_range(1..40));

        // Roughly one in ten transactions carries a weight discrepancy
        let actual_weight = if rng.gen_bool(0.1) {
            weight * rng.gen_range(1.4..2.5)
        } else {
            weight * rng.gen_range(0.97..1.03)
        };

        let line = json!({
            "timestamp": fmt(base + Duration::seconds(i * 30)),
            "station_id": station,
            "status": "Active",
            "data": {
                "customer_id": customer,
                "sku": sku,
                "product_name": name,
                "price": price,
                "weight_g": (actual_weight * 10.0).round() / 10.0,
            },
        });
        writeln!(out, "{line}")?;
    }
    out.flush()?;
    Ok(())
}

fn generate_recognition(dir: &Path, base: NaiveDateTime, rng: &mut impl Rng) -> Result<()> {
    let mut out = writer(dir, "product_recognition.jsonl")?;

    for i in 0..200i64 {
        let (sku, _, _, _) = *PRODUCTS.choose(rng).unwrap();
        let station = *STATIONS.choose(rng).unwrap();
        let accuracy: f64 = if rng.gen_bool(0.15) {
            rng.gen_range(0.2..0.7)
        } else {
            rng.gen_range(0.75..0.99)
        };

        let line = json!({
            "timestamp": fmt(base + Duration::seconds(i * 30 + 5)),
            "station_id": station,
            "status": "Active",
            "data": {
                "predicted_product": sku,
                "accuracy": (accuracy * 100.0).round() / 100.0,
            },
        });
        writeln!(out, "{line}")?;
    }
    out.flush()?;
    Ok(())
}

fn generate_queue(dir: &Path, base: NaiveDateTime, rng: &mut impl Rng) -> Result<()> {
    let mut out = writer(dir, "queue_monitoring.jsonl")?;

    for i in 0..120i64 {
        for station in STATIONS {
            let customer_count = rng.gen_range(0..6u32);
            let dwell = if customer_count == 0 {
                0.0
            } else if rng.gen_bool(0.05) {
                rng.gen_range(320.0..900.0)
            } else {
                rng.gen_range(30.0..180.0)
            };

            let line = json!({
                "timestamp": fmt(base + Duration::minutes(i)),
                "station_id": station,
                "status": "Active",
                "data": {
                    "customer_count": customer_count,
                    "average_dwell_time": (dwell * 10.0_f64).round() / 10.0,
                },
            });
            writeln!(out, "{line}")?;
        }
    }
    out.flush()?;
    Ok(())
}

fn generate_rfid(dir: &Path, base: NaiveDateTime, rng: &mut impl Rng) -> Result<()> {
    let mut out = writer(dir, "rfid_readings.jsonl")?;
    let tags: Vec<String> = (0..30)
        .map(|i| format!("E28011606000000000000{:04}", i))
        .collect();

    for i in 0..400i64 {
        // Occasional dead-air stretches where no tag is read
        let miss = rng.gen_bool(0.08) || (60..75).contains(&i);
        let (epc, location, sku) = if miss {
            (None, None, None)
        } else {
            let tag_idx = rng.gen_range(0..tags.len());
            let (sku, _, _, _) = PRODUCTS[tag_idx % PRODUCTS.len()];
            (
                Some(tags[tag_idx].clone()),
                Some(*LOCATIONS.choose(rng).unwrap()),
                Some(sku),
            )
        };

        let line = json!({
            "timestamp": fmt(base + Duration::seconds(i * 10)),
            "station_id": format!("RFID{}", rng.gen_range(1..3)),
            "status": "Active",
            "data": {
                "epc": epc,
                "location": location,
                "sku": sku,
            },
        });
        writeln!(out, "{line}")?;
    }
    out.flush()?;
    Ok(())
}
