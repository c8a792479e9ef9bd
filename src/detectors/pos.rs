//! POS transaction detectors: weight discrepancies against the product
//! master, barcode-swap signatures, and per-customer behavior patterns.

use crate::config::DetectorConfig;
use crate::stats;
use crate::types::event::{CandidateEvent, CandidateKind, Severity};
use crate::types::record::{format_timestamp, PosTransaction};
use chrono::NaiveDateTime;
use serde::Serialize;
use serde_json::{json, Map};
use std::collections::{BTreeMap, HashMap};
use tracing::debug;

fn ts<S: serde::Serializer>(value: &NaiveDateTime, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_str(&format_timestamp(*value))
}

/// Authoritative expected weights. Per-SKU overrides win over category
/// defaults; the category is the first two underscore-separated segments of
/// the SKU (`PRD_F_03` -> `PRD_F`).
#[derive(Debug, Clone)]
pub struct ProductMaster {
    sku_weights: HashMap<String, f64>,
    category_defaults: HashMap<String, f64>,
    fallback_weight: f64,
}

impl ProductMaster {
    pub fn new() -> Self {
        let category_defaults = [
            ("PRD_F", 400.0), // Food
            ("PRD_B", 500.0), // Beverages
            ("PRD_A", 100.0), // Accessories
            ("PRD_S", 200.0), // Snacks
            ("PRD_V", 300.0), // Vegetables
            ("PRD_H", 150.0), // Health
            ("PRD_C", 250.0), // Cosmetics
            ("PRD_T", 300.0), // Textiles
        ]
        .into_iter()
        .map(|(category, weight)| (category.to_string(), weight))
        .collect();

        Self {
            sku_weights: HashMap::new(),
            category_defaults,
            fallback_weight: 300.0,
        }
    }

    /// Register an authoritative per-SKU weight.
    pub fn set_sku_weight(&mut self, sku: &str, weight_g: f64) {
        self.sku_weights.insert(sku.to_string(), weight_g);
    }

    /// Expected weight in grams for a SKU.
    pub fn expected_weight(&self, sku: &str) -> f64 {
        if let Some(&weight) = self.sku_weights.get(sku) {
            return weight;
        }
        let category: String = sku.splitn(3, '_').take(2).collect::<Vec<_>>().join("_");
        self.category_defaults
            .get(&category)
            .copied()
            .unwrap_or(self.fallback_weight)
    }
}

impl Default for ProductMaster {
    fn default() -> Self {
        Self::new()
    }
}

/// Transaction whose scale weight disagrees with the product master.
#[derive(Debug, Clone, Serialize)]
pub struct WeightDiscrepancy {
    #[serde(serialize_with = "ts")]
    pub timestamp: NaiveDateTime,
    pub station_id: String,
    pub customer_id: String,
    pub sku: String,
    pub product_name: String,
    pub expected_weight: f64,
    pub actual_weight: f64,
    pub weight_difference_pct: f64,
    pub price: f64,
    pub severity: Severity,
}

/// Transaction priced far below its SKU's usual price-per-gram.
#[derive(Debug, Clone, Serialize)]
pub struct BarcodeSwap {
    #[serde(serialize_with = "ts")]
    pub timestamp: NaiveDateTime,
    pub station_id: String,
    pub customer_id: String,
    pub sku: String,
    pub product_name: String,
    pub price: f64,
    pub actual_weight: f64,
    pub current_price_per_gram: f64,
    pub expected_price_per_gram: f64,
    pub price_ratio: f64,
}

/// Customer with a majority of their transactions weight-flagged.
#[derive(Debug, Clone, Serialize)]
pub struct FrequentDiscrepancyCustomer {
    #[serde(serialize_with = "ts")]
    pub last_seen: NaiveDateTime,
    pub customer_id: String,
    pub total_transactions: usize,
    pub discrepancy_count: usize,
    pub discrepancy_rate: f64,
    pub total_value: f64,
}

/// Expensive item with a weight discrepancy beyond the high-value tolerance.
#[derive(Debug, Clone, Serialize)]
pub struct HighValueDiscrepancy {
    #[serde(serialize_with = "ts")]
    pub timestamp: NaiveDateTime,
    pub station_id: String,
    pub customer_id: String,
    pub sku: String,
    pub product_name: String,
    pub price: f64,
    pub weight_discrepancy_pct: f64,
}

/// Customer scanning items implausibly fast.
#[derive(Debug, Clone, Serialize)]
pub struct RapidScanningCustomer {
    pub customer_id: String,
    pub total_items: usize,
    pub median_seconds_between_items: f64,
    pub total_value: f64,
    #[serde(serialize_with = "ts")]
    pub session_start: NaiveDateTime,
    #[serde(serialize_with = "ts")]
    pub session_end: NaiveDateTime,
}

/// Run-wide transaction pattern summary.
#[derive(Debug, Clone, Default, Serialize)]
pub struct TransactionSummary {
    pub total_transactions: usize,
    pub unique_customers: usize,
    pub total_value: f64,
    pub flagged_transactions: usize,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct PosReport {
    pub weight_discrepancies: Vec<WeightDiscrepancy>,
    pub barcode_swaps: Vec<BarcodeSwap>,
    pub frequent_discrepancy_customers: Vec<FrequentDiscrepancyCustomer>,
    pub high_value_discrepancies: Vec<HighValueDiscrepancy>,
    pub rapid_scanners: Vec<RapidScanningCustomer>,
    pub summary: TransactionSummary,
}

impl PosReport {
    pub fn candidates(&self) -> Vec<CandidateEvent> {
        let mut pool = Vec::new();
        for d in &self.weight_discrepancies {
            let mut evidence = Map::new();
            evidence.insert("customer_id".into(), json!(d.customer_id));
            evidence.insert("sku".into(), json!(d.sku));
            evidence.insert("product_name".into(), json!(d.product_name));
            evidence.insert("expected_weight".into(), json!(d.expected_weight));
            evidence.insert("actual_weight".into(), json!(d.actual_weight));
            evidence.insert(
                "weight_difference_pct".into(),
                json!(d.weight_difference_pct),
            );
            evidence.insert("price".into(), json!(d.price));
            pool.push(CandidateEvent {
                timestamp: d.timestamp,
                location: Some(d.station_id.clone()),
                kind: CandidateKind::WeightDiscrepancy,
                severity: d.severity,
                evidence,
            });
        }
        for swap in &self.barcode_swaps {
            let mut evidence = Map::new();
            evidence.insert("customer_id".into(), json!(swap.customer_id));
            evidence.insert("sku".into(), json!(swap.sku));
            evidence.insert("price_ratio".into(), json!(swap.price_ratio));
            pool.push(CandidateEvent {
                timestamp: swap.timestamp,
                location: Some(swap.station_id.clone()),
                kind: CandidateKind::BarcodeSwap,
                severity: Severity::High,
                evidence,
            });
        }
        for customer in &self.frequent_discrepancy_customers {
            let mut evidence = Map::new();
            evidence.insert("customer_id".into(), json!(customer.customer_id));
            evidence.insert(
                "discrepancy_rate".into(),
                json!(customer.discrepancy_rate),
            );
            evidence.insert(
                "total_transactions".into(),
                json!(customer.total_transactions),
            );
            pool.push(CandidateEvent {
                timestamp: customer.last_seen,
                location: None,
                kind: CandidateKind::FrequentDiscrepancyCustomer,
                severity: Severity::High,
                evidence,
            });
        }
        for hv in &self.high_value_discrepancies {
            let mut evidence = Map::new();
            evidence.insert("customer_id".into(), json!(hv.customer_id));
            evidence.insert("sku".into(), json!(hv.sku));
            evidence.insert("price".into(), json!(hv.price));
            evidence.insert(
                "weight_discrepancy_pct".into(),
                json!(hv.weight_discrepancy_pct),
            );
            pool.push(CandidateEvent {
                timestamp: hv.timestamp,
                location: Some(hv.station_id.clone()),
                kind: CandidateKind::HighValueDiscrepancy,
                severity: Severity::High,
                evidence,
            });
        }
        for scanner in &self.rapid_scanners {
            let mut evidence = Map::new();
            evidence.insert("customer_id".into(), json!(scanner.customer_id));
            evidence.insert("total_items".into(), json!(scanner.total_items));
            evidence.insert(
                "median_seconds_between_items".into(),
                json!(scanner.median_seconds_between_items),
            );
            pool.push(CandidateEvent {
                timestamp: scanner.session_start,
                location: None,
                kind: CandidateKind::RapidScanning,
                severity: Severity::Medium,
                evidence,
            });
        }
        pool
    }
}

/// Run all POS detectors over the transaction stream.
pub fn analyze(
    transactions: &[PosTransaction],
    master: &ProductMaster,
    config: &DetectorConfig,
) -> PosReport {
    let weight_discrepancies = detect_weight_discrepancies(transactions, master, config);
    let barcode_swaps = detect_barcode_swaps(transactions, master);
    let (frequent_discrepancy_customers, high_value_discrepancies, rapid_scanners) =
        analyze_customer_behavior(transactions, master, config);

    let customers: std::collections::BTreeSet<&str> = transactions
        .iter()
        .map(|t| t.customer_id.as_str())
        .collect();
    let summary = TransactionSummary {
        total_transactions: transactions.len(),
        unique_customers: customers.len(),
        total_value: transactions.iter().map(|t| t.price).sum(),
        flagged_transactions: weight_discrepancies.len(),
    };

    debug!(
        weight = weight_discrepancies.len(),
        barcode = barcode_swaps.len(),
        frequent = frequent_discrepancy_customers.len(),
        high_value = high_value_discrepancies.len(),
        rapid = rapid_scanners.len(),
        "POS analysis complete"
    );

    PosReport {
        weight_discrepancies,
        barcode_swaps,
        frequent_discrepancy_customers,
        high_value_discrepancies,
        rapid_scanners,
        summary,
    }
}

fn weight_difference_pct(expected: f64, actual: f64) -> Option<f64> {
    if expected <= 0.0 || actual <= 0.0 {
        return None;
    }
    Some((actual - expected).abs() / expected * 100.0)
}

fn detect_weight_discrepancies(
    transactions: &[PosTransaction],
    master: &ProductMaster,
    config: &DetectorConfig,
) -> Vec<WeightDiscrepancy> {
    let mut discrepancies = Vec::new();

    for tx in transactions {
        let expected = master.expected_weight(&tx.sku);
        let Some(diff_pct) = weight_difference_pct(expected, tx.weight_g) else {
            continue;
        };
        if diff_pct > config.weight_tolerance_pct {
            let severity = if diff_pct > 50.0 {
                Severity::High
            } else {
                Severity::Medium
            };
            discrepancies.push(WeightDiscrepancy {
                timestamp: tx.timestamp,
                station_id: tx.station_id.clone(),
                customer_id: tx.customer_id.clone(),
                sku: tx.sku.clone(),
                product_name: tx.product_name.clone(),
                expected_weight: expected,
                actual_weight: tx.weight_g,
                weight_difference_pct: diff_pct,
                price: tx.price,
                severity,
            });
        }
    }

    discrepancies
}

/// Price-per-gram signature of barcode switching: a cheap item's barcode
/// scanned for a heavier or pricier item shows up as a transaction priced at
/// half or less of the SKU's usual rate.
fn detect_barcode_swaps(
    transactions: &[PosTransaction],
    master: &ProductMaster,
) -> Vec<BarcodeSwap> {
    // Baseline price-per-gram per SKU from authoritative expected weights
    let mut per_sku: BTreeMap<&str, Vec<f64>> = BTreeMap::new();
    for tx in transactions {
        let expected = master.expected_weight(&tx.sku);
        if expected > 0.0 {
            per_sku.entry(&tx.sku).or_default().push(tx.price / expected);
        }
    }
    let averages: HashMap<&str, f64> = per_sku
        .into_iter()
        .map(|(sku, rates)| (sku, stats::mean(&rates)))
        .collect();

    let mut swaps = Vec::new();
    for tx in transactions {
        if tx.weight_g <= 0.0 {
            continue;
        }
        let current_ppg = tx.price / tx.weight_g;
        let Some(&expected_ppg) = averages.get(tx.sku.as_str()) else {
            continue;
        };
        if expected_ppg <= 0.0 {
            continue;
        }
        let ratio = current_ppg / expected_ppg;
        if ratio <= 0.5 {
            swaps.push(BarcodeSwap {
                timestamp: tx.timestamp,
                station_id: tx.station_id.clone(),
                customer_id: tx.customer_id.clone(),
                sku: tx.sku.clone(),
                product_name: tx.product_name.clone(),
                price: tx.price,
                actual_weight: tx.weight_g,
                current_price_per_gram: current_ppg,
                expected_price_per_gram: expected_ppg,
                price_ratio: ratio,
            });
        }
    }

    swaps
}

type CustomerFindings = (
    Vec<FrequentDiscrepancyCustomer>,
    Vec<HighValueDiscrepancy>,
    Vec<RapidScanningCustomer>,
);

fn analyze_customer_behavior(
    transactions: &[PosTransaction],
    master: &ProductMaster,
    config: &DetectorConfig,
) -> CustomerFindings {
    let mut by_customer: BTreeMap<&str, Vec<&PosTransaction>> = BTreeMap::new();
    for tx in transactions {
        by_customer.entry(&tx.customer_id).or_default().push(tx);
    }

    let mut frequent = Vec::new();
    let mut high_value = Vec::new();
    let mut rapid = Vec::new();

    for (customer_id, mut txs) in by_customer {
        txs.sort_by_key(|t| t.timestamp);

        let total = txs.len();
        let total_value: f64 = txs.iter().map(|t| t.price).sum();

        let discrepancy_count = txs
            .iter()
            .filter(|t| {
                weight_difference_pct(master.expected_weight(&t.sku), t.weight_g)
                    .is_some_and(|pct| pct > config.weight_tolerance_pct)
            })
            .count();

        if total >= 4 && discrepancy_count as f64 / total as f64 > 0.5 {
            frequent.push(FrequentDiscrepancyCustomer {
                last_seen: txs.last().map(|t| t.timestamp).unwrap_or_default(),
                customer_id: customer_id.to_string(),
                total_transactions: total,
                discrepancy_count,
                discrepancy_rate: discrepancy_count as f64 / total as f64,
                total_value,
            });
        }

        for tx in txs.iter().filter(|t| t.price > config.high_value_price) {
            let Some(diff_pct) =
                weight_difference_pct(master.expected_weight(&tx.sku), tx.weight_g)
            else {
                continue;
            };
            if diff_pct > config.high_value_tolerance_pct {
                high_value.push(HighValueDiscrepancy {
                    timestamp: tx.timestamp,
                    station_id: tx.station_id.clone(),
                    customer_id: customer_id.to_string(),
                    sku: tx.sku.clone(),
                    product_name: tx.product_name.clone(),
                    price: tx.price,
                    weight_discrepancy_pct: diff_pct,
                });
            }
        }

        if total >= 6 {
            let gaps: Vec<f64> = txs
                .windows(2)
                .map(|pair| (pair[1].timestamp - pair[0].timestamp).num_seconds() as f64)
                .collect();
            let median_gap = stats::median(&gaps);
            if median_gap < 10.0 {
                rapid.push(RapidScanningCustomer {
                    customer_id: customer_id.to_string(),
                    total_items: total,
                    median_seconds_between_items: median_gap,
                    total_value,
                    session_start: txs[0].timestamp,
                    session_end: txs[total - 1].timestamp,
                });
            }
        }
    }

    (frequent, high_value, rapid)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::record::parse_timestamp;

    fn tx(
        timestamp: &str,
        customer: &str,
        sku: &str,
        price: f64,
        weight_g: f64,
    ) -> PosTransaction {
        PosTransaction {
            timestamp: parse_timestamp(timestamp).unwrap(),
            station_id: "SCC1".to_string(),
            customer_id: customer.to_string(),
            sku: sku.to_string(),
            product_name: format!("product {sku}"),
            price,
            weight_g,
        }
    }

    fn master_with(sku: &str, weight: f64) -> ProductMaster {
        let mut master = ProductMaster::new();
        master.set_sku_weight(sku, weight);
        master
    }

    fn config() -> DetectorConfig {
        DetectorConfig::default()
    }

    #[test]
    fn test_expected_weight_resolution() {
        let master = master_with("PRD_F_99", 1500.0);
        assert_eq!(master.expected_weight("PRD_F_99"), 1500.0);
        // Category default
        assert_eq!(master.expected_weight("PRD_B_01"), 500.0);
        // Unknown category falls back
        assert_eq!(master.expected_weight("PRD_X_01"), 300.0);
    }

    #[test]
    fn test_exact_weight_is_not_flagged() {
        let master = master_with("PRD_F_01", 1500.0);
        let transactions = vec![tx("2025-08-13T16:00:00", "C1", "PRD_F_01", 250.0, 1500.0)];
        let report = analyze(&transactions, &master, &config());
        assert!(report.weight_discrepancies.is_empty());
    }

    #[test]
    fn test_moderate_discrepancy_is_medium() {
        let master = master_with("PRD_F_01", 1500.0);
        let transactions = vec![tx("2025-08-13T16:00:00", "C1", "PRD_F_01", 250.0, 2000.0)];
        let report = analyze(&transactions, &master, &config());
        assert_eq!(report.weight_discrepancies.len(), 1);
        let d = &report.weight_discrepancies[0];
        assert_eq!(d.severity, Severity::Medium);
        assert!((d.weight_difference_pct - 33.333333).abs() < 1e-3);
    }

    #[test]
    fn test_large_discrepancy_is_high() {
        let master = master_with("PRD_F_01", 1500.0);
        let transactions = vec![tx("2025-08-13T16:00:00", "C1", "PRD_F_01", 250.0, 3000.0)];
        let report = analyze(&transactions, &master, &config());
        assert_eq!(report.weight_discrepancies.len(), 1);
        assert_eq!(report.weight_discrepancies[0].severity, Severity::High);
        assert!((report.weight_discrepancies[0].weight_difference_pct - 100.0).abs() < 1e-9);
    }

    #[test]
    fn test_barcode_swap_detection() {
        let master = master_with("PRD_S_01", 200.0);
        // Three normal sales at 100 per 200g (0.5/g), one sale where a much
        // heavier item crossed the scale at the same price (0.1/g)
        let transactions = vec![
            tx("2025-08-13T16:00:00", "C1", "PRD_S_01", 100.0, 200.0),
            tx("2025-08-13T16:01:00", "C2", "PRD_S_01", 100.0, 200.0),
            tx("2025-08-13T16:02:00", "C3", "PRD_S_01", 100.0, 200.0),
            tx("2025-08-13T16:03:00", "C4", "PRD_S_01", 100.0, 1000.0),
        ];
        let report = analyze(&transactions, &master, &config());
        assert_eq!(report.barcode_swaps.len(), 1);
        let swap = &report.barcode_swaps[0];
        assert_eq!(swap.customer_id, "C4");
        assert!((swap.price_ratio - 0.2).abs() < 1e-9);
    }

    #[test]
    fn test_barcode_swap_boundary_is_inclusive() {
        let master = master_with("PRD_S_01", 200.0);
        // Exactly half the usual price-per-gram must be flagged
        let transactions = vec![
            tx("2025-08-13T16:00:00", "C1", "PRD_S_01", 100.0, 200.0),
            tx("2025-08-13T16:01:00", "C2", "PRD_S_01", 100.0, 400.0),
        ];
        let report = analyze(&transactions, &master, &config());
        assert_eq!(report.barcode_swaps.len(), 1);
        assert_eq!(report.barcode_swaps[0].customer_id, "C2");
    }

    #[test]
    fn test_frequent_discrepancy_customer() {
        let master = master_with("PRD_F_01", 1000.0);
        // 3 of 4 transactions off by far more than the tolerance
        let transactions = vec![
            tx("2025-08-13T16:00:00", "C1", "PRD_F_01", 50.0, 2000.0),
            tx("2025-08-13T16:01:00", "C1", "PRD_F_01", 50.0, 2000.0),
            tx("2025-08-13T16:02:00", "C1", "PRD_F_01", 50.0, 2000.0),
            tx("2025-08-13T16:03:00", "C1", "PRD_F_01", 50.0, 1000.0),
        ];
        let report = analyze(&transactions, &master, &config());
        assert_eq!(report.frequent_discrepancy_customers.len(), 1);
        let c = &report.frequent_discrepancy_customers[0];
        assert_eq!(c.discrepancy_count, 3);
        assert!((c.discrepancy_rate - 0.75).abs() < 1e-9);
    }

    #[test]
    fn test_three_transactions_is_not_frequent() {
        let master = master_with("PRD_F_01", 1000.0);
        let transactions = vec![
            tx("2025-08-13T16:00:00", "C1", "PRD_F_01", 50.0, 2000.0),
            tx("2025-08-13T16:01:00", "C1", "PRD_F_01", 50.0, 2000.0),
            tx("2025-08-13T16:02:00", "C1", "PRD_F_01", 50.0, 2000.0),
        ];
        let report = analyze(&transactions, &master, &config());
        assert!(report.frequent_discrepancy_customers.is_empty());
    }

    #[test]
    fn test_high_value_discrepancy() {
        let master = master_with("PRD_A_01", 1000.0);
        // Price over 500 with ~30% weight discrepancy
        let transactions = vec![tx("2025-08-13T16:00:00", "C1", "PRD_A_01", 800.0, 1300.0)];
        let report = analyze(&transactions, &master, &config());
        assert_eq!(report.high_value_discrepancies.len(), 1);
        // 30% exceeds the high-value tolerance but not the general 15% + HIGH bar
        assert_eq!(report.weight_discrepancies.len(), 1);
        assert_eq!(report.weight_discrepancies[0].severity, Severity::Medium);
    }

    #[test]
    fn test_rapid_scanning_uses_median_gap() {
        let master = ProductMaster::new();
        // Six items, five gaps of 5s each: median 5 < 10
        let transactions = vec![
            tx("2025-08-13T16:00:00", "C1", "PRD_F_01", 10.0, 400.0),
            tx("2025-08-13T16:00:05", "C1", "PRD_F_01", 10.0, 400.0),
            tx("2025-08-13T16:00:10", "C1", "PRD_F_01", 10.0, 400.0),
            tx("2025-08-13T16:00:15", "C1", "PRD_F_01", 10.0, 400.0),
            tx("2025-08-13T16:00:20", "C1", "PRD_F_01", 10.0, 400.0),
            tx("2025-08-13T16:00:25", "C1", "PRD_F_01", 10.0, 400.0),
        ];
        let report = analyze(&transactions, &master, &config());
        assert_eq!(report.rapid_scanners.len(), 1);
        assert_eq!(report.rapid_scanners[0].total_items, 6);
        assert!((report.rapid_scanners[0].median_seconds_between_items - 5.0).abs() < 1e-9);
    }

    #[test]
    fn test_transaction_summary() {
        let master = master_with("PRD_F_01", 1500.0);
        let transactions = vec![
            tx("2025-08-13T16:00:00", "C1", "PRD_F_01", 250.0, 1500.0),
            tx("2025-08-13T16:01:00", "C2", "PRD_F_01", 250.0, 2000.0),
        ];
        let report = analyze(&transactions, &master, &config());
        assert_eq!(report.summary.total_transactions, 2);
        assert_eq!(report.summary.unique_customers, 2);
        assert_eq!(report.summary.flagged_transactions, 1);
        assert!((report.summary.total_value - 500.0).abs() < 1e-9);
    }

    #[test]
    fn test_slow_scanning_is_not_flagged() {
        let master = ProductMaster::new();
        let transactions: Vec<_> = (0..6)
            .map(|i| {
                tx(
                    &format!("2025-08-13T16:{:02}:00", i),
                    "C1",
                    "PRD_F_01",
                    10.0,
                    400.0,
                )
            })
            .collect();
        let report = analyze(&transactions, &master, &config());
        assert!(report.rapid_scanners.is_empty());
    }
}
