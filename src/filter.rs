use chrono::{DateTime, Datelike, Utc};
use serde::Serialize;
use std::collections::BTreeMap;

use crate::models::{EnrichedRecord, FilterCriteria};

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum Bucket {
    Day,
    Week,
}

fn bucket_key(ts: DateTime<Utc>, bucket: Bucket) -> String {
    match bucket {
        Bucket::Day => ts.format("%Y-%m-%d").to_string(),
        Bucket::Week => {
            let week = ts.iso_week();
            format!("{:04}-W{:02}", week.year(), week.week())
        }
    }
}

/// Aggregate counts over a filtered subset. BTreeMap-backed so serialization
/// order is stable regardless of input order.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct Aggregates {
    pub total: usize,
    pub by_severity: BTreeMap<u8, usize>,
    /// Records whose severity is absent (classification failed or skipped).
    pub unscored: usize,
    pub by_municipality: BTreeMap<String, usize>,
    pub by_category: BTreeMap<String, usize>,
    pub time_series: BTreeMap<String, usize>,
}

/// Subset matching ALL criteria; empty sets in the criteria match everything.
pub fn apply<'a>(records: &'a [EnrichedRecord], criteria: &FilterCriteria) -> Vec<&'a EnrichedRecord> {
    records.iter().filter(|r| criteria.matches(&r.record)).collect()
}

/// Deterministic, order-independent counts. No external calls.
pub fn aggregate(subset: &[&EnrichedRecord], bucket: Bucket) -> Aggregates {
    let mut by_severity: BTreeMap<u8, usize> = BTreeMap::new();
    let mut by_municipality: BTreeMap<String, usize> = BTreeMap::new();
    let mut by_category: BTreeMap<String, usize> = BTreeMap::new();
    let mut time_series: BTreeMap<String, usize> = BTreeMap::new();
    let mut unscored = 0usize;

    for r in subset {
        match r.severity {
            Some(level) => *by_severity.entry(level).or_insert(0) += 1,
            None => unscored += 1,
        }
        *by_municipality.entry(r.record.municipality.clone()).or_insert(0) += 1;
        *by_category.entry(r.record.category.clone()).or_insert(0) += 1;
        *time_series.entry(bucket_key(r.record.submitted_at, bucket)).or_insert(0) += 1;
    }

    Aggregates {
        total: subset.len(),
        by_severity,
        unscored,
        by_municipality,
        by_category,
        time_series,
    }
}
