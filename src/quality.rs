//! Batch-level data quality: null density and duplicate records.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, HashSet};

use crate::config::ConfigLookup;
use crate::metrics::round_to;
use crate::record::{Record, Value};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QualityChecks {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub null_percentage: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duplicate_count: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QualityReport {
    pub total_records: usize,
    pub quality_score: f64,
    pub checks: QualityChecks,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct QualityScorer {
    pub null_check: bool,
    /// Null percentage at which the null penalty is maxed out.
    pub max_null_percentage: f64,
}

impl Default for QualityScorer {
    fn default() -> Self {
        Self {
            null_check: true,
            max_null_percentage: 5.0,
        }
    }
}

impl QualityScorer {
    pub fn from_config(config: &dyn ConfigLookup) -> Self {
        Self {
            null_check: config.get_bool("validation.quality_checks.null_check", true),
            max_null_percentage: config
                .get_f64("validation.thresholds.max_null_percentage", 5.0),
        }
    }

    pub fn check_quality(&self, records: &[Record]) -> QualityReport {
        if records.is_empty() {
            return QualityReport {
                total_records: 0,
                quality_score: 0.0,
                checks: QualityChecks::default(),
            };
        }

        let checks = QualityChecks {
            null_percentage: self.null_check.then(|| null_percentage(records)),
            duplicate_count: Some(duplicate_count(records)),
        };
        let score = score(checks.null_percentage.unwrap_or(0.0), self.max_null_percentage);
        tracing::debug!(
            records = records.len(),
            score,
            duplicates = checks.duplicate_count,
            "quality checked"
        );
        QualityReport {
            total_records: records.len(),
            quality_score: score,
            checks,
        }
    }
}

fn score(null_pct: f64, threshold: f64) -> f64 {
    let penalty = if threshold > 0.0 {
        (null_pct / threshold).min(1.0)
    } else if null_pct > 0.0 {
        1.0
    } else {
        0.0
    };
    round_to((100.0 - penalty * 50.0).max(0.0), 2)
}

/// Share of blank values among all non-metadata field occurrences, in percent.
pub fn null_percentage(records: &[Record]) -> f64 {
    let (total, blank) = records
        .iter()
        .flat_map(Record::data_fields)
        .fold((0u64, 0u64), |(t, b), (_, v)| (t + 1, b + u64::from(v.is_blank())));
    if total == 0 {
        return 0.0;
    }
    round_to(blank as f64 / total as f64 * 100.0, 2)
}

/// Repeats of an already seen fingerprint; first occurrences never count.
pub fn duplicate_count(records: &[Record]) -> u64 {
    let mut seen = HashSet::new();
    records
        .iter()
        .filter(|r| !seen.insert(fingerprint(r)))
        .count() as u64
}

/// Hex SHA-256 over the non-metadata fields sorted by name, each part length-prefixed.
///
/// Integers and floats share one tag so `1` and `1.0` hash alike.
pub fn fingerprint(record: &Record) -> String {
    let sorted: BTreeMap<&str, &Value> = record.data_fields().collect();
    let mut hasher = Sha256::new();
    for (key, value) in sorted {
        let tag = match value {
            Value::Int(_) | Value::Float(_) => "number",
            other => other.kind_name(),
        };
        for part in [key, tag, value.to_string().as_str()] {
            hasher.update((part.len() as u64).to_le_bytes());
            hasher.update(part.as_bytes());
        }
    }
    let digest = hasher.finalize();
    let mut out = String::with_capacity(64);
    for b in digest.iter() {
        use std::fmt::Write as _;
        let _ = write!(&mut out, "{:02x}", b);
    }
    out
}
