//! Run metrics: an append-only event log with derived summaries, mirrored to
//! the `metrics` facade so a Prometheus recorder sees the same numbers.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use once_cell::sync::OnceCell;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::time::{Duration, Instant};

/// One-time metrics registration (so series show up on the exposition).
pub(crate) fn ensure_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!(
            "pipeline_ingestion_events_total",
            "Items pulled from sources, by outcome."
        );
        describe_histogram!(
            "pipeline_ingestion_duration_seconds",
            "Time spent producing one item."
        );
        describe_counter!(
            "pipeline_validations_total",
            "Records validated, by verdict."
        );
        describe_gauge!("pipeline_quality_score", "Most recent batch quality score.");
        describe_counter!(
            "pipeline_source_failures_total",
            "Sources that ended with a terminal error."
        );
        describe_counter!("pipeline_alerts_total", "High-severity health alerts raised.");
    });
}

/// Installs the global Prometheus recorder and returns a handle for rendering.
pub fn install_prometheus() -> Result<PrometheusHandle> {
    let handle = PrometheusBuilder::new()
        .install_recorder()
        .context("prometheus: install recorder")?;
    ensure_described();
    Ok(handle)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MetricEvent {
    PipelineStart {
        timestamp: DateTime<Utc>,
    },
    PipelineEnd {
        timestamp: DateTime<Utc>,
        duration_seconds: f64,
    },
    Ingestion {
        timestamp: DateTime<Utc>,
        source: String,
        success: bool,
        duration_seconds: f64,
    },
    Validation {
        timestamp: DateTime<Utc>,
        valid: bool,
        error_count: usize,
    },
    QualityScore {
        timestamp: DateTime<Utc>,
        score: f64,
    },
}

/// Running totals for one source.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SourceMetrics {
    pub success_count: u64,
    pub failure_count: u64,
    /// Seconds.
    pub total_duration: f64,
    pub record_count: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineSummary {
    pub total_duration_seconds: f64,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordsSummary {
    pub total_processed: u64,
    pub total_failed: u64,
    pub success_rate_percent: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IngestionSummary {
    pub total_ingestions: usize,
    pub average_duration_seconds: f64,
    pub source_breakdown: BTreeMap<String, SourceMetrics>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationSummary {
    pub total_validations: usize,
    pub valid_count: usize,
    pub validation_rate_percent: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QualitySummary {
    pub average_score: f64,
    pub total_scores_recorded: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricsSummary {
    pub pipeline: PipelineSummary,
    pub records: RecordsSummary,
    pub ingestion: IngestionSummary,
    pub validation: ValidationSummary,
    pub quality: QualitySummary,
}

#[derive(Serialize)]
struct MetricsExport<'a> {
    #[serde(flatten)]
    summary: MetricsSummary,
    raw_metrics: &'a [MetricEvent],
}

pub(crate) fn round_to(x: f64, places: i32) -> f64 {
    let f = 10f64.powi(places);
    (x * f).round() / f
}

fn percent(part: u64, whole: u64) -> f64 {
    if whole == 0 {
        0.0
    } else {
        part as f64 / whole as f64 * 100.0
    }
}

fn mean(values: impl Iterator<Item = f64>) -> f64 {
    let (sum, n) = values.fold((0.0, 0u64), |(s, n), v| (s + v, n + 1));
    if n == 0 {
        0.0
    } else {
        sum / n as f64
    }
}

#[derive(Debug, Default)]
pub struct MetricsCollector {
    events: Vec<MetricEvent>,
    started: Option<(Instant, DateTime<Utc>)>,
    ended: Option<(Instant, DateTime<Utc>)>,
    records_processed: u64,
    records_failed: u64,
    sources: BTreeMap<String, SourceMetrics>,
}

impl MetricsCollector {
    pub fn new() -> Self {
        ensure_described();
        Self::default()
    }

    pub fn start_pipeline(&mut self) {
        let now = Utc::now();
        self.started = Some((Instant::now(), now));
        self.ended = None;
        self.events.push(MetricEvent::PipelineStart { timestamp: now });
    }

    pub fn end_pipeline(&mut self) {
        let now = Utc::now();
        let at = Instant::now();
        self.ended = Some((at, now));
        self.events.push(MetricEvent::PipelineEnd {
            timestamp: now,
            duration_seconds: self.run_duration().as_secs_f64(),
        });
    }

    fn run_duration(&self) -> Duration {
        match (self.started, self.ended) {
            (Some((s, _)), Some((e, _))) => e.saturating_duration_since(s),
            _ => Duration::ZERO,
        }
    }

    pub fn record_ingestion(&mut self, source: &str, success: bool, duration: Duration) {
        let secs = duration.as_secs_f64();
        if success {
            self.records_processed += 1;
        } else {
            self.records_failed += 1;
        }
        self.events.push(MetricEvent::Ingestion {
            timestamp: Utc::now(),
            source: source.to_string(),
            success,
            duration_seconds: secs,
        });

        let entry = self.sources.entry(source.to_string()).or_default();
        if success {
            entry.success_count += 1;
        } else {
            entry.failure_count += 1;
        }
        entry.total_duration += secs;
        entry.record_count += 1;

        let outcome = if success { "success" } else { "failure" };
        counter!("pipeline_ingestion_events_total", "outcome" => outcome).increment(1);
        histogram!("pipeline_ingestion_duration_seconds").record(secs);
    }

    pub fn record_validation(&mut self, valid: bool, errors: &[String]) {
        self.events.push(MetricEvent::Validation {
            timestamp: Utc::now(),
            valid,
            error_count: errors.len(),
        });
        let verdict = if valid { "valid" } else { "invalid" };
        counter!("pipeline_validations_total", "verdict" => verdict).increment(1);
    }

    pub fn record_quality_score(&mut self, score: f64) {
        self.events.push(MetricEvent::QualityScore {
            timestamp: Utc::now(),
            score,
        });
        gauge!("pipeline_quality_score").set(score);
    }

    pub fn events(&self) -> &[MetricEvent] {
        &self.events
    }

    pub fn source_metrics(&self, source: &str) -> Option<&SourceMetrics> {
        self.sources.get(source)
    }

    /// Derived on every call; nothing here is cached.
    pub fn get_summary(&self) -> MetricsSummary {
        let ingestions = self.events.iter().filter_map(|e| match e {
            MetricEvent::Ingestion {
                duration_seconds, ..
            } => Some(*duration_seconds),
            _ => None,
        });
        let total_ingestions = ingestions.clone().count();
        let average_duration = mean(ingestions);

        let validations: Vec<bool> = self
            .events
            .iter()
            .filter_map(|e| match e {
                MetricEvent::Validation { valid, .. } => Some(*valid),
                _ => None,
            })
            .collect();
        let valid_count = validations.iter().filter(|v| **v).count();

        let scores = self.events.iter().filter_map(|e| match e {
            MetricEvent::QualityScore { score, .. } => Some(*score),
            _ => None,
        });
        let total_scores_recorded = scores.clone().count();
        let average_score = mean(scores);

        MetricsSummary {
            pipeline: PipelineSummary {
                total_duration_seconds: round_to(self.run_duration().as_secs_f64(), 2),
                start_time: self.started.map(|(_, t)| t),
                end_time: self.ended.map(|(_, t)| t),
            },
            records: RecordsSummary {
                total_processed: self.records_processed,
                total_failed: self.records_failed,
                success_rate_percent: round_to(
                    percent(
                        self.records_processed,
                        self.records_processed + self.records_failed,
                    ),
                    2,
                ),
            },
            ingestion: IngestionSummary {
                total_ingestions,
                average_duration_seconds: round_to(average_duration, 4),
                source_breakdown: self.sources.clone(),
            },
            validation: ValidationSummary {
                total_validations: validations.len(),
                valid_count,
                validation_rate_percent: round_to(
                    percent(valid_count as u64, validations.len() as u64),
                    2,
                ),
            },
            quality: QualitySummary {
                average_score: round_to(average_score, 2),
                total_scores_recorded,
            },
        }
    }

    /// Writes the summary plus the raw event log as pretty JSON.
    pub fn export_metrics(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("creating {}", parent.display()))?;
        }
        let doc = MetricsExport {
            summary: self.get_summary(),
            raw_metrics: &self.events,
        };
        let body = serde_json::to_string_pretty(&doc).context("serializing metrics")?;
        std::fs::write(path, body).with_context(|| format!("writing {}", path.display()))?;
        tracing::info!(path = %path.display(), "metrics exported");
        Ok(())
    }
}
