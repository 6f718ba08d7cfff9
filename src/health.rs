//! Health classification of a run from the collector's summary.

use chrono::{DateTime, Utc};
use metrics::counter;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use tracing::Span;

use crate::config::ConfigLookup;
use crate::metrics::{MetricsCollector, MetricsSummary};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Degraded,
    Unhealthy,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Medium,
    High,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthIssue {
    pub severity: Severity,
    pub metric: String,
    pub value: f64,
    pub threshold: f64,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alert {
    pub timestamp: DateTime<Utc>,
    pub severity: Severity,
    pub metric: String,
    pub message: String,
    pub value: f64,
    pub threshold: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthReport {
    pub status: HealthStatus,
    pub timestamp: DateTime<Utc>,
    pub issues: Vec<HealthIssue>,
    pub summary: MetricsSummary,
}

impl HealthReport {
    /// Writes the report as pretty JSON, creating parent directories.
    pub fn export(&self, path: impl AsRef<std::path::Path>) -> anyhow::Result<()> {
        use anyhow::Context;
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("creating {}", parent.display()))?;
        }
        let body = serde_json::to_string_pretty(self).context("serializing health report")?;
        std::fs::write(path, body).with_context(|| format!("writing {}", path.display()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThresholdMetric {
    MinSuccessRate,
    MaxAvgDuration,
    MinQualityScore,
}

impl FromStr for ThresholdMetric {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "min_success_rate" => Ok(Self::MinSuccessRate),
            "max_avg_duration" => Ok(Self::MaxAvgDuration),
            "min_quality_score" => Ok(Self::MinQualityScore),
            other => Err(format!("unknown threshold metric: {other}")),
        }
    }
}

impl fmt::Display for ThresholdMetric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::MinSuccessRate => "min_success_rate",
            Self::MaxAvgDuration => "max_avg_duration",
            Self::MinQualityScore => "min_quality_score",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Thresholds {
    /// Percent.
    pub min_success_rate: f64,
    /// Seconds per ingested item.
    pub max_avg_duration: f64,
    pub min_quality_score: f64,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            min_success_rate: 95.0,
            max_avg_duration: 60.0,
            min_quality_score: 80.0,
        }
    }
}

impl Thresholds {
    pub fn from_config(config: &dyn ConfigLookup) -> Self {
        let d = Self::default();
        Self {
            min_success_rate: config
                .get_f64("monitoring.thresholds.min_success_rate", d.min_success_rate),
            max_avg_duration: config
                .get_f64("monitoring.thresholds.max_avg_duration", d.max_avg_duration),
            min_quality_score: config
                .get_f64("monitoring.thresholds.min_quality_score", d.min_quality_score),
        }
    }
}

pub struct HealthMonitor {
    thresholds: Thresholds,
    alerts: Vec<Alert>,
    span: Span,
}

impl Default for HealthMonitor {
    fn default() -> Self {
        Self::new(Thresholds::default())
    }
}

impl HealthMonitor {
    pub fn new(thresholds: Thresholds) -> Self {
        Self {
            thresholds,
            alerts: Vec::new(),
            span: tracing::info_span!("health"),
        }
    }

    pub fn thresholds(&self) -> Thresholds {
        self.thresholds
    }

    pub fn set_threshold(&mut self, metric: ThresholdMetric, value: f64) {
        match metric {
            ThresholdMetric::MinSuccessRate => self.thresholds.min_success_rate = value,
            ThresholdMetric::MaxAvgDuration => self.thresholds.max_avg_duration = value,
            ThresholdMetric::MinQualityScore => self.thresholds.min_quality_score = value,
        }
        tracing::info!(parent: &self.span, %metric, value, "threshold set");
    }

    pub fn alerts(&self) -> &[Alert] {
        &self.alerts
    }

    pub fn check_health(&mut self, collector: &MetricsCollector) -> HealthReport {
        let summary = collector.get_summary();
        let t = self.thresholds;
        let mut issues = Vec::new();

        let success_rate = summary.records.success_rate_percent;
        if success_rate < t.min_success_rate {
            issues.push(HealthIssue {
                severity: Severity::High,
                metric: "success_rate".into(),
                value: success_rate,
                threshold: t.min_success_rate,
                message: format!(
                    "Success rate {success_rate}% below threshold {}%",
                    t.min_success_rate
                ),
            });
        }

        let avg_duration = summary.ingestion.average_duration_seconds;
        if avg_duration > t.max_avg_duration {
            issues.push(HealthIssue {
                severity: Severity::Medium,
                metric: "avg_duration".into(),
                value: avg_duration,
                threshold: t.max_avg_duration,
                message: format!(
                    "Average duration {avg_duration}s exceeds threshold {}s",
                    t.max_avg_duration
                ),
            });
        }

        let quality = summary.quality.average_score;
        if summary.quality.total_scores_recorded > 0 && quality < t.min_quality_score {
            issues.push(HealthIssue {
                severity: Severity::High,
                metric: "quality_score".into(),
                value: quality,
                threshold: t.min_quality_score,
                message: format!(
                    "Quality score {quality} below threshold {}",
                    t.min_quality_score
                ),
            });
        }

        let status = if issues.is_empty() {
            HealthStatus::Healthy
        } else if issues.iter().all(|i| i.severity == Severity::Medium) {
            HealthStatus::Degraded
        } else {
            HealthStatus::Unhealthy
        };

        for issue in issues.iter().filter(|i| i.severity == Severity::High) {
            self.raise(issue);
        }

        HealthReport {
            status,
            timestamp: Utc::now(),
            issues,
            summary,
        }
    }

    fn raise(&mut self, issue: &HealthIssue) {
        tracing::warn!(parent: &self.span, metric = %issue.metric, "ALERT: {}", issue.message);
        counter!("pipeline_alerts_total", "metric" => issue.metric.clone()).increment(1);
        self.alerts.push(Alert {
            timestamp: Utc::now(),
            severity: issue.severity,
            metric: issue.metric.clone(),
            message: issue.message.clone(),
            value: issue.value,
            threshold: issue.threshold,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn threshold_names_parse() {
        assert_eq!(
            "max_avg_duration".parse::<ThresholdMetric>().unwrap(),
            ThresholdMetric::MaxAvgDuration
        );
        assert!("p99_latency".parse::<ThresholdMetric>().is_err());
    }

    #[test]
    fn thresholds_from_config_fall_back_to_defaults() {
        let t = Thresholds::from_config(&json!({
            "monitoring": {"thresholds": {"min_success_rate": 90}}
        }));
        assert_eq!(t.min_success_rate, 90.0);
        assert_eq!(t.max_avg_duration, 60.0);
        assert_eq!(t.min_quality_score, 80.0);
    }

    #[test]
    fn status_serializes_lowercase() {
        assert_eq!(
            serde_json::to_value(HealthStatus::Unhealthy).unwrap(),
            json!("unhealthy")
        );
    }
}
