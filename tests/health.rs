// tests/health.rs
use quality_pipeline::health::{Severity, ThresholdMetric, Thresholds};
use quality_pipeline::{HealthMonitor, HealthStatus, MetricsCollector};
use serde_json::json;
use std::time::Duration;

fn collector(successes: u32, failures: u32, secs_each: u64) -> MetricsCollector {
    let mut m = MetricsCollector::new();
    for _ in 0..successes {
        m.record_ingestion("src", true, Duration::from_secs(secs_each));
    }
    for _ in 0..failures {
        m.record_ingestion("src", false, Duration::from_secs(secs_each));
    }
    m
}

#[test]
fn clean_run_is_healthy() {
    let mut m = collector(100, 0, 1);
    m.record_quality_score(99.0);
    let mut monitor = HealthMonitor::default();
    let report = monitor.check_health(&m);
    assert_eq!(report.status, HealthStatus::Healthy);
    assert!(report.issues.is_empty());
    assert!(monitor.alerts().is_empty());
}

#[test]
fn slow_ingestion_only_degrades() {
    let m = collector(10, 0, 90);
    let mut monitor = HealthMonitor::default();
    let report = monitor.check_health(&m);
    assert_eq!(report.status, HealthStatus::Degraded);
    assert_eq!(report.issues.len(), 1);
    assert_eq!(report.issues[0].metric, "avg_duration");
    assert_eq!(report.issues[0].severity, Severity::Medium);
    assert!(monitor.alerts().is_empty());
}

#[test]
fn low_success_rate_and_quality_are_unhealthy() {
    let mut m = collector(8, 2, 1);
    m.record_quality_score(60.0);
    let mut monitor = HealthMonitor::default();
    let report = monitor.check_health(&m);

    assert_eq!(report.status, HealthStatus::Unhealthy);
    let metrics: Vec<&str> = report.issues.iter().map(|i| i.metric.as_str()).collect();
    assert_eq!(metrics, vec!["success_rate", "quality_score"]);
    assert_eq!(report.issues[0].message, "Success rate 80% below threshold 95%");
    assert_eq!(monitor.alerts().len(), 2);
}

#[test]
fn alerts_accumulate_across_checks() {
    let m = collector(1, 1, 1);
    let mut monitor = HealthMonitor::default();
    monitor.check_health(&m);
    monitor.check_health(&m);
    assert_eq!(monitor.alerts().len(), 2);
}

#[test]
fn quality_is_not_judged_without_scores() {
    let m = collector(5, 0, 1);
    let report = HealthMonitor::default().check_health(&m);
    assert_eq!(report.status, HealthStatus::Healthy);
}

#[test]
fn thresholds_can_be_tuned() {
    let m = collector(8, 2, 1);
    let mut monitor = HealthMonitor::new(Thresholds::from_config(&json!({
        "monitoring": {"thresholds": {"min_success_rate": 75}}
    })));
    assert_eq!(monitor.check_health(&m).status, HealthStatus::Healthy);

    monitor.set_threshold("min_success_rate".parse::<ThresholdMetric>().unwrap(), 90.0);
    assert_eq!(monitor.thresholds().min_success_rate, 90.0);
    assert_eq!(monitor.check_health(&m).status, HealthStatus::Unhealthy);
}

#[test]
fn report_exports_as_json() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("nested/health.json");
    let report = HealthMonitor::default().check_health(&collector(1, 0, 1));
    report.export(&path).unwrap();

    let doc: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
    assert_eq!(doc["status"], "healthy");
    assert!(doc["summary"]["records"]["total_processed"].is_u64());
}
