// tests/metrics_prometheus.rs
use quality_pipeline::metrics::install_prometheus;
use quality_pipeline::MetricsCollector;
use std::time::Duration;

#[test]
fn collector_feeds_the_prometheus_recorder() {
    let handle = install_prometheus().unwrap();

    let mut m = MetricsCollector::new();
    m.record_ingestion("api", true, Duration::from_millis(5));
    m.record_validation(true, &[]);
    m.record_quality_score(88.0);

    let text = handle.render();
    assert!(text.contains("pipeline_ingestion_events_total"), "{text}");
    assert!(text.contains("outcome=\"success\""), "{text}");
    assert!(text.contains("pipeline_validations_total"), "{text}");
    assert!(text.contains("pipeline_quality_score"), "{text}");
}
