// tests/metrics_export.rs
use quality_pipeline::MetricsCollector;
use std::time::Duration;

#[test]
fn export_writes_summary_sections_and_raw_events() {
    let mut m = MetricsCollector::new();
    m.start_pipeline();
    m.record_ingestion("data/customers.csv", true, Duration::from_millis(2));
    m.record_ingestion("data/customers.csv", false, Duration::from_millis(1));
    m.record_validation(false, &["Missing required fields: email".to_string()]);
    m.record_quality_score(92.5);
    m.end_pipeline();

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("out/run/metrics.json");
    m.export_metrics(&path).unwrap();

    let doc: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
    for section in ["pipeline", "records", "ingestion", "validation", "quality", "raw_metrics"] {
        assert!(doc.get(section).is_some(), "missing {section}");
    }
    assert_eq!(doc["records"]["total_processed"], 1);
    assert_eq!(doc["records"]["success_rate_percent"], 50.0);
    assert_eq!(
        doc["ingestion"]["source_breakdown"]["data/customers.csv"]["record_count"],
        2
    );
    assert_eq!(doc["quality"]["average_score"], 92.5);
    assert!(doc["pipeline"]["start_time"].is_string());

    let kinds: Vec<&str> = doc["raw_metrics"]
        .as_array()
        .unwrap()
        .iter()
        .map(|e| e["kind"].as_str().unwrap())
        .collect();
    assert_eq!(
        kinds,
        vec![
            "pipeline_start",
            "ingestion",
            "ingestion",
            "validation",
            "quality_score",
            "pipeline_end"
        ]
    );
}

#[test]
fn end_without_start_has_no_duration() {
    let mut m = MetricsCollector::new();
    m.end_pipeline();
    assert_eq!(m.get_summary().pipeline.total_duration_seconds, 0.0);
}
