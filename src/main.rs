//! Pipeline binary: one run over the sources listed in configuration.
//!
//! Configuration comes from `$PIPELINE_CONFIG_DIR` (default `config/`) and
//! `$PIPELINE_ENV` (default `dev`); see `config/default.toml`.

use anyhow::{Context, Result};
use std::path::PathBuf;
use std::sync::Arc;

use quality_pipeline::config::{ConfigLookup, PipelineConfig};
use quality_pipeline::ingest::quarantine::FileQuarantine;
use quality_pipeline::ingest::{IngestionOrchestrator, SourceSpec};
use quality_pipeline::{logging, metrics, Pipeline, SchemaValidator};

fn source_specs(config: &PipelineConfig) -> Result<Vec<SourceSpec>> {
    match config.lookup("pipeline.sources") {
        Some(raw) => serde_json::from_value(raw.clone()).context("parsing pipeline.sources"),
        None => Ok(Vec::new()),
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let config = PipelineConfig::load_default().context("loading configuration")?;
    let _log_guard = logging::init(&config)?;
    let prometheus = metrics::install_prometheus()?;

    let mut orchestrator = IngestionOrchestrator::new();
    for spec in source_specs(&config)? {
        match spec.build(&config) {
            Ok(source) => orchestrator.add_source(source),
            Err(e) => tracing::error!(error = %e, ?spec, "source left out"),
        }
    }

    let schema_path = config.get_str("pipeline.schema_path", "schemas/customers.toml");
    let validator = SchemaValidator::from_file(&schema_path, &config)
        .with_context(|| format!("loading schema {schema_path}"))?;
    let quarantine_dir = config.get_str("pipeline.quarantine_dir", "data/quarantine");
    let quarantine = Arc::new(FileQuarantine::new(quarantine_dir));

    let mut pipeline = Pipeline::new(orchestrator, validator, quarantine, &config);
    let report = pipeline.run().await;

    let metrics_path = config.get_str("monitoring.metrics_path", "metrics/pipeline_metrics.json");
    pipeline.metrics().export_metrics(&metrics_path)?;
    let health_path = config.get_str(
        "monitoring.health_report_path",
        "metrics/health_report.json",
    );
    report.health.export(&health_path)?;
    if let Some(path) = config.get_opt_str("monitoring.prometheus_path") {
        let path = PathBuf::from(path);
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&path, prometheus.render())
            .with_context(|| format!("writing {}", path.display()))?;
    }

    tracing::info!(
        environment = config.environment(),
        records = report.total_records,
        valid = report.valid_records,
        quarantined = report.quarantined,
        status = ?report.health.status,
        "run complete"
    );
    Ok(())
}
