//! End-to-end run: ingest, validate, quarantine, score, check health.

use serde::Serialize;
use std::sync::Arc;

use crate::config::ConfigLookup;
use crate::health::{HealthMonitor, HealthReport, Thresholds};
use crate::ingest::quarantine::QuarantineSink;
use crate::ingest::IngestionOrchestrator;
use crate::metrics::MetricsCollector;
use crate::quality::{QualityReport, QualityScorer};
use crate::validate::SchemaValidator;

#[derive(Debug, Clone, Serialize)]
pub struct PipelineReport {
    pub total_records: usize,
    pub valid_records: usize,
    pub quarantined: usize,
    pub quality: QualityReport,
    pub health: HealthReport,
}

pub struct Pipeline {
    pub orchestrator: IngestionOrchestrator,
    validator: SchemaValidator,
    scorer: QualityScorer,
    metrics: MetricsCollector,
    health: HealthMonitor,
    quarantine: Arc<dyn QuarantineSink>,
}

impl Pipeline {
    pub fn new(
        orchestrator: IngestionOrchestrator,
        validator: SchemaValidator,
        quarantine: Arc<dyn QuarantineSink>,
        config: &dyn ConfigLookup,
    ) -> Self {
        Self {
            orchestrator,
            validator,
            scorer: QualityScorer::from_config(config),
            metrics: MetricsCollector::new(),
            health: HealthMonitor::new(Thresholds::from_config(config)),
            quarantine,
        }
    }

    pub fn metrics(&self) -> &MetricsCollector {
        &self.metrics
    }

    pub fn health(&self) -> &HealthMonitor {
        &self.health
    }

    pub async fn run(&mut self) -> PipelineReport {
        self.metrics.start_pipeline();
        let records = self.orchestrator.run_with_metrics(&mut self.metrics).await;

        let mut valid_records = 0usize;
        let mut quarantined = 0usize;
        for record in &records {
            let outcome = self.validator.validate(record);
            self.metrics.record_validation(outcome.valid, &outcome.errors);
            if outcome.valid {
                valid_records += 1;
                continue;
            }
            let reason = format!("validation_failed: {}", outcome.errors.join("; "));
            match self.quarantine.quarantine(record, &reason).await {
                Ok(_) => quarantined += 1,
                Err(e) => tracing::error!(error = ?e, "quarantine write failed"),
            }
        }

        let quality = self.scorer.check_quality(&records);
        if quality.total_records > 0 {
            self.metrics.record_quality_score(quality.quality_score);
        }

        self.metrics.end_pipeline();
        let health = self.health.check_health(&self.metrics);
        tracing::info!(
            total = records.len(),
            valid = valid_records,
            quarantined,
            score = quality.quality_score,
            status = ?health.status,
            "pipeline finished"
        );

        PipelineReport {
            total_records: records.len(),
            valid_records,
            quarantined,
            quality,
            health,
        }
    }
}
