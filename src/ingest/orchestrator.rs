// src/ingest/orchestrator.rs
use futures::StreamExt;
use metrics::counter;
use std::time::Instant;
use tracing::Span;

use super::{Pull, RecordSource};
use crate::metrics::{ensure_described, MetricsCollector};
use crate::record::Record;

/// Drains sources one after another and isolates their failures.
pub struct IngestionOrchestrator {
    sources: Vec<Box<dyn RecordSource>>,
    span: Span,
}

impl Default for IngestionOrchestrator {
    fn default() -> Self {
        Self::new()
    }
}

impl IngestionOrchestrator {
    pub fn new() -> Self {
        Self {
            sources: Vec::new(),
            span: tracing::info_span!("ingestion"),
        }
    }

    /// Appends to the worklist; the same origin may be added twice.
    pub fn add_source(&mut self, source: Box<dyn RecordSource>) {
        self.sources.push(source);
    }

    pub fn sources(&self) -> &[Box<dyn RecordSource>] {
        &self.sources
    }

    pub fn len(&self) -> usize {
        self.sources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }

    /// Records of every source that did not fail, in insertion order.
    pub async fn run(&mut self) -> Vec<Record> {
        self.drain(None).await
    }

    /// Like [`run`](Self::run), also recording one ingestion event per pulled item.
    pub async fn run_with_metrics(&mut self, metrics: &mut MetricsCollector) -> Vec<Record> {
        self.drain(Some(metrics)).await
    }

    async fn drain(&mut self, mut metrics: Option<&mut MetricsCollector>) -> Vec<Record> {
        ensure_described();
        let span = &self.span;
        let total = self.sources.len();
        tracing::info!(parent: span, sources = total, "starting ingestion");

        let mut all = Vec::new();
        for (idx, source) in self.sources.iter_mut().enumerate() {
            let origin = source.origin().to_string();
            let kind = source.kind();
            tracing::info!(
                parent: span,
                source = idx + 1,
                of = total,
                %kind,
                origin = %origin,
                "processing source"
            );

            let mut batch = Vec::new();
            let mut failure = None;
            {
                let mut stream = source.ingest();
                loop {
                    let started = Instant::now();
                    let Some(pull) = stream.next().await else {
                        break;
                    };
                    let elapsed = started.elapsed();
                    let success = matches!(pull, Pull::Record(_));
                    if let Some(m) = metrics.as_deref_mut() {
                        m.record_ingestion(&origin, success, elapsed);
                    }
                    match pull {
                        Pull::Record(r) => batch.push(r),
                        Pull::Skip { .. } => {}
                        Pull::Fatal(e) => failure = Some(e),
                    }
                }
            }

            let stats = source.stats();
            match failure {
                None => {
                    tracing::info!(parent: span, source = idx + 1, %stats, "source complete");
                    all.append(&mut batch);
                }
                Some(e) => {
                    tracing::error!(
                        parent: span,
                        source = idx + 1,
                        %kind,
                        error = %e,
                        discarded = batch.len(),
                        "source failed"
                    );
                    counter!("pipeline_source_failures_total", "kind" => kind.as_str())
                        .increment(1);
                }
            }
        }

        tracing::info!(parent: span, records = all.len(), "ingestion complete");
        all
    }
}
