// src/ingest/quarantine.rs
use anyhow::{Context, Result};
use chrono::Utc;
use serde::Serialize;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use crate::record::{self, Record, Value};

/// Write-only sink for records that failed downstream processing.
#[async_trait::async_trait]
pub trait QuarantineSink: Send + Sync {
    /// Stores one record with its reason; returns the document name.
    async fn quarantine(&self, record: &Record, reason: &str) -> Result<String>;
}

#[derive(Debug, Serialize)]
struct QuarantineDoc<'a> {
    timestamp: String,
    reason: &'a str,
    record: &'a Record,
}

fn origin_label(record: &Record) -> String {
    match record.get(record::SOURCE) {
        Some(Value::Text(s)) if !s.is_empty() => s.clone(),
        _ => "unknown".to_string(),
    }
}

/// One pretty JSON file per call: `{source}_{YYYYmmdd_HHMMSS}_{seq}.json`.
pub struct FileQuarantine {
    dir: PathBuf,
    seq: AtomicU64,
}

impl FileQuarantine {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            seq: AtomicU64::new(0),
        }
    }

    pub fn dir(&self) -> &std::path::Path {
        &self.dir
    }
}

#[async_trait::async_trait]
impl QuarantineSink for FileQuarantine {
    async fn quarantine(&self, record: &Record, reason: &str) -> Result<String> {
        let now = Utc::now();
        let seq = self.seq.fetch_add(1, Ordering::Relaxed);
        let name = format!(
            "{}_{}_{seq}.json",
            origin_label(record),
            now.format("%Y%m%d_%H%M%S")
        );
        let doc = QuarantineDoc {
            timestamp: now.to_rfc3339(),
            reason,
            record,
        };
        let body = serde_json::to_string_pretty(&doc).context("serializing quarantined record")?;

        tokio::fs::create_dir_all(&self.dir)
            .await
            .with_context(|| format!("creating quarantine dir {}", self.dir.display()))?;
        let path = self.dir.join(&name);
        tokio::fs::write(&path, body)
            .await
            .with_context(|| format!("writing {}", path.display()))?;
        tracing::warn!(file = %name, %reason, "record quarantined");
        Ok(name)
    }
}

/// Keeps quarantined documents in memory (dry runs, tests).
#[derive(Default)]
pub struct MemoryQuarantine {
    pub docs: Mutex<Vec<(String, serde_json::Value)>>,
}

impl MemoryQuarantine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.docs.lock().map(|d| d.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait::async_trait]
impl QuarantineSink for MemoryQuarantine {
    async fn quarantine(&self, record: &Record, reason: &str) -> Result<String> {
        let doc = serde_json::to_value(QuarantineDoc {
            timestamp: Utc::now().to_rfc3339(),
            reason,
            record,
        })?;
        let mut docs = self
            .docs
            .lock()
            .map_err(|_| anyhow::anyhow!("quarantine store poisoned"))?;
        let name = format!("{}_{}.json", origin_label(record), docs.len());
        docs.push((name.clone(), doc));
        Ok(name)
    }
}
