// src/ingest/mod.rs
pub mod orchestrator;
pub mod providers;
pub mod quarantine;
pub mod retry;

pub use orchestrator::IngestionOrchestrator;
pub use providers::{CsvSource, Engine, HttpSource, QuerySource};
pub use retry::RetryPolicy;

use futures::future::ready;
use futures::stream::{self, BoxStream, StreamExt};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use tracing::Span;

use crate::config::ConfigLookup;
use crate::error::IngestionError;
use crate::record::Record;

/// Outcome of pulling one item from a source.
#[derive(Debug)]
pub enum Pull {
    Record(Record),
    /// Recoverable: the item at `position` was dropped, the stream goes on.
    Skip { position: u64, reason: String },
    /// Terminal for the source; nothing follows it.
    Fatal(IngestionError),
}

pub type RecordStream<'a> = BoxStream<'a, Pull>;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SourceStats {
    pub success: u64,
    pub errors: u64,
}

impl SourceStats {
    fn observe(&mut self, pull: &Pull) {
        match pull {
            Pull::Record(_) => self.success += 1,
            Pull::Skip { .. } => self.errors += 1,
            Pull::Fatal(_) => {}
        }
    }
}

impl fmt::Display for SourceStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "success={} errors={}", self.success, self.errors)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    Csv,
    Api,
    Database,
}

impl SourceKind {
    pub fn as_str(self) -> &'static str {
        match self {
            SourceKind::Csv => "csv",
            SourceKind::Api => "api",
            SourceKind::Database => "database",
        }
    }
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single origin of records.
///
/// `ingest` borrows the source mutably for as long as the stream lives, so the
/// stream can bump the counters returned by `stats` as items are pulled.
pub trait RecordSource: Send {
    fn kind(&self) -> SourceKind;

    /// File path, endpoint URL or query text.
    fn origin(&self) -> &str;

    fn ingest(&mut self) -> RecordStream<'_>;

    fn stats(&self) -> SourceStats;
}

/// Wraps a raw stream so it ends right after the first `Fatal` (without
/// polling the inner stream again), counts items into `stats` and logs skips.
pub(crate) fn counted<'a>(
    inner: RecordStream<'a>,
    stats: &'a mut SourceStats,
    span: Span,
) -> RecordStream<'a> {
    stream::unfold(
        (inner, stats, span, false),
        |(mut inner, stats, span, halted)| async move {
            if halted {
                return None;
            }
            let pull = inner.next().await?;
            stats.observe(&pull);
            if let Pull::Skip { position, reason } = &pull {
                tracing::warn!(parent: &span, position, %reason, "skipping record");
            }
            let halted = matches!(pull, Pull::Fatal(_));
            Some((pull, (inner, stats, span, halted)))
        },
    )
    .boxed()
}

/// A stream holding only one terminal error.
pub(crate) fn fatal<'a>(err: IngestionError) -> RecordStream<'a> {
    stream::once(ready(Pull::Fatal(err))).boxed()
}

/// Declarative description of a source, as listed under `pipeline.sources`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum SourceSpec {
    Csv {
        path: PathBuf,
    },
    Api {
        endpoint: String,
        #[serde(default)]
        params: BTreeMap<String, String>,
    },
    Database {
        query: String,
        #[serde(default = "default_engine")]
        engine: String,
    },
}

fn default_engine() -> String {
    "postgresql".to_string()
}

impl SourceSpec {
    /// Builds the matching source; construction-time checks run here.
    pub fn build(&self, config: &dyn ConfigLookup) -> Result<Box<dyn RecordSource>, IngestionError> {
        Ok(match self {
            SourceSpec::Csv { path } => Box::new(CsvSource::new(path, config)?),
            SourceSpec::Api { endpoint, params } => {
                Box::new(HttpSource::new(endpoint, params.clone(), config)?)
            }
            SourceSpec::Database { query, engine } => {
                Box::new(QuerySource::new(query, engine, config)?)
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn drain(s: RecordStream<'_>) -> Vec<Pull> {
        futures::executor::block_on(s.collect())
    }

    #[test]
    fn counted_stops_after_fatal_and_tallies() {
        let mut stats = SourceStats::default();
        let raw = stream::iter(vec![
            Pull::Record(Record::new().with("a", 1i64)),
            Pull::Skip {
                position: 2,
                reason: "bad".into(),
            },
            Pull::Fatal(IngestionError::Query("boom".into())),
            Pull::Record(Record::new().with("a", 2i64)),
        ])
        .boxed();
        let out = drain(counted(raw, &mut stats, Span::none()));
        assert_eq!(out.len(), 3);
        assert!(matches!(out[2], Pull::Fatal(_)));
        assert_eq!(stats, SourceStats { success: 1, errors: 1 });
    }

    #[test]
    fn source_spec_parses_tagged_entries() {
        let specs: Vec<SourceSpec> = serde_json::from_value(json!([
            {"kind": "csv", "path": "data/customers.csv"},
            {"kind": "api", "endpoint": "https://example.test/v1/items"},
            {"kind": "database", "query": "SELECT 1"}
        ]))
        .unwrap();
        assert_eq!(
            specs[2],
            SourceSpec::Database {
                query: "SELECT 1".into(),
                engine: "postgresql".into()
            }
        );
        assert!(matches!(&specs[1], SourceSpec::Api { params, .. } if params.is_empty()));
    }

    #[test]
    fn unsupported_engine_fails_at_build() {
        let spec = SourceSpec::Database {
            query: "SELECT 1".into(),
            engine: "oracle".into(),
        };
        let err = spec.build(&json!({})).err().unwrap();
        assert_eq!(err.to_string(), "Unsupported database type: oracle");
    }
}
