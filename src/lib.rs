// Public library surface for the binary and integration tests.

pub mod config;
pub mod error;
pub mod health;
pub mod ingest;
pub mod logging;
pub mod metrics;
pub mod pipeline;
pub mod quality;
pub mod record;
pub mod validate;

// ---- Re-exports for stable public API ----
pub use crate::config::{ConfigLookup, PipelineConfig};
pub use crate::error::{ConfigurationError, IngestionError, ValidationError};
pub use crate::health::{HealthMonitor, HealthReport, HealthStatus};
pub use crate::ingest::{IngestionOrchestrator, Pull, RecordSource, SourceSpec};
pub use crate::metrics::MetricsCollector;
pub use crate::pipeline::{Pipeline, PipelineReport};
pub use crate::quality::{QualityReport, QualityScorer};
pub use crate::record::{Record, Value};
pub use crate::validate::{SchemaValidator, ValidationOutcome};
