//! Error taxonomy for the pipeline.
//!
//! - [`ConfigurationError`]: load-time, fatal, never retried.
//! - [`IngestionError`]: scoped to one source; recovered by the orchestrator.
//! - [`ValidationError`]: a malformed schema definition. A record that merely fails
//!   its checks is not an error; it yields a normal `ValidationOutcome`.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigurationError {
    #[error("default configuration file not found: {0}")]
    MissingFile(PathBuf),

    #[error("failed to read configuration {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse configuration {path}: {message}")]
    Parse { path: PathBuf, message: String },

    #[error("missing required configuration keys: {0}")]
    MissingKeys(String),
}

#[derive(Debug, Error)]
pub enum IngestionError {
    #[error("CSV file not found: {0}")]
    FileNotFound(PathBuf),

    #[error("CSV file too large: {size_mb:.2}MB > {max_mb}MB")]
    FileTooLarge { size_mb: f64, max_mb: f64 },

    #[error("Unsupported database type: {0}")]
    UnsupportedEngine(String),

    #[error("invalid source configuration: {0}")]
    InvalidConfig(String),

    #[error("failed to read {origin}: {message}")]
    Unreadable { origin: String, message: String },

    #[error("API request to {endpoint} failed after {attempts} attempts: {message}")]
    RetriesExhausted {
        endpoint: String,
        attempts: u32,
        message: String,
    },

    #[error("unexpected response from {endpoint}: {message}")]
    MalformedResponse { endpoint: String, message: String },

    #[error("database connection failed: {0}")]
    Connection(String),

    #[error("database query failed: {0}")]
    Query(String),
}

#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("Schema must contain 'fields' definition")]
    MissingFields,

    #[error("Field '{0}' definition must be a table")]
    NotATable(String),

    #[error("Field '{0}' missing 'type' definition")]
    MissingType(String),

    #[error("Field '{field}' has unsupported type: {tag}")]
    UnsupportedType { field: String, tag: String },

    #[error("Field '{field}' has invalid '{option}' option: {message}")]
    InvalidOption {
        field: String,
        option: &'static str,
        message: String,
    },

    #[error("Field '{field}' has invalid pattern: {message}")]
    InvalidPattern { field: String, message: String },

    #[error("Schema file not found: {0}")]
    SchemaFileNotFound(PathBuf),

    #[error("failed to parse schema {path}: {message}")]
    SchemaParse { path: PathBuf, message: String },
}
