// src/ingest/providers/mod.rs
pub mod file;
pub mod http;
pub mod query;

pub use file::CsvSource;
pub use http::HttpSource;
pub use query::{ConnectionSettings, Engine, QuerySource};
