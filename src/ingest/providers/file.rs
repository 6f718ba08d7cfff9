// src/ingest/providers/file.rs
use futures::stream::{self, StreamExt};
use std::fs::File;
use std::path::{Path, PathBuf};
use tracing::Span;

use crate::config::ConfigLookup;
use crate::error::IngestionError;
use crate::ingest::{counted, fatal, Pull, RecordSource, RecordStream, SourceKind, SourceStats};
use crate::record::{self, Record, Value};

const BYTES_PER_MB: f64 = 1024.0 * 1024.0;

/// Delimited text file with a header row.
pub struct CsvSource {
    path: PathBuf,
    origin: String,
    delimiter: u8,
    stats: SourceStats,
    span: Span,
}

impl CsvSource {
    /// Fails fast when the file is missing, too large, or the dialect is unusable.
    pub fn new(path: impl AsRef<Path>, config: &dyn ConfigLookup) -> Result<Self, IngestionError> {
        let path = path.as_ref().to_path_buf();
        if !path.exists() {
            return Err(IngestionError::FileNotFound(path));
        }

        let size_mb = std::fs::metadata(&path)
            .map_err(|e| IngestionError::Unreadable {
                origin: path.display().to_string(),
                message: e.to_string(),
            })?
            .len() as f64
            / BYTES_PER_MB;
        let max_mb = config.get_f64("ingestion.sources.csv.max_file_size_mb", 100.0);
        if size_mb > max_mb {
            return Err(IngestionError::FileTooLarge { size_mb, max_mb });
        }

        let delimiter = parse_delimiter(&config.get_str("ingestion.sources.csv.delimiter", ","))?;
        let encoding = config.get_str("ingestion.sources.csv.encoding", "utf-8");
        if !matches!(encoding.to_ascii_lowercase().as_str(), "utf-8" | "utf8") {
            return Err(IngestionError::InvalidConfig(format!(
                "unsupported CSV encoding '{encoding}' (only utf-8 is read)"
            )));
        }

        let origin = path.display().to_string();
        let span = tracing::info_span!("source", kind = "csv", origin = %origin);
        Ok(Self {
            path,
            origin,
            delimiter,
            stats: SourceStats::default(),
            span,
        })
    }

    fn open(&self) -> Result<(csv::StringRecord, csv::Reader<File>), IngestionError> {
        let unreadable = |e: csv::Error| IngestionError::Unreadable {
            origin: self.origin.clone(),
            message: e.to_string(),
        };
        let mut reader = csv::ReaderBuilder::new()
            .delimiter(self.delimiter)
            .has_headers(true)
            .from_path(&self.path)
            .map_err(unreadable)?;
        let headers = reader.headers().map_err(unreadable)?.clone();
        Ok((headers, reader))
    }
}

fn parse_delimiter(raw: &str) -> Result<u8, IngestionError> {
    match raw.as_bytes() {
        [b] if b.is_ascii() => Ok(*b),
        _ => Err(IngestionError::InvalidConfig(format!(
            "CSV delimiter must be a single ASCII character, got '{raw}'"
        ))),
    }
}

fn row_to_pull(
    headers: &csv::StringRecord,
    row: Result<csv::StringRecord, csv::Error>,
    row_number: u64,
    origin: &str,
) -> Pull {
    match row {
        Ok(row) => {
            let mut rec: Record = headers
                .iter()
                .zip(row.iter())
                .map(|(k, v)| (k.to_string(), Value::Text(v.to_string())))
                .collect();
            rec.insert(record::SOURCE, "csv");
            rec.insert(record::SOURCE_FILE, origin);
            rec.insert(record::INGESTION_TIMESTAMP, record::now_timestamp());
            rec.insert(record::ROW_NUMBER, row_number as i64);
            Pull::Record(rec)
        }
        Err(e) if matches!(e.kind(), csv::ErrorKind::Io(_)) => {
            Pull::Fatal(IngestionError::Unreadable {
                origin: origin.to_string(),
                message: e.to_string(),
            })
        }
        Err(e) => Pull::Skip {
            position: row_number,
            reason: e.to_string(),
        },
    }
}

impl RecordSource for CsvSource {
    fn kind(&self) -> SourceKind {
        SourceKind::Csv
    }

    fn origin(&self) -> &str {
        &self.origin
    }

    fn ingest(&mut self) -> RecordStream<'_> {
        tracing::info!(parent: &self.span, "starting CSV ingestion");
        let raw = match self.open() {
            Ok((headers, reader)) => {
                let origin = self.origin.clone();
                // Line 1 is the header, so data rows start at 2.
                let rows = reader
                    .into_records()
                    .enumerate()
                    .map(move |(i, row)| row_to_pull(&headers, row, i as u64 + 2, &origin));
                stream::iter(rows).boxed()
            }
            Err(e) => fatal(e),
        };
        counted(raw, &mut self.stats, self.span.clone())
    }

    fn stats(&self) -> SourceStats {
        self.stats
    }
}
