// src/ingest/providers/query.rs
use futures::future::ready;
use futures::stream::{self, BoxStream, StreamExt};
use sqlx::mysql::{MySql, MySqlPool, MySqlPoolOptions, MySqlRow};
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow, Postgres};
use sqlx::types::chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use sqlx::types::{BigDecimal, JsonValue, Uuid};
use sqlx::{Column, Row, TypeInfo, ValueRef};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;
use tracing::Span;

use crate::config::ConfigLookup;
use crate::error::IngestionError;
use crate::ingest::{counted, fatal, Pull, RecordSource, RecordStream, SourceKind, SourceStats};
use crate::record::{self, Record, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Engine {
    Postgres,
    MySql,
}

impl Engine {
    /// Tag stamped into `_source_db_type`.
    pub fn as_str(self) -> &'static str {
        match self {
            Engine::Postgres => "postgresql",
            Engine::MySql => "mysql",
        }
    }

    fn scheme(self) -> &'static str {
        match self {
            Engine::Postgres => "postgres",
            Engine::MySql => "mysql",
        }
    }

    pub fn default_port(self) -> u16 {
        match self {
            Engine::Postgres => 5432,
            Engine::MySql => 3306,
        }
    }
}

impl FromStr for Engine {
    type Err = IngestionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "postgresql" => Ok(Engine::Postgres),
            "mysql" => Ok(Engine::MySql),
            _ => Err(IngestionError::UnsupportedEngine(s.to_string())),
        }
    }
}

impl fmt::Display for Engine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where and how to connect, read from `database.*`.
#[derive(Clone, PartialEq)]
pub struct ConnectionSettings {
    pub host: String,
    pub port: u16,
    pub database: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
    pub connect_timeout: Duration,
}

impl fmt::Debug for ConnectionSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionSettings")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("database", &self.database)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "***"))
            .field("connect_timeout", &self.connect_timeout)
            .finish()
    }
}

impl ConnectionSettings {
    pub fn from_config(config: &dyn ConfigLookup, engine: Engine) -> Result<Self, IngestionError> {
        const TIMEOUT: &str = "ingestion.sources.database.connection_timeout";
        let port = config.get_u64("database.port", u64::from(engine.default_port()));
        let timeout = config
            .get_seconds(TIMEOUT, 10.0)
            .ok_or_else(|| IngestionError::InvalidConfig(format!("{TIMEOUT} is out of range")))?;
        Ok(Self {
            host: config.get_str("database.host", "localhost"),
            port: u16::try_from(port).unwrap_or(engine.default_port()),
            database: config.get_opt_str("database.database"),
            username: config.get_opt_str("database.username"),
            password: config.get_opt_str("database.password"),
            connect_timeout: timeout,
        })
    }

    pub fn url(&self, engine: Engine) -> Result<String, IngestionError> {
        let invalid = |what: &str| IngestionError::InvalidConfig(format!("database {what}"));
        let mut url = reqwest::Url::parse(&format!("{}://{}", engine.scheme(), self.host))
            .map_err(|e| invalid(&format!("host '{}': {e}", self.host)))?;
        url.set_port(Some(self.port)).map_err(|_| invalid("port"))?;
        if let Some(user) = self.username.as_deref().filter(|u| !u.is_empty()) {
            url.set_username(user).map_err(|_| invalid("username"))?;
            url.set_password(self.password.as_deref())
                .map_err(|_| invalid("password"))?;
        }
        if let Some(db) = self.database.as_deref() {
            url.set_path(db);
        }
        Ok(url.to_string())
    }
}

/// How a column's values become record values, keyed by the driver's type name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ColumnClass {
    Bool,
    Int16,
    Int32,
    Int64,
    Unsigned,
    Float32,
    Float64,
    Text,
    Date,
    Time,
    Timestamp,
    TimestampTz,
    Decimal,
    Uuid,
    Json,
    Unsupported,
}

impl ColumnClass {
    fn postgres(type_name: &str) -> Self {
        match type_name {
            "BOOL" => Self::Bool,
            "INT2" => Self::Int16,
            "INT4" => Self::Int32,
            "INT8" => Self::Int64,
            "FLOAT4" => Self::Float32,
            "FLOAT8" => Self::Float64,
            "TEXT" | "VARCHAR" | "CHAR" | "NAME" | "UNKNOWN" | "citext" => Self::Text,
            "DATE" => Self::Date,
            "TIME" => Self::Time,
            "TIMESTAMP" => Self::Timestamp,
            "TIMESTAMPTZ" => Self::TimestampTz,
            "NUMERIC" => Self::Decimal,
            "UUID" => Self::Uuid,
            "JSON" | "JSONB" => Self::Json,
            _ => Self::Unsupported,
        }
    }

    /// MySQL reports a `TIMESTAMP` in UTC and a `DATETIME` without a zone.
    fn mysql(type_name: &str) -> Self {
        match type_name {
            "BOOLEAN" => Self::Bool,
            "TINYINT" | "SMALLINT" | "MEDIUMINT" | "INT" | "BIGINT" => Self::Int64,
            "YEAR" => Self::Unsigned,
            n if n.ends_with(" UNSIGNED") => Self::Unsigned,
            "FLOAT" => Self::Float32,
            "DOUBLE" => Self::Float64,
            "CHAR" | "VARCHAR" | "TINYTEXT" | "TEXT" | "MEDIUMTEXT" | "LONGTEXT" | "ENUM" => {
                Self::Text
            }
            "DATE" => Self::Date,
            "TIME" => Self::Time,
            "DATETIME" => Self::Timestamp,
            "TIMESTAMP" => Self::TimestampTz,
            "DECIMAL" => Self::Decimal,
            "JSON" => Self::Json,
            _ => Self::Unsupported,
        }
    }
}

fn unsupported_column(column: &str, type_name: &str) -> sqlx::Error {
    sqlx::Error::ColumnDecode {
        index: column.to_string(),
        source: format!("{type_name} columns have no record representation").into(),
    }
}

fn timestamp_text(ts: NaiveDateTime) -> Value {
    Value::Text(ts.format("%Y-%m-%dT%H:%M:%S%.f").to_string())
}

/// JSON scalars keep their type; arrays and objects are kept as JSON text.
fn json_value(v: JsonValue) -> Value {
    if v.is_array() || v.is_object() {
        Value::Text(v.to_string())
    } else {
        Value::from_json(v).unwrap_or(Value::Null)
    }
}

fn pg_record(row: &PgRow) -> Result<Record, sqlx::Error> {
    let mut rec = Record::new();
    for (i, column) in row.columns().iter().enumerate() {
        let raw = row.try_get_raw(i)?;
        if raw.is_null() {
            rec.insert(column.name(), Value::Null);
            continue;
        }
        let type_name = raw.type_info().name().to_string();
        let value = match ColumnClass::postgres(&type_name) {
            ColumnClass::Bool => Value::Bool(row.try_get(i)?),
            ColumnClass::Int16 => Value::Int(row.try_get::<i16, _>(i)?.into()),
            ColumnClass::Int32 => Value::Int(row.try_get::<i32, _>(i)?.into()),
            ColumnClass::Int64 => Value::Int(row.try_get(i)?),
            ColumnClass::Float32 => Value::Float(row.try_get::<f32, _>(i)?.into()),
            ColumnClass::Float64 => Value::Float(row.try_get(i)?),
            ColumnClass::Text => Value::Text(row.try_get(i)?),
            ColumnClass::Date => Value::Text(row.try_get::<NaiveDate, _>(i)?.to_string()),
            ColumnClass::Time => Value::Text(row.try_get::<NaiveTime, _>(i)?.to_string()),
            ColumnClass::Timestamp => timestamp_text(row.try_get(i)?),
            ColumnClass::TimestampTz => Value::Text(row.try_get::<DateTime<Utc>, _>(i)?.to_rfc3339()),
            ColumnClass::Decimal => Value::Text(row.try_get::<BigDecimal, _>(i)?.to_string()),
            ColumnClass::Uuid => Value::Text(row.try_get::<Uuid, _>(i)?.to_string()),
            ColumnClass::Json => json_value(row.try_get(i)?),
            ColumnClass::Unsigned | ColumnClass::Unsupported => {
                return Err(unsupported_column(column.name(), &type_name))
            }
        };
        rec.insert(column.name(), value);
    }
    Ok(rec)
}

fn mysql_record(row: &MySqlRow) -> Result<Record, sqlx::Error> {
    let mut rec = Record::new();
    for (i, column) in row.columns().iter().enumerate() {
        let raw = row.try_get_raw(i)?;
        if raw.is_null() {
            rec.insert(column.name(), Value::Null);
            continue;
        }
        let type_name = raw.type_info().name().to_string();
        let value = match ColumnClass::mysql(&type_name) {
            ColumnClass::Bool => Value::Bool(row.try_get(i)?),
            ColumnClass::Int16 | ColumnClass::Int32 | ColumnClass::Int64 => Value::Int(row.try_get(i)?),
            ColumnClass::Unsigned => {
                let n: u64 = row.try_get(i)?;
                i64::try_from(n).map_or_else(|_| Value::Text(n.to_string()), Value::Int)
            }
            ColumnClass::Float32 => Value::Float(row.try_get::<f32, _>(i)?.into()),
            ColumnClass::Float64 => Value::Float(row.try_get(i)?),
            ColumnClass::Text => Value::Text(row.try_get(i)?),
            ColumnClass::Date => Value::Text(row.try_get::<NaiveDate, _>(i)?.to_string()),
            ColumnClass::Time => Value::Text(row.try_get::<NaiveTime, _>(i)?.to_string()),
            ColumnClass::Timestamp => timestamp_text(row.try_get(i)?),
            ColumnClass::TimestampTz => Value::Text(row.try_get::<DateTime<Utc>, _>(i)?.to_rfc3339()),
            ColumnClass::Decimal => Value::Text(row.try_get::<BigDecimal, _>(i)?.to_string()),
            ColumnClass::Json => json_value(row.try_get(i)?),
            ColumnClass::Uuid | ColumnClass::Unsupported => {
                return Err(unsupported_column(column.name(), &type_name))
            }
        };
        rec.insert(column.name(), value);
    }
    Ok(rec)
}

/// A single-connection pool for one engine.
#[derive(Clone)]
enum Backend {
    Postgres(PgPool),
    MySql(MySqlPool),
}

impl Backend {
    fn connect_lazy(engine: Engine, url: &str, timeout: Duration) -> Result<Self, sqlx::Error> {
        Ok(match engine {
            Engine::Postgres => Backend::Postgres(
                PgPoolOptions::new()
                    .max_connections(1)
                    .acquire_timeout(timeout)
                    .connect_lazy(url)?,
            ),
            Engine::MySql => Backend::MySql(
                MySqlPoolOptions::new()
                    .max_connections(1)
                    .acquire_timeout(timeout)
                    .connect_lazy(url)?,
            ),
        })
    }

    async fn check_connection(&self) -> Result<(), sqlx::Error> {
        match self {
            Backend::Postgres(pool) => pool.acquire().await.map(drop),
            Backend::MySql(pool) => pool.acquire().await.map(drop),
        }
    }

    fn rows<'a>(&'a self, query: &'a str) -> BoxStream<'a, Result<Record, sqlx::Error>> {
        match self {
            Backend::Postgres(pool) => sqlx::query::<Postgres>(query)
                .fetch(pool)
                .map(|row| row.and_then(|r| pg_record(&r)))
                .boxed(),
            Backend::MySql(pool) => sqlx::query::<MySql>(query)
                .fetch(pool)
                .map(|row| row.and_then(|r| mysql_record(&r)))
                .boxed(),
        }
    }

    async fn close(&self) {
        match self {
            Backend::Postgres(pool) => pool.close().await,
            Backend::MySql(pool) => pool.close().await,
        }
    }

    #[cfg(test)]
    fn is_closed(&self) -> bool {
        match self {
            Backend::Postgres(pool) => pool.is_closed(),
            Backend::MySql(pool) => pool.is_closed(),
        }
    }
}

/// Closes the pool when the stream ends or is dropped, whichever comes first.
struct PoolRelease(Option<Backend>);

impl PoolRelease {
    async fn close(mut self) {
        if let Some(backend) = self.0.take() {
            backend.close().await;
        }
    }
}

impl Drop for PoolRelease {
    fn drop(&mut self) {
        let Some(backend) = self.0.take() else { return };
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move { backend.close().await });
            }
            Err(_) => tracing::debug!("no runtime to close the database pool; dropping it"),
        }
    }
}

/// Result rows of one SQL query, fetched in pages of `ingestion.batch_size`.
pub struct QuerySource {
    query: String,
    engine: Engine,
    url: String,
    connect_timeout: Duration,
    page_size: usize,
    backend: Option<Backend>,
    stats: SourceStats,
    span: Span,
}

impl QuerySource {
    pub fn new(query: &str, engine: &str, config: &dyn ConfigLookup) -> Result<Self, IngestionError> {
        let engine: Engine = engine.parse()?;
        let settings = ConnectionSettings::from_config(config, engine)?;
        let url = settings.url(engine)?;
        let page_size = config.get_u64("ingestion.batch_size", 1000).max(1);
        let span = tracing::info_span!("source", kind = "database", engine = %engine);
        Ok(Self {
            query: query.to_string(),
            engine,
            url,
            connect_timeout: settings.connect_timeout,
            page_size: usize::try_from(page_size).unwrap_or(usize::MAX),
            backend: None,
            stats: SourceStats::default(),
            span,
        })
    }

    pub fn engine(&self) -> Engine {
        self.engine
    }
}

fn error_to_pull(e: sqlx::Error, position: u64) -> Pull {
    match e {
        sqlx::Error::ColumnDecode { .. } | sqlx::Error::Decode(_) => Pull::Skip {
            position,
            reason: e.to_string(),
        },
        sqlx::Error::PoolTimedOut
        | sqlx::Error::PoolClosed
        | sqlx::Error::Io(_)
        | sqlx::Error::Tls(_)
        | sqlx::Error::Configuration(_) => Pull::Fatal(IngestionError::Connection(e.to_string())),
        other => Pull::Fatal(IngestionError::Query(other.to_string())),
    }
}

fn row_to_pull(row: Result<Record, sqlx::Error>, position: u64, engine: Engine) -> Pull {
    match row {
        Ok(mut rec) => {
            rec.insert(record::SOURCE, "database");
            rec.insert(record::SOURCE_DB_TYPE, engine.as_str());
            rec.insert(record::INGESTION_TIMESTAMP, record::now_timestamp());
            Pull::Record(rec)
        }
        Err(e) => error_to_pull(e, position),
    }
}

/// Pulls decoded rows from the driver `page_size` at a time, numbering them from 1.
fn paged<'a>(
    rows: BoxStream<'a, Result<Record, sqlx::Error>>,
    page_size: usize,
    engine: Engine,
) -> RecordStream<'a> {
    rows.chunks(page_size)
        .flat_map(stream::iter)
        .enumerate()
        .map(move |(i, row)| row_to_pull(row, i as u64 + 1, engine))
        .boxed()
}

impl RecordSource for QuerySource {
    fn kind(&self) -> SourceKind {
        SourceKind::Database
    }

    fn origin(&self) -> &str {
        &self.query
    }

    fn ingest(&mut self) -> RecordStream<'_> {
        tracing::info!(parent: &self.span, "starting database ingestion");

        let backend = match Backend::connect_lazy(self.engine, &self.url, self.connect_timeout) {
            Ok(b) => b,
            Err(e) => {
                let err = IngestionError::Connection(e.to_string());
                return counted(fatal(err), &mut self.stats, self.span.clone());
            }
        };
        let release = PoolRelease(Some(backend.clone()));
        let backend: &Backend = self.backend.insert(backend);

        // Opening a connection first keeps handshake failures apart from query failures.
        let connected = stream::once(backend.check_connection()).filter_map(|res| {
            ready(res.err().map(|e| Pull::Fatal(IngestionError::Connection(e.to_string()))))
        });
        let raw = connected
            .chain(paged(backend.rows(&self.query), self.page_size, self.engine))
            .boxed();

        let release = stream::once(release.close()).filter_map(|()| ready(None::<Pull>));
        counted(raw, &mut self.stats, self.span.clone())
            .chain(release)
            .boxed()
    }

    fn stats(&self) -> SourceStats {
        self.stats
    }
}
