//! Subscriber setup from the `logging.*` configuration section.
//!
//! `RUST_LOG` wins over `logging.level`. The console layer is compact text or
//! JSON (`logging.format`); the optional file layer rolls daily.

use anyhow::{Context, Result};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{fmt, prelude::*, EnvFilter, Layer, Registry};

use crate::config::ConfigLookup;

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync>;

/// Installs the global subscriber. A second call leaves the first one in place.
///
/// Keep the returned guard alive for as long as file logs should be flushed.
pub fn init(config: &dyn ConfigLookup) -> Result<Option<WorkerGuard>> {
    let level = config.get_str("logging.level", "info").to_ascii_lowercase();
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let json = config
        .get_str("logging.format", "compact")
        .eq_ignore_ascii_case("json");

    let mut layers: Vec<BoxedLayer> = Vec::new();
    if config.get_bool("logging.console.enabled", true) {
        layers.push(if json {
            fmt::layer().json().boxed()
        } else {
            fmt::layer().compact().boxed()
        });
    }

    let mut guard = None;
    if config.get_bool("logging.file.enabled", false) {
        let dir = config.get_str("logging.file.directory", "logs");
        let prefix = config.get_str("logging.file.prefix", "pipeline.log");
        let appender = RollingFileAppender::builder()
            .rotation(Rotation::DAILY)
            .filename_prefix(prefix)
            .build(&dir)
            .with_context(|| format!("opening log directory {dir}"))?;
        let (writer, g) = tracing_appender::non_blocking(appender);
        guard = Some(g);
        let layer = fmt::layer().with_writer(writer).with_ansi(false);
        layers.push(if json { layer.json().boxed() } else { layer.boxed() });
    }

    let _ = tracing_subscriber::registry()
        .with(layers)
        .with(filter)
        .try_init();
    Ok(guard)
}
