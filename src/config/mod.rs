//! Configuration lookup by dotted path (`ingestion.sources.csv.delimiter`).
//!
//! Components never read configuration files themselves; they receive a
//! [`ConfigLookup`] and ask for values with a caller-supplied default.

pub mod pipeline;

pub use pipeline::PipelineConfig;

use serde_json::Value;
use std::time::Duration;

pub trait ConfigLookup {
    /// Raw value at a dotted path, if every segment exists.
    fn lookup(&self, path: &str) -> Option<&Value>;

    fn get_str(&self, path: &str, default: &str) -> String {
        self.get_opt_str(path).unwrap_or_else(|| default.to_string())
    }

    /// Strings as-is; numbers and booleans in their display form.
    fn get_opt_str(&self, path: &str) -> Option<String> {
        match self.lookup(path)? {
            Value::String(s) => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            Value::Bool(b) => Some(b.to_string()),
            _ => None,
        }
    }

    fn get_f64(&self, path: &str, default: f64) -> f64 {
        match self.lookup(path) {
            Some(Value::Number(n)) => n.as_f64().unwrap_or(default),
            Some(Value::String(s)) => s.trim().parse().unwrap_or(default),
            _ => default,
        }
    }

    fn get_u64(&self, path: &str, default: u64) -> u64 {
        match self.lookup(path) {
            Some(Value::Number(n)) => n
                .as_u64()
                .or_else(|| n.as_f64().filter(|x| *x >= 0.0).map(|x| x as u64))
                .unwrap_or(default),
            Some(Value::String(s)) => s.trim().parse().unwrap_or(default),
            _ => default,
        }
    }

    /// Signed integers; floats truncate toward zero.
    fn get_i64(&self, path: &str, default: i64) -> i64 {
        match self.lookup(path) {
            Some(Value::Number(n)) => n
                .as_i64()
                .or_else(|| n.as_f64().filter(|x| x.is_finite()).map(|x| x as i64))
                .unwrap_or(default),
            Some(Value::String(s)) => s.trim().parse().unwrap_or(default),
            _ => default,
        }
    }

    /// Seconds as a [`Duration`], negatives floored at zero. `None` when the
    /// value is too large to represent.
    fn get_seconds(&self, path: &str, default: f64) -> Option<Duration> {
        Duration::try_from_secs_f64(self.get_f64(path, default).max(0.0)).ok()
    }

    fn get_bool(&self, path: &str, default: bool) -> bool {
        match self.lookup(path) {
            Some(Value::Bool(b)) => *b,
            Some(Value::String(s)) => match s.trim().to_ascii_lowercase().as_str() {
                "true" | "1" | "yes" | "on" => true,
                "false" | "0" | "no" | "off" => false,
                _ => default,
            },
            _ => default,
        }
    }
}

/// Walks a JSON tree by dotted path.
pub fn lookup_path<'a>(root: &'a Value, path: &str) -> Option<&'a Value> {
    path.split('.')
        .try_fold(root, |node, segment| node.as_object()?.get(segment))
}

impl ConfigLookup for Value {
    fn lookup(&self, path: &str) -> Option<&Value> {
        lookup_path(self, path)
    }
}
