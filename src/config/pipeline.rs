//! File-backed configuration: `default.toml` merged with `{environment}.toml`,
//! then environment overrides for credentials.
//!
//! Lookup order for the directory and environment name:
//! 1) explicit arguments to [`PipelineConfig::load`]
//! 2) `$PIPELINE_CONFIG_DIR` / `$PIPELINE_ENV`
//! 3) `config` / `dev`

use serde_json::{Map, Value};
use std::fs;
use std::path::{Path, PathBuf};

use super::{lookup_path, ConfigLookup};
use crate::error::ConfigurationError;

pub const ENV_CONFIG_DIR: &str = "PIPELINE_CONFIG_DIR";
pub const ENV_ENVIRONMENT: &str = "PIPELINE_ENV";
pub const DEFAULT_CONFIG_DIR: &str = "config";
pub const DEFAULT_ENVIRONMENT: &str = "dev";

const REQUIRED_SECTIONS: [&str; 3] = ["ingestion", "validation", "logging"];

#[derive(Debug, Clone)]
pub struct PipelineConfig {
    dir: PathBuf,
    environment: String,
    root: Value,
}

impl PipelineConfig {
    pub fn load(dir: impl AsRef<Path>, environment: &str) -> Result<Self, ConfigurationError> {
        let dir = dir.as_ref().to_path_buf();
        let root = load_tree(&dir, environment)?;
        Ok(Self {
            dir,
            environment: environment.to_string(),
            root,
        })
    }

    /// Loads `.env` first, then resolves directory and environment from the process env.
    pub fn load_default() -> Result<Self, ConfigurationError> {
        let _ = dotenvy::dotenv();
        let dir = std::env::var(ENV_CONFIG_DIR).unwrap_or_else(|_| DEFAULT_CONFIG_DIR.into());
        let environment =
            std::env::var(ENV_ENVIRONMENT).unwrap_or_else(|_| DEFAULT_ENVIRONMENT.into());
        Self::load(dir, &environment)
    }

    /// Re-reads the same files; environment overrides are applied again.
    pub fn reload(&mut self) -> Result<(), ConfigurationError> {
        self.root = load_tree(&self.dir, &self.environment)?;
        Ok(())
    }

    pub fn environment(&self) -> &str {
        &self.environment
    }

    pub fn as_value(&self) -> &Value {
        &self.root
    }
}

impl ConfigLookup for PipelineConfig {
    fn lookup(&self, path: &str) -> Option<&Value> {
        lookup_path(&self.root, path)
    }
}

fn load_tree(dir: &Path, environment: &str) -> Result<Value, ConfigurationError> {
    let default_path = dir.join("default.toml");
    if !default_path.exists() {
        return Err(ConfigurationError::MissingFile(default_path));
    }
    let mut root = read_toml(&default_path)?;

    let env_path = dir.join(format!("{environment}.toml"));
    if env_path.exists() {
        let overlay = read_toml(&env_path)?;
        merge(&mut root, overlay);
    }

    apply_env_overrides(&mut root);
    check_required(&root)?;
    Ok(root)
}

fn read_toml(path: &Path) -> Result<Value, ConfigurationError> {
    let content = fs::read_to_string(path).map_err(|source| ConfigurationError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let value: Value = toml::from_str(&content).map_err(|e| ConfigurationError::Parse {
        path: path.to_path_buf(),
        message: e.to_string(),
    })?;
    Ok(value)
}

/// Deep merge: tables merge key by key, anything else is replaced.
pub(crate) fn merge(base: &mut Value, overlay: Value) {
    match (base, overlay) {
        (Value::Object(base), Value::Object(overlay)) => {
            for (key, value) in overlay {
                match base.get_mut(&key) {
                    Some(slot) if slot.is_object() && value.is_object() => merge(slot, value),
                    _ => {
                        base.insert(key, value);
                    }
                }
            }
        }
        (slot, value) => *slot = value,
    }
}

fn apply_env_overrides(root: &mut Value) {
    let Some(root) = root.as_object_mut() else {
        return;
    };
    if let Some(db) = root.get_mut("database").and_then(Value::as_object_mut) {
        override_from_env(db, "password", "DB_PASSWORD");
        override_from_env(db, "username", "DB_USERNAME");
    }
    if let Some(api) = root.get_mut("api").and_then(Value::as_object_mut) {
        override_from_env(api, "api_key", "API_KEY");
    }
}

fn override_from_env(section: &mut Map<String, Value>, key: &str, var: &str) {
    if let Ok(v) = std::env::var(var) {
        section.insert(key.to_string(), Value::String(v));
    }
}

fn check_required(root: &Value) -> Result<(), ConfigurationError> {
    let missing: Vec<&str> = REQUIRED_SECTIONS
        .iter()
        .copied()
        .filter(|key| root.get(key).is_none())
        .collect();
    if missing.is_empty() {
        Ok(())
    } else {
        Err(ConfigurationError::MissingKeys(missing.join(", ")))
    }
}
