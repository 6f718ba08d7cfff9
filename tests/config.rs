// tests/config.rs
use quality_pipeline::{ConfigLookup, ConfigurationError, PipelineConfig};
use serial_test::serial;
use std::fs;
use std::path::Path;

const BASE: &str = r#"
[ingestion]
batch_size = 500

[ingestion.sources.api]
max_retries = 3

[validation.schema]
strict_mode = true

[logging]
level = "info"

[database]
host = "db.internal"
username = "reader"

[api]
api_key = ""
"#;

fn write(dir: &Path, name: &str, body: &str) {
    fs::write(dir.join(name), body).unwrap();
}

fn clear_overrides() {
    for var in ["DB_PASSWORD", "DB_USERNAME", "API_KEY"] {
        std::env::remove_var(var);
    }
}

#[test]
#[serial]
fn environment_file_merges_over_defaults() {
    clear_overrides();
    let dir = tempfile::tempdir().unwrap();
    write(dir.path(), "default.toml", BASE);
    write(
        dir.path(),
        "prod.toml",
        "[ingestion.sources.api]\nmax_retries = 5\n\n[logging]\nformat = \"json\"\n",
    );

    let cfg = PipelineConfig::load(dir.path(), "prod").unwrap();
    assert_eq!(cfg.environment(), "prod");
    assert_eq!(cfg.get_u64("ingestion.sources.api.max_retries", 0), 5);
    assert_eq!(cfg.get_u64("ingestion.batch_size", 0), 500);
    assert_eq!(cfg.get_str("logging.level", ""), "info");
    assert_eq!(cfg.get_str("logging.format", ""), "json");
    assert!(cfg.get_bool("validation.schema.strict_mode", false));
}

#[test]
#[serial]
fn missing_environment_file_is_fine() {
    clear_overrides();
    let dir = tempfile::tempdir().unwrap();
    write(dir.path(), "default.toml", BASE);
    let cfg = PipelineConfig::load(dir.path(), "staging").unwrap();
    assert_eq!(cfg.get_str("database.host", ""), "db.internal");
}

#[test]
#[serial]
fn credentials_come_from_the_environment() {
    clear_overrides();
    let dir = tempfile::tempdir().unwrap();
    write(dir.path(), "default.toml", BASE);
    std::env::set_var("DB_PASSWORD", "hunter2");
    std::env::set_var("API_KEY", "k-123");

    let cfg = PipelineConfig::load(dir.path(), "dev").unwrap();
    clear_overrides();
    assert_eq!(cfg.get_opt_str("database.password").as_deref(), Some("hunter2"));
    assert_eq!(cfg.get_opt_str("database.username").as_deref(), Some("reader"));
    assert_eq!(cfg.get_opt_str("api.api_key").as_deref(), Some("k-123"));
}

#[test]
#[serial]
fn missing_default_file_is_an_error() {
    let dir = tempfile::tempdir().unwrap();
    let err = PipelineConfig::load(dir.path(), "dev").unwrap_err();
    assert!(matches!(err, ConfigurationError::MissingFile(_)));
}

#[test]
#[serial]
fn missing_sections_are_listed() {
    let dir = tempfile::tempdir().unwrap();
    write(dir.path(), "default.toml", "[ingestion]\nbatch_size = 1\n");
    let err = PipelineConfig::load(dir.path(), "dev").unwrap_err();
    match err {
        ConfigurationError::MissingKeys(keys) => {
            assert!(keys.contains("validation") && keys.contains("logging"), "{keys}");
            assert!(!keys.contains("ingestion"));
        }
        other => panic!("unexpected {other:?}"),
    }
}

#[test]
#[serial]
fn reload_picks_up_changes() {
    clear_overrides();
    let dir = tempfile::tempdir().unwrap();
    write(dir.path(), "default.toml", BASE);
    let mut cfg = PipelineConfig::load(dir.path(), "dev").unwrap();
    assert_eq!(cfg.get_str("logging.level", ""), "info");

    write(dir.path(), "dev.toml", "[logging]\nlevel = \"debug\"\n");
    cfg.reload().unwrap();
    assert_eq!(cfg.get_str("logging.level", ""), "debug");
}

#[test]
#[serial]
fn load_default_reads_env_selected_directory() {
    clear_overrides();
    let dir = tempfile::tempdir().unwrap();
    write(dir.path(), "default.toml", BASE);
    write(dir.path(), "qa.toml", "[logging]\nlevel = \"warn\"\n");
    std::env::set_var("PIPELINE_CONFIG_DIR", dir.path());
    std::env::set_var("PIPELINE_ENV", "qa");

    let cfg = PipelineConfig::load_default();
    std::env::remove_var("PIPELINE_CONFIG_DIR");
    std::env::remove_var("PIPELINE_ENV");

    let cfg = cfg.unwrap();
    assert_eq!(cfg.environment(), "qa");
    assert_eq!(cfg.get_str("logging.level", ""), "warn");
}
