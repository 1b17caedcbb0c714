//! Config file resolution tests
//!
//! Uses serial_test: tests that manipulate REELCHECK_* environment variables
//! are marked #[serial] so they do not race each other.

use reelcheck_common::config::{
    load_or_default, ConfigFileResolver, ConfigSource, LoggingConfig,
};
use reelcheck_common::Error;
use serde::Deserialize;
use serial_test::serial;
use std::env;
use std::io::Write;

const TEST_ENV_VAR: &str = "REELCHECK_CONFIG_TEST";

#[derive(Debug, Default, Deserialize, PartialEq)]
struct TestConfig {
    #[serde(default)]
    batch_size: usize,
    #[serde(default)]
    logging: LoggingConfig,
}

fn resolver() -> ConfigFileResolver {
    ConfigFileResolver::with_names(TEST_ENV_VAR, "reelcheck-config-tests-nonexistent")
}

#[test]
#[serial]
fn test_no_config_uses_defaults() {
    env::remove_var(TEST_ENV_VAR);

    let config: TestConfig = load_or_default(&resolver(), None).unwrap();
    assert_eq!(config, TestConfig::default());
}

#[test]
#[serial]
fn test_env_var_config_loaded() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "batch_size = 7\n[logging]\nlevel = \"debug\"").unwrap();
    env::set_var(TEST_ENV_VAR, file.path());

    let (path, source) = resolver().resolve(None).unwrap();
    assert_eq!(path, file.path());
    assert_eq!(source, ConfigSource::Environment);

    let config: TestConfig = load_or_default(&resolver(), None).unwrap();
    assert_eq!(config.batch_size, 7);
    assert_eq!(config.logging.level, "debug");

    env::remove_var(TEST_ENV_VAR);
}

#[test]
#[serial]
fn test_env_var_missing_file_degrades_to_defaults() {
    env::set_var(TEST_ENV_VAR, "/nonexistent/reelcheck/config.toml");

    let config: TestConfig = load_or_default(&resolver(), None).unwrap();
    assert_eq!(config, TestConfig::default());

    env::remove_var(TEST_ENV_VAR);
}

#[test]
#[serial]
fn test_explicit_missing_file_is_error() {
    env::remove_var(TEST_ENV_VAR);

    let missing = std::path::Path::new("/nonexistent/reelcheck/explicit.toml");
    let result: Result<TestConfig, Error> = load_or_default(&resolver(), Some(missing));
    assert!(matches!(result, Err(Error::Config(_))));
}

#[test]
#[serial]
fn test_explicit_path_overrides_env() {
    let mut env_file = tempfile::NamedTempFile::new().unwrap();
    writeln!(env_file, "batch_size = 1").unwrap();
    let mut explicit_file = tempfile::NamedTempFile::new().unwrap();
    writeln!(explicit_file, "batch_size = 2").unwrap();
    env::set_var(TEST_ENV_VAR, env_file.path());

    let config: TestConfig = load_or_default(&resolver(), Some(explicit_file.path())).unwrap();
    assert_eq!(config.batch_size, 2);

    env::remove_var(TEST_ENV_VAR);
}

#[test]
#[serial]
fn test_malformed_file_is_error() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "batch_size = \"not a number\"").unwrap();

    let result: Result<TestConfig, Error> = load_or_default(&resolver(), Some(file.path()));
    assert!(matches!(result, Err(Error::Config(_))));
}
