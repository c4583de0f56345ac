//! Integration tests for `timebin config` behavior.
//!
//! Tests config validation and loading with real TOML files. Every test is
//! `#[serial]` because some of them mutate `TIMEBIN_*` environment variables.

use std::fs;

use serial_test::serial;
use tempfile::TempDir;

use timebin_core::config::TimebinConfig;
use timebin_core::error::{ConfigError, TimebinError};

#[tokio::test]
#[serial]
async fn test_config_validate_valid_toml() {
    // Given: A valid config file
    let temp_dir = TempDir::new().expect("should create temp dir");
    let config_path = temp_dir.path().join("timebin.toml");

    let valid_config = r#"
[general]
log_level = "debug"
log_format = "json"

[defaults]
bin_size = 300
time_column = "ts"
channel_capacity = 64
"#;
    fs::write(&config_path, valid_config).expect("should write config");

    // When: Loading the config
    let config = TimebinConfig::load(&config_path)
        .await
        .expect("valid config should load successfully");

    // Then: Values come from the file
    assert_eq!(config.general.log_level, "debug");
    assert_eq!(config.defaults.bin_size, 300);
    assert_eq!(config.defaults.time_column, "ts");
    assert_eq!(config.defaults.channel_capacity, 64);
}

#[tokio::test]
#[serial]
async fn test_config_validate_malformed_toml() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let config_path = temp_dir.path().join("bad.toml");

    fs::write(&config_path, "[general\nlog_level = \"info\"\n").expect("should write bad config");

    let result = TimebinConfig::load(&config_path).await;
    assert!(
        matches!(result, Err(TimebinError::Config(ConfigError::ParseFailed { .. }))),
        "malformed TOML should fail to parse"
    );
}

#[tokio::test]
#[serial]
async fn test_config_validate_rejects_zero_bin_size() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let config_path = temp_dir.path().join("zero.toml");

    fs::write(&config_path, "[defaults]\nbin_size = 0\n").expect("should write config");

    let result = TimebinConfig::load(&config_path).await;
    assert!(
        matches!(result, Err(TimebinError::Config(ConfigError::InvalidValue { .. }))),
        "zero bin size should be rejected"
    );
}

#[tokio::test]
#[serial]
async fn test_config_missing_file_is_strict_error_but_default_for_data_commands() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let config_path = temp_dir.path().join("absent.toml");

    let strict = TimebinConfig::load(&config_path).await;
    assert!(matches!(
        strict,
        Err(TimebinError::Config(ConfigError::FileNotFound { .. }))
    ));

    let lenient = TimebinConfig::load_or_default(&config_path)
        .await
        .expect("missing file falls back to defaults");
    assert_eq!(lenient.defaults.bin_size, 60);
    assert_eq!(lenient.general.log_format, "pretty");
}

#[tokio::test]
#[serial]
async fn test_config_partial_file_keeps_defaults() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let config_path = temp_dir.path().join("partial.toml");

    fs::write(&config_path, "[general]\nlog_level = \"warn\"\n").expect("should write config");

    let config = TimebinConfig::load(&config_path).await.expect("should load");
    assert_eq!(config.general.log_level, "warn");
    assert_eq!(config.defaults.time_column, "time");
    assert_eq!(config.defaults.channel_capacity, 1024);
}

#[tokio::test]
#[serial]
async fn test_config_env_override_wins_over_file() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let config_path = temp_dir.path().join("timebin.toml");

    fs::write(&config_path, "[defaults]\nbin_size = 300\n").expect("should write config");

    // SAFETY: serialized with the other env-mutating tests
    unsafe {
        std::env::set_var("TIMEBIN_DEFAULTS_BIN_SIZE", "3600");
    }
    let config = TimebinConfig::load(&config_path).await;
    unsafe {
        std::env::remove_var("TIMEBIN_DEFAULTS_BIN_SIZE");
    }

    assert_eq!(config.expect("should load").defaults.bin_size, 3600);
}

#[tokio::test]
#[serial]
async fn test_config_invalid_env_override_is_ignored() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let config_path = temp_dir.path().join("timebin.toml");

    fs::write(&config_path, "[defaults]\nchannel_capacity = 16\n").expect("should write config");

    unsafe {
        std::env::set_var("TIMEBIN_DEFAULTS_CHANNEL_CAPACITY", "lots");
    }
    let config = TimebinConfig::load(&config_path).await;
    unsafe {
        std::env::remove_var("TIMEBIN_DEFAULTS_CHANNEL_CAPACITY");
    }

    assert_eq!(config.expect("should load").defaults.channel_capacity, 16);
}
