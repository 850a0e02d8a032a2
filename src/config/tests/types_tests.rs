//! Defaults, parsing and conversion tests for buildkeeper configuration types.

use std::time::Duration;

use rstest::rstest;

use super::helpers::{app_config_from_full_toml, app_config_from_partial_toml};
use crate::config::{AppConfig, PollConfig, RetryConfig};

#[rstest]
fn retry_defaults_match_documented_values() {
    let retry = RetryConfig::default();
    assert_eq!(retry.timeout(), Duration::from_secs(30));
    assert_eq!(retry.backoff(), Duration::from_millis(100));
}

#[rstest]
fn poll_defaults_match_documented_values() {
    let poll = PollConfig::default();
    assert_eq!(poll.interval(), Duration::from_millis(100));
    assert_eq!(poll.timeout(), Duration::from_secs(60));
}

#[rstest]
fn app_config_paths_default_to_none() {
    let config = AppConfig::default();
    assert!(config.docker_path.is_none());
    assert!(config.working_dir.is_none());
}

#[rstest]
fn full_toml_populates_every_field(app_config_from_full_toml: AppConfig) {
    let config = app_config_from_full_toml;
    assert_eq!(
        config.docker_path.as_ref().map(|p| p.as_str()),
        Some("/opt/docker/bin/docker")
    );
    assert_eq!(
        config.working_dir.as_ref().map(|p| p.as_str()),
        Some("/srv/app")
    );
    assert_eq!(config.retry.timeout(), Duration::from_secs(10));
    assert_eq!(config.retry.backoff(), Duration::from_millis(250));
    assert_eq!(config.poll.interval(), Duration::from_millis(500));
    assert_eq!(config.poll.timeout(), Duration::from_secs(120));
}

#[rstest]
fn partial_toml_keeps_defaults_for_missing_fields(app_config_from_partial_toml: AppConfig) {
    let config = app_config_from_partial_toml;
    assert_eq!(config.retry.backoff_ms, 50);
    assert_eq!(config.retry.timeout_secs, 30);
    assert_eq!(config.poll, PollConfig::default());
    assert!(config.docker_path.is_none());
}

#[rstest]
fn config_serialises_nested_tables() {
    let value = serde_json::to_value(AppConfig::default()).expect("serialisation should succeed");
    assert_eq!(
        value.pointer("/retry/backoff_ms"),
        Some(&serde_json::json!(100))
    );
    assert_eq!(
        value.pointer("/poll/timeout_secs"),
        Some(&serde_json::json!(60))
    );
}
