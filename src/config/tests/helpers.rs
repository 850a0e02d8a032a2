//! Shared fixtures and helper functions for config tests.

use std::sync::Arc;

use ortho_config::MergeComposer;
use rstest::fixture;

use crate::config::AppConfig;

/// Fixture providing an `AppConfig` parsed from a full TOML example.
#[fixture]
pub fn app_config_from_full_toml() -> AppConfig {
    let toml = r#"
        docker_path = "/opt/docker/bin/docker"
        working_dir = "/srv/app"

        [retry]
        timeout_secs = 10
        backoff_ms = 250

        [poll]
        interval_ms = 500
        timeout_secs = 120
    "#;

    toml::from_str(toml).expect("TOML parsing should succeed")
}

/// Fixture providing an `AppConfig` parsed from a minimal TOML example.
#[fixture]
pub fn app_config_from_partial_toml() -> AppConfig {
    let toml = r"
        [retry]
        backoff_ms = 50
    ";

    toml::from_str(toml).expect("TOML parsing should succeed")
}

/// Helper: Creates a `MergeComposer` with defaults layer already pushed.
pub fn create_composer_with_defaults() -> Result<MergeComposer, serde_json::Error> {
    let mut composer = MergeComposer::new();
    let defaults = ortho_config::serde_json::to_value(AppConfig::default())?;
    composer.push_defaults(defaults);
    Ok(composer)
}

/// Helper: Merges layers from a composer into `AppConfig`.
pub fn merge_config(composer: MergeComposer) -> Result<AppConfig, Arc<ortho_config::OrthoError>> {
    AppConfig::merge_from_layers(composer.layers())
}

/// Helper: Asserts that a config has all default values.
pub fn assert_config_has_defaults(config: &AppConfig) {
    assert!(config.docker_path.is_none(), "docker_path should be None");
    assert!(config.working_dir.is_none(), "working_dir should be None");
    assert_eq!(config.retry.timeout_secs, 30, "retry.timeout_secs should be 30");
    assert_eq!(config.retry.backoff_ms, 100, "retry.backoff_ms should be 100");
    assert_eq!(config.poll.interval_ms, 100, "poll.interval_ms should be 100");
    assert_eq!(config.poll.timeout_secs, 60, "poll.timeout_secs should be 60");
}

/// Helper: Creates a `MergeComposer` with defaults, file, and env layers for
/// testing layer precedence.
pub fn create_composer_with_file_and_env() -> Result<MergeComposer, serde_json::Error> {
    use ortho_config::serde_json::json;

    let mut composer = create_composer_with_defaults()?;

    composer.push_file(
        json!({
            "docker_path": "/from/file/docker",
            "working_dir": "/from/file",
            "retry": { "backoff_ms": 200 }
        }),
        None,
    );

    composer.push_environment(json!({
        "docker_path": "/from/env/docker",
        "retry": { "timeout_secs": 5 }
    }));

    Ok(composer)
}
