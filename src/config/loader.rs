//! Configuration loading with layered precedence.
//!
//! The precedence order (lowest to highest) is: application defaults,
//! configuration file, environment variables, command-line arguments.
//!
//! Layers are composed by hand with `MergeComposer` rather than through the
//! derived `OrthoConfig::load()`, because the `Cli` owns subcommand dispatch
//! and the environment layer must reject unparseable numbers instead of
//! ignoring them.
//!
//! # Environment Variable Handling
//!
//! Numeric variables such as `BUILDKEEPER_RETRY_BACKOFF_MS=soon` return an
//! error immediately. Path variables are always accepted; an empty path means
//! "not configured".

use camino::Utf8PathBuf;
use cap_std::ambient_authority;
use cap_std::fs_utf8::Dir;
use ortho_config::discovery::ConfigDiscovery;
use ortho_config::serde_json::{self, Map, Value};
use ortho_config::{MergeComposer, toml};

use crate::config::{AppConfig, Cli};
use crate::error::{ConfigError, Result};

/// Environment variable naming an explicit configuration file.
pub const CONFIG_PATH_ENV_VAR: &str = "BUILDKEEPER_CONFIG_PATH";

/// The type of value expected from an environment variable.
#[derive(Clone, Copy)]
enum EnvVarType {
    /// Path or other string value (always accepted).
    String,
    /// Unsigned 64-bit integer. Invalid values return an error.
    U64,
}

/// Specification for a single environment variable mapping.
struct EnvVarSpec {
    /// The environment variable name (e.g., `BUILDKEEPER_DOCKER_PATH`).
    env_var: &'static str,
    /// The JSON path segments (e.g., `["retry", "backoff_ms"]`).
    path: &'static [&'static str],
    /// The expected value type.
    var_type: EnvVarType,
}

/// Table of all environment variables and their JSON paths.
const ENV_VAR_SPECS: &[EnvVarSpec] = &[
    EnvVarSpec {
        env_var: "BUILDKEEPER_DOCKER_PATH",
        path: &["docker_path"],
        var_type: EnvVarType::String,
    },
    EnvVarSpec {
        env_var: "BUILDKEEPER_WORKING_DIR",
        path: &["working_dir"],
        var_type: EnvVarType::String,
    },
    EnvVarSpec {
        env_var: "BUILDKEEPER_RETRY_TIMEOUT_SECS",
        path: &["retry", "timeout_secs"],
        var_type: EnvVarType::U64,
    },
    EnvVarSpec {
        env_var: "BUILDKEEPER_RETRY_BACKOFF_MS",
        path: &["retry", "backoff_ms"],
        var_type: EnvVarType::U64,
    },
    EnvVarSpec {
        env_var: "BUILDKEEPER_POLL_INTERVAL_MS",
        path: &["poll", "interval_ms"],
        var_type: EnvVarType::U64,
    },
    EnvVarSpec {
        env_var: "BUILDKEEPER_POLL_TIMEOUT_SECS",
        path: &["poll", "timeout_secs"],
        var_type: EnvVarType::U64,
    },
];

/// Returns the environment variable names recognised by the config loader.
///
/// Tests use this to clear every `BUILDKEEPER_*` variable the loader reads.
#[must_use]
pub fn env_var_names() -> Vec<&'static str> {
    ENV_VAR_SPECS.iter().map(|spec| spec.env_var).collect()
}

/// Read a configuration file through `cap_std` and push it to the composer.
fn load_config_file(path: &Utf8PathBuf, composer: &mut MergeComposer) -> Result<()> {
    let current_dir = Utf8PathBuf::from(".");
    let parent = path
        .parent()
        .filter(|dir| !dir.as_str().is_empty())
        .unwrap_or_else(|| current_dir.as_ref());
    let file_name = path.file_name().unwrap_or(path.as_str());

    let dir = Dir::open_ambient_dir(parent, ambient_authority()).map_err(|e| {
        ConfigError::ParseError {
            message: format!("failed to open directory {parent}: {e}"),
        }
    })?;

    let content = dir
        .read_to_string(file_name)
        .map_err(|e| ConfigError::ParseError {
            message: format!("failed to read {path}: {e}"),
        })?;

    let value =
        toml::from_str::<serde_json::Value>(&content).map_err(|e| ConfigError::ParseError {
            message: format!("failed to parse {path}: {e}"),
        })?;

    composer.push_file(value, Some(path.clone()));
    Ok(())
}

/// Find the configuration file to load, if any.
///
/// An explicit `--config` path must exist; discovered candidates are skipped
/// when missing.
fn config_path(cli: &Cli) -> Result<Option<Utf8PathBuf>> {
    if let Some(ref path) = cli.config {
        if !path.exists() {
            return Err(ConfigError::FileNotFound {
                path: path.clone().into_std_path_buf(),
            }
            .into());
        }
        return Ok(Some(path.clone()));
    }

    let discovery = ConfigDiscovery::builder("buildkeeper")
        .env_var(CONFIG_PATH_ENV_VAR)
        .config_file_name("config.toml")
        .dotfile_name(".buildkeeper.toml")
        .build();
    Ok(discovery
        .candidates()
        .into_iter()
        .filter(|p| p.exists())
        .find_map(|p| Utf8PathBuf::try_from(p).ok()))
}

/// Load configuration with full layer precedence.
///
/// This function loads configuration from all available sources:
/// 1. Application defaults defined in the struct
/// 2. Configuration file (`--config`, `BUILDKEEPER_CONFIG_PATH` or discovery)
/// 3. Environment variables prefixed with `BUILDKEEPER_`
/// 4. Command-line arguments (from the provided `Cli`)
///
/// Later sources override earlier ones. The merged result is validated.
///
/// # Errors
///
/// Returns `ConfigError` if:
/// - `--config` names a file that does not exist
/// - a configuration file cannot be read or parsed
/// - a numeric environment variable is not an unsigned integer
/// - a merged interval or timeout is zero
pub fn load_config(cli: &Cli) -> Result<AppConfig> {
    let mut composer = MergeComposer::new();

    let defaults =
        serde_json::to_value(AppConfig::default()).map_err(|e| ConfigError::ParseError {
            message: format!("failed to serialise defaults: {e}"),
        })?;
    composer.push_defaults(defaults);

    if let Some(ref path) = config_path(cli)? {
        load_config_file(path, &mut composer)?;
    }

    let env_values = collect_env_vars()?;
    if !env_values.is_null() {
        composer.push_environment(env_values);
    }

    let cli_overrides = build_cli_overrides(cli);
    if !cli_overrides.is_null() {
        composer.push_cli(cli_overrides);
    }

    let config =
        AppConfig::merge_from_layers(composer.layers()).map_err(ConfigError::OrthoConfig)?;
    config.validate()?;
    tracing::debug!(?config, "configuration loaded");
    Ok(config)
}

/// Collect `BUILDKEEPER_*` environment variables into a JSON value.
///
/// # Errors
///
/// Returns `ConfigError::InvalidValue` if a numeric variable does not parse.
fn collect_env_vars() -> Result<Value> {
    let mut root = Map::new();

    for spec in ENV_VAR_SPECS {
        let Ok(raw_value) = std::env::var(spec.env_var) else {
            continue;
        };

        let json_value = match spec.var_type {
            EnvVarType::String => Value::String(raw_value),
            EnvVarType::U64 => match raw_value.trim().parse::<u64>() {
                Ok(n) => Value::Number(n.into()),
                Err(_) => {
                    return Err(ConfigError::InvalidValue {
                        field: spec.env_var.to_owned(),
                        reason: format!("expected unsigned integer, got '{raw_value}'"),
                    }
                    .into());
                }
            },
        };

        insert_at_path(&mut root, spec.path, json_value);
    }

    if root.is_empty() {
        Ok(Value::Null)
    } else {
        Ok(Value::Object(root))
    }
}

/// Insert a value at a nested path in a JSON map, creating parents as needed.
fn insert_at_path(root: &mut Map<String, Value>, path: &[&str], value: Value) {
    let Some((&field, parents)) = path.split_last() else {
        return;
    };

    let mut current = root;
    for &segment in parents {
        let entry = current
            .entry(segment.to_owned())
            .or_insert_with(|| Value::Object(Map::new()));
        let Some(obj) = entry.as_object_mut() else {
            return;
        };
        current = obj;
    }

    current.insert(field.to_owned(), value);
}

/// Build a JSON value containing CLI overrides.
fn build_cli_overrides(cli: &Cli) -> Value {
    let mut overrides = Map::new();

    if let Some(ref docker) = cli.docker {
        overrides.insert(
            String::from("docker_path"),
            Value::String(docker.to_string()),
        );
    }

    if let Some(ref dir) = cli.working_dir {
        overrides.insert(String::from("working_dir"), Value::String(dir.to_string()));
    }

    if overrides.is_empty() {
        Value::Null
    } else {
        Value::Object(overrides)
    }
}
