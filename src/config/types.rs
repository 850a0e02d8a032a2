//! Configuration data types for buildkeeper.

use std::time::Duration;

use camino::Utf8PathBuf;
use ortho_config::{OrthoConfig, OrthoResult, PostMergeContext, PostMergeHook};
use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, Result};

/// Retry settings applied to every buildx command.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Deadline, in seconds, for operations that are not given one.
    pub timeout_secs: u64,

    /// Pause, in milliseconds, between attempts.
    pub backoff_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 30,
            backoff_ms: 100,
        }
    }
}

impl RetryConfig {
    /// Return the default deadline as a [`Duration`].
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Return the backoff as a [`Duration`].
    #[must_use]
    pub const fn backoff(&self) -> Duration {
        Duration::from_millis(self.backoff_ms)
    }
}

/// Settings for waiting on a builder's status.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct PollConfig {
    /// Pause, in milliseconds, between status checks.
    pub interval_ms: u64,

    /// How long, in seconds, `wait` gives up after when no timeout is passed.
    pub timeout_secs: u64,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            interval_ms: 100,
            timeout_secs: 60,
        }
    }
}

impl PollConfig {
    /// Return the interval as a [`Duration`].
    #[must_use]
    pub const fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }

    /// Return the default wait timeout as a [`Duration`].
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Root application configuration.
///
/// This structure is loaded from configuration files, environment variables,
/// and command-line arguments with layered precedence. The precedence order
/// (lowest to highest) is: defaults, configuration file, environment variables,
/// command-line arguments.
///
/// Configuration files are discovered in this order:
/// 1. Path specified via `BUILDKEEPER_CONFIG_PATH` environment variable
/// 2. `.buildkeeper.toml` in the current working directory
/// 3. `.buildkeeper.toml` in the home directory
/// 4. `~/.config/buildkeeper/config.toml` (XDG default)
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize, OrthoConfig)]
#[ortho_config(
    prefix = "BUILDKEEPER",
    post_merge_hook,
    discovery(
        app_name = "buildkeeper",
        env_var = "BUILDKEEPER_CONFIG_PATH",
        config_file_name = "config.toml",
        dotfile_name = ".buildkeeper.toml",
        config_cli_long = "config",
        config_cli_visible = true,
    )
)]
pub struct AppConfig {
    /// Path to the docker executable.
    #[ortho_config(skip_cli)]
    pub docker_path: Option<Utf8PathBuf>,

    /// Directory every buildx command runs in.
    #[ortho_config(skip_cli)]
    pub working_dir: Option<Utf8PathBuf>,

    /// Retry settings.
    #[serde(default)]
    #[ortho_config(skip_cli)]
    pub retry: RetryConfig,

    /// Status polling settings.
    #[serde(default)]
    #[ortho_config(skip_cli)]
    pub poll: PollConfig,
}

impl AppConfig {
    /// Checks that every interval is usable.
    ///
    /// A zero backoff or poll interval would spin against the docker daemon,
    /// and a zero timeout would never allow a second attempt.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidValue` naming the first zero-valued field.
    pub fn validate(&self) -> Result<()> {
        let fields = [
            ("retry.timeout_secs", self.retry.timeout_secs),
            ("retry.backoff_ms", self.retry.backoff_ms),
            ("poll.interval_ms", self.poll.interval_ms),
            ("poll.timeout_secs", self.poll.timeout_secs),
        ];
        match fields.iter().find(|(_, value)| *value == 0) {
            Some(&(field, _)) => Err(ConfigError::InvalidValue {
                field: field.to_owned(),
                reason: String::from("must be greater than zero"),
            }
            .into()),
            None => Ok(()),
        }
    }
}

impl PostMergeHook for AppConfig {
    fn post_merge(&mut self, _ctx: &PostMergeContext) -> OrthoResult<()> {
        // An empty path in a file or variable means "not configured".
        self.docker_path = self.docker_path.take().filter(|path| !path.as_str().is_empty());
        self.working_dir = self.working_dir.take().filter(|path| !path.as_str().is_empty());
        Ok(())
    }
}
