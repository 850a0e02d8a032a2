//! Configuration system for buildkeeper.
//!
//! This module provides the configuration structures and CLI definitions for the
//! buildkeeper binary. Configuration loading and precedence merging is handled by
//! the `ortho_config` crate: CLI flags override environment variables, which
//! override configuration files, which override defaults.
//!
//! The configuration file is expected at `~/.config/buildkeeper/config.toml` by
//! default.
//!
//! # Example Configuration
//!
//! ```toml
//! docker_path = "/usr/local/bin/docker"
//! working_dir = "/srv/app"
//!
//! [retry]
//! timeout_secs = 30
//! backoff_ms = 100
//!
//! [poll]
//! interval_ms = 100
//! timeout_secs = 60
//! ```

mod cli;
mod loader;
mod types;

#[cfg(test)]
mod tests;

pub use cli::{BuildArgs, Cli, Commands, CreateArgs, InspectArgs, RemoveArgs, WaitArgs};
pub use loader::{CONFIG_PATH_ENV_VAR, env_var_names, load_config};
pub use types::{AppConfig, PollConfig, RetryConfig};
