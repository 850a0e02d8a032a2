//! Buildx builder and build management.
//!
//! This module provides the typed client for `docker buildx`. The docker
//! executable is resolved through a priority-based fallback chain:
//!
//! 1. CLI argument (`--docker`)
//! 2. Config file (`docker_path` in TOML) or `BUILDKEEPER_DOCKER_PATH`
//! 3. `BUILDKEEPER_DOCKER` environment variable
//! 4. The first `docker` executable on `PATH`

mod client;
mod requests;
mod resolver;

pub use client::BuildxClient;
pub use requests::{BuildRequest, CreateBuilderRequest, Dockerfile};
pub use resolver::{DOCKER_ENV_VAR, ExecutableResolver};
