//! Semantic error types for buildkeeper.
//!
//! This module defines the error hierarchy for the crate, following the
//! principle of using semantic error enums (via `thiserror`) for conditions the
//! caller might inspect or retry, while reserving opaque errors
//! (`eyre::Report`) for the binary boundary.
//!
//! Every error maps onto exactly one [`ErrorCategory`]. The retry coordinator
//! consults the category, never the concrete variant, when deciding whether a
//! failure is worth another attempt.

use std::path::PathBuf;
use std::sync::Arc;

use camino::Utf8PathBuf;
use thiserror::Error;

use crate::process::CommandResult;

/// Errors that can occur during configuration loading and validation.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The configuration file was not found at the expected path.
    #[error("configuration file not found: {path}")]
    FileNotFound {
        /// The path where the configuration file was expected.
        path: PathBuf,
    },

    /// The configuration file could not be parsed.
    #[error("failed to parse configuration file: {message}")]
    ParseError {
        /// A description of the parse error.
        message: String,
    },

    /// A required configuration value is missing.
    #[error("missing required configuration: {field}")]
    MissingRequired {
        /// The name of the missing field.
        field: String,
    },

    /// A configuration value failed validation.
    #[error("invalid configuration value for '{field}': {reason}")]
    InvalidValue {
        /// The name of the invalid field.
        field: String,
        /// The reason the value is invalid.
        reason: String,
    },

    /// The `OrthoConfig` library returned an error during configuration loading.
    #[error("configuration loading failed: {0}")]
    OrthoConfig(Arc<ortho_config::OrthoError>),
}

/// Errors raised while launching a subprocess or collecting its output.
#[derive(Debug, Error)]
pub enum ProcessError {
    /// The executable does not exist or is not runnable.
    #[error("executable not found: {path}")]
    ExecutableNotFound {
        /// The path that was looked up.
        path: Utf8PathBuf,
    },

    /// The operating system refused to start the process.
    #[error("failed to start '{program}': {source}")]
    SpawnFailed {
        /// The program that failed to start.
        program: Utf8PathBuf,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// Writing input or draining an output stream failed.
    #[error("I/O failure on {stream} of '{program}': {source}")]
    Io {
        /// The program whose stream failed.
        program: Utf8PathBuf,
        /// The stream that failed (`stdin`, `stdout` or `stderr`).
        stream: &'static str,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// Several stream failures happened during one execution.
    #[error(
        "{count} failures while running '{program}': {listing}",
        count = failures.len(),
        listing = enumerate_failures(failures)
    )]
    Multiple {
        /// The program whose streams failed.
        program: Utf8PathBuf,
        /// Each failure, rendered as `kind: message`.
        failures: Vec<String>,
    },
}

/// Errors reported by, or about, the `docker buildx` command-line tool.
#[derive(Debug, Error)]
pub enum BuildxError {
    /// The named builder does not exist.
    #[error("builder '{name}' not found")]
    NotFound {
        /// The builder that was requested.
        name: String,
    },

    /// A builder already exists with a conflicting configuration.
    #[error("builder '{name}' already exists: {message}")]
    Conflict {
        /// The builder that was requested.
        name: String,
        /// The message reported by buildx.
        message: String,
    },

    /// A referenced docker context or remote host could not be resolved.
    #[error("context or host '{context}' could not be resolved")]
    ContextNotFound {
        /// The unresolvable context or host name.
        context: String,
    },

    /// Buildx lost a race updating its own builder state files.
    #[error("concurrent builder state update failed: {message}")]
    ConcurrentUpdate {
        /// The message reported by buildx.
        message: String,
    },

    /// A file was held open by another process (Windows sharing violation).
    #[error("file locked by another process: {message}")]
    FileLocked {
        /// The message reported by buildx.
        message: String,
    },

    /// Buildx exited non-zero with output that matches no known shape.
    #[error("unexpected response: {0}")]
    UnexpectedResponse(Box<CommandResult>),

    /// Buildx output was recognised but violates a record invariant.
    #[error("invalid buildx response: {message}")]
    InvalidResponse {
        /// What was wrong with the response.
        message: String,
    },

    /// A builder name failed validation.
    #[error("invalid builder name '{name}': {reason}")]
    InvalidName {
        /// The rejected name.
        name: String,
        /// Why it was rejected.
        reason: String,
    },
}

/// Errors raised by the retry and polling loops.
#[derive(Debug, Error)]
pub enum WaitError {
    /// The deadline passed before the awaited condition held.
    #[error("timed out: {message}")]
    Timeout {
        /// The last observed state.
        message: String,
    },

    /// The waiting caller was cancelled.
    #[error("operation interrupted")]
    Interrupted,

    /// An operation that should never time out did.
    #[error("internal contract violated: {message}")]
    ContractViolation {
        /// A description of the violation.
        message: String,
    },
}

/// Top-level error type for buildkeeper.
///
/// This enum aggregates all domain-specific errors into a single type that can
/// be used throughout the crate. At the binary boundary (main.rs), these errors
/// are converted to `eyre::Report` for human-readable reporting.
#[derive(Debug, Error)]
pub enum BuildkeeperError {
    /// An error occurred during configuration.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// An error occurred while running a subprocess.
    #[error(transparent)]
    Process(#[from] ProcessError),

    /// Buildx reported, or produced, an error.
    #[error(transparent)]
    Buildx(#[from] BuildxError),

    /// A retry or polling loop gave up.
    #[error(transparent)]
    Wait(#[from] WaitError),
}

/// The category an error belongs to, as seen by the retry boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// The requested resource does not exist.
    NotFound,
    /// The resource exists in an incompatible state.
    Conflict,
    /// An intermittent process or stream failure.
    TransientIo,
    /// A known upstream race that resolves on its own.
    KnownTransient,
    /// A deadline passed.
    Timeout,
    /// Non-zero exit with unrecognised output.
    UnexpectedResponse,
    /// The caller was cancelled.
    Interrupted,
    /// Anything else that must not be retried.
    Terminal,
}

impl ErrorCategory {
    /// Returns whether failures in this category are worth another attempt.
    #[must_use]
    pub const fn is_retryable(self) -> bool {
        matches!(self, Self::TransientIo | Self::KnownTransient)
    }
}

impl BuildkeeperError {
    /// Returns the category this error belongs to.
    #[must_use]
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::Config(_) => ErrorCategory::Terminal,
            Self::Process(error) => process_category(error),
            Self::Buildx(error) => buildx_category(error),
            Self::Wait(WaitError::Timeout { .. }) => ErrorCategory::Timeout,
            Self::Wait(WaitError::Interrupted) => ErrorCategory::Interrupted,
            Self::Wait(WaitError::ContractViolation { .. }) => ErrorCategory::Terminal,
        }
    }

    /// Returns whether the retry coordinator may re-run the failed operation.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        self.category().is_retryable()
    }

    pub(crate) const fn interrupted() -> Self {
        Self::Wait(WaitError::Interrupted)
    }
}

fn process_category(error: &ProcessError) -> ErrorCategory {
    match error {
        ProcessError::ExecutableNotFound { .. } => ErrorCategory::Terminal,
        ProcessError::SpawnFailed { source, .. } => match source.kind() {
            std::io::ErrorKind::NotFound | std::io::ErrorKind::PermissionDenied => {
                ErrorCategory::Terminal
            }
            _ => ErrorCategory::TransientIo,
        },
        ProcessError::Io { .. } | ProcessError::Multiple { .. } => ErrorCategory::TransientIo,
    }
}

const fn buildx_category(error: &BuildxError) -> ErrorCategory {
    match error {
        BuildxError::NotFound { .. } | BuildxError::ContextNotFound { .. } => {
            ErrorCategory::NotFound
        }
        BuildxError::Conflict { .. } => ErrorCategory::Conflict,
        BuildxError::ConcurrentUpdate { .. } => ErrorCategory::KnownTransient,
        BuildxError::FileLocked { .. } => ErrorCategory::TransientIo,
        BuildxError::UnexpectedResponse(_) => ErrorCategory::UnexpectedResponse,
        BuildxError::InvalidResponse { .. } | BuildxError::InvalidName { .. } => {
            ErrorCategory::Terminal
        }
    }
}

fn enumerate_failures(failures: &[String]) -> String {
    failures
        .iter()
        .enumerate()
        .map(|(index, failure)| format!("{}) {failure}", index + 1))
        .collect::<Vec<_>>()
        .join("; ")
}

/// A specialised `Result` type for buildkeeper operations.
pub type Result<T> = std::result::Result<T, BuildkeeperError>;
