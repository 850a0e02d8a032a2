//! Decoding of buildx command results into typed records or specific errors.
//!
//! Buildx speaks two output formats: labelled text from `inspect` and one JSON
//! document per line from `ls --format json`. A result in the wrong format is
//! rejected rather than guessed at, and a non-zero exit always becomes either
//! a recognised [`KnownFailure`] or an unexpected-response error carrying the
//! complete result.

mod failures;
mod image;
mod inspect;
mod json_lines;
mod records;

use std::sync::Arc;

pub use self::failures::{KnownFailure, KnownFailureHandler};
pub use self::records::{BuilderName, BuilderRecord, DriverKind, ImageId, NodeRecord, NodeStatus};
use crate::error::{BuildkeeperError, BuildxError, Result};
use crate::process::{CommandResult, FailureHandler};

/// Turns raw buildx results into typed values.
pub struct ResponseDecoder;

impl ResponseDecoder {
    /// The failure handler buildx invocations run with.
    #[must_use]
    pub fn failure_handler() -> Arc<dyn FailureHandler> {
        Arc::new(KnownFailureHandler)
    }

    /// Decode `buildx ls --format json`.
    ///
    /// A missing builder decodes to an empty list.
    ///
    /// # Errors
    ///
    /// Returns the recognised failure or `BuildxError::UnexpectedResponse` for
    /// non-zero exits and non-JSON output, and `BuildxError::InvalidResponse`
    /// for documents that violate a record invariant.
    pub fn builders(result: &CommandResult) -> Result<Vec<BuilderRecord>> {
        if reports_missing_builder(result) {
            return Ok(Vec::new());
        }
        ensure_success(result)?;
        if !json_lines::is_json_lines(result.stdout()) {
            return Err(unexpected(result));
        }
        json_lines::parse_builders(result.stdout())
    }

    /// Decode `buildx inspect <name>`.
    ///
    /// A missing builder decodes to `None`.
    ///
    /// # Errors
    ///
    /// Returns the recognised failure or `BuildxError::UnexpectedResponse` for
    /// non-zero exits and JSON output, and `BuildxError::InvalidResponse` for
    /// text that violates a record invariant.
    pub fn builder(result: &CommandResult) -> Result<Option<BuilderRecord>> {
        if reports_missing_builder(result) {
            return Ok(None);
        }
        ensure_success(result)?;
        let text = result.stdout();
        if text.trim_start().starts_with(['{', '[']) {
            return Err(unexpected(result));
        }
        inspect::parse_builder(text).map(Some)
    }

    /// Decode `buildx create`, which prints the name of the new builder.
    ///
    /// # Errors
    ///
    /// Returns the recognised failure (typically a conflict) or
    /// `BuildxError::UnexpectedResponse` for non-zero exits, and
    /// `BuildxError::InvalidResponse` when no valid name was printed.
    pub fn created(result: &CommandResult) -> Result<BuilderName> {
        ensure_success(result)?;
        let name = result
            .stdout_lines()
            .into_iter()
            .map(str::trim)
            .rfind(|line| !line.is_empty())
            .ok_or_else(|| BuildxError::InvalidResponse {
                message: String::from("create printed no builder name"),
            })?;
        BuilderName::new(name)
    }

    /// Decode `buildx rm <name>`; removing a missing builder succeeds.
    ///
    /// # Errors
    ///
    /// Returns the recognised failure or `BuildxError::UnexpectedResponse`.
    pub fn removed(result: &CommandResult) -> Result<()> {
        if reports_missing_builder(result) {
            return Ok(());
        }
        ensure_success(result)
    }

    /// Decode `buildx build`, returning the exported image when there was one.
    ///
    /// # Errors
    ///
    /// Returns the recognised failure or `BuildxError::UnexpectedResponse`.
    pub fn built(result: &CommandResult) -> Result<Option<ImageId>> {
        ensure_success(result)?;
        Ok(image::extract_image_id(result.stderr_lines()))
    }
}

fn reports_missing_builder(result: &CommandResult) -> bool {
    matches!(
        KnownFailure::classify(result),
        Some(KnownFailure::BuilderNotFound { .. })
    )
}

fn ensure_success(result: &CommandResult) -> Result<()> {
    if result.is_success() {
        return Ok(());
    }
    Err(KnownFailure::classify(result)
        .map_or_else(|| unexpected(result), KnownFailure::into_error))
}

fn unexpected(result: &CommandResult) -> BuildkeeperError {
    BuildxError::UnexpectedResponse(Box::new(result.clone())).into()
}
