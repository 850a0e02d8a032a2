//! Recognition of the buildx error messages callers can act on.
//!
//! Every message shape buildkeeper understands lives in [`PATTERNS`]. Buildx
//! does not version its error text, so a change upstream is contained here.

use std::sync::LazyLock;

use regex::Regex;

use crate::error::{BuildkeeperError, BuildxError, Result};
use crate::process::{CommandResult, FailureHandler};

/// The kind of failure a pattern recognises.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Shape {
    BuilderNotFound,
    ExistingInstance,
    ContextNotFound,
    ConcurrentUpdate,
    FileLocked,
}

struct Pattern {
    shape: Shape,
    regex: Regex,
}

/// Known failure messages, checked in order against each stderr line.
///
/// Patterns with a `subject` group capture the builder, context or host the
/// message is about. The state-file race is only recognised on buildx's own
/// `ERROR:` lines, since build steps write arbitrary text to the same stream.
#[expect(clippy::expect_used, reason = "patterns are compile-time constants")]
static PATTERNS: LazyLock<Vec<Pattern>> = LazyLock::new(|| {
    [
        (Shape::BuilderNotFound, r#"no builder "(?P<subject>[^"]+)" found"#),
        (
            Shape::ExistingInstance,
            r#"existing instance for "(?P<subject>[^"]+)" but no append mode"#,
        ),
        (
            Shape::ContextNotFound,
            r#"context "(?P<subject>[^"]+)"(?::)? (?:does not exist|not found)"#,
        ),
        (
            Shape::ContextNotFound,
            r"lookup (?P<subject>[^\s:]+)(?: on \S+)?: no such host",
        ),
        (
            Shape::ConcurrentUpdate,
            r"failed to update builder last activity time",
        ),
        (
            Shape::ConcurrentUpdate,
            r"(?i)^\s*ERROR:.*buildx[/\\](?:instances|activity)[/\\]\S+.*(?:no such file or directory|file exists|cannot find the file)",
        ),
        (
            Shape::FileLocked,
            r"The process cannot access the file because it is being used by another process",
        ),
    ]
    .into_iter()
    .map(|(shape, source)| Pattern {
        shape,
        regex: Regex::new(source).expect("constant regex pattern is valid"),
    })
    .collect()
});

/// A recognised failure, extracted from a non-zero result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KnownFailure {
    /// `no builder "<name>" found`.
    BuilderNotFound {
        /// The missing builder.
        name: String,
    },
    /// `existing instance for "<name>" but no append mode`.
    ExistingInstance {
        /// The builder that already exists.
        name: String,
        /// The full message line.
        message: String,
    },
    /// A docker context or remote host could not be resolved.
    ContextNotFound {
        /// The context or host name.
        context: String,
    },
    /// Buildx raced another process updating its state files.
    ConcurrentUpdate {
        /// The full message line.
        message: String,
    },
    /// A Windows sharing violation.
    FileLocked {
        /// The full message line.
        message: String,
    },
}

impl KnownFailure {
    /// Match the standard error of `result` against the known patterns.
    ///
    /// Results with a zero exit code are never classified.
    #[must_use]
    pub fn classify(result: &CommandResult) -> Option<Self> {
        if result.is_success() {
            return None;
        }
        result.stderr_lines().into_iter().find_map(recognise)
    }

    /// Convert into the error callers should see.
    #[must_use]
    pub fn into_error(self) -> BuildkeeperError {
        match self {
            Self::BuilderNotFound { name } => BuildxError::NotFound { name },
            Self::ExistingInstance { name, message } => BuildxError::Conflict { name, message },
            Self::ContextNotFound { context } => BuildxError::ContextNotFound { context },
            Self::ConcurrentUpdate { message } => BuildxError::ConcurrentUpdate { message },
            Self::FileLocked { message } => BuildxError::FileLocked { message },
        }
        .into()
    }
}

fn recognise(line: &str) -> Option<KnownFailure> {
    PATTERNS.iter().find_map(|pattern| {
        let captures = pattern.regex.captures(line)?;
        let subject = captures
            .name("subject")
            .map_or_else(String::new, |m| String::from(m.as_str()));
        let message = String::from(message_text(line));
        Some(match pattern.shape {
            Shape::BuilderNotFound => KnownFailure::BuilderNotFound { name: subject },
            Shape::ExistingInstance => KnownFailure::ExistingInstance {
                name: subject,
                message,
            },
            Shape::ContextNotFound => KnownFailure::ContextNotFound { context: subject },
            Shape::ConcurrentUpdate => KnownFailure::ConcurrentUpdate { message },
            Shape::FileLocked => KnownFailure::FileLocked { message },
        })
    })
}

fn message_text(line: &str) -> &str {
    let trimmed = line.trim();
    trimmed
        .strip_prefix("ERROR:")
        .map_or(trimmed, str::trim_start)
}

/// Raises domain errors for recognised failures while a process is running.
///
/// A missing builder is left to the decoder, since removal and inspection
/// treat it as an ordinary outcome.
#[derive(Debug, Clone, Copy, Default)]
pub struct KnownFailureHandler;

impl FailureHandler for KnownFailureHandler {
    fn on_failure(&self, result: &CommandResult) -> Result<()> {
        match KnownFailure::classify(result) {
            None | Some(KnownFailure::BuilderNotFound { .. }) => Ok(()),
            Some(failure) => Err(failure.into_error()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCategory;
    use rstest::rstest;

    fn failed(stderr: &str) -> CommandResult {
        CommandResult::new(
            vec![String::from("docker"), String::from("buildx")],
            None,
            String::new(),
            String::from(stderr),
            1,
        )
    }

    #[rstest]
    #[case(
        "ERROR: no builder \"b1\" found\n",
        KnownFailure::BuilderNotFound { name: String::from("b1") }
    )]
    #[case(
        "ERROR: existing instance for \"b1\" but no append mode, specify the node name to make changes for existing instances\n",
        KnownFailure::ExistingInstance {
            name: String::from("b1"),
            message: String::from(
                "existing instance for \"b1\" but no append mode, specify the node name to make changes for existing instances",
            ),
        }
    )]
    #[case(
        "ERROR: context \"staging\" does not exist\n",
        KnownFailure::ContextNotFound { context: String::from("staging") }
    )]
    #[case(
        "ERROR: dial tcp: lookup buildkitd.internal on 127.0.0.53:53: no such host\n",
        KnownFailure::ContextNotFound { context: String::from("buildkitd.internal") }
    )]
    #[case(
        "#1 loading\nERROR: failed to update builder last activity time: rename tmp: no such file\n",
        KnownFailure::ConcurrentUpdate {
            message: String::from(
                "failed to update builder last activity time: rename tmp: no such file",
            ),
        }
    )]
    #[case(
        "ERROR: open /root/.docker/buildx/instances/b1: no such file or directory\n",
        KnownFailure::ConcurrentUpdate {
            message: String::from(
                "open /root/.docker/buildx/instances/b1: no such file or directory",
            ),
        }
    )]
    #[case(
        "ERROR: open C:\\Users\\ci\\.docker\\buildx\\activity\\b1: The process cannot access the file because it is being used by another process.\r\n",
        KnownFailure::FileLocked {
            message: String::from(
                "open C:\\Users\\ci\\.docker\\buildx\\activity\\b1: The process cannot access the file because it is being used by another process.",
            ),
        }
    )]
    fn classify_recognises_known_messages(#[case] stderr: &str, #[case] expected: KnownFailure) {
        assert_eq!(KnownFailure::classify(&failed(stderr)), Some(expected));
    }

    #[rstest]
    fn zero_exit_is_never_classified() {
        let result = CommandResult::new(
            Vec::new(),
            None,
            String::new(),
            String::from("ERROR: no builder \"b1\" found\n"),
            0,
        );
        assert_eq!(KnownFailure::classify(&result), None);
    }

    #[rstest]
    #[case("ERROR: out of disk\n")]
    #[case(
        "#7 [2/2] RUN cat /root/.docker/buildx/instances/b1\n#7 0.312 cat: /root/.docker/buildx/instances/b1: No such file or directory\n#7 ERROR: process did not complete successfully: exit code: 1\n"
    )]
    fn unrecognised_stderr_is_not_classified(#[case] stderr: &str) {
        assert_eq!(KnownFailure::classify(&failed(stderr)), None);
    }

    #[rstest]
    #[case("ERROR: existing instance for \"b1\" but no append mode\n", Some(ErrorCategory::Conflict))]
    #[case("ERROR: failed to update builder last activity time\n", Some(ErrorCategory::KnownTransient))]
    #[case("ERROR: no builder \"b1\" found\n", None)]
    #[case("ERROR: out of disk\n", None)]
    fn handler_raises_all_but_missing_builders(
        #[case] stderr: &str,
        #[case] expected: Option<ErrorCategory>,
    ) {
        let outcome = KnownFailureHandler.on_failure(&failed(stderr));
        assert_eq!(outcome.err().map(|error| error.category()), expected);
    }
}
