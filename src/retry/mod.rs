//! Deadline-bounded retries of transiently failing operations.
//!
//! The coordinator re-runs an operation while its failures classify as
//! retryable, sleeping a fixed backoff between attempts. A retry is only
//! scheduled when the next attempt would still start before the deadline, so
//! an exhausted budget surfaces the last real failure instead of a synthetic
//! timeout.

use std::future::Future;
use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::error::{BuildkeeperError, Result, WaitError};

/// Pause between attempts when none is configured.
pub const DEFAULT_BACKOFF: Duration = Duration::from_millis(100);

/// Budget given to operations retried without an explicit deadline.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// An absolute point in time after which no new attempt may start.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Deadline(Instant);

impl Deadline {
    /// A deadline `timeout` from now.
    #[must_use]
    pub fn after(timeout: Duration) -> Self {
        Self(Instant::now() + timeout)
    }

    /// A deadline at a fixed instant.
    #[must_use]
    pub const fn at(instant: Instant) -> Self {
        Self(instant)
    }

    /// Return the underlying instant.
    #[must_use]
    pub const fn instant(self) -> Instant {
        self.0
    }

    /// Returns whether the current time is past the deadline.
    #[must_use]
    pub fn is_expired(self) -> bool {
        Instant::now() > self.0
    }

    /// Returns whether work starting at `instant` is still within budget.
    #[must_use]
    pub fn allows(self, instant: Instant) -> bool {
        instant <= self.0
    }

    /// Time left before the deadline, or zero once it has passed.
    #[must_use]
    pub fn remaining(self) -> Duration {
        self.0.saturating_duration_since(Instant::now())
    }
}

/// Re-runs operations whose failures are classified as transient.
#[derive(Debug, Clone)]
pub struct RetryCoordinator {
    backoff: Duration,
    default_timeout: Duration,
    cancellation: CancellationToken,
}

impl Default for RetryCoordinator {
    fn default() -> Self {
        Self::new(DEFAULT_BACKOFF, DEFAULT_TIMEOUT)
    }
}

impl RetryCoordinator {
    /// Create a coordinator with a fixed backoff and a default budget.
    #[must_use]
    pub fn new(backoff: Duration, default_timeout: Duration) -> Self {
        Self {
            backoff,
            default_timeout,
            cancellation: CancellationToken::new(),
        }
    }

    /// Abandon waiting between attempts once `token` is cancelled.
    #[must_use]
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = token;
        self
    }

    /// Return the pause between attempts.
    #[must_use]
    pub const fn backoff(&self) -> Duration {
        self.backoff
    }

    /// Return the budget used by [`RetryCoordinator::retry`].
    #[must_use]
    pub const fn default_timeout(&self) -> Duration {
        self.default_timeout
    }

    /// Run `operation` until it succeeds, fails terminally, or the next
    /// attempt would start after `deadline`.
    ///
    /// The operation runs at least once, even when the deadline has already
    /// passed.
    ///
    /// # Errors
    ///
    /// Returns the first non-retryable error unchanged, the last retryable
    /// error once the budget is exhausted, or `WaitError::Interrupted` when
    /// cancelled.
    pub async fn retry_until<T, F, Fut>(&self, deadline: Deadline, mut operation: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut attempt: u32 = 0;
        loop {
            if self.cancellation.is_cancelled() {
                return Err(BuildkeeperError::interrupted());
            }
            attempt = attempt.saturating_add(1);

            let error = match operation().await {
                Ok(value) => return Ok(value),
                Err(error) => error,
            };
            if !error.is_retryable() {
                return Err(error);
            }
            if !deadline.allows(Instant::now() + self.backoff) {
                tracing::debug!(attempt, %error, "retry budget exhausted");
                return Err(error);
            }

            tracing::warn!(
                attempt,
                %error,
                backoff_ms = self.backoff.as_millis(),
                "retrying after transient failure"
            );
            pause(self.backoff, &self.cancellation).await?;
        }
    }

    /// Run `operation` with the default budget.
    ///
    /// Callers of this form do not expect a timeout, so one surfacing from the
    /// operation is reported as a broken internal contract.
    ///
    /// # Errors
    ///
    /// As [`RetryCoordinator::retry_until`], except that
    /// `WaitError::Timeout` becomes `WaitError::ContractViolation`.
    pub async fn retry<T, F, Fut>(&self, operation: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let deadline = Deadline::after(self.default_timeout);
        match self.retry_until(deadline, operation).await {
            Err(BuildkeeperError::Wait(WaitError::Timeout { message })) => {
                Err(WaitError::ContractViolation {
                    message: format!("operation without a deadline timed out: {message}"),
                }
                .into())
            }
            other => other,
        }
    }
}

/// Sleep for `duration` unless `token` is cancelled first.
pub(crate) async fn pause(duration: Duration, token: &CancellationToken) -> Result<()> {
    tokio::select! {
        () = tokio::time::sleep(duration) => Ok(()),
        () = token.cancelled() => Err(BuildkeeperError::interrupted()),
    }
}
