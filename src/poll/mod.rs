//! Polling a builder until its first node reaches a target status.

use std::fmt;
use std::future::Future;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::decode::{BuilderName, BuilderRecord, NodeStatus};
use crate::error::{Result, WaitError};
use crate::retry::{Deadline, pause};

/// Pause between polls when none is configured.
pub const DEFAULT_INTERVAL: Duration = Duration::from_millis(100);

/// What one poll observed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollState {
    /// The builder, or its first node, does not exist.
    Absent,
    /// The builder exists in another status.
    Pending {
        /// The first node's status.
        status: NodeStatus,
        /// The first node's error text, empty when there is none.
        error: String,
    },
    /// The builder reached the target status.
    Ready,
}

impl PollState {
    /// Classify a fetched builder against `target`.
    #[must_use]
    pub fn observe(builder: Option<&BuilderRecord>, target: NodeStatus) -> Self {
        match builder.and_then(BuilderRecord::primary_node) {
            None => Self::Absent,
            Some(node) if node.status() == target => Self::Ready,
            Some(node) => Self::Pending {
                status: node.status(),
                error: String::from(node.error()),
            },
        }
    }
}

impl fmt::Display for PollState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Absent => f.write_str("absent"),
            Self::Ready => f.write_str("ready"),
            Self::Pending { status, error } if *status == NodeStatus::Error => {
                write!(f, "{status} ({error})")
            }
            Self::Pending { status, .. } => write!(f, "{status}"),
        }
    }
}

/// Repeatedly fetches a builder until it reports the awaited status.
#[derive(Debug, Clone)]
pub struct ReadinessPoller {
    interval: Duration,
    cancellation: CancellationToken,
}

impl Default for ReadinessPoller {
    fn default() -> Self {
        Self::new(DEFAULT_INTERVAL)
    }
}

impl ReadinessPoller {
    /// Create a poller that sleeps `interval` between fetches.
    #[must_use]
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            cancellation: CancellationToken::new(),
        }
    }

    /// Abandon polling once `token` is cancelled.
    #[must_use]
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = token;
        self
    }

    /// Return the pause between fetches.
    #[must_use]
    pub const fn interval(&self) -> Duration {
        self.interval
    }

    /// Fetch `name` until its first node reports `target`, returning that
    /// record.
    ///
    /// A builder already at `target` returns after one fetch without
    /// sleeping.
    ///
    /// # Errors
    ///
    /// Propagates fetch errors unchanged. Returns `WaitError::Timeout` naming
    /// the last observed state once `deadline` has passed, and
    /// `WaitError::Interrupted` when cancelled between fetches.
    pub async fn wait_until_status<F, Fut>(
        &self,
        name: &BuilderName,
        target: NodeStatus,
        deadline: Deadline,
        mut fetch: F,
    ) -> Result<BuilderRecord>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<Option<BuilderRecord>>>,
    {
        loop {
            let builder = fetch().await?;
            let state = PollState::observe(builder.as_ref(), target);
            tracing::debug!(builder = %name, %target, %state, "polled builder");

            if let Some(record) = builder.filter(|_| state == PollState::Ready) {
                return Ok(record);
            }
            if deadline.is_expired() {
                return Err(WaitError::Timeout {
                    message: format!(
                        "builder '{name}' did not reach status {target}; last observed: {state}"
                    ),
                }
                .into());
            }
            pause(self.interval, &self.cancellation).await?;
        }
    }
}
