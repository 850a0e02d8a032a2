//! Typed operations on buildx builders and builds.
//!
//! Every operation runs one buildx command through a [`CommandExecutor`],
//! retries transient failures under a deadline, and decodes the result. The
//! executor is a trait so the client can be exercised without docker.

use camino::{Utf8Path, Utf8PathBuf};

use super::requests::{BuildRequest, CreateBuilderRequest, inspect_args, list_args, remove_args};
use crate::decode::{BuilderName, BuilderRecord, ImageId, NodeStatus, ResponseDecoder};
use crate::error::Result;
use crate::poll::ReadinessPoller;
use crate::process::{CommandExecutor, CommandInvocation, CommandResult, ProcessRunner};
use crate::retry::{Deadline, RetryCoordinator};

/// Client for the `docker buildx` command-line tool.
#[derive(Debug, Clone)]
pub struct BuildxClient<C = ProcessRunner> {
    executor: C,
    docker: Utf8PathBuf,
    working_dir: Option<Utf8PathBuf>,
    retry: RetryCoordinator,
    poller: ReadinessPoller,
}

impl<C: CommandExecutor> BuildxClient<C> {
    /// Create a client running `docker` through `executor` with default retry
    /// and polling settings.
    pub fn new(executor: C, docker: impl Into<Utf8PathBuf>) -> Self {
        Self {
            executor,
            docker: docker.into(),
            working_dir: None,
            retry: RetryCoordinator::default(),
            poller: ReadinessPoller::default(),
        }
    }

    /// Run every command in `working_dir`.
    #[must_use]
    pub fn with_working_dir(mut self, working_dir: Option<Utf8PathBuf>) -> Self {
        self.working_dir = working_dir;
        self
    }

    /// Replace the retry settings.
    #[must_use]
    pub fn with_retry(mut self, retry: RetryCoordinator) -> Self {
        self.retry = retry;
        self
    }

    /// Replace the polling settings.
    #[must_use]
    pub fn with_poller(mut self, poller: ReadinessPoller) -> Self {
        self.poller = poller;
        self
    }

    /// Return the docker executable this client runs.
    #[must_use]
    pub fn docker(&self) -> &Utf8Path {
        &self.docker
    }

    /// List every builder.
    ///
    /// # Errors
    ///
    /// Returns the decoded failure once retries are exhausted or a failure is
    /// not retryable.
    pub async fn list_builders(&self) -> Result<Vec<BuilderRecord>> {
        let invocation = self.invocation(list_args());
        self.run(&invocation, None, ResponseDecoder::builders).await
    }

    /// Describe one builder, or `None` when it does not exist.
    ///
    /// # Errors
    ///
    /// Returns the decoded failure once retries are exhausted or a failure is
    /// not retryable.
    pub async fn inspect_builder(&self, name: &BuilderName) -> Result<Option<BuilderRecord>> {
        let invocation = self.invocation(inspect_args(name));
        self.run(&invocation, None, ResponseDecoder::builder).await
    }

    /// Create a builder and return its name.
    ///
    /// # Errors
    ///
    /// Returns `BuildxError::Conflict` when the builder already exists, or the
    /// decoded failure of any other unsuccessful attempt.
    pub async fn create_builder(&self, request: &CreateBuilderRequest) -> Result<BuilderName> {
        let invocation = self.invocation(request.to_args());
        let created = self
            .run(&invocation, None, ResponseDecoder::created)
            .await?;
        tracing::info!(builder = %created, "created builder");
        Ok(created)
    }

    /// Remove a builder; removing a missing builder succeeds.
    ///
    /// # Errors
    ///
    /// Returns the decoded failure once retries are exhausted or a failure is
    /// not retryable.
    pub async fn remove_builder(&self, name: &BuilderName) -> Result<()> {
        let invocation = self.invocation(remove_args(name));
        self.run(&invocation, None, ResponseDecoder::removed).await?;
        tracing::info!(builder = %name, "removed builder");
        Ok(())
    }

    /// Build an image, returning its identifier when one was exported.
    ///
    /// An inline Dockerfile is written to the process's standard input.
    ///
    /// # Errors
    ///
    /// Returns the decoded failure once retries are exhausted or a failure is
    /// not retryable.
    pub async fn build_image(&self, request: &BuildRequest) -> Result<Option<ImageId>> {
        let invocation = self
            .invocation(request.to_args())
            .with_input(request.input());
        self.run(&invocation, None, ResponseDecoder::built).await
    }

    /// Wait until the first node of `name` reports `target`.
    ///
    /// Each poll runs a retried inspection bounded by the same `deadline`.
    ///
    /// # Errors
    ///
    /// Returns `WaitError::Timeout` once `deadline` passes, or the failure of
    /// an inspection.
    pub async fn wait_until_status(
        &self,
        name: &BuilderName,
        target: NodeStatus,
        deadline: Deadline,
    ) -> Result<BuilderRecord> {
        let invocation = self.invocation(inspect_args(name));
        self.poller
            .wait_until_status(name, target, deadline, || {
                self.run(&invocation, Some(deadline), ResponseDecoder::builder)
            })
            .await
    }

    fn invocation(&self, args: Vec<String>) -> CommandInvocation {
        CommandInvocation::new(self.docker.clone(), args)
            .with_working_dir(self.working_dir.clone())
            .with_failure_handler(ResponseDecoder::failure_handler())
    }

    /// Execute `invocation` under retry and decode each attempt's result.
    ///
    /// Decoding happens inside the retried operation so that transient
    /// failures recognised from the output are retried too.
    async fn run<T, D>(
        &self,
        invocation: &CommandInvocation,
        deadline: Option<Deadline>,
        decode: D,
    ) -> Result<T>
    where
        D: Fn(&CommandResult) -> Result<T>,
    {
        let executor = &self.executor;
        let decoder = &decode;
        let attempt = || {
            let attempt_invocation = invocation.clone();
            async move {
                let result = executor.execute(attempt_invocation).await?;
                decoder(&result)
            }
        };
        match deadline {
            Some(limit) => self.retry.retry_until(limit, attempt).await,
            None => self.retry.retry(attempt).await,
        }
    }
}
