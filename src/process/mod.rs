//! Subprocess execution with concurrent, deadlock-free output capture.
//!
//! [`ProcessRunner`] starts one external process, writes its optional input on
//! a dedicated task, and drains standard output and standard error on two more
//! tasks. All three tasks are joined before the exit status is consulted:
//! waiting for exit alone does not guarantee that buffered pipe contents have
//! been read.
//!
//! The runner sits behind the [`CommandExecutor`] trait so the buildx client
//! can be unit-tested without spawning anything.

mod drain;

use std::fmt;
use std::future::Future;
use std::io;
use std::pin::Pin;
use std::process::{ExitStatus, Stdio};
use std::sync::Arc;

use camino::Utf8PathBuf;
use tokio::io::AsyncWriteExt;
use tokio::process::{ChildStdin, Command};
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;

use self::drain::{DrainOutcome, LineWatcher, StreamDrainer};
use crate::error::{BuildkeeperError, ProcessError, Result};

/// Decides, per standard-output line, whether to kill the process early.
#[derive(Clone)]
pub struct TerminationPredicate(Arc<dyn Fn(&str) -> bool + Send + Sync>);

impl TerminationPredicate {
    /// Wrap a line predicate.
    pub fn new(predicate: impl Fn(&str) -> bool + Send + Sync + 'static) -> Self {
        Self(Arc::new(predicate))
    }

    /// Returns whether `line` asks for termination.
    #[must_use]
    pub fn matches(&self, line: &str) -> bool {
        (self.0)(line)
    }
}

impl fmt::Debug for TerminationPredicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("TerminationPredicate")
    }
}

/// Hook invoked when a process exits with a non-zero code.
///
/// Implementations inspect the captured output and may replace the generic
/// outcome with a domain-specific error. Returning `Ok(())` hands the result
/// back to the caller unchanged.
pub trait FailureHandler: Send + Sync {
    /// Inspect a failed result.
    ///
    /// # Errors
    ///
    /// Returns the error that should be raised instead of the result.
    fn on_failure(&self, result: &CommandResult) -> Result<()>;
}

/// One external command to run: program, arguments, input and context.
#[derive(Clone)]
pub struct CommandInvocation {
    program: Utf8PathBuf,
    args: Vec<String>,
    input: Vec<u8>,
    working_dir: Option<Utf8PathBuf>,
    terminate_when: Option<TerminationPredicate>,
    failure_handler: Option<Arc<dyn FailureHandler>>,
}

impl CommandInvocation {
    /// Create an invocation of `program` with `args` and no input.
    pub fn new(program: impl Into<Utf8PathBuf>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
            input: Vec::new(),
            working_dir: None,
            terminate_when: None,
            failure_handler: None,
        }
    }

    /// Bytes written to the process's standard input before it is closed.
    #[must_use]
    pub fn with_input(mut self, input: Vec<u8>) -> Self {
        self.input = input;
        self
    }

    /// Directory the process runs in; the caller's directory when unset.
    #[must_use]
    pub fn with_working_dir(mut self, working_dir: Option<Utf8PathBuf>) -> Self {
        self.working_dir = working_dir;
        self
    }

    /// Kill the process as soon as a standard-output line matches.
    #[must_use]
    pub fn terminate_when(mut self, predicate: TerminationPredicate) -> Self {
        self.terminate_when = Some(predicate);
        self
    }

    /// Handler consulted when the process exits non-zero.
    #[must_use]
    pub fn with_failure_handler(mut self, handler: Arc<dyn FailureHandler>) -> Self {
        self.failure_handler = Some(handler);
        self
    }

    /// Return the program path.
    #[must_use]
    pub const fn program(&self) -> &Utf8PathBuf {
        &self.program
    }

    /// Return the argument list.
    #[must_use]
    pub fn args(&self) -> &[String] {
        &self.args
    }

    /// Return the input payload.
    #[must_use]
    pub fn input(&self) -> &[u8] {
        &self.input
    }

    /// Return the working directory, if one was set.
    #[must_use]
    pub const fn working_dir(&self) -> Option<&Utf8PathBuf> {
        self.working_dir.as_ref()
    }
}

impl fmt::Debug for CommandInvocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CommandInvocation")
            .field("program", &self.program)
            .field("args", &self.args)
            .field("input_len", &self.input.len())
            .field("working_dir", &self.working_dir)
            .field("terminate_when", &self.terminate_when.is_some())
            .field("failure_handler", &self.failure_handler.is_some())
            .finish()
    }
}

/// The complete, immutable outcome of one process execution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandResult {
    command: Vec<String>,
    working_dir: Option<Utf8PathBuf>,
    stdout: String,
    stderr: String,
    exit_code: i32,
}

impl CommandResult {
    /// Assemble a result from its parts.
    #[must_use]
    pub const fn new(
        command: Vec<String>,
        working_dir: Option<Utf8PathBuf>,
        stdout: String,
        stderr: String,
        exit_code: i32,
    ) -> Self {
        Self {
            command,
            working_dir,
            stdout,
            stderr,
            exit_code,
        }
    }

    /// Return the program followed by its arguments.
    #[must_use]
    pub fn command(&self) -> &[String] {
        &self.command
    }

    /// Return the working directory the process ran in, if one was set.
    #[must_use]
    pub const fn working_dir(&self) -> Option<&Utf8PathBuf> {
        self.working_dir.as_ref()
    }

    /// Return the captured standard output.
    #[must_use]
    pub fn stdout(&self) -> &str {
        &self.stdout
    }

    /// Return the captured standard error.
    #[must_use]
    pub fn stderr(&self) -> &str {
        &self.stderr
    }

    /// Return the exit code; `128 + signal` for signalled processes on Unix.
    #[must_use]
    pub const fn exit_code(&self) -> i32 {
        self.exit_code
    }

    /// Returns whether the process exited with code zero.
    #[must_use]
    pub const fn is_success(&self) -> bool {
        self.exit_code == 0
    }

    /// Split standard output into lines, keeping blank lines.
    #[must_use]
    pub fn stdout_lines(&self) -> Vec<&str> {
        split_lines(&self.stdout)
    }

    /// Split standard error into lines, keeping blank lines.
    #[must_use]
    pub fn stderr_lines(&self) -> Vec<&str> {
        split_lines(&self.stderr)
    }
}

impl fmt::Display for CommandResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "`{}` exited with code {} in {}",
            self.command.join(" "),
            self.exit_code,
            self.working_dir
                .as_ref()
                .map_or("the current directory", |dir| dir.as_str()),
        )?;
        write!(f, "\nstdout:\n{}", self.stdout)?;
        write!(f, "\nstderr:\n{}", self.stderr)
    }
}

/// Split text on `\n`, `\r\n` and lone `\r`, keeping blank lines.
///
/// A trailing terminator does not produce a final empty line.
pub(crate) fn split_lines(text: &str) -> Vec<&str> {
    let mut lines = Vec::new();
    let mut start = 0;
    let mut chars = text.char_indices().peekable();
    while let Some((index, ch)) = chars.next() {
        if ch != '\n' && ch != '\r' {
            continue;
        }
        lines.push(text.get(start..index).unwrap_or_default());
        start = index + 1;
        if ch == '\r' && chars.next_if(|&(_, next)| next == '\n').is_some() {
            start += 1;
        }
    }
    if start < text.len() {
        lines.push(text.get(start..).unwrap_or_default());
    }
    lines
}

/// Boxed future type returned by [`CommandExecutor::execute`].
pub type ExecuteFuture<'a> = Pin<Box<dyn Future<Output = Result<CommandResult>> + Send + 'a>>;

/// Behaviour required to run one command invocation.
///
/// This abstraction keeps the buildx client testable without a real
/// executable.
pub trait CommandExecutor {
    /// Run the invocation to completion.
    fn execute(&self, invocation: CommandInvocation) -> ExecuteFuture<'_>;
}

/// Runs external processes and captures their output.
#[derive(Debug, Clone, Default)]
pub struct ProcessRunner {
    cancellation: CancellationToken,
}

impl ProcessRunner {
    /// Create a runner that is never interrupted.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Stop waiting, without killing the process, once `token` is cancelled.
    #[must_use]
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = token;
        self
    }

    /// Run `invocation` to completion and capture everything it printed.
    ///
    /// # Errors
    ///
    /// Returns `ProcessError::ExecutableNotFound` when the program does not
    /// exist, `ProcessError::SpawnFailed` when it cannot be started, and
    /// `ProcessError::Io` or `ProcessError::Multiple` when writing input or
    /// draining output failed. Returns `WaitError::Interrupted` when the
    /// runner's cancellation token fires first. When the exit code is non-zero
    /// any error raised by the invocation's failure handler is returned.
    pub async fn run(&self, invocation: CommandInvocation) -> Result<CommandResult> {
        let CommandInvocation {
            program,
            args,
            input,
            working_dir,
            terminate_when,
            failure_handler,
        } = invocation;

        let mut command = Command::new(program.as_std_path());
        command
            .args(&args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(false);
        if let Some(dir) = &working_dir {
            command.current_dir(dir);
        }

        tracing::debug!(%program, ?args, "starting process");
        let mut child = command
            .spawn()
            .map_err(|source| spawn_error(&program, source))?;

        let (Some(stdin), Some(stdout), Some(stderr)) =
            (child.stdin.take(), child.stdout.take(), child.stderr.take())
        else {
            return Err(ProcessError::Io {
                program,
                stream: "stdio",
                source: io::Error::other("child stdio was not piped"),
            }
            .into());
        };

        let kill = Arc::new(Notify::new());
        let watcher = terminate_when.map(|predicate| LineWatcher {
            predicate,
            kill: Arc::clone(&kill),
        });
        let writer = tokio::spawn(write_input(stdin, input));
        let stdout_task =
            tokio::spawn(StreamDrainer::new("stdout", stdout).watching(watcher).drain());
        let stderr_task = tokio::spawn(StreamDrainer::new("stderr", stderr).drain());

        let joined = async { tokio::join!(writer, stdout_task, stderr_task) };
        tokio::pin!(joined);
        let (write_outcome, stdout_outcome, stderr_outcome) = loop {
            tokio::select! {
                outcome = &mut joined => break outcome,
                () = kill.notified() => {
                    tracing::debug!(%program, "terminating process early");
                    if let Err(error) = child.start_kill() {
                        tracing::warn!(%program, %error, "failed to kill process");
                    }
                }
                () = self.cancellation.cancelled() => {
                    return Err(BuildkeeperError::interrupted());
                }
            }
        };

        let mut stdout_drain = drain_outcome(stdout_outcome);
        let mut stderr_drain = drain_outcome(stderr_outcome);
        combine_failures(
            &program,
            vec![
                ("stdin", write_failure(write_outcome)),
                ("stdout", stdout_drain.failure.take()),
                ("stderr", stderr_drain.failure.take()),
            ],
        )?;

        let status = tokio::select! {
            status = child.wait() => status.map_err(|source| ProcessError::Io {
                program: program.clone(),
                stream: "exit status",
                source,
            })?,
            () = self.cancellation.cancelled() => return Err(BuildkeeperError::interrupted()),
        };

        let mut command_line = Vec::with_capacity(args.len() + 1);
        command_line.push(program.to_string());
        command_line.extend(args);
        let result = CommandResult::new(
            command_line,
            working_dir,
            stdout_drain.text(),
            stderr_drain.text(),
            exit_code(status),
        );
        tracing::debug!(%program, exit_code = result.exit_code(), "process finished");

        if let Some(handler) = failure_handler.filter(|_| !result.is_success()) {
            handler.on_failure(&result)?;
        }
        Ok(result)
    }
}

impl CommandExecutor for ProcessRunner {
    fn execute(&self, invocation: CommandInvocation) -> ExecuteFuture<'_> {
        Box::pin(self.run(invocation))
    }
}

fn spawn_error(program: &Utf8PathBuf, source: io::Error) -> BuildkeeperError {
    if source.kind() == io::ErrorKind::NotFound {
        ProcessError::ExecutableNotFound {
            path: program.clone(),
        }
        .into()
    } else {
        ProcessError::SpawnFailed {
            program: program.clone(),
            source,
        }
        .into()
    }
}

/// Feed `input` to the child and close its stdin.
///
/// A child that exits without reading all of its input closes the pipe
/// first; the exit status and failure handler report that outcome instead.
async fn write_input(mut stdin: ChildStdin, input: Vec<u8>) -> io::Result<()> {
    if input.is_empty() {
        return Ok(());
    }
    let written = match stdin.write_all(&input).await {
        Ok(()) => stdin.shutdown().await,
        Err(error) => Err(error),
    };
    match written {
        Err(error) if error.kind() == io::ErrorKind::BrokenPipe => {
            tracing::debug!("child closed stdin before reading all input");
            Ok(())
        }
        other => other,
    }
}

fn write_failure(
    outcome: std::result::Result<io::Result<()>, tokio::task::JoinError>,
) -> Option<io::Error> {
    match outcome {
        Ok(Ok(())) => None,
        Ok(Err(error)) => Some(error),
        Err(join_error) => Some(io::Error::other(join_error.to_string())),
    }
}

fn drain_outcome(
    outcome: std::result::Result<DrainOutcome, tokio::task::JoinError>,
) -> DrainOutcome {
    outcome.unwrap_or_else(|join_error| {
        DrainOutcome::failed(io::Error::other(join_error.to_string()))
    })
}

/// Fold stream failures into nothing, one I/O error, or one aggregate.
fn combine_failures(
    program: &Utf8PathBuf,
    failures: Vec<(&'static str, Option<io::Error>)>,
) -> Result<()> {
    let mut present: Vec<(&'static str, io::Error)> = failures
        .into_iter()
        .filter_map(|(stream, failure)| failure.map(|error| (stream, error)))
        .collect();

    if present.len() > 1 {
        return Err(ProcessError::Multiple {
            program: program.clone(),
            failures: present
                .iter()
                .map(|(stream, error)| format!("{stream} {:?}: {error}", error.kind()))
                .collect(),
        }
        .into());
    }

    match present.pop() {
        None => Ok(()),
        Some((stream, source)) => Err(ProcessError::Io {
            program: program.clone(),
            stream,
            source,
        }
        .into()),
    }
}

fn exit_code(status: ExitStatus) -> i32 {
    if let Some(code) = status.code() {
        return code;
    }
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(signal) = status.signal() {
            return 128 + signal;
        }
    }
    -1
}
