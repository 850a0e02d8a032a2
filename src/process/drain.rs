//! Line-oriented draining of one subprocess output stream.

use std::io;
use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::sync::Notify;

use super::{TerminationPredicate, split_lines};

/// Requests early termination when a watched line matches.
pub(super) struct LineWatcher {
    pub(super) predicate: TerminationPredicate,
    pub(super) kill: Arc<Notify>,
}

/// Everything a drainer collected, including a failure that stopped it.
#[derive(Debug, Default)]
pub(super) struct DrainOutcome {
    pub(super) lines: Vec<String>,
    pub(super) failure: Option<io::Error>,
}

impl DrainOutcome {
    pub(super) fn failed(error: io::Error) -> Self {
        Self {
            lines: Vec::new(),
            failure: Some(error),
        }
    }

    /// Render the collected lines as newline-terminated text.
    pub(super) fn text(&self) -> String {
        let mut text = String::with_capacity(self.lines.iter().map(|line| line.len() + 1).sum());
        for line in &self.lines {
            text.push_str(line);
            text.push('\n');
        }
        text
    }
}

/// Read failures tolerated in a row before a drainer gives up on its stream.
const MAX_CONSECUTIVE_FAILURES: usize = 8;

/// Consumes one output stream to the end, reading past transient failures.
pub(super) struct StreamDrainer<R> {
    stream: &'static str,
    reader: R,
    watcher: Option<LineWatcher>,
}

impl<R: AsyncRead + Unpin> StreamDrainer<R> {
    pub(super) const fn new(stream: &'static str, reader: R) -> Self {
        Self {
            stream,
            reader,
            watcher: None,
        }
    }

    pub(super) fn watching(mut self, watcher: Option<LineWatcher>) -> Self {
        self.watcher = watcher;
        self
    }

    /// Read until end of stream, collecting lines and the first failure.
    ///
    /// Bytes are decoded lossily, so invalid UTF-8 never aborts the drain. A
    /// failed read is recorded and reading resumes; only a run of
    /// `MAX_CONSECUTIVE_FAILURES` failures abandons the stream.
    pub(super) async fn drain(self) -> DrainOutcome {
        let Self {
            stream,
            reader,
            watcher,
        } = self;
        let mut buffered = BufReader::new(reader);
        let mut outcome = DrainOutcome::default();
        let mut buffer = Vec::new();
        let mut kill_requested = false;
        let mut consecutive_failures = 0;

        loop {
            match buffered.read_until(b'\n', &mut buffer).await {
                Ok(0) => {
                    collect(stream, &buffer, watcher.as_ref(), &mut kill_requested, &mut outcome);
                    return outcome;
                }
                Ok(_) => {
                    consecutive_failures = 0;
                    collect(stream, &buffer, watcher.as_ref(), &mut kill_requested, &mut outcome);
                    buffer.clear();
                }
                Err(error) => {
                    consecutive_failures += 1;
                    tracing::debug!(stream, %error, consecutive_failures, "stream read failed");
                    if outcome.failure.is_none() {
                        outcome.failure = Some(error);
                    }
                    if consecutive_failures >= MAX_CONSECUTIVE_FAILURES {
                        tracing::warn!(stream, "abandoning stream after repeated read failures");
                        return outcome;
                    }
                }
            }
        }
    }
}

/// Split `chunk` into lines, firing the watcher on the first match.
fn collect(
    stream: &'static str,
    chunk: &[u8],
    watcher: Option<&LineWatcher>,
    kill_requested: &mut bool,
    outcome: &mut DrainOutcome,
) {
    let text = String::from_utf8_lossy(chunk);
    for line in split_lines(&text) {
        tracing::trace!(stream, line, "drained line");
        if let Some(active) =
            watcher.filter(|active| !*kill_requested && active.predicate.matches(line))
        {
            *kill_requested = true;
            active.kill.notify_one();
        }
        outcome.lines.push(line.to_owned());
    }
}
