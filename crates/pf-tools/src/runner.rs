//! The [`StageRunner`] seam between the orchestrator and real processes.

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use pf_core::LogSink;
use tokio_util::sync::CancellationToken;

use crate::command::{ProcessErrorKind, ProcessResult, ToolCommand, DEFAULT_TAIL_LINES};

/// Runs one external process to completion.
///
/// `argv[0]` is the executable and the remaining tokens are its arguments.
/// Implementations stream output into `sink` while the process runs and
/// reduce the outcome to a [`ProcessResult`]; they never panic on a missing
/// binary.
#[async_trait]
pub trait StageRunner: Send + Sync {
    async fn execute(
        &self,
        argv: &[String],
        working_dir: &Path,
        sink: &dyn LogSink,
        cancel: &CancellationToken,
    ) -> ProcessResult;
}

/// [`StageRunner`] backed by [`ToolCommand`].
#[derive(Debug, Clone)]
pub struct ToolRunner {
    tail_lines: usize,
    timeout: Option<Duration>,
}

impl Default for ToolRunner {
    fn default() -> Self {
        Self {
            tail_lines: DEFAULT_TAIL_LINES,
            timeout: None,
        }
    }
}

impl ToolRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder: number of trailing lines kept per process.
    pub fn with_tail_lines(mut self, n: usize) -> Self {
        self.tail_lines = n;
        self
    }

    /// Builder: kill processes that run longer than `timeout`.
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }
}

#[async_trait]
impl StageRunner for ToolRunner {
    async fn execute(
        &self,
        argv: &[String],
        working_dir: &Path,
        sink: &dyn LogSink,
        cancel: &CancellationToken,
    ) -> ProcessResult {
        let Some((program, args)) = argv.split_first() else {
            return ProcessResult::failure(
                None,
                ProcessErrorKind::SpawnFailure("empty command line".into()),
                Vec::new(),
            );
        };

        sink.write(&format!("Executing: {}\n", argv.join(" ")));

        let mut cmd = ToolCommand::new(PathBuf::from(program));
        cmd.args(args.iter().cloned())
            .current_dir(working_dir)
            .tail_lines(self.tail_lines)
            .cancellation(cancel.clone());
        if let Some(timeout) = self.timeout {
            cmd.timeout(timeout);
        }

        let result = cmd.execute_streaming(sink).await;

        match &result.error {
            None => {}
            Some(ProcessErrorKind::NonZeroExit(Some(code))) => {
                sink.write(&format!("Command failed with exit code {code}\n"));
            }
            Some(ProcessErrorKind::NonZeroExit(None)) => {
                sink.write("Command terminated by signal\n");
            }
            Some(ProcessErrorKind::SpawnFailure(cause)) => {
                sink.write(&format!("Error executing command: {cause}\n"));
            }
            Some(ProcessErrorKind::TimedOut) => sink.write("Command timed out\n"),
            Some(ProcessErrorKind::Cancelled) => sink.write("Command cancelled\n"),
            Some(ProcessErrorKind::Io(message)) => {
                sink.write(&format!("Error reading command output: {message}\n"));
            }
        }

        result
    }
}
