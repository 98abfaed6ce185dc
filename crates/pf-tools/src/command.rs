//! Builder for executing external tool commands with streamed output.

use std::collections::VecDeque;
use std::os::fd::OwnedFd;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use pf_core::LogSink;
use serde::Serialize;
use tokio::io::AsyncReadExt;
use tokio::net::unix::pipe;
use tokio::process::{Child, Command};
use tokio_util::sync::CancellationToken;

/// Default number of trailing output lines kept for diagnostics.
pub const DEFAULT_TAIL_LINES: usize = 50;

/// Longest segment buffered before it is forwarded without a terminator.
const MAX_SEGMENT_BYTES: usize = 64 * 1024;

const READ_CHUNK_BYTES: usize = 8 * 1024;

/// Why a process did not succeed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum ProcessErrorKind {
    /// The executable could not be launched (missing, not executable, ...).
    SpawnFailure(String),
    /// The process ran and exited with a non-zero code, or was killed by a
    /// signal (`None`).
    NonZeroExit(Option<i32>),
    /// The configured timeout elapsed and the process was killed.
    TimedOut,
    /// The cancellation token fired and the process was killed.
    Cancelled,
    /// Reading the process's output or waiting on it failed.
    Io(String),
}

/// Outcome of one process execution.
#[derive(Debug, Clone, Serialize)]
pub struct ProcessResult {
    pub exit_code: Option<i32>,
    pub succeeded: bool,
    pub error: Option<ProcessErrorKind>,
    /// The last lines the process printed, oldest first.
    pub tail: Vec<String>,
}

impl ProcessResult {
    /// A clean exit.
    pub fn success(tail: Vec<String>) -> Self {
        Self {
            exit_code: Some(0),
            succeeded: true,
            error: None,
            tail,
        }
    }

    pub fn failure(exit_code: Option<i32>, error: ProcessErrorKind, tail: Vec<String>) -> Self {
        Self {
            exit_code,
            succeeded: false,
            error: Some(error),
            tail,
        }
    }

    /// Convert a failed result into the pipeline error for `stage`.
    ///
    /// Returns `None` for a successful result.
    pub fn stage_error(&self, stage: &str) -> Option<pf_core::Error> {
        let error = self.error.as_ref()?;
        Some(match error {
            ProcessErrorKind::SpawnFailure(cause) => pf_core::Error::spawn_failure(stage, cause.clone()),
            ProcessErrorKind::NonZeroExit(code) => pf_core::Error::NonZeroExit {
                stage: stage.to_string(),
                exit_code: *code,
                tail: self.tail.clone(),
            },
            ProcessErrorKind::TimedOut => pf_core::Error::TimedOut {
                stage: stage.to_string(),
            },
            ProcessErrorKind::Cancelled => pf_core::Error::Cancelled {
                stage: Some(stage.to_string()),
            },
            ProcessErrorKind::Io(message) => pf_core::Error::Internal(format!(
                "{stage}: I/O error while running process: {message}"
            )),
        })
    }
}

/// Ring buffer of the most recent output lines.
#[derive(Debug)]
struct OutputTail {
    lines: VecDeque<String>,
    capacity: usize,
}

impl OutputTail {
    fn new(capacity: usize) -> Self {
        Self {
            lines: VecDeque::with_capacity(capacity.min(1024)),
            capacity,
        }
    }

    /// Decode one raw line, forward it to the sink, and remember it.
    fn forward(&mut self, raw: &[u8], sink: &dyn LogSink) {
        let text = String::from_utf8_lossy(raw);
        let line = text.trim_end_matches('\r');
        let mut chunk = String::with_capacity(line.len() + 1);
        chunk.push_str(line);
        chunk.push('\n');
        sink.write(&chunk);

        if self.capacity == 0 {
            return;
        }
        if self.lines.len() == self.capacity {
            self.lines.pop_front();
        }
        self.lines.push_back(line.to_string());
    }

    fn into_vec(self) -> Vec<String> {
        self.lines.into()
    }
}

/// Splits raw process output into lines.
///
/// `\n`, `\r` and `\r\n` all end a line, so progress bars that redraw with
/// a bare carriage return still produce live output. A segment longer than
/// [`MAX_SEGMENT_BYTES`] is cut and forwarded as its own line.
#[derive(Debug, Default)]
struct LineSplitter {
    pending: Vec<u8>,
    after_cr: bool,
}

impl LineSplitter {
    fn push(&mut self, bytes: &[u8], mut emit: impl FnMut(&[u8])) {
        for &byte in bytes {
            match byte {
                b'\n' if self.after_cr => self.after_cr = false,
                b'\n' | b'\r' => {
                    emit(&self.pending);
                    self.pending.clear();
                    self.after_cr = byte == b'\r';
                }
                _ => {
                    self.after_cr = false;
                    self.pending.push(byte);
                    if self.pending.len() >= MAX_SEGMENT_BYTES {
                        emit(&self.pending);
                        self.pending.clear();
                    }
                }
            }
        }
    }

    /// Flush a trailing line that had no terminator.
    fn finish(&mut self, mut emit: impl FnMut(&[u8])) {
        if !self.pending.is_empty() {
            emit(&self.pending);
            self.pending.clear();
        }
    }
}

/// A builder for constructing and executing external tool invocations.
///
/// stdout and stderr share one pipe, so lines reach the sink in the order
/// the process wrote them. Each line is handed to the sink as soon as it is
/// read; a long-running stage gives live feedback and memory stays bounded
/// by the tail buffer.
///
/// # Example
///
/// ```no_run
/// use pf_core::events::TracingSink;
/// use pf_tools::ToolCommand;
/// use std::path::PathBuf;
///
/// # async fn example() {
/// let result = ToolCommand::new(PathBuf::from("colmap"))
///     .arg("model_converter")
///     .args(["--input_path", "sparse/0", "--output_path", "sparse/0/sparse"])
///     .args(["--output_type", "TXT"])
///     .execute_streaming(&TracingSink)
///     .await;
/// assert!(result.succeeded);
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct ToolCommand {
    program: PathBuf,
    args: Vec<String>,
    current_dir: Option<PathBuf>,
    timeout: Option<Duration>,
    tail_lines: usize,
    cancellation: Option<CancellationToken>,
}

impl ToolCommand {
    /// Create a new command for the given program path.
    pub fn new(program: PathBuf) -> Self {
        Self {
            program,
            args: Vec::new(),
            current_dir: None,
            timeout: None,
            tail_lines: DEFAULT_TAIL_LINES,
            cancellation: None,
        }
    }

    /// Append a single argument.
    pub fn arg(&mut self, s: impl Into<String>) -> &mut Self {
        self.args.push(s.into());
        self
    }

    /// Append multiple arguments.
    pub fn args(&mut self, iter: impl IntoIterator<Item = impl Into<String>>) -> &mut Self {
        self.args.extend(iter.into_iter().map(Into::into));
        self
    }

    /// Run the process in `dir` instead of the current directory.
    pub fn current_dir(&mut self, dir: impl Into<PathBuf>) -> &mut Self {
        self.current_dir = Some(dir.into());
        self
    }

    /// Set the maximum execution time.
    pub fn timeout(&mut self, d: Duration) -> &mut Self {
        self.timeout = Some(d);
        self
    }

    /// Number of trailing output lines to keep in the result.
    pub fn tail_lines(&mut self, n: usize) -> &mut Self {
        self.tail_lines = n;
        self
    }

    /// Attach a cancellation token. It is checked between output reads and
    /// while waiting for exit.
    pub fn cancellation(&mut self, token: CancellationToken) -> &mut Self {
        self.cancellation = Some(token);
        self
    }

    /// Short name of the program, for log messages.
    pub fn program_name(&self) -> String {
        self.program
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| self.program.to_string_lossy().to_string())
    }

    /// Spawn the process with stdout and stderr both writing into one pipe.
    ///
    /// The returned receiver reaches EOF once the process (and anything it
    /// forked that inherited the pipe) has exited.
    fn spawn_merged(&self) -> Result<(Child, pipe::Receiver), ProcessErrorKind> {
        let spawn_error = |e: std::io::Error| ProcessErrorKind::SpawnFailure(e.to_string());
        let (reader, writer) = std::io::pipe().map_err(spawn_error)?;
        let stderr_writer = writer.try_clone().map_err(spawn_error)?;

        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args)
            .stdin(Stdio::null())
            .stdout(writer)
            .stderr(stderr_writer)
            .kill_on_drop(true);
        if let Some(ref dir) = self.current_dir {
            cmd.current_dir(dir);
        }

        let child = cmd.spawn().map_err(spawn_error)?;
        // The command still owns the parent's write ends.
        drop(cmd);

        let output = pipe::Receiver::from_owned_fd(OwnedFd::from(reader))
            .map_err(|e| ProcessErrorKind::Io(format!("registering output pipe: {e}")))?;
        Ok((child, output))
    }

    /// Execute the command, streaming its output into `sink`.
    ///
    /// Never returns an error: spawn failures, non-zero exits, timeouts and
    /// cancellation are all reported through [`ProcessResult::error`].
    pub async fn execute_streaming(&self, sink: &dyn LogSink) -> ProcessResult {
        let program_name = self.program_name();
        tracing::debug!(program = %program_name, args = ?self.args, "spawning process");

        let (mut child, mut output) = match self.spawn_merged() {
            Ok(spawned) => spawned,
            Err(kind) => {
                tracing::warn!("{program_name}: failed to spawn: {kind:?}");
                return ProcessResult::failure(None, kind, Vec::new());
            }
        };

        let mut splitter = LineSplitter::default();
        let mut tail = OutputTail::new(self.tail_lines);
        let mut buf = vec![0u8; READ_CHUNK_BYTES];

        let cancel = self.cancellation.clone().unwrap_or_default();
        let timeout = self.timeout;
        let deadline = async move {
            match timeout {
                Some(d) => tokio::time::sleep(d).await,
                None => std::future::pending::<()>().await,
            }
        };
        tokio::pin!(deadline);

        let mut interrupted: Option<ProcessErrorKind> = None;

        loop {
            let read = tokio::select! {
                biased;
                () = cancel.cancelled() => {
                    interrupted = Some(ProcessErrorKind::Cancelled);
                    break;
                }
                () = &mut deadline => {
                    interrupted = Some(ProcessErrorKind::TimedOut);
                    break;
                }
                read = output.read(&mut buf) => read,
            };
            match read {
                Ok(0) => break,
                Ok(n) => splitter.push(&buf[..n], |line| tail.forward(line, sink)),
                Err(e) => {
                    tracing::warn!("{program_name}: error reading output: {e}");
                    break;
                }
            }
        }
        splitter.finish(|line| tail.forward(line, sink));

        let status = if interrupted.is_none() {
            tokio::select! {
                biased;
                () = cancel.cancelled() => {
                    interrupted = Some(ProcessErrorKind::Cancelled);
                    None
                }
                () = &mut deadline => {
                    interrupted = Some(ProcessErrorKind::TimedOut);
                    None
                }
                status = child.wait() => Some(status),
            }
        } else {
            None
        };

        if let Some(kind) = interrupted {
            tracing::warn!("{program_name}: killing process ({kind:?})");
            kill(&mut child).await;
            return ProcessResult::failure(None, kind, tail.into_vec());
        }

        match status {
            Some(Ok(status)) if status.success() => ProcessResult::success(tail.into_vec()),
            Some(Ok(status)) => {
                tracing::debug!("{program_name} exited with {status}");
                ProcessResult::failure(
                    status.code(),
                    ProcessErrorKind::NonZeroExit(status.code()),
                    tail.into_vec(),
                )
            }
            Some(Err(e)) => ProcessResult::failure(
                None,
                ProcessErrorKind::Io(format!("waiting for process: {e}")),
                tail.into_vec(),
            ),
            None => ProcessResult::failure(
                None,
                ProcessErrorKind::Io("process status unavailable".into()),
                tail.into_vec(),
            ),
        }
    }
}

async fn kill(child: &mut Child) {
    if let Err(e) = child.start_kill() {
        tracing::debug!("start_kill failed (process may have exited): {e}");
    }
    let _ = child.wait().await;
}
