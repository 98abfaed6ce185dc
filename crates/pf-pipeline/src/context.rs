//! Per-run inputs and the channels a run reports through.

use std::path::PathBuf;
use std::sync::Arc;

use pf_core::{Device, LogSink, ProfileId};
use serde::Serialize;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use crate::run::RunStatus;
use crate::stage::StageName;

/// What to reconstruct, where, and how.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunRequest {
    /// Directory holding the input photographs.
    pub dataset_dir: PathBuf,
    /// Directory receiving every intermediate artifact and the final mesh.
    pub result_dir: PathBuf,
    pub profile: ProfileId,
    pub device: Device,
}

impl RunRequest {
    pub fn new(dataset_dir: impl Into<PathBuf>, result_dir: impl Into<PathBuf>) -> Self {
        Self {
            dataset_dir: dataset_dir.into(),
            result_dir: result_dir.into(),
            profile: ProfileId::default(),
            device: Device::default(),
        }
    }

    /// Builder: choose the quality profile.
    pub fn with_profile(mut self, profile: ProfileId) -> Self {
        self.profile = profile;
        self
    }

    /// Builder: choose the compute device.
    pub fn with_device(mut self, device: Device) -> Self {
        self.device = device;
        self
    }
}

/// Snapshot published after every stage boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RunProgress {
    /// `100 * completed / total`, where skipped stages count as completed.
    pub percent: u8,
    /// The stage most recently started or finished.
    pub stage: Option<StageName>,
    pub status: RunStatus,
}

impl Default for RunProgress {
    fn default() -> Self {
        Self {
            percent: 0,
            stage: None,
            status: RunStatus::NotStarted,
        }
    }
}

/// Publishes [`RunProgress`] to any number of watchers.
///
/// Watchers only ever see the latest snapshot; a slow reader never stalls
/// the pipeline.
#[derive(Debug)]
pub struct ProgressSender {
    tx: watch::Sender<RunProgress>,
}

impl ProgressSender {
    /// Create a sender along with its first receiver.
    pub fn channel() -> (Self, watch::Receiver<RunProgress>) {
        let (tx, rx) = watch::channel(RunProgress::default());
        (Self { tx }, rx)
    }

    /// A sender nobody listens to.
    pub fn noop() -> Self {
        Self::channel().0
    }

    /// Another receiver for the same run.
    pub fn subscribe(&self) -> watch::Receiver<RunProgress> {
        self.tx.subscribe()
    }

    pub fn send(&self, progress: RunProgress) {
        // send_replace never fails, even with no receivers left.
        self.tx.send_replace(progress);
    }
}

/// Everything the orchestrator needs from its caller besides the request.
pub struct RunContext {
    /// Receives every chunk of tool output and every banner line.
    pub sink: Arc<dyn LogSink>,
    /// Checked between stages and between output lines.
    pub cancellation: CancellationToken,
    pub progress: Arc<ProgressSender>,
}

impl RunContext {
    pub fn new(sink: Arc<dyn LogSink>) -> Self {
        Self {
            sink,
            cancellation: CancellationToken::new(),
            progress: Arc::new(ProgressSender::noop()),
        }
    }

    /// Builder: attach a cancellation token.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = token;
        self
    }

    /// Builder: attach a progress sender.
    pub fn with_progress(mut self, progress: ProgressSender) -> Self {
        self.progress = Arc::new(progress);
        self
    }
}

impl std::fmt::Debug for RunContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RunContext")
            .field("cancelled", &self.cancellation.is_cancelled())
            .finish_non_exhaustive()
    }
}
