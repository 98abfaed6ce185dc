//! Unified error type for the photoforge pipeline.
//!
//! All crates funnel their failures into [`Error`]. Pipeline failures carry
//! the name of the stage that failed so callers can report it and decide
//! whether a re-run will resume past it.

use std::path::PathBuf;

/// Unified error type covering all failure modes in photoforge.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The dataset directory holds no usable input images.
    #[error("Missing input in {}: {reason}", dataset.display())]
    MissingInput {
        /// The dataset directory that was inspected.
        dataset: PathBuf,
        /// Why the dataset was rejected.
        reason: String,
    },

    /// A stage's executable could not be launched.
    #[error("Stage {stage} could not be started: {cause}")]
    SpawnFailure {
        /// The stage whose process failed to spawn.
        stage: String,
        /// The underlying OS error text.
        cause: String,
    },

    /// A stage's process ran and exited unsuccessfully.
    #[error("Stage {stage} failed with {}", exit_description(*exit_code))]
    NonZeroExit {
        /// The stage whose process failed.
        stage: String,
        /// Exit code, or `None` when the process was killed by a signal.
        exit_code: Option<i32>,
        /// The last lines the process printed.
        tail: Vec<String>,
    },

    /// A stage could not find an artifact its predecessor should have written.
    #[error("Stage {stage} is missing expected artifact {}", artifact.display())]
    ArtifactConversionFailure {
        /// The stage that looked for the artifact.
        stage: String,
        /// The missing artifact path.
        artifact: PathBuf,
    },

    /// The run was cancelled by the caller.
    #[error("Pipeline cancelled{}", stage.as_ref().map(|s| format!(" during {s}")).unwrap_or_default())]
    Cancelled {
        /// The stage that was running, if any.
        stage: Option<String>,
    },

    /// A stage's process exceeded its configured timeout.
    #[error("Stage {stage} timed out")]
    TimedOut {
        /// The stage that timed out.
        stage: String,
    },

    /// An I/O operation failed.
    #[error("IO error: {source}")]
    Io {
        /// The underlying I/O error.
        #[from]
        source: std::io::Error,
    },

    /// Configuration could not be parsed.
    #[error("Config error: {0}")]
    Config(String),

    /// Request data failed validation.
    #[error("Validation error: {0}")]
    Validation(String),

    /// Catch-all for unexpected internal errors.
    #[error("Internal error: {0}")]
    Internal(String),
}

fn exit_description(code: Option<i32>) -> String {
    match code {
        Some(code) => format!("exit code {code}"),
        None => "termination by signal".to_string(),
    }
}

impl Error {
    /// The pipeline stage this error is attributed to, if any.
    pub fn stage(&self) -> Option<&str> {
        match self {
            Error::SpawnFailure { stage, .. }
            | Error::NonZeroExit { stage, .. }
            | Error::ArtifactConversionFailure { stage, .. }
            | Error::TimedOut { stage } => Some(stage),
            Error::Cancelled { stage } => stage.as_deref(),
            _ => None,
        }
    }

    /// Captured output tail, for errors that carry one.
    pub fn output_tail(&self) -> &[String] {
        match self {
            Error::NonZeroExit { tail, .. } => tail,
            _ => &[],
        }
    }

    /// Whether this error represents a caller-requested cancellation.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Error::Cancelled { .. })
    }

    /// Convenience constructor for [`Error::MissingInput`].
    pub fn missing_input(dataset: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Error::MissingInput {
            dataset: dataset.into(),
            reason: reason.into(),
        }
    }

    /// Convenience constructor for [`Error::SpawnFailure`].
    pub fn spawn_failure(stage: impl Into<String>, cause: impl Into<String>) -> Self {
        Error::SpawnFailure {
            stage: stage.into(),
            cause: cause.into(),
        }
    }

    /// Convenience constructor for [`Error::ArtifactConversionFailure`].
    pub fn missing_artifact(stage: impl Into<String>, artifact: impl Into<PathBuf>) -> Self {
        Error::ArtifactConversionFailure {
            stage: stage.into(),
            artifact: artifact.into(),
        }
    }
}

/// Result alias using the crate-level [`Error`].
pub type Result<T> = std::result::Result<T, Error>;
