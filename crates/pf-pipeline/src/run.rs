//! Run state and the report handed back to callers.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use pf_core::{Device, Error, ProfileId, RunId};
use serde::{Serialize, Serializer};

use crate::stage::StageName;

/// Lifecycle of a pipeline run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    NotStarted,
    Running,
    Succeeded,
    Failed,
    Cancelled,
}

/// Mutable state of one run, owned by the orchestrator call driving it.
#[derive(Debug)]
pub struct PipelineRun {
    pub run_id: RunId,
    pub result_dir: PathBuf,
    pub profile: ProfileId,
    pub device: Device,
    /// Planned stages, in order.
    pub stages: Vec<StageName>,
    pub status: RunStatus,
    pub progress: u8,
    /// Stage currently being worked on.
    pub current: Option<StageName>,
    pub executed: Vec<StageName>,
    pub skipped: Vec<StageName>,
    pub started_at: DateTime<Utc>,
}

impl PipelineRun {
    pub fn new(result_dir: PathBuf, profile: ProfileId, device: Device) -> Self {
        Self {
            run_id: RunId::new(),
            result_dir,
            profile,
            device,
            stages: Vec::new(),
            status: RunStatus::NotStarted,
            progress: 0,
            current: None,
            executed: Vec::new(),
            skipped: Vec::new(),
            started_at: Utc::now(),
        }
    }

    /// Enter the running state with the given plan.
    pub fn start(&mut self, stages: Vec<StageName>) {
        self.stages = stages;
        self.status = RunStatus::Running;
        self.progress = 0;
    }

    pub fn begin_stage(&mut self, stage: StageName) {
        self.current = Some(stage);
    }

    /// Mark `stage` finished (`executed == false` means it was skipped) and
    /// recompute progress.
    pub fn complete_stage(&mut self, stage: StageName, executed: bool) -> u8 {
        if executed {
            self.executed.push(stage);
        } else {
            self.skipped.push(stage);
        }
        let done = self.executed.len() + self.skipped.len();
        let total = self.stages.len().max(1);
        self.progress = ((100 * done) / total).min(100) as u8;
        self.progress
    }

    /// Close the run successfully.
    pub fn succeed(self, result_mesh_path: PathBuf) -> RunReport {
        self.into_report(RunStatus::Succeeded, None, Some(result_mesh_path), None)
    }

    /// Close the run with `error`, attributing it to the stage it names or,
    /// for untagged errors raised mid-stage, the stage that was running.
    pub fn fail(self, error: Error) -> RunReport {
        let status = if error.is_cancelled() {
            RunStatus::Cancelled
        } else {
            RunStatus::Failed
        };

        let failed_stage = match &error {
            Error::MissingInput { .. } | Error::Cancelled { stage: None } => None,
            e => e
                .stage()
                .and_then(|s| s.parse::<StageName>().ok())
                .or(self.current),
        };

        self.into_report(status, failed_stage, None, Some(error))
    }

    fn into_report(
        self,
        status: RunStatus,
        failed_stage: Option<StageName>,
        result_mesh_path: Option<PathBuf>,
        error: Option<Error>,
    ) -> RunReport {
        RunReport {
            run_id: self.run_id,
            status,
            profile: self.profile,
            device: self.device,
            result_dir: self.result_dir,
            progress: self.progress,
            failed_stage,
            result_mesh_path,
            executed: self.executed,
            skipped: self.skipped,
            error,
            started_at: self.started_at,
            finished_at: Utc::now(),
        }
    }
}

/// Outcome of a pipeline run.
#[derive(Debug, Serialize)]
pub struct RunReport {
    pub run_id: RunId,
    pub status: RunStatus,
    pub profile: ProfileId,
    pub device: Device,
    pub result_dir: PathBuf,
    pub progress: u8,
    pub failed_stage: Option<StageName>,
    /// `result_dir/result.obj`, set only on success.
    pub result_mesh_path: Option<PathBuf>,
    pub executed: Vec<StageName>,
    pub skipped: Vec<StageName>,
    #[serde(serialize_with = "serialize_error")]
    pub error: Option<Error>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl RunReport {
    pub fn succeeded(&self) -> bool {
        self.status == RunStatus::Succeeded
    }

    /// Last lines printed by the failing process, if the failure has any.
    pub fn output_tail(&self) -> &[String] {
        self.error.as_ref().map(Error::output_tail).unwrap_or(&[])
    }
}

fn serialize_error<S: Serializer>(error: &Option<Error>, s: S) -> Result<S::Ok, S::Error> {
    match error {
        Some(e) => s.serialize_some(&e.to_string()),
        None => s.serialize_none(),
    }
}
