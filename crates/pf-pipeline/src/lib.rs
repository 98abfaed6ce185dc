//! # pf-pipeline
//!
//! The photogrammetry pipeline: a fixed sequence of COLMAP and OpenMVS
//! stages, parameterized by a quality profile and resumable from whatever
//! artifacts a previous run left behind.
//!
//! - [`profile`] -- per-profile parameter tables ([`ProfileStore`]).
//! - [`stage`] -- the stage table and argv construction.
//! - [`artifact`] -- presence checks that decide which stages are done.
//! - [`dataset`] -- input discovery and image staging.
//! - [`executor`] -- the [`PipelineOrchestrator`] and [`run_pipeline`].

pub mod artifact;
pub mod context;
pub mod dataset;
pub mod executor;
pub mod profile;
pub mod run;
pub mod stage;

pub use artifact::ArtifactChecker;
pub use context::{ProgressSender, RunContext, RunProgress, RunRequest};
pub use executor::{run_pipeline, PipelineOrchestrator};
pub use profile::{Param, ProfileStore};
pub use run::{PipelineRun, RunReport, RunStatus};
pub use stage::{StageName, Step};
