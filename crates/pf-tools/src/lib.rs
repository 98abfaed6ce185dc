//! # pf-tools
//!
//! External tool management and process execution for the photoforge
//! pipeline.
//!
//! This crate provides:
//!
//! - **Tool discovery** ([`ToolRegistry`]) -- resolve paths to `colmap` and the
//!   OpenMVS binaries from configuration or `PATH`.
//! - **Command execution** ([`ToolCommand`]) -- async builder that streams a
//!   process's combined output line by line into a [`pf_core::LogSink`],
//!   with cancellation and an optional timeout.
//! - **Stage runner** ([`StageRunner`], [`ToolRunner`]) -- the seam the
//!   orchestrator calls to run one argument vector.

pub mod command;
pub mod runner;
pub mod tools;

// ---- Re-exports for convenience ----

pub use command::{ProcessErrorKind, ProcessResult, ToolCommand};
pub use runner::{StageRunner, ToolRunner};
pub use tools::{ToolInfo, ToolRegistry};
