//! Photoforge - photogrammetry pipeline driver
//!
//! This library crate exposes the CLI's config loading and cleanup for
//! integration testing. The pipeline itself lives in `pf-pipeline`.

pub mod clean;
pub mod config;
