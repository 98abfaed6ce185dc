//! pf-core: shared types, errors, configuration, and log sinks.
//!
//! This crate is the foundational dependency for the other pf-* crates,
//! providing the unified error type, the quality profile and device enums,
//! the explicit run configuration, and the [`events::LogSink`] observer the
//! pipeline streams tool output through.

pub mod config;
pub mod error;
pub mod events;
pub mod ids;

// Re-export the most commonly used items at the crate root.
pub use config::{Device, ProfileId};
pub use error::{Error, Result};
pub use events::LogSink;
pub use ids::RunId;
