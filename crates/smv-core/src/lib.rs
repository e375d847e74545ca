//! smv-core: shared types, IDs, errors, configuration, and the job model.
//!
//! This crate is the foundational dependency for all other smv-* crates,
//! providing the typed job identifier, a unified error type, the job and
//! media domain model, and application configuration.

pub mod config;
pub mod error;
pub mod ids;
pub mod job;
pub mod media;

// Re-export the most commonly used items at the crate root.
pub use error::{Error, Result};
pub use ids::*;
pub use job::*;
pub use media::*;
