//! # smv-av
//!
//! External tool plumbing for the spedup-mv transcode orchestrator.
//!
//! This crate provides:
//!
//! - **Tool discovery** ([`ToolRegistry`]) -- find and cache paths to ffmpeg,
//!   ffprobe and yt-dlp.
//! - **Command execution** ([`ToolCommand`], [`ToolRunner`]) -- structured
//!   argument lists run with a timeout, behind a seam tests can script.
//! - **Hardware selection** ([`CapabilityProber`], [`EncoderSelector`]) --
//!   detect acceleration support and order encoder profiles, CPU last.
//! - **Templates** ([`EncodeTemplate`]) -- encoder-independent commands and
//!   the per-stage builders in [`actions`].
//! - **Probing** ([`MediaProber`]) -- durations and video streams via ffprobe.
//! - **Scratch and output** ([`Workspace`], [`OutputResolver`]) -- per-job
//!   temp directories and collision-free artifact placement.

pub mod actions;
pub mod capabilities;
pub mod command;
pub mod encoders;
pub mod output;
pub mod probe;
pub mod template;
pub mod tools;
pub mod workspace;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

// ---- Re-exports for convenience ----

pub use capabilities::{CapabilityProber, CapabilitySet};
pub use command::{SystemRunner, ToolCommand, ToolOutput, ToolRunner};
pub use encoders::{EncoderKind, EncoderProfile, EncoderSelector, EncoderSettings};
pub use output::{Manifest, OutputResolver};
pub use probe::{MediaProber, VideoStream};
pub use template::{EncodeTemplate, VideoSlot};
pub use tools::{ToolConfig, ToolInfo, ToolRegistry};
pub use workspace::Workspace;
