//! # smv-pipeline
//!
//! Job orchestration for spedup-mv.
//!
//! This crate provides:
//!
//! - **[`run_with_fallback`]** -- try each encoder candidate, verify its
//!   artifact, advance on failure, abort when the ladder is exhausted.
//! - **[`StageLadder`]** -- encoder-independent fallback levels, each run
//!   through the full encoder ladder.
//! - **[`fetch`]** -- the seam that obtains source audio and background
//!   assets (local paths, HTTP, yt-dlp) with bounded retry.
//! - **[`ProgressTracker`]** and **[`JobRegistry`]** -- the shared status
//!   record and the single job slot.
//! - **[`JobExecutor`]** -- the stage state machine.

pub mod context;
pub mod executor;
pub mod fallback;
pub mod fetch;
pub mod registry;
pub mod stage;
pub mod tracker;

pub use context::PipelineContext;
pub use executor::JobExecutor;
pub use fallback::{run_with_fallback, verify_artifact, Attempted};
pub use fetch::{AutoFetcher, Fetchers, HttpFetcher, RetryPolicy, YtDlpFetcher};
pub use registry::{JobRegistry, JobSlot};
pub use stage::{LadderOutcome, StageLadder};
pub use tracker::ProgressTracker;
