//! The shared job-state record.
//!
//! One [`ProgressTracker`] exists per process. The active job is its only
//! writer; observers read clones of the whole record. Each write replaces
//! the record inside a short critical section, so readers never see a torn
//! update.

use std::path::PathBuf;

use chrono::Utc;
use parking_lot::RwLock;
use smv_core::{JobId, JobState, JobStatus, PipelineStage};

/// Progress checkpoints reported at stage boundaries.
pub mod checkpoint {
    pub const STARTED: u8 = 10;
    pub const BACKGROUND_FETCHED: u8 = 15;
    pub const SOURCE_FETCHED: u8 = 25;
    pub const INPUTS_VALIDATED: u8 = 35;
    pub const SPEED_TRANSFORMED: u8 = 50;
    pub const DURATION_PROBED: u8 = 65;
    pub const BACKGROUND_ENCODED: u8 = 75;
    pub const MUXED: u8 = 85;
    pub const CLEANED_UP: u8 = 95;
    pub const COMPLETE: u8 = 100;
}

#[derive(Debug, Default)]
pub struct ProgressTracker {
    inner: RwLock<JobStatus>,
}

impl ProgressTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Clone of the current record.
    pub fn snapshot(&self) -> JobStatus {
        self.inner.read().clone()
    }

    /// Reset the record for a newly claimed job.
    pub fn start(&self, job_id: JobId) {
        *self.inner.write() = JobStatus {
            state: JobState::Running,
            progress: checkpoint::STARTED,
            message: "Starting".into(),
            output_path: None,
            stage: Some(PipelineStage::Fetching),
            job_id: Some(job_id),
            started_at: Some(Utc::now()),
            finished_at: None,
        };
    }

    /// Record a checkpoint. Progress never moves backwards and never
    /// exceeds 100; updates outside a running job are ignored.
    pub fn advance(&self, progress: u8, stage: PipelineStage, message: impl Into<String>) {
        let message = message.into();
        let mut status = self.inner.write();
        if status.state != JobState::Running {
            return;
        }
        let next = JobStatus {
            progress: progress.min(100).max(status.progress),
            stage: Some(stage),
            message,
            ..status.clone()
        };
        tracing::info!(progress = next.progress, stage = %stage, "{}", next.message);
        *status = next;
    }

    pub fn complete(&self, output: PathBuf) {
        let mut status = self.inner.write();
        let next = JobStatus {
            state: JobState::Complete,
            progress: checkpoint::COMPLETE,
            message: "Complete".into(),
            output_path: Some(output),
            stage: Some(PipelineStage::Done),
            finished_at: Some(Utc::now()),
            ..status.clone()
        };
        *status = next;
    }

    /// Terminal failure. Progress stays where the job stopped.
    pub fn fail(&self, message: impl Into<String>) {
        let mut status = self.inner.write();
        let mut message = message.into();
        if message.trim().is_empty() {
            message = "Job failed".into();
        }
        let next = JobStatus {
            state: JobState::Failed,
            message,
            output_path: None,
            stage: Some(PipelineStage::Error),
            finished_at: Some(Utc::now()),
            ..status.clone()
        };
        *status = next;
    }

    pub fn is_running(&self) -> bool {
        self.inner.read().state == JobState::Running
    }
}
