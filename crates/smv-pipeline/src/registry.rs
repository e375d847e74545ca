//! Single-slot job registry.
//!
//! At most one job runs per process. [`JobRegistry::try_claim`] is a single
//! compare-and-swap; the returned [`JobSlot`] frees the slot when dropped,
//! which the worker does only after writing the terminal state.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use smv_core::{Error, JobId, Result};
use tokio_util::sync::CancellationToken;

use crate::tracker::ProgressTracker;

#[derive(Debug, Default)]
pub struct JobRegistry {
    busy: AtomicBool,
    tracker: ProgressTracker,
    cancel: Mutex<Option<(JobId, CancellationToken)>>,
}

impl JobRegistry {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn tracker(&self) -> &ProgressTracker {
        &self.tracker
    }

    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::Acquire)
    }

    /// Claim the slot for `job_id` and mark it Running.
    ///
    /// # Errors
    ///
    /// [`Error::Conflict`] when another job holds the slot. The running
    /// job's state is not touched.
    pub fn try_claim(self: &Arc<Self>, job_id: JobId) -> Result<JobSlot> {
        if self
            .busy
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(Error::Conflict("a job is already running".into()));
        }

        let token = CancellationToken::new();
        *self.cancel.lock() = Some((job_id, token.clone()));
        self.tracker.start(job_id);
        tracing::info!(job_id = %job_id, "job slot claimed");

        Ok(JobSlot {
            registry: Arc::clone(self),
            job_id,
            token,
        })
    }

    /// Request cancellation of the running job. Returns the job's id, or
    /// `None` when nothing is running.
    pub fn cancel(&self) -> Option<JobId> {
        let guard = self.cancel.lock();
        let (job_id, token) = guard.as_ref()?;
        token.cancel();
        tracing::info!(job_id = %job_id, "cancellation requested");
        Some(*job_id)
    }
}

/// Proof of ownership of the job slot.
#[derive(Debug)]
pub struct JobSlot {
    registry: Arc<JobRegistry>,
    job_id: JobId,
    token: CancellationToken,
}

impl JobSlot {
    pub fn job_id(&self) -> JobId {
        self.job_id
    }

    pub fn cancellation(&self) -> CancellationToken {
        self.token.clone()
    }

    pub fn tracker(&self) -> &ProgressTracker {
        &self.registry.tracker
    }
}

impl Drop for JobSlot {
    fn drop(&mut self) {
        // A slot dropped without a terminal state (panic, early return) must
        // not leave the record Running.
        if self.registry.tracker.is_running() {
            self.registry.tracker.fail("job ended unexpectedly");
        }
        *self.registry.cancel.lock() = None;
        self.registry.busy.store(false, Ordering::Release);
        tracing::debug!(job_id = %self.job_id, "job slot released");
    }
}
