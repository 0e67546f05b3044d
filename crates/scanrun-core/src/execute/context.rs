//! Cancellation and teardown primitives for running jobs.
//!
//! Two mechanisms with different strengths:
//!
//! - [`AbortHandle`] is the caller's cancel request. It is cooperative:
//!   adapters look at it at their checkpoints and stop early.
//! - [`TeardownGuard`] is forceful. Dropping it cancels the job's teardown
//!   token, which stops in-flight script evaluation at the engine's next
//!   operation and drops pending cooperative work.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio_util::sync::CancellationToken;

use crate::run::JobId;

/// Handle for cooperative cancellation of a job.
///
/// `AbortHandle` can be cloned and shared across threads, and any clone can
/// trigger the abort which will be visible to all other clones.
///
/// # Example
///
/// ```
/// use scanrun_core::execute::AbortHandle;
///
/// let handle = AbortHandle::new();
/// let handle_clone = handle.clone();
///
/// assert!(!handle.is_aborted());
/// handle_clone.abort();
/// assert!(handle.is_aborted());
/// ```
#[derive(Clone, Default)]
pub struct AbortHandle {
    aborted: Arc<AtomicBool>,
}

impl AbortHandle {
    pub fn new() -> Self {
        Self {
            aborted: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Check if abort has been requested.
    pub fn is_aborted(&self) -> bool {
        self.aborted.load(Ordering::Relaxed)
    }

    /// Request abort. Returns `false` if an abort was already pending.
    pub fn abort(&self) -> bool {
        !self.aborted.swap(true, Ordering::Relaxed)
    }
}

/// Cancels a job's teardown token when dropped.
///
/// Created before a job's execution context starts and moved into it, so the
/// token is cancelled on every exit path: normal return, adapter error,
/// panic, or a context that failed to start at all.
pub struct TeardownGuard {
    job_id: JobId,
    token: CancellationToken,
}

impl TeardownGuard {
    pub fn new(job_id: JobId, token: CancellationToken) -> Self {
        Self { job_id, token }
    }

    pub fn token(&self) -> &CancellationToken {
        &self.token
    }
}

impl Drop for TeardownGuard {
    fn drop(&mut self) {
        if !self.token.is_cancelled() {
            self.token.cancel();
        }
        tracing::debug!(job = %self.job_id, "execution context torn down");
    }
}
