//! Concurrency reconciler.
//!
//! Decides where a job's script runs so it never fights the host's own
//! scheduler. Scripts never run on a host runtime thread: blocking ones get a
//! dedicated OS thread, cooperative ones get a thread with a runtime of their
//! own, and nothing calls `block_on` from inside a runtime.

use std::panic::AssertUnwindSafe;

use tokio::sync::oneshot;

use super::adapter::{self, AdapterReport, JobEnv};
use super::context::TeardownGuard;
use crate::classify::{EntryStyle, ExecutionPattern};
use crate::error::{Error, Result};
use crate::run::JobId;
use crate::script::ScriptUnit;

/// Kind of execution context chosen for a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContextKind {
    /// No script code runs; handled on the caller's task.
    Inline,
    /// A fresh OS thread running the adapter synchronously.
    DedicatedWorker,
    /// A fresh OS thread driving the adapter on its own current-thread runtime.
    OwnedScheduler,
}

impl std::fmt::Display for ContextKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ContextKind::Inline => f.write_str("inline"),
            ContextKind::DedicatedWorker => f.write_str("dedicated_worker"),
            ContextKind::OwnedScheduler => f.write_str("owned_scheduler"),
        }
    }
}

/// Where and how one job executes. Never shared between jobs.
#[derive(Debug)]
pub struct ExecutionContext {
    job_id: JobId,
    kind: ContextKind,
}

/// Choose the execution context for a classified unit.
pub fn plan(pattern: &ExecutionPattern, unit: &ScriptUnit) -> ExecutionContext {
    let kind = match pattern {
        ExecutionPattern::Unrecognized => ContextKind::Inline,
        ExecutionPattern::SelfContainedEntryPoint {
            style: EntryStyle::Cooperative,
            ..
        } => ContextKind::OwnedScheduler,
        ExecutionPattern::SelfContainedEntryPoint {
            style: EntryStyle::Blocking,
            ..
        }
        | ExecutionPattern::PerSymbolFunctionWithList { .. }
        | ExecutionPattern::MultiColumnBooleanFrame { .. } => ContextKind::DedicatedWorker,
    };
    ExecutionContext {
        job_id: unit.host().job_id(),
        kind,
    }
}

impl ExecutionContext {
    pub fn kind(&self) -> ContextKind {
        self.kind
    }

    /// Run the adapter for `pattern` in this context.
    ///
    /// Consumes the unit; it is dropped on the context's thread when the
    /// adapter finishes. The unit's teardown token is cancelled on every exit
    /// path, including a worker that fails to start.
    pub async fn execute(
        self,
        mut unit: ScriptUnit,
        pattern: ExecutionPattern,
        env: JobEnv,
    ) -> Result<AdapterReport> {
        let guard = TeardownGuard::new(self.job_id, unit.host().teardown_token());
        tracing::debug!(job = %self.job_id, context = %self.kind, "starting execution context");

        match self.kind {
            ContextKind::Inline => {
                let report = adapter::run_unrecognized(&unit, &env);
                drop(unit);
                drop(guard);
                Ok(report)
            }
            ContextKind::DedicatedWorker => {
                spawn_worker(self.job_id, guard, move || {
                    adapter::run_blocking(&mut unit, &pattern, &env)
                })
                .await
            }
            ContextKind::OwnedScheduler => {
                let function = pattern.function().unwrap_or_default().to_string();
                spawn_worker(self.job_id, guard, move || {
                    run_on_owned_scheduler(&mut unit, &function, &env)
                })
                .await
            }
        }
    }
}

/// Build a current-thread runtime on this (non-runtime) thread and drive the
/// cooperative adapter on it until it finishes or the job is torn down.
fn run_on_owned_scheduler(unit: &mut ScriptUnit, function: &str, env: &JobEnv) -> Result<AdapterReport> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(|e| Error::Worker(format!("failed to build scheduler: {}", e)))?;
    let teardown = unit.host().teardown_token();

    runtime.block_on(async {
        tokio::select! {
            report = adapter::run_cooperative(unit, function, env) => report,
            _ = teardown.cancelled() => Err(Error::TornDown),
        }
    })
}

/// Run `work` on a fresh named thread and await its result.
///
/// The guard moves onto the thread and drops after `work` returns or panics.
/// If the thread cannot be spawned, the closure (guard included) is dropped
/// here, which tears the context down just the same.
async fn spawn_worker<F>(job_id: JobId, guard: TeardownGuard, work: F) -> Result<AdapterReport>
where
    F: FnOnce() -> Result<AdapterReport> + Send + 'static,
{
    let (tx, rx) = oneshot::channel();
    let name = format!("scanrun-{}", &job_id.to_string()[..8]);

    std::thread::Builder::new()
        .name(name)
        .spawn(move || {
            let result = match std::panic::catch_unwind(AssertUnwindSafe(work)) {
                Ok(result) => result,
                Err(panic) => Err(Error::Worker(format!(
                    "script worker panicked: {}",
                    panic_message(panic.as_ref())
                ))),
            };
            drop(guard);
            // The receiver is gone if the job already timed out.
            let _ = tx.send(result);
        })
        .map_err(|e| Error::Worker(format!("failed to spawn worker: {}", e)))?;

    rx.await
        .map_err(|_| Error::Worker("worker exited without reporting".to_string()))?
}

pub(crate) fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
