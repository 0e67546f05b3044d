//! Run supervisor.
//!
//! [`ScanEngine`] owns every job from submission to seal:
//!
//! ```text
//! submit ──> Loading ──> Classifying ──> Planning ──> Executing ──> Normalizing ──> Sealed
//!              │                                         │
//!              └── LoadError returned to the caller       └── timeout: straight to Sealed(timed_out)
//! ```
//!
//! Loading happens inside `submit` so load errors reach the caller directly.
//! Everything after that runs on a spawned task; callers observe it through
//! [`ScanEngine::subscribe`] and [`ScanEngine::await_result`].

use std::sync::{Arc, Mutex};

use chrono::NaiveDate;
use rustc_hash::FxHashMap;
use tokio::sync::{RwLock, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

use super::job::{JobId, ScanJob, ScanRequest};
use super::ledger::RunLedger;
use super::outcome::{Diagnostic, DiagnosticKind, RunOutcome, RunStatus};
use super::phase::{PhaseTracker, RunPhase};
use crate::classify::{ExecutionPattern, classify};
use crate::config::EngineConfig;
use crate::data::DataSource;
use crate::error::{Error, LoadError, Result};
use crate::execute::{AbortHandle, AdapterReport, JobEnv, panic_message, plan};
use crate::normalize::normalize;
use crate::progress::{ProgressSink, ProgressStream};
use crate::script::{ScriptLoader, ScriptUnit};

/// Per-job state held by the engine.
struct JobEntry {
    job: Arc<ScanJob>,
    phase: Mutex<PhaseTracker>,
    progress: ProgressSink,
    ledger: Arc<RunLedger>,
    cancel: AbortHandle,
    teardown: CancellationToken,
    outcome: watch::Sender<Option<Arc<RunOutcome>>>,
}

impl JobEntry {
    fn new(job: Arc<ScanJob>) -> Self {
        let (outcome, _) = watch::channel(None);
        Self {
            job,
            phase: Mutex::new(PhaseTracker::new()),
            progress: ProgressSink::new(),
            ledger: Arc::new(RunLedger::new()),
            cancel: AbortHandle::new(),
            teardown: CancellationToken::new(),
            outcome,
        }
    }

    fn phase(&self) -> RunPhase {
        self.phase
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .current()
    }

    fn advance(&self, next: RunPhase) {
        let mut tracker = self.phase.lock().unwrap_or_else(|p| p.into_inner());
        if let Err(e) = tracker.advance(next) {
            tracing::error!(error = %e, "internal phase error");
        }
    }

    /// Publish the outcome. Nothing about the job changes afterwards.
    fn seal(&self, outcome: RunOutcome) {
        let status = outcome.status;
        self.advance(RunPhase::Sealed(status));
        self.outcome.send_replace(Some(Arc::new(outcome)));
        self.progress.emit(100, status.as_str());
        self.progress.seal();
    }
}

struct EngineInner {
    config: EngineConfig,
    loader: ScriptLoader,
    jobs: RwLock<FxHashMap<JobId, Arc<JobEntry>>>,
}

/// Entry point for running scanning scripts.
///
/// Cheap to clone; clones share the same jobs.
#[derive(Clone)]
pub struct ScanEngine {
    inner: Arc<EngineInner>,
}

impl ScanEngine {
    pub fn new(config: EngineConfig, source: Arc<dyn DataSource>) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            inner: Arc::new(EngineInner {
                loader: ScriptLoader::new(config.clone(), source),
                config,
                jobs: RwLock::new(FxHashMap::default()),
            }),
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.inner.config
    }

    /// Submit a script for the inclusive range `start..=end`.
    pub async fn submit(
        &self,
        script_text: impl Into<String>,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<JobId> {
        self.submit_job(ScanRequest::new(script_text, start, end))
            .await
    }

    /// Submit a request.
    ///
    /// Validates the range and loads the script before returning; a script
    /// that cannot be loaded is reported here as [`Error::Load`] and never
    /// becomes a job.
    pub async fn submit_job(&self, request: ScanRequest) -> Result<JobId> {
        let job = Arc::new(ScanJob::from_request(request)?);
        let job_id = job.job_id();
        let span = tracing::info_span!("scan_job", job = %job_id);

        async {
            tracing::info!(start = %job.start_date(), end = %job.end_date(), "job submitted");
            let entry = Arc::new(JobEntry::new(job.clone()));
            entry.advance(RunPhase::Loading);

            let unit = match self.load(&entry).await {
                Ok(unit) => unit,
                Err(e) => {
                    tracing::warn!(error = %e, "script failed to load");
                    return Err(e);
                }
            };

            self.inner
                .jobs
                .write()
                .await
                .insert(job_id, entry.clone());
            let task =
                tokio::spawn(run_job(self.inner.clone(), entry.clone(), unit).in_current_span());
            tokio::spawn(watch_job(entry, task).in_current_span());
            Ok(job_id)
        }
        .instrument(span)
        .await
    }

    async fn load(&self, entry: &JobEntry) -> Result<ScriptUnit> {
        let loader = self.inner.loader.clone();
        let job = entry.job.clone();
        let teardown = entry.teardown.clone();
        let limit = self.inner.config.load_timeout();

        let task = tokio::task::spawn_blocking(move || {
            loader.load(
                job.job_id(),
                job.script_text(),
                job.start_date(),
                job.end_date(),
                teardown,
            )
        });

        match tokio::time::timeout(limit, task).await {
            Ok(Ok(loaded)) => Ok(loaded?),
            Ok(Err(join)) => Err(Error::Worker(format!("script loader failed: {}", join))),
            Err(_) => {
                // Stops the top-level code at its next operation.
                entry.teardown.cancel();
                Err(LoadError::ExecutionDuringLoad {
                    message: format!("timed out after {}ms", limit.as_millis()),
                }
                .into())
            }
        }
    }

    async fn entry(&self, job_id: JobId) -> Result<Arc<JobEntry>> {
        self.inner
            .jobs
            .read()
            .await
            .get(&job_id)
            .cloned()
            .ok_or(Error::JobNotFound(job_id))
    }

    /// Progress events for a job, replayed from the start.
    pub async fn subscribe(&self, job_id: JobId) -> Result<ProgressStream> {
        Ok(self.entry(job_id).await?.progress.subscribe())
    }

    /// Wait for a job to seal.
    pub async fn await_result(&self, job_id: JobId) -> Result<RunOutcome> {
        let entry = self.entry(job_id).await?;
        let mut rx = entry.outcome.subscribe();
        let sealed = rx
            .wait_for(Option::is_some)
            .await
            .map_err(|_| Error::Worker("job dropped before sealing".to_string()))?;
        match sealed.as_ref() {
            Some(outcome) => Ok(RunOutcome::clone(outcome)),
            None => Err(Error::Worker("job dropped before sealing".to_string())),
        }
    }

    /// Request cancellation.
    ///
    /// Returns `Ok(false)` if the job is already sealed. Cancellation is
    /// honoured at the adapter's next checkpoint.
    pub async fn cancel(&self, job_id: JobId) -> Result<bool> {
        let entry = self.entry(job_id).await?;
        if entry.phase().is_sealed() {
            return Ok(false);
        }
        entry.cancel.abort();
        tracing::info!(job = %job_id, "cancel requested");
        Ok(true)
    }

    /// Submit and wait for the outcome.
    pub async fn run(
        &self,
        script_text: impl Into<String>,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<RunOutcome> {
        let job_id = self.submit(script_text, start, end).await?;
        self.await_result(job_id).await
    }

    pub async fn phase(&self, job_id: JobId) -> Result<RunPhase> {
        Ok(self.entry(job_id).await?.phase())
    }

    /// Forget a sealed job. Returns `Ok(false)` if it is still running.
    pub async fn remove(&self, job_id: JobId) -> Result<bool> {
        let mut jobs = self.inner.jobs.write().await;
        let entry = jobs.get(&job_id).ok_or(Error::JobNotFound(job_id))?;
        if !entry.phase().is_sealed() {
            return Ok(false);
        }
        jobs.remove(&job_id);
        Ok(true)
    }

    pub async fn job_ids(&self) -> Vec<JobId> {
        self.inner.jobs.read().await.keys().copied().collect()
    }
}

/// Everything after loading: classify, plan, execute, normalize, seal.
async fn run_job(inner: Arc<EngineInner>, entry: Arc<JobEntry>, unit: ScriptUnit) {
    let config = &inner.config;

    entry.advance(RunPhase::Classifying);
    let pattern = classify(unit.declarations());
    tracing::info!(pattern = %pattern.kind(), "script classified");

    entry.advance(RunPhase::Planning);
    let context = plan(&pattern, &unit);
    tracing::debug!(context = %context.kind(), "execution planned");

    entry.advance(RunPhase::Executing);
    unit.host().attach_progress(entry.progress.clone());
    let env = JobEnv {
        job: entry.job.clone(),
        progress: entry.progress.clone(),
        ledger: entry.ledger.clone(),
        cancel: entry.cancel.clone(),
        batch_size: config.progress_batch_size,
    };

    let limit = config.timeout();
    let execution = context.execute(unit, pattern.clone(), env);
    let (status, diagnostic) = match tokio::time::timeout(limit, execution).await {
        Ok(Ok(report)) => finished(&report),
        Ok(Err(e)) => {
            tracing::warn!(error = %e, "adapter failed");
            (
                RunStatus::Failed,
                Some(Diagnostic::new(DiagnosticKind::AdapterFatal, e.to_string())),
            )
        }
        Err(_) => {
            tracing::warn!(limit_ms = limit.as_millis() as u64, "job timed out");
            entry.teardown.cancel();
            (
                RunStatus::TimedOut,
                Some(Diagnostic::new(
                    DiagnosticKind::Timeout,
                    format!("execution exceeded {}ms", limit.as_millis()),
                )),
            )
        }
    };

    if status != RunStatus::TimedOut {
        entry.advance(RunPhase::Normalizing);
    }
    let outcome = build_outcome(&entry, pattern, status, diagnostic);
    tracing::info!(
        status = %outcome.status,
        results = outcome.results.len(),
        diagnostics = outcome.diagnostics.len(),
        "job sealed"
    );
    entry.seal(outcome);
}

/// Status of an adapter run that returned normally.
///
/// Only the adapter's own report decides `cancelled`. A cancel that arrives
/// after the last symbol was scanned leaves the job `completed`.
fn finished(report: &AdapterReport) -> (RunStatus, Option<Diagnostic>) {
    if report.failed_all() {
        tracing::warn!(items = report.items_total, "every item failed");
    }
    if report.cancelled {
        (
            RunStatus::Cancelled,
            Some(Diagnostic::new(
                DiagnosticKind::Cancelled,
                "cancelled by caller",
            )),
        )
    } else {
        (RunStatus::Completed, None)
    }
}

/// Seal a job whose task died before publishing an outcome.
async fn watch_job(entry: Arc<JobEntry>, task: JoinHandle<()>) {
    let Err(e) = task.await else {
        return;
    };
    if entry.phase().is_sealed() {
        return;
    }
    let message = if e.is_panic() {
        panic_message(e.into_panic().as_ref())
    } else {
        e.to_string()
    };
    tracing::error!(error = %message, "job task died before sealing");
    entry.teardown.cancel();
    entry.seal(RunOutcome {
        job_id: entry.job.job_id(),
        status: RunStatus::Failed,
        pattern: None,
        results: Vec::new(),
        diagnostics: vec![Diagnostic::new(
            DiagnosticKind::AdapterFatal,
            format!("internal error: {}", message),
        )],
    });
}

/// Seal the ledger and normalize whatever it holds.
fn build_outcome(
    entry: &JobEntry,
    pattern: ExecutionPattern,
    status: RunStatus,
    diagnostic: Option<Diagnostic>,
) -> RunOutcome {
    let job = &entry.job;
    let contents = entry.ledger.seal();
    let normalized = normalize(&contents.batches, job.start_date(), job.end_date());

    let filters = job.filters();
    let mut results: Vec<_> = normalized
        .results
        .into_iter()
        .filter(|r| filters.allows_symbol(&r.ticker))
        .collect();
    if let Some(max) = filters.max_results {
        results.truncate(max);
    }

    let mut diagnostics = contents.diagnostics;
    diagnostics.extend(normalized.drops);
    diagnostics.extend(diagnostic);

    RunOutcome {
        job_id: job.job_id(),
        status,
        pattern: Some(pattern),
        results,
        diagnostics,
    }
}
