//! Pattern adapters.
//!
//! One adapter per [`ExecutionPattern`]. Each drives its convention against a
//! loaded unit, writing raw batches and diagnostics into the job's ledger and
//! progress into its sink. An adapter returning `Err` is fatal for the job;
//! per-item failures are recorded and never returned.

mod entry_point;
mod frame;
mod per_symbol;

use std::sync::Arc;

use chrono::NaiveDate;
use rhai::EvalAltResult;

use super::context::AbortHandle;
use crate::classify::{EntryStyle, ExecutionPattern};
use crate::error::{Error, Result};
use crate::progress::ProgressSink;
use crate::run::{Diagnostic, DiagnosticKind, RunLedger, ScanFilters, ScanJob};
use crate::script::ScriptUnit;

pub(crate) use entry_point::run_cooperative;

/// Everything an adapter needs besides the unit itself.
#[derive(Clone)]
pub struct JobEnv {
    pub job: Arc<ScanJob>,
    pub progress: ProgressSink,
    pub ledger: Arc<RunLedger>,
    pub cancel: AbortHandle,
    /// Items between per-symbol progress events.
    pub batch_size: usize,
}

impl JobEnv {
    pub fn start(&self) -> NaiveDate {
        self.job.start_date()
    }

    pub fn end(&self) -> NaiveDate {
        self.job.end_date()
    }

    pub fn filters(&self) -> &ScanFilters {
        self.job.filters()
    }

    fn start_str(&self) -> String {
        self.start().format("%Y-%m-%d").to_string()
    }

    fn end_str(&self) -> String {
        self.end().format("%Y-%m-%d").to_string()
    }
}

/// Summary of one adapter run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AdapterReport {
    pub items_total: usize,
    pub items_failed: usize,
    /// The caller's cancel was observed at a checkpoint.
    pub cancelled: bool,
}

impl AdapterReport {
    pub fn failed_all(&self) -> bool {
        self.items_total > 0 && self.items_failed == self.items_total
    }
}

/// Run a non-cooperative adapter to completion on the current thread.
pub(crate) fn run_blocking(
    unit: &mut ScriptUnit,
    pattern: &ExecutionPattern,
    env: &JobEnv,
) -> Result<AdapterReport> {
    match pattern {
        ExecutionPattern::PerSymbolFunctionWithList {
            function, symbols, ..
        } => per_symbol::run(unit, function, symbols, env),
        ExecutionPattern::SelfContainedEntryPoint {
            function,
            style: EntryStyle::Blocking,
        } => entry_point::run_blocking(unit, function, env),
        ExecutionPattern::SelfContainedEntryPoint {
            style: EntryStyle::Cooperative,
            ..
        } => Err(Error::Worker(
            "cooperative entry points need an owned scheduler".to_string(),
        )),
        ExecutionPattern::MultiColumnBooleanFrame { function, columns } => {
            frame::run(unit, function, columns, env)
        }
        ExecutionPattern::Unrecognized => Ok(run_unrecognized(unit, env)),
    }
}

/// Nothing to run: record why and finish normally.
pub(crate) fn run_unrecognized(unit: &ScriptUnit, env: &JobEnv) -> AdapterReport {
    let declared: Vec<String> = unit
        .declarations()
        .functions
        .iter()
        .map(|f| format!("{}/{}", f.name, f.arity()))
        .collect();
    let message = if declared.is_empty() {
        "script declares no functions".to_string()
    } else {
        format!(
            "no known calling convention matches (functions: {})",
            declared.join(", ")
        )
    };
    env.ledger.push_diagnostic(Diagnostic::new(
        DiagnosticKind::ClassificationUnrecognized,
        message,
    ));
    AdapterReport::default()
}

/// Map a script error escaping an adapter to a job-level error.
fn fatal(err: Box<EvalAltResult>) -> Error {
    if is_terminated(&err) {
        Error::TornDown
    } else {
        Error::AdapterFatal(err.to_string())
    }
}

fn is_terminated(err: &EvalAltResult) -> bool {
    match err {
        EvalAltResult::ErrorTerminated(..) => true,
        EvalAltResult::ErrorInFunctionCall(_, _, inner, _) => is_terminated(inner),
        _ => false,
    }
}
