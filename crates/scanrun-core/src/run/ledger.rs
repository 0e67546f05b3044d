//! Append-only record of what a run produced.

use std::sync::{Mutex, MutexGuard};

use super::outcome::Diagnostic;
use crate::normalize::RawBatch;

#[derive(Default)]
struct LedgerState {
    batches: Vec<RawBatch>,
    diagnostics: Vec<Diagnostic>,
    sealed: bool,
}

/// Raw batches and diagnostics collected while a job executes.
///
/// Shared between the supervisor and the execution context. Once sealed,
/// appends are ignored, so a worker that outlives its job's timeout cannot
/// change a result that was already reported.
#[derive(Default)]
pub struct RunLedger {
    state: Mutex<LedgerState>,
}

/// Contents of a sealed ledger.
#[derive(Debug, Default)]
pub struct LedgerContents {
    pub batches: Vec<RawBatch>,
    pub diagnostics: Vec<Diagnostic>,
}

impl RunLedger {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, LedgerState> {
        self.state.lock().unwrap_or_else(|p| p.into_inner())
    }

    /// Append a batch. Returns `false` if the ledger is sealed.
    pub fn push_batch(&self, batch: RawBatch) -> bool {
        let mut state = self.state();
        if state.sealed {
            return false;
        }
        state.batches.push(batch);
        true
    }

    /// Append a diagnostic. Returns `false` if the ledger is sealed.
    pub fn push_diagnostic(&self, diagnostic: Diagnostic) -> bool {
        let mut state = self.state();
        if state.sealed {
            return false;
        }
        state.diagnostics.push(diagnostic);
        true
    }

    /// Seal the ledger and take what it holds.
    ///
    /// A second seal returns empty contents.
    pub fn seal(&self) -> LedgerContents {
        let mut state = self.state();
        state.sealed = true;
        LedgerContents {
            batches: std::mem::take(&mut state.batches),
            diagnostics: std::mem::take(&mut state.diagnostics),
        }
    }

    pub fn is_sealed(&self) -> bool {
        self.state().sealed
    }

    pub fn batch_count(&self) -> usize {
        self.state().batches.len()
    }

    pub fn diagnostic_count(&self) -> usize {
        self.state().diagnostics.len()
    }
}
