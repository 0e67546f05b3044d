//! Jobs, their lifecycle, and the engine that supervises them.
//!
//! # Module Structure
//!
//! - `job` - Submitted jobs and caller filters
//! - `phase` - The one-directional run state machine
//! - `ledger` - Append-only raw output of a running job
//! - `outcome` - Sealed results and diagnostics
//! - `supervisor` - [`ScanEngine`], which drives jobs end to end

mod job;
mod ledger;
mod outcome;
mod phase;
mod supervisor;

pub use job::{JobId, ScanFilters, ScanJob, ScanRequest};
pub use ledger::{LedgerContents, RunLedger};
pub use outcome::{Diagnostic, DiagnosticKind, RunOutcome, RunStatus};
pub use phase::{PhaseTracker, RunPhase};
pub use supervisor::ScanEngine;
