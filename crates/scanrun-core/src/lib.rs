//! Core engine for scanrun, the scanner execution engine.
//!
//! This crate provides:
//! - Script loading into isolated, disposable Rhai engines
//! - Classification of scripts into known calling conventions
//! - Execution on dedicated workers or job-owned schedulers
//! - Normalization of heterogeneous result shapes
//! - Job supervision with progress, timeouts and cancellation

pub mod classify;
pub mod config;
pub mod data;
pub mod error;
pub mod execute;
pub mod normalize;
pub mod progress;
pub mod run;
pub mod script;

pub use classify::{EntryStyle, ExecutionPattern, PatternKind, classify};
pub use config::EngineConfig;
pub use data::{Bar, DataSource, MemoryDataSource};
pub use error::{DataError, Error, LoadError, Result};
pub use execute::{AbortHandle, ContextKind, ExecutionContext, plan};
pub use normalize::{Normalized, NormalizedResult, RawBatch, RawShape, Scalar, normalize};
pub use progress::{ProgressEvent, ProgressSink, ProgressStream};
pub use run::{
    Diagnostic, DiagnosticKind, JobId, RunOutcome, RunPhase, RunStatus, ScanEngine, ScanFilters,
    ScanJob, ScanRequest,
};
pub use script::{Declarations, ScriptLoader, ScriptUnit, Task};
