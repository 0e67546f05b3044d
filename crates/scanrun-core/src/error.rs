//! Error types for scanrun-core.

use chrono::NaiveDate;
use thiserror::Error;

use crate::run::JobId;

/// Result type for scanrun-core operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised while turning script text into a [`ScriptUnit`](crate::script::ScriptUnit).
///
/// Load errors are reported to the caller verbatim and are never retried.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LoadError {
    /// The script text could not be parsed.
    #[error("syntax error{}: {message}", line.map(|l| format!(" at line {}", l)).unwrap_or_default())]
    Syntax {
        message: String,
        line: Option<usize>,
    },

    /// Top-level (module initialization) code raised while loading.
    #[error("script failed during load: {message}")]
    ExecutionDuringLoad { message: String },
}

/// Errors reported by a [`DataSource`](crate::data::DataSource).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DataError {
    /// The requested symbol is not known to the source.
    #[error("unknown symbol: {0}")]
    UnknownSymbol(String),

    /// The source could not produce data.
    #[error("data source unavailable: {0}")]
    Unavailable(String),
}

/// Errors that can occur in scanrun-core.
#[derive(Debug, Error)]
pub enum Error {
    /// The script could not be loaded.
    #[error(transparent)]
    Load(#[from] LoadError),

    /// The requested date range is empty.
    #[error("invalid date range: {start} is after {end}")]
    InvalidDateRange { start: NaiveDate, end: NaiveDate },

    /// No job with the given id is known to the engine.
    #[error("job not found: {0}")]
    JobNotFound(JobId),

    /// An adapter failed for a reason other than a single item.
    #[error("adapter failed: {0}")]
    AdapterFatal(String),

    /// The execution context was torn down before the adapter finished.
    #[error("execution context torn down")]
    TornDown,

    /// A worker thread or scheduling context could not be started or exited abnormally.
    #[error("worker error: {0}")]
    Worker(String),

    /// A run phase transition went backwards or left a sealed job.
    #[error("invalid phase transition: {from} -> {to}")]
    InvalidTransition { from: String, to: String },

    /// Data source error.
    #[error("data error: {0}")]
    Data(#[from] DataError),

    /// Invalid engine configuration.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Render the error with a short recovery hint, for terminal output.
    pub fn with_hint(&self) -> String {
        let hint = match self {
            Error::Load(LoadError::Syntax { .. }) => {
                Some("check the script compiles as Rhai (functions use `fn`, maps use `#{...}`)")
            }
            Error::Load(LoadError::ExecutionDuringLoad { .. }) => {
                Some("top-level statements run once at load; move data access into functions")
            }
            Error::InvalidDateRange { .. } => Some("pass --start on or before --end"),
            Error::Data(DataError::UnknownSymbol(_)) => {
                Some("make sure the data file contains bars for every scanned symbol")
            }
            Error::Config(_) => Some("see EngineConfig for accepted keys"),
            _ => None,
        };

        match hint {
            Some(hint) => format!("{}\n  hint: {}", self, hint),
            None => self.to_string(),
        }
    }
}
