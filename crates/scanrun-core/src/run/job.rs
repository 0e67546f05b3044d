//! Jobs submitted to the engine.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{Error, Result};

/// Unique identifier of a submitted job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(Uuid);

impl JobId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for JobId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Optional caller restrictions on what a run reports.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanFilters {
    /// Only scan (and report) these symbols. Case-insensitive.
    pub symbols: Option<Vec<String>>,
    /// Only report these frame categories.
    pub categories: Option<Vec<String>>,
    /// Truncate the sealed result list.
    pub max_results: Option<usize>,
}

impl ScanFilters {
    pub fn allows_symbol(&self, symbol: &str) -> bool {
        match &self.symbols {
            Some(symbols) => symbols.iter().any(|s| s.eq_ignore_ascii_case(symbol)),
            None => true,
        }
    }

    pub fn allows_category(&self, category: &str) -> bool {
        match &self.categories {
            Some(categories) => categories.iter().any(|c| c == category),
            None => true,
        }
    }
}

/// What a caller asks the engine to run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanRequest {
    pub script_text: String,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    #[serde(default)]
    pub filters: ScanFilters,
}

impl ScanRequest {
    pub fn new(script_text: impl Into<String>, start_date: NaiveDate, end_date: NaiveDate) -> Self {
        Self {
            script_text: script_text.into(),
            start_date,
            end_date,
            filters: ScanFilters::default(),
        }
    }

    pub fn with_filters(mut self, filters: ScanFilters) -> Self {
        self.filters = filters;
        self
    }
}

/// An accepted job. Immutable once created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScanJob {
    job_id: JobId,
    script_text: String,
    start_date: NaiveDate,
    end_date: NaiveDate,
    filters: ScanFilters,
}

impl ScanJob {
    /// Validate a request and assign it an id.
    pub fn from_request(request: ScanRequest) -> Result<Self> {
        if request.start_date > request.end_date {
            return Err(Error::InvalidDateRange {
                start: request.start_date,
                end: request.end_date,
            });
        }
        Ok(Self {
            job_id: JobId::new(),
            script_text: request.script_text,
            start_date: request.start_date,
            end_date: request.end_date,
            filters: request.filters,
        })
    }

    pub fn job_id(&self) -> JobId {
        self.job_id
    }

    pub fn script_text(&self) -> &str {
        &self.script_text
    }

    pub fn start_date(&self) -> NaiveDate {
        self.start_date
    }

    pub fn end_date(&self) -> NaiveDate {
        self.end_date
    }

    pub fn filters(&self) -> &ScanFilters {
        &self.filters
    }
}
