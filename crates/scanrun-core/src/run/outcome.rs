//! What a caller gets back from a run.

use serde::{Deserialize, Serialize};

use super::job::JobId;
use crate::classify::ExecutionPattern;
use crate::normalize::NormalizedResult;

/// Terminal status of a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Completed,
    Failed,
    TimedOut,
    Cancelled,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Completed => "completed",
            RunStatus::Failed => "failed",
            RunStatus::TimedOut => "timed_out",
            RunStatus::Cancelled => "cancelled",
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, RunStatus::Completed)
    }
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiagnosticKind {
    /// The script matched no known convention.
    ClassificationUnrecognized,
    /// One symbol or column failed; the run continued.
    PerItemFailure,
    /// The adapter failed as a whole.
    AdapterFatal,
    Timeout,
    /// A row was discarded during normalization.
    NormalizationDrop,
    Cancelled,
}

impl std::fmt::Display for DiagnosticKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            DiagnosticKind::ClassificationUnrecognized => "classification_unrecognized",
            DiagnosticKind::PerItemFailure => "per_item_failure",
            DiagnosticKind::AdapterFatal => "adapter_fatal",
            DiagnosticKind::Timeout => "timeout",
            DiagnosticKind::NormalizationDrop => "normalization_drop",
            DiagnosticKind::Cancelled => "cancelled",
        };
        f.write_str(s)
    }
}

/// Something noteworthy that happened during a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagnostic {
    pub kind: DiagnosticKind,
    /// The symbol or column the diagnostic is about, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub item: Option<String>,
    pub message: String,
}

impl Diagnostic {
    pub fn new(kind: DiagnosticKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            item: None,
            message: message.into(),
        }
    }

    pub fn for_item(kind: DiagnosticKind, item: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind,
            item: Some(item.into()),
            message: message.into(),
        }
    }
}

impl std::fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.item {
            Some(item) => write!(f, "[{}] {}: {}", self.kind, item, self.message),
            None => write!(f, "[{}] {}", self.kind, self.message),
        }
    }
}

/// The sealed result of a job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunOutcome {
    pub job_id: JobId,
    pub status: RunStatus,
    /// The convention the script was classified as, if classification ran.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pattern: Option<ExecutionPattern>,
    pub results: Vec<NormalizedResult>,
    pub diagnostics: Vec<Diagnostic>,
}

impl RunOutcome {
    pub fn diagnostics_of(&self, kind: DiagnosticKind) -> impl Iterator<Item = &Diagnostic> {
        self.diagnostics.iter().filter(move |d| d.kind == kind)
    }
}
