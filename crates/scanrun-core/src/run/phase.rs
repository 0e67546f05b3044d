//! Run phases and the one-directional state machine between them.

use serde::{Deserialize, Serialize};

use super::outcome::RunStatus;
use crate::error::{Error, Result};

/// Where a job is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "phase", content = "status", rename_all = "snake_case")]
pub enum RunPhase {
    Submitted,
    Loading,
    Classifying,
    Planning,
    Executing,
    Normalizing,
    Sealed(RunStatus),
}

impl RunPhase {
    fn rank(&self) -> u8 {
        match self {
            RunPhase::Submitted => 0,
            RunPhase::Loading => 1,
            RunPhase::Classifying => 2,
            RunPhase::Planning => 3,
            RunPhase::Executing => 4,
            RunPhase::Normalizing => 5,
            RunPhase::Sealed(_) => 6,
        }
    }

    pub fn is_sealed(&self) -> bool {
        matches!(self, RunPhase::Sealed(_))
    }
}

impl std::fmt::Display for RunPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RunPhase::Submitted => f.write_str("submitted"),
            RunPhase::Loading => f.write_str("loading"),
            RunPhase::Classifying => f.write_str("classifying"),
            RunPhase::Planning => f.write_str("planning"),
            RunPhase::Executing => f.write_str("executing"),
            RunPhase::Normalizing => f.write_str("normalizing"),
            RunPhase::Sealed(status) => write!(f, "sealed({})", status),
        }
    }
}

/// Tracks a job's phase and rejects transitions that go backwards.
///
/// Phases may be skipped (a timeout jumps from executing straight to sealed)
/// but never revisited, and nothing leaves [`RunPhase::Sealed`].
#[derive(Debug, Clone)]
pub struct PhaseTracker {
    current: RunPhase,
}

impl Default for PhaseTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl PhaseTracker {
    pub fn new() -> Self {
        Self {
            current: RunPhase::Submitted,
        }
    }

    pub fn current(&self) -> RunPhase {
        self.current
    }

    pub fn advance(&mut self, next: RunPhase) -> Result<()> {
        if self.current.is_sealed() || next.rank() <= self.current.rank() {
            return Err(Error::InvalidTransition {
                from: self.current.to_string(),
                to: next.to_string(),
            });
        }
        tracing::debug!(from = %self.current, to = %next, "phase transition");
        self.current = next;
        Ok(())
    }
}
