//! Types for the convention classifier.

use serde::{Deserialize, Serialize};

/// How a self-contained entry point hands back its result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryStyle {
    /// Runs to completion and returns its value.
    Blocking,
    /// Returns a suspended computation (a host `Task`) that the engine drives.
    Cooperative,
}

/// The calling convention a script implements.
///
/// Classification is total: every script maps to exactly one variant, with
/// [`ExecutionPattern::Unrecognized`] as the explicit fallback.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ExecutionPattern {
    /// `fn scan(symbol, start, end)` plus a list of symbols to call it with.
    PerSymbolFunctionWithList {
        function: String,
        list: String,
        symbols: Vec<String>,
    },
    /// One zero-argument entry point that fetches its own universe.
    SelfContainedEntryPoint { function: String, style: EntryStyle },
    /// One function producing a table with a boolean column per signal.
    MultiColumnBooleanFrame {
        function: String,
        columns: Vec<String>,
    },
    /// Nothing matched.
    Unrecognized,
}

impl ExecutionPattern {
    pub fn kind(&self) -> PatternKind {
        match self {
            ExecutionPattern::PerSymbolFunctionWithList { .. } => {
                PatternKind::PerSymbolFunctionWithList
            }
            ExecutionPattern::SelfContainedEntryPoint {
                style: EntryStyle::Blocking,
                ..
            } => PatternKind::SelfContainedBlocking,
            ExecutionPattern::SelfContainedEntryPoint {
                style: EntryStyle::Cooperative,
                ..
            } => PatternKind::SelfContainedCooperative,
            ExecutionPattern::MultiColumnBooleanFrame { .. } => {
                PatternKind::MultiColumnBooleanFrame
            }
            ExecutionPattern::Unrecognized => PatternKind::Unrecognized,
        }
    }

    /// The script function this pattern calls, if any.
    pub fn function(&self) -> Option<&str> {
        match self {
            ExecutionPattern::PerSymbolFunctionWithList { function, .. }
            | ExecutionPattern::SelfContainedEntryPoint { function, .. }
            | ExecutionPattern::MultiColumnBooleanFrame { function, .. } => Some(function),
            ExecutionPattern::Unrecognized => None,
        }
    }
}

/// Payload-free tag of an [`ExecutionPattern`], carried on every result row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PatternKind {
    PerSymbolFunctionWithList,
    SelfContainedBlocking,
    SelfContainedCooperative,
    MultiColumnBooleanFrame,
    Unrecognized,
}

impl PatternKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            PatternKind::PerSymbolFunctionWithList => "per_symbol_function_with_list",
            PatternKind::SelfContainedBlocking => "self_contained_blocking",
            PatternKind::SelfContainedCooperative => "self_contained_cooperative",
            PatternKind::MultiColumnBooleanFrame => "multi_column_boolean_frame",
            PatternKind::Unrecognized => "unrecognized",
        }
    }
}

impl std::fmt::Display for PatternKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
