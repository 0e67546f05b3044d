//! Convention classifier.
//!
//! Maps a script's [`Declarations`] to the one [`ExecutionPattern`] it
//! implements. Classification never executes script code and never fails.
//!
//! Rules, first match wins:
//!
//! 1. A three-parameter per-item function and a string-list global named like
//!    a symbol list: [`ExecutionPattern::PerSymbolFunctionWithList`].
//! 2. No symbol list and exactly one zero-parameter entry point:
//!    [`ExecutionPattern::SelfContainedEntryPoint`]. An `_async` suffix marks
//!    it cooperative.
//! 3. Exactly one frame function and a `SIGNAL_COLUMNS` global listing at
//!    least two columns: [`ExecutionPattern::MultiColumnBooleanFrame`].
//! 4. Otherwise [`ExecutionPattern::Unrecognized`].

mod types;

pub use types::{EntryStyle, ExecutionPattern, PatternKind};

use crate::script::{DeclaredFn, DeclaredGlobal, Declarations};

/// Per-item function names, in order of preference.
pub const PER_ITEM_FUNCTIONS: &[&str] = &[
    "scan",
    "scan_symbol",
    "scan_ticker",
    "screen",
    "check_symbol",
    "analyze",
];

/// Global names recognised as symbol lists (case-insensitive).
pub const LIST_GLOBALS: &[&str] = &["SYMBOLS", "TICKERS", "UNIVERSE", "WATCHLIST"];

/// Entry point names; each may also carry the [`COOPERATIVE_SUFFIX`].
pub const ENTRY_POINTS: &[&str] = &["main", "run", "run_scan", "scan_all"];

pub const COOPERATIVE_SUFFIX: &str = "_async";

/// Functions producing a signal frame.
pub const FRAME_FUNCTIONS: &[&str] = &["compute_signals", "compute_frame", "build_frame"];

/// Global listing the boolean columns of a frame.
pub const SIGNAL_COLUMNS: &str = "SIGNAL_COLUMNS";

/// Classify a loaded script.
pub fn classify(decl: &Declarations) -> ExecutionPattern {
    let list = symbol_list(decl);

    if let Some((list, symbols)) = list {
        if let Some(function) = per_item_function(decl) {
            return ExecutionPattern::PerSymbolFunctionWithList {
                function: function.name.clone(),
                list: list.name.clone(),
                symbols: symbols.to_vec(),
            };
        }
    } else if let Some((function, style)) = entry_point(decl) {
        return ExecutionPattern::SelfContainedEntryPoint {
            function: function.name.clone(),
            style,
        };
    }

    if let Some((function, columns)) = signal_frame(decl) {
        return ExecutionPattern::MultiColumnBooleanFrame {
            function: function.name.clone(),
            columns: columns.to_vec(),
        };
    }

    ExecutionPattern::Unrecognized
}

/// The first declared symbol list, by [`LIST_GLOBALS`] order.
fn symbol_list(decl: &Declarations) -> Option<(&DeclaredGlobal, &[String])> {
    LIST_GLOBALS.iter().find_map(|name| {
        let global = decl.global(name)?;
        global.string_list().map(|symbols| (global, symbols))
    })
}

fn per_item_function(decl: &Declarations) -> Option<&DeclaredFn> {
    let candidates: Vec<&DeclaredFn> = decl.functions.iter().filter(|f| f.arity() == 3).collect();

    let preferred = PER_ITEM_FUNCTIONS
        .iter()
        .find_map(|name| candidates.iter().find(|f| f.name == *name).copied());
    if preferred.is_some() {
        return preferred;
    }

    match candidates.as_slice() {
        [only] => Some(*only),
        _ => None,
    }
}

/// The script's self-contained entry point, if exactly one exists.
pub fn entry_point(decl: &Declarations) -> Option<(&DeclaredFn, EntryStyle)> {
    let mut found = decl
        .functions
        .iter()
        .filter(|f| f.arity() == 0)
        .filter_map(|f| entry_style(&f.name).map(|style| (f, style)));

    let first = found.next()?;
    if found.next().is_some() {
        return None;
    }
    Some(first)
}

fn entry_style(name: &str) -> Option<EntryStyle> {
    if ENTRY_POINTS.contains(&name) {
        return Some(EntryStyle::Blocking);
    }
    name.strip_suffix(COOPERATIVE_SUFFIX)
        .filter(|base| ENTRY_POINTS.contains(base))
        .map(|_| EntryStyle::Cooperative)
}

fn signal_frame(decl: &Declarations) -> Option<(&DeclaredFn, &[String])> {
    let mut frames = decl
        .functions
        .iter()
        .filter(|f| FRAME_FUNCTIONS.contains(&f.name.as_str()))
        .filter(|f| f.arity() == 0 || f.arity() == 2);

    let function = frames.next()?;
    if frames.next().is_some() {
        return None;
    }

    let columns = decl.global(SIGNAL_COLUMNS)?.string_list()?;
    if columns.len() < 2 {
        return None;
    }
    Some((function, columns))
}
