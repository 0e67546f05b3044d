//! Adapter for `fn scan(symbol, start, end)` plus a symbol list.

use rhai::Dynamic;

use super::{AdapterReport, JobEnv, fatal, is_terminated};
use crate::classify::PatternKind;
use crate::error::Result;
use crate::normalize::{RawBatch, RawShape};
use crate::run::{Diagnostic, DiagnosticKind};
use crate::script::ScriptUnit;

const KIND: PatternKind = PatternKind::PerSymbolFunctionWithList;

/// Call `function` once per symbol.
///
/// A symbol whose call raises is recorded as a per-item failure and skipped.
/// The caller's cancel is checked before every symbol.
pub(super) fn run(
    unit: &mut ScriptUnit,
    function: &str,
    symbols: &[String],
    env: &JobEnv,
) -> Result<AdapterReport> {
    let symbols: Vec<&String> = symbols
        .iter()
        .filter(|s| env.filters().allows_symbol(s))
        .collect();
    let total = symbols.len();
    let (start, end) = (env.start_str(), env.end_str());
    let mut report = AdapterReport {
        items_total: total,
        ..AdapterReport::default()
    };

    env.progress.emit(0, format!("scanning {} symbols", total));

    for (i, symbol) in symbols.iter().enumerate() {
        if env.cancel.is_aborted() {
            tracing::info!(done = i, total, "scan cancelled");
            report.cancelled = true;
            break;
        }

        let args = (symbol.to_string(), start.clone(), end.clone());
        match unit.call(function, args) {
            Ok(value) => record(unit, symbol, &value, env),
            Err(err) if is_terminated(&err) => return Err(fatal(err)),
            Err(err) => {
                tracing::warn!(symbol = %symbol, error = %err, "symbol failed");
                // Rows emitted before the failure belong to the failed call.
                unit.host().take_emitted();
                report.items_failed += 1;
                env.ledger.push_diagnostic(Diagnostic::for_item(
                    DiagnosticKind::PerItemFailure,
                    symbol.as_str(),
                    err.to_string(),
                ));
            }
        }

        let done = i + 1;
        if done % env.batch_size == 0 || done == total {
            env.progress
                .emit_fraction(done, total, format!("scanned {}/{} symbols", done, total));
        }
    }

    Ok(report)
}

fn record(unit: &ScriptUnit, symbol: &str, value: &Dynamic, env: &JobEnv) {
    let shape = RawShape::from_dynamic(value);
    if !matches!(shape, RawShape::Empty) {
        env.ledger
            .push_batch(RawBatch::new(shape, KIND).with_origin(symbol));
    }

    let emitted = unit.host().take_emitted();
    if !emitted.is_empty() {
        let shape = RawShape::from_dynamic(&Dynamic::from_array(emitted));
        env.ledger
            .push_batch(RawBatch::new(shape, KIND).with_origin(symbol));
    }
}
