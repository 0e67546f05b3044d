//! Adapter for scripts that compute one table with a boolean column per signal.

use serde_json::Value;

use super::{AdapterReport, JobEnv, fatal};
use crate::classify::PatternKind;
use crate::error::{Error, Result};
use crate::normalize::{CATEGORY_KEY, RawBatch, RawShape, Record};
use crate::run::{Diagnostic, DiagnosticKind};
use crate::script::ScriptUnit;

const KIND: PatternKind = PatternKind::MultiColumnBooleanFrame;

/// Evaluate the frame once and split it into one record group per signal.
pub(super) fn run(
    unit: &mut ScriptUnit,
    function: &str,
    columns: &[String],
    env: &JobEnv,
) -> Result<AdapterReport> {
    env.progress.emit(0, format!("computing {}()", function));

    let takes_range = unit
        .declarations()
        .function(function)
        .is_some_and(|f| f.arity() == 2);
    let value = if takes_range {
        unit.call(function, (env.start_str(), env.end_str()))
    } else {
        unit.call(function, ())
    }
    .map_err(fatal)?;

    let shape = RawShape::from_dynamic(&value);
    if let RawShape::Unsupported(kind) = &shape {
        return Err(Error::AdapterFatal(format!(
            "{}() returned {}, expected a table",
            function, kind
        )));
    }
    let frame = shape.into_records();

    let selected: Vec<&String> = columns
        .iter()
        .filter(|c| env.filters().allows_category(c))
        .collect();
    let mut report = AdapterReport {
        items_total: selected.len(),
        ..AdapterReport::default()
    };

    for (i, column) in selected.iter().enumerate() {
        if !frame.is_empty() && !frame.iter().any(|row| row.contains_key(column.as_str())) {
            tracing::warn!(column = %column, "signal column missing from frame");
            report.items_failed += 1;
            env.ledger.push_diagnostic(Diagnostic::for_item(
                DiagnosticKind::PerItemFailure,
                column.as_str(),
                format!("column '{}' not found in frame", column),
            ));
        } else {
            let group: Vec<Record> = frame
                .iter()
                .filter(|row| row.get(column.as_str()) == Some(&Value::Bool(true)))
                .map(|row| tag(row, column, columns))
                .collect();
            if !group.is_empty() {
                env.ledger
                    .push_batch(RawBatch::new(RawShape::Records(group), KIND));
            }
        }
        env.progress.emit_fraction(
            i + 1,
            selected.len(),
            format!("collected signal '{}'", column),
        );
    }

    report.cancelled = env.cancel.is_aborted();
    Ok(report)
}

/// Copy a row without its signal columns, tagged with one category.
fn tag(row: &Record, category: &str, signals: &[String]) -> Record {
    let mut record: Record = row
        .iter()
        .filter(|(key, _)| !signals.contains(*key))
        .map(|(key, value)| (key.clone(), value.clone()))
        .collect();
    record.insert(CATEGORY_KEY.to_string(), Value::String(category.to_string()));
    record
}

#[cfg(test)]
mod tests {
    use super::super::test_support::*;
    use super::*;
    use crate::classify::classify;
    use crate::execute::adapter::run_blocking;
    use crate::normalize::{Scalar, normalize};
    use crate::run::{ScanFilters, ScanRequest};

    const SCRIPT: &str = r#"
        const SIGNAL_COLUMNS = ["breakout", "reversal"];

        fn compute_signals(start, end) {
            let frame = #{ ticker: [], date: [], close: [], breakout: [], reversal: [] };
            for symbol in universe() {
                for bar in fetch_bars(symbol, start, end) {
                    frame.ticker.push(symbol);
                    frame.date.push(bar.date);
                    frame.close.push(bar.close);
                    frame.breakout.push(bar.close > 35.0);
                    frame.reversal.push(bar.date == "2024-01-02");
                }
            }
            frame
        }
    "#;

    fn run_frame(env: &JobEnv) -> AdapterReport {
        let mut unit = load(env);
        let pattern = classify(unit.declarations());
        assert_eq!(pattern.kind(), KIND);
        run_blocking(&mut unit, &pattern, env).unwrap()
    }

    #[test]
    fn test_one_group_per_signal() {
        let env = env(SCRIPT);
        let report = run_frame(&env);
        assert_eq!(report.items_total, 2);
        assert_eq!(report.items_failed, 0);

        let contents = env.ledger.seal();
        let out = normalize(&contents.batches, env.start(), env.end());

        let breakouts: Vec<_> = out
            .results
            .iter()
            .filter(|r| r.category() == Some("breakout"))
            .collect();
        // CCC closes at 30 + day; only day 6 exceeds 35.
        assert_eq!(breakouts.len(), 1);
        assert_eq!(breakouts[0].ticker, "CCC");

        let reversals = out
            .results
            .iter()
            .filter(|r| r.category() == Some("reversal"))
            .count();
        assert_eq!(reversals, 3);

        // Signal columns are not attributes; other columns are.
        let first = &out.results[0];
        assert!(!first.attributes.contains_key("breakout"));
        assert!(!first.attributes.contains_key("reversal"));
        assert!(matches!(first.attributes["close"], Scalar::Float(_)));
    }

    #[test]
    fn test_category_filter() {
        let request = ScanRequest::new(SCRIPT, day(1), day(31)).with_filters(ScanFilters {
            categories: Some(vec!["reversal".to_string()]),
            ..ScanFilters::default()
        });
        let env = env_for(request);
        let report = run_frame(&env);
        assert_eq!(report.items_total, 1);

        let contents = env.ledger.seal();
        let out = normalize(&contents.batches, env.start(), env.end());
        assert!(out.results.iter().all(|r| r.category() == Some("reversal")));
    }

    #[test]
    fn test_missing_column_is_per_item_failure() {
        let env = env(r#"
            const SIGNAL_COLUMNS = ["breakout", "gap_up"];
            fn build_frame() {
                [#{ ticker: "AAA", date: "2024-01-02", breakout: true }]
            }
        "#);
        let report = run_frame(&env);
        assert_eq!(report.items_failed, 1);

        let contents = env.ledger.seal();
        assert_eq!(contents.diagnostics.len(), 1);
        assert_eq!(contents.diagnostics[0].item.as_deref(), Some("gap_up"));
        assert_eq!(contents.batches.len(), 1);
    }

    #[test]
    fn test_scalar_frame_is_fatal() {
        let env = env(r#"
            const SIGNAL_COLUMNS = ["a", "b"];
            fn compute_frame() { 42 }
        "#);
        let mut unit = load(&env);
        let pattern = classify(unit.declarations());
        let err = run_blocking(&mut unit, &pattern, &env).unwrap_err();
        assert!(matches!(err, Error::AdapterFatal(_)));
    }
}
