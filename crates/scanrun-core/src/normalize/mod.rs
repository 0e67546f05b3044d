//! Result normalization.
//!
//! Adapters hand over whatever the script produced: tables, record lists,
//! single records. [`normalize`] turns all of them into [`NormalizedResult`]s,
//! keeping only rows whose date falls inside the job's range.
//!
//! Normalization is idempotent: feeding [`NormalizedResult::to_record`] output
//! back through [`normalize`] yields the same results.

mod fields;
mod raw;
mod result;

pub use fields::{DATE_ALIASES, TICKER_ALIASES, parse_date};
pub use raw::{RawBatch, RawShape, Record};
pub use result::{CATEGORY_KEY, NormalizedResult, Scalar};

use chrono::NaiveDate;

use crate::run::{Diagnostic, DiagnosticKind};

/// Output of [`normalize`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Normalized {
    pub results: Vec<NormalizedResult>,
    /// One diagnostic per row (or batch) that could not be read.
    pub drops: Vec<Diagnostic>,
}

/// Normalize raw batches, in order, keeping rows dated within `start..=end`.
pub fn normalize(batches: &[RawBatch], start: NaiveDate, end: NaiveDate) -> Normalized {
    let mut out = Normalized::default();

    for batch in batches {
        if let RawShape::Unsupported(kind) = &batch.shape {
            out.drops.push(drop_diagnostic(
                batch.origin.as_deref(),
                format!("unsupported result shape: {}", kind),
            ));
            continue;
        }

        for record in batch.shape.clone().into_records() {
            match normalize_record(record, batch) {
                Ok(result) => {
                    if result.date >= start && result.date <= end {
                        out.results.push(result);
                    }
                }
                Err(diagnostic) => out.drops.push(diagnostic),
            }
        }
    }

    if !out.drops.is_empty() {
        tracing::debug!(dropped = out.drops.len(), "rows dropped during normalization");
    }
    out
}

fn normalize_record(
    mut record: Record,
    batch: &RawBatch,
) -> std::result::Result<NormalizedResult, Diagnostic> {
    let ticker = match fields::find_key(&record, TICKER_ALIASES).map(str::to_string) {
        Some(key) => {
            let value = record.remove(&key).unwrap_or_default();
            fields::parse_ticker(&value)
        }
        None => None,
    };
    let ticker = match ticker.or_else(|| batch.origin.clone()) {
        Some(ticker) => ticker,
        None => {
            return Err(drop_diagnostic(None, "row has no ticker"));
        }
    };

    let date = match fields::find_key(&record, DATE_ALIASES).map(str::to_string) {
        Some(key) => {
            let value = record.remove(&key).unwrap_or_default();
            match parse_date(&value) {
                Some(date) => date,
                None => {
                    return Err(drop_diagnostic(
                        Some(&ticker),
                        format!("unparseable date: {}", value),
                    ));
                }
            }
        }
        None => return Err(drop_diagnostic(Some(&ticker), "row has no date")),
    };

    let attributes = record
        .iter()
        .map(|(key, value)| (key.clone(), Scalar::from_json(value)))
        .collect();

    Ok(NormalizedResult {
        ticker,
        date,
        attributes,
        source_pattern: batch.pattern,
    })
}

fn drop_diagnostic(item: Option<&str>, message: impl Into<String>) -> Diagnostic {
    match item {
        Some(item) => Diagnostic::for_item(DiagnosticKind::NormalizationDrop, item, message),
        None => Diagnostic::new(DiagnosticKind::NormalizationDrop, message),
    }
}
