//! Terminal formatting for run outcomes.

use std::collections::BTreeSet;

use scanrun_core::{NormalizedResult, RunOutcome};

use crate::colors;

/// Widest a table cell may get before it is truncated.
const MAX_CELL: usize = 24;

/// Print the results table, diagnostics, and a summary line to stdout.
pub fn print_outcome(outcome: &RunOutcome) {
    if outcome.results.is_empty() {
        println!("{}No results.{}", colors::DIM, colors::RESET);
    } else {
        print_table(&outcome.results);
    }

    if !outcome.diagnostics.is_empty() {
        println!("\n{}Diagnostics:{}", colors::BOLD, colors::RESET);
        for diagnostic in &outcome.diagnostics {
            println!("  {}•{} {}", colors::YELLOW, colors::RESET, diagnostic);
        }
    }

    let pattern = outcome
        .pattern
        .as_ref()
        .map(|p| p.kind().to_string())
        .unwrap_or_else(|| "-".to_string());
    println!(
        "\n{}{}{} {} results, {} diagnostics {}({}){}",
        colors::for_status(outcome.status),
        outcome.status,
        colors::RESET,
        outcome.results.len(),
        outcome.diagnostics.len(),
        colors::DIM,
        pattern,
        colors::RESET
    );
}

fn print_table(results: &[NormalizedResult]) {
    let columns = attribute_columns(results);

    let mut header = vec!["ticker".to_string(), "date".to_string()];
    header.extend(columns.iter().cloned());

    let rows: Vec<Vec<String>> = results
        .iter()
        .map(|r| {
            let mut row = vec![r.ticker.clone(), r.date.to_string()];
            row.extend(columns.iter().map(|c| {
                r.attributes
                    .get(c)
                    .map(|v| truncate(&v.to_string()))
                    .unwrap_or_else(|| "-".to_string())
            }));
            row
        })
        .collect();

    let widths = column_widths(&header, &rows);

    println!("{}{}{}", colors::BOLD, format_row(&header, &widths), colors::RESET);
    println!("{}", "─".repeat(widths.iter().sum::<usize>() + 2 * (widths.len() - 1)));
    for row in &rows {
        println!("{}", format_row(row, &widths));
    }
}

/// Union of attribute keys, sorted, with `category` first when present.
fn attribute_columns(results: &[NormalizedResult]) -> Vec<String> {
    let keys: BTreeSet<&str> = results
        .iter()
        .flat_map(|r| r.attributes.keys().map(String::as_str))
        .collect();

    let mut columns = Vec::with_capacity(keys.len());
    if keys.contains(scanrun_core::normalize::CATEGORY_KEY) {
        columns.push(scanrun_core::normalize::CATEGORY_KEY.to_string());
    }
    columns.extend(
        keys.into_iter()
            .filter(|k| *k != scanrun_core::normalize::CATEGORY_KEY)
            .map(str::to_string),
    );
    columns
}

fn column_widths(header: &[String], rows: &[Vec<String>]) -> Vec<usize> {
    header
        .iter()
        .enumerate()
        .map(|(i, h)| {
            rows.iter()
                .map(|row| row[i].chars().count())
                .chain(std::iter::once(h.chars().count()))
                .max()
                .unwrap_or(0)
        })
        .collect()
}

fn format_row(cells: &[String], widths: &[usize]) -> String {
    cells
        .iter()
        .zip(widths)
        .map(|(cell, width)| format!("{:<width$}", cell, width = *width))
        .collect::<Vec<_>>()
        .join("  ")
        .trim_end()
        .to_string()
}

fn truncate(value: &str) -> String {
    if value.chars().count() <= MAX_CELL {
        value.to_string()
    } else {
        let head: String = value.chars().take(MAX_CELL - 1).collect();
        format!("{}…", head)
    }
}
