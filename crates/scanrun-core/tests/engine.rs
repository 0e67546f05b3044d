//! Integration tests for the scan engine.
//!
//! Each test submits a script through [`ScanEngine`] and checks the sealed
//! outcome the way a caller would see it.

use std::sync::Arc;
use std::time::Duration;

use chrono::NaiveDate;
use futures::StreamExt;

use scanrun_core::{
    Bar, DiagnosticKind, EngineConfig, Error, LoadError, MemoryDataSource, PatternKind, RunPhase,
    RunStatus, ScanEngine, ScanFilters, ScanRequest,
};

fn day(d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 3, d).unwrap()
}

fn source() -> MemoryDataSource {
    let bars = |base: f64| {
        (4..=8)
            .map(|d| Bar::new(day(d), base, base + 2.0, base - 2.0, base + d as f64, 1_000))
            .collect::<Vec<_>>()
    };
    MemoryDataSource::new()
        .with_symbol("AAPL", bars(170.0))
        .with_symbol("MSFT", bars(400.0))
        .with_symbol("NVDA", bars(850.0))
}

fn engine_with(config: EngineConfig) -> ScanEngine {
    ScanEngine::new(config, Arc::new(source())).unwrap()
}

fn engine() -> ScanEngine {
    engine_with(EngineConfig::default().with_progress_batch_size(1))
}

const PER_SYMBOL: &str = r#"
    let SYMBOLS = ["AAPL", "MSFT"];

    fn scan(symbol, start, end) {
        let bars = fetch_bars(symbol, start, end);
        let last = bars[bars.len() - 1];
        #{ ticker: symbol, date: last.date, close: last.close }
    }
"#;

// =============================================================================
// Execution patterns
// =============================================================================

#[tokio::test]
async fn test_per_symbol_all_succeed() {
    let outcome = engine().run(PER_SYMBOL, day(1), day(31)).await.unwrap();

    assert_eq!(outcome.status, RunStatus::Completed);
    assert_eq!(
        outcome.pattern.as_ref().map(|p| p.kind()),
        Some(PatternKind::PerSymbolFunctionWithList)
    );
    assert_eq!(outcome.results.len(), 2);
    assert!(outcome.diagnostics.is_empty());

    let tickers: Vec<_> = outcome.results.iter().map(|r| r.ticker.as_str()).collect();
    assert_eq!(tickers, vec!["AAPL", "MSFT"]);
    assert!(outcome.results.iter().all(|r| r.date == day(8)));
}

#[tokio::test]
async fn test_per_symbol_failure_is_isolated() {
    let script = r#"
        let SYMBOLS = ["AAPL", "MSFT"];

        fn scan(symbol, start, end) {
            if symbol == "MSFT" { throw "upstream rejected " + symbol; }
            #{ ticker: symbol, date: start }
        }
    "#;
    let outcome = engine().run(script, day(4), day(31)).await.unwrap();

    assert_eq!(outcome.status, RunStatus::Completed);
    assert_eq!(outcome.results.len(), 1);
    assert_eq!(outcome.results[0].ticker, "AAPL");

    assert_eq!(outcome.diagnostics.len(), 1);
    let diagnostic = &outcome.diagnostics[0];
    assert_eq!(diagnostic.kind, DiagnosticKind::PerItemFailure);
    assert_eq!(diagnostic.item.as_deref(), Some("MSFT"));
    assert!(diagnostic.message.contains("upstream rejected"));
}

#[tokio::test]
async fn test_blocking_entry_point() {
    let script = r#"
        fn main() {
            let hits = [];
            for symbol in universe() {
                let bars = fetch_bars(symbol);
                if bars[bars.len() - 1].close > 500.0 {
                    hits.push(#{ symbol: symbol, date: bars[0].date });
                }
            }
            hits
        }
    "#;
    let outcome = engine().run(script, day(1), day(31)).await.unwrap();

    assert_eq!(outcome.status, RunStatus::Completed);
    assert_eq!(
        outcome.pattern.as_ref().map(|p| p.kind()),
        Some(PatternKind::SelfContainedBlocking)
    );
    let tickers: Vec<_> = outcome.results.iter().map(|r| r.ticker.as_str()).collect();
    assert_eq!(tickers, vec!["NVDA"]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_cooperative_entry_point_inside_host_runtime() {
    let script = r#"
        fn run_async() {
            universe_async().and_then(|symbols| {
                gather(symbols.map(|s| fetch_async(s).and_then(|bars| #{
                    ticker: bars[0].close.to_string(),
                    date: bars[0].date,
                })))
            })
        }
    "#;
    let outcome = engine().run(script, day(1), day(31)).await.unwrap();

    assert_eq!(outcome.status, RunStatus::Completed);
    assert_eq!(
        outcome.pattern.as_ref().map(|p| p.kind()),
        Some(PatternKind::SelfContainedCooperative)
    );
    assert_eq!(outcome.results.len(), 3);
}

#[tokio::test]
async fn test_signal_frame_categories() {
    let script = r#"
        const SIGNAL_COLUMNS = ["above_500", "first_day"];

        fn compute_signals(start, end) {
            let frame = #{ ticker: [], date: [], above_500: [], first_day: [] };
            for symbol in universe() {
                for bar in fetch_bars(symbol, start, end) {
                    frame.ticker.push(symbol);
                    frame.date.push(bar.date);
                    frame.above_500.push(bar.close > 500.0);
                    frame.first_day.push(bar.date == start);
                }
            }
            frame
        }
    "#;
    let outcome = engine().run(script, day(4), day(8)).await.unwrap();

    assert_eq!(outcome.status, RunStatus::Completed);
    let above: Vec<_> = outcome
        .results
        .iter()
        .filter(|r| r.category() == Some("above_500"))
        .collect();
    assert_eq!(above.len(), 5);
    assert!(above.iter().all(|r| r.ticker == "NVDA"));

    let first: Vec<_> = outcome
        .results
        .iter()
        .filter(|r| r.category() == Some("first_day"))
        .collect();
    assert_eq!(first.len(), 3);
    assert!(first.iter().all(|r| r.date == day(4)));
}

#[tokio::test]
async fn test_unrecognized_script_completes_with_diagnostic() {
    let script = r#"
        fn helper(a, b) { a + b }
    "#;
    let outcome = engine().run(script, day(1), day(31)).await.unwrap();

    assert_eq!(outcome.status, RunStatus::Completed);
    assert_eq!(
        outcome.pattern.as_ref().map(|p| p.kind()),
        Some(PatternKind::Unrecognized)
    );
    assert!(outcome.results.is_empty());
    assert_eq!(
        outcome.diagnostics_of(DiagnosticKind::ClassificationUnrecognized).count(),
        1
    );
}

// =============================================================================
// Failures, timeouts, cancellation
// =============================================================================

#[tokio::test]
async fn test_syntax_error_reported_by_submit() {
    let err = engine()
        .submit("fn main( { 1 }", day(1), day(31))
        .await
        .unwrap_err();
    assert!(
        matches!(err, Error::Load(LoadError::Syntax { .. })),
        "unexpected error: {:?}",
        err
    );
}

#[tokio::test]
async fn test_top_level_failure_reported_by_submit() {
    let engine = engine();
    let err = engine
        .submit("throw \"bad config\";", day(1), day(31))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        Error::Load(LoadError::ExecutionDuringLoad { .. })
    ));
    assert!(engine.job_ids().await.is_empty());
}

#[tokio::test]
async fn test_load_timeout_reported_by_submit() {
    let engine = engine_with(EngineConfig::default().with_load_timeout(Duration::from_millis(100)));
    let err = engine.submit("loop { }", day(1), day(31)).await.unwrap_err();

    assert!(
        matches!(err, Error::Load(LoadError::ExecutionDuringLoad { .. })),
        "unexpected error: {err}"
    );
    assert!(engine.job_ids().await.is_empty());
}

#[tokio::test]
async fn test_inverted_range_rejected() {
    let err = engine().submit(PER_SYMBOL, day(10), day(1)).await.unwrap_err();
    assert!(matches!(err, Error::InvalidDateRange { .. }));
}

#[tokio::test]
async fn test_raising_entry_point_fails_job() {
    let outcome = engine()
        .run(r#"fn main() { throw "feed offline"; }"#, day(1), day(31))
        .await
        .unwrap();

    assert_eq!(outcome.status, RunStatus::Failed);
    assert!(outcome.results.is_empty());
    let fatal: Vec<_> = outcome.diagnostics_of(DiagnosticKind::AdapterFatal).collect();
    assert_eq!(fatal.len(), 1);
    assert!(fatal[0].message.contains("feed offline"));
}

#[tokio::test]
async fn test_runaway_script_times_out() {
    let engine = engine_with(EngineConfig::default().with_timeout(Duration::from_millis(200)));
    let job_id = engine
        .submit("fn main() { loop { } }", day(1), day(31))
        .await
        .unwrap();

    let outcome = engine.await_result(job_id).await.unwrap();
    assert_eq!(outcome.status, RunStatus::TimedOut);
    assert_eq!(outcome.diagnostics_of(DiagnosticKind::Timeout).count(), 1);
    assert_eq!(
        engine.phase(job_id).await.unwrap(),
        RunPhase::Sealed(RunStatus::TimedOut)
    );
}

#[tokio::test]
async fn test_timeout_keeps_recorded_rows() {
    let script = r#"
        let SYMBOLS = ["AAPL", "MSFT"];

        fn scan(symbol, start, end) {
            if symbol == "MSFT" { loop { } }
            #{ ticker: symbol, date: start }
        }
    "#;
    let engine = engine_with(EngineConfig::default().with_timeout(Duration::from_millis(300)));
    let outcome = engine.run(script, day(1), day(31)).await.unwrap();

    assert_eq!(outcome.status, RunStatus::TimedOut);
    assert_eq!(outcome.results.len(), 1);
    assert_eq!(outcome.results[0].ticker, "AAPL");
    assert_eq!(outcome.diagnostics_of(DiagnosticKind::Timeout).count(), 1);
}

#[tokio::test]
async fn test_out_of_range_epoch_is_dropped_not_fatal() {
    let script = r#"
        fn main() {
            [#{ ticker: "AAPL", date: -9223372036854775807 - 1 }, #{ ticker: "MSFT", date: "2024-03-05" }]
        }
    "#;
    let engine = engine();
    let job_id = engine.submit(script, day(1), day(31)).await.unwrap();

    let outcome = tokio::time::timeout(Duration::from_secs(5), engine.await_result(job_id))
        .await
        .expect("job never sealed")
        .unwrap();
    assert_eq!(outcome.status, RunStatus::Completed);
    assert_eq!(outcome.results.len(), 1);
    assert_eq!(outcome.results[0].ticker, "MSFT");

    let drops: Vec<_> = outcome
        .diagnostics_of(DiagnosticKind::NormalizationDrop)
        .collect();
    assert_eq!(drops.len(), 1);
    assert_eq!(drops[0].item.as_deref(), Some("AAPL"));
}

#[tokio::test]
async fn test_cancel_running_job() {
    let symbols: Vec<String> = (0..40).map(|i| format!("\"S{}\"", i)).collect();
    let script = format!(
        r#"
        let SYMBOLS = [{}];

        fn scan(symbol, start, end) {{
            let n = 0;
            for i in 0..200000 {{ n += i; }}
            #{{ ticker: symbol, date: start, n: n }}
        }}
        "#,
        symbols.join(", ")
    );

    let engine = engine();
    let job_id = engine.submit(script, day(1), day(31)).await.unwrap();
    assert!(engine.cancel(job_id).await.unwrap());

    let outcome = engine.await_result(job_id).await.unwrap();
    assert_eq!(outcome.status, RunStatus::Cancelled);
    assert!(outcome.results.len() < 40);
    assert_eq!(outcome.diagnostics_of(DiagnosticKind::Cancelled).count(), 1);
}

#[tokio::test]
async fn test_cancel_sealed_job_is_noop() {
    let engine = engine();
    let job_id = engine.submit(PER_SYMBOL, day(1), day(31)).await.unwrap();
    let outcome = engine.await_result(job_id).await.unwrap();
    assert_eq!(outcome.status, RunStatus::Completed);

    assert!(!engine.cancel(job_id).await.unwrap());
    let again = engine.await_result(job_id).await.unwrap();
    assert_eq!(again.status, RunStatus::Completed);
    assert_eq!(again.results, outcome.results);
}

#[tokio::test]
async fn test_unknown_job() {
    let engine = engine();
    let other = engine_with(EngineConfig::default());
    let job_id = other.submit(PER_SYMBOL, day(1), day(31)).await.unwrap();

    assert!(matches!(
        engine.cancel(job_id).await,
        Err(Error::JobNotFound(id)) if id == job_id
    ));
    assert!(matches!(
        engine.await_result(job_id).await,
        Err(Error::JobNotFound(_))
    ));
}

// =============================================================================
// Progress, filters, bookkeeping
// =============================================================================

#[tokio::test]
async fn test_progress_stream_is_monotonic_and_ends_at_seal() {
    let engine = engine();
    let job_id = engine.submit(PER_SYMBOL, day(1), day(31)).await.unwrap();

    let events: Vec<_> = engine.subscribe(job_id).await.unwrap().collect().await;
    assert!(!events.is_empty());
    assert!(events.windows(2).all(|w| w[0].percent <= w[1].percent));

    let last = events.last().unwrap();
    assert_eq!(last.percent, 100);
    assert_eq!(last.message, "completed");

    // A late subscriber replays the same events and then ends.
    let replay: Vec<_> = engine.subscribe(job_id).await.unwrap().collect().await;
    assert_eq!(replay, events);
}

#[tokio::test]
async fn test_symbol_filter_and_max_results() {
    let script = r#"
        fn main() {
            let rows = [];
            for symbol in universe() {
                for bar in fetch_bars(symbol) {
                    rows.push(#{ ticker: symbol, date: bar.date, close: bar.close });
                }
            }
            rows
        }
    "#;
    let request = ScanRequest::new(script, day(1), day(31)).with_filters(ScanFilters {
        symbols: Some(vec!["msft".to_string(), "nvda".to_string()]),
        max_results: Some(4),
        ..ScanFilters::default()
    });

    let engine = engine();
    let job_id = engine.submit_job(request).await.unwrap();
    let outcome = engine.await_result(job_id).await.unwrap();

    assert_eq!(outcome.results.len(), 4);
    assert!(outcome.results.iter().all(|r| r.ticker != "AAPL"));
}

#[tokio::test]
async fn test_rows_outside_range_are_dropped() {
    let script = r#"
        fn main() {
            [
                #{ ticker: "AAPL", date: "2024-03-05" },
                #{ ticker: "AAPL", date: "2023-12-29" },
                #{ ticker: "MSFT" },
            ]
        }
    "#;
    let outcome = engine().run(script, day(1), day(31)).await.unwrap();

    assert_eq!(outcome.results.len(), 1);
    assert_eq!(outcome.results[0].date, day(5));
    // Missing date is a drop; out-of-range is not.
    assert_eq!(outcome.diagnostics_of(DiagnosticKind::NormalizationDrop).count(), 1);
}

#[tokio::test]
async fn test_remove_sealed_job() {
    let engine = engine();
    let job_id = engine.submit(PER_SYMBOL, day(1), day(31)).await.unwrap();
    assert_eq!(engine.job_ids().await, vec![job_id]);

    engine.await_result(job_id).await.unwrap();
    assert!(engine.remove(job_id).await.unwrap());
    assert!(engine.job_ids().await.is_empty());
    assert!(matches!(
        engine.remove(job_id).await,
        Err(Error::JobNotFound(_))
    ));
}

#[tokio::test]
async fn test_concurrent_jobs_are_isolated() {
    let engine = engine();
    let template = r#"
        fn main() {
            [#{ ticker: "AAPL", date: "2024-03-04", marker: MARKER }]
        }
    "#;
    let a = engine
        .submit(template.replace("MARKER", "\"a\""), day(1), day(31))
        .await
        .unwrap();
    let b = engine
        .submit(template.replace("MARKER", "\"b\""), day(1), day(31))
        .await
        .unwrap();

    let (a, b) = tokio::join!(engine.await_result(a), engine.await_result(b));
    let (a, b) = (a.unwrap(), b.unwrap());
    assert_eq!(a.results[0].attributes["marker"].to_string(), "a");
    assert_eq!(b.results[0].attributes["marker"].to_string(), "b");
}
