//! Run command implementation for scanrun CLI.
//!
//! Submits a script to a local engine, streams progress to stderr, and prints
//! the sealed outcome.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Context;
use chrono::NaiveDate;
use futures::StreamExt;
use scanrun_core::{
    EngineConfig, MemoryDataSource, RunOutcome, RunStatus, ScanEngine, ScanFilters, ScanRequest,
};

use crate::colors;
use crate::output::print_outcome;

/// Arguments for `scanrun run`.
pub struct RunArgs {
    pub script: PathBuf,
    pub start: NaiveDate,
    pub end: NaiveDate,
    pub data: Option<PathBuf>,
    pub config: Option<PathBuf>,
    pub timeout_ms: Option<u64>,
    pub filters: ScanFilters,
    pub json: bool,
}

/// Run a script and report its outcome. Returns the sealed status.
pub async fn execute(args: RunArgs) -> anyhow::Result<RunStatus> {
    let started = Instant::now();

    let script = tokio::fs::read_to_string(&args.script)
        .await
        .with_context(|| format!("failed to read script {}", args.script.display()))?;
    let config = load_config(args.config.as_deref(), args.timeout_ms)?;
    let source = load_data(args.data.as_deref())?;

    let engine = ScanEngine::new(config, Arc::new(source))?;
    let request = ScanRequest::new(script, args.start, args.end).with_filters(args.filters);

    if !args.json {
        eprintln!(
            "{}Running{} {} ({} to {})",
            colors::BOLD,
            colors::RESET,
            args.script.display(),
            args.start,
            args.end
        );
    }

    let job_id = engine.submit_job(request).await?;
    let progress = tokio::spawn(stream_progress(engine.clone(), job_id, args.json));

    let outcome = tokio::select! {
        outcome = engine.await_result(job_id) => outcome?,
        _ = tokio::signal::ctrl_c() => {
            eprintln!("\n{}Cancelling...{}", colors::YELLOW, colors::RESET);
            engine.cancel(job_id).await?;
            engine.await_result(job_id).await?
        }
    };
    // The stream ends at seal; this only waits for the last line to print.
    progress.await.ok();

    if args.json {
        print_json(&outcome)?;
    } else {
        print_outcome(&outcome);
        eprintln!(
            "{}Finished in {:.2}s{}",
            colors::DIM,
            started.elapsed().as_secs_f64(),
            colors::RESET
        );
    }

    Ok(outcome.status)
}

/// Config file first, then flag overrides.
fn load_config(path: Option<&Path>, timeout_ms: Option<u64>) -> anyhow::Result<EngineConfig> {
    let mut config = match path {
        Some(path) => EngineConfig::from_file(path)?,
        None => EngineConfig::default(),
    };
    if let Some(ms) = timeout_ms {
        config = config.with_timeout(Duration::from_millis(ms));
    }
    Ok(config)
}

fn load_data(path: Option<&Path>) -> anyhow::Result<MemoryDataSource> {
    match path {
        Some(path) => {
            let source = MemoryDataSource::from_json_file(path)?;
            tracing::debug!(symbols = source.len(), "loaded bar data");
            Ok(source)
        }
        None => {
            tracing::warn!("no --data file given; data calls will find no symbols");
            Ok(MemoryDataSource::new())
        }
    }
}

async fn stream_progress(engine: ScanEngine, job_id: scanrun_core::JobId, quiet: bool) {
    let Ok(mut events) = engine.subscribe(job_id).await else {
        return;
    };
    while let Some(event) = events.next().await {
        if quiet {
            continue;
        }
        eprint!(
            "\r\x1b[2K{}[{:>3}%]{} {}",
            colors::CYAN,
            event.percent,
            colors::RESET,
            event.message
        );
        colors::flush_stderr();
    }
    if !quiet {
        eprintln!();
    }
}

fn print_json(outcome: &RunOutcome) -> anyhow::Result<()> {
    let text = serde_json::to_string_pretty(outcome)?;
    println!("{}", text);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_timeout_flag_overrides_config_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{ "timeout_ms": 5000, "progress_batch_size": 3 }}"#).unwrap();

        let config = load_config(Some(file.path()), Some(250)).unwrap();
        assert_eq!(config.timeout_ms, 250);
        assert_eq!(config.progress_batch_size, 3);

        let config = load_config(Some(file.path()), None).unwrap();
        assert_eq!(config.timeout_ms, 5000);
    }

    #[test]
    fn test_defaults_without_config() {
        assert_eq!(load_config(None, None).unwrap(), EngineConfig::default());
    }
}
