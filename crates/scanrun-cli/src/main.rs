//! scanrun CLI - run market-scanning scripts against local bar data.

mod classify;
mod colors;
mod output;
mod run;

use std::path::PathBuf;
use std::process::ExitCode;

use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use scanrun_core::ScanFilters;

#[derive(Parser)]
#[command(name = "scanrun")]
#[command(about = "Execute market-scanning scripts and collect normalized results")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a scanning script over a date range
    Run {
        /// Path to the script (.rhai file)
        script: PathBuf,

        /// First day of the range (YYYY-MM-DD)
        #[arg(long)]
        start: NaiveDate,

        /// Last day of the range, inclusive (YYYY-MM-DD)
        #[arg(long)]
        end: NaiveDate,

        /// JSON bar file: { "SYMBOL": [{ "date", "open", "high", "low", "close", "volume" }] }
        #[arg(short, long)]
        data: Option<PathBuf>,

        /// Only keep results for these symbols (comma separated)
        #[arg(long, value_delimiter = ',')]
        symbols: Vec<String>,

        /// Only evaluate these signal columns (comma separated)
        #[arg(long, value_delimiter = ',')]
        categories: Vec<String>,

        /// Keep at most this many results
        #[arg(long)]
        max_results: Option<usize>,

        /// Execution timeout in milliseconds
        #[arg(long)]
        timeout_ms: Option<u64>,

        /// Engine config file (JSON)
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Print the outcome as JSON instead of a table
        #[arg(long)]
        json: bool,
    },

    /// Load a script and show which calling convention it matches
    Classify {
        /// Path to the script (.rhai file)
        script: PathBuf,

        /// JSON bar file, for scripts whose top level reads data
        #[arg(short, long)]
        data: Option<PathBuf>,

        /// Print as JSON
        #[arg(long)]
        json: bool,
    },
}

fn non_empty(values: Vec<String>) -> Option<Vec<String>> {
    if values.is_empty() { None } else { Some(values) }
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        tracing_subscriber::EnvFilter::from_default_env()
            .add_directive(tracing::Level::DEBUG.into())
    } else {
        tracing_subscriber::EnvFilter::from_default_env().add_directive(tracing::Level::WARN.into())
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    // Helper to format scanrun-core errors with recovery hints
    let format_error = |err: anyhow::Error| -> anyhow::Error {
        if let Some(core_err) = err.downcast_ref::<scanrun_core::Error>() {
            anyhow::anyhow!("{}", core_err.with_hint())
        } else {
            err
        }
    };

    let code = match cli.command {
        Commands::Run {
            script,
            start,
            end,
            data,
            symbols,
            categories,
            max_results,
            timeout_ms,
            config,
            json,
        } => {
            let args = run::RunArgs {
                script,
                start,
                end,
                data,
                config,
                timeout_ms,
                filters: ScanFilters {
                    symbols: non_empty(symbols),
                    categories: non_empty(categories),
                    max_results,
                },
                json,
            };
            let status = run::execute(args).await.map_err(format_error)?;
            // Partial results from a cancelled run still count as a failure.
            if status.is_success() {
                ExitCode::SUCCESS
            } else {
                ExitCode::FAILURE
            }
        }

        Commands::Classify { script, data, json } => {
            classify::execute(&script, data, json)
                .await
                .map_err(format_error)?;
            ExitCode::SUCCESS
        }
    };

    Ok(code)
}
