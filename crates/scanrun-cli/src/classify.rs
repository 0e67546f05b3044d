//! Classify command implementation for scanrun CLI.
//!
//! Loads a script without running any of its functions and prints which
//! calling convention it matches.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use chrono::NaiveDate;
use scanrun_core::script::GlobalShape;
use scanrun_core::{
    Declarations, EngineConfig, ExecutionPattern, JobId, MemoryDataSource, ScriptLoader, classify,
};
use tokio_util::sync::CancellationToken;

use crate::colors;

/// Load `script` and print its pattern and declarations.
pub async fn execute(script: &Path, data: Option<PathBuf>, json: bool) -> anyhow::Result<()> {
    let text = tokio::fs::read_to_string(script)
        .await
        .with_context(|| format!("failed to read script {}", script.display()))?;
    let source = match data {
        Some(path) => MemoryDataSource::from_json_file(path)?,
        None => MemoryDataSource::new(),
    };

    let loader = ScriptLoader::new(EngineConfig::default(), Arc::new(source));
    let today = chrono::Local::now().date_naive();
    let unit = tokio::task::spawn_blocking(move || load(loader, &text, today)).await??;

    let declarations = unit.declarations();
    let pattern = classify(declarations);

    if json {
        let value = serde_json::json!({
            "pattern": pattern,
            "declarations": declarations,
        });
        println!("{}", serde_json::to_string_pretty(&value)?);
    } else {
        print_pattern(&pattern);
        print_declarations(declarations);
    }
    Ok(())
}

fn load(
    loader: ScriptLoader,
    text: &str,
    today: NaiveDate,
) -> scanrun_core::Result<scanrun_core::ScriptUnit> {
    Ok(loader.load(JobId::new(), text, today, today, CancellationToken::new())?)
}

fn print_pattern(pattern: &ExecutionPattern) {
    println!(
        "{}Pattern:{} {}{}{}",
        colors::BOLD,
        colors::RESET,
        colors::CYAN,
        pattern.kind(),
        colors::RESET
    );
    match pattern {
        ExecutionPattern::PerSymbolFunctionWithList {
            function,
            list,
            symbols,
        } => {
            println!("  function: {}", function);
            println!("  list:     {} ({} symbols)", list, symbols.len());
        }
        ExecutionPattern::SelfContainedEntryPoint { function, .. } => {
            println!("  function: {}", function);
        }
        ExecutionPattern::MultiColumnBooleanFrame { function, columns } => {
            println!("  function: {}", function);
            println!("  columns:  {}", columns.join(", "));
        }
        ExecutionPattern::Unrecognized => {
            println!(
                "  {}no known calling convention matches{}",
                colors::YELLOW,
                colors::RESET
            );
        }
    }
}

fn print_declarations(declarations: &Declarations) {
    println!("\n{}Functions:{}", colors::BOLD, colors::RESET);
    if declarations.functions.is_empty() {
        println!("  {}(none){}", colors::DIM, colors::RESET);
    }
    for function in &declarations.functions {
        println!("  {}({})", function.name, function.params.join(", "));
    }

    println!("\n{}Globals:{}", colors::BOLD, colors::RESET);
    if declarations.globals.is_empty() {
        println!("  {}(none){}", colors::DIM, colors::RESET);
    }
    for global in &declarations.globals {
        let keyword = if global.constant { "const" } else { "let" };
        println!(
            "  {} {} {}{}{}",
            keyword,
            global.name,
            colors::DIM,
            describe(&global.shape),
            colors::RESET
        );
    }
}

fn describe(shape: &GlobalShape) -> String {
    match shape {
        GlobalShape::StringList(items) => format!("[{} strings]", items.len()),
        GlobalShape::List(len) => format!("[{} items]", len),
        GlobalShape::Map => "map".to_string(),
        GlobalShape::Scalar => "scalar".to_string(),
        GlobalShape::Other(type_name) => type_name.clone(),
    }
}
