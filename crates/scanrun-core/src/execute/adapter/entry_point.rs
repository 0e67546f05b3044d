//! Adapter for scripts with a single self-contained entry point.

use rhai::Dynamic;

use super::{AdapterReport, JobEnv, fatal};
use crate::classify::PatternKind;
use crate::error::{Error, Result};
use crate::normalize::{RawBatch, RawShape};
use crate::script::{self, ScriptUnit, Task};

/// Globals read back when the entry point returns nothing.
const RESULT_GLOBALS: &[&str] = &["RESULTS", "HITS", "OUTPUT"];

/// Invoke a blocking entry point.
///
/// An entry point that hands back a [`Task`] anyway is driven on a fresh
/// scheduler owned by this worker thread.
pub(super) fn run_blocking(
    unit: &mut ScriptUnit,
    function: &str,
    env: &JobEnv,
) -> Result<AdapterReport> {
    env.progress.emit(0, format!("running {}()", function));
    let value = unit.call(function, ()).map_err(fatal)?;

    let (value, kind) = if value.is::<Task>() {
        tracing::debug!(function, "blocking entry point returned a task; promoting");
        (promote(unit, value.cast::<Task>())?, PatternKind::SelfContainedCooperative)
    } else {
        (value, PatternKind::SelfContainedBlocking)
    };

    Ok(collect(unit, value, kind, env))
}

fn promote(unit: &ScriptUnit, task: Task) -> Result<Dynamic> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(|e| Error::Worker(format!("failed to build scheduler: {}", e)))?;
    unit.host().set_cooperative(true);
    let teardown = unit.host().teardown_token();
    runtime.block_on(async {
        tokio::select! {
            value = script::resolve(unit, task) => value.map_err(Error::AdapterFatal),
            _ = teardown.cancelled() => Err(Error::TornDown),
        }
    })
}

/// Invoke a cooperative entry point and drive the task it returns.
///
/// Must run on a scheduler the job owns; blocking host calls are refused for
/// the duration.
pub(crate) async fn run_cooperative(
    unit: &mut ScriptUnit,
    function: &str,
    env: &JobEnv,
) -> Result<AdapterReport> {
    unit.host().set_cooperative(true);
    env.progress.emit(0, format!("running {}()", function));

    let value = unit.call(function, ()).map_err(fatal)?;
    let value = script::resolve(unit, Task::from_dynamic(value))
        .await
        .map_err(Error::AdapterFatal)?;

    Ok(collect(
        unit,
        value,
        PatternKind::SelfContainedCooperative,
        env,
    ))
}

/// Record the entry point's output.
///
/// The return value wins. If it is empty, rows recorded with `emit()` are
/// used, then the first non-empty result global.
fn collect(unit: &ScriptUnit, value: Dynamic, kind: PatternKind, env: &JobEnv) -> AdapterReport {
    let shape = RawShape::from_dynamic(&value);
    let emitted = unit.host().take_emitted();

    let shape = if !matches!(shape, RawShape::Empty) {
        shape
    } else if !emitted.is_empty() {
        RawShape::from_dynamic(&Dynamic::from_array(emitted))
    } else {
        RESULT_GLOBALS
            .iter()
            .filter_map(|name| unit.global_value(name))
            .map(|value| RawShape::from_dynamic(&value))
            .find(|shape| !matches!(shape, RawShape::Empty))
            .unwrap_or(RawShape::Empty)
    };

    if !matches!(shape, RawShape::Empty) {
        env.ledger.push_batch(RawBatch::new(shape, kind));
    }

    AdapterReport {
        items_total: 1,
        items_failed: 0,
        // Not checkpointable: a cancel is only noticed once the call returns.
        cancelled: env.cancel.is_aborted(),
    }
}
