//! Suspended computations built by cooperative scripts.
//!
//! A cooperative entry point does not fetch data itself. It returns a [`Task`]
//! describing what to fetch and what to do with the results, and the engine
//! drives that description on a scheduling context the job owns.

use futures::FutureExt;
use futures::future::LocalBoxFuture;
use rhai::{Array, Dynamic, FnPtr};

use super::ScriptUnit;
use crate::script::host;

/// A suspended computation returned to the engine by script code.
#[derive(Debug, Clone)]
pub enum Task {
    /// An already available value.
    Ready(Dynamic),
    /// Bars for one symbol.
    Fetch {
        symbol: String,
        start: String,
        end: String,
    },
    /// The data source's universe.
    Universe,
    /// Run every task concurrently; resolves to an array in input order.
    Gather(Vec<Task>),
    /// Resolve the task, then call the function with its value.
    Then(Box<Task>, FnPtr),
}

impl Task {
    /// Wrap a script value, keeping it as-is if it already is a task.
    pub fn from_dynamic(value: Dynamic) -> Self {
        if value.is::<Task>() {
            value.cast::<Task>()
        } else {
            Task::Ready(value)
        }
    }

    /// Build a [`Task::Gather`] from a script array.
    pub fn gather(items: Array) -> Self {
        Task::Gather(items.into_iter().map(Task::from_dynamic).collect())
    }
}

/// Drive a task to completion on the current (job-owned) scheduler.
///
/// Continuations run script code synchronously between suspension points; a
/// continuation that returns another task is flattened.
pub(crate) fn resolve<'a>(
    unit: &'a ScriptUnit,
    task: Task,
) -> LocalBoxFuture<'a, Result<Dynamic, String>> {
    async move {
        match task {
            Task::Ready(value) => Ok(value),
            Task::Fetch { symbol, start, end } => {
                let start = host::parse_script_date(&start)?;
                let end = host::parse_script_date(&end)?;
                let bars = unit
                    .host()
                    .source()
                    .fetch_bars(&symbol, start, end)
                    .await
                    .map_err(|e| e.to_string())?;
                Ok(host::bars_to_dynamic(&bars))
            }
            Task::Universe => {
                let symbols = unit
                    .host()
                    .source()
                    .universe()
                    .await
                    .map_err(|e| e.to_string())?;
                Ok(Dynamic::from_array(
                    symbols.into_iter().map(Dynamic::from).collect(),
                ))
            }
            Task::Gather(tasks) => {
                let values =
                    futures::future::try_join_all(tasks.into_iter().map(|t| resolve(unit, t)))
                        .await?;
                Ok(Dynamic::from_array(values))
            }
            Task::Then(inner, callback) => {
                let value = resolve(unit, *inner).await?;
                if unit.host().is_torn_down() {
                    return Err("execution context torn down".to_string());
                }
                let next = unit.call_fn_ptr(&callback, value)?;
                if next.is::<Task>() {
                    resolve(unit, next.cast::<Task>()).await
                } else {
                    Ok(next)
                }
            }
        }
    }
    .boxed_local()
}
