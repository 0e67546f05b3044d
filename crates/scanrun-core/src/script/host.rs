//! Host API exposed to scripts.
//!
//! Every unit gets its own [`HostState`]; the functions registered here close
//! over it, so nothing a script does through the host API is visible to any
//! other job.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use chrono::NaiveDate;
use rhai::{Array, Dynamic, Engine, EvalAltResult, FnPtr, INT, ImmutableString, Map};
use tokio_util::sync::CancellationToken;

use super::task::Task;
use crate::data::{Bar, DataSource};
use crate::progress::ProgressSink;
use crate::run::JobId;

type HostResult<T> = Result<T, Box<EvalAltResult>>;

/// Per-unit state shared between the engine and the host functions.
pub struct HostState {
    job_id: JobId,
    start: NaiveDate,
    end: NaiveDate,
    source: Arc<dyn DataSource>,
    /// Set while the unit runs on a job-owned scheduler; blocking data calls
    /// are refused in that mode.
    cooperative: AtomicBool,
    emitted: Mutex<Vec<Dynamic>>,
    progress: Mutex<Option<ProgressSink>>,
    teardown: CancellationToken,
}

impl HostState {
    pub fn new(
        job_id: JobId,
        start: NaiveDate,
        end: NaiveDate,
        source: Arc<dyn DataSource>,
        teardown: CancellationToken,
    ) -> Self {
        Self {
            job_id,
            start,
            end,
            source,
            cooperative: AtomicBool::new(false),
            emitted: Mutex::new(Vec::new()),
            progress: Mutex::new(None),
            teardown,
        }
    }

    pub fn job_id(&self) -> JobId {
        self.job_id
    }

    pub fn source(&self) -> &Arc<dyn DataSource> {
        &self.source
    }

    pub fn teardown_token(&self) -> CancellationToken {
        self.teardown.clone()
    }

    pub fn is_torn_down(&self) -> bool {
        self.teardown.is_cancelled()
    }

    pub fn set_cooperative(&self, cooperative: bool) {
        self.cooperative.store(cooperative, Ordering::SeqCst);
    }

    pub fn is_cooperative(&self) -> bool {
        self.cooperative.load(Ordering::SeqCst)
    }

    /// Route script `progress(...)` calls to a sink.
    pub fn attach_progress(&self, sink: ProgressSink) {
        *self.progress.lock().unwrap_or_else(|p| p.into_inner()) = Some(sink);
    }

    /// Take every row recorded with `emit(...)` so far.
    pub fn take_emitted(&self) -> Vec<Dynamic> {
        std::mem::take(&mut *self.emitted.lock().unwrap_or_else(|p| p.into_inner()))
    }

    fn emit(&self, row: Dynamic) {
        self.emitted
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .push(row);
    }

    fn report_progress(&self, percent: INT, message: &str) {
        let guard = self.progress.lock().unwrap_or_else(|p| p.into_inner());
        if let Some(sink) = guard.as_ref() {
            sink.emit(percent.clamp(0, 100) as u8, message);
        }
    }

    fn ensure_may_block(&self, call: &str, instead: &str) -> HostResult<()> {
        if self.is_cooperative() {
            return Err(format!(
                "{call}() would block the job's scheduler; use {instead}() in cooperative scripts"
            )
            .into());
        }
        Ok(())
    }

    fn blocking_fetch(&self, symbol: &str, start: &str, end: &str) -> HostResult<Array> {
        self.ensure_may_block("fetch_bars", "fetch_async")?;
        let start = parse_script_date(start)?;
        let end = parse_script_date(end)?;
        let bars = futures::executor::block_on(self.source.fetch_bars(symbol, start, end))
            .map_err(|e| e.to_string())?;
        Ok(bars.iter().map(bar_to_dynamic).collect())
    }

    fn blocking_universe(&self) -> HostResult<Array> {
        self.ensure_may_block("universe", "universe_async")?;
        let symbols =
            futures::executor::block_on(self.source.universe()).map_err(|e| e.to_string())?;
        Ok(symbols.into_iter().map(Dynamic::from).collect())
    }

    fn start_str(&self) -> String {
        self.start.format("%Y-%m-%d").to_string()
    }

    fn end_str(&self) -> String {
        self.end.format("%Y-%m-%d").to_string()
    }
}

/// Parse a date handed over by script code.
pub(crate) fn parse_script_date(text: &str) -> Result<NaiveDate, String> {
    NaiveDate::parse_from_str(text.trim(), "%Y-%m-%d")
        .map_err(|e| format!("invalid date '{}': {}", text, e))
}

fn bar_to_dynamic(bar: &Bar) -> Dynamic {
    let mut map = Map::new();
    map.insert("date".into(), Dynamic::from(bar.date.format("%Y-%m-%d").to_string()));
    map.insert("open".into(), Dynamic::from(bar.open));
    map.insert("high".into(), Dynamic::from(bar.high));
    map.insert("low".into(), Dynamic::from(bar.low));
    map.insert("close".into(), Dynamic::from(bar.close));
    map.insert("volume".into(), Dynamic::from(bar.volume as INT));
    Dynamic::from_map(map)
}

/// Convert bars into a script array of maps.
pub(crate) fn bars_to_dynamic(bars: &[Bar]) -> Dynamic {
    Dynamic::from_array(bars.iter().map(bar_to_dynamic).collect())
}

/// Register the host API on a fresh engine.
pub(crate) fn register(engine: &mut Engine, host: &Arc<HostState>) {
    engine.register_type_with_name::<Task>("Task");

    let job = host.job_id();
    engine.on_print(move |text| {
        tracing::info!(target: "scanrun::script", job = %job, "{}", text);
    });
    engine.on_debug(move |text, _source, pos| {
        tracing::debug!(target: "scanrun::script", job = %job, position = %pos, "{}", text);
    });

    let teardown = host.teardown_token();
    engine.on_progress(move |_ops| {
        if teardown.is_cancelled() {
            Some(Dynamic::UNIT)
        } else {
            None
        }
    });

    // Blocking data access.
    let h = host.clone();
    engine.register_fn(
        "fetch_bars",
        move |symbol: ImmutableString, start: ImmutableString, end: ImmutableString| {
            h.blocking_fetch(&symbol, &start, &end)
        },
    );
    let h = host.clone();
    engine.register_fn("fetch_bars", move |symbol: ImmutableString| {
        h.blocking_fetch(&symbol, &h.start_str(), &h.end_str())
    });
    let h = host.clone();
    engine.register_fn("universe", move || h.blocking_universe());

    // Cooperative data access.
    engine.register_fn(
        "fetch_async",
        |symbol: ImmutableString, start: ImmutableString, end: ImmutableString| Task::Fetch {
            symbol: symbol.to_string(),
            start: start.to_string(),
            end: end.to_string(),
        },
    );
    let h = host.clone();
    engine.register_fn("fetch_async", move |symbol: ImmutableString| Task::Fetch {
        symbol: symbol.to_string(),
        start: h.start_str(),
        end: h.end_str(),
    });
    engine.register_fn("universe_async", || Task::Universe);
    engine.register_fn("ready", Task::Ready);
    engine.register_fn("gather", Task::gather);
    engine.register_fn("and_then", |task: &mut Task, callback: FnPtr| {
        Task::Then(Box::new(task.clone()), callback)
    });

    // Results and progress.
    let h = host.clone();
    engine.register_fn("emit", move |row: Dynamic| h.emit(row));
    let h = host.clone();
    engine.register_fn("progress", move |percent: INT, message: ImmutableString| {
        h.report_progress(percent, &message)
    });
    let h = host.clone();
    engine.register_fn("progress", move |percent: INT| h.report_progress(percent, ""));

    let h = host.clone();
    engine.register_fn("scan_start", move || h.start_str());
    let h = host.clone();
    engine.register_fn("scan_end", move || h.end_str());
}
