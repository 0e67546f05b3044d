//! Script loader.
//!
//! Compiles script text into a fresh engine and runs its top-level statements
//! once, producing a [`ScriptUnit`].

use std::sync::Arc;

use chrono::NaiveDate;
use rhai::{Engine, EvalAltResult, Scope};
use tokio_util::sync::CancellationToken;

use super::host::{self, HostState};
use super::unit::ScriptUnit;
use crate::config::EngineConfig;
use crate::data::DataSource;
use crate::error::LoadError;
use crate::run::JobId;

/// Builds isolated [`ScriptUnit`]s.
#[derive(Clone)]
pub struct ScriptLoader {
    config: EngineConfig,
    source: Arc<dyn DataSource>,
}

impl ScriptLoader {
    pub fn new(config: EngineConfig, source: Arc<dyn DataSource>) -> Self {
        Self { config, source }
    }

    /// Load a script for a job with the given date range.
    ///
    /// Top-level statements execute exactly once, here. Anything they leave in
    /// scope (a symbol list, a result table) is visible to the classifier and
    /// the adapters afterwards.
    pub fn load(
        &self,
        job_id: JobId,
        script_text: &str,
        start: NaiveDate,
        end: NaiveDate,
        teardown: CancellationToken,
    ) -> Result<ScriptUnit, LoadError> {
        let host = Arc::new(HostState::new(
            job_id,
            start,
            end,
            self.source.clone(),
            teardown,
        ));
        let engine = self.build_engine(&host);

        let ast = engine.compile(script_text).map_err(|e| LoadError::Syntax {
            line: e.1.line(),
            message: e.0.to_string(),
        })?;

        let mut scope = Scope::new();
        engine
            .run_ast_with_scope(&mut scope, &ast)
            .map_err(|e| load_failure(&e))?;

        tracing::debug!(job = %job_id, "script loaded");
        Ok(ScriptUnit::new(engine, ast, scope, host))
    }

    fn build_engine(&self, host: &Arc<HostState>) -> Engine {
        let mut engine = Engine::new();
        engine.set_max_call_levels(self.config.max_call_levels);
        if self.config.max_operations > 0 {
            engine.set_max_operations(self.config.max_operations);
        }
        host::register(&mut engine, host);
        engine
    }
}

fn load_failure(err: &EvalAltResult) -> LoadError {
    let message = match err {
        EvalAltResult::ErrorTerminated(..) => "terminated: load timed out".to_string(),
        other => other.to_string(),
    };
    LoadError::ExecutionDuringLoad { message }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::MemoryDataSource;
    use crate::script::GlobalShape;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, d).unwrap()
    }

    fn loader() -> ScriptLoader {
        let source = MemoryDataSource::new()
            .with_symbol("AAA", vec![])
            .with_symbol("BBB", vec![]);
        ScriptLoader::new(EngineConfig::default(), Arc::new(source))
    }

    fn load(text: &str) -> Result<ScriptUnit, LoadError> {
        loader().load(JobId::new(), text, day(1), day(31), CancellationToken::new())
    }

    #[test]
    fn test_syntax_error() {
        let err = load("fn scan(symbol { }").unwrap_err();
        assert!(matches!(err, LoadError::Syntax { line: Some(1), .. }));
    }

    #[test]
    fn test_top_level_failure() {
        let err = load(r#"let x = 1; throw "no config";"#).unwrap_err();
        match err {
            LoadError::ExecutionDuringLoad { message } => assert!(message.contains("no config")),
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_top_level_side_effects_are_observable() {
        let unit = load(
            r#"
            let SYMBOLS = universe();
            fn scan(symbol, start, end) { () }
            "#,
        )
        .unwrap();

        let decl = unit.declarations();
        let symbols = decl.global("symbols").unwrap();
        assert_eq!(
            symbols.shape,
            GlobalShape::StringList(vec!["AAA".to_string(), "BBB".to_string()])
        );
        assert_eq!(decl.function("scan").unwrap().arity(), 3);
    }

    #[test]
    fn test_units_do_not_share_state() {
        let script = r#"let counter = 0; counter += 1;"#;
        let a = load(script).unwrap();
        let b = load(script).unwrap();
        assert_eq!(a.global_value("counter").unwrap().as_int().unwrap(), 1);
        assert_eq!(b.global_value("counter").unwrap().as_int().unwrap(), 1);
    }

    #[test]
    fn test_operation_limit_applies() {
        let source = MemoryDataSource::new();
        let loader = ScriptLoader::new(
            EngineConfig::default().with_max_operations(100),
            Arc::new(source),
        );
        let err = loader
            .load(
                JobId::new(),
                "let x = 0; loop { x += 1; }",
                day(1),
                day(2),
                CancellationToken::new(),
            )
            .unwrap_err();
        assert!(matches!(err, LoadError::ExecutionDuringLoad { .. }));
    }

    #[test]
    fn test_teardown_during_load() {
        let token = CancellationToken::new();
        token.cancel();
        let err = loader()
            .load(JobId::new(), "loop { }", day(1), day(2), token)
            .unwrap_err();
        match err {
            LoadError::ExecutionDuringLoad { message } => assert!(message.contains("timed out")),
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_closures_are_not_declared_functions() {
        let unit = load(
            r#"
            fn main() { let f = |x| x + 1; f.call(1) }
            "#,
        )
        .unwrap();
        let names: Vec<_> = unit
            .declarations()
            .functions
            .iter()
            .map(|f| f.name.as_str())
            .collect();
        assert_eq!(names, vec!["main"]);
    }
}
