//! Loaded scripts and their declared symbols.

use std::sync::Arc;

use rhai::{AST, CallFnOptions, Dynamic, Engine, EvalAltResult, FnPtr, FuncArgs, Scope};
use serde::{Deserialize, Serialize};

use super::host::HostState;

/// A function declared by a script.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeclaredFn {
    pub name: String,
    pub params: Vec<String>,
}

impl DeclaredFn {
    pub fn new(name: impl Into<String>, params: &[&str]) -> Self {
        Self {
            name: name.into(),
            params: params.iter().map(|p| p.to_string()).collect(),
        }
    }

    pub fn arity(&self) -> usize {
        self.params.len()
    }
}

/// Coarse shape of a top-level value, enough for classification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum GlobalShape {
    /// An array whose elements are all strings.
    StringList(Vec<String>),
    /// Any other array, with its length.
    List(usize),
    Map,
    Scalar,
    Other(String),
}

impl GlobalShape {
    fn of(value: &Dynamic) -> Self {
        if value.is_array() {
            let array = value.clone().into_array().unwrap_or_default();
            let strings: Option<Vec<String>> = array
                .iter()
                .map(|v| v.clone().into_string().ok())
                .collect();
            match strings {
                Some(strings) => GlobalShape::StringList(strings),
                None => GlobalShape::List(array.len()),
            }
        } else if value.is_map() {
            GlobalShape::Map
        } else if value.is_unit()
            || value.is_bool()
            || value.is_int()
            || value.is_float()
            || value.is_string()
            || value.is_char()
        {
            GlobalShape::Scalar
        } else {
            GlobalShape::Other(value.type_name().to_string())
        }
    }
}

/// A top-level variable or constant left in scope after load.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeclaredGlobal {
    pub name: String,
    pub constant: bool,
    pub shape: GlobalShape,
}

impl DeclaredGlobal {
    pub fn new(name: impl Into<String>, constant: bool, shape: GlobalShape) -> Self {
        Self {
            name: name.into(),
            constant,
            shape,
        }
    }

    /// The string elements, if this global is a list of strings.
    pub fn string_list(&self) -> Option<&[String]> {
        match &self.shape {
            GlobalShape::StringList(items) => Some(items),
            _ => None,
        }
    }
}

/// Everything a script declares at the top level.
///
/// This is plain data: classification works on it without touching the
/// engine.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Declarations {
    pub functions: Vec<DeclaredFn>,
    pub globals: Vec<DeclaredGlobal>,
}

impl Declarations {
    pub fn function(&self, name: &str) -> Option<&DeclaredFn> {
        self.functions.iter().find(|f| f.name == name)
    }

    /// Case-insensitive global lookup.
    pub fn global(&self, name: &str) -> Option<&DeclaredGlobal> {
        self.globals
            .iter()
            .find(|g| g.name.eq_ignore_ascii_case(name))
    }
}

/// A script loaded into its own engine and scope.
///
/// Owned by exactly one run and dropped when the run ends; a unit is never
/// reused because its top-level statements have already executed.
pub struct ScriptUnit {
    engine: Engine,
    ast: AST,
    scope: Scope<'static>,
    host: Arc<HostState>,
    declarations: Declarations,
}

impl ScriptUnit {
    pub(crate) fn new(engine: Engine, ast: AST, scope: Scope<'static>, host: Arc<HostState>) -> Self {
        let declarations = Self::collect_declarations(&ast, &scope);
        Self {
            engine,
            ast,
            scope,
            host,
            declarations,
        }
    }

    fn collect_declarations(ast: &AST, scope: &Scope<'static>) -> Declarations {
        // Closures are compiled to anonymous functions; their names are not
        // valid identifiers.
        let functions = ast
            .iter_functions()
            .filter(|f| !f.name.contains('$'))
            .map(|f| DeclaredFn::new(f.name, &f.params))
            .collect();

        // Shadowed names appear once per `let`; the last binding wins.
        let mut globals: Vec<DeclaredGlobal> = Vec::new();
        for (name, constant, value) in scope.iter() {
            let global = DeclaredGlobal::new(name, constant, GlobalShape::of(&value));
            match globals.iter_mut().find(|g| g.name == name) {
                Some(existing) => *existing = global,
                None => globals.push(global),
            }
        }

        Declarations { functions, globals }
    }

    pub fn declarations(&self) -> &Declarations {
        &self.declarations
    }

    pub fn host(&self) -> &Arc<HostState> {
        &self.host
    }

    /// Current value of a top-level variable (case-insensitive).
    pub fn global_value(&self, name: &str) -> Option<Dynamic> {
        self.scope
            .iter()
            .filter(|(n, _, _)| n.eq_ignore_ascii_case(name))
            .last()
            .map(|(_, _, value)| value)
    }

    /// Call a declared function without re-running top-level statements.
    pub fn call(
        &mut self,
        name: &str,
        args: impl FuncArgs,
    ) -> Result<Dynamic, Box<EvalAltResult>> {
        let options = CallFnOptions::new().eval_ast(false).rewind_scope(true);
        self.engine
            .call_fn_with_options::<Dynamic>(options, &mut self.scope, &self.ast, name, args)
    }

    /// Invoke a function pointer (closure or named function) produced by the script.
    pub(crate) fn call_fn_ptr(&self, callback: &FnPtr, arg: Dynamic) -> Result<Dynamic, String> {
        callback
            .call::<Dynamic>(&self.engine, &self.ast, (arg,))
            .map_err(|e| e.to_string())
    }
}

impl std::fmt::Debug for ScriptUnit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScriptUnit")
            .field("job", &self.host.job_id())
            .field("declarations", &self.declarations)
            .finish_non_exhaustive()
    }
}
