//! Script loading and the host API.
//!
//! # Module Structure
//!
//! - `loader` - Compiles script text into a fresh engine and runs top-level code
//! - `unit` - The loaded [`ScriptUnit`] and its [`Declarations`]
//! - `host` - Functions registered on every engine (data access, emit, progress)
//! - `task` - Suspended computations returned by cooperative scripts

mod host;
mod loader;
mod task;
mod unit;

pub use host::HostState;
pub use loader::ScriptLoader;
pub use task::Task;
pub use unit::{Declarations, DeclaredFn, DeclaredGlobal, GlobalShape, ScriptUnit};

pub(crate) use task::resolve;
