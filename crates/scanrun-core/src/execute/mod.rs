//! Execution of classified scripts.
//!
//! # Architecture
//!
//! ```text
//! ExecutionPattern
//!     │
//!     └── reconcile::plan ──> ExecutionContext
//!             │
//!             ├── Inline            (Unrecognized: no script code runs)
//!             │
//!             ├── DedicatedWorker   (std::thread)
//!             │       └── per-symbol / blocking entry point / frame adapter
//!             │
//!             └── OwnedScheduler    (std::thread + current-thread runtime)
//!                     └── cooperative entry point adapter
//!                             └── Task graph driven on the owned runtime
//! ```
//!
//! Every context holds a [`TeardownGuard`]; when the context ends, for
//! whatever reason, the job's teardown token is cancelled and any script code
//! still running stops at its next operation.
//!
//! # Module Structure
//!
//! - `context` - Caller cancellation and teardown
//! - `reconcile` - Context selection and worker threads
//! - `adapter` - One adapter per execution pattern

mod adapter;
mod context;
mod reconcile;

pub use adapter::{AdapterReport, JobEnv};
pub use context::{AbortHandle, TeardownGuard};
pub use reconcile::{ContextKind, ExecutionContext, plan};
pub(crate) use reconcile::panic_message;
