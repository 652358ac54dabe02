//! taskbind
//!
//! Client-side binding for a distributed task-parallel runtime. Calls to
//! task functions become deferred units of work: arguments are marshalled
//! into files or inline values, results come back as futures, and
//! synchronizing a future pulls the latest version of the value from the
//! runtime.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use taskbind::{Binding, BindingConfig, CallArgs, LocalRuntime, Obj, TaskBuilder, TaskRegistry};
//!
//! fn main() -> anyhow::Result<()> {
//!     let increment = TaskBuilder::new("demo", "increment").param("x", Default::default()).returns(1).build()?;
//!     let registry = Arc::new(TaskRegistry::new());
//!     registry.insert(increment.clone(), |args: &[Obj]| {
//!         Ok(vec![Obj::new(args[0].as_int().unwrap_or_default() + 1)])
//!     });
//!
//!     let runtime = LocalRuntime::new(registry);
//!     let mut binding = Binding::start(BindingConfig::default(), Box::new(runtime), None)?;
//!     let future = binding.call(&increment, CallArgs::new().arg(5))?;
//!     if let Some(future) = future.and_then(|f| f.into_one()) {
//!         println!("{:?}", binding.wait_on_one(&future)?);
//!     }
//!     binding.stop()?;
//!     Ok(())
//! }
//! ```

#![doc(html_root_url = "https://docs.rs/taskbind")]
#![warn(rust_2018_idioms)]

// Public modules
pub mod binding;
pub mod demo;
pub mod error;
pub mod proxy;
pub mod runtime;
pub mod storage;
pub mod task;
pub mod value;
pub mod worker;

// Utility modules
pub mod util;

// Re-exports
pub use binding::{Binding, IdentityRegistry, ObjectId, Resolved};
pub use error::{BindingError, MarshalError, Result};
pub use proxy::{CallArgs, Returned, TaskOutcome};
pub use runtime::{FileLocation, LocalRuntime, LocalStats, Runtime, RuntimeError, Submission};
pub use storage::{FileStorage, StorageBackend, StorageError};
pub use task::{
    CoreElement, DataType, Direction, ParamSpec, Parameter, Stream, TaskBuilder, TaskDescriptor,
};
pub use util::config::{BindingConfig, InlinePolicy};
pub use value::{Obj, Record, Value, ValueKind};
pub use worker::{TaskRegistry, WorkerArgs, WorkerError, WorkerInvocation};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Crate name
pub const NAME: &str = "taskbind";
