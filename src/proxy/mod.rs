//! Task proxy
//!
//! The two halves of a task call:
//!
//! - [`master`] - [`crate::Binding::call`]: bind, marshal, mint futures, submit
//! - [`worker`] - [`worker::execute`]: rebuild arguments, invoke, write back

pub mod master;
pub mod worker;

pub use master::{CallArgs, Returned, RETURN_NAME, TARGET_NAME};
pub use worker::{execute, nio_path, TaskOutcome};
