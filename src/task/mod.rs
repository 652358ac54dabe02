//! Task model
//!
//! Describes task functions and their arguments independently of any
//! binding state.
//!
//! # Architecture
//!
//! - [`parameter`] - semantic types, directions, streams and the
//!   [`Parameter`] record handed to the runtime
//! - [`descriptor`] - [`TaskBuilder`] layers composing a [`TaskDescriptor`]
//! - [`core_element`] - dispatch metadata and its idempotent registry

pub mod core_element;
pub mod descriptor;
pub mod parameter;

pub use core_element::{ConstraintValue, CoreElement, CoreElementRegistry, ImplementationKind};
pub use descriptor::{ComputingNodes, DescriptorError, FunctionKind, TaskBuilder, TaskDescriptor};
pub use parameter::{
    DataType, Direction, ParamSpec, ParamValue, Parameter, Stream, DEFAULT_PREFIX,
    EMPTY_STRING_KEY, JAVA_MAX_INT, JAVA_MAX_LONG, JAVA_MIN_INT, JAVA_MIN_LONG, RETURN_PREFIX,
};

#[cfg(test)]
mod tests;
