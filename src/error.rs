//! Error taxonomy of the submitting side

use crate::runtime::RuntimeError;
use crate::storage::StorageError;
use crate::task::DescriptorError;
use crate::value::SerializeError;
use thiserror::Error;

/// Failures while turning a call into a submission
#[derive(Debug, Error)]
pub enum MarshalError {
    /// A parameter holds a value that cannot leave the process
    #[error("parameter `{name}` (position {position}) is not serializable: {reason}")]
    NotSerializable {
        name: String,
        position: usize,
        reason: String,
    },

    #[error("missing value for parameter `{0}`")]
    MissingArgument(String),

    #[error("unexpected keyword argument `{0}`")]
    UnexpectedKeyword(String),

    #[error("too many positional arguments: expected {expected}, got {got}")]
    TooManyArguments { expected: usize, got: usize },

    #[error("instance method `{0}` called without a target")]
    MissingTarget(String),
}

/// Errors surfaced by [`crate::Binding`]
#[derive(Debug, Error)]
pub enum BindingError {
    #[error("binding is not started")]
    NotStarted,

    #[error("persistent object `{0}` used but no storage backend is configured")]
    StorageDisabled(String),

    #[error(transparent)]
    Marshal(#[from] MarshalError),

    #[error(transparent)]
    Serialize(#[from] SerializeError),

    #[error("runtime error: {0}")]
    Runtime(#[from] RuntimeError),

    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("invalid task descriptor: {0}")]
    Descriptor(#[from] DescriptorError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T, E = BindingError> = std::result::Result<T, E>;
