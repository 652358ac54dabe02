//! External runtime interface
//!
//! The scheduler that places and runs tasks lives outside this crate. The
//! binding reaches it only through [`Runtime`]: register core elements,
//! submit tasks, request files, delete files and wait on barriers.
//!
//! [`LocalRuntime`] is an in-process sequential implementation that runs
//! every task immediately through the worker entry point.

pub mod local;

use crate::task::{CoreElement, DataType, Direction, Stream};
use std::path::{Path, PathBuf};
use thiserror::Error;

pub use local::{LocalRuntime, LocalStats};

/// Pseudo-protocol used to request persisted objects by id
pub const STORAGE_PROTOCOL: &str = "storage://";

/// Pseudo-protocol of plain files
pub const FILE_PROTOCOL: &str = "file://";

/// Errors reported by the external runtime
#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("runtime is not running")]
    NotRunning,

    #[error("unknown task `{0}`")]
    UnknownTask(String),

    #[error("file not available: {0}")]
    FileUnavailable(String),

    #[error("runtime I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(String),
}

/// One task submission as handed to the runtime.
///
/// The five per-parameter vectors are parallel arrays.
#[derive(Debug, Clone, PartialEq)]
pub struct Submission {
    pub app_id: u64,
    /// Qualified task signature (`module[.Class].function`)
    pub signature: String,
    pub priority: bool,
    pub num_nodes: u32,
    pub replicated: bool,
    pub distributed: bool,
    pub has_target: bool,
    /// Number of trailing return parameters (before the target, if any)
    pub num_returns: usize,
    pub values: Vec<String>,
    pub types: Vec<DataType>,
    pub directions: Vec<Direction>,
    pub streams: Vec<Stream>,
    pub prefixes: Vec<String>,
}

impl Submission {
    /// Number of parameters
    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Whether all parallel arrays have the same length
    pub fn is_consistent(&self) -> bool {
        let n = self.values.len();
        self.types.len() == n
            && self.directions.len() == n
            && self.streams.len() == n
            && self.prefixes.len() == n
    }
}

/// Where the runtime placed a requested object
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileLocation {
    /// A file on the local filesystem
    Path(PathBuf),
    /// An object owned by the persistence layer
    Persistent(String),
}

impl FileLocation {
    /// Classify a raw answer of a runtime that only speaks strings.
    ///
    /// `storage://id` is persistent, `file://path` and absolute paths are
    /// files, anything else is taken as a persistent id.
    pub fn from_raw(raw: &str) -> Self {
        if let Some(id) = raw.strip_prefix(STORAGE_PROTOCOL) {
            FileLocation::Persistent(id.to_string())
        } else if let Some(path) = raw.strip_prefix(FILE_PROTOCOL) {
            FileLocation::Path(PathBuf::from(path))
        } else if raw.starts_with('/') {
            FileLocation::Path(PathBuf::from(raw))
        } else {
            FileLocation::Persistent(raw.to_string())
        }
    }
}

/// The external task runtime
pub trait Runtime: Send + Sync {
    fn start(&self) -> Result<(), RuntimeError> {
        Ok(())
    }

    fn stop(&self) -> Result<(), RuntimeError>;

    fn register_core_element(
        &self,
        element: &CoreElement,
    ) -> Result<(), RuntimeError>;

    /// Submit one task; returns once the runtime has accepted it
    fn process_task(
        &self,
        submission: Submission,
    ) -> Result<(), RuntimeError>;

    /// Block until `name` (a path or `storage://id`) is available and
    /// report where it is
    fn get_file(
        &self,
        name: &str,
        mode: Direction,
    ) -> Result<FileLocation, RuntimeError>;

    /// Release a file obtained through [`Runtime::get_file`]
    fn close_file(
        &self,
        path: &Path,
        mode: Direction,
    ) -> Result<(), RuntimeError>;

    /// Ask the runtime to drop a file; `Ok(false)` when it did not exist
    fn delete_file(
        &self,
        path: &Path,
    ) -> Result<bool, RuntimeError>;

    /// Block until every submitted task has finished
    fn barrier(
        &self,
        app_id: u64,
        no_more_tasks: bool,
    ) -> Result<(), RuntimeError>;
}
