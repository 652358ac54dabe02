//! Worker entry contract
//!
//! A worker runs exactly one task per process. Its command line is a flat
//! positional stream:
//!
//! ```text
//! tracing task_id log_level storage_conf method_type
//! path method_name num_slaves slave* computing_units
//! has_target return_type num_params (type stream prefix value)*
//! ```
//!
//! STRING values are a substring count followed by that many substrings
//! (joined back with single spaces). EXTERNAL_PSCO values carry one extra
//! access-mode token after the id.
//!
//! The process exit status is the contract with the runtime: `0` on
//! success, non-zero ([`WorkerError::exit_code`]) on any failure.

pub mod registry;

use crate::proxy::worker::{execute, TaskOutcome};
use crate::runtime::Submission;
use crate::storage::{FileStorage, StorageBackend, StorageError};
use crate::task::{CoreElement, DataType, Direction, Stream};
use crate::util::config::BindingConfig;
use crate::util::logger::{self, LogLevel};
use crate::value::SerializeError;
use clap::Parser;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, error};

pub use registry::{RegisteredTask, TaskBody, TaskRegistry};

/// Value of the storage configuration when persistence is disabled
pub const NULL: &str = "null";

/// Worker failures. Every variant maps to a non-zero exit status.
#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("malformed worker command line: {0}")]
    Malformed(String),

    #[error("invalid type ({code}) for parameter {index}")]
    InvalidType { code: String, index: usize },

    #[error("invalid value `{value}` for parameter {index}: expected {expected}")]
    InvalidValue {
        index: usize,
        value: String,
        expected: &'static str,
    },

    /// The task was not declared where the runtime said it is
    #[error("task `{0}` not found; check that it is registered under its full path")]
    MissingTask(String),

    #[error("persistent object `{0}` received but no storage is configured")]
    StorageDisabled(String),

    #[error("task `{signature}` failed: {message}")]
    TaskFailed { signature: String, message: String },

    #[error("task returned {got} values, {expected} declared")]
    ReturnMismatch { expected: usize, got: usize },

    #[error(transparent)]
    Serialize(#[from] SerializeError),

    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl WorkerError {
    /// Process exit status reported to the runtime
    pub fn exit_code(&self) -> u8 {
        match self {
            WorkerError::Malformed(_)
            | WorkerError::InvalidType { .. }
            | WorkerError::InvalidValue { .. } => 2,
            WorkerError::MissingTask(_) => 3,
            WorkerError::TaskFailed { .. } | WorkerError::ReturnMismatch { .. } => 1,
            WorkerError::StorageDisabled(_)
            | WorkerError::Serialize(_)
            | WorkerError::Storage(_) => 4,
        }
    }
}

/// Worker command line
#[derive(Debug, Clone, clap::Args)]
pub struct WorkerArgs {
    /// Tracing flag (`true` / `false`)
    pub tracing: String,
    pub task_id: u64,
    /// `true`/`debug`, `info`/`off`, ...
    pub log_level: String,
    /// Storage configuration path, `null` to disable persistence
    pub storage_conf: String,
    /// Implementation kind (`METHOD`, `MPI`, ...)
    pub method_type: String,
    /// Task location and parameter stream
    #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
    pub rest: Vec<String>,
}

#[derive(Debug, Parser)]
#[command(name = "worker", no_binary_name = true)]
struct WorkerCommand {
    #[command(flatten)]
    args: WorkerArgs,
}

/// One parameter as received on the worker command line
#[derive(Debug, Clone, PartialEq)]
pub struct WireParam {
    pub data_type: DataType,
    pub stream: Stream,
    pub prefix: String,
    pub value: String,
    /// Access mode of persisted objects (`R`, `W`, `RW`)
    pub mode: Option<String>,
}

/// Fully parsed worker invocation
#[derive(Debug, Clone, PartialEq)]
pub struct WorkerInvocation {
    pub tracing: bool,
    pub task_id: u64,
    pub log_level: LogLevel,
    pub storage_conf: Option<PathBuf>,
    pub method_type: String,
    /// Module (or module.Class) of the task
    pub path: String,
    pub method_name: String,
    pub slaves: Vec<String>,
    pub computing_units: u32,
    pub has_target: bool,
    pub return_type: String,
    pub params: Vec<WireParam>,
}

impl WorkerInvocation {
    /// Parse a command line (without the program name)
    pub fn parse(argv: &[String]) -> Result<Self, WorkerError> {
        let command = WorkerCommand::try_parse_from(argv)
            .map_err(|e| WorkerError::Malformed(e.to_string()))?;
        Self::from_args(&command.args)
    }

    pub fn from_args(args: &WorkerArgs) -> Result<Self, WorkerError> {
        let mut rest = Tokens::new(&args.rest);
        let path = rest.next("path")?.to_string();
        let method_name = rest.next("method name")?.to_string();
        let num_slaves: usize = rest.parse("slave count")?;
        let mut slaves = Vec::with_capacity(num_slaves);
        for _ in 0..num_slaves {
            slaves.push(rest.next("slave")?.to_string());
        }
        let computing_units = rest.parse("computing units")?;
        let has_target = rest.next("has target")? == "true";
        let return_type = rest.next("return type")?.to_string();
        let num_params: usize = rest.parse("parameter count")?;

        let mut params = Vec::with_capacity(num_params);
        for index in 0..num_params {
            let code = rest.next("parameter type")?;
            let data_type = code
                .parse::<u8>()
                .ok()
                .and_then(DataType::from_code)
                .ok_or_else(|| WorkerError::InvalidType {
                    code: code.to_string(),
                    index,
                })?;
            let stream_code = rest.next("parameter stream")?;
            let stream = stream_code
                .parse::<u8>()
                .ok()
                .and_then(Stream::from_code)
                .ok_or_else(|| WorkerError::InvalidValue {
                    index,
                    value: stream_code.to_string(),
                    expected: "a stream code",
                })?;
            let prefix = rest.next("parameter prefix")?.to_string();
            let (value, mode) = match data_type {
                DataType::String => {
                    let count: usize = rest.parse("substring count")?;
                    let mut pieces = Vec::with_capacity(count);
                    for _ in 0..count {
                        pieces.push(rest.next("substring")?);
                    }
                    (pieces.join(" "), None)
                }
                DataType::ExternalPersistent => {
                    let id = rest.next("persistent id")?.to_string();
                    let mode = rest.next("persistent access mode")?.to_string();
                    (id, Some(mode))
                }
                _ => (rest.next("parameter value")?.to_string(), None),
            };
            params.push(WireParam {
                data_type,
                stream,
                prefix,
                value,
                mode,
            });
        }
        if !rest.is_done() {
            return Err(WorkerError::Malformed(format!(
                "{} unexpected trailing arguments",
                rest.remaining()
            )));
        }

        let storage_conf = match args.storage_conf.as_str() {
            NULL => None,
            conf => Some(PathBuf::from(conf)),
        };
        Ok(Self {
            tracing: args.tracing == "true",
            task_id: args.task_id,
            log_level: LogLevel::from_worker_flag(&args.log_level),
            storage_conf,
            method_type: args.method_type.clone(),
            path,
            method_name,
            slaves,
            computing_units,
            has_target,
            return_type,
            params,
        })
    }

    /// Build the invocation the runtime would launch for `submission`
    pub fn from_submission(
        submission: &Submission,
        element: &CoreElement,
        task_id: u64,
        log_level: LogLevel,
        storage_conf: Option<PathBuf>,
    ) -> Self {
        let (path, method_name) = element
            .impl_signature
            .rsplit_once('.')
            .map(|(path, method)| (path.to_string(), method.to_string()))
            .unwrap_or_else(|| (String::new(), element.impl_signature.clone()));
        let params = (0..submission.len())
            .map(|i| {
                let data_type = submission.types[i];
                let mode = (data_type == DataType::ExternalPersistent)
                    .then(|| access_mode(submission.directions[i]).to_string());
                WireParam {
                    data_type,
                    stream: submission.streams[i],
                    prefix: submission.prefixes[i].clone(),
                    value: submission.values[i].clone(),
                    mode,
                }
            })
            .collect();
        let return_type = if submission.num_returns > 0 {
            DataType::File.code().to_string()
        } else {
            NULL.to_string()
        };
        Self {
            tracing: false,
            task_id,
            log_level,
            storage_conf,
            method_type: element.kind.to_string(),
            path,
            method_name,
            slaves: Vec::new(),
            computing_units: submission.num_nodes,
            has_target: submission.has_target,
            return_type,
            params,
        }
    }

    /// Implementation signature of the task to run
    pub fn impl_signature(&self) -> String {
        if self.path.is_empty() {
            self.method_name.clone()
        } else {
            format!("{}.{}", self.path, self.method_name)
        }
    }

    /// Flatten into the positional command line (without program name)
    pub fn encode(&self) -> Vec<String> {
        let mut argv = vec![
            self.tracing.to_string(),
            self.task_id.to_string(),
            self.log_level.as_str().to_string(),
            self.storage_conf
                .as_ref()
                .map(|p| p.display().to_string())
                .unwrap_or_else(|| NULL.to_string()),
            self.method_type.clone(),
            self.path.clone(),
            self.method_name.clone(),
            self.slaves.len().to_string(),
        ];
        argv.extend(self.slaves.iter().cloned());
        argv.push(self.computing_units.to_string());
        argv.push(self.has_target.to_string());
        argv.push(self.return_type.clone());
        argv.push(self.params.len().to_string());
        for param in &self.params {
            argv.push(param.data_type.code().to_string());
            argv.push(param.stream.code().to_string());
            argv.push(param.prefix.clone());
            match param.data_type {
                DataType::String => {
                    let pieces: Vec<&str> = param.value.split(' ').collect();
                    argv.push(pieces.len().to_string());
                    argv.extend(pieces.into_iter().map(str::to_string));
                }
                DataType::ExternalPersistent => {
                    argv.push(param.value.clone());
                    argv.push(param.mode.clone().unwrap_or_else(|| "R".to_string()));
                }
                _ => argv.push(param.value.clone()),
            }
        }
        argv
    }
}

/// Access mode token of a persisted object
pub fn access_mode(direction: Direction) -> &'static str {
    match direction {
        Direction::In => "R",
        Direction::Out => "W",
        Direction::InOut => "RW",
    }
}

struct Tokens<'a> {
    items: &'a [String],
    pos: usize,
}

impl<'a> Tokens<'a> {
    fn new(items: &'a [String]) -> Self {
        Self { items, pos: 0 }
    }

    fn next(
        &mut self,
        what: &str,
    ) -> Result<&'a str, WorkerError> {
        let item = self
            .items
            .get(self.pos)
            .ok_or_else(|| WorkerError::Malformed(format!("missing {}", what)))?;
        self.pos += 1;
        Ok(item)
    }

    fn parse<T: std::str::FromStr>(
        &mut self,
        what: &str,
    ) -> Result<T, WorkerError> {
        let raw = self.next(what)?;
        raw.parse()
            .map_err(|_| WorkerError::Malformed(format!("invalid {} `{}`", what, raw)))
    }

    fn remaining(&self) -> usize {
        self.items.len().saturating_sub(self.pos)
    }

    fn is_done(&self) -> bool {
        self.remaining() == 0
    }
}

/// What a worker needs besides its command line
#[derive(Clone)]
pub struct WorkerContext {
    pub registry: Arc<TaskRegistry>,
    pub storage: Option<Arc<dyn StorageBackend>>,
    pub args_as_tuple: bool,
}

impl WorkerContext {
    pub fn new(registry: Arc<TaskRegistry>) -> Self {
        Self {
            registry,
            storage: None,
            args_as_tuple: false,
        }
    }

    pub fn with_storage(
        mut self,
        storage: Arc<dyn StorageBackend>,
    ) -> Self {
        self.storage = Some(storage);
        self
    }

    pub fn with_args_as_tuple(
        mut self,
        args_as_tuple: bool,
    ) -> Self {
        self.args_as_tuple = args_as_tuple;
        self
    }
}

/// Run the task described by `invocation`
pub fn run(
    ctx: &WorkerContext,
    invocation: &WorkerInvocation,
) -> Result<TaskOutcome, WorkerError> {
    debug!("Starting worker for task {}", invocation.task_id);
    let signature = invocation.impl_signature();
    let task = ctx
        .registry
        .get(&signature)
        .ok_or_else(|| WorkerError::MissingTask(signature.clone()))?;
    debug!("RUN TASK with arguments");
    debug!("\t- Path: {}", invocation.path);
    debug!("\t- Method/function name: {}", invocation.method_name);
    debug!("\t- Has target: {}", invocation.has_target);
    debug!("\t- # parameters: {}", invocation.params.len());
    debug!(
        "\t- COMPSs types: {:?}",
        invocation.params.iter().map(|p| p.data_type.code()).collect::<Vec<_>>()
    );
    execute(
        &task,
        invocation,
        ctx.storage.as_deref(),
        ctx.args_as_tuple,
    )
}

/// Process entry: set up logging and storage, run, report the exit status
pub fn main_entry(
    args: WorkerArgs,
    registry: Arc<TaskRegistry>,
) -> ExitCode {
    logger::init_with_level(LogLevel::from_worker_flag(&args.log_level));
    let invocation = match WorkerInvocation::from_args(&args) {
        Ok(invocation) => invocation,
        Err(e) => {
            error!("WORKER EXCEPTION: {}", e);
            return ExitCode::from(e.exit_code());
        }
    };

    let mut ctx = WorkerContext::new(registry);
    match BindingConfig::load(None) {
        Ok(config) => ctx.args_as_tuple = config.args_as_tuple,
        Err(e) => debug!("Using default worker configuration: {}", e),
    }
    if let Some(conf) = &invocation.storage_conf {
        match FileStorage::from_conf(conf) {
            Ok(storage) => ctx.storage = Some(Arc::new(storage)),
            Err(e) => {
                error!("WORKER EXCEPTION: could not open storage: {}", e);
                return ExitCode::from(WorkerError::Storage(e).exit_code());
            }
        }
    }

    match run(&ctx, &invocation) {
        Ok(outcome) => {
            debug!("Task {} finished: {:?}", invocation.task_id, outcome.values);
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!("WORKER EXCEPTION: {}", e);
            ExitCode::from(e.exit_code())
        }
    }
}
