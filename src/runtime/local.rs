//! Sequential in-process runtime
//!
//! Every submission runs immediately: it is flattened into the worker
//! command line, parsed back and executed through the worker entry. Files
//! are served in place, so a task's outputs are visible as soon as
//! [`Runtime::process_task`] returns.

use super::{FileLocation, Runtime, RuntimeError, Submission, FILE_PROTOCOL, STORAGE_PROTOCOL};
use crate::proxy::worker::nio_path;
use crate::storage::{FileStorage, StorageBackend, StorageError};
use crate::task::{CoreElement, DataType, Direction};
use crate::util::config::BindingConfig;
use crate::util::logger::LogLevel;
use crate::worker::{self, TaskRegistry, WorkerContext, WorkerInvocation};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::{debug, error, info};

/// Activity counters of a [`LocalRuntime`]
#[derive(Debug, Default)]
pub struct LocalStats {
    submissions: AtomicUsize,
    failures: AtomicUsize,
    file_requests: AtomicUsize,
    deletions: AtomicUsize,
    registrations: AtomicUsize,
}

impl LocalStats {
    pub fn submissions(&self) -> usize {
        self.submissions.load(Ordering::Relaxed)
    }

    /// Tasks whose worker exited with an error
    pub fn failures(&self) -> usize {
        self.failures.load(Ordering::Relaxed)
    }

    pub fn file_requests(&self) -> usize {
        self.file_requests.load(Ordering::Relaxed)
    }

    pub fn deletions(&self) -> usize {
        self.deletions.load(Ordering::Relaxed)
    }

    pub fn registrations(&self) -> usize {
        self.registrations.load(Ordering::Relaxed)
    }
}

/// Runtime that executes tasks one by one in the calling thread
pub struct LocalRuntime {
    context: WorkerContext,
    storage_conf: Option<PathBuf>,
    log_level: LogLevel,
    elements: Mutex<HashMap<String, CoreElement>>,
    /// Output files whose value was made persistent by the task
    persisted: Mutex<HashMap<PathBuf, String>>,
    next_task: AtomicU64,
    running: AtomicBool,
    stats: Arc<LocalStats>,
}

impl std::fmt::Debug for LocalRuntime {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        f.debug_struct("LocalRuntime")
            .field("tasks", &self.context.registry.len())
            .field("running", &self.running.load(Ordering::Relaxed))
            .field("stats", &self.stats)
            .finish()
    }
}

impl LocalRuntime {
    pub fn new(registry: Arc<TaskRegistry>) -> Self {
        Self {
            context: WorkerContext::new(registry),
            storage_conf: None,
            log_level: LogLevel::Info,
            elements: Mutex::new(HashMap::new()),
            persisted: Mutex::new(HashMap::new()),
            next_task: AtomicU64::new(0),
            running: AtomicBool::new(false),
            stats: Arc::new(LocalStats::default()),
        }
    }

    /// Runtime matching a binding configuration: opens the configured
    /// storage and carries the variadic convention to the worker
    pub fn from_config(
        config: &BindingConfig,
        registry: Arc<TaskRegistry>,
    ) -> Result<Self, StorageError> {
        let mut runtime = Self::new(registry)
            .with_args_as_tuple(config.args_as_tuple)
            .with_log_level(config.log_level);
        if let Some(conf) = &config.storage_conf {
            let storage = FileStorage::from_conf(conf)?;
            runtime = runtime.with_storage(Arc::new(storage), Some(conf.clone()));
        }
        Ok(runtime)
    }

    pub fn with_storage(
        mut self,
        storage: Arc<dyn StorageBackend>,
        storage_conf: Option<PathBuf>,
    ) -> Self {
        self.context = self.context.with_storage(storage);
        self.storage_conf = storage_conf;
        self
    }

    pub fn with_args_as_tuple(
        mut self,
        args_as_tuple: bool,
    ) -> Self {
        self.context = self.context.with_args_as_tuple(args_as_tuple);
        self
    }

    pub fn with_log_level(
        mut self,
        log_level: LogLevel,
    ) -> Self {
        self.log_level = log_level;
        self
    }

    /// Shared handle to the counters, usable after the runtime is boxed
    pub fn stats(&self) -> Arc<LocalStats> {
        Arc::clone(&self.stats)
    }

    fn ensure_running(&self) -> Result<(), RuntimeError> {
        if self.running.load(Ordering::Acquire) {
            Ok(())
        } else {
            Err(RuntimeError::NotRunning)
        }
    }

    fn record_persisted(
        &self,
        submission: &Submission,
        outcome: &crate::proxy::worker::TaskOutcome,
    ) {
        let mut persisted = self.persisted.lock();
        for (index, id) in outcome.persisted() {
            if submission.types.get(index) == Some(&DataType::File) {
                let path = PathBuf::from(nio_path(&submission.values[index]));
                debug!("{} now refers to persistent object {}", path.display(), id);
                persisted.insert(path, id.to_string());
            }
        }
    }
}

impl Runtime for LocalRuntime {
    fn start(&self) -> Result<(), RuntimeError> {
        info!("Starting local runtime");
        self.running.store(true, Ordering::Release);
        Ok(())
    }

    fn stop(&self) -> Result<(), RuntimeError> {
        info!(
            "Stopping local runtime ({} tasks, {} failed)",
            self.stats.submissions(),
            self.stats.failures()
        );
        self.running.store(false, Ordering::Release);
        Ok(())
    }

    fn register_core_element(
        &self,
        element: &CoreElement,
    ) -> Result<(), RuntimeError> {
        self.stats.registrations.fetch_add(1, Ordering::Relaxed);
        self.elements
            .lock()
            .insert(element.signature.clone(), element.clone());
        Ok(())
    }

    fn process_task(
        &self,
        submission: Submission,
    ) -> Result<(), RuntimeError> {
        self.ensure_running()?;
        self.stats.submissions.fetch_add(1, Ordering::Relaxed);
        let element = self
            .elements
            .lock()
            .get(&submission.signature)
            .cloned()
            .ok_or_else(|| RuntimeError::UnknownTask(submission.signature.clone()))?;
        let task_id = self.next_task.fetch_add(1, Ordering::Relaxed) + 1;

        let argv = WorkerInvocation::from_submission(
            &submission,
            &element,
            task_id,
            self.log_level,
            self.storage_conf.clone(),
        )
        .encode();
        debug!("Launching task {}: {}", task_id, argv.join(" "));
        let invocation =
            WorkerInvocation::parse(&argv).map_err(|e| RuntimeError::Other(e.to_string()))?;

        match worker::run(&self.context, &invocation) {
            Ok(outcome) => self.record_persisted(&submission, &outcome),
            Err(e) => {
                self.stats.failures.fetch_add(1, Ordering::Relaxed);
                error!(
                    "Task {} ({}) failed with exit code {}: {}",
                    task_id,
                    submission.signature,
                    e.exit_code(),
                    e
                );
            }
        }
        Ok(())
    }

    fn get_file(
        &self,
        name: &str,
        mode: Direction,
    ) -> Result<FileLocation, RuntimeError> {
        self.ensure_running()?;
        self.stats.file_requests.fetch_add(1, Ordering::Relaxed);
        debug!("Requested {} ({:?})", name, mode);
        if let Some(id) = name.strip_prefix(STORAGE_PROTOCOL) {
            return Ok(FileLocation::Persistent(id.to_string()));
        }
        let path = PathBuf::from(name.strip_prefix(FILE_PROTOCOL).unwrap_or(name));
        if let Some(id) = self.persisted.lock().get(&path) {
            return Ok(FileLocation::Persistent(id.clone()));
        }
        Ok(FileLocation::Path(path))
    }

    fn close_file(
        &self,
        path: &Path,
        mode: Direction,
    ) -> Result<(), RuntimeError> {
        debug!("Closing {} ({:?})", path.display(), mode);
        Ok(())
    }

    fn delete_file(
        &self,
        path: &Path,
    ) -> Result<bool, RuntimeError> {
        self.stats.deletions.fetch_add(1, Ordering::Relaxed);
        self.persisted.lock().remove(path);
        match fs::remove_file(path) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    fn barrier(
        &self,
        app_id: u64,
        no_more_tasks: bool,
    ) -> Result<(), RuntimeError> {
        self.ensure_running()?;
        debug!(
            "Barrier for app {} (no more tasks: {}); all tasks already ran",
            app_id, no_more_tasks
        );
        Ok(())
    }
}
