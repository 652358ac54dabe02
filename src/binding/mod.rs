//! Binding coordinator
//!
//! [`Binding`] owns all process-scoped state of the submitting side and is
//! the only way to reach the external runtime.
//!
//! # Architecture
//!
//! - [`identity`] - object identity registry
//! - `spill` - staging objects into files
//! - `marshal` - parameters to wire values
//! - `future` - futures, synchronization and `wait_on`
//! - `crate::proxy::master` - the per-call entry point ([`Binding::call`])
//!
//! # Lifecycle
//!
//! ```text
//! start ──► call / wait_on / barrier / open_file / delete_* ──► stop
//!                                                    (clean objects,
//!                                                     stop runtime,
//!                                                     clean temps)
//! ```

pub mod future;
pub mod identity;
mod marshal;
mod spill;

use crate::error::{BindingError, Result};
use crate::runtime::{FileLocation, Runtime, RuntimeError};
use crate::storage::StorageBackend;
use crate::task::{CoreElementRegistry, Direction, TaskDescriptor};
use crate::util::config::BindingConfig;
use crate::value::Obj;
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashMap;
use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::TempDir;
use tracing::{debug, error, info, warn};
use walkdir::WalkDir;

pub use future::Resolved;
pub use identity::{IdentityRegistry, ObjectId};

/// File name prefix of staged objects
pub const TEMP_OBJ_PREFIX: &str = "compss-serialized-obj_";

/// Runtime temporaries left in the working directory
static TEMP_FILE_PATTERN: Lazy<Option<Regex>> = Lazy::new(|| Regex::new(r"d\d+v\d+_\d+\.IT").ok());

/// Client-side binding state
pub struct Binding {
    pub(crate) config: BindingConfig,
    pub(crate) runtime: Box<dyn Runtime>,
    pub(crate) storage: Option<Arc<dyn StorageBackend>>,
    pub(crate) identity: IdentityRegistry,
    /// Object id to staged file
    pub(crate) files: HashMap<ObjectId, PathBuf>,
    /// Objects whose authoritative value lives in the runtime
    pub(crate) pending: HashMap<ObjectId, Obj>,
    /// Objects last produced by this process, with the file they go to
    pub(crate) written_by_main: HashMap<ObjectId, PathBuf>,
    pub(crate) core_elements: CoreElementRegistry,
    staging: Option<TempDir>,
    temp_dir: PathBuf,
    running: bool,
}

impl std::fmt::Debug for Binding {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        f.debug_struct("Binding")
            .field("temp_dir", &self.temp_dir)
            .field("tracked", &self.identity.len())
            .field("pending", &self.pending.len())
            .field("running", &self.running)
            .finish()
    }
}

impl Binding {
    /// Prepare the staging area and start the runtime
    pub fn start(
        config: BindingConfig,
        runtime: Box<dyn Runtime>,
        storage: Option<Arc<dyn StorageBackend>>,
    ) -> Result<Self> {
        info!("Starting binding...");
        let (staging, temp_dir) = match &config.temp_dir {
            Some(dir) => {
                fs::create_dir_all(dir)?;
                (None, dir.clone())
            }
            None => {
                let dir = tempfile::Builder::new().prefix("taskbind").tempdir()?;
                let path = dir.path().to_path_buf();
                (Some(dir), path)
            }
        };
        debug!("Staging directory: {}", temp_dir.display());
        runtime.start()?;
        info!("Binding started");
        Ok(Self {
            config,
            runtime,
            storage,
            identity: IdentityRegistry::new(),
            files: HashMap::new(),
            pending: HashMap::new(),
            written_by_main: HashMap::new(),
            core_elements: CoreElementRegistry::new(),
            staging,
            temp_dir,
            running: true,
        })
    }

    /// Clean objects, stop the runtime and remove temporaries
    pub fn stop(&mut self) -> Result<()> {
        if !self.running {
            return Ok(());
        }
        info!("Cleaning objects...");
        self.clean_objects();
        info!("Stopping runtime...");
        self.runtime.stop()?;
        info!("Cleaning temps...");
        self.clean_temps()?;
        self.running = false;
        info!("Binding stopped");
        Ok(())
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    pub(crate) fn ensure_running(&self) -> Result<()> {
        if self.running {
            Ok(())
        } else {
            Err(BindingError::NotStarted)
        }
    }

    pub fn config(&self) -> &BindingConfig {
        &self.config
    }

    /// Directory where objects are staged
    pub fn temp_dir(&self) -> &Path {
        &self.temp_dir
    }

    /// Hand the task's core element to the runtime the first time it is
    /// seen. Returns whether this call registered it.
    pub fn register(
        &mut self,
        task: &TaskDescriptor,
    ) -> Result<bool> {
        self.ensure_running()?;
        if !self.core_elements.register(&task.core_element) {
            return Ok(false);
        }
        self.runtime.register_core_element(&task.core_element)?;
        debug!("CE with signature {} registered.", task.signature());
        Ok(true)
    }

    /// Wait for every submitted task
    pub fn barrier(
        &mut self,
        no_more_tasks: bool,
    ) -> Result<()> {
        self.ensure_running()?;
        debug!("Barrier. No more tasks? {}", no_more_tasks);
        self.runtime.barrier(self.config.app_id, no_more_tasks)?;
        Ok(())
    }

    /// Open a file that tasks may have produced; `mode` follows the usual
    /// `r`, `w`, `a`, `r+` conventions
    pub fn open_file(
        &mut self,
        path: &Path,
        mode: &str,
    ) -> Result<File> {
        self.ensure_running()?;
        let direction = Direction::from_mode(mode);
        debug!("Getting file {} with mode {}", path.display(), mode);
        let location = self
            .runtime
            .get_file(&path.display().to_string(), direction)?;
        let real = match location {
            FileLocation::Path(real) => real,
            FileLocation::Persistent(id) => {
                return Err(RuntimeError::FileUnavailable(format!(
                    "{} resolved to persistent object {}",
                    path.display(),
                    id
                ))
                .into())
            }
        };
        debug!("Runtime file name is {}", real.display());

        let mut options = OpenOptions::new();
        match direction {
            Direction::In => options.read(true),
            Direction::Out => options.write(true).create(true).truncate(true),
            Direction::InOut if mode.starts_with('a') => options.append(true).create(true),
            Direction::InOut => options.read(true).write(true),
        };
        Ok(options.open(&real)?)
    }

    /// Ask the runtime to remove a file
    pub fn delete_file(
        &mut self,
        path: &Path,
    ) -> Result<bool> {
        self.ensure_running()?;
        debug!("Deleting file {}", path.display());
        let deleted = self.runtime.delete_file(path)?;
        if deleted {
            debug!("File {} successfully deleted.", path.display());
        } else {
            error!("Failed to remove file {}.", path.display());
        }
        Ok(deleted)
    }

    /// Forget a tracked object and release its staged file. Returns
    /// `false` when the object was never tracked.
    pub fn delete_object(
        &mut self,
        obj: &Obj,
    ) -> Result<bool> {
        self.ensure_running()?;
        let Some(id) = self.identity.lookup(obj) else {
            return Ok(false);
        };
        self.identity.remove(&id);
        if let Some(path) = self.files.remove(&id) {
            if let Err(e) = self.runtime.delete_file(&path) {
                warn!("Could not delete {}: {}", path.display(), e);
            }
        }
        self.pending.remove(&id);
        self.written_by_main.remove(&id);
        Ok(true)
    }

    /// Identifier of a tracked object
    pub fn object_id(
        &self,
        obj: &Obj,
    ) -> Option<ObjectId> {
        self.identity.lookup(obj)
    }

    /// Staged file of a tracked object
    pub fn file_of(
        &self,
        obj: &Obj,
    ) -> Option<PathBuf> {
        self.identity
            .lookup(obj)
            .and_then(|id| self.files.get(&id).cloned())
    }

    /// Whether the authoritative value of `obj` lives in the runtime
    pub fn is_pending(
        &self,
        obj: &Obj,
    ) -> bool {
        if let Some(id) = obj.persistent_id() {
            return self.pending.contains_key(&ObjectId::from(id));
        }
        self.identity
            .lookup(obj)
            .is_some_and(|id| self.pending.contains_key(&id))
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    pub fn tracked_count(&self) -> usize {
        self.identity.len()
    }

    fn clean_objects(&mut self) {
        for path in self.files.values() {
            if let Err(e) = self.runtime.delete_file(path) {
                warn!("Could not delete {}: {}", path.display(), e);
            }
        }
        self.pending.clear();
        self.identity.clear();
        self.files.clear();
        self.written_by_main.clear();
        self.core_elements.clear();
    }

    fn clean_temps(&mut self) -> Result<()> {
        match self.staging.take() {
            Some(dir) => dir.close()?,
            None => remove_staged(&self.temp_dir)?,
        }
        let cwd = std::env::current_dir()?;
        remove_runtime_temps(&cwd)?;
        Ok(())
    }
}

/// Remove staged object files from a caller-provided directory
fn remove_staged(dir: &Path) -> Result<()> {
    for entry in WalkDir::new(dir).max_depth(1).into_iter().flatten() {
        let is_staged = entry
            .file_name()
            .to_str()
            .is_some_and(|name| name.starts_with(TEMP_OBJ_PREFIX));
        if is_staged && entry.file_type().is_file() {
            fs::remove_file(entry.path())?;
        }
    }
    Ok(())
}

/// Remove `d<N>v<N>_<N>.IT` files left by the runtime in `dir`.
/// Returns how many were removed.
pub fn remove_runtime_temps(dir: &Path) -> Result<usize> {
    let mut removed = 0;
    for entry in WalkDir::new(dir).max_depth(1).into_iter().flatten() {
        let matches = entry
            .file_name()
            .to_str()
            .is_some_and(|name| {
                TEMP_FILE_PATTERN
                    .as_ref()
                    .is_some_and(|pattern| pattern.is_match(name))
            });
        if matches && entry.file_type().is_file() {
            fs::remove_file(entry.path())?;
            removed += 1;
        }
    }
    Ok(removed)
}

impl Drop for Binding {
    fn drop(&mut self) {
        if self.running {
            if let Err(e) = self.stop() {
                error!("Failed to stop binding: {}", e);
            }
        }
    }
}
