//! Persistent-object capability
//!
//! Records with a `storage_id` are owned by an external persistence layer.
//! The binding only needs three things from it: tell whether an object is
//! persisted, get its id, and fetch an object back by id. [`FileStorage`]
//! keeps each object in a `<id>.PSCO` file under one root directory.

use crate::value::serializer::{deserialize_from_file, serialize_to_file};
use crate::value::{Obj, SerializeError, Value};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;
use uuid::Uuid;

/// File extension of stored objects
pub const PSCO_EXTENSION: &str = "PSCO";

/// Persistence layer errors
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("no persistent object with id `{0}`")]
    NotFound(String),

    #[error("only records can be persisted, got {0}")]
    NotARecord(&'static str),

    #[error("storage configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    Serialize(#[from] SerializeError),

    #[error("storage I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Capability of the external persistence layer
pub trait StorageBackend: Send + Sync {
    /// Whether `obj` is owned by the persistence layer
    fn is_persistent(
        &self,
        obj: &Obj,
    ) -> bool {
        obj.persistent_id().is_some()
    }

    /// Stable id of a persisted object
    fn get_id(
        &self,
        obj: &Obj,
    ) -> Option<String> {
        obj.persistent_id()
    }

    /// Fetch a persisted object
    fn get_by_id(
        &self,
        id: &str,
    ) -> Result<Obj, StorageError>;

    /// Persist `obj` (assigning an id if it has none) and return its id.
    /// Persisting an already persisted object stores its current state.
    fn make_persistent(
        &self,
        obj: &Obj,
    ) -> Result<String, StorageError>;

    /// Remove a persisted object
    fn delete_persistent(
        &self,
        obj: &Obj,
    ) -> Result<(), StorageError>;
}

#[derive(Debug, Deserialize)]
struct StorageConf {
    root: PathBuf,
}

/// Directory-backed persistence layer
#[derive(Debug, Clone)]
pub struct FileStorage {
    root: PathBuf,
}

impl FileStorage {
    /// Store objects under `root`, creating it if needed
    pub fn new(root: impl Into<PathBuf>) -> Result<Self, StorageError> {
        let root = root.into();
        fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    /// Open the storage described by a TOML file with a `root` key.
    /// A directory is accepted as the root itself.
    pub fn from_conf(path: &Path) -> Result<Self, StorageError> {
        if path.is_dir() {
            return Self::new(path);
        }
        let content = fs::read_to_string(path)?;
        let conf: StorageConf =
            toml::from_str(&content).map_err(|e| StorageError::Config(e.to_string()))?;
        Self::new(conf.root)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_of(
        &self,
        id: &str,
    ) -> PathBuf {
        self.root.join(format!("{}.{}", id, PSCO_EXTENSION))
    }
}

impl StorageBackend for FileStorage {
    fn get_by_id(
        &self,
        id: &str,
    ) -> Result<Obj, StorageError> {
        let path = self.path_of(id);
        if !path.exists() {
            return Err(StorageError::NotFound(id.to_string()));
        }
        Ok(deserialize_from_file(&path)?)
    }

    fn make_persistent(
        &self,
        obj: &Obj,
    ) -> Result<String, StorageError> {
        let id = {
            let mut guard = obj.write();
            match &mut *guard {
                Value::Record(record) => record
                    .storage_id
                    .get_or_insert_with(|| Uuid::new_v4().to_string())
                    .clone(),
                other => return Err(StorageError::NotARecord(other.type_name())),
            }
        };
        serialize_to_file(obj, &self.path_of(&id))?;
        debug!("Persisted object {}", id);
        Ok(id)
    }

    fn delete_persistent(
        &self,
        obj: &Obj,
    ) -> Result<(), StorageError> {
        let Some(id) = obj.persistent_id() else {
            return Ok(());
        };
        let path = self.path_of(&id);
        if path.exists() {
            fs::remove_file(&path)?;
        } else {
            debug!("PSCO {} does not exist", path.display());
        }
        if let Value::Record(record) = &mut *obj.write() {
            record.storage_id = None;
        }
        Ok(())
    }
}
