//! Staging objects into files
//!
//! Each object version has at most one authoritative file. The first spill
//! assigns an identifier, derives the path from it and marks the object
//! pending. Later spills reuse the path and only serialize again when the
//! current version was produced by this process (after a synchronization).

use super::{Binding, ObjectId, TEMP_OBJ_PREFIX};
use crate::task::Direction;
use crate::value::serializer::serialize_to_file;
use crate::value::{Obj, SerializeError};
use std::path::PathBuf;
use tracing::debug;

impl Binding {
    /// Staging path of the object with the given id
    pub(crate) fn object_path(
        &self,
        id: &ObjectId,
    ) -> PathBuf {
        self.temp_dir()
            .join(format!("{}{}", TEMP_OBJ_PREFIX, id))
    }

    /// Make sure `obj` has an up-to-date file and return its path
    pub(crate) fn turn_into_file(
        &mut self,
        obj: &Obj,
        direction: Direction,
    ) -> Result<PathBuf, SerializeError> {
        let known = self.identity.lookup(obj);
        let id = match &known {
            Some(id) => id.clone(),
            None => self
                .identity
                .get_or_assign(obj, true, false)
                .ok_or_else(|| SerializeError::NotSerializable("no identifier assigned".to_string()))?,
        };

        let Some(path) = self.files.get(&id).cloned() else {
            // First time a task accesses this object
            let path = self.object_path(&id);
            if let Err(e) = serialize_to_file(obj, &path) {
                if known.is_none() {
                    self.identity.remove(&id);
                }
                return Err(e);
            }
            debug!("Mapping object {} to file {}", id, path.display());
            self.files.insert(id.clone(), path.clone());
            self.pending.insert(id, obj.clone());
            return Ok(path);
        };

        if let Some(compss_file) = self.written_by_main.remove(&id) {
            // The main program generated the last version
            debug!("Serializing object {} to file {}", id, compss_file.display());
            if let Err(e) = serialize_to_file(obj, &compss_file) {
                self.written_by_main.insert(id, compss_file);
                return Err(e);
            }
        }
        if direction.writes() {
            // The task will produce a newer version behind the same path
            self.pending.insert(id, obj.clone());
        }
        Ok(path)
    }

    /// Record a persisted object as in flight and return the id it travels by
    pub(crate) fn manage_persistent_object(
        &mut self,
        obj: &Obj,
        storage_id: String,
    ) -> String {
        self.pending
            .insert(ObjectId::from(storage_id.clone()), obj.clone());
        debug!("Managed persistent object: {}", storage_id);
        storage_id
    }
}
