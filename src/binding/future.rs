//! Futures and synchronization
//!
//! Per object id the binding moves between three states:
//!
//! ```text
//! LOCAL ──(spill / mint)──► IN_FLIGHT ──(synchronize)──► LOCAL (new id)
//!                               │
//!                               └──(delete_object)──► DELETED
//! ```
//!
//! Synchronization writes the resolved value into the same [`Obj`] handle,
//! so every clone the caller holds observes it.

use super::{Binding, ObjectId};
use crate::error::{BindingError, Result};
use crate::runtime::{FileLocation, RuntimeError, STORAGE_PROTOCOL};
use crate::task::Direction;
use crate::value::serializer::deserialize_from_file;
use crate::value::{Obj, ValueKind};
use std::collections::HashSet;
use std::path::PathBuf;
use tracing::{debug, warn};

/// Result of [`Binding::wait_on`]
#[derive(Debug, Clone)]
pub enum Resolved {
    One(Obj),
    Many(Vec<Obj>),
}

impl Resolved {
    /// The single value, or the first of many
    pub fn into_one(self) -> Option<Obj> {
        match self {
            Resolved::One(obj) => Some(obj),
            Resolved::Many(objs) => objs.into_iter().next(),
        }
    }

    pub fn into_vec(self) -> Vec<Obj> {
        match self {
            Resolved::One(obj) => vec![obj],
            Resolved::Many(objs) => objs,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            Resolved::One(_) => 1,
            Resolved::Many(objs) => objs.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Binding {
    /// Create a placeholder for a task result and mark it in flight.
    /// Returns the placeholder and the file the task writes the result to.
    pub(crate) fn mint_future(
        &mut self,
        kind: &ValueKind,
    ) -> Result<(Obj, PathBuf)> {
        let future = Obj::new(kind.placeholder());
        let id = self
            .identity
            .get_or_assign(&future, true, false)
            .ok_or_else(|| RuntimeError::Other("could not assign a future id".to_string()))?;
        let path = self.object_path(&id);
        debug!("Minted future {} at {}", id, path.display());
        self.files.insert(id.clone(), path.clone());
        self.pending.insert(id, future.clone());
        Ok((future, path))
    }

    /// Bring the authoritative value of `obj` back into this process.
    ///
    /// Objects that are not in flight are returned untouched. Otherwise the
    /// runtime is asked for the latest version, which replaces the value
    /// behind the handle; the object then continues under a new id.
    pub fn synchronize(
        &mut self,
        obj: &Obj,
        mode: Direction,
    ) -> Result<Obj> {
        self.ensure_running()?;
        if let Some(psco_id) = obj.persistent_id() {
            return self.synchronize_persistent(obj, psco_id, mode);
        }

        let Some(id) = self.identity.lookup(obj) else {
            return Ok(obj.clone());
        };
        if !self.pending.contains_key(&id) {
            return Ok(obj.clone());
        }
        let path = self.files.get(&id).cloned().ok_or_else(|| {
            RuntimeError::FileUnavailable(format!("object {} has no file", id))
        })?;

        debug!("Synchronizing object {} from {}", id, path.display());
        let location = self.runtime.get_file(&path.display().to_string(), mode)?;
        let resolved = match location {
            FileLocation::Path(real) => {
                debug!("Runtime file name is {}", real.display());
                let resolved = deserialize_from_file(&real)?;
                self.runtime.close_file(&path, mode)?;
                resolved
            }
            FileLocation::Persistent(psco_id) => {
                debug!("Object {} became persistent object {}", id, psco_id);
                let storage = self
                    .storage
                    .clone()
                    .ok_or_else(|| BindingError::StorageDisabled(psco_id.clone()))?;
                storage.get_by_id(&psco_id)?
            }
        };
        obj.set(resolved.get());

        let new_id = self
            .identity
            .get_or_assign(obj, true, true)
            .ok_or_else(|| RuntimeError::Other(format!("could not renew id of {}", id)))?;
        let new_path = PathBuf::from(
            path.display()
                .to_string()
                .replace(id.as_str(), new_id.as_str()),
        );
        self.files.insert(new_id.clone(), new_path.clone());
        self.written_by_main.insert(new_id, new_path);

        if !self.runtime.delete_file(&path)? {
            warn!("Runtime could not delete {}", path.display());
        }
        self.files.remove(&id);
        self.pending.remove(&id);
        self.written_by_main.remove(&id);
        Ok(obj.clone())
    }

    fn synchronize_persistent(
        &mut self,
        obj: &Obj,
        psco_id: String,
        mode: Direction,
    ) -> Result<Obj> {
        let key = ObjectId::from(psco_id.clone());
        if !self.pending.contains_key(&key) {
            return Ok(obj.clone());
        }
        let storage = self
            .storage
            .clone()
            .ok_or_else(|| BindingError::StorageDisabled(psco_id.clone()))?;
        debug!("Synchronizing persistent object {}", psco_id);
        self.runtime
            .get_file(&format!("{}{}", STORAGE_PROTOCOL, psco_id), mode)?;
        let resolved = storage.get_by_id(&psco_id)?;
        obj.set(resolved.get());
        self.pending.remove(&key);
        Ok(obj.clone())
    }

    /// Wait for the given objects, descending into nested lists
    pub fn wait_on(
        &mut self,
        objs: &[Obj],
    ) -> Result<Resolved> {
        self.wait_on_mode(objs, Direction::In)
    }

    /// Same as [`Binding::wait_on`], announcing that the caller will
    /// write the objects
    pub fn wait_on_write(
        &mut self,
        objs: &[Obj],
    ) -> Result<Resolved> {
        self.wait_on_mode(objs, Direction::InOut)
    }

    /// Wait for a single object
    pub fn wait_on_one(
        &mut self,
        obj: &Obj,
    ) -> Result<Obj> {
        self.ensure_running()?;
        self.wait_on_value(obj, Direction::In)
    }

    fn wait_on_mode(
        &mut self,
        objs: &[Obj],
        mode: Direction,
    ) -> Result<Resolved> {
        self.ensure_running()?;
        let mut results = Vec::with_capacity(objs.len());
        for obj in objs {
            results.push(self.wait_on_value(obj, mode)?);
        }
        // Empty-return markers carry nothing for the caller
        results.retain(|obj| !obj.is_empty_marker());
        if results.len() == 1 {
            Ok(Resolved::One(results.remove(0)))
        } else {
            Ok(Resolved::Many(results))
        }
    }

    fn wait_on_value(
        &mut self,
        obj: &Obj,
        mode: Direction,
    ) -> Result<Obj> {
        match obj.as_list() {
            Some(items) if !items.is_empty() => {
                let mut seen = HashSet::new();
                self.wait_on_list(obj, items, mode, &mut seen)
            }
            _ => self.synchronize(obj, mode),
        }
    }

    /// `seen` holds the lists already walked, so a list reaching itself
    /// is visited once
    fn wait_on_list(
        &mut self,
        list: &Obj,
        items: Vec<Obj>,
        mode: Direction,
        seen: &mut HashSet<usize>,
    ) -> Result<Obj> {
        if !seen.insert(list.addr()) {
            return Ok(list.clone());
        }
        if self.is_pending(list) {
            return self.synchronize(list, mode);
        }
        for item in &items {
            match item.as_list() {
                Some(inner) => {
                    self.wait_on_list(item, inner, mode, seen)?;
                }
                None => {
                    self.synchronize(item, mode)?;
                }
            }
        }
        Ok(list.clone())
    }
}
