//! Object identity registry
//!
//! Maps live objects to process-unique identifiers. Identity is the
//! allocation behind an [`Obj`] handle, never the value it holds. The
//! registry keeps a handle to every registered object, so an address can
//! not be reused by another object while its entry is alive.

use crate::value::Obj;
use std::collections::HashMap;
use std::fmt;
use uuid::Uuid;

/// Identifier of a tracked object: `<run id>-<counter>`
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectId(String);

impl ObjectId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ObjectId {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for ObjectId {
    fn from(id: String) -> Self {
        ObjectId(id)
    }
}

impl From<&str> for ObjectId {
    fn from(id: &str) -> Self {
        ObjectId(id.to_string())
    }
}

#[derive(Debug)]
struct Entry {
    id: ObjectId,
    obj: Obj,
}

/// Registry of object identities
#[derive(Debug)]
pub struct IdentityRegistry {
    run_id: String,
    next: u64,
    by_addr: HashMap<usize, Entry>,
    by_id: HashMap<ObjectId, usize>,
}

impl Default for IdentityRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl IdentityRegistry {
    /// Fresh registry with a random run id
    pub fn new() -> Self {
        Self::with_run_id(Uuid::new_v4().to_string())
    }

    pub fn with_run_id(run_id: impl Into<String>) -> Self {
        Self {
            run_id: run_id.into(),
            next: 1,
            by_addr: HashMap::new(),
            by_id: HashMap::new(),
        }
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    /// Identifier of `obj`.
    ///
    /// Returns the existing identifier unless `force_new` evicts it. When
    /// the object is unknown (or was evicted) a fresh identifier is
    /// assigned only if `assign_if_missing` is set. `force_new` requires
    /// `assign_if_missing`.
    pub fn get_or_assign(
        &mut self,
        obj: &Obj,
        assign_if_missing: bool,
        force_new: bool,
    ) -> Option<ObjectId> {
        assert!(
            !force_new || assign_if_missing,
            "force_new requires assign_if_missing"
        );
        let addr = obj.addr();
        if let Some(entry) = self.by_addr.get(&addr) {
            if !force_new {
                return Some(entry.id.clone());
            }
            if let Some(old) = self.by_addr.remove(&addr) {
                self.by_id.remove(&old.id);
            }
        }
        if !assign_if_missing {
            return None;
        }
        let id = ObjectId(format!("{}-{}", self.run_id, self.next));
        self.next += 1;
        self.by_id.insert(id.clone(), addr);
        self.by_addr.insert(
            addr,
            Entry {
                id: id.clone(),
                obj: obj.clone(),
            },
        );
        Some(id)
    }

    /// Identifier of `obj` without assigning one
    pub fn lookup(
        &self,
        obj: &Obj,
    ) -> Option<ObjectId> {
        self.by_addr.get(&obj.addr()).map(|entry| entry.id.clone())
    }

    /// Object registered under `id`
    pub fn object(
        &self,
        id: &ObjectId,
    ) -> Option<Obj> {
        self.by_id
            .get(id)
            .and_then(|addr| self.by_addr.get(addr))
            .map(|entry| entry.obj.clone())
    }

    /// Forget `id`; returns the object it referred to
    pub fn remove(
        &mut self,
        id: &ObjectId,
    ) -> Option<Obj> {
        let addr = self.by_id.remove(id)?;
        self.by_addr.remove(&addr).map(|entry| entry.obj)
    }

    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }

    pub fn clear(&mut self) {
        self.by_addr.clear();
        self.by_id.clear();
    }
}
