//! Task bodies known to a worker

use crate::task::TaskDescriptor;
use crate::value::Obj;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;

/// Body of a task function.
///
/// Receives the reconstructed arguments (target first for instance
/// methods) and returns the declared results in order.
pub type TaskBody = Arc<dyn Fn(&[Obj]) -> anyhow::Result<Vec<Obj>> + Send + Sync>;

/// A task function the worker can execute
#[derive(Clone)]
pub struct RegisteredTask {
    pub descriptor: TaskDescriptor,
    pub body: TaskBody,
}

impl std::fmt::Debug for RegisteredTask {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        f.debug_struct("RegisteredTask")
            .field("signature", &self.descriptor.signature())
            .finish()
    }
}

/// Task bodies keyed by implementation signature (`path.method`)
#[derive(Debug, Default)]
pub struct TaskRegistry {
    tasks: RwLock<HashMap<String, RegisteredTask>>,
}

impl TaskRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make `descriptor` executable with `body`. Replaces any previous
    /// body with the same implementation signature.
    pub fn insert<F>(
        &self,
        descriptor: TaskDescriptor,
        body: F,
    ) where
        F: Fn(&[Obj]) -> anyhow::Result<Vec<Obj>> + Send + Sync + 'static,
    {
        let key = descriptor.core_element.impl_signature.clone();
        self.tasks.write().insert(
            key,
            RegisteredTask {
                descriptor,
                body: Arc::new(body),
            },
        );
    }

    pub fn get(
        &self,
        impl_signature: &str,
    ) -> Option<RegisteredTask> {
        self.tasks.read().get(impl_signature).cloned()
    }

    pub fn len(&self) -> usize {
        self.tasks.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.read().is_empty()
    }
}
