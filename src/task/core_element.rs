//! Core elements
//!
//! The metadata the external runtime needs to dispatch a task function:
//! signatures, implementation kind, constraints and implementation
//! arguments. Registration is idempotent per signature.

use indexmap::IndexMap;
use parking_lot::Mutex;
use std::collections::HashSet;
use std::fmt;
use tracing::debug;

/// How the task body is executed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ImplementationKind {
    #[default]
    Method,
    Mpi,
    Binary,
    Ompss,
    Opencl,
    Decaf,
}

impl fmt::Display for ImplementationKind {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        let name = match self {
            ImplementationKind::Method => "METHOD",
            ImplementationKind::Mpi => "MPI",
            ImplementationKind::Binary => "BINARY",
            ImplementationKind::Ompss => "OMPSS",
            ImplementationKind::Opencl => "OPENCL",
            ImplementationKind::Decaf => "DECAF",
        };
        write!(f, "{}", name)
    }
}

/// Value of one constraint entry
#[derive(Debug, Clone, PartialEq)]
pub enum ConstraintValue {
    Scalar(String),
    List(Vec<String>),
}

impl fmt::Display for ConstraintValue {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        match self {
            ConstraintValue::Scalar(v) => write!(f, "{}", v),
            ConstraintValue::List(items) => write!(f, "[{}]", items.join(", ")),
        }
    }
}

impl From<&str> for ConstraintValue {
    fn from(v: &str) -> Self {
        ConstraintValue::Scalar(v.to_string())
    }
}

impl From<String> for ConstraintValue {
    fn from(v: String) -> Self {
        ConstraintValue::Scalar(v)
    }
}

impl From<u32> for ConstraintValue {
    fn from(v: u32) -> Self {
        ConstraintValue::Scalar(v.to_string())
    }
}

impl From<Vec<String>> for ConstraintValue {
    fn from(v: Vec<String>) -> Self {
        ConstraintValue::List(v)
    }
}

impl From<Vec<&str>> for ConstraintValue {
    fn from(v: Vec<&str>) -> Self {
        ConstraintValue::List(v.into_iter().map(str::to_string).collect())
    }
}

/// Registration record of one task function
#[derive(Debug, Clone, PartialEq)]
pub struct CoreElement {
    pub signature: String,
    pub impl_signature: String,
    /// Insertion-ordered constraints
    pub constraints: IndexMap<String, ConstraintValue>,
    pub kind: ImplementationKind,
    pub impl_args: Vec<String>,
}

impl CoreElement {
    /// Plain method core element for `module.name` (or
    /// `module.class.name` when `class` is given)
    pub fn method(
        module: &str,
        class: Option<&str>,
        name: &str,
    ) -> Self {
        let owner = match class {
            Some(class) => format!("{}.{}", module, class),
            None => module.to_string(),
        };
        let signature = format!("{}.{}", owner, name);
        Self {
            impl_signature: signature.clone(),
            signature,
            constraints: IndexMap::new(),
            kind: ImplementationKind::Method,
            impl_args: vec![owner, name.to_string()],
        }
    }

    /// Constraints rendered as `key:value;` per entry
    pub fn constraints_string(&self) -> String {
        self.constraints
            .iter()
            .map(|(key, value)| format!("{}:{};", key, value))
            .collect()
    }
}

/// Set of core elements already handed to the runtime
#[derive(Debug, Default)]
pub struct CoreElementRegistry {
    registered: Mutex<HashSet<String>>,
}

impl CoreElementRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `element`. Returns `true` only the first time its signature
    /// is seen; callers forward the element to the runtime in that case.
    pub fn register(
        &self,
        element: &CoreElement,
    ) -> bool {
        let fresh = self.registered.lock().insert(element.signature.clone());
        if fresh {
            debug!("Registering CE with signature: {}", element.signature);
            debug!("\t - Implementation signature: {}", element.impl_signature);
            debug!(
                "\t - Implementation constraints: {}",
                element.constraints_string()
            );
            debug!("\t - Implementation type: {}", element.kind);
            debug!(
                "\t - Implementation type arguments: {}",
                element.impl_args.join(" ")
            );
        }
        fresh
    }

    pub fn contains(
        &self,
        signature: &str,
    ) -> bool {
        self.registered.lock().contains(signature)
    }

    pub fn len(&self) -> usize {
        self.registered.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.registered.lock().clear();
    }
}
