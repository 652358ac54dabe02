//! Task descriptors
//!
//! A [`TaskDescriptor`] is everything the binding knows about one task
//! function. It is assembled by a [`TaskBuilder`] in explicit layers: the
//! task layer (parameters, returns, scheduling flags) and any number of
//! implementation layers (constraints, MPI, binary, ...) that only edit the
//! core element. [`TaskBuilder::build`] is the outermost step.

use super::core_element::{ConstraintValue, CoreElement, ImplementationKind};
use super::parameter::ParamSpec;
use crate::value::ValueKind;
use indexmap::IndexMap;
use thiserror::Error;

/// Working directory sent when an implementation declares none
pub const UNASSIGNED: &str = "[unassigned]";

/// Errors raised while assembling a descriptor
#[derive(Debug, Error, PartialEq)]
pub enum DescriptorError {
    #[error("parameter `{0}` declared twice")]
    DuplicateParameter(String),

    #[error("wrong computing nodes value `{0}`")]
    InvalidComputingNodes(String),

    #[error("environment variable `{0}` is not set")]
    MissingEnv(String),
}

/// Shape of the task function
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum FunctionKind {
    /// Free function
    #[default]
    Function,
    /// Method called on an instance; the instance travels as the target
    Instance { class: String },
    /// Method of a class that needs no instance
    Class { class: String },
}

impl FunctionKind {
    pub fn class(&self) -> Option<&str> {
        match self {
            FunctionKind::Function => None,
            FunctionKind::Instance { class } | FunctionKind::Class { class } => Some(class),
        }
    }

    #[inline]
    pub fn has_target(&self) -> bool {
        matches!(self, FunctionKind::Instance { .. })
    }
}

/// Node count of a multi-node implementation: a literal or an environment
/// variable reference (`$VAR` or `${VAR}`)
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ComputingNodes {
    Fixed(u32),
    Expr(String),
}

impl Default for ComputingNodes {
    fn default() -> Self {
        ComputingNodes::Fixed(1)
    }
}

impl From<u32> for ComputingNodes {
    fn from(v: u32) -> Self {
        ComputingNodes::Fixed(v)
    }
}

impl From<&str> for ComputingNodes {
    fn from(v: &str) -> Self {
        ComputingNodes::Expr(v.to_string())
    }
}

impl ComputingNodes {
    /// Resolve to a node count, reading the environment if needed
    pub fn resolve(&self) -> Result<u32, DescriptorError> {
        let expr = match self {
            ComputingNodes::Fixed(n) => return Ok(*n),
            ComputingNodes::Expr(expr) => expr.trim(),
        };
        if let Some(var) = expr.strip_prefix('$') {
            let var = var
                .strip_prefix('{')
                .and_then(|v| v.strip_suffix('}'))
                .unwrap_or(var);
            let raw = std::env::var(var).map_err(|_| DescriptorError::MissingEnv(var.to_string()))?;
            return raw
                .trim()
                .parse()
                .map_err(|_| DescriptorError::InvalidComputingNodes(raw));
        }
        expr.parse()
            .map_err(|_| DescriptorError::InvalidComputingNodes(expr.to_string()))
    }
}

#[derive(Debug, Clone)]
enum Implementation {
    Mpi {
        binary: String,
        runner: String,
        working_dir: Option<String>,
    },
    Binary {
        binary: String,
        working_dir: Option<String>,
    },
    Ompss {
        binary: String,
        working_dir: Option<String>,
    },
    Opencl {
        kernel: String,
        working_dir: Option<String>,
    },
    Decaf {
        df_script: String,
        df_executor: Option<String>,
        df_lib: Option<String>,
        working_dir: Option<String>,
        runner: Option<String>,
    },
}

/// Complete description of a task function
#[derive(Debug, Clone)]
pub struct TaskDescriptor {
    pub module: String,
    pub name: String,
    pub kind: FunctionKind,
    /// Formal parameters in declaration order
    pub params: IndexMap<String, ParamSpec>,
    pub varargs: Option<String>,
    pub kwargs: Option<String>,
    /// Declared return kinds; empty when the task returns nothing
    pub returns: Vec<ValueKind>,
    pub priority: bool,
    pub replicated: bool,
    pub distributed: bool,
    /// Whether an instance method may modify its target
    pub modifier: bool,
    pub computing_nodes: u32,
    pub core_element: CoreElement,
}

impl TaskDescriptor {
    /// Core element signature, also the submission signature
    pub fn signature(&self) -> &str {
        &self.core_element.signature
    }

    pub fn has_target(&self) -> bool {
        self.kind.has_target()
    }

    pub fn num_returns(&self) -> usize {
        self.returns.len()
    }
}

/// Layered builder of [`TaskDescriptor`]
#[derive(Debug, Clone)]
pub struct TaskBuilder {
    module: String,
    name: String,
    kind: FunctionKind,
    params: Vec<(String, ParamSpec)>,
    varargs: Option<String>,
    kwargs: Option<String>,
    returns: Vec<ValueKind>,
    priority: bool,
    replicated: bool,
    distributed: bool,
    modifier: bool,
    computing_nodes: ComputingNodes,
    constraints: IndexMap<String, ConstraintValue>,
    implementation: Option<Implementation>,
    implements: Option<(String, String)>,
}

impl TaskBuilder {
    pub fn new(
        module: impl Into<String>,
        name: impl Into<String>,
    ) -> Self {
        Self {
            module: module.into(),
            name: name.into(),
            kind: FunctionKind::Function,
            params: Vec::new(),
            varargs: None,
            kwargs: None,
            returns: Vec::new(),
            priority: false,
            replicated: false,
            distributed: false,
            modifier: true,
            computing_nodes: ComputingNodes::default(),
            constraints: IndexMap::new(),
            implementation: None,
            implements: None,
        }
    }

    /// Declare the next formal parameter
    pub fn param(
        mut self,
        name: impl Into<String>,
        spec: ParamSpec,
    ) -> Self {
        self.params.push((name.into(), spec));
        self
    }

    /// Declare `n` returns of unknown shape
    pub fn returns(
        mut self,
        n: usize,
    ) -> Self {
        self.returns = vec![ValueKind::Any; n];
        self
    }

    pub fn returns_typed(
        mut self,
        kinds: impl IntoIterator<Item = ValueKind>,
    ) -> Self {
        self.returns = kinds.into_iter().collect();
        self
    }

    pub fn priority(mut self) -> Self {
        self.priority = true;
        self
    }

    pub fn replicated(mut self) -> Self {
        self.replicated = true;
        self
    }

    pub fn distributed(mut self) -> Self {
        self.distributed = true;
        self
    }

    pub fn modifier(
        mut self,
        modifier: bool,
    ) -> Self {
        self.modifier = modifier;
        self
    }

    pub fn instance_method(
        mut self,
        class: impl Into<String>,
    ) -> Self {
        self.kind = FunctionKind::Instance {
            class: class.into(),
        };
        self
    }

    pub fn class_method(
        mut self,
        class: impl Into<String>,
    ) -> Self {
        self.kind = FunctionKind::Class {
            class: class.into(),
        };
        self
    }

    /// Collect extra positional arguments under `name`
    pub fn varargs(
        mut self,
        name: impl Into<String>,
    ) -> Self {
        self.varargs = Some(name.into());
        self
    }

    /// Collect unknown keyword arguments under `name`
    pub fn kwargs(
        mut self,
        name: impl Into<String>,
    ) -> Self {
        self.kwargs = Some(name.into());
        self
    }

    pub fn constraint(
        mut self,
        key: impl Into<String>,
        value: impl Into<ConstraintValue>,
    ) -> Self {
        self.constraints.insert(key.into(), value.into());
        self
    }

    pub fn mpi(
        mut self,
        binary: impl Into<String>,
        runner: impl Into<String>,
        working_dir: Option<&str>,
        computing_nodes: impl Into<ComputingNodes>,
    ) -> Self {
        self.implementation = Some(Implementation::Mpi {
            binary: binary.into(),
            runner: runner.into(),
            working_dir: working_dir.map(str::to_string),
        });
        self.computing_nodes = computing_nodes.into();
        self
    }

    pub fn binary(
        mut self,
        binary: impl Into<String>,
        working_dir: Option<&str>,
    ) -> Self {
        self.implementation = Some(Implementation::Binary {
            binary: binary.into(),
            working_dir: working_dir.map(str::to_string),
        });
        self
    }

    pub fn ompss(
        mut self,
        binary: impl Into<String>,
        working_dir: Option<&str>,
    ) -> Self {
        self.implementation = Some(Implementation::Ompss {
            binary: binary.into(),
            working_dir: working_dir.map(str::to_string),
        });
        self
    }

    pub fn opencl(
        mut self,
        kernel: impl Into<String>,
        working_dir: Option<&str>,
    ) -> Self {
        self.implementation = Some(Implementation::Opencl {
            kernel: kernel.into(),
            working_dir: working_dir.map(str::to_string),
        });
        self
    }

    pub fn decaf(
        mut self,
        df_script: impl Into<String>,
        df_executor: Option<&str>,
        df_lib: Option<&str>,
        working_dir: Option<&str>,
        runner: Option<&str>,
        computing_nodes: impl Into<ComputingNodes>,
    ) -> Self {
        self.implementation = Some(Implementation::Decaf {
            df_script: df_script.into(),
            df_executor: df_executor.map(str::to_string),
            df_lib: df_lib.map(str::to_string),
            working_dir: working_dir.map(str::to_string),
            runner: runner.map(str::to_string),
        });
        self.computing_nodes = computing_nodes.into();
        self
    }

    /// Register this function as an alternative implementation of
    /// `source_class.method`
    pub fn implement(
        mut self,
        source_class: impl Into<String>,
        method: impl Into<String>,
    ) -> Self {
        self.implements = Some((source_class.into(), method.into()));
        self
    }

    /// Finish the descriptor
    pub fn build(self) -> Result<TaskDescriptor, DescriptorError> {
        let mut params = IndexMap::with_capacity(self.params.len());
        for (name, spec) in self.params {
            if params.contains_key(&name) {
                return Err(DescriptorError::DuplicateParameter(name));
            }
            params.insert(name, spec);
        }

        let computing_nodes = self.computing_nodes.resolve()?;
        let mut core_element = CoreElement::method(&self.module, self.kind.class(), &self.name);

        if let Some((source_class, method)) = &self.implements {
            core_element.signature = format!("{}.{}", source_class, method);
        }

        let wd = |dir: &Option<String>| dir.clone().unwrap_or_else(|| UNASSIGNED.to_string());
        if let Some(implementation) = &self.implementation {
            let (kind, impl_signature, impl_args) = match implementation {
                Implementation::Mpi {
                    binary,
                    runner,
                    working_dir,
                } => (
                    ImplementationKind::Mpi,
                    format!("MPI.{}", binary),
                    vec![binary.clone(), wd(working_dir), runner.clone()],
                ),
                Implementation::Binary {
                    binary,
                    working_dir,
                } => (
                    ImplementationKind::Binary,
                    format!("BINARY.{}", binary),
                    vec![binary.clone(), wd(working_dir)],
                ),
                Implementation::Ompss {
                    binary,
                    working_dir,
                } => (
                    ImplementationKind::Ompss,
                    format!("OMPSS.{}", binary),
                    vec![binary.clone(), wd(working_dir)],
                ),
                Implementation::Opencl {
                    kernel,
                    working_dir,
                } => (
                    ImplementationKind::Opencl,
                    format!("OPENCL.{}", kernel),
                    vec![kernel.clone(), wd(working_dir)],
                ),
                Implementation::Decaf {
                    df_script,
                    df_executor,
                    df_lib,
                    working_dir,
                    runner,
                } => (
                    ImplementationKind::Decaf,
                    format!("DECAF.{}", df_script),
                    vec![
                        df_script.clone(),
                        df_executor.clone().unwrap_or_else(|| UNASSIGNED.to_string()),
                        df_lib.clone().unwrap_or_else(|| UNASSIGNED.to_string()),
                        wd(working_dir),
                        runner.clone().unwrap_or_else(|| "mpirun".to_string()),
                    ],
                ),
            };
            core_element.kind = kind;
            core_element.impl_signature = impl_signature;
            core_element.impl_args = impl_args;
        }
        core_element.constraints = self.constraints;

        Ok(TaskDescriptor {
            module: self.module,
            name: self.name,
            kind: self.kind,
            params,
            varargs: self.varargs,
            kwargs: self.kwargs,
            returns: self.returns,
            priority: self.priority,
            replicated: self.replicated,
            distributed: self.distributed,
            modifier: self.modifier,
            computing_nodes,
            core_element,
        })
    }
}
