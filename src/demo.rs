//! Built-in demo tasks
//!
//! A handful of task functions used by the `demo` and `worker`
//! subcommands of the binary: a scalar task, an IN_OUT list task, a task
//! with two returns and an instance method.

use crate::binding::Binding;
use crate::proxy::{CallArgs, Returned};
use crate::runtime::LocalRuntime;
use crate::storage::{FileStorage, StorageBackend};
use crate::task::{DescriptorError, ParamSpec, TaskBuilder, TaskDescriptor};
use crate::util::config::BindingConfig;
use crate::value::{Obj, Record, Value};
use crate::worker::TaskRegistry;
use anyhow::{anyhow, bail, Context};
use std::sync::Arc;
use tracing::info;

/// Module the demo tasks live in
pub const MODULE: &str = "demo";

/// Descriptors of the demo tasks
#[derive(Debug, Clone)]
pub struct DemoTasks {
    /// `increment(x) -> x + 1`
    pub increment: TaskDescriptor,
    /// `accumulate(a, b)` with `b` IN_OUT: `b[0] += a[0]`
    pub accumulate: TaskDescriptor,
    /// `divmod(a, b) -> (a / b, a % b)`
    pub divmod: TaskDescriptor,
    /// `Counter.add(self, n)`: `self.value += n`
    pub counter_add: TaskDescriptor,
}

impl DemoTasks {
    pub fn new() -> Result<Self, DescriptorError> {
        Ok(Self {
            increment: TaskBuilder::new(MODULE, "increment")
                .param("x", ParamSpec::input())
                .returns(1)
                .build()?,
            accumulate: TaskBuilder::new(MODULE, "accumulate")
                .param("a", ParamSpec::input())
                .param("b", ParamSpec::inout())
                .build()?,
            divmod: TaskBuilder::new(MODULE, "divmod")
                .param("a", ParamSpec::input())
                .param("b", ParamSpec::input())
                .returns(2)
                .build()?,
            counter_add: TaskBuilder::new(MODULE, "add")
                .instance_method("Counter")
                .param("n", ParamSpec::input())
                .build()?,
        })
    }

    /// Registry holding the bodies of every demo task
    pub fn registry(&self) -> Arc<TaskRegistry> {
        let registry = TaskRegistry::new();
        registry.insert(self.increment.clone(), |args: &[Obj]| {
            Ok(vec![Obj::new(int_arg(args, 0)? + 1)])
        });
        registry.insert(self.accumulate.clone(), |args: &[Obj]| {
            let a = list_head(args, 0)?;
            let b = list_head(args, 1)?;
            let sum = int_of(&a)? + int_of(&b)?;
            b.set(sum);
            Ok(Vec::new())
        });
        registry.insert(self.divmod.clone(), |args: &[Obj]| {
            let a = int_arg(args, 0)?;
            let b = int_arg(args, 1)?;
            if b == 0 {
                bail!("division by zero");
            }
            Ok(vec![Obj::new(a / b), Obj::new(a % b)])
        });
        registry.insert(self.counter_add.clone(), |args: &[Obj]| {
            let n = int_arg(args, 1)?;
            let target = args.first().context("missing target")?;
            let mut guard = target.write();
            let Value::Record(record) = &mut *guard else {
                bail!("target is not a Counter");
            };
            let value = record
                .field("value")
                .and_then(Obj::as_int)
                .unwrap_or_default();
            record.fields.insert("value".to_string(), Obj::new(value + n));
            Ok(Vec::new())
        });
        Arc::new(registry)
    }
}

fn int_of(obj: &Obj) -> anyhow::Result<i128> {
    obj.as_int()
        .ok_or_else(|| anyhow!("expected an integer, got {}", obj.read().type_name()))
}

fn int_arg(
    args: &[Obj],
    index: usize,
) -> anyhow::Result<i128> {
    let obj = args
        .get(index)
        .with_context(|| format!("missing argument {}", index))?;
    int_of(obj)
}

fn list_head(
    args: &[Obj],
    index: usize,
) -> anyhow::Result<Obj> {
    args.get(index)
        .and_then(|list| list.item(0))
        .with_context(|| format!("argument {} is not a non-empty list", index))
}

/// Run every demo scenario on a [`LocalRuntime`] and return the
/// synchronized values
pub fn run(config: BindingConfig) -> anyhow::Result<Vec<(&'static str, Value)>> {
    let tasks = DemoTasks::new()?;
    let runtime = LocalRuntime::from_config(&config, tasks.registry())?;
    let storage: Option<Arc<dyn StorageBackend>> = match &config.storage_conf {
        Some(conf) => Some(Arc::new(FileStorage::from_conf(conf)?)),
        None => None,
    };
    let mut binding = Binding::start(config, Box::new(runtime), storage)?;
    let mut results = Vec::new();

    let future = binding
        .call(&tasks.increment, CallArgs::new().arg(5))?
        .and_then(Returned::into_one)
        .context("increment returned no future")?;
    results.push(("increment(5)", binding.wait_on_one(&future)?.get()));

    let list = Obj::list([1]);
    binding.call(
        &tasks.accumulate,
        CallArgs::new().arg(list.clone()).arg(list.clone()),
    )?;
    results.push(("accumulate([1], [1])", binding.wait_on_one(&list)?.get()));

    let futures = binding
        .call(&tasks.divmod, CallArgs::new().arg(17).arg(5))?
        .map(Returned::into_vec)
        .unwrap_or_default();
    let resolved = binding.wait_on(&futures)?.into_vec();
    for (label, obj) in ["divmod(17, 5).0", "divmod(17, 5).1"].into_iter().zip(resolved) {
        results.push((label, obj.get()));
    }

    let counter = Obj::new(Record::new("Counter").with_field("value", 10));
    binding.call(&tasks.counter_add, CallArgs::new().target(counter.clone()).arg(5))?;
    results.push(("Counter(10).add(5)", binding.wait_on_one(&counter)?.get()));

    binding.barrier(true)?;
    binding.stop()?;
    info!("Demo finished with {} results", results.len());
    Ok(results)
}
