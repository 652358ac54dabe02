//! Shared fixtures: a binding over a [`LocalRuntime`] running the demo
//! tasks plus a few test-only ones.

use anyhow::{bail, Context};
use std::fs;
use std::sync::Arc;
use taskbind::demo::DemoTasks;
use taskbind::{
    Binding, BindingConfig, Direction, FileStorage, LocalRuntime, LocalStats, Obj, ParamSpec,
    Record, StorageBackend, TaskBuilder, TaskDescriptor, TaskRegistry, Value,
};
use tempfile::TempDir;

/// Tasks declared on top of the demo ones
pub struct Extra {
    /// Always fails; declares one return
    pub fail: TaskDescriptor,
    /// `sum(*values)`
    pub sum: TaskDescriptor,
    /// Writes `text` into the FILE_OUT parameter `path`
    pub write_text: TaskDescriptor,
    /// Returns a freshly persisted `Counter` with `value = start`
    pub make_counter: TaskDescriptor,
    /// Adds one to `value` of an IN_OUT counter
    pub bump: TaskDescriptor,
}

impl Extra {
    fn new() -> Self {
        Self {
            fail: TaskBuilder::new("tests", "fail").returns(1).build().unwrap(),
            sum: TaskBuilder::new("tests", "sum")
                .varargs("values")
                .returns(1)
                .build()
                .unwrap(),
            write_text: TaskBuilder::new("tests", "write_text")
                .param("path", ParamSpec::file(Direction::Out))
                .param("text", ParamSpec::input())
                .build()
                .unwrap(),
            make_counter: TaskBuilder::new("tests", "make_counter")
                .param("start", ParamSpec::input())
                .returns(1)
                .build()
                .unwrap(),
            bump: TaskBuilder::new("tests", "bump")
                .param("counter", ParamSpec::inout())
                .build()
                .unwrap(),
        }
    }

    fn install(
        &self,
        registry: &TaskRegistry,
        storage: Option<Arc<FileStorage>>,
    ) {
        registry.insert(self.fail.clone(), |_: &[Obj]| bail!("task exploded"));
        registry.insert(self.sum.clone(), |args: &[Obj]| {
            let total: i128 = args.iter().filter_map(Obj::as_int).sum();
            Ok(vec![Obj::new(total)])
        });
        registry.insert(self.write_text.clone(), |args: &[Obj]| {
            let path = args[0].as_str().context("path")?;
            let text = args[1].as_str().context("text")?;
            fs::write(path, text)?;
            Ok(Vec::new())
        });
        registry.insert(self.make_counter.clone(), move |args: &[Obj]| {
            let start = args[0].as_int().context("start")?;
            let counter = Obj::new(Record::new("Counter").with_field("value", start));
            let storage = storage.as_ref().context("no storage")?;
            storage.make_persistent(&counter)?;
            Ok(vec![counter])
        });
        registry.insert(self.bump.clone(), |args: &[Obj]| {
            let mut guard = args[0].write();
            let Value::Record(record) = &mut *guard else {
                bail!("not a record");
            };
            let value = counter_field(record).unwrap_or_default();
            record.fields.insert("value".to_string(), Obj::new(value + 1));
            Ok(Vec::new())
        });
    }
}

pub fn counter_field(record: &Record) -> Option<i128> {
    record.field("value").and_then(Obj::as_int)
}

/// `value` field of a counter object
pub fn counter_value(obj: &Obj) -> Option<i128> {
    match &*obj.read() {
        Value::Record(record) => counter_field(record),
        _ => None,
    }
}

pub struct Session {
    pub binding: Binding,
    pub stats: Arc<LocalStats>,
    pub tasks: DemoTasks,
    pub extra: Extra,
    pub storage: Option<Arc<FileStorage>>,
    pub dir: TempDir,
}

pub struct SessionBuilder {
    config: BindingConfig,
    runtime_storage: bool,
    binding_storage: bool,
}

impl SessionBuilder {
    pub fn config(
        mut self,
        f: impl FnOnce(BindingConfig) -> BindingConfig,
    ) -> Self {
        self.config = f(self.config);
        self
    }

    /// Persistence on both sides
    pub fn storage(mut self) -> Self {
        self.runtime_storage = true;
        self.binding_storage = true;
        self
    }

    /// Persistence on the worker side only
    pub fn worker_storage_only(mut self) -> Self {
        self.runtime_storage = true;
        self.binding_storage = false;
        self
    }

    pub fn start(self) -> Session {
        let dir = TempDir::new().unwrap();
        let config = self.config.with_temp_dir(dir.path().join("staging"));
        let storage = self
            .runtime_storage
            .then(|| Arc::new(FileStorage::new(dir.path().join("store")).unwrap()));

        let tasks = DemoTasks::new().unwrap();
        let registry = tasks.registry();
        let extra = Extra::new();
        extra.install(&registry, storage.clone());

        let mut runtime = LocalRuntime::from_config(&config, registry).unwrap();
        if let Some(storage) = &storage {
            runtime = runtime.with_storage(storage.clone(), None);
        }
        let stats = runtime.stats();

        let binding_storage: Option<Arc<dyn StorageBackend>> = if self.binding_storage {
            storage.clone().map(|s| s as Arc<dyn StorageBackend>)
        } else {
            None
        };
        let binding = Binding::start(config, Box::new(runtime), binding_storage).unwrap();
        Session {
            binding,
            stats,
            tasks,
            extra,
            storage,
            dir,
        }
    }
}

pub fn builder() -> SessionBuilder {
    SessionBuilder {
        config: BindingConfig::default(),
        runtime_storage: false,
        binding_storage: false,
    }
}

pub fn session() -> Session {
    builder().start()
}
