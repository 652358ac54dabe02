//! Executing side of a task call
//!
//! Rebuilds the arguments of one task from the worker parameter stream,
//! calls the body and writes every value the runtime expects back: written
//! hidden objects, declared returns and (for modifiers) the target.

use crate::storage::StorageBackend;
use crate::task::{DataType, Direction, EMPTY_STRING_KEY};
use crate::value::serializer::{
    deserialize_from_file, deserialize_from_string, serialize_objects,
};
use crate::value::{Obj, Value};
use crate::worker::{RegisteredTask, WireParam, WorkerError, WorkerInvocation};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use std::path::PathBuf;
use tracing::debug;

/// Value reported for parameters that carry nothing back
const NULL: &str = "null";

/// Types and values the worker reports back to the runtime, one entry per
/// wire parameter
#[derive(Debug, Clone, PartialEq)]
pub struct TaskOutcome {
    pub types: Vec<DataType>,
    pub values: Vec<String>,
}

impl TaskOutcome {
    /// Ids of values reported as persisted, with their parameter index
    pub fn persisted(&self) -> impl Iterator<Item = (usize, &str)> {
        self.types
            .iter()
            .zip(&self.values)
            .enumerate()
            .filter(|(_, (t, _))| **t == DataType::ExternalPersistent)
            .map(|(i, (_, v))| (i, v.as_str()))
    }
}

/// Role of a wire parameter on the worker side
#[derive(Debug)]
enum Slot {
    /// Passed by value or as a plain path
    Plain,
    /// Object staged in a file by the submitting side
    Hidden { path: PathBuf, writes: bool },
    /// Object owned by the persistence layer
    Persistent { writes: bool },
    /// Declared return written to `path`
    Return { path: PathBuf },
}

/// Run `task` with the parameters of `invocation`
pub fn execute(
    task: &RegisteredTask,
    invocation: &WorkerInvocation,
    storage: Option<&dyn StorageBackend>,
    args_as_tuple: bool,
) -> Result<TaskOutcome, WorkerError> {
    let descriptor = &task.descriptor;
    let total = invocation.params.len();
    let num_returns = descriptor.num_returns();
    let num_targets = usize::from(invocation.has_target);
    let args_end = total
        .checked_sub(num_returns + num_targets)
        .ok_or_else(|| {
            WorkerError::Malformed(format!(
                "{} parameters cannot hold {} returns and {} targets",
                total, num_returns, num_targets
            ))
        })?;

    let mut slots = Vec::with_capacity(total);
    let mut values: Vec<Obj> = Vec::with_capacity(total);

    for (index, wire) in invocation.params[..args_end].iter().enumerate() {
        let declared = descriptor.params.get_index(index).map(|(_, spec)| spec);
        let declared_file = declared.is_some_and(|spec| spec.data_type == Some(DataType::File));
        let direction = declared.map(|spec| spec.direction).unwrap_or_default();
        let (obj, slot) = reveal(index, wire, declared_file, direction, storage)?;
        values.push(obj);
        slots.push(slot);
    }
    for wire in &invocation.params[args_end..args_end + num_returns] {
        slots.push(Slot::Return {
            path: PathBuf::from(nio_path(&wire.value)),
        });
    }
    let target = if invocation.has_target {
        let index = total - 1;
        let direction = if descriptor.modifier {
            Direction::InOut
        } else {
            Direction::In
        };
        debug!("Rebuilding target from parameter {}", index);
        let (obj, slot) = reveal(index, &invocation.params[index], false, direction, storage)?;
        slots.push(slot);
        Some(obj)
    } else {
        None
    };

    let mut args = Vec::with_capacity(values.len() + 1);
    args.extend(target.clone());
    let declared = descriptor.params.len();
    for (index, obj) in values.iter().enumerate() {
        let is_varargs = descriptor.varargs.is_some() && index == declared;
        match obj.as_list() {
            Some(items) if args_as_tuple && is_varargs => args.extend(items),
            _ => args.push(obj.clone()),
        }
    }

    let results = (task.body)(&args).map_err(|e| WorkerError::TaskFailed {
        signature: descriptor.signature().to_string(),
        message: format!("{:#}", e),
    })?;
    if results.len() != num_returns {
        return Err(WorkerError::ReturnMismatch {
            expected: num_returns,
            got: results.len(),
        });
    }

    let mut outputs = values;
    outputs.extend(results);
    outputs.extend(target);

    for (slot, obj) in slots.iter().zip(&outputs) {
        if let Slot::Persistent { writes: true } = slot {
            let storage = storage
                .ok_or_else(|| WorkerError::StorageDisabled(obj.persistent_id().unwrap_or_default()))?;
            storage.make_persistent(obj)?;
        }
    }

    let mut types = Vec::with_capacity(total);
    let mut reported = Vec::with_capacity(total);
    let mut to_serialize = Vec::new();
    for ((slot, obj), wire) in slots.iter().zip(&outputs).zip(&invocation.params) {
        let persisted = obj.persistent_id();
        match (slot, persisted) {
            (Slot::Persistent { .. }, Some(id)) => {
                types.push(DataType::ExternalPersistent);
                reported.push(id);
            }
            (Slot::Hidden { .. } | Slot::Return { .. }, Some(id)) => {
                // Became persistent inside the task: travels back by id
                debug!("Object made persistent inside the task: {}", id);
                types.push(DataType::ExternalPersistent);
                reported.push(id);
            }
            (Slot::Hidden { path, writes: true }, None) => {
                to_serialize.push((obj.clone(), path.clone()));
                types.push(wire.data_type);
                reported.push(NULL.to_string());
            }
            (Slot::Return { path }, None) => {
                to_serialize.push((obj.clone(), path.clone()));
                types.push(wire.data_type);
                reported.push(NULL.to_string());
            }
            _ => {
                types.push(wire.data_type);
                reported.push(NULL.to_string());
            }
        }
    }

    serialize_objects(&to_serialize)?;
    debug!("Serialized {} objects back", to_serialize.len());
    Ok(TaskOutcome {
        types,
        values: reported,
    })
}

/// Rebuild one argument from its wire form
fn reveal(
    index: usize,
    wire: &WireParam,
    declared_file: bool,
    direction: Direction,
    storage: Option<&dyn StorageBackend>,
) -> Result<(Obj, Slot), WorkerError> {
    let invalid = |expected: &'static str| WorkerError::InvalidValue {
        index,
        value: wire.value.clone(),
        expected,
    };
    let value = match wire.data_type {
        DataType::File => {
            let path = nio_path(&wire.value);
            if declared_file {
                return Ok((Obj::new(path), Slot::Plain));
            }
            debug!("Processing a hidden object in parameter {}", index);
            let obj = deserialize_from_file(&PathBuf::from(path))?;
            return Ok((
                obj,
                Slot::Hidden {
                    path: PathBuf::from(path),
                    writes: direction.writes(),
                },
            ));
        }
        DataType::ExternalPersistent => {
            let storage = storage.ok_or_else(|| WorkerError::StorageDisabled(wire.value.clone()))?;
            let obj = storage.get_by_id(&wire.value)?;
            let writes = wire.mode.as_deref().is_some_and(|mode| mode.contains('W'));
            return Ok((obj, Slot::Persistent { writes }));
        }
        DataType::String => {
            let bytes = BASE64
                .decode(wire.value.as_bytes())
                .map_err(|_| invalid("base64 text"))?;
            let text = String::from_utf8(bytes).map_err(|_| invalid("UTF-8 text"))?;
            if text == EMPTY_STRING_KEY {
                return Ok((Obj::new(""), Slot::Plain));
            }
            match deserialize_from_string(&text) {
                Ok(obj) => return Ok((obj, Slot::Plain)),
                Err(_) => Value::Str(text),
            }
        }
        DataType::Char => {
            let mut chars = wire.value.chars();
            match (chars.next(), chars.next()) {
                (Some(c), None) => Value::Char(c),
                _ => return Err(invalid("a single character")),
            }
        }
        DataType::Int | DataType::Long => {
            Value::Int(wire.value.parse().map_err(|_| invalid("an integer"))?)
        }
        DataType::Double => Value::Float(wire.value.parse().map_err(|_| invalid("a float"))?),
        DataType::Boolean => Value::Bool(wire.value == "true"),
        DataType::Object => {
            return Err(WorkerError::InvalidType {
                code: DataType::Object.code().to_string(),
                index,
            })
        }
    };
    Ok((Obj::new(value), Slot::Plain))
}

/// Path of a file value; the runtime may send `orig:dest:preserve:write:path`
pub fn nio_path(value: &str) -> &str {
    let parts: Vec<&str> = value.splitn(5, ':').collect();
    match parts.as_slice() {
        [_, _, _, _, path] => *path,
        _ => value,
    }
}
