//! Deep size estimate of a value graph
//!
//! Follows nested handles and counts each allocation once, so shared or
//! cyclic structures do not inflate the total.

use super::{Obj, Value};
use std::collections::HashSet;
use std::mem::size_of;

/// Approximate number of bytes held by `obj` and everything it reaches
pub fn total_size(obj: &Obj) -> usize {
    let mut seen = HashSet::new();
    obj_size(obj, &mut seen)
}

fn obj_size(
    obj: &Obj,
    seen: &mut HashSet<usize>,
) -> usize {
    if !seen.insert(obj.addr()) {
        return 0;
    }
    size_of::<Obj>() + value_size(&obj.read(), seen)
}

fn value_size(
    value: &Value,
    seen: &mut HashSet<usize>,
) -> usize {
    let heap = match value {
        Value::Str(s) | Value::Opaque(s) => s.capacity(),
        Value::Bytes(b) => b.capacity(),
        Value::List(items) => items.iter().map(|item| obj_size(item, seen)).sum(),
        Value::Map(entries) => entries
            .iter()
            .map(|(key, item)| key.capacity() + obj_size(item, seen))
            .sum(),
        Value::Record(record) => {
            record.class.capacity()
                + record.storage_id.as_ref().map_or(0, String::capacity)
                + record
                    .fields
                    .iter()
                    .map(|(key, item)| key.capacity() + obj_size(item, seen))
                    .sum::<usize>()
        }
        _ => 0,
    };
    size_of::<Value>() + heap
}
