//! Parameters to wire values
//!
//! Rules applied per parameter, in order:
//!
//! 1. futures and pending objects travel as objects (unless typed FILE)
//! 2. scalars written by the task travel as objects
//! 3. integers wider than 32 bits become LONG, wider than 64 bits OBJECT
//! 4. small IN objects may be inlined as base64 strings
//! 5. objects are spilled and sent as FILE, persisted objects by id

use super::{Binding, ObjectId};
use crate::error::{MarshalError, Result};
use crate::task::{
    DataType, Direction, ParamValue, Parameter, EMPTY_STRING_KEY, JAVA_MAX_INT, JAVA_MAX_LONG,
    JAVA_MIN_INT, JAVA_MIN_LONG,
};
use crate::util::config::InlinePolicy;
use crate::value::serializer::serialize_to_string;
use crate::value::sizer::total_size;
use crate::value::{Obj, SerializeError, Value};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use std::path::PathBuf;
use tracing::debug;

impl Binding {
    /// Turn one live parameter into its wire form.
    ///
    /// `budget` is the number of bytes the rest of the call may still
    /// inline.
    pub(crate) fn marshal_parameter(
        &mut self,
        position: usize,
        mut param: Parameter,
        budget: &mut usize,
    ) -> Result<Parameter> {
        let obj = match &param.value {
            ParamValue::Live(obj) => obj.clone(),
            _ => return Ok(param),
        };

        let is_future = param.data_type != DataType::ExternalPersistent
            && (obj.is_future() || self.is_pending(&obj));
        if is_future && param.data_type != DataType::File {
            param.data_type = DataType::Object;
        }
        if param.data_type.is_scalar() && param.direction.writes() {
            param.data_type = DataType::Object;
        }
        if param.data_type == DataType::Int {
            param.data_type = integer_type(obj.as_int());
        }

        if self.config.object_conversion
            && !is_future
            && param.direction == Direction::In
            && matches!(param.data_type, DataType::Object | DataType::String)
        {
            if let Some(text) = self.try_inline(&obj, budget) {
                debug!("Inlining parameter {} ({} bytes left)", param.name, budget);
                param.data_type = DataType::String;
                param.value = ParamValue::Inline(BASE64.encode(text));
                return Ok(param);
            }
        }

        let data_type = param.data_type;
        param.value = match data_type {
            DataType::Object => {
                self.synchronize_elements(&obj)?;
                let path = self
                    .turn_into_file(&obj, param.direction)
                    .map_err(|e| not_serializable(&param, position, e))?;
                param.data_type = DataType::File;
                ParamValue::File(path)
            }
            DataType::ExternalPersistent => {
                let id = obj.persistent_id().ok_or_else(|| MarshalError::NotSerializable {
                    name: param.name.clone(),
                    position,
                    reason: "persistent object lost its id".to_string(),
                })?;
                ParamValue::Persistent(self.manage_persistent_object(&obj, id))
            }
            DataType::File => {
                let path = obj.as_str().ok_or_else(|| MarshalError::NotSerializable {
                    name: param.name.clone(),
                    position,
                    reason: format!("file parameter holds a {}", obj.read().type_name()),
                })?;
                ParamValue::File(PathBuf::from(path))
            }
            DataType::String => {
                let text = obj.as_str().unwrap_or_default();
                let text = if text.is_empty() {
                    EMPTY_STRING_KEY.to_string()
                } else {
                    text
                };
                ParamValue::Inline(BASE64.encode(text))
            }
            DataType::Boolean
            | DataType::Char
            | DataType::Int
            | DataType::Long
            | DataType::Double => ParamValue::Inline(scalar_text(&obj.read())),
        };
        Ok(param)
    }

    /// Serialized text of `obj` when it fits in the remaining budget.
    /// The measured size is taken from the budget either way.
    fn try_inline(
        &self,
        obj: &Obj,
        budget: &mut usize,
    ) -> Option<String> {
        match self.config.inline_policy {
            InlinePolicy::ObjectSize => {
                if !matches!(*obj.read(), Value::List(_) | Value::Map(_) | Value::Record(_)) {
                    return None;
                }
                let size = total_size(obj);
                let fits = size < *budget;
                *budget = budget.saturating_sub(size);
                if fits {
                    serialize_to_string(obj).ok()
                } else {
                    None
                }
            }
            InlinePolicy::SerializedSize => {
                if matches!(*obj.read(), Value::Str(_)) {
                    return None;
                }
                let text = serialize_to_string(obj).ok()?;
                let fits = text.len() < *budget;
                *budget = budget.saturating_sub(text.len());
                fits.then_some(text)
            }
        }
    }

    /// Resolve pending elements of a list parameter before it is spilled
    fn synchronize_elements(
        &mut self,
        obj: &Obj,
    ) -> Result<()> {
        if self.is_pending(obj) {
            return Ok(());
        }
        let Some(items) = obj.as_list() else {
            return Ok(());
        };
        let mut changed = false;
        for item in &items {
            if self.is_pending(item) {
                self.synchronize(item, Direction::In)?;
                changed = true;
            }
        }
        if changed {
            // The list now holds values produced here; refresh its file
            if let Some(id) = self.identity.lookup(obj) {
                self.mark_written_by_main(id);
            }
        }
        Ok(())
    }

    fn mark_written_by_main(
        &mut self,
        id: ObjectId,
    ) {
        if let Some(path) = self.files.get(&id).cloned() {
            self.written_by_main.insert(id, path);
        }
    }
}

/// Narrowest integer type able to carry `value`
fn integer_type(value: Option<i128>) -> DataType {
    match value {
        Some(v) if (JAVA_MIN_INT..=JAVA_MAX_INT).contains(&v) => DataType::Int,
        Some(v) if (JAVA_MIN_LONG..=JAVA_MAX_LONG).contains(&v) => DataType::Long,
        Some(_) => DataType::Object,
        None => DataType::Int,
    }
}

fn scalar_text(value: &Value) -> String {
    match value {
        Value::Bool(true) => "true".to_string(),
        Value::Bool(false) => "false".to_string(),
        Value::Char(c) => c.to_string(),
        Value::Str(s) => s.clone(),
        Value::Int(v) => v.to_string(),
        Value::Float(v) => v.to_string(),
        other => format!("{:?}", other),
    }
}

fn not_serializable(
    param: &Parameter,
    position: usize,
    error: SerializeError,
) -> crate::error::BindingError {
    match error {
        SerializeError::NotSerializable(reason) => MarshalError::NotSerializable {
            name: param.name.clone(),
            position,
            reason,
        }
        .into(),
        other => other.into(),
    }
}

