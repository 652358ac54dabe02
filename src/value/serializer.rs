//! Object codec
//!
//! Spilled files and inlined arguments share one format: a JSON envelope
//! carrying a format number and the value. A plain string never parses as
//! an envelope, which is what lets the worker tell inlined objects apart
//! from ordinary string arguments.

use super::{Obj, Value};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;

/// Current envelope format
pub const FORMAT_VERSION: u32 = 1;

#[derive(Serialize)]
struct EnvelopeRef<'a> {
    format: u32,
    value: &'a Obj,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct Envelope {
    format: u32,
    value: Value,
}

/// Codec errors
#[derive(Debug, Error)]
pub enum SerializeError {
    /// The value holds something that cannot leave the process
    #[error("object is not serializable: {0}")]
    NotSerializable(String),

    /// Reading or writing the backing file failed
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The payload is not a serialized object
    #[error("malformed serialized object: {0}")]
    Malformed(String),

    /// The payload was produced by an incompatible codec
    #[error("unsupported serialization format {0}")]
    UnsupportedFormat(u32),
}

/// Serialize the object behind `obj` into a string
pub fn serialize_to_string(obj: &Obj) -> Result<String, SerializeError> {
    serde_json::to_string(&EnvelopeRef {
        format: FORMAT_VERSION,
        value: obj,
    })
    .map_err(|e| SerializeError::NotSerializable(e.to_string()))
}

/// Rebuild an object from a string produced by [`serialize_to_string`]
pub fn deserialize_from_string(data: &str) -> Result<Obj, SerializeError> {
    let envelope: Envelope =
        serde_json::from_str(data).map_err(|e| SerializeError::Malformed(e.to_string()))?;
    if envelope.format != FORMAT_VERSION {
        return Err(SerializeError::UnsupportedFormat(envelope.format));
    }
    Ok(Obj::new(envelope.value))
}

/// Serialize `obj` into the file at `path`, replacing any previous content
pub fn serialize_to_file(
    obj: &Obj,
    path: &Path,
) -> Result<(), SerializeError> {
    let data = serialize_to_string(obj)?;
    fs::write(path, data).map_err(|source| SerializeError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    debug!("Serialized object to {}", path.display());
    Ok(())
}

/// Rebuild an object from the file at `path`
pub fn deserialize_from_file(path: &Path) -> Result<Obj, SerializeError> {
    let data = fs::read_to_string(path).map_err(|source| SerializeError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    deserialize_from_string(&data)
}

/// Serialize a batch of `(object, path)` pairs
pub fn serialize_objects(objects: &[(Obj, PathBuf)]) -> Result<(), SerializeError> {
    for (obj, path) in objects {
        serialize_to_file(obj, path)?;
    }
    Ok(())
}
