//! Parameter model
//!
//! One task argument as the external runtime sees it: semantic type,
//! direction, stream binding, command-line prefix and the value itself.

use crate::value::{Obj, Value};
use std::fmt;
use std::path::PathBuf;

/// Prefix sent when a parameter declares none
pub const DEFAULT_PREFIX: &str = "null";

/// Prefix of return-value parameters
pub const RETURN_PREFIX: &str = "#";

/// Wire stand-in for the empty string
pub const EMPTY_STRING_KEY: &str = "3mPtY57r1Ng";

/// Bounds of the runtime's 32-bit integer type
pub const JAVA_MIN_INT: i128 = i32::MIN as i128;
pub const JAVA_MAX_INT: i128 = i32::MAX as i128;

/// Bounds of the runtime's 64-bit integer type
pub const JAVA_MIN_LONG: i128 = i64::MIN as i128;
pub const JAVA_MAX_LONG: i128 = i64::MAX as i128;

/// Semantic type of a parameter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DataType {
    Boolean,
    Char,
    Int,
    Long,
    Double,
    String,
    File,
    Object,
    ExternalPersistent,
}

impl DataType {
    /// Numeric code used on the wire
    pub fn code(self) -> u8 {
        match self {
            DataType::Boolean => 0,
            DataType::Char => 1,
            DataType::Int => 4,
            DataType::Long => 5,
            DataType::Double => 7,
            DataType::String => 8,
            DataType::File => 9,
            DataType::Object => 10,
            DataType::ExternalPersistent => 12,
        }
    }

    /// Inverse of [`DataType::code`]
    pub fn from_code(code: u8) -> Option<Self> {
        Some(match code {
            0 => DataType::Boolean,
            1 => DataType::Char,
            4 => DataType::Int,
            5 => DataType::Long,
            7 => DataType::Double,
            8 => DataType::String,
            9 => DataType::File,
            10 => DataType::Object,
            12 => DataType::ExternalPersistent,
            _ => return None,
        })
    }

    /// Scalar types travel by value on the command line
    #[inline]
    pub fn is_scalar(self) -> bool {
        matches!(
            self,
            DataType::Boolean
                | DataType::Char
                | DataType::Int
                | DataType::Long
                | DataType::Double
                | DataType::String
        )
    }

    /// Classify a live value.
    ///
    /// Rules are evaluated in order; the first match wins. Integer width is
    /// refined later by the marshaller.
    pub fn infer(value: &Value) -> Self {
        match value {
            Value::Bool(_) => DataType::Boolean,
            Value::Char(_) => DataType::Char,
            Value::Str(s) if s.chars().count() == 1 => DataType::Char,
            Value::Str(_) => DataType::String,
            Value::Int(_) => DataType::Int,
            Value::Float(_) => DataType::Double,
            Value::Record(record) if record.is_persistent() => DataType::ExternalPersistent,
            _ => DataType::Object,
        }
    }
}

impl fmt::Display for DataType {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        let name = match self {
            DataType::Boolean => "BOOLEAN",
            DataType::Char => "CHAR",
            DataType::Int => "INT",
            DataType::Long => "LONG",
            DataType::Double => "DOUBLE",
            DataType::String => "STRING",
            DataType::File => "FILE",
            DataType::Object => "OBJECT",
            DataType::ExternalPersistent => "EXTERNAL_PSCO",
        };
        write!(f, "{}", name)
    }
}

/// Access direction of a parameter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Direction {
    #[default]
    In,
    Out,
    InOut,
}

impl Direction {
    pub fn code(self) -> u8 {
        match self {
            Direction::In => 0,
            Direction::Out => 1,
            Direction::InOut => 2,
        }
    }

    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(Direction::In),
            1 => Some(Direction::Out),
            2 => Some(Direction::InOut),
            _ => None,
        }
    }

    /// Map a file open mode to a direction: `w` writes, `r+` and `a`
    /// read and write, everything else only reads.
    pub fn from_mode(mode: &str) -> Self {
        let mode = mode.to_ascii_lowercase();
        if mode.starts_with('w') {
            Direction::Out
        } else if mode == "r+" || mode.starts_with('a') {
            Direction::InOut
        } else {
            Direction::In
        }
    }

    /// Whether the task may write the value back
    #[inline]
    pub fn writes(self) -> bool {
        !matches!(self, Direction::In)
    }
}

/// Standard stream a parameter is bound to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Stream {
    Stdin,
    Stdout,
    Stderr,
    #[default]
    Unspecified,
}

impl Stream {
    pub fn code(self) -> u8 {
        match self {
            Stream::Stdin => 0,
            Stream::Stdout => 1,
            Stream::Stderr => 2,
            Stream::Unspecified => 3,
        }
    }

    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(Stream::Stdin),
            1 => Some(Stream::Stdout),
            2 => Some(Stream::Stderr),
            3 => Some(Stream::Unspecified),
            _ => None,
        }
    }
}

/// Declared template of a task parameter.
///
/// Every field is optional in spirit: an absent type is inferred from the
/// value at call time, and the default direction is IN.
#[derive(Debug, Clone, Default)]
pub struct ParamSpec {
    pub data_type: Option<DataType>,
    pub direction: Direction,
    pub stream: Stream,
    pub prefix: Option<String>,
    pub default: Option<Obj>,
}

impl ParamSpec {
    pub fn new() -> Self {
        Self::default()
    }

    /// Read-only parameter
    pub fn input() -> Self {
        Self::default()
    }

    /// Write-only parameter
    pub fn output() -> Self {
        Self::default().direction(Direction::Out)
    }

    /// Read-write parameter
    pub fn inout() -> Self {
        Self::default().direction(Direction::InOut)
    }

    /// File parameter with the given direction
    pub fn file(direction: Direction) -> Self {
        Self::default().typed(DataType::File).direction(direction)
    }

    pub fn typed(
        mut self,
        data_type: DataType,
    ) -> Self {
        self.data_type = Some(data_type);
        self
    }

    pub fn direction(
        mut self,
        direction: Direction,
    ) -> Self {
        self.direction = direction;
        self
    }

    pub fn stream(
        mut self,
        stream: Stream,
    ) -> Self {
        self.stream = stream;
        self
    }

    pub fn prefix(
        mut self,
        prefix: impl Into<String>,
    ) -> Self {
        self.prefix = Some(prefix.into());
        self
    }

    /// Value used when the caller does not supply the argument
    pub fn default_value(
        mut self,
        value: impl Into<Obj>,
    ) -> Self {
        self.default = Some(value.into());
        self
    }
}

/// What a parameter carries once marshalled
#[derive(Debug, Clone)]
pub enum ParamValue {
    /// Live object still owned by the caller
    Live(Obj),
    /// Path of a staged file
    File(PathBuf),
    /// Wire-ready textual form of a scalar (or inlined object)
    Inline(String),
    /// Identifier of a persisted object
    Persistent(String),
}

impl ParamValue {
    /// Textual form sent to the runtime
    pub fn wire(&self) -> String {
        match self {
            ParamValue::Live(obj) => format!("{:?}", obj),
            ParamValue::File(path) => path.display().to_string(),
            ParamValue::Inline(text) | ParamValue::Persistent(text) => text.clone(),
        }
    }
}

/// A task argument ready for (or on its way to) submission
#[derive(Debug, Clone)]
pub struct Parameter {
    /// Name of the formal parameter
    pub name: String,
    pub data_type: DataType,
    pub direction: Direction,
    pub stream: Stream,
    pub prefix: String,
    pub value: ParamValue,
}

impl Parameter {
    /// Build a parameter from its template and live value.
    ///
    /// A declared FILE type is kept as is; any other type follows the value,
    /// since the same task may be called with values of different kinds.
    pub fn from_spec(
        name: impl Into<String>,
        spec: &ParamSpec,
        value: Obj,
    ) -> Self {
        let data_type = match spec.data_type {
            Some(DataType::File) => DataType::File,
            _ => DataType::infer(&value.read()),
        };
        Self {
            name: name.into(),
            data_type,
            direction: spec.direction,
            stream: spec.stream,
            prefix: spec
                .prefix
                .clone()
                .unwrap_or_else(|| DEFAULT_PREFIX.to_string()),
            value: ParamValue::Live(value),
        }
    }

    /// Read-only parameter of inferred type
    pub fn input(
        name: impl Into<String>,
        value: Obj,
    ) -> Self {
        Self::from_spec(name, &ParamSpec::input(), value)
    }

    /// The live object, if not yet turned into wire form
    pub fn live(&self) -> Option<&Obj> {
        match &self.value {
            ParamValue::Live(obj) => Some(obj),
            _ => None,
        }
    }
}
