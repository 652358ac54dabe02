//! Value model for task arguments and results
//!
//! [`Value`] is the closed set of shapes a task argument can take. [`Obj`] is
//! the shared handle the binding tracks across task calls: cloning an `Obj`
//! shares identity the same way a reference does, while `==` compares the
//! values behind the handles.
//!
//! # Architecture
//!
//! - [`Value`] - tagged variant over the primitive categories the marshaller
//!   classifies (boolean, character, string, integer, floating point,
//!   container/record objects, persisted records, opaque resources)
//! - [`Obj`] - `Arc<RwLock<Value>>` handle with reference identity
//! - [`ValueKind`] - declared shape of a task return, used to mint futures
//! - [`serializer`] - codec used for spilled files and inlined arguments
//! - [`sizer`] - deep size estimate for the object-size inlining policy

pub mod serializer;
pub mod sizer;

use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use serde::ser::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::cell::RefCell;
use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::sync::Arc;
use std::thread::LocalKey;

pub use serializer::SerializeError;

/// Instance of a user-defined class.
///
/// A record with a `storage_id` is owned by the external persistence layer
/// and travels by id instead of by file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    /// Class name
    pub class: String,
    /// Identifier assigned by the persistence layer, if persisted
    #[serde(default)]
    pub storage_id: Option<String>,
    /// Field values
    #[serde(default)]
    pub fields: BTreeMap<String, Obj>,
}

impl Record {
    /// Create an empty record of the given class
    pub fn new(class: impl Into<String>) -> Self {
        Self {
            class: class.into(),
            storage_id: None,
            fields: BTreeMap::new(),
        }
    }

    /// Add a field (builder style)
    pub fn with_field(
        mut self,
        name: impl Into<String>,
        value: impl Into<Obj>,
    ) -> Self {
        self.fields.insert(name.into(), value.into());
        self
    }

    /// Get a field handle
    pub fn field(
        &self,
        name: &str,
    ) -> Option<&Obj> {
        self.fields.get(name)
    }

    /// Whether the persistence layer owns this record
    #[inline]
    pub fn is_persistent(&self) -> bool {
        self.storage_id.is_some()
    }
}

/// Runtime value of a task argument or result
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub enum Value {
    /// Absent value
    #[default]
    None,
    /// Boolean
    Bool(bool),
    /// Single character
    Char(char),
    /// UTF-8 string
    Str(String),
    /// Integer, wide enough to represent values beyond 64 bits
    Int(i128),
    /// Double precision float; non-finite values are encoded by name
    Float(#[serde(with = "float_repr")] f64),
    /// Raw bytes
    Bytes(Vec<u8>),
    /// Sequence of object handles
    List(Vec<Obj>),
    /// String-keyed mapping
    Map(BTreeMap<String, Obj>),
    /// User-defined class instance
    Record(Record),
    /// Generic future marker (no payload besides the handle identity)
    Future,
    /// Marker returned by tasks that have nothing to report
    Empty,
    /// Live resource that cannot leave the process (function, open handle)
    #[serde(serialize_with = "refuse_opaque", skip_deserializing)]
    Opaque(String),
}

fn refuse_opaque<S: Serializer>(
    what: &String,
    _serializer: S,
) -> Result<S::Ok, S::Error> {
    Err(S::Error::custom(format!("cannot serialize opaque value `{}`", what)))
}

/// JSON numbers cannot hold `NaN` or infinities, so those travel as the
/// strings `"NaN"`, `"inf"` and `"-inf"`
mod float_repr {
    use serde::de::{self, Visitor};
    use serde::{Deserializer, Serializer};
    use std::fmt;

    pub fn serialize<S: Serializer>(
        value: &f64,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        if value.is_finite() {
            serializer.serialize_f64(*value)
        } else if value.is_nan() {
            serializer.serialize_str("NaN")
        } else if *value > 0.0 {
            serializer.serialize_str("inf")
        } else {
            serializer.serialize_str("-inf")
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<f64, D::Error> {
        deserializer.deserialize_any(FloatVisitor)
    }

    struct FloatVisitor;

    impl<'de> Visitor<'de> for FloatVisitor {
        type Value = f64;

        fn expecting(
            &self,
            f: &mut fmt::Formatter<'_>,
        ) -> fmt::Result {
            f.write_str("a number or one of \"NaN\", \"inf\", \"-inf\"")
        }

        fn visit_f64<E: de::Error>(
            self,
            v: f64,
        ) -> Result<f64, E> {
            Ok(v)
        }

        fn visit_i64<E: de::Error>(
            self,
            v: i64,
        ) -> Result<f64, E> {
            Ok(v as f64)
        }

        fn visit_u64<E: de::Error>(
            self,
            v: u64,
        ) -> Result<f64, E> {
            Ok(v as f64)
        }

        fn visit_str<E: de::Error>(
            self,
            v: &str,
        ) -> Result<f64, E> {
            match v {
                "NaN" => Ok(f64::NAN),
                "inf" => Ok(f64::INFINITY),
                "-inf" => Ok(f64::NEG_INFINITY),
                _ => Err(E::invalid_value(de::Unexpected::Str(v), &self)),
            }
        }
    }
}

impl Value {
    /// Short name of the variant, used in log lines and errors
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::None => "none",
            Value::Bool(_) => "bool",
            Value::Char(_) => "char",
            Value::Str(_) => "str",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::Bytes(_) => "bytes",
            Value::List(_) => "list",
            Value::Map(_) => "map",
            Value::Record(_) => "record",
            Value::Future => "future",
            Value::Empty => "empty",
            Value::Opaque(_) => "opaque",
        }
    }

    /// Build a list value from anything convertible to handles
    pub fn list<I, T>(items: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<Obj>,
    {
        Value::List(items.into_iter().map(Into::into).collect())
    }

    /// Whether this is a sequence container
    #[inline]
    pub fn is_sequence(&self) -> bool {
        matches!(self, Value::List(_))
    }

    /// Identifier given by the persistence layer, if any
    pub fn persistent_id(&self) -> Option<&str> {
        match self {
            Value::Record(record) => record.storage_id.as_deref(),
            _ => None,
        }
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<char> for Value {
    fn from(v: char) -> Self {
        Value::Char(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Str(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Str(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Int(v as i128)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v as i128)
    }
}

impl From<i128> for Value {
    fn from(v: i128) -> Self {
        Value::Int(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<Vec<u8>> for Value {
    fn from(v: Vec<u8>) -> Self {
        Value::Bytes(v)
    }
}

impl From<Record> for Value {
    fn from(v: Record) -> Self {
        Value::Record(v)
    }
}

/// Declared shape of a task return value.
///
/// Used to mint a best-effort typed placeholder: containers and records get
/// an empty instance, everything else the generic [`Value::Future`] marker.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ValueKind {
    /// Unknown shape
    #[default]
    Any,
    Bool,
    Char,
    Str,
    Int,
    Float,
    Bytes,
    List,
    Map,
    /// Instance of the named class
    Record(String),
}

impl ValueKind {
    /// Placeholder value for a future of this kind
    pub fn placeholder(&self) -> Value {
        match self {
            ValueKind::List => Value::List(Vec::new()),
            ValueKind::Map => Value::Map(BTreeMap::new()),
            ValueKind::Record(class) => Value::Record(Record::new(class.clone())),
            _ => Value::Future,
        }
    }
}

/// Shared, identity-bearing handle to a [`Value`].
///
/// Identity is the allocation: two handles are the *same object* only when
/// [`Obj::ptr_eq`] holds, regardless of the values they hold.
#[derive(Clone, Default)]
pub struct Obj(Arc<RwLock<Value>>);

impl Obj {
    /// Wrap a value in a fresh handle
    pub fn new(value: impl Into<Value>) -> Self {
        Obj(Arc::new(RwLock::new(value.into())))
    }

    /// Fresh generic future marker
    pub fn future() -> Self {
        Obj::new(Value::Future)
    }

    /// Fresh empty-return marker
    pub fn empty() -> Self {
        Obj::new(Value::Empty)
    }

    /// Fresh list handle
    pub fn list<I, T>(items: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<Obj>,
    {
        Obj::new(Value::list(items))
    }

    /// Borrow the value for reading
    #[inline]
    pub fn read(&self) -> RwLockReadGuard<'_, Value> {
        self.0.read()
    }

    /// Borrow the value for writing
    #[inline]
    pub fn write(&self) -> RwLockWriteGuard<'_, Value> {
        self.0.write()
    }

    /// Clone the value out of the handle (shallow: nested handles are shared)
    pub fn get(&self) -> Value {
        self.read().clone()
    }

    /// Replace the value behind the handle
    pub fn set(
        &self,
        value: impl Into<Value>,
    ) {
        *self.write() = value.into();
    }

    /// Reference equality
    #[inline]
    pub fn ptr_eq(
        &self,
        other: &Obj,
    ) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    /// Address of the allocation, stable while any handle is alive
    #[inline]
    pub(crate) fn addr(&self) -> usize {
        Arc::as_ptr(&self.0) as *const () as usize
    }

    /// Whether this handle holds the generic future marker
    pub fn is_future(&self) -> bool {
        matches!(*self.read(), Value::Future)
    }

    /// Whether this handle holds the empty-return marker
    pub fn is_empty_marker(&self) -> bool {
        matches!(*self.read(), Value::Empty)
    }

    /// Identifier given by the persistence layer, if any
    pub fn persistent_id(&self) -> Option<String> {
        self.read().persistent_id().map(str::to_string)
    }

    /// Integer content, if any
    pub fn as_int(&self) -> Option<i128> {
        match *self.read() {
            Value::Int(v) => Some(v),
            _ => None,
        }
    }

    /// Float content, if any
    pub fn as_float(&self) -> Option<f64> {
        match *self.read() {
            Value::Float(v) => Some(v),
            _ => None,
        }
    }

    /// String content, if any
    pub fn as_str(&self) -> Option<String> {
        match &*self.read() {
            Value::Str(s) => Some(s.clone()),
            _ => None,
        }
    }

    /// Element handles, if this is a list
    pub fn as_list(&self) -> Option<Vec<Obj>> {
        match &*self.read() {
            Value::List(items) => Some(items.clone()),
            _ => None,
        }
    }

    /// Element handle at `index`, if this is a list
    pub fn item(
        &self,
        index: usize,
    ) -> Option<Obj> {
        match &*self.read() {
            Value::List(items) => items.get(index).cloned(),
            _ => None,
        }
    }
}

impl PartialEq for Obj {
    fn eq(
        &self,
        other: &Self,
    ) -> bool {
        self.ptr_eq(other) || *self.read() == *other.read()
    }
}

type VisitSet = LocalKey<RefCell<HashSet<usize>>>;

thread_local! {
    static FORMATTING: RefCell<HashSet<usize>> = RefCell::new(HashSet::new());
    static SERIALIZING: RefCell<HashSet<usize>> = RefCell::new(HashSet::new());
}

/// A handle currently being walked on this thread; released on drop
struct Visit {
    set: &'static VisitSet,
    addr: usize,
}

impl Visit {
    /// `None` when the handle is already on the walk, i.e. it contains itself
    fn enter(
        set: &'static VisitSet,
        obj: &Obj,
    ) -> Option<Self> {
        let addr = obj.addr();
        if set.with(|seen| seen.borrow_mut().insert(addr)) {
            Some(Self { set, addr })
        } else {
            None
        }
    }
}

impl Drop for Visit {
    fn drop(&mut self) {
        self.set.with(|seen| {
            seen.borrow_mut().remove(&self.addr);
        });
    }
}

impl fmt::Debug for Obj {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        let Some(_visit) = Visit::enter(&FORMATTING, self) else {
            return f.write_str("[...]");
        };
        write!(f, "{:?}", *self.read())
    }
}

impl Serialize for Obj {
    fn serialize<S: Serializer>(
        &self,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        let Some(_visit) = Visit::enter(&SERIALIZING, self) else {
            return Err(S::Error::custom("value contains itself"));
        };
        self.read().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Obj {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Value::deserialize(deserializer).map(Obj::new)
    }
}

impl From<Value> for Obj {
    fn from(v: Value) -> Self {
        Obj::new(v)
    }
}

impl From<Record> for Obj {
    fn from(v: Record) -> Self {
        Obj::new(v)
    }
}

impl From<bool> for Obj {
    fn from(v: bool) -> Self {
        Obj::new(v)
    }
}

impl From<char> for Obj {
    fn from(v: char) -> Self {
        Obj::new(v)
    }
}

impl From<&str> for Obj {
    fn from(v: &str) -> Self {
        Obj::new(v)
    }
}

impl From<String> for Obj {
    fn from(v: String) -> Self {
        Obj::new(v)
    }
}

impl From<i32> for Obj {
    fn from(v: i32) -> Self {
        Obj::new(v)
    }
}

impl From<i64> for Obj {
    fn from(v: i64) -> Self {
        Obj::new(v)
    }
}

impl From<i128> for Obj {
    fn from(v: i128) -> Self {
        Obj::new(v)
    }
}

impl From<f64> for Obj {
    fn from(v: f64) -> Self {
        Obj::new(v)
    }
}
