//! Dynamic data values walked during execution
//!
//! Templates never see concrete Rust types. Everything reaching the engine
//! is a [`Value`]: scalars, ordered lists, string-keyed maps, or a
//! user-provided [`Object`] that answers field and method lookups itself.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;

use serde::ser::{Serialize, SerializeMap, SerializeSeq, Serializer};
use thiserror::Error;

use crate::funcs::FuncError;

/// Caller-defined data with named fields and methods
///
/// `field` is consulted first; a miss falls back to `call` with no
/// arguments so zero-argument methods read like fields.
pub trait Object: fmt::Debug + Send + Sync {
    fn type_name(&self) -> &str {
        "object"
    }

    fn field(&self, name: &str) -> Option<Value>;

    /// `None` when no method of that name exists
    fn call(&self, _method: &str, _args: &[Value]) -> Option<Result<Value, FuncError>> {
        None
    }

    fn is_true(&self) -> bool {
        true
    }
}

/// A template data value
#[derive(Debug, Clone, Default)]
pub enum Value {
    #[default]
    Nil,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    List(Arc<Vec<Value>>),
    /// Keys iterate in ascending order
    Map(Arc<BTreeMap<String, Value>>),
    Object(Arc<dyn Object>),
}

/// Failure to resolve a field, method or index on a value
#[derive(Error, Debug, Clone, PartialEq)]
pub enum AccessError {
    #[error("map has no entry for key {0:?}")]
    MissingKey(String),

    #[error("{type_name} has no field or method {name}")]
    NoField { type_name: String, name: String },

    #[error("nil pointer evaluating {0}")]
    NilReceiver(String),

    #[error("can't call method {name} on type {type_name}")]
    NotCallable { type_name: String, name: String },

    #[error("index out of range: {0}")]
    OutOfRange(i64),

    #[error("cannot index {type_name} with {key}")]
    BadIndex { type_name: String, key: String },

    #[error(transparent)]
    Failed(#[from] FuncError),
}

impl Value {
    pub fn list<T: Into<Value>>(items: impl IntoIterator<Item = T>) -> Value {
        Value::List(Arc::new(items.into_iter().map(Into::into).collect()))
    }

    pub fn map<K: Into<String>, V: Into<Value>>(
        entries: impl IntoIterator<Item = (K, V)>,
    ) -> Value {
        Value::Map(Arc::new(
            entries
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        ))
    }

    pub fn object(object: impl Object + 'static) -> Value {
        Value::Object(Arc::new(object))
    }

    /// Convert any serializable data through its JSON form
    pub fn from_serialize<T: Serialize + ?Sized>(data: &T) -> Result<Value, serde_json::Error> {
        serde_json::to_value(data).map(Value::from)
    }

    pub fn type_name(&self) -> &str {
        match self {
            Value::Nil => "nil",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::String(_) => "string",
            Value::List(_) => "list",
            Value::Map(_) => "map",
            Value::Object(o) => o.type_name(),
        }
    }

    /// Truthiness used by `if`, `with`, `and`, `or` and `not`
    ///
    /// Zero values and empty collections are false.
    pub fn is_true(&self) -> bool {
        match self {
            Value::Nil => false,
            Value::Bool(b) => *b,
            Value::Int(n) => *n != 0,
            Value::Float(n) => *n != 0.0,
            Value::String(s) => !s.is_empty(),
            Value::List(items) => !items.is_empty(),
            Value::Map(map) => !map.is_empty(),
            Value::Object(o) => o.is_true(),
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(n) => Some(*n),
            _ => None,
        }
    }

    /// Look up `.name` on this value
    pub fn field(&self, name: &str) -> Result<Value, AccessError> {
        match self {
            Value::Map(map) => map
                .get(name)
                .cloned()
                .ok_or_else(|| AccessError::MissingKey(name.to_string())),
            Value::Object(object) => {
                if let Some(value) = object.field(name) {
                    return Ok(value);
                }
                match object.call(name, &[]) {
                    Some(result) => result.map_err(AccessError::from),
                    None => Err(AccessError::NoField {
                        type_name: object.type_name().to_string(),
                        name: name.to_string(),
                    }),
                }
            }
            Value::Nil => Err(AccessError::NilReceiver(format!(".{}", name))),
            other => Err(AccessError::NoField {
                type_name: other.type_name().to_string(),
                name: name.to_string(),
            }),
        }
    }

    /// Invoke `.name` with arguments; only objects carry methods
    pub fn call_method(&self, name: &str, args: &[Value]) -> Result<Value, AccessError> {
        match self {
            Value::Object(object) => match object.call(name, args) {
                Some(result) => result.map_err(AccessError::from),
                None => Err(AccessError::NoField {
                    type_name: object.type_name().to_string(),
                    name: name.to_string(),
                }),
            },
            other => Err(AccessError::NotCallable {
                type_name: other.type_name().to_string(),
                name: name.to_string(),
            }),
        }
    }

    /// Element of a list by position or of a map by key
    pub fn index(&self, key: &Value) -> Result<Value, AccessError> {
        match (self, key) {
            (Value::List(items), Value::Int(i)) => usize::try_from(*i)
                .ok()
                .and_then(|i| items.get(i))
                .cloned()
                .ok_or(AccessError::OutOfRange(*i)),
            (Value::Map(map), Value::String(k)) => map
                .get(k)
                .cloned()
                .ok_or_else(|| AccessError::MissingKey(k.clone())),
            (Value::Nil, _) => Err(AccessError::NilReceiver("index".to_string())),
            (target, key) => Err(AccessError::BadIndex {
                type_name: target.type_name().to_string(),
                key: key.type_name().to_string(),
            }),
        }
    }

    /// Length of a string in bytes, or of a collection in elements
    pub fn len(&self) -> Option<usize> {
        match self {
            Value::String(s) => Some(s.len()),
            Value::List(items) => Some(items.len()),
            Value::Map(map) => Some(map.len()),
            _ => None,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == Some(0)
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Nil, Value::Nil) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a == b,
            (Value::String(a), Value::String(b)) => a == b,
            (Value::List(a), Value::List(b)) => a == b,
            (Value::Map(a), Value::Map(b)) => a == b,
            (Value::Object(a), Value::Object(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Nil => write!(f, "<nil>"),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Int(n) => write!(f, "{}", n),
            Value::Float(n) => write!(f, "{}", n),
            Value::String(s) => f.write_str(s),
            Value::List(items) => {
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, " ")?;
                    }
                    write!(f, "{}", item)?;
                }
                write!(f, "]")
            }
            Value::Map(map) => {
                write!(f, "map[")?;
                for (i, (k, v)) in map.iter().enumerate() {
                    if i > 0 {
                        write!(f, " ")?;
                    }
                    write!(f, "{}:{}", k, v)?;
                }
                write!(f, "]")
            }
            Value::Object(o) => write!(f, "{:?}", o),
        }
    }
}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Value::Nil => serializer.serialize_unit(),
            Value::Bool(b) => serializer.serialize_bool(*b),
            Value::Int(n) => serializer.serialize_i64(*n),
            Value::Float(n) => serializer.serialize_f64(*n),
            Value::String(s) => serializer.serialize_str(s),
            Value::List(items) => {
                let mut seq = serializer.serialize_seq(Some(items.len()))?;
                for item in items.iter() {
                    seq.serialize_element(item)?;
                }
                seq.end()
            }
            Value::Map(entries) => {
                let mut map = serializer.serialize_map(Some(entries.len()))?;
                for (k, v) in entries.iter() {
                    map.serialize_entry(k, v)?;
                }
                map.end()
            }
            Value::Object(o) => serializer.serialize_str(&format!("{:?}", o)),
        }
    }
}

impl From<serde_json::Value> for Value {
    fn from(value: serde_json::Value) -> Self {
        use serde_json::Value as Json;
        match value {
            Json::Null => Value::Nil,
            Json::Bool(b) => Value::Bool(b),
            Json::Number(n) => match n.as_i64() {
                Some(i) => Value::Int(i),
                None => Value::Float(n.as_f64().unwrap_or(f64::NAN)),
            },
            Json::String(s) => Value::String(s),
            Json::Array(items) => Value::list(items),
            Json::Object(entries) => Value::map(entries),
        }
    }
}

macro_rules! from_int {
    ($($t:ty),*) => {
        $(impl From<$t> for Value {
            fn from(n: $t) -> Self {
                Value::Int(i64::from(n))
            }
        })*
    };
}

from_int!(i8, i16, i32, i64, u8, u16, u32);

impl From<usize> for Value {
    fn from(n: usize) -> Self {
        match i64::try_from(n) {
            Ok(n) => Value::Int(n),
            Err(_) => Value::Float(n as f64),
        }
    }
}

impl From<u64> for Value {
    fn from(n: u64) -> Self {
        match i64::try_from(n) {
            Ok(n) => Value::Int(n),
            Err(_) => Value::Float(n as f64),
        }
    }
}

impl From<f32> for Value {
    fn from(n: f32) -> Self {
        Value::Float(f64::from(n))
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Float(n)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(items: Vec<T>) -> Self {
        Value::list(items)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(value: Option<T>) -> Self {
        value.map(Into::into).unwrap_or_default()
    }
}

impl<V: Into<Value>> From<BTreeMap<String, V>> for Value {
    fn from(entries: BTreeMap<String, V>) -> Self {
        Value::map(entries)
    }
}

impl<V: Into<Value>> From<HashMap<String, V>> for Value {
    fn from(entries: HashMap<String, V>) -> Self {
        Value::map(entries)
    }
}
