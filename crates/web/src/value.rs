//! The dynamic value model shared by every transcoder.
//!
//! Request bodies decode into a [`Value`] and structured response chunks are
//! encoded from one. Before a value is handed to a codec it is normalized for
//! the codec's family (see [`Value::normalize`]): textual formats can't carry
//! raw bytes, so those become base64 strings, while binary formats keep them.
//!
//! Maps are kept sorted by key, so every codec writes their entries in key
//! order rather than in the order they were inserted.

use std::collections::BTreeMap;
use std::fmt;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use bytes::Bytes;
use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, Timelike, Utc};
use serde::ser::{SerializeMap, SerializeSeq};
use serde::{Serialize, Serializer};
use thiserror::Error;
use uuid::Uuid;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValueError {
    #[error("{type_name} is not supported: {reason}")]
    Unsupported { type_name: &'static str, reason: String },
}

/// Which codec family a value is normalized for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Target {
    /// JSON, form data, YAML: byte strings are base64 encoded.
    Text,
    /// MessagePack and friends: byte strings pass through.
    Binary,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    /// Only used for values above `i64::MAX`.
    UInt(u64),
    Float(f64),
    Str(String),
    Bytes(Bytes),
    Array(Vec<Value>),
    /// An unordered collection, serialized as an array.
    Set(Vec<Value>),
    Map(BTreeMap<String, Value>),
    Uuid(Uuid),
    DateTime(DateTime<FixedOffset>),
    NaiveDateTime(NaiveDateTime),
    Date(NaiveDate),
}

impl Value {
    /// Builds a value from anything serde can serialize.
    ///
    /// # Errors
    ///
    /// Fails with [`ValueError::Unsupported`], naming the source type, if the
    /// value has no representation in the model (e.g. a map with non-string
    /// keys).
    pub fn from_serialize<T: Serialize + ?Sized>(value: &T) -> Result<Value, ValueError> {
        serde_json::to_value(value)
            .map(Value::from)
            .map_err(|e| ValueError::Unsupported { type_name: std::any::type_name::<T>(), reason: e.to_string() })
    }

    pub fn bytes(value: impl Into<Bytes>) -> Value {
        Value::Bytes(value.into())
    }

    pub fn array<I, V>(items: I) -> Value
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        Value::Array(items.into_iter().map(Into::into).collect())
    }

    /// The variant name, as used in error messages.
    pub fn kind(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Int(_) | Value::UInt(_) => "int",
            Value::Float(_) => "float",
            Value::Str(_) => "str",
            Value::Bytes(_) => "bytes",
            Value::Array(_) => "array",
            Value::Set(_) => "set",
            Value::Map(_) => "map",
            Value::Uuid(_) => "uuid",
            Value::DateTime(_) | Value::NaiveDateTime(_) => "datetime",
            Value::Date(_) => "date",
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            Value::UInt(u) => i64::try_from(*u).ok(),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&BTreeMap<String, Value>> {
        match self {
            Value::Map(map) => Some(map),
            _ => None,
        }
    }

    /// Looks up a key when the value is a map.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.as_map().and_then(|map| map.get(key))
    }

    /// Collapses type specific representations into the forms a codec of the
    /// given family understands.
    ///
    /// - scalars pass through, unsigned integers that fit become `Int`
    /// - UUIDs and date/times become their canonical string form
    /// - bytes become base64 for [`Target::Text`]
    /// - sets become arrays, containers are normalized element-wise
    pub fn normalize(&self, target: Target) -> Value {
        match self {
            Value::UInt(u) => i64::try_from(*u).map_or(Value::UInt(*u), Value::Int),
            Value::Bytes(b) if target == Target::Text => Value::Str(STANDARD.encode(b)),
            Value::Uuid(_) | Value::DateTime(_) | Value::NaiveDateTime(_) | Value::Date(_) => {
                Value::Str(self.temporal_string().unwrap_or_default())
            }
            Value::Array(items) | Value::Set(items) => Value::Array(items.iter().map(|v| v.normalize(target)).collect()),
            Value::Map(map) => Value::Map(map.iter().map(|(k, v)| (k.clone(), v.normalize(target))).collect()),
            other => other.clone(),
        }
    }

    /// The string form of UUID and date/time values, `None` for anything else.
    pub(crate) fn temporal_string(&self) -> Option<String> {
        match self {
            Value::Uuid(uuid) => Some(uuid.hyphenated().to_string()),
            Value::DateTime(dt) => Some(isoformat(dt.naive_local(), Some(dt.offset()))),
            Value::NaiveDateTime(dt) => Some(isoformat(*dt, None)),
            Value::Date(date) => Some(date.format("%Y-%m-%d").to_string()),
            _ => None,
        }
    }
}

/// ISO-8601 with microseconds only when they are not zero.
fn isoformat(dt: NaiveDateTime, offset: Option<&FixedOffset>) -> String {
    let base = if dt.nanosecond() == 0 {
        dt.format("%Y-%m-%dT%H:%M:%S").to_string()
    } else {
        dt.format("%Y-%m-%dT%H:%M:%S%.6f").to_string()
    };
    match offset {
        Some(offset) => format!("{base}{offset}"),
        None => base,
    }
}

impl fmt::Display for Value {
    /// Renders scalars the way they appear in form data and text bodies.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => Ok(()),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Int(i) => write!(f, "{i}"),
            Value::UInt(u) => write!(f, "{u}"),
            Value::Float(x) => write!(f, "{x}"),
            Value::Str(s) => f.write_str(s),
            Value::Bytes(b) => f.write_str(&STANDARD.encode(b)),
            Value::Uuid(_) | Value::DateTime(_) | Value::NaiveDateTime(_) | Value::Date(_) => {
                f.write_str(&self.temporal_string().unwrap_or_default())
            }
            Value::Array(_) | Value::Set(_) | Value::Map(_) => {
                let json = serde_json::to_string(&self.normalize(Target::Text)).map_err(|_| fmt::Error)?;
                f.write_str(&json)
            }
        }
    }
}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Value::Null => serializer.serialize_unit(),
            Value::Bool(b) => serializer.serialize_bool(*b),
            Value::Int(i) => serializer.serialize_i64(*i),
            Value::UInt(u) => serializer.serialize_u64(*u),
            Value::Float(x) => serializer.serialize_f64(*x),
            Value::Str(s) => serializer.serialize_str(s),
            Value::Bytes(b) => serializer.serialize_bytes(b),
            Value::Array(items) | Value::Set(items) => {
                let mut seq = serializer.serialize_seq(Some(items.len()))?;
                for item in items {
                    seq.serialize_element(item)?;
                }
                seq.end()
            }
            Value::Map(entries) => {
                let mut map = serializer.serialize_map(Some(entries.len()))?;
                for (k, v) in entries {
                    map.serialize_entry(k, v)?;
                }
                map.end()
            }
            other => serializer.serialize_str(&other.temporal_string().unwrap_or_default()),
        }
    }
}

impl From<serde_json::Value> for Value {
    fn from(value: serde_json::Value) -> Self {
        match value {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(b),
            serde_json::Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Value::Int(i)
                } else if let Some(u) = n.as_u64() {
                    Value::UInt(u)
                } else {
                    Value::Float(n.as_f64().unwrap_or(f64::NAN))
                }
            }
            serde_json::Value::String(s) => Value::Str(s),
            serde_json::Value::Array(items) => Value::Array(items.into_iter().map(Value::from).collect()),
            serde_json::Value::Object(map) => Value::Map(map.into_iter().map(|(k, v)| (k, Value::from(v))).collect()),
        }
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Bool(value)
    }
}

impl From<i32> for Value {
    fn from(value: i32) -> Self {
        Value::Int(i64::from(value))
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::Int(value)
    }
}

impl From<u64> for Value {
    fn from(value: u64) -> Self {
        i64::try_from(value).map_or(Value::UInt(value), Value::Int)
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::Float(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::Str(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::Str(value)
    }
}

impl From<Bytes> for Value {
    fn from(value: Bytes) -> Self {
        Value::Bytes(value)
    }
}

impl From<Uuid> for Value {
    fn from(value: Uuid) -> Self {
        Value::Uuid(value)
    }
}

impl From<DateTime<FixedOffset>> for Value {
    fn from(value: DateTime<FixedOffset>) -> Self {
        Value::DateTime(value)
    }
}

impl From<DateTime<Utc>> for Value {
    fn from(value: DateTime<Utc>) -> Self {
        Value::DateTime(value.fixed_offset())
    }
}

impl From<NaiveDateTime> for Value {
    fn from(value: NaiveDateTime) -> Self {
        Value::NaiveDateTime(value)
    }
}

impl From<NaiveDate> for Value {
    fn from(value: NaiveDate) -> Self {
        Value::Date(value)
    }
}

impl From<Vec<Value>> for Value {
    fn from(value: Vec<Value>) -> Self {
        Value::Array(value)
    }
}

impl From<BTreeMap<String, Value>> for Value {
    fn from(value: BTreeMap<String, Value>) -> Self {
        Value::Map(value)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(value: Option<T>) -> Self {
        value.map_or(Value::Null, Into::into)
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for Value {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Value::Map(iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }
}
