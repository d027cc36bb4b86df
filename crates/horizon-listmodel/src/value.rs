//! Dynamically typed values exchanged with a list model.
//!
//! Every mutation and read accessor of the engine speaks [`Value`], a small
//! tagged union modelled on what a scripting bridge hands over: absent values,
//! booleans, numbers, text, ordered lists, key/value maps, timestamps, opaque
//! object handles and nested list models.
//!
//! # Example
//!
//! ```ignore
//! use horizon_listmodel::{Value, ValueMap};
//!
//! let record = ValueMap::new().with("name", "Apples").with("cost", 5.95);
//! let value = Value::from(record);
//! assert_eq!(value.as_map().and_then(|m| m.get("cost")).and_then(Value::as_number), Some(5.95));
//!
//! // JSON literals convert directly, keeping key order.
//! let value = Value::from(serde_json::json!({"name": "Pizza", "tags": ["hot"]}));
//! assert!(value.is_map());
//! ```

use std::any::Any;
use std::fmt;
use std::sync::{Arc, Weak};

use chrono::{DateTime, Utc};

use crate::list::ListModel;

/// A dynamically typed value.
#[derive(Debug, Clone, Default)]
pub enum Value {
    /// No value at all.
    #[default]
    Undefined,
    /// An explicit null.
    Null,
    /// Boolean value.
    Bool(bool),
    /// Numeric value. All numbers are doubles.
    Number(f64),
    /// UTF-8 text.
    String(String),
    /// Ordered list of values. A list of maps is the literal form of a table.
    List(Vec<Value>),
    /// Key/value map with insertion-ordered keys.
    Map(ValueMap),
    /// A point in time.
    DateTime(DateTime<Utc>),
    /// Opaque object handle, compared by identity.
    Object(ObjectHandle),
    /// A live list model, compared by identity.
    Model(Arc<ListModel>),
}

impl Value {
    /// Returns `true` if this is `Value::Undefined`.
    pub fn is_undefined(&self) -> bool {
        matches!(self, Value::Undefined)
    }

    /// Returns `true` if this is `Value::Null`.
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Returns `true` for both `Undefined` and `Null`.
    pub fn is_nullish(&self) -> bool {
        matches!(self, Value::Undefined | Value::Null)
    }

    /// Returns `true` if this is a map.
    pub fn is_map(&self) -> bool {
        matches!(self, Value::Map(_))
    }

    /// Returns `true` if this is a list.
    pub fn is_list(&self) -> bool {
        matches!(self, Value::List(_))
    }

    /// Attempts to get the value as a boolean.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Attempts to get the value as a number.
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            _ => None,
        }
    }

    /// Attempts to get the value as a string slice.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s.as_str()),
            _ => None,
        }
    }

    /// Attempts to get the value as a list.
    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Value::List(items) => Some(items.as_slice()),
            _ => None,
        }
    }

    /// Attempts to get the value as a map.
    pub fn as_map(&self) -> Option<&ValueMap> {
        match self {
            Value::Map(map) => Some(map),
            _ => None,
        }
    }

    /// Attempts to get the value as a timestamp.
    pub fn as_date_time(&self) -> Option<DateTime<Utc>> {
        match self {
            Value::DateTime(dt) => Some(*dt),
            _ => None,
        }
    }

    /// Attempts to get the value as an object handle.
    pub fn as_object(&self) -> Option<&ObjectHandle> {
        match self {
            Value::Object(handle) => Some(handle),
            _ => None,
        }
    }

    /// Attempts to get the value as a nested list model.
    pub fn as_model(&self) -> Option<&Arc<ListModel>> {
        match self {
            Value::Model(model) => Some(model),
            _ => None,
        }
    }

    /// Short name of the value's kind, used in diagnostics.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Undefined => "undefined",
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Number(_) => "number",
            Value::String(_) => "string",
            Value::List(_) => "list",
            Value::Map(_) => "map",
            Value::DateTime(_) => "datetime",
            Value::Object(_) => "object",
            Value::Model(_) => "model",
        }
    }

    /// Numeric conversion with script semantics.
    ///
    /// Strings are parsed after trimming (the empty string is `0`), `null`
    /// is `0`, and anything without a numeric reading is `NaN`.
    pub fn to_number(&self) -> f64 {
        match self {
            Value::Undefined => f64::NAN,
            Value::Null => 0.0,
            Value::Bool(b) => f64::from(u8::from(*b)),
            Value::Number(n) => *n,
            Value::String(s) => {
                let trimmed = s.trim();
                if trimmed.is_empty() {
                    0.0
                } else {
                    trimmed.parse().unwrap_or(f64::NAN)
                }
            }
            Value::DateTime(dt) => dt.timestamp_millis() as f64,
            _ => f64::NAN,
        }
    }

    /// Integer conversion as used for script-supplied indices.
    ///
    /// Non-finite numbers become `0`; everything else truncates and wraps
    /// into the signed 32-bit range.
    pub fn to_int32(&self) -> i32 {
        let n = self.to_number();
        if !n.is_finite() {
            return 0;
        }
        let truncated = n.trunc() % 4_294_967_296.0;
        let unsigned = if truncated < 0.0 {
            truncated + 4_294_967_296.0
        } else {
            truncated
        };
        unsigned as u32 as i32
    }

    /// Truthiness with script semantics.
    pub fn to_bool(&self) -> bool {
        match self {
            Value::Undefined | Value::Null => false,
            Value::Bool(b) => *b,
            Value::Number(n) => *n != 0.0 && !n.is_nan(),
            Value::String(s) => !s.is_empty(),
            _ => true,
        }
    }

    /// Converts the value to JSON.
    ///
    /// Nested models are exported row by row; object handles and non-finite
    /// numbers have no JSON form and become `null`.
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Value::Undefined | Value::Null | Value::Object(_) => serde_json::Value::Null,
            Value::Bool(b) => serde_json::Value::Bool(*b),
            Value::Number(n) => serde_json::Number::from_f64(*n)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            Value::String(s) => serde_json::Value::String(s.clone()),
            Value::List(items) => serde_json::Value::Array(items.iter().map(Value::to_json).collect()),
            Value::Map(map) => serde_json::Value::Object(
                map.iter()
                    .map(|(key, value)| (key.to_string(), value.to_json()))
                    .collect(),
            ),
            Value::DateTime(dt) => serde_json::Value::String(dt.to_rfc3339()),
            Value::Model(model) => model.to_value().to_json(),
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Undefined, Value::Undefined) | (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Number(a), Value::Number(b)) => a == b,
            (Value::String(a), Value::String(b)) => a == b,
            (Value::List(a), Value::List(b)) => a == b,
            (Value::Map(a), Value::Map(b)) => a == b,
            (Value::DateTime(a), Value::DateTime(b)) => a == b,
            (Value::Object(a), Value::Object(b)) => a.ptr_eq(b),
            (Value::Model(a), Value::Model(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Undefined => f.write_str("undefined"),
            Value::Null => f.write_str("null"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Number(n) => write!(f, "{n}"),
            Value::String(s) => f.write_str(s),
            Value::List(items) => {
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(",")?;
                    }
                    write!(f, "{item}")?;
                }
                Ok(())
            }
            Value::Map(_) => f.write_str("[object Object]"),
            Value::DateTime(dt) => write!(f, "{}", dt.to_rfc3339()),
            Value::Object(_) => f.write_str("[object]"),
            Value::Model(_) => f.write_str("[object ListModel]"),
        }
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Bool(value)
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::Number(value)
    }
}

impl From<f32> for Value {
    fn from(value: f32) -> Self {
        Value::Number(f64::from(value))
    }
}

impl From<i32> for Value {
    fn from(value: i32) -> Self {
        Value::Number(f64::from(value))
    }
}

impl From<u32> for Value {
    fn from(value: u32) -> Self {
        Value::Number(f64::from(value))
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::Number(value as f64)
    }
}

impl From<usize> for Value {
    fn from(value: usize) -> Self {
        Value::Number(value as f64)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::String(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::String(value)
    }
}

impl From<Vec<Value>> for Value {
    fn from(value: Vec<Value>) -> Self {
        Value::List(value)
    }
}

impl From<ValueMap> for Value {
    fn from(value: ValueMap) -> Self {
        Value::Map(value)
    }
}

impl From<DateTime<Utc>> for Value {
    fn from(value: DateTime<Utc>) -> Self {
        Value::DateTime(value)
    }
}

impl From<ObjectHandle> for Value {
    fn from(value: ObjectHandle) -> Self {
        Value::Object(value)
    }
}

impl From<Arc<ListModel>> for Value {
    fn from(value: Arc<ListModel>) -> Self {
        Value::Model(value)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(value: Option<T>) -> Self {
        match value {
            Some(v) => v.into(),
            None => Value::Null,
        }
    }
}

impl From<serde_json::Value> for Value {
    fn from(value: serde_json::Value) -> Self {
        match value {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(b),
            serde_json::Value::Number(n) => Value::Number(n.as_f64().unwrap_or(f64::NAN)),
            serde_json::Value::String(s) => Value::String(s),
            serde_json::Value::Array(items) => Value::List(items.into_iter().map(Value::from).collect()),
            serde_json::Value::Object(map) => {
                Value::Map(map.into_iter().map(|(k, v)| (k, Value::from(v))).collect())
            }
        }
    }
}

/// An insertion-ordered string-keyed map of values.
///
/// Order matters: a model discovers its columns in the order a record lists
/// them. Equality ignores order.
#[derive(Debug, Clone, Default)]
pub struct ValueMap {
    entries: Vec<(String, Value)>,
}

impl ValueMap {
    /// Creates an empty map.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an empty map with room for `capacity` entries.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: Vec::with_capacity(capacity),
        }
    }

    /// Builder form of [`insert`](Self::insert).
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.insert(key, value);
        self
    }

    /// Inserts a value, returning the previous one.
    ///
    /// Replacing keeps the key's original position.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        let key = key.into();
        let value = value.into();
        match self.entries.iter_mut().find(|(k, _)| *k == key) {
            Some((_, slot)) => Some(std::mem::replace(slot, value)),
            None => {
                self.entries.push((key, value));
                None
            }
        }
    }

    /// Returns the value stored under `key`.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.entries.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    /// Returns a mutable reference to the value stored under `key`.
    pub fn get_mut(&mut self, key: &str) -> Option<&mut Value> {
        self.entries.iter_mut().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    /// Returns `true` if `key` is present.
    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.iter().any(|(k, _)| k == key)
    }

    /// Removes `key`, returning its value.
    pub fn remove(&mut self, key: &str) -> Option<Value> {
        let pos = self.entries.iter().position(|(k, _)| k == key)?;
        Some(self.entries.remove(pos).1)
    }

    /// Keys in insertion order.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(k, _)| k.as_str())
    }

    /// Values in insertion order.
    pub fn values(&self) -> impl Iterator<Item = &Value> {
        self.entries.iter().map(|(_, v)| v)
    }

    /// Entries in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if the map has no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl PartialEq for ValueMap {
    fn eq(&self, other: &Self) -> bool {
        self.len() == other.len()
            && self
                .iter()
                .all(|(key, value)| other.get(key).is_some_and(|v| v == value))
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for ValueMap {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut map = ValueMap::new();
        for (key, value) in iter {
            map.insert(key, value);
        }
        map
    }
}

impl IntoIterator for ValueMap {
    type Item = (String, Value);
    type IntoIter = std::vec::IntoIter<(String, Value)>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_iter()
    }
}

impl<'a> IntoIterator for &'a ValueMap {
    type Item = (&'a str, &'a Value);
    type IntoIter = std::iter::Map<std::slice::Iter<'a, (String, Value)>, fn(&'a (String, Value)) -> (&'a str, &'a Value)>;

    fn into_iter(self) -> Self::IntoIter {
        fn entry(pair: &(String, Value)) -> (&str, &Value) {
            (pair.0.as_str(), &pair.1)
        }
        self.entries
            .iter()
            .map(entry as fn(&'a (String, Value)) -> (&'a str, &'a Value))
    }
}

/// A shared, type-erased object reference.
///
/// Handles compare by identity. Columns holding an object keep only an
/// [`ObjectGuard`], so storing a handle in a model never extends the
/// object's lifetime.
#[derive(Clone)]
pub struct ObjectHandle(Arc<dyn Any + Send + Sync>);

impl ObjectHandle {
    /// Wraps a new object.
    pub fn new<T: Any + Send + Sync>(object: T) -> Self {
        Self(Arc::new(object))
    }

    /// Wraps an already shared object, keeping its identity.
    pub fn from_arc<T: Any + Send + Sync>(object: Arc<T>) -> Self {
        Self(object)
    }

    /// Borrows the object as `T`.
    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.0.downcast_ref::<T>()
    }

    /// Returns the shared object as `T`.
    pub fn downcast<T: Any + Send + Sync>(&self) -> Option<Arc<T>> {
        Arc::clone(&self.0).downcast::<T>().ok()
    }

    /// Returns `true` if both handles refer to the same object.
    pub fn ptr_eq(&self, other: &ObjectHandle) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    /// Creates a guard that does not keep the object alive.
    pub fn downgrade(&self) -> ObjectGuard {
        ObjectGuard(Arc::downgrade(&self.0))
    }
}

impl fmt::Debug for ObjectHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ObjectHandle({:p})", Arc::as_ptr(&self.0))
    }
}

/// A weak object reference that reads as null once the object is gone.
#[derive(Clone)]
pub struct ObjectGuard(Weak<dyn Any + Send + Sync>);

impl ObjectGuard {
    /// Returns the object if it is still alive.
    pub fn upgrade(&self) -> Option<ObjectHandle> {
        self.0.upgrade().map(ObjectHandle)
    }

    /// Returns `true` if both guards refer to the same object.
    pub fn ptr_eq(&self, other: &ObjectGuard) -> bool {
        Weak::ptr_eq(&self.0, &other.0)
    }
}

impl fmt::Debug for ObjectGuard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ObjectGuard({:p})", self.0.as_ptr())
    }
}

impl PartialEq for ObjectGuard {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_json_keeps_key_order() {
        let value = Value::from(json!({"name": "Apples", "cost": 5.95, "alive": true}));
        let map = value.as_map().unwrap();
        assert_eq!(map.keys().collect::<Vec<_>>(), vec!["name", "cost", "alive"]);
        assert_eq!(map.get("cost"), Some(&Value::Number(5.95)));
        assert_eq!(value.to_json(), json!({"name": "Apples", "cost": 5.95, "alive": true}));
    }

    #[test]
    fn test_map_insert_replaces_in_place() {
        let mut map = ValueMap::new().with("a", 1).with("b", 2);
        assert_eq!(map.insert("a", 10), Some(Value::Number(1.0)));
        assert_eq!(map.keys().collect::<Vec<_>>(), vec!["a", "b"]);
        assert_eq!(map.remove("b"), Some(Value::Number(2.0)));
        assert_eq!(map.len(), 1);
    }

    #[test]
    fn test_map_equality_ignores_order() {
        let a = ValueMap::new().with("x", 1).with("y", "two");
        let b = ValueMap::new().with("y", "two").with("x", 1);
        assert_eq!(a, b);
        assert_ne!(a, ValueMap::new().with("x", 1));
    }

    #[test]
    fn test_script_conversions() {
        assert_eq!(Value::from("  42 ").to_number(), 42.0);
        assert_eq!(Value::from("").to_number(), 0.0);
        assert!(Value::from("abc").to_number().is_nan());
        assert_eq!(Value::Null.to_number(), 0.0);
        assert_eq!(Value::from(-1.7).to_int32(), -1);
        assert_eq!(Value::from(4_294_967_297.0).to_int32(), 1);
        assert_eq!(Value::Undefined.to_int32(), 0);
        assert!(!Value::from("").to_bool());
        assert!(Value::from("false").to_bool());
        assert!(!Value::from(f64::NAN).to_bool());
    }

    #[test]
    fn test_object_identity_and_guard() {
        let handle = ObjectHandle::new(String::from("item"));
        let same = handle.clone();
        let other = ObjectHandle::new(String::from("item"));
        assert_eq!(Value::from(handle.clone()), Value::from(same));
        assert_ne!(Value::from(handle.clone()), Value::from(other));

        let guard = handle.downgrade();
        assert_eq!(guard.upgrade().unwrap().downcast_ref::<String>().map(String::as_str), Some("item"));
        drop(handle);
        assert!(guard.upgrade().is_none());
    }

    #[test]
    fn test_option_conversion() {
        assert_eq!(Value::from(None::<f64>), Value::Null);
        assert_eq!(Value::from(Some("x")), Value::from("x"));
    }
}
