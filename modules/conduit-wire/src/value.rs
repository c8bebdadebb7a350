//! Record data model: ordered fields of typed values, nesting to any depth.

use std::any::{Any, TypeId};
use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::Serialize;
use uuid::Uuid;

/// A strongly-typed event or field value that travels as an opaque, type-tagged blob.
///
/// `TYPE_NAME` is the fully-qualified name the remote engine and the type registry
/// know the type by.
pub trait EventObject:
    Serialize + DeserializeOwned + fmt::Debug + PartialEq + Send + Sync + 'static
{
    const TYPE_NAME: &'static str;
}

/// One field value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    UInt(u64),
    Float(f64),
    Char(char),
    String(String),
    Timestamp(DateTime<Utc>),
    Uuid(Uuid),
    Record(Record),
    Object(ObjectValue),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Float(f) => Some(*f),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_record(&self) -> Option<&Record> {
        match self {
            Value::Record(r) => Some(r),
            _ => None,
        }
    }

    pub fn as_object(&self) -> Option<&ObjectValue> {
        match self {
            Value::Object(o) => Some(o),
            _ => None,
        }
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Int(v as i64)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<u64> for Value {
    fn from(v: u64) -> Self {
        Value::UInt(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<char> for Value {
    fn from(v: char) -> Self {
        Value::Char(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::String(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::String(v)
    }
}

impl From<DateTime<Utc>> for Value {
    fn from(v: DateTime<Utc>) -> Self {
        Value::Timestamp(v)
    }
}

impl From<Uuid> for Value {
    fn from(v: Uuid) -> Self {
        Value::Uuid(v)
    }
}

impl From<Record> for Value {
    fn from(v: Record) -> Self {
        Value::Record(v)
    }
}

impl From<ObjectValue> for Value {
    fn from(v: ObjectValue) -> Self {
        Value::Object(v)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(Value::Null)
    }
}

// ---------------------------------------------------------------------------
// Record
// ---------------------------------------------------------------------------

/// Ordered mapping of unique field names to values.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Record {
    fields: Vec<(String, Value)>,
}

impl Record {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.insert(key, value);
        self
    }

    /// Insert a field. An existing key keeps its position and takes the new value.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        let key = key.into();
        let value = value.into();
        match self.fields.iter_mut().find(|(k, _)| *k == key) {
            Some((_, slot)) => Some(std::mem::replace(slot, value)),
            None => {
                self.fields.push((key, value));
                None
            }
        }
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    pub fn remove(&mut self, key: &str) -> Option<Value> {
        let idx = self.fields.iter().position(|(k, _)| k == key)?;
        Some(self.fields.remove(idx).1)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|(k, _)| k.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v))
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for Record {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut record = Record::new();
        for (k, v) in iter {
            record.insert(k, v);
        }
        record
    }
}

// ---------------------------------------------------------------------------
// ObjectValue
// ---------------------------------------------------------------------------

/// Type-erased `EventObject`. Cloning shares the underlying value.
#[derive(Clone)]
pub struct ObjectValue {
    inner: Arc<dyn ErasedObject>,
}

impl ObjectValue {
    pub fn new<T: EventObject>(value: T) -> Self {
        Self {
            inner: Arc::new(value),
        }
    }

    pub fn type_name(&self) -> &'static str {
        self.inner.type_name()
    }

    pub fn object_type_id(&self) -> TypeId {
        self.inner.object_type_id()
    }

    pub fn downcast_ref<T: EventObject>(&self) -> Option<&T> {
        self.inner.as_any().downcast_ref::<T>()
    }

    /// Serialize through serde into a JSON tree, ready for contract projection.
    pub fn to_json(&self) -> serde_json::Result<serde_json::Value> {
        self.inner.to_json()
    }
}

impl PartialEq for ObjectValue {
    fn eq(&self, other: &Self) -> bool {
        self.inner.eq_dyn(other.inner.as_ref())
    }
}

impl fmt::Debug for ObjectValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}(", self.type_name())?;
        self.inner.fmt_dyn(f)?;
        write!(f, ")")
    }
}

trait ErasedObject: Send + Sync {
    fn type_name(&self) -> &'static str;
    fn object_type_id(&self) -> TypeId;
    fn as_any(&self) -> &dyn Any;
    fn to_json(&self) -> serde_json::Result<serde_json::Value>;
    fn eq_dyn(&self, other: &dyn ErasedObject) -> bool;
    fn fmt_dyn(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result;
}

impl<T: EventObject> ErasedObject for T {
    fn type_name(&self) -> &'static str {
        T::TYPE_NAME
    }

    fn object_type_id(&self) -> TypeId {
        TypeId::of::<T>()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn to_json(&self) -> serde_json::Result<serde_json::Value> {
        serde_json::to_value(self)
    }

    fn eq_dyn(&self, other: &dyn ErasedObject) -> bool {
        other
            .as_any()
            .downcast_ref::<T>()
            .is_some_and(|other| other == self)
    }

    fn fmt_dyn(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Probe {
        id: u32,
    }

    impl EventObject for Probe {
        const TYPE_NAME: &'static str = "conduit.test.Probe";
    }

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct OtherProbe {
        id: u32,
    }

    impl EventObject for OtherProbe {
        const TYPE_NAME: &'static str = "conduit.test.OtherProbe";
    }

    #[test]
    fn insert_replaces_in_place() {
        let mut record = Record::new().with("a", 1).with("b", 2);
        let previous = record.insert("a", "x");

        assert_eq!(previous, Some(Value::Int(1)));
        assert_eq!(record.keys().collect::<Vec<_>>(), vec!["a", "b"]);
        assert_eq!(record.get("a"), Some(&Value::String("x".into())));
    }

    #[test]
    fn object_equality_requires_same_type() {
        let a = ObjectValue::new(Probe { id: 1 });
        let b = ObjectValue::new(Probe { id: 1 });
        let c = ObjectValue::new(OtherProbe { id: 1 });

        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(a.downcast_ref::<Probe>(), Some(&Probe { id: 1 }));
        assert!(a.downcast_ref::<OtherProbe>().is_none());
    }

    #[test]
    fn none_converts_to_null() {
        let v: Value = Option::<i64>::None.into();
        assert!(v.is_null());
    }
}
