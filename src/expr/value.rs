//! Runtime values produced by expression evaluation.

use super::context::RuntimeContext;
use super::error::ExprError;
use crate::site::Entity;
use crate::xml::Element;
use chrono::{DateTime, FixedOffset};
use futures_util::future::BoxFuture;
use std::cmp::Ordering;
use std::fmt;
use std::sync::Arc;

/// A first-class callable value: `(context, args) -> value`.
///
/// Builtins and entity methods (such as a template's `compile`) are both
/// represented this way, which lets higher-order builtins pass behavior
/// as data.
pub type RuntimeMethod =
    Arc<dyn Fn(RuntimeContext, Vec<Value>) -> BoxFuture<'static, Result<Value, ExprError>> + Send + Sync>;

/// A string-keyed map preserving insertion order.
///
/// Registries and `groupBy` results must enumerate in encounter order, so
/// this sits on a `Vec` instead of a hash map; site-sized data makes the
/// linear lookup a non-issue.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ValueMap {
    entries: Vec<(String, Value)>,
}

impl ValueMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a value, replacing (in place) any existing entry for the key.
    pub fn insert(&mut self, key: impl Into<String>, value: Value) {
        let key = key.into();
        if let Some(entry) = self.entries.iter_mut().find(|(k, _)| *k == key) {
            entry.1 = value;
        } else {
            self.entries.push((key, value));
        }
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.entries.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn values(&self) -> Vec<Value> {
        self.entries.iter().map(|(_, v)| v.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl FromIterator<(String, Value)> for ValueMap {
    fn from_iter<T: IntoIterator<Item = (String, Value)>>(iter: T) -> Self {
        let mut map = ValueMap::new();
        for (k, v) in iter {
            map.insert(k, v);
        }
        map
    }
}

/// A runtime value.
#[derive(Clone)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    Date(DateTime<FixedOffset>),
    List(Arc<Vec<Value>>),
    Map(Arc<ValueMap>),
    /// A compiled XML fragment, spliced into trees as-is.
    Node(Arc<Element>),
    /// A reference into the site object model.
    Entity(Entity),
    Method(RuntimeMethod),
}

impl Value {
    pub fn list(items: Vec<Value>) -> Self {
        Value::List(Arc::new(items))
    }

    pub fn map(map: ValueMap) -> Self {
        Value::Map(Arc::new(map))
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::Str(_) => "string",
            Value::Date(_) => "date",
            Value::List(_) => "list",
            Value::Map(_) => "map",
            Value::Node(_) => "node",
            Value::Entity(_) => "entity",
            Value::Method(_) => "method",
        }
    }

    /// Coerce into a sequence: lists yield their items, maps their value
    /// collection (in insertion order). Anything else is a type error.
    pub fn as_sequence(&self) -> Result<Vec<Value>, ExprError> {
        match self {
            Value::List(items) => Ok(items.as_ref().clone()),
            Value::Map(map) => Ok(map.values()),
            other => Err(ExprError::Type(format!(
                "expected a sequence, got {}",
                other.type_name()
            ))),
        }
    }

    pub fn as_method(&self) -> Result<RuntimeMethod, ExprError> {
        match self {
            Value::Method(m) => Ok(m.clone()),
            other => Err(ExprError::Type(format!(
                "expected a callable, got {}",
                other.type_name()
            ))),
        }
    }

    pub fn as_int(&self) -> Result<i64, ExprError> {
        match self {
            Value::Int(n) => Ok(*n),
            other => Err(ExprError::Type(format!(
                "expected an integer, got {}",
                other.type_name()
            ))),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => Ok(()),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Int(n) => write!(f, "{n}"),
            Value::Float(x) => write!(f, "{x}"),
            Value::Str(s) => f.write_str(s),
            Value::Date(d) => f.write_str(&d.to_rfc3339()),
            Value::List(items) => {
                for item in items.iter() {
                    write!(f, "{item}")?;
                }
                Ok(())
            }
            Value::Map(map) => write!(f, "<map of {}>", map.len()),
            Value::Node(node) => match node.to_bytes() {
                Ok(bytes) => f.write_str(&String::from_utf8_lossy(&bytes)),
                Err(_) => write!(f, "<{}>", node.name),
            },
            Value::Entity(entity) => f.write_str(entity.name()),
            Value::Method(_) => f.write_str("<method>"),
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Str(s) => write!(f, "Str({s:?})"),
            Value::List(items) => f.debug_list().entries(items.iter()).finish(),
            Value::Method(_) => f.write_str("Method"),
            other => write!(f, "{}({})", other.type_name(), other),
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a == b,
            (Value::Int(a), Value::Float(b)) | (Value::Float(b), Value::Int(a)) => {
                *a as f64 == *b
            }
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::Date(a), Value::Date(b)) => a == b,
            (Value::List(a), Value::List(b)) => a == b,
            (Value::Map(a), Value::Map(b)) => a == b,
            (Value::Node(a), Value::Node(b)) => a == b,
            (Value::Entity(a), Value::Entity(b)) => a.same_as(b),
            (Value::Method(a), Value::Method(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}

/// Order two values of compatible types; `None` when the types cannot be
/// compared (an `orderBy` key error).
pub fn partial_cmp(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::Int(a), Value::Int(b)) => Some(a.cmp(b)),
        (Value::Float(a), Value::Float(b)) => a.partial_cmp(b),
        (Value::Int(a), Value::Float(b)) => (*a as f64).partial_cmp(b),
        (Value::Float(a), Value::Int(b)) => a.partial_cmp(&(*b as f64)),
        (Value::Str(a), Value::Str(b)) => Some(a.cmp(b)),
        (Value::Date(a), Value::Date(b)) => Some(a.cmp(b)),
        (Value::Bool(a), Value::Bool(b)) => Some(a.cmp(b)),
        _ => None,
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Str(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Str(s)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Int(n)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<Vec<Value>> for Value {
    fn from(items: Vec<Value>) -> Self {
        Value::list(items)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn value_map_preserves_insertion_order() {
        let map: ValueMap = [("b", 2i64), ("a", 1), ("c", 3)]
            .into_iter()
            .map(|(k, v)| (k.to_string(), Value::from(v)))
            .collect();
        let keys: Vec<_> = map.iter().map(|(k, _)| k.to_string()).collect();
        assert_eq!(keys, ["b", "a", "c"]);
        assert_eq!(map.get("a"), Some(&Value::Int(1)));
    }

    #[test]
    fn map_unwraps_to_value_collection() {
        let map: ValueMap = [("x".to_string(), Value::from(1i64)), ("y".to_string(), Value::from(2i64))]
            .into_iter()
            .collect();
        let seq = Value::map(map).as_sequence().unwrap();
        assert_eq!(seq, vec![Value::Int(1), Value::Int(2)]);
    }

    #[test]
    fn scalars_are_not_sequences() {
        assert!(Value::Str("abc".into()).as_sequence().is_err());
    }

    #[test]
    fn cross_type_comparison_is_undefined() {
        assert!(partial_cmp(&Value::Int(1), &Value::Str("1".into())).is_none());
        assert_eq!(
            partial_cmp(&Value::Int(1), &Value::Float(1.5)),
            Some(Ordering::Less)
        );
    }
}
