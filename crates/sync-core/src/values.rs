//! Column values carried by change events.
//!
//! Values are classified once, when a payload is decoded, so that every
//! later stage can match exhaustively on [`ColumnValue`] instead of
//! inspecting JSON types at runtime.

use serde_json::{Map, Value};

/// A single column value from a change event.
#[derive(Debug, Clone, PartialEq)]
pub enum ColumnValue {
    /// SQL NULL
    Null,

    /// Integer value, wide enough for both BIGINT and BIGINT UNSIGNED
    Integer(i128),

    /// Floating point value
    Float(f64),

    /// Text value
    Text(String),

    /// Nested JSON object or array
    Document(Value),

    /// Boolean value
    Boolean(bool),
}

impl ColumnValue {
    /// Classify a JSON value.
    pub fn from_json(value: Value) -> Self {
        match value {
            Value::Null => Self::Null,
            Value::Bool(b) => Self::Boolean(b),
            Value::Number(n) => match (n.as_i64(), n.as_u64(), n.as_f64()) {
                (Some(i), _, _) => Self::Integer(i.into()),
                (None, Some(u), _) => Self::Integer(u.into()),
                (None, None, Some(f)) => Self::Float(f),
                (None, None, None) => Self::Text(n.to_string()),
            },
            Value::String(s) => Self::Text(s),
            doc @ (Value::Array(_) | Value::Object(_)) => Self::Document(doc),
        }
    }
}

impl From<Value> for ColumnValue {
    fn from(value: Value) -> Self {
        Self::from_json(value)
    }
}

/// Ordered mapping from column name to value.
///
/// Iteration follows insertion order, which for decoded events is the order
/// of keys in the payload's `data` object.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ColumnMap {
    columns: Vec<(String, ColumnValue)>,
}

impl ColumnMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from a JSON object, keeping the object's key order.
    pub fn from_json_object(object: Map<String, Value>) -> Self {
        object
            .into_iter()
            .map(|(name, value)| (name, ColumnValue::from_json(value)))
            .collect()
    }

    /// Insert a column. An existing column keeps its position and gets the new value.
    pub fn insert(&mut self, name: impl Into<String>, value: ColumnValue) {
        let name = name.into();
        match self.columns.iter_mut().find(|(n, _)| *n == name) {
            Some((_, existing)) => *existing = value,
            None => self.columns.push((name, value)),
        }
    }

    pub fn get(&self, name: &str) -> Option<&ColumnValue> {
        self.columns
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    /// Column names in order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().map(|(n, _)| n.as_str())
    }

    /// `(name, value)` pairs in order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &ColumnValue)> {
        self.columns.iter().map(|(n, v)| (n.as_str(), v))
    }
}

impl<K: Into<String>> FromIterator<(K, ColumnValue)> for ColumnMap {
    fn from_iter<I: IntoIterator<Item = (K, ColumnValue)>>(iter: I) -> Self {
        let mut map = ColumnMap::new();
        for (name, value) in iter {
            map.insert(name, value);
        }
        map
    }
}
