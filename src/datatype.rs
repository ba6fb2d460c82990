// used for timestamps in the database
use chrono::{DateTime, Utc};
// values are kept at rest as JSON
use serde::{Deserialize, Serialize};

// used to print out readable forms of a value
use std::fmt;

/// The scalar kinds a field can be declared with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FieldKind {
    Integer,
    Text,
    Time,
}
impl FieldKind {
    pub fn name(&self) -> &'static str {
        match self {
            FieldKind::Integer => "Integer",
            FieldKind::Text => "Text",
            FieldKind::Time => "Time",
        }
    }
}
impl fmt::Display for FieldKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// A field value. Values of the same kind are totally ordered, which is what
/// sorted live queries rely on. Values of different kinds order by kind, but a
/// schema never lets two kinds share a field.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value")]
pub enum Value {
    Integer(i64),
    Text(String),
    Time(DateTime<Utc>),
}
impl Value {
    pub fn kind(&self) -> FieldKind {
        match self {
            Value::Integer(_) => FieldKind::Integer,
            Value::Text(_) => FieldKind::Text,
            Value::Time(_) => FieldKind::Time,
        }
    }
    pub fn as_integer(&self) -> Option<i64> {
        match self {
            Value::Integer(i) => Some(*i),
            _ => None,
        }
    }
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }
    pub fn as_time(&self) -> Option<&DateTime<Utc>> {
        match self {
            Value::Time(t) => Some(t),
            _ => None,
        }
    }
}
impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Value::Integer(i) => write!(f, "{}", i),
            Value::Text(s) => write!(f, "\"{}\"", s),
            Value::Time(t) => write!(f, "{}", t.to_rfc3339()),
        }
    }
}
impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Integer(i)
    }
}
impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Text(s.to_owned())
    }
}
impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Text(s)
    }
}
impl From<DateTime<Utc>> for Value {
    fn from(t: DateTime<Utc>) -> Self {
        Value::Time(t)
    }
}
