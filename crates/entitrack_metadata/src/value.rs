//! Dynamic field value type.

use std::fmt;

/// The kind of a field value.
///
/// Kinds classify the non-null values a field may hold and drive eager
/// foreign-key type validation at model build time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueKind {
    /// Boolean.
    Bool,
    /// Signed integer (full i64 range).
    Integer,
    /// Text string (UTF-8).
    Text,
    /// Byte string.
    Bytes,
}

/// A dynamic field value.
///
/// Field values are scalars. Structural equality is used everywhere: two
/// values are equal iff they have the same variant and the same content.
/// Floats are intentionally not supported so that equality and hashing stay
/// total.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Value {
    /// Null value.
    Null,
    /// Boolean value.
    Bool(bool),
    /// Signed integer (supports full i64 range).
    Integer(i64),
    /// Text string (UTF-8).
    Text(String),
    /// Byte string.
    Bytes(Vec<u8>),
}

impl Value {
    /// Returns true if this value is null.
    #[must_use]
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Returns the kind of this value, or `None` for null.
    #[must_use]
    pub fn kind(&self) -> Option<ValueKind> {
        match self {
            Value::Null => None,
            Value::Bool(_) => Some(ValueKind::Bool),
            Value::Integer(_) => Some(ValueKind::Integer),
            Value::Text(_) => Some(ValueKind::Text),
            Value::Bytes(_) => Some(ValueKind::Bytes),
        }
    }

    /// Returns true if this value is null or of the given kind.
    #[must_use]
    pub fn conforms_to(&self, kind: ValueKind) -> bool {
        match self.kind() {
            None => true,
            Some(actual) => actual == kind,
        }
    }

    /// Returns the integer content, if any.
    #[must_use]
    pub fn as_integer(&self) -> Option<i64> {
        match self {
            Value::Integer(i) => Some(*i),
            _ => None,
        }
    }

    /// Returns the text content, if any.
    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "null"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Integer(i) => write!(f, "{i}"),
            Value::Text(s) => write!(f, "{s:?}"),
            Value::Bytes(b) => write!(f, "{} byte(s)", b.len()),
        }
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Bool(value)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::Integer(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::Text(value.to_owned())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::Text(value)
    }
}

impl From<Vec<u8>> for Value {
    fn from(value: Vec<u8>) -> Self {
        Value::Bytes(value)
    }
}

impl<T> From<Option<T>> for Value
where
    T: Into<Value>,
{
    fn from(value: Option<T>) -> Self {
        value.map_or(Value::Null, Into::into)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn null_has_no_kind() {
        assert!(Value::Null.is_null());
        assert_eq!(Value::Null.kind(), None);
    }

    #[test]
    fn kind_matches_variant() {
        assert_eq!(Value::Integer(1).kind(), Some(ValueKind::Integer));
        assert_eq!(Value::Text("a".into()).kind(), Some(ValueKind::Text));
        assert_eq!(Value::Bytes(vec![1]).kind(), Some(ValueKind::Bytes));
        assert_eq!(Value::Bool(true).kind(), Some(ValueKind::Bool));
    }

    #[test]
    fn null_conforms_to_every_kind() {
        assert!(Value::Null.conforms_to(ValueKind::Integer));
        assert!(Value::Null.conforms_to(ValueKind::Text));
    }

    #[test]
    fn conforms_rejects_other_kinds() {
        assert!(Value::Integer(1).conforms_to(ValueKind::Integer));
        assert!(!Value::Integer(1).conforms_to(ValueKind::Text));
    }

    #[test]
    fn structural_equality() {
        assert_eq!(Value::Text("x".into()), Value::from("x"));
        assert_ne!(Value::Integer(1), Value::Integer(2));
        assert_ne!(Value::Integer(1), Value::Null);
    }

    #[test]
    fn from_option() {
        assert_eq!(Value::from(None::<i64>), Value::Null);
        assert_eq!(Value::from(Some(3i64)), Value::Integer(3));
    }
}
