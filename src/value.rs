//! Driver-neutral scalar values
//!
//! Drivers speak [`Value`] in both directions: arguments are bound from it and
//! rows are decoded into it. Typed access goes through [`FromValue`].

use chrono::{DateTime, NaiveDateTime, Utc};
use uuid::Uuid;

use crate::error::{OrmError, Result};

/// A single SQL value, bound as a query argument or read from a row.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Value {
    #[default]
    Null,
    Int(i64),
    Float(f64),
    Bool(bool),
    String(String),
    Bytes(Vec<u8>),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Short type name for error messages.
    pub fn kind(&self) -> &'static str {
        match self {
            Value::Null => "NULL",
            Value::Int(_) => "INTEGER",
            Value::Float(_) => "REAL",
            Value::Bool(_) => "BOOLEAN",
            Value::String(_) => "TEXT",
            Value::Bytes(_) => "BLOB",
        }
    }

    /// Convert into a JSON value (bytes become an array of numbers).
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Value::Null => serde_json::Value::Null,
            Value::Int(i) => serde_json::Value::from(*i),
            Value::Float(f) => serde_json::Value::from(*f),
            Value::Bool(b) => serde_json::Value::from(*b),
            Value::String(s) => serde_json::Value::from(s.as_str()),
            Value::Bytes(b) => serde_json::Value::from(b.clone()),
        }
    }

    /// Typed read of this value.
    pub fn get<T: FromValue>(&self) -> Result<T> {
        T::from_value(self)
    }

    fn mismatch(&self, expected: &'static str) -> OrmError {
        OrmError::Conversion {
            expected,
            found: format!("{} ({:?})", self.kind(), self),
        }
    }
}

impl std::fmt::Display for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Value::Null => write!(f, "NULL"),
            Value::Int(i) => write!(f, "{i}"),
            Value::Float(v) => write!(f, "{v}"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::String(s) => write!(f, "{s}"),
            Value::Bytes(b) => write!(f, "<{} bytes>", b.len()),
        }
    }
}

// ============================================================================
// Into Value
// ============================================================================

macro_rules! int_into_value {
    ($($t:ty),*) => {
        $(impl From<$t> for Value {
            fn from(v: $t) -> Self {
                Value::Int(v as i64)
            }
        })*
    };
}

int_into_value!(i8, i16, i32, i64, u8, u16, u32, isize);

impl From<f32> for Value {
    fn from(v: f32) -> Self {
        Value::Float(v as f64)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::String(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::String(v.to_string())
    }
}

impl From<&String> for Value {
    fn from(v: &String) -> Self {
        Value::String(v.clone())
    }
}

impl From<Vec<u8>> for Value {
    fn from(v: Vec<u8>) -> Self {
        Value::Bytes(v)
    }
}

/// Timestamps are stored as RFC 3339 text.
impl From<DateTime<Utc>> for Value {
    fn from(v: DateTime<Utc>) -> Self {
        Value::String(v.to_rfc3339())
    }
}

impl From<Uuid> for Value {
    fn from(v: Uuid) -> Self {
        Value::String(v.to_string())
    }
}

impl From<serde_json::Value> for Value {
    fn from(v: serde_json::Value) -> Self {
        Value::String(v.to_string())
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(Value::Null)
    }
}

// ============================================================================
// From Value
// ============================================================================

/// Typed conversion out of a [`Value`].
pub trait FromValue: Sized {
    fn from_value(value: &Value) -> Result<Self>;
}

impl FromValue for Value {
    fn from_value(value: &Value) -> Result<Self> {
        Ok(value.clone())
    }
}

impl FromValue for i64 {
    fn from_value(value: &Value) -> Result<Self> {
        match value {
            Value::Int(i) => Ok(*i),
            Value::Bool(b) => Ok(*b as i64),
            Value::Float(f) if f.fract() == 0.0 => Ok(*f as i64),
            Value::String(s) => s.parse().map_err(|_| value.mismatch("i64")),
            _ => Err(value.mismatch("i64")),
        }
    }
}

impl FromValue for i32 {
    fn from_value(value: &Value) -> Result<Self> {
        let wide = i64::from_value(value)?;
        i32::try_from(wide).map_err(|_| value.mismatch("i32"))
    }
}

impl FromValue for u32 {
    fn from_value(value: &Value) -> Result<Self> {
        let wide = i64::from_value(value)?;
        u32::try_from(wide).map_err(|_| value.mismatch("u32"))
    }
}

impl FromValue for f64 {
    fn from_value(value: &Value) -> Result<Self> {
        match value {
            Value::Float(f) => Ok(*f),
            Value::Int(i) => Ok(*i as f64),
            Value::String(s) => s.parse().map_err(|_| value.mismatch("f64")),
            _ => Err(value.mismatch("f64")),
        }
    }
}

/// SQLite has no boolean storage class; integers 0/1 are accepted.
impl FromValue for bool {
    fn from_value(value: &Value) -> Result<Self> {
        match value {
            Value::Bool(b) => Ok(*b),
            Value::Int(0) => Ok(false),
            Value::Int(1) => Ok(true),
            _ => Err(value.mismatch("bool")),
        }
    }
}

impl FromValue for String {
    fn from_value(value: &Value) -> Result<Self> {
        match value {
            Value::String(s) => Ok(s.clone()),
            Value::Int(i) => Ok(i.to_string()),
            Value::Bytes(b) => String::from_utf8(b.clone()).map_err(|_| value.mismatch("String")),
            _ => Err(value.mismatch("String")),
        }
    }
}

impl FromValue for Vec<u8> {
    fn from_value(value: &Value) -> Result<Self> {
        match value {
            Value::Bytes(b) => Ok(b.clone()),
            Value::String(s) => Ok(s.as_bytes().to_vec()),
            _ => Err(value.mismatch("Vec<u8>")),
        }
    }
}

impl FromValue for DateTime<Utc> {
    fn from_value(value: &Value) -> Result<Self> {
        match value {
            Value::String(s) => DateTime::parse_from_rfc3339(s)
                .map(|dt| dt.with_timezone(&Utc))
                .or_else(|_| {
                    // SQLite's datetime('now') format
                    NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S").map(|n| n.and_utc())
                })
                .map_err(|_| value.mismatch("DateTime<Utc>")),
            Value::Int(secs) => {
                DateTime::from_timestamp(*secs, 0).ok_or_else(|| value.mismatch("DateTime<Utc>"))
            }
            _ => Err(value.mismatch("DateTime<Utc>")),
        }
    }
}

impl FromValue for Uuid {
    fn from_value(value: &Value) -> Result<Self> {
        match value {
            Value::String(s) => Uuid::parse_str(s).map_err(|_| value.mismatch("Uuid")),
            Value::Bytes(b) => Uuid::from_slice(b).map_err(|_| value.mismatch("Uuid")),
            _ => Err(value.mismatch("Uuid")),
        }
    }
}

impl FromValue for serde_json::Value {
    fn from_value(value: &Value) -> Result<Self> {
        match value {
            Value::String(s) => serde_json::from_str(s).map_err(|_| value.mismatch("json")),
            Value::Null => Ok(serde_json::Value::Null),
            other => Ok(other.to_json()),
        }
    }
}

impl<T: FromValue> FromValue for Option<T> {
    fn from_value(value: &Value) -> Result<Self> {
        match value {
            Value::Null => Ok(None),
            other => T::from_value(other).map(Some),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn test_sqlite_integer_booleans() {
        assert!(Value::Int(1).get::<bool>().unwrap());
        assert!(!Value::Int(0).get::<bool>().unwrap());
        assert_matches!(Value::Int(2).get::<bool>(), Err(OrmError::Conversion { .. }));
    }

    #[test]
    fn test_option_maps_null() {
        assert_eq!(Value::Null.get::<Option<String>>().unwrap(), None);
        assert_eq!(
            Value::from("x").get::<Option<String>>().unwrap(),
            Some("x".to_string())
        );
        assert_eq!(Value::from(None::<i64>), Value::Null);
    }

    #[test]
    fn test_timestamps_accept_both_text_formats() {
        let rfc = Value::from("2024-03-01T10:00:00+00:00").get::<DateTime<Utc>>().unwrap();
        let sqlite = Value::from("2024-03-01 10:00:00").get::<DateTime<Utc>>().unwrap();
        assert_eq!(rfc, sqlite);
    }

    #[test]
    fn test_narrowing_checks_range() {
        assert_eq!(Value::Int(42).get::<i32>().unwrap(), 42);
        assert_matches!(Value::Int(i64::MAX).get::<i32>(), Err(OrmError::Conversion { .. }));
    }
}
