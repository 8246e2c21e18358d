//! Language-side semantic values.
//!
//! Every native value that crosses the bridge is decoded into one of the
//! variants below. Integer widths collapse into [`Value::Int`], floating point
//! widths into [`Value::Float`], and both timestamp flavours into
//! [`Value::Timestamp`].

use crate::native::NativeObject;
use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// The semantic type of a [`Value`].
///
/// This is the "language type" key of the type registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ValueType {
    Null,
    Bool,
    Int,
    Float,
    Decimal,
    Text,
    Bytes,
    Date,
    Time,
    Timestamp,
    Object,
}

impl ValueType {
    /// All semantic types, in registration order.
    pub const ALL: [ValueType; 11] = [
        ValueType::Object,
        ValueType::Null,
        ValueType::Bool,
        ValueType::Text,
        ValueType::Bytes,
        ValueType::Int,
        ValueType::Float,
        ValueType::Date,
        ValueType::Time,
        ValueType::Timestamp,
        ValueType::Decimal,
    ];

    /// Uppercase registry name of this type.
    pub const fn name(self) -> &'static str {
        match self {
            ValueType::Null => "NULL",
            ValueType::Bool => "BOOL",
            ValueType::Int => "INT",
            ValueType::Float => "FLOAT",
            ValueType::Decimal => "DECIMAL",
            ValueType::Text => "TEXT",
            ValueType::Bytes => "BYTES",
            ValueType::Date => "DATE",
            ValueType::Time => "TIME",
            ValueType::Timestamp => "TIMESTAMP",
            ValueType::Object => "OBJECT",
        }
    }

    /// Look a type up by name, ignoring case.
    pub fn from_name(name: &str) -> Option<Self> {
        let upper = name.trim().to_ascii_uppercase();
        Self::ALL.into_iter().find(|t| t.name() == upper)
    }
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A decoded, language-side value.
#[derive(Debug, Clone)]
pub enum Value {
    /// SQL NULL
    Null,

    /// Boolean value
    Bool(bool),

    /// Any native integer width
    Int(i64),

    /// Any native floating point width
    Float(f64),

    /// Arbitrary precision decimal
    Decimal(Decimal),

    /// Text, including large-text native types
    Text(String),

    /// Binary data, including large-binary native types
    Bytes(Vec<u8>),

    /// Calendar date
    Date(NaiveDate),

    /// Time of day
    Time(NaiveTime),

    /// Timestamp; offsets are normalised to UTC on decode
    Timestamp(NaiveDateTime),

    /// An opaque native object passed through untouched
    Object(Arc<dyn NativeObject>),
}

impl Value {
    /// Check if this value is NULL.
    pub const fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// The semantic type of this value.
    pub const fn value_type(&self) -> ValueType {
        match self {
            Value::Null => ValueType::Null,
            Value::Bool(_) => ValueType::Bool,
            Value::Int(_) => ValueType::Int,
            Value::Float(_) => ValueType::Float,
            Value::Decimal(_) => ValueType::Decimal,
            Value::Text(_) => ValueType::Text,
            Value::Bytes(_) => ValueType::Bytes,
            Value::Date(_) => ValueType::Date,
            Value::Time(_) => ValueType::Time,
            Value::Timestamp(_) => ValueType::Timestamp,
            Value::Object(_) => ValueType::Object,
        }
    }

    /// Get the type name of this value.
    pub const fn type_name(&self) -> &'static str {
        self.value_type().name()
    }

    /// Try to convert this value to a bool.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(v) => Some(*v),
            Value::Int(v) => Some(*v != 0),
            _ => None,
        }
    }

    /// Try to convert this value to an i64.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(v) => Some(*v),
            Value::Bool(v) => Some(if *v { 1 } else { 0 }),
            Value::Decimal(d) if d.fract().is_zero() => d.to_i64(),
            _ => None,
        }
    }

    /// Try to convert this value to an f64.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Float(v) => Some(*v),
            Value::Int(v) => Some(*v as f64),
            Value::Decimal(d) => d.to_f64(),
            _ => None,
        }
    }

    /// Try to get this value as a decimal.
    pub fn as_decimal(&self) -> Option<Decimal> {
        match self {
            Value::Decimal(d) => Some(*d),
            Value::Int(v) => Some(Decimal::from(*v)),
            Value::Float(v) => Decimal::try_from(*v).ok(),
            _ => None,
        }
    }

    /// Try to get this value as a string reference.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Try to get this value as a byte slice.
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Value::Bytes(b) => Some(b),
            _ => None,
        }
    }

    pub fn as_date(&self) -> Option<NaiveDate> {
        match self {
            Value::Date(d) => Some(*d),
            Value::Timestamp(ts) => Some(ts.date()),
            _ => None,
        }
    }

    pub fn as_time(&self) -> Option<NaiveTime> {
        match self {
            Value::Time(t) => Some(*t),
            _ => None,
        }
    }

    pub fn as_timestamp(&self) -> Option<NaiveDateTime> {
        match self {
            Value::Timestamp(ts) => Some(*ts),
            Value::Date(d) => d.and_hms_opt(0, 0, 0),
            _ => None,
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
            (Value::Decimal(a), Value::Decimal(b)) => a == b,
            (Value::Text(a), Value::Text(b)) => a == b,
            (Value::Bytes(a), Value::Bytes(b)) => a == b,
            (Value::Date(a), Value::Date(b)) => a == b,
            (Value::Time(a), Value::Time(b)) => a == b,
            (Value::Timestamp(a), Value::Timestamp(b)) => a == b,
            // Native objects have identity, not structural equality
            (Value::Object(a), Value::Object(b)) => {
                std::ptr::addr_eq(Arc::as_ptr(a), Arc::as_ptr(b))
            }
            _ => false,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => f.write_str("NULL"),
            Value::Bool(v) => write!(f, "{}", v),
            Value::Int(v) => write!(f, "{}", v),
            Value::Float(v) => write!(f, "{}", v),
            Value::Decimal(v) => write!(f, "{}", v),
            Value::Text(v) => f.write_str(v),
            Value::Bytes(v) => write!(f, "[BLOB: {} bytes]", v.len()),
            Value::Date(v) => write!(f, "{}", v),
            Value::Time(v) => write!(f, "{}", v),
            Value::Timestamp(v) => write!(f, "{}", v),
            Value::Object(v) => write!(f, "<{}>", v.class_name()),
        }
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<i8> for Value {
    fn from(v: i8) -> Self {
        Value::Int(i64::from(v))
    }
}

impl From<i16> for Value {
    fn from(v: i16) -> Self {
        Value::Int(i64::from(v))
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Int(i64::from(v))
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<u8> for Value {
    fn from(v: u8) -> Self {
        Value::Int(i64::from(v))
    }
}

impl From<u16> for Value {
    fn from(v: u16) -> Self {
        Value::Int(i64::from(v))
    }
}

impl From<u32> for Value {
    fn from(v: u32) -> Self {
        Value::Int(i64::from(v))
    }
}

impl From<f32> for Value {
    fn from(v: f32) -> Self {
        Value::Float(f64::from(v))
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<Decimal> for Value {
    fn from(v: Decimal) -> Self {
        Value::Decimal(v)
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Text(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Text(v.to_string())
    }
}

impl From<Vec<u8>> for Value {
    fn from(v: Vec<u8>) -> Self {
        Value::Bytes(v)
    }
}

impl From<&[u8]> for Value {
    fn from(v: &[u8]) -> Self {
        Value::Bytes(v.to_vec())
    }
}

impl From<NaiveDate> for Value {
    fn from(v: NaiveDate) -> Self {
        Value::Date(v)
    }
}

impl From<NaiveTime> for Value {
    fn from(v: NaiveTime) -> Self {
        Value::Time(v)
    }
}

impl From<NaiveDateTime> for Value {
    fn from(v: NaiveDateTime) -> Self {
        Value::Timestamp(v)
    }
}

impl From<Arc<dyn NativeObject>> for Value {
    fn from(v: Arc<dyn NativeObject>) -> Self {
        Value::Object(v)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map_or(Value::Null, Into::into)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_value_type_names_are_uppercase_and_unique() {
        let mut names: Vec<&str> = ValueType::ALL.iter().map(|t| t.name()).collect();
        for name in &names {
            assert_eq!(*name, name.to_ascii_uppercase());
        }
        names.sort_unstable();
        names.dedup();
        assert_eq!(names.len(), ValueType::ALL.len());
    }

    #[test]
    fn test_value_type_from_name_ignores_case() {
        assert_eq!(ValueType::from_name("int"), Some(ValueType::Int));
        assert_eq!(ValueType::from_name(" Timestamp "), Some(ValueType::Timestamp));
        assert_eq!(ValueType::from_name("varchar"), None);
    }

    #[test]
    fn test_integer_widths_collapse() {
        assert_eq!(Value::from(7_i8), Value::Int(7));
        assert_eq!(Value::from(7_i16), Value::Int(7));
        assert_eq!(Value::from(7_i32), Value::Int(7));
        assert_eq!(Value::from(7_u32).value_type(), ValueType::Int);
        assert_eq!(Value::from(1.5_f32), Value::Float(1.5));
    }

    #[test]
    fn test_option_into_value() {
        assert_eq!(Value::from(None::<i64>), Value::Null);
        assert_eq!(Value::from(Some("x")), Value::Text("x".to_string()));
    }

    #[test]
    fn test_accessors() {
        assert_eq!(Value::Int(1).as_bool(), Some(true));
        assert_eq!(Value::Bool(true).as_i64(), Some(1));
        assert_eq!(Value::Decimal(Decimal::new(250, 2)).as_f64(), Some(2.5));
        assert_eq!(Value::Decimal(Decimal::new(300, 2)).as_i64(), Some(3));
        assert_eq!(Value::Text("a".into()).as_i64(), None);

        let date = NaiveDate::from_ymd_opt(2024, 2, 29).unwrap();
        let midnight = date.and_hms_opt(0, 0, 0).unwrap();
        assert_eq!(Value::Date(date).as_timestamp(), Some(midnight));
        assert_eq!(Value::Timestamp(midnight).as_date(), Some(date));
    }

    #[test]
    fn test_display() {
        assert_eq!(Value::Null.to_string(), "NULL");
        assert_eq!(Value::Bytes(vec![1, 2, 3]).to_string(), "[BLOB: 3 bytes]");
        assert_eq!(Value::Text("hi".into()).to_string(), "hi");
    }
}
