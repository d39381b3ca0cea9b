//! Dynamically typed scalar values.
//!
//! [`Value`] is what blocks hand out from their type-erased accessors and what
//! predicates and bloom filters are evaluated against. Strings use `ArcStr` so
//! cloning a value read from a variable-width block is cheap.

use arcstr::ArcStr;
use serde::{Deserialize, Serialize};
use std::fmt;

use super::DataType;

/// A single (possibly null) column value.
///
/// # Examples
///
/// ```
/// use omnivec_common::types::{DataType, Value};
///
/// let v = Value::from(42i64);
/// assert_eq!(v.as_long(), Some(42));
/// assert_eq!(v.data_type(), Some(DataType::Long));
/// assert!(Value::Null.is_null());
/// ```
#[derive(Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    /// SQL NULL.
    Null,
    /// 8-bit integer.
    Byte(i8),
    /// 32-bit integer.
    Int(i32),
    /// 64-bit integer.
    Long(i64),
    /// 64-bit float.
    Double(f64),
    /// UTF-8 string.
    VarChar(ArcStr),
}

impl Value {
    /// Returns `true` if this value is null.
    #[inline]
    #[must_use]
    pub const fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Returns the byte if this is a Byte.
    #[inline]
    #[must_use]
    pub const fn as_byte(&self) -> Option<i8> {
        match self {
            Value::Byte(v) => Some(*v),
            _ => None,
        }
    }

    /// Returns the integer if this is an Int.
    #[inline]
    #[must_use]
    pub const fn as_int(&self) -> Option<i32> {
        match self {
            Value::Int(v) => Some(*v),
            _ => None,
        }
    }

    /// Returns the integer if this is a Long.
    #[inline]
    #[must_use]
    pub const fn as_long(&self) -> Option<i64> {
        match self {
            Value::Long(v) => Some(*v),
            _ => None,
        }
    }

    /// Returns the float if this is a Double.
    #[inline]
    #[must_use]
    pub const fn as_double(&self) -> Option<f64> {
        match self {
            Value::Double(v) => Some(*v),
            _ => None,
        }
    }

    /// Returns the string if this is a VarChar.
    #[inline]
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::VarChar(s) => Some(s),
            _ => None,
        }
    }

    /// Widens any integer value to `i64`.
    #[must_use]
    pub const fn as_integral(&self) -> Option<i64> {
        match self {
            Value::Byte(v) => Some(*v as i64),
            Value::Int(v) => Some(*v as i64),
            Value::Long(v) => Some(*v),
            _ => None,
        }
    }

    /// Returns the value as `f64` for any numeric type.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub const fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Byte(v) => Some(*v as f64),
            Value::Int(v) => Some(*v as f64),
            Value::Long(v) => Some(*v as f64),
            Value::Double(v) => Some(*v),
            _ => None,
        }
    }

    /// Returns the column type of this value, or `None` for null.
    #[must_use]
    pub const fn data_type(&self) -> Option<DataType> {
        match self {
            Value::Null => None,
            Value::Byte(_) => Some(DataType::Byte),
            Value::Int(_) => Some(DataType::Int),
            Value::Long(_) => Some(DataType::Long),
            Value::Double(_) => Some(DataType::Double),
            Value::VarChar(_) => Some(DataType::VarChar),
        }
    }

    /// Returns the type name of this value.
    #[must_use]
    pub const fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "NULL",
            Value::Byte(_) => "TINYINT",
            Value::Int(_) => "INTEGER",
            Value::Long(_) => "BIGINT",
            Value::Double(_) => "DOUBLE",
            Value::VarChar(_) => "VARCHAR",
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "Null"),
            Value::Byte(v) => write!(f, "Byte({v})"),
            Value::Int(v) => write!(f, "Int({v})"),
            Value::Long(v) => write!(f, "Long({v})"),
            Value::Double(v) => write!(f, "Double({v})"),
            Value::VarChar(s) => write!(f, "VarChar({s:?})"),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "NULL"),
            Value::Byte(v) => write!(f, "{v}"),
            Value::Int(v) => write!(f, "{v}"),
            Value::Long(v) => write!(f, "{v}"),
            Value::Double(v) => write!(f, "{v}"),
            Value::VarChar(s) => write!(f, "{s:?}"),
        }
    }
}

impl From<i8> for Value {
    fn from(v: i8) -> Self {
        Value::Byte(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Int(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Long(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Double(v)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::VarChar(s.into())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::VarChar(s.into())
    }
}

impl From<ArcStr> for Value {
    fn from(s: ArcStr) -> Self {
        Value::VarChar(s)
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
    fn test_accessors() {
        assert_eq!(Value::from(3i8).as_byte(), Some(3));
        assert_eq!(Value::from(3i8).as_long(), None);
        assert_eq!(Value::from(3i8).as_integral(), Some(3));
        assert_eq!(Value::from(7i32).as_f64(), Some(7.0));
        assert_eq!(Value::from("abc").as_str(), Some("abc"));
        assert_eq!(Value::from(None::<i64>), Value::Null);
        assert_eq!(Value::from(Some(2.5)).as_double(), Some(2.5));
    }

    #[test]
    fn test_data_type() {
        assert_eq!(Value::Null.data_type(), None);
        assert_eq!(Value::from("x").data_type(), Some(DataType::VarChar));
        assert_eq!(Value::from(1i64).type_name(), "BIGINT");
    }

    #[test]
    fn test_display() {
        assert_eq!(Value::Null.to_string(), "NULL");
        assert_eq!(Value::from("hi").to_string(), "\"hi\"");
        assert_eq!(format!("{:?}", Value::from(5i32)), "Int(5)");
    }
}
