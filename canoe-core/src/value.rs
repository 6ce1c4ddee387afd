//! Remote-compatible value model.
//!
//! [`Value`] is what crosses the automation boundary: every property read
//! produces one and every write or method call consumes them.  [`FromValue`]
//! translates a [`Value`] into a native semantic type (boolean, integer,
//! float, string, byte sequence), failing with
//! [`CanoeError::InvalidArgument`] when the remote type does not fit.

use std::fmt;

use serde::ser::{Serialize, SerializeSeq, Serializer};

use crate::errors::{CanoeError, Result};
use crate::proxy::Handle;

/// A value as exchanged with the remote automation interface.
#[derive(Clone, Debug, Default)]
pub enum Value {
    /// No value (`VT_EMPTY` / `VT_NULL`, or a method without a result).
    #[default]
    Empty,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    /// Byte sequence (`VT_ARRAY | VT_UI1`), e.g. diagnostic streams.
    Bytes(Vec<u8>),
    /// Any other one-dimensional array.
    Array(Vec<Value>),
    /// A child automation object.
    Object(Handle),
}

impl Value {
    /// Short type name for diagnostics.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Empty => "empty",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::Str(_) => "str",
            Value::Bytes(_) => "bytes",
            Value::Array(_) => "array",
            Value::Object(_) => "object",
        }
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, Value::Empty)
    }

    /// Convert `self` to the remote type of `template`.
    ///
    /// Used before writing a variable whose current value fixes the type the
    /// server expects (an integer variable rejects `"3"`, a float variable
    /// accepts `3`).
    pub fn coerce_like(&self, template: &Value) -> Result<Value> {
        let mismatch = || {
            CanoeError::InvalidArgument(format!(
                "cannot convert {} value {self} to {}",
                self.type_name(),
                template.type_name()
            ))
        };

        match template {
            Value::Bool(_) => bool::from_value(self.clone()).map(Value::Bool),
            Value::Int(_) => match self {
                Value::Float(f) if f.fract() == 0.0 => Ok(Value::Int(*f as i64)),
                Value::Str(s) => s.trim().parse::<i64>().map(Value::Int).map_err(|_| mismatch()),
                other => i64::from_value(other.clone()).map(Value::Int).map_err(|_| mismatch()),
            },
            Value::Float(_) => match self {
                Value::Str(s) => s.trim().parse::<f64>().map(Value::Float).map_err(|_| mismatch()),
                other => f64::from_value(other.clone()).map(Value::Float).map_err(|_| mismatch()),
            },
            Value::Str(_) => match self {
                Value::Str(_) => Ok(self.clone()),
                Value::Bytes(_) | Value::Array(_) | Value::Object(_) | Value::Empty => Err(mismatch()),
                scalar => Ok(Value::Str(scalar.to_string())),
            },
            Value::Bytes(_) => match self {
                Value::Bytes(_) => Ok(self.clone()),
                Value::Array(items) => items
                    .iter()
                    .map(|v| u8::from_value(v.clone()))
                    .collect::<Result<Vec<u8>>>()
                    .map(Value::Bytes)
                    .map_err(|_| mismatch()),
                _ => Err(mismatch()),
            },
            Value::Array(existing) => {
                let items: Vec<Value> = match self {
                    Value::Array(items) => items.clone(),
                    Value::Bytes(bytes) => bytes.iter().map(|&b| Value::Int(b as i64)).collect(),
                    _ => return Err(mismatch()),
                };
                match existing.first() {
                    Some(elem) => items
                        .iter()
                        .map(|v| v.coerce_like(elem))
                        .collect::<Result<Vec<_>>>()
                        .map(Value::Array),
                    None => Ok(Value::Array(items)),
                }
            }
            Value::Empty | Value::Object(_) => Ok(self.clone()),
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Empty, Value::Empty) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a == b,
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::Bytes(a), Value::Bytes(b)) => a == b,
            (Value::Array(a), Value::Array(b)) => a == b,
            (Value::Object(a), Value::Object(b)) => a.ptr_eq(b),
            _ => false,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Empty => f.write_str("<empty>"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Int(i) => write!(f, "{i}"),
            Value::Float(x) => write!(f, "{x}"),
            Value::Str(s) => f.write_str(s),
            Value::Bytes(bytes) => {
                let hex: Vec<String> = bytes.iter().map(|b| format!("{b:02X}")).collect();
                f.write_str(&hex.join(" "))
            }
            Value::Array(items) => {
                f.write_str("(")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{item}")?;
                }
                f.write_str(")")
            }
            Value::Object(_) => f.write_str("<object>"),
        }
    }
}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Value::Empty | Value::Object(_) => serializer.serialize_none(),
            Value::Bool(b) => serializer.serialize_bool(*b),
            Value::Int(i) => serializer.serialize_i64(*i),
            Value::Float(x) => serializer.serialize_f64(*x),
            Value::Str(s) => serializer.serialize_str(s),
            Value::Bytes(bytes) => {
                let mut seq = serializer.serialize_seq(Some(bytes.len()))?;
                for b in bytes {
                    seq.serialize_element(b)?;
                }
                seq.end()
            }
            Value::Array(items) => {
                let mut seq = serializer.serialize_seq(Some(items.len()))?;
                for item in items {
                    seq.serialize_element(item)?;
                }
                seq.end()
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Native -> Value
// ---------------------------------------------------------------------------

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

macro_rules! value_from_int {
    ($($ty:ty),*) => {
        $(impl From<$ty> for Value {
            fn from(v: $ty) -> Self {
                Value::Int(v as i64)
            }
        })*
    };
}

value_from_int!(i8, i16, i32, i64, u8, u16, u32, usize);

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

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Str(v.to_owned())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Str(v)
    }
}

impl From<&[u8]> for Value {
    fn from(v: &[u8]) -> Self {
        Value::Bytes(v.to_vec())
    }
}

impl From<Vec<u8>> for Value {
    fn from(v: Vec<u8>) -> Self {
        Value::Bytes(v)
    }
}

impl From<Vec<Value>> for Value {
    fn from(v: Vec<Value>) -> Self {
        Value::Array(v)
    }
}

impl From<Handle> for Value {
    fn from(v: Handle) -> Self {
        Value::Object(v)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(Value::Empty)
    }
}

// ---------------------------------------------------------------------------
// Value -> Native
// ---------------------------------------------------------------------------

/// Conversion from a remote [`Value`] into a native type.
pub trait FromValue: Sized {
    fn from_value(value: Value) -> Result<Self>;
}

fn type_mismatch<T>(expected: &str, got: &Value) -> Result<T> {
    Err(CanoeError::InvalidArgument(format!(
        "expected {expected}, remote returned {}",
        got.type_name()
    )))
}

impl FromValue for Value {
    fn from_value(value: Value) -> Result<Self> {
        Ok(value)
    }
}

impl FromValue for bool {
    fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Bool(b) => Ok(b),
            Value::Int(i) => Ok(i != 0),
            other => type_mismatch("bool", &other),
        }
    }
}

impl FromValue for i64 {
    fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Int(i) => Ok(i),
            Value::Bool(b) => Ok(b as i64),
            other => type_mismatch("integer", &other),
        }
    }
}

macro_rules! from_value_narrow_int {
    ($($ty:ty),*) => {
        $(impl FromValue for $ty {
            fn from_value(value: Value) -> Result<Self> {
                let wide = i64::from_value(value)?;
                <$ty>::try_from(wide).map_err(|_| {
                    CanoeError::InvalidArgument(format!(
                        "integer {wide} out of range for {}",
                        stringify!($ty)
                    ))
                })
            }
        })*
    };
}

from_value_narrow_int!(i32, u8, u16, u32, usize);

impl FromValue for f64 {
    fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Float(x) => Ok(x),
            Value::Int(i) => Ok(i as f64),
            other => type_mismatch("float", &other),
        }
    }
}

impl FromValue for String {
    fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Str(s) => Ok(s),
            Value::Empty => Ok(String::new()),
            other => type_mismatch("string", &other),
        }
    }
}

impl FromValue for Vec<u8> {
    fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Bytes(b) => Ok(b),
            Value::Array(items) => items.into_iter().map(u8::from_value).collect(),
            Value::Empty => Ok(Vec::new()),
            other => type_mismatch("byte sequence", &other),
        }
    }
}

impl FromValue for Vec<Value> {
    fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Array(items) => Ok(items),
            Value::Bytes(b) => Ok(b.into_iter().map(|x| Value::Int(x as i64)).collect()),
            Value::Empty => Ok(Vec::new()),
            other => type_mismatch("array", &other),
        }
    }
}

impl FromValue for Vec<i64> {
    fn from_value(value: Value) -> Result<Self> {
        Vec::<Value>::from_value(value)?
            .into_iter()
            .map(i64::from_value)
            .collect()
    }
}

impl FromValue for Handle {
    fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Object(h) => Ok(h),
            Value::Empty => Err(CanoeError::NotFound("remote returned no object".into())),
            other => type_mismatch("object", &other),
        }
    }
}

impl<T: FromValue> FromValue for Option<T> {
    fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Empty => Ok(None),
            other => T::from_value(other).map(Some),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_value_accepts_compatible_types() {
        assert!(bool::from_value(Value::Int(1)).unwrap());
        assert_eq!(f64::from_value(Value::Int(3)).unwrap(), 3.0);
        assert_eq!(i32::from_value(Value::Int(-7)).unwrap(), -7);
        assert_eq!(String::from_value(Value::Empty).unwrap(), "");
    }

    #[test]
    fn test_from_value_rejects_mismatch() {
        let err = i64::from_value(Value::Str("x".into())).unwrap_err();
        assert!(matches!(err, CanoeError::InvalidArgument(_)));
        assert!(u8::from_value(Value::Int(300)).is_err());
    }

    #[test]
    fn test_coerce_like_follows_template_type() {
        let int_template = Value::Int(0);
        assert_eq!(Value::Str("42".into()).coerce_like(&int_template).unwrap(), Value::Int(42));
        assert_eq!(Value::Float(5.0).coerce_like(&int_template).unwrap(), Value::Int(5));
        assert!(Value::Float(5.5).coerce_like(&int_template).is_err());

        let float_template = Value::Float(0.0);
        assert_eq!(Value::Int(2).coerce_like(&float_template).unwrap(), Value::Float(2.0));

        let str_template = Value::Str(String::new());
        assert_eq!(Value::Int(9).coerce_like(&str_template).unwrap(), Value::Str("9".into()));
    }

    #[test]
    fn test_coerce_like_array_uses_element_type() {
        let template = Value::Array(vec![Value::Float(0.0)]);
        let coerced = Value::Array(vec![Value::Int(1), Value::Int(2)])
            .coerce_like(&template)
            .unwrap();
        assert_eq!(coerced, Value::Array(vec![Value::Float(1.0), Value::Float(2.0)]));
    }

    #[test]
    fn test_bytes_display_is_spaced_hex() {
        assert_eq!(Value::Bytes(vec![0x50, 0x01, 0xff]).to_string(), "50 01 FF");
    }

    #[test]
    fn test_value_serialization() {
        let json = serde_json::to_string(&Value::Array(vec![Value::Int(1), Value::Empty])).unwrap();
        assert_eq!(json, "[1,null]");
    }
}
