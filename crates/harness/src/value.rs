//! Dynamic argument and result values

use crate::error::{HarnessError, Result};
use crate::handle::{ComObjectHandle, LocalObject};
use std::fmt;

/// An argument to or a result of a COM method call
#[derive(Clone, Debug, PartialEq)]
pub enum Value {
    /// No value, also a null interface pointer
    Empty,
    Bool(bool),
    I8(i8),
    U8(u8),
    I16(i16),
    U16(u16),
    I32(i32),
    U32(u32),
    I64(i64),
    U64(u64),
    F32(f32),
    F64(f64),
    Str(String),
    Struct(StructValue),
    /// A remote object
    Object(ComObjectHandle),
    /// An object hosted by the caller, passed as an `[in]` interface pointer
    Callback(LocalObject),
}

impl Value {
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Empty => "empty",
            Value::Bool(_) => "bool",
            Value::I8(_) => "i8",
            Value::U8(_) => "u8",
            Value::I16(_) => "i16",
            Value::U16(_) => "u16",
            Value::I32(_) => "i32",
            Value::U32(_) => "u32",
            Value::I64(_) => "i64",
            Value::U64(_) => "u64",
            Value::F32(_) => "f32",
            Value::F64(_) => "f64",
            Value::Str(_) => "string",
            Value::Struct(_) => "struct",
            Value::Object(_) => "object",
            Value::Callback(_) => "callback",
        }
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, Value::Empty)
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_struct(&self) -> Option<&StructValue> {
        match self {
            Value::Struct(s) => Some(s),
            _ => None,
        }
    }

    /// The struct inside, checking it is an `expected`.
    pub fn into_struct(self, expected: &str) -> Result<StructValue> {
        match self {
            Value::Struct(s) if s.name == expected => Ok(s),
            Value::Struct(s) => Err(HarnessError::type_mismatch(expected, s.name)),
            other => Err(HarnessError::type_mismatch(expected, other.type_name())),
        }
    }

    pub fn into_object(self) -> Result<ComObjectHandle> {
        match self {
            Value::Object(handle) => Ok(handle),
            other => Err(HarnessError::type_mismatch("object", other.type_name())),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Empty => f.write_str("(empty)"),
            Value::Bool(v) => write!(f, "{v}"),
            Value::I8(v) => write!(f, "{v}"),
            Value::U8(v) => write!(f, "{v}"),
            Value::I16(v) => write!(f, "{v}"),
            Value::U16(v) => write!(f, "{v}"),
            Value::I32(v) => write!(f, "{v}"),
            Value::U32(v) => write!(f, "{v}"),
            Value::I64(v) => write!(f, "{v}"),
            Value::U64(v) => write!(f, "{v}"),
            Value::F32(v) => write!(f, "{v}"),
            Value::F64(v) => write!(f, "{v}"),
            Value::Str(v) => write!(f, "{v:?}"),
            Value::Struct(v) => write!(f, "{v}"),
            Value::Object(handle) => write!(f, "{} {}", handle.interface_name(), handle.ipid()),
            Value::Callback(object) => write!(f, "callback {}", object.oid()),
        }
    }
}

/// A struct value, fields in declaration order
#[derive(Clone, Debug, PartialEq)]
pub struct StructValue {
    pub name: String,
    pub fields: Vec<(String, Value)>,
}

impl StructValue {
    pub fn new(name: impl Into<String>, fields: Vec<(String, Value)>) -> Self {
        Self { name: name.into(), fields }
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.fields.iter().find(|(name, _)| name == field).map(|(_, value)| value)
    }

    /// Move a field out, leaving `Value::Empty` behind.
    pub fn take(&mut self, field: &str) -> Result<Value> {
        self.fields
            .iter_mut()
            .find(|(name, _)| name == field)
            .map(|(_, value)| std::mem::replace(value, Value::Empty))
            .ok_or_else(|| HarnessError::MissingValue(format!("{}.{field}", self.name)))
    }
}

impl fmt::Display for StructValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {{", self.name)?;
        for (i, (name, value)) in self.fields.iter().enumerate() {
            let sep = if i == 0 { " " } else { ", " };
            write!(f, "{sep}{name}: {value}")?;
        }
        f.write_str(" }")
    }
}

macro_rules! impl_value_conversions {
    ($($ty:ty => $variant:ident),* $(,)?) => {
        $(
            impl From<$ty> for Value {
                fn from(v: $ty) -> Self {
                    Value::$variant(v)
                }
            }

            impl TryFrom<Value> for $ty {
                type Error = HarnessError;

                fn try_from(value: Value) -> Result<Self> {
                    match value {
                        Value::$variant(v) => Ok(v),
                        other => Err(HarnessError::type_mismatch(stringify!($ty), other.type_name())),
                    }
                }
            }
        )*
    };
}

impl_value_conversions! {
    bool => Bool,
    i8 => I8,
    u8 => U8,
    i16 => I16,
    u16 => U16,
    i32 => I32,
    u32 => U32,
    i64 => I64,
    u64 => U64,
    f32 => F32,
    f64 => F64,
    String => Str,
    StructValue => Struct,
    ComObjectHandle => Object,
    LocalObject => Callback,
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Str(v.to_string())
    }
}

impl From<&LocalObject> for Value {
    fn from(object: &LocalObject) -> Self {
        Value::Callback(object.clone())
    }
}

impl From<&ComObjectHandle> for Value {
    fn from(handle: &ComObjectHandle) -> Self {
        Value::Object(handle.clone())
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map_or(Value::Empty, Into::into)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn address() -> StructValue {
        StructValue::new(
            "Address",
            vec![
                ("Street".to_string(), Value::from("Suhms gate")),
                ("PostalCode".to_string(), Value::from("0363")),
                ("City".to_string(), Value::from("Oslo")),
            ],
        )
    }

    #[test]
    fn test_conversions() {
        let v: i32 = Value::I32(-4).try_into().unwrap();
        assert_eq!(v, -4);
        let s: String = Value::from("Oslo").try_into().unwrap();
        assert_eq!(s, "Oslo");

        let err = i32::try_from(Value::from("Oslo")).unwrap_err();
        assert_eq!(err.to_string(), "expected i32, found string");
        assert_eq!(Value::from(None::<i32>), Value::Empty);
    }

    #[test]
    fn test_struct_fields() {
        let mut value = address();
        assert_eq!(value.get("City"), Some(&Value::from("Oslo")));
        assert_eq!(value.take("Street").unwrap(), Value::from("Suhms gate"));
        assert_eq!(value.get("Street"), Some(&Value::Empty));
        assert!(matches!(value.take("Country"), Err(HarnessError::MissingValue(name)) if name == "Address.Country"));
    }

    #[test]
    fn test_into_struct_checks_name() {
        assert!(Value::Struct(address()).into_struct("Address").is_ok());
        let err = Value::Struct(address()).into_struct("Point").unwrap_err();
        assert_eq!(err.to_string(), "expected Point, found Address");
        assert!(Value::U8(1).into_struct("Address").is_err());
    }

    #[test]
    fn test_display() {
        assert_eq!(
            Value::Struct(address()).to_string(),
            r#"Address { Street: "Suhms gate", PostalCode: "0363", City: "Oslo" }"#
        );
    }
}
