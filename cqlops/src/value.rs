//! Column values and typed extraction
use bytes::Bytes;
use chrono::{DateTime, Utc};
use uuid::Uuid;

/// A single column value, either bound into a statement or read back from a row
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Boolean(bool),
    Int(i32),
    BigInt(i64),
    Double(f64),
    Text(String),
    Blob(Bytes),
    Uuid(Uuid),
    Timestamp(DateTime<Utc>),
    List(Vec<Value>),
}

impl Value {
    /// Name of the CQL type held by this value, used in conversion errors
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Boolean(_) => "boolean",
            Self::Int(_) => "int",
            Self::BigInt(_) => "bigint",
            Self::Double(_) => "double",
            Self::Text(_) => "text",
            Self::Blob(_) => "blob",
            Self::Uuid(_) => "uuid",
            Self::Timestamp(_) => "timestamp",
            Self::List(_) => "list",
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }
}

macro_rules! value_from {
    ($($ty:ty => $variant:ident),* $(,)?) => {
        $(
            impl From<$ty> for Value {
                fn from(v: $ty) -> Self {
                    Self::$variant(v)
                }
            }
        )*
    };
}

value_from!(
    bool => Boolean,
    i32 => Int,
    i64 => BigInt,
    f64 => Double,
    String => Text,
    Bytes => Blob,
    Uuid => Uuid,
    DateTime<Utc> => Timestamp,
);

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Self::Text(v.to_owned())
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map_or(Self::Null, Into::into)
    }
}

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(v: Vec<T>) -> Self {
        Self::List(v.into_iter().map(Into::into).collect())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValueError {
    #[error("cannot read a {actual} value as {expected}")]
    TypeMismatch {
        expected: &'static str,
        actual: &'static str,
    },

    #[error("unexpected null where {expected} was required")]
    UnexpectedNull { expected: &'static str },

    #[error("column index {index} is out of bounds for a row with {len} columns")]
    IndexOutOfBounds { index: usize, len: usize },

    #[error("no column named '{name}'")]
    UnknownColumn { name: String },
}

/// Conversion from a borrowed [`Value`] into a Rust type
pub trait FromValue: Sized {
    fn from_value(value: &Value) -> Result<Self, ValueError>;
}

fn mismatch<T>(expected: &'static str, value: &Value) -> Result<T, ValueError> {
    match value {
        Value::Null => Err(ValueError::UnexpectedNull { expected }),
        other => Err(ValueError::TypeMismatch {
            expected,
            actual: other.type_name(),
        }),
    }
}

macro_rules! from_value {
    ($($ty:ty => $expected:literal { $($pat:pat => $conv:expr),+ $(,)? }),* $(,)?) => {
        $(
            impl FromValue for $ty {
                fn from_value(value: &Value) -> Result<Self, ValueError> {
                    match value {
                        $($pat => Ok($conv),)+
                        other => mismatch($expected, other),
                    }
                }
            }
        )*
    };
}

from_value!(
    bool => "boolean" { Value::Boolean(v) => *v },
    i32 => "int" { Value::Int(v) => *v },
    i64 => "bigint" { Value::BigInt(v) => *v, Value::Int(v) => i64::from(*v) },
    f64 => "double" { Value::Double(v) => *v },
    String => "text" { Value::Text(v) => v.clone() },
    Bytes => "blob" { Value::Blob(v) => v.clone() },
    Uuid => "uuid" { Value::Uuid(v) => *v },
    DateTime<Utc> => "timestamp" { Value::Timestamp(v) => *v },
);

impl FromValue for Value {
    fn from_value(value: &Value) -> Result<Self, ValueError> {
        Ok(value.clone())
    }
}

impl<T: FromValue> FromValue for Option<T> {
    fn from_value(value: &Value) -> Result<Self, ValueError> {
        match value {
            Value::Null => Ok(None),
            other => T::from_value(other).map(Some),
        }
    }
}

impl<T: FromValue> FromValue for Vec<T> {
    fn from_value(value: &Value) -> Result<Self, ValueError> {
        match value {
            Value::List(items) => items.iter().map(T::from_value).collect(),
            other => mismatch("list", other),
        }
    }
}
