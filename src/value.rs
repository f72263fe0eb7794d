//! Boxed values: the closed set of primitive kinds a record field may hold.

use std::fmt;

use rusqlite::types::{ToSql, ToSqlOutput, Type, ValueRef};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::schema::SqlType;

/// A date stored either as an epoch-like number or as text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SqlDate {
    Epoch(i64),
    Text(String),
}

impl fmt::Display for SqlDate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SqlDate::Epoch(v) => write!(f, "{}", v),
            SqlDate::Text(s) => f.write_str(s),
        }
    }
}

impl From<i64> for SqlDate {
    fn from(v: i64) -> Self {
        SqlDate::Epoch(v)
    }
}

impl From<&str> for SqlDate {
    fn from(v: &str) -> Self {
        SqlDate::Text(v.to_string())
    }
}

impl From<String> for SqlDate {
    fn from(v: String) -> Self {
        SqlDate::Text(v)
    }
}

/// Tag of a [`Value`], used to pick the binding and decoding path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ValueKind {
    Int32,
    Int64,
    Float64,
    Bool,
    Text,
    Date,
}

impl ValueKind {
    pub fn name(self) -> &'static str {
        match self {
            ValueKind::Int32 => "int32",
            ValueKind::Int64 => "int64",
            ValueKind::Float64 => "float64",
            ValueKind::Bool => "bool",
            ValueKind::Text => "text",
            ValueKind::Date => "date",
        }
    }

    /// Column type used when a field of this kind is declared without an
    /// explicit SQL type.
    pub fn sql_type(self) -> SqlType {
        match self {
            ValueKind::Int32 | ValueKind::Int64 | ValueKind::Bool => SqlType::Integer,
            ValueKind::Float64 => SqlType::Real,
            ValueKind::Text => SqlType::Text,
            ValueKind::Date => SqlType::Date,
        }
    }
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Core value type held by record fields and bound to statements.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    Int32(i32),
    Int64(i64),
    Float64(f64),
    Bool(bool),
    Text(String),
    Date(SqlDate),
}

impl Value {
    pub fn kind(&self) -> ValueKind {
        match self {
            Value::Int32(_) => ValueKind::Int32,
            Value::Int64(_) => ValueKind::Int64,
            Value::Float64(_) => ValueKind::Float64,
            Value::Bool(_) => ValueKind::Bool,
            Value::Text(_) => ValueKind::Text,
            Value::Date(_) => ValueKind::Date,
        }
    }

    /// Render the value as SQL literal text.
    ///
    /// Text is passed through unquoted, text dates are wrapped in
    /// `DATETIME('...')` and booleans become `0`/`1`.
    pub fn render(&self) -> String {
        match self {
            Value::Int32(v) => v.to_string(),
            Value::Int64(v) => v.to_string(),
            Value::Float64(v) => v.to_string(),
            Value::Bool(v) => (if *v { "1" } else { "0" }).to_string(),
            Value::Text(s) => s.clone(),
            Value::Date(SqlDate::Epoch(v)) => v.to_string(),
            Value::Date(SqlDate::Text(s)) => format!("DATETIME('{}')", s),
        }
    }

    pub fn as_i32(&self) -> Option<i32> {
        match self {
            Value::Int32(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int64(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Float64(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_date(&self) -> Option<&SqlDate> {
        match self {
            Value::Date(d) => Some(d),
            _ => None,
        }
    }

    /// Decode a result column into a value of the given kind.
    pub(crate) fn decode(field: &str, kind: ValueKind, raw: ValueRef<'_>) -> Result<Value> {
        let unknown = || Error::UnknownFieldType {
            field: field.to_string(),
            found: raw.data_type().to_string(),
        };
        let value = match (kind, raw) {
            (ValueKind::Int32, ValueRef::Integer(v)) => {
                Value::Int32(i32::try_from(v).map_err(|_| unknown())?)
            }
            (ValueKind::Int64, ValueRef::Integer(v)) => Value::Int64(v),
            (ValueKind::Float64, ValueRef::Real(v)) => Value::Float64(v),
            (ValueKind::Float64, ValueRef::Integer(v)) => Value::Float64(v as f64),
            (ValueKind::Bool, ValueRef::Integer(v)) => Value::Bool(v != 0),
            (ValueKind::Text, ValueRef::Text(bytes)) => {
                Value::Text(std::str::from_utf8(bytes).map_err(|_| unknown())?.to_string())
            }
            (ValueKind::Date, ValueRef::Integer(v)) => Value::Date(SqlDate::Epoch(v)),
            (ValueKind::Date, ValueRef::Text(bytes)) => Value::Date(SqlDate::Text(
                std::str::from_utf8(bytes).map_err(|_| unknown())?.to_string(),
            )),
            _ => return Err(unknown()),
        };
        Ok(value)
    }
}

impl ToSql for Value {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(match self {
            Value::Int32(v) => ToSqlOutput::from(*v),
            Value::Int64(v) => ToSqlOutput::from(*v),
            Value::Float64(v) => ToSqlOutput::from(*v),
            Value::Bool(v) => ToSqlOutput::from(*v),
            Value::Text(s) => ToSqlOutput::Borrowed(ValueRef::Text(s.as_bytes())),
            Value::Date(SqlDate::Epoch(v)) => ToSqlOutput::from(*v),
            Value::Date(SqlDate::Text(s)) => ToSqlOutput::Borrowed(ValueRef::Text(s.as_bytes())),
        })
    }
}

impl TryFrom<rusqlite::types::Value> for Value {
    type Error = Error;

    fn try_from(value: rusqlite::types::Value) -> Result<Self> {
        use rusqlite::types::Value as Raw;
        match value {
            Raw::Integer(v) => Ok(Value::Int64(v)),
            Raw::Real(v) => Ok(Value::Float64(v)),
            Raw::Text(s) => Ok(Value::Text(s)),
            Raw::Null => Err(Error::UnsupportedType(Type::Null.to_string())),
            Raw::Blob(_) => Err(Error::UnsupportedType(Type::Blob.to_string())),
        }
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Int32(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int64(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float64(v)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
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

impl From<SqlDate> for Value {
    fn from(v: SqlDate) -> Self {
        Value::Date(v)
    }
}
