//! Tagged scalar values and their wire-side counterparts.
//!
//! # Responsibility
//! - `Scalar`: native value of one column in a dynamic record.
//! - `WireValue`: loosely-typed value as it arrived in a request body.
//!
//! # Invariants
//! - Decimals are exact (`rust_decimal`) in storage and parameter binding;
//!   floats never enter a `Scalar`.
//! - Serialized decimals are JSON numbers written as `f64`, so JSON output
//!   keeps at most 15 significant digits. Wider values are rounded there.

use crate::model::validation::ValidationError;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use rusqlite::types::{ToSql, ToSqlOutput, Value, ValueRef};
use serde::ser::{Serialize, Serializer};

/// Native value of a single column.
#[derive(Debug, Clone, PartialEq)]
pub enum Scalar {
    Text(String),
    Integer(i64),
    Decimal(Decimal),
    Boolean(bool),
    Null,
}

impl Scalar {
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Short storage-class name used in log records.
    pub fn kind_str(&self) -> &'static str {
        match self {
            Self::Text(_) => "text",
            Self::Integer(_) => "integer",
            Self::Decimal(_) => "decimal",
            Self::Boolean(_) => "boolean",
            Self::Null => "null",
        }
    }
}

impl From<i64> for Scalar {
    fn from(value: i64) -> Self {
        Self::Integer(value)
    }
}

impl From<&str> for Scalar {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<Decimal> for Scalar {
    fn from(value: Decimal) -> Self {
        Self::Decimal(value)
    }
}

impl From<bool> for Scalar {
    fn from(value: bool) -> Self {
        Self::Boolean(value)
    }
}

impl Serialize for Scalar {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Text(value) => serializer.serialize_str(value),
            Self::Integer(value) => serializer.serialize_i64(*value),
            Self::Decimal(value) => match value.to_f64() {
                Some(float) if float.is_finite() => serializer.serialize_f64(float),
                _ => serializer.serialize_str(&value.to_string()),
            },
            Self::Boolean(value) => serializer.serialize_bool(*value),
            Self::Null => serializer.serialize_none(),
        }
    }
}

impl ToSql for Scalar {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(match self {
            Self::Text(value) => ToSqlOutput::Borrowed(ValueRef::Text(value.as_bytes())),
            Self::Integer(value) => ToSqlOutput::Owned(Value::Integer(*value)),
            // Textual form lets column affinity pick INTEGER/REAL/TEXT storage
            // without a lossy trip through f64.
            Self::Decimal(value) => ToSqlOutput::Owned(Value::Text(value.to_string())),
            Self::Boolean(value) => ToSqlOutput::Owned(Value::Integer(i64::from(*value))),
            Self::Null => ToSqlOutput::Owned(Value::Null),
        })
    }
}

/// Value shape accepted in a request body field.
#[derive(Debug, Clone, PartialEq)]
pub enum WireValue {
    Text(String),
    Number(serde_json::Number),
    Bool(bool),
    Null,
}

impl WireValue {
    /// Converts one JSON field value; arrays and objects are rejected.
    pub fn from_json(field: &str, value: serde_json::Value) -> Result<Self, ValidationError> {
        match value {
            serde_json::Value::String(text) => Ok(Self::Text(text)),
            serde_json::Value::Number(number) => Ok(Self::Number(number)),
            serde_json::Value::Bool(flag) => Ok(Self::Bool(flag)),
            serde_json::Value::Null => Ok(Self::Null),
            serde_json::Value::Array(_) => Err(ValidationError::UnsupportedValue {
                field: field.to_string(),
                reason: "arrays are not column values".to_string(),
            }),
            serde_json::Value::Object(_) => Err(ValidationError::UnsupportedValue {
                field: field.to_string(),
                reason: "objects are not column values".to_string(),
            }),
        }
    }
}
