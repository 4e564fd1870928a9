//! Wire-value coercion into native scalars and binding tags.
//!
//! # Responsibility
//! - Decide the parameter binding tag from the wire shape alone.
//! - Produce the native scalar a wire value is stored as.
//!
//! # Invariants
//! - Coercion never looks at the destination column; SQLite column affinity
//!   narrows the bound value at execution time.
//! - Numbers that parse as `i64` stay integral; everything else numeric is an
//!   exact decimal.

use crate::model::scalar::{Scalar, WireValue};
use crate::model::validation::ValidationError;
use rusqlite::types::{ToSql, ToSqlOutput};
use rust_decimal::Decimal;
use std::str::FromStr;

/// Binding type chosen from the wire shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NativeTypeTag {
    Text,
    Decimal,
    Boolean,
}

impl NativeTypeTag {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Decimal => "decimal",
            Self::Boolean => "boolean",
        }
    }
}

/// Returns the binding tag for `value`. `null` binds as text-compatible null.
pub fn type_of(value: &WireValue) -> NativeTypeTag {
    match value {
        WireValue::Text(_) | WireValue::Null => NativeTypeTag::Text,
        WireValue::Number(_) => NativeTypeTag::Decimal,
        WireValue::Bool(_) => NativeTypeTag::Boolean,
    }
}

/// Converts `value` into its native scalar.
///
/// # Errors
/// - `UnsupportedValue` when a number has no exact decimal representation.
pub fn native_value(field: &str, value: &WireValue) -> Result<Scalar, ValidationError> {
    match value {
        WireValue::Text(text) => Ok(Scalar::Text(text.clone())),
        WireValue::Bool(flag) => Ok(Scalar::Boolean(*flag)),
        WireValue::Null => Ok(Scalar::Null),
        WireValue::Number(number) => {
            if let Some(integer) = number.as_i64() {
                return Ok(Scalar::Integer(integer));
            }
            let text = number.to_string();
            Decimal::from_str(&text)
                .or_else(|_| Decimal::from_scientific(&text))
                .map(Scalar::Decimal)
                .map_err(|err| ValidationError::UnsupportedValue {
                    field: field.to_string(),
                    reason: format!("number `{text}` is not representable as decimal: {err}"),
                })
        }
    }
}

/// Native value paired with its binding tag.
#[derive(Debug, Clone, PartialEq)]
pub struct BoundValue {
    pub tag: NativeTypeTag,
    pub value: Scalar,
}

impl BoundValue {
    /// Coerces one wire field into a bindable parameter.
    pub fn from_wire(field: &str, value: &WireValue) -> Result<Self, ValidationError> {
        Ok(Self {
            tag: type_of(value),
            value: native_value(field, value)?,
        })
    }
}

impl ToSql for BoundValue {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        self.value.to_sql()
    }
}
