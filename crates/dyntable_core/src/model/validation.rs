//! Client-correctable request failures.

use std::error::Error;
use std::fmt::{Display, Formatter};

/// Write operation a field set was filtered for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOperation {
    Insert,
    Update,
}

impl WriteOperation {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Insert => "insert",
            Self::Update => "update",
        }
    }
}

/// Request-level validation failure, detected before any mutating statement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// Table name is empty or does not carry the required prefix.
    InvalidTableName { name: String, prefix: String },
    /// No schema-known writable column survived filtering.
    EmptyFieldSet {
        table: String,
        operation: WriteOperation,
    },
    /// Request body is not a JSON object of scalar values.
    InvalidPayload(String),
    /// A field value cannot be represented as a native scalar.
    UnsupportedValue { field: String, reason: String },
    /// A key column named by the route is not part of the table.
    UnknownColumn { table: String, column: String },
    /// The table has no identity column to address rows by id.
    MissingIdentityColumn(String),
    /// A path identifier segment is not a 64-bit integer.
    InvalidIdentifier(String),
    /// An insert left a non-generated identity column without an integer value.
    IdentityNotProvided { table: String, column: String },
}

impl Display for ValidationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidTableName { name, prefix } => write!(
                f,
                "invalid table name `{name}`: table name must start with `{prefix}`"
            ),
            Self::EmptyFieldSet { table, operation } => write!(
                f,
                "no valid columns provided for {} on table `{table}`",
                operation.as_str()
            ),
            Self::InvalidPayload(message) => write!(f, "invalid payload: {message}"),
            Self::UnsupportedValue { field, reason } => {
                write!(f, "unsupported value for field `{field}`: {reason}")
            }
            Self::UnknownColumn { table, column } => {
                write!(f, "table `{table}` has no column `{column}`")
            }
            Self::MissingIdentityColumn(table) => {
                write!(f, "table `{table}` has no identity column")
            }
            Self::InvalidIdentifier(raw) => {
                write!(f, "invalid identifier `{raw}`: expected an integer")
            }
            Self::IdentityNotProvided { table, column } => write!(
                f,
                "table `{table}` does not generate `{column}`; provide an integer value"
            ),
        }
    }
}

impl Error for ValidationError {}
