//! SQLite connection bootstrap and execution-failure classification.
//!
//! # Responsibility
//! - Open and configure SQLite connections for one request round trip.
//! - Classify driver failures so callers can differentiate client-visible
//!   behavior without parsing messages themselves.
//!
//! # Invariants
//! - Every returned connection has `foreign_keys=ON` and a busy timeout.
//! - Classification never inspects bound values, only result codes and the
//!   driver message.

use rusqlite::ErrorCode;
use std::error::Error;
use std::fmt::{Display, Formatter};

mod open;

pub use open::{open_db, open_db_in_memory, DEFAULT_BUSY_TIMEOUT};

pub type DbResult<T> = Result<T, DbError>;

/// Coarse category of a failed database round trip.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionKind {
    /// Constraint violation (NOT NULL, UNIQUE, FOREIGN KEY, CHECK).
    Constraint,
    /// Lock contention outlasted the busy timeout, or the call was interrupted.
    Timeout,
    /// The database file could not be opened or read.
    Connectivity,
    /// The statement referenced a table/column that no longer matches the catalog.
    Schema,
    /// Anything else.
    Other,
}

impl ExecutionKind {
    /// Stable string id used in log records and error bodies.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Constraint => "constraint",
            Self::Timeout => "timeout",
            Self::Connectivity => "connectivity",
            Self::Schema => "schema",
            Self::Other => "other",
        }
    }
}

#[derive(Debug)]
pub enum DbError {
    Sqlite(rusqlite::Error),
}

impl DbError {
    /// Classifies this failure by SQLite result code.
    pub fn kind(&self) -> ExecutionKind {
        match self {
            Self::Sqlite(err) => classify_sqlite_error(err),
        }
    }
}

impl Display for DbError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Sqlite(err) => write!(f, "{err}"),
        }
    }
}

impl Error for DbError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Sqlite(err) => Some(err),
        }
    }
}

impl From<rusqlite::Error> for DbError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Sqlite(value)
    }
}

fn classify_sqlite_error(err: &rusqlite::Error) -> ExecutionKind {
    match err {
        rusqlite::Error::SqliteFailure(failure, message) => match failure.code {
            ErrorCode::ConstraintViolation => ExecutionKind::Constraint,
            ErrorCode::DatabaseBusy
            | ErrorCode::DatabaseLocked
            | ErrorCode::OperationInterrupted => ExecutionKind::Timeout,
            ErrorCode::CannotOpen
            | ErrorCode::NotADatabase
            | ErrorCode::SystemIoFailure
            | ErrorCode::PermissionDenied => ExecutionKind::Connectivity,
            ErrorCode::SchemaChanged => ExecutionKind::Schema,
            _ => {
                if message.as_deref().is_some_and(is_schema_message) {
                    ExecutionKind::Schema
                } else {
                    ExecutionKind::Other
                }
            }
        },
        other => {
            if is_schema_message(&other.to_string()) {
                ExecutionKind::Schema
            } else {
                ExecutionKind::Other
            }
        }
    }
}

fn is_schema_message(message: &str) -> bool {
    message.contains("no such table")
        || message.contains("no such column")
        || message.contains("has no column named")
}

#[cfg(test)]
mod tests {
    use super::{DbError, ExecutionKind};
    use rusqlite::ffi;

    fn failure(code: i32, message: &str) -> DbError {
        DbError::Sqlite(rusqlite::Error::SqliteFailure(
            ffi::Error::new(code),
            Some(message.to_string()),
        ))
    }

    #[test]
    fn constraint_codes_classify_as_constraint() {
        let err = failure(ffi::SQLITE_CONSTRAINT, "NOT NULL constraint failed: t.a");
        assert_eq!(err.kind(), ExecutionKind::Constraint);
    }

    #[test]
    fn busy_and_locked_classify_as_timeout() {
        assert_eq!(
            failure(ffi::SQLITE_BUSY, "database is locked").kind(),
            ExecutionKind::Timeout
        );
        assert_eq!(
            failure(ffi::SQLITE_LOCKED, "database table is locked").kind(),
            ExecutionKind::Timeout
        );
    }

    #[test]
    fn missing_table_message_classifies_as_schema() {
        let err = failure(ffi::SQLITE_ERROR, "no such table: Act_Gone");
        assert_eq!(err.kind(), ExecutionKind::Schema);
    }

    #[test]
    fn cannot_open_classifies_as_connectivity() {
        let err = failure(ffi::SQLITE_CANTOPEN, "unable to open database file");
        assert_eq!(err.kind(), ExecutionKind::Connectivity);
    }

    #[test]
    fn unrelated_errors_classify_as_other() {
        let err = DbError::Sqlite(rusqlite::Error::QueryReturnedNoRows);
        assert_eq!(err.kind(), ExecutionKind::Other);
        assert_eq!(ExecutionKind::Other.as_str(), "other");
    }
}
