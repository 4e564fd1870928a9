//! Repository error taxonomy.

use crate::db::{DbError, ExecutionKind};
use crate::model::validation::ValidationError;
use std::error::Error;
use std::fmt::{Display, Formatter};

pub type RepoResult<T> = Result<T, RepoError>;

/// Absent table or row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NotFound {
    Table(String),
    Row { table: String, key: String },
}

impl Display for NotFound {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Table(table) => write!(f, "table `{table}` does not exist in the database"),
            Self::Row { table, key } => {
                write!(f, "no record found with {key} in table `{table}`")
            }
        }
    }
}

/// Failure of a catalog, read or write operation.
#[derive(Debug)]
pub enum RepoError {
    Validation(ValidationError),
    NotFound(NotFound),
    Db(DbError),
    /// A persisted value the dynamic record model cannot represent.
    InvalidData(String),
}

impl RepoError {
    /// Execution kind for database failures, `None` for everything else.
    pub fn execution_kind(&self) -> Option<ExecutionKind> {
        match self {
            Self::Db(err) => Some(err.kind()),
            _ => None,
        }
    }
}

impl Display for RepoError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Validation(err) => write!(f, "{err}"),
            Self::NotFound(err) => write!(f, "{err}"),
            Self::Db(err) => write!(f, "{err}"),
            Self::InvalidData(message) => write!(f, "invalid persisted data: {message}"),
        }
    }
}

impl Error for RepoError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Validation(err) => Some(err),
            Self::Db(err) => Some(err),
            Self::NotFound(_) => None,
            Self::InvalidData(_) => None,
        }
    }
}

impl From<ValidationError> for RepoError {
    fn from(value: ValidationError) -> Self {
        Self::Validation(value)
    }
}

impl From<NotFound> for RepoError {
    fn from(value: NotFound) -> Self {
        Self::NotFound(value)
    }
}

impl From<DbError> for RepoError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

impl From<rusqlite::Error> for RepoError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Db(DbError::Sqlite(value))
    }
}
