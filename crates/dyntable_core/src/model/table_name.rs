//! Table-name eligibility for dynamic access.
//!
//! # Invariants
//! - Validation is pure: no I/O, no logging side effects.
//! - A `TableName` value has always passed `NameValidator::validate`.

use crate::model::validation::ValidationError;
use regex::Regex;
use std::fmt::{Display, Formatter};

/// Caller-supplied table name that passed the prefix convention.
///
/// Still untrusted as an SQL identifier: statements only ever embed the
/// canonical name read back from the catalog.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TableName(String);

impl TableName {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Lowercased form used as a cache key.
    pub fn cache_key(&self) -> String {
        self.0.to_lowercase()
    }
}

impl Display for TableName {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Pure predicate over candidate table names.
#[derive(Debug, Clone)]
pub struct NameValidator {
    prefix: String,
    pattern: Regex,
}

impl NameValidator {
    /// Builds a validator for a case-insensitive name prefix.
    pub fn new(prefix: &str) -> Self {
        let pattern = Regex::new(&format!("(?i)^{}", regex::escape(prefix)))
            .unwrap_or_else(|_| unreachable!("escaped literal is always a valid pattern"));
        Self {
            prefix: prefix.to_string(),
            pattern,
        }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Returns true iff `name` is non-empty and starts with the prefix.
    pub fn validate(&self, name: &str) -> bool {
        !name.is_empty() && self.pattern.is_match(name)
    }

    /// Validates and wraps `name`.
    pub fn parse(&self, name: &str) -> Result<TableName, ValidationError> {
        if self.validate(name) {
            Ok(TableName(name.to_string()))
        } else {
            Err(ValidationError::InvalidTableName {
                name: name.to_string(),
                prefix: self.prefix.clone(),
            })
        }
    }
}
