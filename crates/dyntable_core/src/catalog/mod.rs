//! Runtime schema discovery for dynamically addressed tables.
//!
//! # Responsibility
//! - Answer "does this table exist" and "what are its columns" from SQLite
//!   catalog metadata.
//! - Hold resolved schemas in a process-wide cache with explicit invalidation.
//!
//! # Invariants
//! - Catalog lookups run only for names that already passed `NameValidator`.
//! - Identifiers embedded in SQL come from `TableSchema`, never from callers.
//! - Lookups are scoped to one configured schema (`main` by default).
//! - A cached schema is only served while the catalog's schema version
//!   matches the one it was loaded under.

pub mod cache;
pub mod schema;
mod sqlite;

pub use cache::{CachedSchema, SchemaCache};
pub use schema::{ColumnAffinity, ColumnDescriptor, DropReason, FilteredFields, TableSchema};

use crate::model::table_name::TableName;
use crate::repo::RepoResult;

/// Catalog metadata round trips for one table name.
pub trait SchemaCatalog {
    /// Returns the catalog's spelling of `table`, or `None` when absent.
    fn canonical_name(&self, table: &TableName) -> RepoResult<Option<String>>;

    /// Returns whether `table` exists in the configured schema.
    fn exists(&self, table: &TableName) -> RepoResult<bool> {
        Ok(self.canonical_name(table)?.is_some())
    }

    /// Lists column definitions in declaration order.
    ///
    /// Returns an empty list when the table is absent; callers check
    /// `exists` first.
    fn columns(&self, table: &TableName) -> RepoResult<Vec<ColumnDescriptor>>;

    /// Returns a counter that changes whenever any table definition in the
    /// configured schema changes.
    fn schema_version(&self) -> RepoResult<i64>;
}
