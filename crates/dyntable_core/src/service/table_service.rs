//! Dynamic-table use-case service.
//!
//! # Responsibility
//! - Orchestrate one request: validate name, confirm existence, resolve
//!   schema, delegate to reader/writer, map absence to `NotFound`.
//! - Own the listing contracts and the foreign-key fallback policy.
//!
//! # Invariants
//! - Name validation runs before any store call; existence is checked
//!   against the catalog on every operation.
//! - Row absence is detected by a read before any mutating statement.
//! - A schema-kind execution failure evicts the table's cached schema.
//! - A cached schema is reused only while the catalog schema version is
//!   unchanged; any DDL in the schema forces a reload.

use crate::catalog::{SchemaCache, SchemaCatalog, TableSchema};
use crate::config::{EmptyListing, EngineConfig};
use crate::db::ExecutionKind;
use crate::model::record::{DynamicRecord, FieldSet};
use crate::model::scalar::Scalar;
use crate::model::table_name::{NameValidator, TableName};
use crate::repo::{
    CompoundKey, NotFound, ReadOptions, RecordReader, RecordWriter, RepoError, RepoResult,
    RowPredicate,
};
use log::{debug, info, warn};
use std::sync::Arc;

/// Everything a `TableService` needs from storage.
pub trait TableStore: SchemaCatalog + RecordReader + RecordWriter {}

impl<T: SchemaCatalog + RecordReader + RecordWriter> TableStore for T {}

/// A validated table name together with its resolved schema.
#[derive(Debug, Clone)]
pub struct ResolvedTable {
    pub name: TableName,
    pub schema: Arc<TableSchema>,
}

/// Use-case service over dynamically addressed tables.
pub struct TableService<'a, S: TableStore> {
    store: S,
    config: &'a EngineConfig,
    validator: &'a NameValidator,
    cache: &'a SchemaCache,
}

impl<'a, S: TableStore> TableService<'a, S> {
    pub fn new(
        store: S,
        config: &'a EngineConfig,
        validator: &'a NameValidator,
        cache: &'a SchemaCache,
    ) -> Self {
        Self {
            store,
            config,
            validator,
            cache,
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Validates `name`, confirms the table exists and returns its schema.
    ///
    /// # Errors
    /// - `Validation` when the name fails the prefix convention; no store
    ///   call is made.
    /// - `NotFound::Table` when the catalog has no such table; any cached
    ///   schema for it is evicted.
    pub fn resolve(&self, name: &str) -> RepoResult<ResolvedTable> {
        let table = self.validator.parse(name)?;

        let Some(canonical) = self.store.canonical_name(&table)? else {
            self.cache.invalidate(&table);
            return Err(NotFound::Table(name.to_string()).into());
        };

        let catalog_version = self.store.schema_version()?;
        if let Some(cached) = self.cache.get(&table) {
            if cached.is_current(&canonical, catalog_version) {
                return Ok(ResolvedTable {
                    name: table,
                    schema: cached.schema,
                });
            }
            self.cache.invalidate(&table);
        }

        let columns = self.store.columns(&table)?;
        if columns.is_empty() {
            // Dropped between the existence check and the column listing.
            return Err(NotFound::Table(name.to_string()).into());
        }
        let schema = TableSchema::new(canonical, columns, &self.config.identity_column);
        debug!(
            "event=schema_resolve module=service status=ok table={} columns={} identity={} catalog_version={}",
            schema.table(),
            schema.columns().len(),
            schema
                .identity_column()
                .map(|column| column.name.as_str())
                .unwrap_or("none"),
            catalog_version
        );
        let schema = self.cache.insert(&table, schema, catalog_version);
        Ok(ResolvedTable {
            name: table,
            schema,
        })
    }

    /// Lists rows using the configured empty-table contract.
    pub fn list(&self, name: &str) -> RepoResult<Vec<DynamicRecord>> {
        let table = self.resolve(name)?;
        self.list_in(&table)
    }

    /// Lists at most `list_cap` rows; an empty table yields `[]`.
    pub fn list_records(&self, name: &str) -> RepoResult<Vec<DynamicRecord>> {
        let table = self.resolve(name)?;
        let result = self.store.list_all(&table.schema, self.config.list_cap);
        self.guard(&table, result)
    }

    /// Lists at most `list_cap` rows; an empty table yields one all-null record.
    pub fn list_records_or_placeholder(&self, name: &str) -> RepoResult<Vec<DynamicRecord>> {
        let table = self.resolve(name)?;
        let result = self
            .store
            .list_all_or_placeholder(&table.schema, self.config.list_cap);
        self.guard(&table, result)
    }

    pub fn list_in(&self, table: &ResolvedTable) -> RepoResult<Vec<DynamicRecord>> {
        let cap = self.config.list_cap;
        let result = match self.config.empty_listing {
            EmptyListing::Empty => self.store.list_all(&table.schema, cap),
            EmptyListing::Placeholder => self.store.list_all_or_placeholder(&table.schema, cap),
        };
        self.guard(table, result)
    }

    /// Gets one row by identity.
    ///
    /// The identity column is projected per `by_id_includes_identity`.
    pub fn get_by_id(&self, name: &str, id: i64) -> RepoResult<DynamicRecord> {
        let table = self.resolve(name)?;
        self.get_by_id_in(&table, id)
    }

    pub fn get_by_id_in(&self, table: &ResolvedTable, id: i64) -> RepoResult<DynamicRecord> {
        let options = ReadOptions {
            include_identity_column: self.config.by_id_includes_identity,
        };
        let result = self.store.by_id(&table.schema, id, options);
        self.guard(table, result)?
            .ok_or_else(|| row_not_found(table, &format!("id {id}")))
    }

    /// Lists rows whose foreign-key column equals `value`.
    ///
    /// Zero matches degrade to the unfiltered listing instead of an empty
    /// or not-found result.
    pub fn get_by_foreign_key(&self, name: &str, value: i64) -> RepoResult<Vec<DynamicRecord>> {
        let table = self.resolve(name)?;
        self.get_by_foreign_key_in(&table, value)
    }

    pub fn get_by_foreign_key_in(
        &self,
        table: &ResolvedTable,
        value: i64,
    ) -> RepoResult<Vec<DynamicRecord>> {
        let column = &self.config.foreign_key.column;
        let result = self.store.by_foreign_key(
            &table.schema,
            column,
            &Scalar::Integer(value),
            self.config.list_cap,
        );
        let records = self.guard(table, result)?;
        if !records.is_empty() {
            return Ok(records);
        }

        info!(
            "event=foreign_key_fallback module=service status=degraded table={} column={} value={}",
            table.schema.table(),
            column,
            value
        );
        self.list_in(table)
    }

    /// Inserts one row and returns its identity.
    pub fn insert(&self, name: &str, fields: &FieldSet) -> RepoResult<i64> {
        let table = self.resolve(name)?;
        self.insert_into(&table, fields)
    }

    pub fn insert_into(&self, table: &ResolvedTable, fields: &FieldSet) -> RepoResult<i64> {
        let result = self.store.insert(&table.schema, fields);
        self.guard(table, result)
    }

    /// Updates one row by identity after confirming it exists.
    pub fn update_by_id(&self, name: &str, id: i64, fields: &FieldSet) -> RepoResult<()> {
        let table = self.resolve(name)?;
        self.update_by_id_in(&table, id, fields)
    }

    pub fn update_by_id_in(
        &self,
        table: &ResolvedTable,
        id: i64,
        fields: &FieldSet,
    ) -> RepoResult<()> {
        self.require_row_by_id(table, id)?;
        let result = self
            .store
            .update(&table.schema, &RowPredicate::Id(id), fields);
        self.guard(table, result)?;
        Ok(())
    }

    /// Updates the row identified by (foreign key, second key) and returns
    /// it as stored afterwards.
    pub fn update_by_compound_key(
        &self,
        name: &str,
        key_value: i64,
        second_value: i64,
        fields: &FieldSet,
    ) -> RepoResult<DynamicRecord> {
        let table = self.resolve(name)?;
        self.update_by_compound_key_in(&table, key_value, second_value, fields)
    }

    pub fn update_by_compound_key_in(
        &self,
        table: &ResolvedTable,
        key_value: i64,
        second_value: i64,
        fields: &FieldSet,
    ) -> RepoResult<DynamicRecord> {
        let key = self.compound_key(key_value, second_value);

        let existing = self.store.by_compound_key(&table.schema, &key);
        if self.guard(table, existing)?.is_none() {
            return Err(row_not_found(table, &key.describe()));
        }

        let predicate = RowPredicate::CompoundKey(key.clone());
        let result = self.store.update(&table.schema, &predicate, fields);
        self.guard(table, result)?;

        let updated = self.store.by_compound_key(&table.schema, &key);
        self.guard(table, updated)?
            .ok_or_else(|| row_not_found(table, &key.describe()))
    }

    /// Deletes one row by identity after confirming it exists.
    pub fn delete_by_id(&self, name: &str, id: i64) -> RepoResult<()> {
        let table = self.resolve(name)?;
        self.delete_by_id_in(&table, id)
    }

    pub fn delete_by_id_in(&self, table: &ResolvedTable, id: i64) -> RepoResult<()> {
        self.require_row_by_id(table, id)?;
        let result = self.store.delete(&table.schema, id);
        let affected = self.guard(table, result)?;
        if affected == 0 {
            warn!(
                "event=record_delete module=service status=raced table={} id={}",
                table.schema.table(),
                id
            );
        }
        Ok(())
    }

    fn compound_key(&self, key_value: i64, second_value: i64) -> CompoundKey {
        CompoundKey::new()
            .with(self.config.foreign_key.column.as_str(), key_value)
            .with(self.config.compound_key.column.as_str(), second_value)
    }

    fn require_row_by_id(&self, table: &ResolvedTable, id: i64) -> RepoResult<()> {
        let result = self
            .store
            .by_id(&table.schema, id, ReadOptions::with_identity());
        match self.guard(table, result)? {
            Some(_) => Ok(()),
            None => Err(row_not_found(table, &format!("id {id}"))),
        }
    }

    /// Evicts the cached schema when `result` failed on stale schema.
    fn guard<T>(&self, table: &ResolvedTable, result: RepoResult<T>) -> RepoResult<T> {
        if let Err(err) = &result {
            if err.execution_kind() == Some(ExecutionKind::Schema) {
                self.cache.invalidate(&table.name);
            }
        }
        result
    }
}

fn row_not_found(table: &ResolvedTable, key: &str) -> RepoError {
    NotFound::Row {
        table: table.schema.table().to_string(),
        key: key.to_string(),
    }
    .into()
}
