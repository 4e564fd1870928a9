//! Process-wide cache of resolved table schemas.
//!
//! # Invariants
//! - Keys are lowercased requested table names.
//! - Entries are immutable once inserted; refreshing means invalidate + reload.
//! - Every entry records the catalog schema version it was loaded under.
//! - A poisoned lock is recovered, never propagated as a panic.

use crate::catalog::schema::TableSchema;
use crate::model::table_name::TableName;
use log::debug;
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

/// One cached schema and the catalog version it was read at.
#[derive(Debug, Clone)]
pub struct CachedSchema {
    pub schema: Arc<TableSchema>,
    pub catalog_version: i64,
}

impl CachedSchema {
    /// Whether this entry is still valid for `table` at `catalog_version`.
    pub fn is_current(&self, canonical_name: &str, catalog_version: i64) -> bool {
        self.catalog_version == catalog_version && self.schema.table() == canonical_name
    }
}

#[derive(Debug, Default)]
pub struct SchemaCache {
    entries: RwLock<HashMap<String, CachedSchema>>,
}

impl SchemaCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, table: &TableName) -> Option<CachedSchema> {
        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        entries.get(&table.cache_key()).cloned()
    }

    /// Stores `schema` for `table`, replacing any previous entry.
    pub fn insert(
        &self,
        table: &TableName,
        schema: TableSchema,
        catalog_version: i64,
    ) -> Arc<TableSchema> {
        let schema = Arc::new(schema);
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        entries.insert(
            table.cache_key(),
            CachedSchema {
                schema: Arc::clone(&schema),
                catalog_version,
            },
        );
        schema
    }

    /// Drops the entry for `table`. Returns whether one was present.
    pub fn invalidate(&self, table: &TableName) -> bool {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        let removed = entries.remove(&table.cache_key()).is_some();
        if removed {
            debug!(
                "event=schema_cache_invalidate module=catalog status=ok table={}",
                table
            );
        }
        removed
    }

    pub fn clear(&self) {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        entries.clear();
        debug!("event=schema_cache_clear module=catalog status=ok");
    }

    pub fn len(&self) -> usize {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
