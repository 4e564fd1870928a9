//! `SchemaCatalog` over SQLite table-valued pragmas.

use crate::catalog::schema::ColumnDescriptor;
use crate::catalog::SchemaCatalog;
use crate::model::table_name::TableName;
use crate::repo::sql::quote_ident;
use crate::repo::{RepoResult, SqliteTableStore};
use log::debug;
use rusqlite::params;
use std::time::Instant;

const TABLE_LOOKUP_SQL: &str = "SELECT name
FROM pragma_table_list
WHERE schema = ?1
  AND type = 'table'
  AND name = ?2 COLLATE NOCASE;";

const COLUMN_LIST_SQL: &str = "SELECT name, type, \"notnull\", pk
FROM pragma_table_info(?1, ?2)
ORDER BY cid;";

impl SchemaCatalog for SqliteTableStore<'_> {
    fn canonical_name(&self, table: &TableName) -> RepoResult<Option<String>> {
        let started_at = Instant::now();
        let mut stmt = self.conn.prepare_cached(TABLE_LOOKUP_SQL)?;
        let mut rows = stmt.query(params![self.catalog_schema, table.as_str()])?;
        let name = match rows.next()? {
            Some(row) => Some(row.get::<_, String>(0)?),
            None => None,
        };

        debug!(
            "event=catalog_exists module=catalog status=ok table={} found={} duration_ms={}",
            table,
            name.is_some(),
            started_at.elapsed().as_millis()
        );
        Ok(name)
    }

    fn columns(&self, table: &TableName) -> RepoResult<Vec<ColumnDescriptor>> {
        let started_at = Instant::now();
        let mut stmt = self.conn.prepare_cached(COLUMN_LIST_SQL)?;
        let mut rows = stmt.query(params![table.as_str(), self.catalog_schema])?;
        let mut columns = Vec::new();

        while let Some(row) = rows.next()? {
            let name: String = row.get(0)?;
            let declared_type: String = row.get(1)?;
            let not_null: i64 = row.get(2)?;
            let pk: i64 = row.get(3)?;
            columns.push(ColumnDescriptor::from_catalog(
                name,
                declared_type,
                not_null != 0,
                u32::try_from(pk).unwrap_or(0),
            ));
        }

        debug!(
            "event=catalog_columns module=catalog status=ok table={} columns={} duration_ms={}",
            table,
            columns.len(),
            started_at.elapsed().as_millis()
        );
        Ok(columns)
    }

    fn schema_version(&self) -> RepoResult<i64> {
        let sql = format!("PRAGMA {}.schema_version;", quote_ident(&self.catalog_schema));
        let version = self.conn.query_row(&sql, [], |row| row.get(0))?;
        Ok(version)
    }
}
