//! SQLite-backed table store.

use rusqlite::Connection;

/// Catalog, reader and writer over one borrowed connection.
///
/// Lives for a single request round trip; holds no state besides the
/// connection and the catalog schema its lookups are scoped to.
pub struct SqliteTableStore<'conn> {
    pub(crate) conn: &'conn Connection,
    pub(crate) catalog_schema: String,
}

impl<'conn> SqliteTableStore<'conn> {
    pub fn new(conn: &'conn Connection, catalog_schema: impl Into<String>) -> Self {
        Self {
            conn,
            catalog_schema: catalog_schema.into(),
        }
    }

    pub fn connection(&self) -> &Connection {
        self.conn
    }
}
