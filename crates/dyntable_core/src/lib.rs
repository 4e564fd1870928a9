//! Core of the dynamic-table CRUD engine.
//! Resolves caller-named tables at runtime and reads/writes their rows as
//! dynamically shaped records.

pub mod catalog;
pub mod coerce;
pub mod config;
pub mod db;
pub mod logging;
pub mod model;
pub mod repo;
pub mod service;

pub use catalog::{ColumnAffinity, ColumnDescriptor, SchemaCache, SchemaCatalog, TableSchema};
pub use config::{ConfigError, EmptyListing, EngineConfig, KeySegment};
pub use db::{open_db, open_db_in_memory, DbError, ExecutionKind};
pub use logging::{default_log_level, init_console_logging, init_logging, logging_status};
pub use model::record::{DynamicRecord, FieldSet};
pub use model::scalar::{Scalar, WireValue};
pub use model::table_name::{NameValidator, TableName};
pub use model::validation::ValidationError;
pub use repo::{
    CompoundKey, NotFound, ReadOptions, RecordReader, RecordWriter, RepoError, RepoResult,
    RowPredicate, SqliteTableStore,
};
pub use service::router::{Method, RequestRouter, Route, RouteRequest, RouteResponse};
pub use service::table_service::{ResolvedTable, TableService, TableStore};

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
