//! Repository layer for dynamically addressed tables.
//!
//! # Responsibility
//! - Define read and write contracts over arbitrary-column tables.
//! - Isolate SQL construction and row materialization from orchestration.
//!
//! # Invariants
//! - Every identifier embedded in SQL comes from a `TableSchema`.
//! - Every data value is bound as a parameter.
//! - Write paths reject an empty effective field set before building SQL.

pub mod error;
pub mod reader;
pub(crate) mod sql;
pub mod store;
pub mod writer;

pub use error::{NotFound, RepoError, RepoResult};
pub use reader::{CompoundKey, ReadOptions, RecordReader};
pub use store::SqliteTableStore;
pub use writer::{RecordWriter, RowPredicate};
