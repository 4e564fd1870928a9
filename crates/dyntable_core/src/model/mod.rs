//! Dynamic record model shared by catalog, repository and router layers.
//!
//! # Responsibility
//! - Define the tagged scalar union every column value is carried in.
//! - Define caller-supplied field sets and materialized dynamic records.
//! - Own the table-name eligibility rule.
//!
//! # Invariants
//! - No value is ever carried as an untyped object; nested JSON is rejected
//!   at the `FieldSet` boundary.
//! - A `TableName` can only be constructed through `NameValidator`.

pub mod record;
pub mod scalar;
pub mod table_name;
pub mod validation;
