//! Write contracts and SQLite implementation for dynamic records.
//!
//! # Responsibility
//! - Filter caller field sets against the table schema.
//! - Build parameterized INSERT/UPDATE/DELETE statements.
//!
//! # Invariants
//! - A generated identity column is never written; any identity column is
//!   never updated.
//! - An insert runs inside a savepoint and is rolled back unless it yields an
//!   integer identity value.
//! - Columns named by an update predicate are excluded from its SET list.
//! - An empty effective field set fails with a validation error before any
//!   statement is prepared.
//! - No optimistic-concurrency token: concurrent updates are last-write-wins.

use crate::catalog::{FilteredFields, TableSchema};
use crate::coerce::BoundValue;
use crate::model::record::FieldSet;
use crate::model::scalar::Scalar;
use crate::model::validation::{ValidationError, WriteOperation};
use crate::repo::reader::CompoundKey;
use crate::repo::sql::{placeholders, quote_ident};
use crate::repo::{RepoResult, SqliteTableStore};
use log::{info, warn};
use rusqlite::types::ValueRef;
use rusqlite::{params_from_iter, Connection, ToSql};
use std::time::Instant;

/// Row selector for updates.
#[derive(Debug, Clone, PartialEq)]
pub enum RowPredicate {
    Id(i64),
    CompoundKey(CompoundKey),
}

impl RowPredicate {
    fn protected_columns(&self) -> Vec<&str> {
        match self {
            Self::Id(_) => Vec::new(),
            Self::CompoundKey(key) => key.column_names(),
        }
    }

    fn describe(&self) -> String {
        match self {
            Self::Id(id) => format!("id {id}"),
            Self::CompoundKey(key) => key.describe(),
        }
    }
}

/// Write access to dynamically shaped tables.
pub trait RecordWriter {
    /// Inserts one row and returns its generated identity value.
    fn insert(&self, schema: &TableSchema, fields: &FieldSet) -> RepoResult<i64>;

    /// Updates rows matching `predicate`; returns the affected row count.
    fn update(
        &self,
        schema: &TableSchema,
        predicate: &RowPredicate,
        fields: &FieldSet,
    ) -> RepoResult<usize>;

    /// Deletes the row with identity `id`; returns the affected row count
    /// (zero when absent, without error).
    fn delete(&self, schema: &TableSchema, id: i64) -> RepoResult<usize>;
}

impl RecordWriter for SqliteTableStore<'_> {
    fn insert(&self, schema: &TableSchema, fields: &FieldSet) -> RepoResult<i64> {
        let started_at = Instant::now();
        let filtered = schema.filter_writable(fields, &[], WriteOperation::Insert);
        let bound = bind_fields(schema, &filtered, WriteOperation::Insert)?;

        let column_list = filtered
            .kept
            .iter()
            .map(|(column, _)| quote_ident(&column.name))
            .collect::<Vec<_>>()
            .join(", ");
        let identity = schema.identity_column();
        let returning = identity
            .map(|column| quote_ident(&column.name))
            .unwrap_or_else(|| "rowid".to_string());
        let sql = format!(
            "INSERT INTO {} ({}) VALUES ({}) RETURNING {};",
            quote_ident(schema.table()),
            column_list,
            placeholders(1, bound.len()),
            returning
        );

        let id = within_savepoint(self.conn, || {
            let returned = self
                .conn
                .query_row(&sql, params_from_iter(bound.iter()), |row| {
                    Ok(match row.get_ref(0)? {
                        ValueRef::Integer(value) => Some(value),
                        _ => None,
                    })
                })?;
            returned.ok_or_else(|| {
                ValidationError::IdentityNotProvided {
                    table: schema.table().to_string(),
                    column: identity
                        .map(|column| column.name.clone())
                        .unwrap_or_else(|| "rowid".to_string()),
                }
                .into()
            })
        })?;

        info!(
            "event=record_insert module=repo status=ok table={} columns={} param_types={} duration_ms={}",
            schema.table(),
            bound.len(),
            describe_tags(&bound),
            started_at.elapsed().as_millis()
        );
        Ok(id)
    }

    fn update(
        &self,
        schema: &TableSchema,
        predicate: &RowPredicate,
        fields: &FieldSet,
    ) -> RepoResult<usize> {
        let started_at = Instant::now();
        let protected = predicate.protected_columns();
        let filtered = schema.filter_writable(fields, &protected, WriteOperation::Update);
        let bound = bind_fields(schema, &filtered, WriteOperation::Update)?;

        let assignments = filtered
            .kept
            .iter()
            .enumerate()
            .map(|(index, (column, _))| format!("{} = ?{}", quote_ident(&column.name), index + 1))
            .collect::<Vec<_>>()
            .join(", ");

        let id_value: Scalar;
        let mut params: Vec<&dyn ToSql> = bound.iter().map(|value| value as &dyn ToSql).collect();
        let first_predicate_placeholder = bound.len() + 1;
        let condition = match predicate {
            RowPredicate::Id(id) => {
                let identity = schema.require_identity()?;
                id_value = Scalar::Integer(*id);
                params.push(&id_value);
                format!(
                    "{} = ?{}",
                    quote_ident(&identity.name),
                    first_predicate_placeholder
                )
            }
            RowPredicate::CompoundKey(key) => {
                let (condition, values) = key.where_clause(schema, first_predicate_placeholder)?;
                params.extend(values.into_iter().map(|value| value as &dyn ToSql));
                condition
            }
        };

        let sql = format!(
            "UPDATE {} SET {} WHERE {};",
            quote_ident(schema.table()),
            assignments,
            condition
        );
        let affected = self.conn.execute(&sql, params_from_iter(params.iter()))?;

        info!(
            "event=record_update module=repo status=ok table={} target=\"{}\" columns={} affected={} duration_ms={}",
            schema.table(),
            predicate.describe(),
            bound.len(),
            affected,
            started_at.elapsed().as_millis()
        );
        Ok(affected)
    }

    fn delete(&self, schema: &TableSchema, id: i64) -> RepoResult<usize> {
        let started_at = Instant::now();
        let identity = schema.require_identity()?;
        let sql = format!(
            "DELETE FROM {} WHERE {} = ?1;",
            quote_ident(schema.table()),
            quote_ident(&identity.name)
        );
        let affected = self.conn.execute(&sql, [id])?;

        info!(
            "event=record_delete module=repo status=ok table={} id={} affected={} duration_ms={}",
            schema.table(),
            id,
            affected,
            started_at.elapsed().as_millis()
        );
        Ok(affected)
    }
}

const INSERT_SAVEPOINT: &str = "dyntable_insert";

/// Runs `work` inside a savepoint, rolling it back when `work` fails.
///
/// Savepoints nest, so this also works on a connection that already has an
/// open transaction.
fn within_savepoint<T>(conn: &Connection, work: impl FnOnce() -> RepoResult<T>) -> RepoResult<T> {
    conn.execute_batch(&format!("SAVEPOINT {INSERT_SAVEPOINT};"))?;
    match work() {
        Ok(value) => {
            conn.execute_batch(&format!("RELEASE {INSERT_SAVEPOINT};"))?;
            Ok(value)
        }
        Err(err) => {
            let rollback = format!("ROLLBACK TO {INSERT_SAVEPOINT}; RELEASE {INSERT_SAVEPOINT};");
            if let Err(rollback_err) = conn.execute_batch(&rollback) {
                warn!(
                    "event=savepoint_rollback module=repo status=error savepoint={} error={}",
                    INSERT_SAVEPOINT, rollback_err
                );
            }
            Err(err)
        }
    }
}

/// Logs dropped fields, rejects an empty result and coerces kept values.
fn bind_fields(
    schema: &TableSchema,
    filtered: &FilteredFields<'_>,
    operation: WriteOperation,
) -> RepoResult<Vec<BoundValue>> {
    for (name, reason) in &filtered.dropped {
        warn!(
            "event=field_dropped module=repo status=ignored table={} operation={} field={} reason={}",
            schema.table(),
            operation.as_str(),
            name,
            reason.as_str()
        );
    }

    if filtered.kept.is_empty() {
        return Err(ValidationError::EmptyFieldSet {
            table: schema.table().to_string(),
            operation,
        }
        .into());
    }

    filtered
        .kept
        .iter()
        .map(|(column, value)| BoundValue::from_wire(&column.name, value).map_err(Into::into))
        .collect()
}

fn describe_tags(bound: &[BoundValue]) -> String {
    bound
        .iter()
        .map(|value| value.tag.as_str())
        .collect::<Vec<_>>()
        .join(",")
}
