//! Read contracts and SQLite implementation for dynamic records.
//!
//! # Responsibility
//! - Build parameterized SELECT statements for the fixed access patterns
//!   (capped listing, by id, by one column, by compound key).
//! - Materialize rows into `DynamicRecord`s using column affinity.
//!
//! # Invariants
//! - Listings carry no ORDER BY and never exceed the given cap.
//! - Read paths reject stored values the record model cannot represent
//!   instead of masking them.

use crate::catalog::{ColumnAffinity, ColumnDescriptor, TableSchema};
use crate::model::record::DynamicRecord;
use crate::model::scalar::Scalar;
use crate::model::validation::ValidationError;
use crate::repo::sql::{quote_ident, select_list};
use crate::repo::{RepoError, RepoResult, SqliteTableStore};
use log::debug;
use rusqlite::types::ValueRef;
use rusqlite::{params_from_iter, Row, ToSql};
use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;
use std::str::FromStr;
use std::time::Instant;

/// Largest scale `rust_decimal` can carry.
const MAX_DECIMAL_SCALE: u32 = 28;

/// Projection options for single-row reads.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReadOptions {
    /// Whether the identity column appears in the returned record.
    pub include_identity_column: bool,
}

impl ReadOptions {
    pub fn with_identity() -> Self {
        Self {
            include_identity_column: true,
        }
    }

    pub fn without_identity() -> Self {
        Self {
            include_identity_column: false,
        }
    }
}

/// Non-identity columns identifying one row, with their values.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CompoundKey {
    parts: Vec<(String, Scalar)>,
}

impl CompoundKey {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, column: impl Into<String>, value: impl Into<Scalar>) -> Self {
        self.parts.push((column.into(), value.into()));
        self
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Scalar)> {
        self.parts.iter().map(|(column, value)| (column.as_str(), value))
    }

    pub fn column_names(&self) -> Vec<&str> {
        self.parts.iter().map(|(column, _)| column.as_str()).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.parts.is_empty()
    }

    /// `CourseId=1, TraineeId=2` rendering for messages and logs.
    pub fn describe(&self) -> String {
        self.parts
            .iter()
            .map(|(column, value)| format!("{column}={}", describe_scalar(value)))
            .collect::<Vec<_>>()
            .join(", ")
    }

    /// Resolves key columns against `schema` into a WHERE clause whose
    /// placeholders start at `first_placeholder`.
    pub(crate) fn where_clause<'a>(
        &'a self,
        schema: &TableSchema,
        first_placeholder: usize,
    ) -> RepoResult<(String, Vec<&'a Scalar>)> {
        if self.parts.is_empty() {
            return Err(ValidationError::InvalidPayload(
                "compound key needs at least one column".to_string(),
            )
            .into());
        }

        let mut conditions = Vec::with_capacity(self.parts.len());
        let mut values = Vec::with_capacity(self.parts.len());
        for (offset, (column, value)) in self.parts.iter().enumerate() {
            let descriptor = schema.require_column(column)?;
            conditions.push(format!(
                "{} = ?{}",
                quote_ident(&descriptor.name),
                first_placeholder + offset
            ));
            values.push(value);
        }
        Ok((conditions.join(" AND "), values))
    }
}

fn describe_scalar(value: &Scalar) -> String {
    match value {
        Scalar::Text(text) => text.clone(),
        Scalar::Integer(integer) => integer.to_string(),
        Scalar::Decimal(decimal) => decimal.to_string(),
        Scalar::Boolean(flag) => flag.to_string(),
        Scalar::Null => "null".to_string(),
    }
}

/// Read access to dynamically shaped tables.
pub trait RecordReader {
    /// Lists at most `cap` rows in storage order; empty table yields an empty list.
    fn list_all(&self, schema: &TableSchema, cap: u32) -> RepoResult<Vec<DynamicRecord>>;

    /// Like `list_all`, but an empty table yields exactly one record with
    /// every column set to null.
    fn list_all_or_placeholder(
        &self,
        schema: &TableSchema,
        cap: u32,
    ) -> RepoResult<Vec<DynamicRecord>> {
        let records = self.list_all(schema, cap)?;
        if records.is_empty() {
            return Ok(vec![placeholder_record(schema)]);
        }
        Ok(records)
    }

    /// Gets one row by identity value.
    fn by_id(
        &self,
        schema: &TableSchema,
        id: i64,
        options: ReadOptions,
    ) -> RepoResult<Option<DynamicRecord>>;

    /// Lists at most `cap` rows whose `column` equals `value`.
    fn by_foreign_key(
        &self,
        schema: &TableSchema,
        column: &str,
        value: &Scalar,
        cap: u32,
    ) -> RepoResult<Vec<DynamicRecord>>;

    /// Gets the first row matching every column of `key`.
    fn by_compound_key(
        &self,
        schema: &TableSchema,
        key: &CompoundKey,
    ) -> RepoResult<Option<DynamicRecord>>;
}

/// One record holding `Scalar::Null` for every schema column.
pub fn placeholder_record(schema: &TableSchema) -> DynamicRecord {
    let mut record = DynamicRecord::with_capacity(schema.columns().len());
    for column in schema.columns() {
        record.push(column.name.clone(), Scalar::Null);
    }
    record
}

impl RecordReader for SqliteTableStore<'_> {
    fn list_all(&self, schema: &TableSchema, cap: u32) -> RepoResult<Vec<DynamicRecord>> {
        let started_at = Instant::now();
        let columns = projection(schema, ReadOptions::with_identity());
        let sql = format!(
            "SELECT {} FROM {} LIMIT ?1;",
            select_list(&columns),
            quote_ident(schema.table())
        );

        let cap_value = i64::from(cap);
        let records = self.query_records(&sql, &[&cap_value as &dyn ToSql], &columns)?;

        debug!(
            "event=record_list module=repo status=ok table={} rows={} cap={} duration_ms={}",
            schema.table(),
            records.len(),
            cap,
            started_at.elapsed().as_millis()
        );
        Ok(records)
    }

    fn by_id(
        &self,
        schema: &TableSchema,
        id: i64,
        options: ReadOptions,
    ) -> RepoResult<Option<DynamicRecord>> {
        let started_at = Instant::now();
        let identity = schema.require_identity()?;
        let columns = projection(schema, options);
        let sql = format!(
            "SELECT {} FROM {} WHERE {} = ?1 LIMIT 1;",
            select_list(&columns),
            quote_ident(schema.table()),
            quote_ident(&identity.name)
        );

        let record = self
            .query_records(&sql, &[&id as &dyn ToSql], &columns)?
            .into_iter()
            .next();

        debug!(
            "event=record_get module=repo status=ok table={} found={} duration_ms={}",
            schema.table(),
            record.is_some(),
            started_at.elapsed().as_millis()
        );
        Ok(record)
    }

    fn by_foreign_key(
        &self,
        schema: &TableSchema,
        column: &str,
        value: &Scalar,
        cap: u32,
    ) -> RepoResult<Vec<DynamicRecord>> {
        let started_at = Instant::now();
        let filter = schema.require_column(column)?;
        let columns = projection(schema, ReadOptions::with_identity());
        let sql = format!(
            "SELECT {} FROM {} WHERE {} = ?1 LIMIT ?2;",
            select_list(&columns),
            quote_ident(schema.table()),
            quote_ident(&filter.name)
        );

        let cap_value = i64::from(cap);
        let records =
            self.query_records(&sql, &[value as &dyn ToSql, &cap_value], &columns)?;

        debug!(
            "event=record_filter module=repo status=ok table={} column={} rows={} duration_ms={}",
            schema.table(),
            filter.name,
            records.len(),
            started_at.elapsed().as_millis()
        );
        Ok(records)
    }

    fn by_compound_key(
        &self,
        schema: &TableSchema,
        key: &CompoundKey,
    ) -> RepoResult<Option<DynamicRecord>> {
        let started_at = Instant::now();
        let (condition, values) = key.where_clause(schema, 1)?;
        let columns = projection(schema, ReadOptions::with_identity());
        let sql = format!(
            "SELECT {} FROM {} WHERE {} LIMIT 1;",
            select_list(&columns),
            quote_ident(schema.table()),
            condition
        );

        let params: Vec<&dyn ToSql> = values.iter().map(|value| *value as &dyn ToSql).collect();
        let record = self
            .query_records(&sql, &params, &columns)?
            .into_iter()
            .next();

        debug!(
            "event=record_get_compound module=repo status=ok table={} key_columns={} found={} duration_ms={}",
            schema.table(),
            key.column_names().join(","),
            record.is_some(),
            started_at.elapsed().as_millis()
        );
        Ok(record)
    }
}

impl SqliteTableStore<'_> {
    fn query_records(
        &self,
        sql: &str,
        params: &[&dyn ToSql],
        columns: &[&ColumnDescriptor],
    ) -> RepoResult<Vec<DynamicRecord>> {
        let mut stmt = self.conn.prepare(sql)?;
        let mut rows = stmt.query(params_from_iter(params.iter()))?;
        let mut records = Vec::new();
        while let Some(row) = rows.next()? {
            records.push(read_record(row, columns)?);
        }
        Ok(records)
    }
}

fn projection(schema: &TableSchema, options: ReadOptions) -> Vec<&ColumnDescriptor> {
    let identity = schema.identity_column().map(|column| column.name.as_str());
    schema
        .columns()
        .iter()
        .filter(|column| options.include_identity_column || Some(column.name.as_str()) != identity)
        .collect()
}

fn read_record(row: &Row<'_>, columns: &[&ColumnDescriptor]) -> RepoResult<DynamicRecord> {
    let mut record = DynamicRecord::with_capacity(columns.len());
    for (index, column) in columns.iter().enumerate() {
        let value = decode_value(row.get_ref(index)?, column)?;
        record.push(column.name.clone(), value);
    }
    Ok(record)
}

/// Maps one stored SQLite value to a scalar, guided by the column's affinity.
pub(crate) fn decode_value(raw: ValueRef<'_>, column: &ColumnDescriptor) -> RepoResult<Scalar> {
    match raw {
        ValueRef::Null => Ok(Scalar::Null),
        ValueRef::Integer(integer) => Ok(match column.affinity {
            ColumnAffinity::Boolean => Scalar::Boolean(integer != 0),
            ColumnAffinity::Decimal => Scalar::Decimal(apply_scale(Decimal::from(integer), column)),
            _ => Scalar::Integer(integer),
        }),
        ValueRef::Real(real) => {
            let decimal = Decimal::from_f64(real).ok_or_else(|| {
                RepoError::InvalidData(format!(
                    "column `{}` holds non-finite real `{real}`",
                    column.name
                ))
            })?;
            Ok(Scalar::Decimal(apply_scale(decimal, column)))
        }
        ValueRef::Text(bytes) => {
            let text = std::str::from_utf8(bytes).map_err(|err| {
                RepoError::InvalidData(format!(
                    "column `{}` holds non UTF-8 text: {err}",
                    column.name
                ))
            })?;
            if column.affinity == ColumnAffinity::Decimal {
                if let Ok(decimal) = Decimal::from_str(text.trim()) {
                    return Ok(Scalar::Decimal(apply_scale(decimal, column)));
                }
            }
            Ok(Scalar::Text(text.to_string()))
        }
        ValueRef::Blob(_) => Err(RepoError::InvalidData(format!(
            "column `{}` holds a BLOB, which dynamic records cannot carry",
            column.name
        ))),
    }
}

/// Pads a decimal to the column's declared scale; never rounds.
fn apply_scale(mut decimal: Decimal, column: &ColumnDescriptor) -> Decimal {
    if let Some(scale) = column.numeric_scale {
        let scale = scale.min(MAX_DECIMAL_SCALE);
        if decimal.scale() < scale {
            decimal.rescale(scale);
        }
    }
    decimal
}
