//! Column descriptors and resolved table schemas.

use crate::model::record::FieldSet;
use crate::model::scalar::WireValue;
use crate::model::validation::{ValidationError, WriteOperation};
use once_cell::sync::Lazy;
use regex::Regex;

static DECLARED_TYPE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\s*([A-Za-z_][A-Za-z0-9_ ]*?)\s*(?:\(\s*(\d+)\s*(?:,\s*(\d+)\s*)?\))?\s*$")
        .unwrap_or_else(|err| unreachable!("declared type pattern is static: {err}"))
});

/// Storage behavior derived from a column's declared type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnAffinity {
    Integer,
    Decimal,
    Real,
    Boolean,
    Text,
    Blob,
    Other,
}

impl ColumnAffinity {
    fn from_base_type(base: &str) -> Self {
        let upper = base.to_ascii_uppercase();
        if matches!(upper.as_str(), "BOOL" | "BOOLEAN" | "BIT") {
            Self::Boolean
        } else if upper.contains("INT") {
            Self::Integer
        } else if upper.contains("CHAR") || upper.contains("CLOB") || upper.contains("TEXT") {
            Self::Text
        } else if upper.is_empty() || upper.contains("BLOB") {
            Self::Blob
        } else if upper.contains("REAL") || upper.contains("FLOA") || upper.contains("DOUB") {
            Self::Real
        } else if upper.contains("DEC") || upper.contains("NUMERIC") || upper.contains("MONEY") {
            Self::Decimal
        } else {
            Self::Other
        }
    }
}

/// One column definition as reported by the catalog.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnDescriptor {
    pub name: String,
    /// Declared type text exactly as written in the table definition.
    pub declared_type: String,
    pub nullable: bool,
    /// Character length for `CHAR(n)`/`VARCHAR(n)`-style declarations.
    pub max_length: Option<u32>,
    pub numeric_precision: Option<u32>,
    pub numeric_scale: Option<u32>,
    pub affinity: ColumnAffinity,
    /// 1-based position in the primary key, 0 when not part of it.
    pub primary_key_position: u32,
}

impl ColumnDescriptor {
    /// Builds a descriptor from raw catalog fields, parsing the declared type.
    pub fn from_catalog(
        name: impl Into<String>,
        declared_type: impl Into<String>,
        not_null: bool,
        primary_key_position: u32,
    ) -> Self {
        let declared_type = declared_type.into();
        let parsed = parse_declared_type(&declared_type);
        let affinity = ColumnAffinity::from_base_type(&parsed.base);

        let (max_length, numeric_precision, numeric_scale) = match affinity {
            ColumnAffinity::Text => (parsed.first, None, None),
            ColumnAffinity::Decimal => (
                None,
                parsed.first,
                parsed.second.or(parsed.first.map(|_| 0)),
            ),
            ColumnAffinity::Real => (None, parsed.first, None),
            _ => (None, None, None),
        };

        Self {
            name: name.into(),
            declared_type,
            nullable: !not_null,
            max_length,
            numeric_precision,
            numeric_scale,
            affinity,
            primary_key_position,
        }
    }

    fn is_named(&self, name: &str) -> bool {
        self.name.eq_ignore_ascii_case(name)
    }
}

struct ParsedType {
    base: String,
    first: Option<u32>,
    second: Option<u32>,
}

fn parse_declared_type(declared: &str) -> ParsedType {
    if let Some(captures) = DECLARED_TYPE_RE.captures(declared) {
        return ParsedType {
            base: captures
                .get(1)
                .map(|m| m.as_str().trim().to_string())
                .unwrap_or_default(),
            first: captures.get(2).and_then(|m| m.as_str().parse().ok()),
            second: captures.get(3).and_then(|m| m.as_str().parse().ok()),
        };
    }

    // Shapes like `NVARCHAR(MAX)`: keep the base, drop the arguments.
    let base = declared.split('(').next().unwrap_or_default().trim();
    ParsedType {
        base: base.to_string(),
        first: None,
        second: None,
    }
}

/// Why a caller field did not survive schema filtering.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DropReason {
    /// No column of that name exists in the table.
    UnknownColumn,
    /// Generated identity column or a key column of the current predicate.
    Protected,
}

impl DropReason {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::UnknownColumn => "unknown_column",
            Self::Protected => "protected",
        }
    }
}

/// Writable fields left after schema filtering.
#[derive(Debug)]
pub struct FilteredFields<'a> {
    /// Schema columns paired with their wire values, in field-set order.
    pub kept: Vec<(&'a ColumnDescriptor, &'a WireValue)>,
    /// Field names dropped during filtering.
    pub dropped: Vec<(String, DropReason)>,
}

/// Resolved schema of one table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableSchema {
    table: String,
    columns: Vec<ColumnDescriptor>,
    identity: Option<usize>,
    identity_generated: bool,
}

impl TableSchema {
    /// Builds a schema and picks its identity column.
    ///
    /// The identity column is the single `INTEGER PRIMARY KEY` column (SQLite
    /// rowid alias); without one, the column named `identity_fallback`
    /// (case-insensitive) is used if present. Only a rowid alias is filled in
    /// by SQLite; a fallback identity must be supplied on insert.
    pub fn new(
        table: impl Into<String>,
        columns: Vec<ColumnDescriptor>,
        identity_fallback: &str,
    ) -> Self {
        let key_columns: Vec<usize> = columns
            .iter()
            .enumerate()
            .filter(|(_, column)| column.primary_key_position > 0)
            .map(|(index, _)| index)
            .collect();

        let rowid_alias = match key_columns.as_slice() {
            [index] if columns[*index].declared_type.trim().eq_ignore_ascii_case("INTEGER") => {
                Some(*index)
            }
            _ => None,
        };

        let identity = rowid_alias.or_else(|| {
            columns
                .iter()
                .position(|column| column.is_named(identity_fallback))
        });

        Self {
            table: table.into(),
            columns,
            identity,
            identity_generated: identity.is_some() && identity == rowid_alias,
        }
    }

    /// Canonical table name as spelled in the catalog.
    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn columns(&self) -> &[ColumnDescriptor] {
        &self.columns
    }

    /// Case-insensitive column lookup.
    pub fn column(&self, name: &str) -> Option<&ColumnDescriptor> {
        self.columns.iter().find(|column| column.is_named(name))
    }

    pub fn require_column(&self, name: &str) -> Result<&ColumnDescriptor, ValidationError> {
        self.column(name)
            .ok_or_else(|| ValidationError::UnknownColumn {
                table: self.table.clone(),
                column: name.to_string(),
            })
    }

    pub fn identity_column(&self) -> Option<&ColumnDescriptor> {
        self.identity.map(|index| &self.columns[index])
    }

    /// Whether SQLite assigns the identity value when an insert omits it.
    pub fn identity_is_generated(&self) -> bool {
        self.identity_generated
    }

    pub fn require_identity(&self) -> Result<&ColumnDescriptor, ValidationError> {
        self.identity_column()
            .ok_or_else(|| ValidationError::MissingIdentityColumn(self.table.clone()))
    }

    /// Keeps fields naming a schema column that is neither the identity column
    /// nor one of `protected`.
    ///
    /// An identity column SQLite does not generate stays writable on insert.
    /// When the same column is named more than once, the last value wins.
    pub fn filter_writable<'a>(
        &'a self,
        fields: &'a FieldSet,
        protected: &[&str],
        operation: WriteOperation,
    ) -> FilteredFields<'a> {
        let identity = self
            .identity_column()
            .filter(|_| operation == WriteOperation::Update || self.identity_generated);
        let mut kept: Vec<(&ColumnDescriptor, &WireValue)> = Vec::with_capacity(fields.len());
        let mut dropped = Vec::new();

        for (name, value) in fields.iter() {
            let Some(column) = self.column(name) else {
                dropped.push((name.to_string(), DropReason::UnknownColumn));
                continue;
            };
            let is_identity = identity.is_some_and(|id| id.name == column.name);
            let is_protected = protected.iter().any(|key| column.is_named(key));
            if is_identity || is_protected {
                dropped.push((name.to_string(), DropReason::Protected));
                continue;
            }

            if let Some(slot) = kept.iter_mut().find(|slot| slot.0.name == column.name) {
                slot.1 = value;
            } else {
                kept.push((column, value));
            }
        }

        FilteredFields { kept, dropped }
    }
}

#[cfg(test)]
mod tests {
    use super::{ColumnAffinity, ColumnDescriptor, DropReason, TableSchema};
    use crate::model::record::FieldSet;
    use crate::model::scalar::WireValue;
    use crate::model::validation::WriteOperation;

    fn swim_schema() -> TableSchema {
        TableSchema::new(
            "Act_Swim",
            vec![
                ColumnDescriptor::from_catalog("Id", "INTEGER", false, 1),
                ColumnDescriptor::from_catalog("CourseId", "INT", true, 0),
                ColumnDescriptor::from_catalog("TraineeId", "INT", true, 0),
                ColumnDescriptor::from_catalog("Score", "DECIMAL(5,2)", false, 0),
                ColumnDescriptor::from_catalog("Remarks", "NVARCHAR(200)", false, 0),
            ],
            "Id",
        )
    }

    #[test]
    fn declared_types_parse_into_length_and_precision() {
        let score = ColumnDescriptor::from_catalog("Score", "decimal(10, 2)", false, 0);
        assert_eq!(score.affinity, ColumnAffinity::Decimal);
        assert_eq!(score.numeric_precision, Some(10));
        assert_eq!(score.numeric_scale, Some(2));
        assert!(score.nullable);

        let name = ColumnDescriptor::from_catalog("Name", "VARCHAR(50)", true, 0);
        assert_eq!(name.affinity, ColumnAffinity::Text);
        assert_eq!(name.max_length, Some(50));
        assert!(!name.nullable);

        let flag = ColumnDescriptor::from_catalog("Passed", "BIT", false, 0);
        assert_eq!(flag.affinity, ColumnAffinity::Boolean);

        let wide = ColumnDescriptor::from_catalog("Body", "NVARCHAR(MAX)", false, 0);
        assert_eq!(wide.affinity, ColumnAffinity::Text);
        assert_eq!(wide.max_length, None);

        let untyped = ColumnDescriptor::from_catalog("Anything", "", false, 0);
        assert_eq!(untyped.affinity, ColumnAffinity::Blob);
    }

    #[test]
    fn identity_prefers_rowid_alias_then_fallback_name() {
        let schema = swim_schema();
        assert_eq!(schema.identity_column().map(|c| c.name.as_str()), Some("Id"));

        let by_name = TableSchema::new(
            "Act_Plain",
            vec![
                ColumnDescriptor::from_catalog("id", "TEXT", false, 0),
                ColumnDescriptor::from_catalog("Label", "TEXT", false, 0),
            ],
            "Id",
        );
        assert_eq!(by_name.identity_column().map(|c| c.name.as_str()), Some("id"));

        let none = TableSchema::new(
            "Act_Keyless",
            vec![ColumnDescriptor::from_catalog("Label", "TEXT", false, 0)],
            "Id",
        );
        assert!(none.require_identity().is_err());
    }

    #[test]
    fn filter_drops_unknown_identity_and_protected_fields() {
        let schema = swim_schema();
        let mut fields = FieldSet::new();
        fields.insert("id", WireValue::Bool(true));
        fields.insert("courseid", WireValue::Text("9".to_string()));
        fields.insert("Score", WireValue::Null);
        fields.insert("Nickname", WireValue::Text("x".to_string()));

        let filtered = schema.filter_writable(&fields, &["CourseId"], WriteOperation::Update);
        let kept: Vec<&str> = filtered.kept.iter().map(|(c, _)| c.name.as_str()).collect();
        assert_eq!(kept, vec!["Score"]);
        assert_eq!(
            filtered.dropped,
            vec![
                ("id".to_string(), DropReason::Protected),
                ("courseid".to_string(), DropReason::Protected),
                ("Nickname".to_string(), DropReason::UnknownColumn),
            ]
        );
    }

    #[test]
    fn supplied_identity_is_writable_on_insert_only() {
        let schema = TableSchema::new(
            "Act_Run",
            vec![
                ColumnDescriptor::from_catalog("Id", "INT", false, 1),
                ColumnDescriptor::from_catalog("Score", "INT", false, 0),
            ],
            "Id",
        );
        assert_eq!(schema.identity_column().map(|c| c.name.as_str()), Some("Id"));
        assert!(!schema.identity_is_generated());
        assert!(swim_schema().identity_is_generated());

        let mut fields = FieldSet::new();
        fields.insert("Id", WireValue::Number(7_i64.into()));
        fields.insert("Score", WireValue::Number(3_i64.into()));

        let insert = schema.filter_writable(&fields, &[], WriteOperation::Insert);
        assert_eq!(insert.kept.len(), 2);
        assert!(insert.dropped.is_empty());

        let update = schema.filter_writable(&fields, &[], WriteOperation::Update);
        assert_eq!(update.kept.len(), 1);
        assert_eq!(update.dropped, vec![("Id".to_string(), DropReason::Protected)]);

        let swim = swim_schema();
        let generated = swim.filter_writable(&fields, &[], WriteOperation::Insert);
        assert_eq!(generated.dropped, vec![("Id".to_string(), DropReason::Protected)]);
    }

    #[test]
    fn filter_keeps_last_value_for_repeated_column() {
        let schema = swim_schema();
        let mut fields = FieldSet::new();
        fields.insert("Remarks", WireValue::Text("first".to_string()));
        fields.insert("REMARKS", WireValue::Text("second".to_string()));

        let filtered = schema.filter_writable(&fields, &[], WriteOperation::Update);
        assert_eq!(filtered.kept.len(), 1);
        assert_eq!(filtered.kept[0].1, &WireValue::Text("second".to_string()));
    }
}
