//! Caller field sets and materialized dynamic records.

use crate::model::scalar::{Scalar, WireValue};
use crate::model::validation::ValidationError;
use serde::ser::{Serialize, SerializeMap, Serializer};

/// Caller-supplied mapping from column name to wire value.
///
/// Keys are not yet checked against any schema; see
/// `TableSchema::filter_writable`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FieldSet {
    fields: Vec<(String, WireValue)>,
}

impl FieldSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a field set from a parsed JSON request body.
    ///
    /// # Errors
    /// - `InvalidPayload` when the body is not a JSON object.
    /// - `UnsupportedValue` when a field holds an array or object.
    pub fn from_json(body: serde_json::Value) -> Result<Self, ValidationError> {
        let serde_json::Value::Object(map) = body else {
            return Err(ValidationError::InvalidPayload(
                "request body must be a JSON object".to_string(),
            ));
        };

        let mut fields = Vec::with_capacity(map.len());
        for (name, value) in map {
            let wire = WireValue::from_json(&name, value)?;
            fields.push((name, wire));
        }
        Ok(Self { fields })
    }

    /// Appends one field; later entries win over earlier ones with the same name.
    pub fn insert(&mut self, name: impl Into<String>, value: WireValue) {
        self.fields.push((name.into(), value));
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &WireValue)> {
        self.fields.iter().map(|(name, value)| (name.as_str(), value))
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

/// One row as an ordered column-name to value mapping.
///
/// Column order follows the executed projection, which is the catalog's
/// column order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DynamicRecord {
    columns: Vec<(String, Scalar)>,
}

impl DynamicRecord {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            columns: Vec::with_capacity(capacity),
        }
    }

    pub fn push(&mut self, column: impl Into<String>, value: Scalar) {
        self.columns.push((column.into(), value));
    }

    /// Looks a value up by exact column name.
    pub fn get(&self, column: &str) -> Option<&Scalar> {
        self.columns
            .iter()
            .find(|(name, _)| name == column)
            .map(|(_, value)| value)
    }

    pub fn column_names(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().map(|(name, _)| name.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Scalar)> {
        self.columns.iter().map(|(name, value)| (name.as_str(), value))
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    /// Returns whether every column holds `Scalar::Null`.
    pub fn is_all_null(&self) -> bool {
        self.columns.iter().all(|(_, value)| value.is_null())
    }
}

impl Serialize for DynamicRecord {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.columns.len()))?;
        for (name, value) in &self.columns {
            map.serialize_entry(name, value)?;
        }
        map.end()
    }
}

#[cfg(test)]
mod tests {
    use super::{DynamicRecord, FieldSet};
    use crate::model::scalar::{Scalar, WireValue};

    #[test]
    fn field_set_requires_object_body() {
        assert!(FieldSet::from_json(serde_json::json!([1, 2])).is_err());
        assert!(FieldSet::from_json(serde_json::json!("x")).is_err());

        let fields = FieldSet::from_json(serde_json::json!({"CourseId": 1, "Note": null})).unwrap();
        assert_eq!(fields.len(), 2);
        assert!(fields
            .iter()
            .any(|(name, value)| name == "Note" && *value == WireValue::Null));
    }

    #[test]
    fn record_serializes_in_column_order() {
        let mut record = DynamicRecord::new();
        record.push("Zeta", Scalar::Integer(1));
        record.push("Alpha", Scalar::Null);

        let text = serde_json::to_string(&record).unwrap();
        assert_eq!(text, r#"{"Zeta":1,"Alpha":null}"#);
        assert!(!record.is_all_null());
        assert_eq!(record.get("Alpha"), Some(&Scalar::Null));
    }
}
