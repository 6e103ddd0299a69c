//! Dynamically-typed list records and tabular results.
//!
//! Remote list items are duck-typed JSON; modeling values as a tagged union
//! keeps the schema-inference step explicit and testable.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A single scalar value from a remote list field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    /// No value (null).
    Null,
    /// Boolean value.
    Bool(bool),
    /// Integral numeric value.
    Int(i64),
    /// Floating-point numeric value.
    Float(f64),
    /// Text value.
    Text(String),
}

impl FieldValue {
    /// Check if this is a null value.
    pub fn is_null(&self) -> bool {
        matches!(self, FieldValue::Null)
    }

    /// Get as a string slice if this is a text value.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            FieldValue::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Get as an integer if this is an integral value.
    pub fn as_int(&self) -> Option<i64> {
        match self {
            FieldValue::Int(n) => Some(*n),
            _ => None,
        }
    }

    /// Convert a JSON scalar into a field value.
    ///
    /// Numbers that fit an `i64` become [`FieldValue::Int`]; other numbers
    /// become [`FieldValue::Float`]. Arrays and objects (which only appear
    /// here when flattening was disabled for them) are stored as compact
    /// JSON text so no data is silently lost.
    pub fn from_json(value: &Value) -> Self {
        match value {
            Value::Null => FieldValue::Null,
            Value::Bool(b) => FieldValue::Bool(*b),
            Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    FieldValue::Int(i)
                } else {
                    FieldValue::Float(n.as_f64().unwrap_or_default())
                }
            }
            Value::String(s) => FieldValue::Text(s.clone()),
            other => FieldValue::Text(other.to_string()),
        }
    }

    /// Render the value as text, the representation used for text-typed
    /// destination columns.
    pub fn to_text(&self) -> Option<String> {
        match self {
            FieldValue::Null => None,
            FieldValue::Bool(b) => Some(b.to_string()),
            FieldValue::Int(n) => Some(n.to_string()),
            FieldValue::Float(f) => Some(f.to_string()),
            FieldValue::Text(s) => Some(s.clone()),
        }
    }
}

impl From<&str> for FieldValue {
    fn from(s: &str) -> Self {
        FieldValue::Text(s.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(s: String) -> Self {
        FieldValue::Text(s)
    }
}

impl From<i64> for FieldValue {
    fn from(n: i64) -> Self {
        FieldValue::Int(n)
    }
}

impl From<f64> for FieldValue {
    fn from(f: f64) -> Self {
        FieldValue::Float(f)
    }
}

impl From<bool> for FieldValue {
    fn from(b: bool) -> Self {
        FieldValue::Bool(b)
    }
}

/// One row of remote list data: field name to scalar value.
///
/// Ordered so the column union derived from a batch of records is
/// deterministic.
pub type ListRecord = BTreeMap<String, FieldValue>;

/// An ordered sequence of records plus the union of column names seen
/// across them, in first-seen order.
///
/// Remote records may carry heterogeneous optional fields, so the column
/// union can be wider than any single record. Held in memory for the
/// duration of one sync run and discarded after the write phase.
#[derive(Debug, Clone, Default)]
pub struct TabularResult {
    records: Vec<ListRecord>,
    columns: Vec<String>,
}

impl TabularResult {
    /// Create an empty result.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a record, folding its field names into the column union.
    pub fn push(&mut self, record: ListRecord) {
        for name in record.keys() {
            if !self.columns.iter().any(|c| c == name) {
                self.columns.push(name.clone());
            }
        }
        self.records.push(record);
    }

    /// The records in arrival order.
    pub fn records(&self) -> &[ListRecord] {
        &self.records
    }

    /// Union of column names in first-seen order.
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// Number of records.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Check whether the result holds no records.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Iterate over all values present for a column, skipping records
    /// where the field is absent.
    pub fn column_values<'a>(&'a self, column: &'a str) -> impl Iterator<Item = &'a FieldValue> {
        self.records.iter().filter_map(move |r| r.get(column))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_field_value_from_json_scalars() {
        assert_eq!(FieldValue::from_json(&json!(null)), FieldValue::Null);
        assert_eq!(FieldValue::from_json(&json!(true)), FieldValue::Bool(true));
        assert_eq!(FieldValue::from_json(&json!(42)), FieldValue::Int(42));
        assert_eq!(FieldValue::from_json(&json!(1.5)), FieldValue::Float(1.5));
        assert_eq!(
            FieldValue::from_json(&json!("hello")),
            FieldValue::Text("hello".to_string())
        );
    }

    #[test]
    fn test_field_value_from_json_array_becomes_text() {
        let v = FieldValue::from_json(&json!([1, 2]));
        assert_eq!(v, FieldValue::Text("[1,2]".to_string()));
    }

    #[test]
    fn test_column_union_first_seen_order() {
        let mut result = TabularResult::new();

        let mut a = ListRecord::new();
        a.insert("title".to_string(), "one".into());
        result.push(a);

        let mut b = ListRecord::new();
        b.insert("title".to_string(), "two".into());
        b.insert("owner".to_string(), "alice".into());
        result.push(b);

        assert_eq!(result.len(), 2);
        assert_eq!(result.columns(), &["title".to_string(), "owner".to_string()]);
    }

    #[test]
    fn test_column_values_skips_missing() {
        let mut result = TabularResult::new();

        let mut a = ListRecord::new();
        a.insert("n".to_string(), FieldValue::Int(1));
        result.push(a);

        let b = ListRecord::new();
        result.push(b);

        let values: Vec<_> = result.column_values("n").collect();
        assert_eq!(values, vec![&FieldValue::Int(1)]);
    }

    #[test]
    fn test_empty_result() {
        let result = TabularResult::new();
        assert!(result.is_empty());
        assert!(result.columns().is_empty());
    }
}
