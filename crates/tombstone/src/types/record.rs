//! Stored record types.
//!
//! This module defines [`StoredRecord`], the opaque row this layer reads and
//! writes, and [`RecordKey`], its `(entity type, id)` identity.

use std::cmp::Ordering;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

static NULL: Value = Value::Null;

/// Identity of a record: its entity type and logical ID.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RecordKey {
    /// The entity type (table) the record belongs to.
    pub entity_type: String,
    /// The record's logical ID.
    pub id: String,
}

impl RecordKey {
    /// Creates a new record key.
    pub fn new(entity_type: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            entity_type: entity_type.into(),
            id: id.into(),
        }
    }
}

impl fmt::Display for RecordKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.entity_type, self.id)
    }
}

/// A record owned by the external store.
///
/// The tombstone layer only ever reads and writes the tombstone field and the
/// key fields used for relationship traversal; everything else is carried
/// through untouched. The `id` field is always present in [`fields`](Self::fields).
///
/// # Examples
///
/// ```
/// use helios_tombstone::types::StoredRecord;
/// use serde_json::json;
///
/// let record = StoredRecord::from_value("androids", "r2d2", json!({"name": "R2D2"}));
/// assert_eq!(record.id(), "r2d2");
/// assert_eq!(record.get("name"), &json!("R2D2"));
/// assert!(record.get("deleted_at").is_null());
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredRecord {
    entity_type: String,
    id: String,
    fields: Map<String, Value>,
}

impl StoredRecord {
    /// Creates a record from a field map, forcing the `id` field to `id`.
    pub fn new(
        entity_type: impl Into<String>,
        id: impl Into<String>,
        mut fields: Map<String, Value>,
    ) -> Self {
        let id = id.into();
        fields.insert("id".to_string(), Value::String(id.clone()));
        Self {
            entity_type: entity_type.into(),
            id,
            fields,
        }
    }

    /// Creates a record from a JSON object. Non-object values yield an empty field map.
    pub fn from_value(entity_type: impl Into<String>, id: impl Into<String>, value: Value) -> Self {
        let fields = match value {
            Value::Object(map) => map,
            _ => Map::new(),
        };
        Self::new(entity_type, id, fields)
    }

    /// Returns the entity type.
    pub fn entity_type(&self) -> &str {
        &self.entity_type
    }

    /// Returns the record's logical ID.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Returns the record's key.
    pub fn key(&self) -> RecordKey {
        RecordKey::new(&self.entity_type, &self.id)
    }

    /// Returns all fields.
    pub fn fields(&self) -> &Map<String, Value> {
        &self.fields
    }

    /// Returns a field value; missing fields read as `null`.
    pub fn get(&self, field: &str) -> &Value {
        self.fields.get(field).unwrap_or(&NULL)
    }

    /// Sets a field value. Setting `id` is ignored.
    pub fn set(&mut self, field: impl Into<String>, value: Value) {
        let field = field.into();
        if field == "id" {
            return;
        }
        self.fields.insert(field, value);
    }

    /// Merges the given fields into this record, leaving `id` untouched.
    pub fn merge(&mut self, fields: Map<String, Value>) {
        for (field, value) in fields {
            self.set(field, value);
        }
    }

    /// Consumes the record, returning its field map.
    pub fn into_fields(self) -> Map<String, Value> {
        self.fields
    }
}

/// Null-safe equality between field values.
///
/// Numbers compare by value regardless of integer/float representation, so
/// `1` equals `1.0`. `null` equals only `null`.
pub fn values_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => match (x.as_f64(), y.as_f64()) {
            (Some(x), Some(y)) => x == y,
            _ => x == y,
        },
        _ => a == b,
    }
}

/// Total ordering over field values used for sorting.
///
/// `null` sorts first, then booleans, numbers, strings, and finally
/// composite values compared by their JSON text.
pub fn compare_values(a: &Value, b: &Value) -> Ordering {
    fn rank(v: &Value) -> u8 {
        match v {
            Value::Null => 0,
            Value::Bool(_) => 1,
            Value::Number(_) => 2,
            Value::String(_) => 3,
            Value::Array(_) | Value::Object(_) => 4,
        }
    }

    match (a, b) {
        (Value::Bool(x), Value::Bool(y)) => x.cmp(y),
        (Value::Number(x), Value::Number(y)) => {
            let x = x.as_f64().unwrap_or(f64::NAN);
            let y = y.as_f64().unwrap_or(f64::NAN);
            x.partial_cmp(&y).unwrap_or(Ordering::Equal)
        }
        (Value::String(x), Value::String(y)) => x.cmp(y),
        _ if rank(a) == rank(b) => a.to_string().cmp(&b.to_string()),
        _ => rank(a).cmp(&rank(b)),
    }
}

/// Renders a key field value as a record ID, if it can act as one.
pub fn value_as_id(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_new_forces_id_field() {
        let mut fields = Map::new();
        fields.insert("id".to_string(), json!("other"));
        let record = StoredRecord::new("androids", "r2d2", fields);
        assert_eq!(record.get("id"), &json!("r2d2"));
    }

    #[test]
    fn test_set_ignores_id() {
        let mut record = StoredRecord::from_value("androids", "r2d2", json!({}));
        record.set("id", json!("c3p0"));
        record.set("name", json!("R2D2"));
        assert_eq!(record.id(), "r2d2");
        assert_eq!(record.get("name"), &json!("R2D2"));
    }

    #[test]
    fn test_values_equal_numbers() {
        assert!(values_equal(&json!(1), &json!(1.0)));
        assert!(!values_equal(&json!(1), &json!(2)));
        assert!(values_equal(&Value::Null, &Value::Null));
        assert!(!values_equal(&Value::Null, &json!(false)));
    }

    #[test]
    fn test_compare_values_ranks() {
        assert_eq!(compare_values(&Value::Null, &json!(1)), Ordering::Less);
        assert_eq!(compare_values(&json!(2), &json!(10)), Ordering::Less);
        assert_eq!(compare_values(&json!("b"), &json!("a")), Ordering::Greater);
        assert_eq!(compare_values(&json!(true), &json!("a")), Ordering::Less);
    }

    #[test]
    fn test_record_key_display() {
        assert_eq!(RecordKey::new("dents", "d1").to_string(), "dents/d1");
    }

    #[test]
    fn test_value_as_id() {
        assert_eq!(value_as_id(&json!("a")), Some("a".to_string()));
        assert_eq!(value_as_id(&json!(7)), Some("7".to_string()));
        assert_eq!(value_as_id(&Value::Null), None);
    }
}
