//! Query types for record reads and aggregates.
//!
//! A [`RecordQuery`] is the request that flows through the
//! [`ScopedQueryGate`](crate::scope::ScopedQueryGate) before it reaches a
//! [`RecordStore`](crate::core::RecordStore). Conditions are null-safe: an
//! equality against `null` matches missing fields, an inequality against
//! `null` matches every present value.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::record::{StoredRecord, compare_values, values_equal};

/// A single filter condition on a record field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Condition {
    /// `field == value` (null-safe).
    Eq { field: String, value: Value },
    /// `field != value` (null-safe).
    NotEq { field: String, value: Value },
    /// `field` equals one of `values`.
    In { field: String, values: Vec<Value> },
}

impl Condition {
    /// Builds an equality condition.
    pub fn eq(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Condition::Eq {
            field: field.into(),
            value: value.into(),
        }
    }

    /// Builds an inequality condition.
    pub fn not_eq(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Condition::NotEq {
            field: field.into(),
            value: value.into(),
        }
    }

    /// Builds a membership condition.
    pub fn is_in(field: impl Into<String>, values: Vec<Value>) -> Self {
        Condition::In {
            field: field.into(),
            values,
        }
    }

    /// Returns the field this condition tests.
    pub fn field(&self) -> &str {
        match self {
            Condition::Eq { field, .. }
            | Condition::NotEq { field, .. }
            | Condition::In { field, .. } => field,
        }
    }

    /// Evaluates the condition against a record.
    pub fn matches(&self, record: &StoredRecord) -> bool {
        match self {
            Condition::Eq { field, value } => values_equal(record.get(field), value),
            Condition::NotEq { field, value } => !values_equal(record.get(field), value),
            Condition::In { field, values } => {
                let actual = record.get(field);
                values.iter().any(|v| values_equal(actual, v))
            }
        }
    }
}

impl fmt::Display for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Condition::Eq { field, value } => write!(f, "{field} = {value}"),
            Condition::NotEq { field, value } => write!(f, "{field} != {value}"),
            Condition::In { field, values } => {
                let rendered: Vec<String> = values.iter().map(Value::to_string).collect();
                write!(f, "{field} IN ({})", rendered.join(", "))
            }
        }
    }
}

/// Sort direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    /// Smallest first.
    #[default]
    Ascending,
    /// Largest first.
    Descending,
}

/// A sort key for ordered reads.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SortKey {
    /// The field to sort by.
    pub field: String,
    /// The direction to sort in.
    #[serde(default)]
    pub direction: SortDirection,
}

impl SortKey {
    /// Ascending sort on `field`.
    pub fn asc(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            direction: SortDirection::Ascending,
        }
    }

    /// Descending sort on `field`.
    pub fn desc(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            direction: SortDirection::Descending,
        }
    }
}

/// A read or aggregate request against one entity type.
///
/// # Examples
///
/// ```
/// use helios_tombstone::types::{RecordQuery, SortKey};
///
/// let query = RecordQuery::new("androids")
///     .where_eq("owner_id", "luke")
///     .with_sort(SortKey::asc("name"))
///     .with_include("components")
///     .with_limit(10);
///
/// assert_eq!(query.entity_type(), "androids");
/// assert_eq!(query.conditions().len(), 1);
/// assert_eq!(query.includes(), ["components"]);
/// ```
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct RecordQuery {
    entity_type: String,
    #[serde(default)]
    conditions: Vec<Condition>,
    #[serde(default)]
    sort: Vec<SortKey>,
    #[serde(default)]
    limit: Option<usize>,
    #[serde(default)]
    offset: Option<usize>,
    #[serde(default)]
    includes: Vec<String>,
}

impl RecordQuery {
    /// Creates an unfiltered query for the given entity type.
    pub fn new(entity_type: impl Into<String>) -> Self {
        Self {
            entity_type: entity_type.into(),
            ..Default::default()
        }
    }

    /// Adds a condition.
    pub fn with_condition(mut self, condition: Condition) -> Self {
        self.conditions.push(condition);
        self
    }

    /// Adds an equality condition.
    pub fn where_eq(self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.with_condition(Condition::eq(field, value))
    }

    /// Adds an inequality condition.
    pub fn where_not(self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.with_condition(Condition::not_eq(field, value))
    }

    /// Adds a membership condition.
    pub fn where_in(self, field: impl Into<String>, values: Vec<Value>) -> Self {
        self.with_condition(Condition::is_in(field, values))
    }

    /// Restricts the query to a single record ID.
    pub fn with_id(self, id: impl Into<String>) -> Self {
        self.where_eq("id", Value::String(id.into()))
    }

    /// Adds a sort key.
    pub fn with_sort(mut self, key: SortKey) -> Self {
        self.sort.push(key);
        self
    }

    /// Limits the number of returned records.
    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Skips the first `offset` matching records.
    pub fn with_offset(mut self, offset: usize) -> Self {
        self.offset = Some(offset);
        self
    }

    /// Requests eager preloading of a named relation.
    pub fn with_include(mut self, relation: impl Into<String>) -> Self {
        self.includes.push(relation.into());
        self
    }

    /// Returns the entity type.
    pub fn entity_type(&self) -> &str {
        &self.entity_type
    }

    /// Returns the conditions.
    pub fn conditions(&self) -> &[Condition] {
        &self.conditions
    }

    /// Returns the sort keys.
    pub fn sort(&self) -> &[SortKey] {
        &self.sort
    }

    /// Returns the limit.
    pub fn limit(&self) -> Option<usize> {
        self.limit
    }

    /// Returns the offset.
    pub fn offset(&self) -> Option<usize> {
        self.offset
    }

    /// Returns the relations to preload.
    pub fn includes(&self) -> &[String] {
        &self.includes
    }

    /// Returns `true` if the exact condition is already present.
    pub fn has_condition(&self, condition: &Condition) -> bool {
        self.conditions.contains(condition)
    }

    /// Returns `true` if the record satisfies every condition.
    pub fn matches(&self, record: &StoredRecord) -> bool {
        record.entity_type() == self.entity_type && self.conditions.iter().all(|c| c.matches(record))
    }

    /// Filters, sorts and pages an in-memory record set according to this query.
    pub fn select<'a, I>(&self, records: I) -> Vec<StoredRecord>
    where
        I: IntoIterator<Item = &'a StoredRecord>,
    {
        let mut selected: Vec<StoredRecord> = records
            .into_iter()
            .filter(|r| self.matches(r))
            .cloned()
            .collect();

        if !self.sort.is_empty() {
            // Stable sort keeps insertion order between equal keys.
            selected.sort_by(|a, b| {
                for key in &self.sort {
                    let ord = compare_values(a.get(&key.field), b.get(&key.field));
                    let ord = match key.direction {
                        SortDirection::Ascending => ord,
                        SortDirection::Descending => ord.reverse(),
                    };
                    if ord.is_ne() {
                        return ord;
                    }
                }
                std::cmp::Ordering::Equal
            });
        }

        let offset = self.offset.unwrap_or(0);
        let iter = selected.into_iter().skip(offset);
        match self.limit {
            Some(limit) => iter.take(limit).collect(),
            None => iter.collect(),
        }
    }
}

/// Records returned by a read, with any preloaded relations.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RecordSet {
    /// The matched records.
    pub records: Vec<StoredRecord>,
    /// Preloaded targets keyed by relation name.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub included: BTreeMap<String, Vec<StoredRecord>>,
}

impl RecordSet {
    /// Wraps plain records.
    pub fn new(records: Vec<StoredRecord>) -> Self {
        Self {
            records,
            included: BTreeMap::new(),
        }
    }

    /// Returns the number of matched records.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Returns `true` if nothing matched.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Returns the IDs of the matched records, in order.
    pub fn ids(&self) -> Vec<&str> {
        self.records.iter().map(StoredRecord::id).collect()
    }

    /// Returns the preloaded targets of a relation.
    pub fn included(&self, relation: &str) -> &[StoredRecord] {
        self.included.get(relation).map(Vec::as_slice).unwrap_or(&[])
    }
}

/// A numeric aggregate over one field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "field", rename_all = "snake_case")]
pub enum Aggregate {
    /// Sum of the field; `0` over an empty set.
    Sum(String),
    /// Mean of the field; `None` over an empty set.
    Average(String),
    /// Smallest value of the field.
    Minimum(String),
    /// Largest value of the field.
    Maximum(String),
}

impl Aggregate {
    /// Returns the aggregated field.
    pub fn field(&self) -> &str {
        match self {
            Aggregate::Sum(f) | Aggregate::Average(f) | Aggregate::Minimum(f) | Aggregate::Maximum(f) => f,
        }
    }

    /// Computes the aggregate over in-memory records. Non-numeric values are skipped.
    pub fn compute<'a, I>(&self, records: I) -> Option<f64>
    where
        I: IntoIterator<Item = &'a StoredRecord>,
    {
        let values: Vec<f64> = records
            .into_iter()
            .filter_map(|r| r.get(self.field()).as_f64())
            .collect();

        match self {
            Aggregate::Sum(_) => Some(values.iter().sum()),
            Aggregate::Average(_) if values.is_empty() => None,
            Aggregate::Average(_) => Some(values.iter().sum::<f64>() / values.len() as f64),
            Aggregate::Minimum(_) => values.into_iter().reduce(f64::min),
            Aggregate::Maximum(_) => values.into_iter().reduce(f64::max),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn android(id: &str, serial: i64, deleted_at: Value) -> StoredRecord {
        StoredRecord::from_value(
            "androids",
            id,
            json!({"serial": serial, "deleted_at": deleted_at}),
        )
    }

    #[test]
    fn test_null_safe_conditions() {
        let active = android("a", 1, Value::Null);
        let deleted = android("b", 2, json!("2024-01-01T00:00:00Z"));

        let is_active = Condition::eq("deleted_at", Value::Null);
        let is_deleted = Condition::not_eq("deleted_at", Value::Null);

        assert!(is_active.matches(&active));
        assert!(!is_active.matches(&deleted));
        assert!(is_deleted.matches(&deleted));
        assert!(!is_deleted.matches(&active));
    }

    #[test]
    fn test_missing_field_reads_as_null() {
        let record = StoredRecord::from_value("androids", "a", json!({}));
        assert!(Condition::eq("deleted_at", Value::Null).matches(&record));
    }

    #[test]
    fn test_in_condition() {
        let record = android("a", 3, Value::Null);
        assert!(Condition::is_in("serial", vec![json!(1), json!(3)]).matches(&record));
        assert!(!Condition::is_in("serial", vec![json!(2)]).matches(&record));
    }

    #[test]
    fn test_select_sorts_and_pages() {
        let records = vec![android("a", 3, Value::Null), android("b", 1, Value::Null), android("c", 2, Value::Null)];
        let query = RecordQuery::new("androids")
            .with_sort(SortKey::desc("serial"))
            .with_offset(1)
            .with_limit(1);
        let selected = query.select(&records);
        assert_eq!(selected.len(), 1);
        assert_eq!(selected[0].id(), "c");
    }

    #[test]
    fn test_select_ignores_other_entity_types() {
        let other = StoredRecord::from_value("people", "a", json!({}));
        assert!(RecordQuery::new("androids").select([&other]).is_empty());
    }

    #[test]
    fn test_aggregates() {
        let records = vec![android("a", 2, Value::Null), android("b", 4, Value::Null)];
        assert_eq!(Aggregate::Sum("serial".into()).compute(&records), Some(6.0));
        assert_eq!(Aggregate::Average("serial".into()).compute(&records), Some(3.0));
        assert_eq!(Aggregate::Minimum("serial".into()).compute(&records), Some(2.0));
        assert_eq!(Aggregate::Maximum("serial".into()).compute(&records), Some(4.0));

        let empty: Vec<StoredRecord> = Vec::new();
        assert_eq!(Aggregate::Sum("serial".into()).compute(&empty), Some(0.0));
        assert_eq!(Aggregate::Average("serial".into()).compute(&empty), None);
    }

    #[test]
    fn test_condition_display() {
        assert_eq!(Condition::eq("alive", true).to_string(), "alive = true");
        assert_eq!(
            Condition::not_eq("deleted_at", Value::Null).to_string(),
            "deleted_at != null"
        );
    }
}
