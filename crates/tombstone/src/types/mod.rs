//! Core types for the tombstone layer.
//!
//! - [`StoredRecord`], [`RecordKey`] - Opaque records and their identity
//! - [`RecordQuery`], [`Condition`], [`SortKey`], [`Aggregate`] - Read and aggregate requests
//! - [`RecordSet`] - Read results with preloaded relations
//! - [`RelationDescriptor`], [`RelationKind`], [`RestoreRule`] - Relationship metadata
//!
//! # Examples
//!
//! ```
//! use helios_tombstone::types::{Condition, RecordQuery, StoredRecord};
//! use serde_json::json;
//!
//! let record = StoredRecord::from_value("dings", "d1", json!({"not_deleted": true}));
//! let query = RecordQuery::new("dings").with_condition(Condition::eq("not_deleted", true));
//!
//! assert!(query.matches(&record));
//! ```

mod query;
mod record;
mod relation;

pub use query::{Aggregate, Condition, RecordQuery, RecordSet, SortDirection, SortKey};
pub use record::{RecordKey, StoredRecord, compare_values, value_as_id, values_equal};
pub use relation::{RelationDescriptor, RelationKind, RestoreRule};
