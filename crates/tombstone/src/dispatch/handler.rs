//! Named-operation calls, results and fallback handlers.

use std::fmt;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::TombstoneResult;
use crate::scope::OperationContext;
use crate::storage::TombstoneStorage;
use crate::types::{RecordQuery, RecordSet, StoredRecord};

/// Arguments to a named operation.
#[derive(Debug, Clone, Default)]
pub struct OperationArgs {
    /// Query to run; defaults to every record of the entity type.
    pub query: Option<RecordQuery>,
    /// Field for aggregates.
    pub field: Option<String>,
}

impl OperationArgs {
    /// Creates empty arguments.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the query.
    pub fn with_query(mut self, query: RecordQuery) -> Self {
        self.query = Some(query);
        self
    }

    /// Sets the aggregate field.
    pub fn with_field(mut self, field: impl Into<String>) -> Self {
        self.field = Some(field.into());
        self
    }
}

/// What an operation is invoked on.
#[derive(Debug, Clone)]
pub enum OperationTarget {
    /// A whole entity type.
    Type(String),
    /// One record.
    Record(StoredRecord),
}

impl OperationTarget {
    /// Returns the entity type of the target.
    pub fn entity_type(&self) -> &str {
        match self {
            OperationTarget::Type(entity_type) => entity_type,
            OperationTarget::Record(record) => record.entity_type(),
        }
    }

    /// Returns the record, for record targets.
    pub fn record(&self) -> Option<&StoredRecord> {
        match self {
            OperationTarget::Record(record) => Some(record),
            OperationTarget::Type(_) => None,
        }
    }
}

impl fmt::Display for OperationTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OperationTarget::Type(entity_type) => write!(f, "entity type {entity_type}"),
            OperationTarget::Record(record) => write!(f, "record {}", record.key()),
        }
    }
}

/// A named operation call.
#[derive(Debug, Clone)]
pub struct OperationCall {
    /// The target.
    pub target: OperationTarget,
    /// The operation name as requested, modifier included.
    pub name: String,
    /// The arguments.
    pub args: OperationArgs,
}

impl OperationCall {
    /// A call on an entity type.
    pub fn on_type(entity_type: impl Into<String>, name: impl Into<String>, args: OperationArgs) -> Self {
        Self {
            target: OperationTarget::Type(entity_type.into()),
            name: name.into(),
            args,
        }
    }

    /// A call on a record.
    pub fn on_record(record: StoredRecord, name: impl Into<String>) -> Self {
        Self {
            target: OperationTarget::Record(record),
            name: name.into(),
            args: OperationArgs::default(),
        }
    }

    /// Returns the target entity type.
    pub fn entity_type(&self) -> &str {
        self.target.entity_type()
    }

    /// Returns the call's query, or an unfiltered query over the target type.
    pub fn query(&self) -> RecordQuery {
        self.args
            .query
            .clone()
            .unwrap_or_else(|| RecordQuery::new(self.entity_type()))
    }
}

/// Result of a named operation.
#[derive(Debug, Clone, PartialEq)]
pub enum OperationOutput {
    /// Many records (`all`, has-many accessors).
    Records(RecordSet),
    /// At most one record (`first`, singular accessors).
    Record(Option<StoredRecord>),
    /// A count.
    Count(u64),
    /// A numeric aggregate.
    Number(Option<f64>),
    /// An existence check.
    Bool(bool),
    /// Output of a caller-supplied handler.
    Custom(Value),
}

impl OperationOutput {
    /// Returns the records, for `Records` and `Record` outputs.
    pub fn records(&self) -> Vec<&StoredRecord> {
        match self {
            OperationOutput::Records(set) => set.records.iter().collect(),
            OperationOutput::Record(record) => record.iter().collect(),
            _ => Vec::new(),
        }
    }

    /// Returns the count, for `Count` outputs.
    pub fn as_count(&self) -> Option<u64> {
        match self {
            OperationOutput::Count(n) => Some(*n),
            _ => None,
        }
    }

    /// Returns the number, for `Number` outputs.
    pub fn as_number(&self) -> Option<f64> {
        match self {
            OperationOutput::Number(n) => *n,
            _ => None,
        }
    }

    /// Returns the flag, for `Bool` outputs.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            OperationOutput::Bool(b) => Some(*b),
            _ => None,
        }
    }
}

/// Handles operation names the tombstone layer does not recognise.
///
/// Handlers are consulted in registration order after variant and base
/// dispatch have failed. Return `Ok(None)` to pass the call along.
///
/// # Example
///
/// ```
/// use async_trait::async_trait;
/// use helios_tombstone::dispatch::{OperationCall, OperationHandler, OperationOutput};
/// use helios_tombstone::scope::OperationContext;
/// use helios_tombstone::storage::TombstoneStorage;
/// use helios_tombstone::TombstoneResult;
/// use serde_json::json;
///
/// struct Greeting;
///
/// #[async_trait]
/// impl OperationHandler for Greeting {
///     async fn handle(
///         &self,
///         _storage: &TombstoneStorage,
///         _ctx: &OperationContext,
///         call: &OperationCall,
///     ) -> TombstoneResult<Option<OperationOutput>> {
///         if call.name == "greet" {
///             return Ok(Some(OperationOutput::Custom(json!("hello"))));
///         }
///         Ok(None)
///     }
/// }
/// ```
#[async_trait]
pub trait OperationHandler: Send + Sync {
    /// Handles the call, or returns `None` to let the next handler try.
    async fn handle(
        &self,
        storage: &TombstoneStorage,
        ctx: &OperationContext,
        call: &OperationCall,
    ) -> TombstoneResult<Option<OperationOutput>>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_call_default_query() {
        let call = OperationCall::on_type("androids", "count", OperationArgs::new());
        assert_eq!(call.query(), RecordQuery::new("androids"));
    }

    #[test]
    fn test_record_target() {
        let record = StoredRecord::from_value("components", "c1", json!({}));
        let call = OperationCall::on_record(record, "android-including-deleted");
        assert_eq!(call.entity_type(), "components");
        assert!(call.target.record().is_some());
        assert_eq!(call.target.to_string(), "record components/c1");
    }

    #[test]
    fn test_output_accessors() {
        assert_eq!(OperationOutput::Count(3).as_count(), Some(3));
        assert_eq!(OperationOutput::Number(Some(1.5)).as_number(), Some(1.5));
        assert_eq!(OperationOutput::Bool(true).as_bool(), Some(true));
        assert!(OperationOutput::Record(None).records().is_empty());
    }
}
