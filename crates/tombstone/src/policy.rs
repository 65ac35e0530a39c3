//! Soft-delete policy for one entity type.
//!
//! A [`ScopePolicy`] names the tombstone field and the two values that give it
//! meaning: the value written on destroy, and the sentinel that marks a record
//! as active. It is built once at registration and never mutated afterwards.
//!
//! # Examples
//!
//! ```
//! use helios_tombstone::policy::{DestroyState, ScopePolicy};
//! use helios_tombstone::types::StoredRecord;
//! use serde_json::json;
//!
//! // Timestamp polarity: null means active.
//! let policy = ScopePolicy::timestamp("deleted_at");
//! let record = StoredRecord::from_value("androids", "r2d2", json!({"deleted_at": null}));
//! assert_eq!(policy.state_of(&record), DestroyState::Active);
//!
//! // Flag polarity: `alive = false` means destroyed.
//! let pirates = ScopePolicy::flag("alive", false).unwrap();
//! let dead = StoredRecord::from_value("pirates", "p1", json!({"alive": false}));
//! assert_eq!(pirates.state_of(&dead), DestroyState::SoftDeleted);
//! ```

use std::fmt;
use std::sync::Arc;

use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{RegistryError, TombstoneResult};
use crate::types::{Condition, StoredRecord, values_equal};

/// Zero-argument provider for the destroyed value.
pub type ValueProvider = Arc<dyn Fn() -> Value + Send + Sync>;

/// The value written to the tombstone field on destroy.
#[derive(Clone)]
pub enum DestroyedValue {
    /// A fixed literal.
    Fixed(Value),
    /// Evaluated once per destroy call.
    Provider(ValueProvider),
}

impl DestroyedValue {
    /// Provider yielding the current UTC time as an RFC 3339 string.
    pub fn current_timestamp() -> Self {
        DestroyedValue::Provider(Arc::new(|| {
            Value::String(Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true))
        }))
    }

    /// Wraps a closure as a provider.
    pub fn provider<F>(f: F) -> Self
    where
        F: Fn() -> Value + Send + Sync + 'static,
    {
        DestroyedValue::Provider(Arc::new(f))
    }

    /// Resolves the value. Providers are invoked on every call.
    pub fn resolve(&self) -> Value {
        match self {
            DestroyedValue::Fixed(v) => v.clone(),
            DestroyedValue::Provider(f) => f(),
        }
    }
}

impl fmt::Debug for DestroyedValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DestroyedValue::Fixed(v) => f.debug_tuple("Fixed").field(v).finish(),
            DestroyedValue::Provider(_) => f.write_str("Provider(..)"),
        }
    }
}

/// Logical delete state of a record, implied by its tombstone field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DestroyState {
    /// The tombstone field holds the not-destroyed sentinel.
    Active,
    /// The tombstone field holds anything else.
    SoftDeleted,
    /// No row exists.
    HardDeleted,
}

impl DestroyState {
    /// Returns `true` for `Active`.
    pub fn is_active(&self) -> bool {
        matches!(self, DestroyState::Active)
    }
}

impl fmt::Display for DestroyState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DestroyState::Active => write!(f, "active"),
            DestroyState::SoftDeleted => write!(f, "soft-deleted"),
            DestroyState::HardDeleted => write!(f, "hard-deleted"),
        }
    }
}

/// Immutable soft-delete configuration for one entity type.
#[derive(Debug, Clone)]
pub struct ScopePolicy {
    tombstone_field: String,
    destroyed_value: DestroyedValue,
    not_destroyed_value: Value,
}

impl ScopePolicy {
    /// Builds a policy.
    ///
    /// Fails if the field name is empty, or if a fixed destroyed value equals
    /// the not-destroyed sentinel.
    pub fn new(
        tombstone_field: impl Into<String>,
        destroyed_value: DestroyedValue,
        not_destroyed_value: Value,
    ) -> Result<Self, RegistryError> {
        let tombstone_field = tombstone_field.into();
        if tombstone_field.is_empty() || tombstone_field == "id" {
            return Err(RegistryError::InvalidPolicy {
                field: tombstone_field,
                message: "tombstone field must be a non-key attribute".to_string(),
            });
        }
        if let DestroyedValue::Fixed(value) = &destroyed_value {
            if values_equal(value, &not_destroyed_value) {
                return Err(RegistryError::InvalidPolicy {
                    field: tombstone_field,
                    message: format!("destroyed value {value} equals the not-destroyed value"),
                });
            }
        }
        Ok(Self {
            tombstone_field,
            destroyed_value,
            not_destroyed_value,
        })
    }

    /// Timestamp policy: `null` is active, destroy writes the current time.
    pub fn timestamp(field: impl Into<String>) -> Self {
        Self {
            tombstone_field: field.into(),
            destroyed_value: DestroyedValue::current_timestamp(),
            not_destroyed_value: Value::Null,
        }
    }

    /// Boolean policy: destroy writes `destroyed`, active is `!destroyed`.
    pub fn flag(field: impl Into<String>, destroyed: bool) -> Result<Self, RegistryError> {
        Self::new(
            field,
            DestroyedValue::Fixed(Value::Bool(destroyed)),
            Value::Bool(!destroyed),
        )
    }

    /// Returns the tombstone field name.
    pub fn tombstone_field(&self) -> &str {
        &self.tombstone_field
    }

    /// Returns the destroyed value source.
    pub fn destroyed_value(&self) -> &DestroyedValue {
        &self.destroyed_value
    }

    /// Returns the not-destroyed sentinel.
    pub fn not_destroyed_value(&self) -> &Value {
        &self.not_destroyed_value
    }

    /// The default-scope filter: `tombstone_field == not_destroyed_value`.
    pub fn active_condition(&self) -> Condition {
        Condition::eq(self.tombstone_field.clone(), self.not_destroyed_value.clone())
    }

    /// The deleted-only filter: `tombstone_field != not_destroyed_value`.
    pub fn deleted_condition(&self) -> Condition {
        Condition::not_eq(self.tombstone_field.clone(), self.not_destroyed_value.clone())
    }

    /// Resolves the destroyed value for one destroy call.
    ///
    /// A provider that yields the not-destroyed sentinel is rejected, since the
    /// resulting record would be indistinguishable from an active one.
    pub fn resolve_destroyed(&self) -> TombstoneResult<Value> {
        let value = self.destroyed_value.resolve();
        if values_equal(&value, &self.not_destroyed_value) {
            return Err(RegistryError::InvalidPolicy {
                field: self.tombstone_field.clone(),
                message: format!("destroyed value {value} equals the not-destroyed value"),
            }
            .into());
        }
        Ok(value)
    }

    /// Returns the record's state according to this policy.
    pub fn state_of(&self, record: &StoredRecord) -> DestroyState {
        if self.is_active(record) {
            DestroyState::Active
        } else {
            DestroyState::SoftDeleted
        }
    }

    /// Returns `true` if the record's tombstone field holds the sentinel.
    pub fn is_active(&self, record: &StoredRecord) -> bool {
        values_equal(record.get(&self.tombstone_field), &self.not_destroyed_value)
    }
}

impl Default for ScopePolicy {
    fn default() -> Self {
        Self::timestamp("deleted_at")
    }
}
