//! Serializable registration configuration.
//!
//! Policies and relations can be declared as data and turned into an
//! [`EntityRegistry`](crate::registry::EntityRegistry) with
//! [`EntityRegistry::from_config`](crate::registry::EntityRegistry::from_config).
//! Hooks are code, so they are attached on the
//! [`RegistryBuilder`](crate::registry::RegistryBuilder) instead.
//!
//! # Example
//!
//! ```
//! use helios_tombstone::config::RegistryConfig;
//!
//! let config: RegistryConfig = serde_json::from_str(r#"{
//!     "entities": [
//!         {
//!             "entity_type": "androids",
//!             "policy": {},
//!             "relations": [
//!                 {
//!                     "name": "components",
//!                     "kind": "has_many",
//!                     "target_type": "components",
//!                     "foreign_key": "android_id",
//!                     "dependent": true
//!                 }
//!             ]
//!         },
//!         {
//!             "entity_type": "pirates",
//!             "policy": {
//!                 "field": "alive",
//!                 "destroyed": { "kind": "literal", "value": false },
//!                 "not_destroyed": true
//!             }
//!         }
//!     ]
//! }"#).unwrap();
//!
//! assert_eq!(config.entities.len(), 2);
//! assert_eq!(config.entities[0].policy.as_ref().unwrap().field, "deleted_at");
//! ```

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::RegistryError;
use crate::policy::{DestroyedValue, ScopePolicy};
use crate::types::{RelationDescriptor, RelationKind, RestoreRule};

/// Source of the destroyed value.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DestroyedValueConfig {
    /// The current UTC time, evaluated per destroy.
    #[default]
    CurrentTimestamp,
    /// A fixed value.
    Literal { value: Value },
}

/// Soft-delete policy configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PolicyConfig {
    /// Tombstone field name.
    #[serde(default = "default_field")]
    pub field: String,

    /// Value written on destroy.
    #[serde(default)]
    pub destroyed: DestroyedValueConfig,

    /// Sentinel meaning "active".
    #[serde(default)]
    pub not_destroyed: Value,
}

fn default_field() -> String {
    "deleted_at".to_string()
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            field: default_field(),
            destroyed: DestroyedValueConfig::default(),
            not_destroyed: Value::Null,
        }
    }
}

impl PolicyConfig {
    /// Builds the validated policy.
    pub fn to_policy(&self) -> Result<ScopePolicy, RegistryError> {
        let destroyed = match &self.destroyed {
            DestroyedValueConfig::CurrentTimestamp => DestroyedValue::current_timestamp(),
            DestroyedValueConfig::Literal { value } => DestroyedValue::Fixed(value.clone()),
        };
        ScopePolicy::new(self.field.clone(), destroyed, self.not_destroyed.clone())
    }
}

/// Relation configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelationConfig {
    /// Relation name.
    pub name: String,

    /// Relation direction.
    pub kind: RelationKind,

    /// Target entity type.
    pub target_type: String,

    /// Foreign key field.
    pub foreign_key: String,

    /// Referenced key field.
    #[serde(default = "default_primary_key")]
    pub primary_key: String,

    /// Dependent-on-destroy.
    #[serde(default)]
    pub dependent: bool,

    /// Overrides the restore rule derived from `kind` and `dependent`.
    #[serde(default)]
    pub restore_rule: Option<RestoreRule>,
}

fn default_primary_key() -> String {
    "id".to_string()
}

impl RelationConfig {
    /// Builds the relation descriptor.
    pub fn to_descriptor(&self) -> RelationDescriptor {
        let base = match self.kind {
            RelationKind::HasMany => {
                RelationDescriptor::has_many(&self.name, &self.target_type, &self.foreign_key)
            }
            RelationKind::HasOne => {
                RelationDescriptor::has_one(&self.name, &self.target_type, &self.foreign_key)
            }
            RelationKind::BelongsTo => {
                RelationDescriptor::belongs_to(&self.name, &self.target_type, &self.foreign_key)
            }
        };
        let mut descriptor = base.with_primary_key(&self.primary_key);
        if self.dependent {
            descriptor = descriptor.dependent();
        }
        if let Some(rule) = self.restore_rule {
            descriptor = descriptor.with_restore_rule(rule);
        }
        descriptor
    }
}

/// One entity type's configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityConfig {
    /// Entity type name.
    pub entity_type: String,

    /// Soft-delete policy; absent for plain entity types.
    #[serde(default)]
    pub policy: Option<PolicyConfig>,

    /// Declared relations.
    #[serde(default)]
    pub relations: Vec<RelationConfig>,
}

/// Configuration for a whole registry.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct RegistryConfig {
    /// Entity types to register.
    #[serde(default)]
    pub entities: Vec<EntityConfig>,
}
