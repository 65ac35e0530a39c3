//! Per-entity-type registration.
//!
//! An [`EntityRegistry`] holds, for each entity type, its optional
//! [`ScopePolicy`], its declared relations and its lifecycle hooks. It is
//! assembled once with a [`RegistryBuilder`] and is read-only afterwards;
//! every operation borrows it instead of consulting shared mutable state.
//!
//! # Example
//!
//! ```
//! use helios_tombstone::policy::ScopePolicy;
//! use helios_tombstone::registry::{EntityRegistration, EntityRegistry};
//! use helios_tombstone::types::RelationDescriptor;
//!
//! let registry = EntityRegistry::builder()
//!     .register(
//!         EntityRegistration::soft_deletable("androids", ScopePolicy::timestamp("deleted_at"))
//!             .with_relation(RelationDescriptor::has_many("components", "components", "android_id").dependent()),
//!     )
//!     .register(EntityRegistration::soft_deletable("components", ScopePolicy::timestamp("deleted_at")))
//!     .build()
//!     .unwrap();
//!
//! assert!(registry.is_soft_deletable("androids"));
//! assert!(registry.relation("androids", "components").is_ok());
//! ```

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;

use tracing::debug;

use crate::config::RegistryConfig;
use crate::core::{LifecycleHooks, NoopHooks};
use crate::error::RegistryError;
use crate::policy::ScopePolicy;
use crate::types::RelationDescriptor;

/// Everything registered for one entity type.
#[derive(Clone)]
pub struct EntityRegistration {
    entity_type: String,
    policy: Option<ScopePolicy>,
    relations: Vec<RelationDescriptor>,
    hooks: Arc<dyn LifecycleHooks>,
}

impl EntityRegistration {
    /// Registers a soft-deletable entity type.
    pub fn soft_deletable(entity_type: impl Into<String>, policy: ScopePolicy) -> Self {
        Self {
            entity_type: entity_type.into(),
            policy: Some(policy),
            relations: Vec::new(),
            hooks: Arc::new(NoopHooks),
        }
    }

    /// Registers an entity type without a soft-delete policy.
    ///
    /// Plain types are never filtered, but may still own relations to
    /// soft-deletable types and take part in cascades.
    pub fn plain(entity_type: impl Into<String>) -> Self {
        Self {
            entity_type: entity_type.into(),
            policy: None,
            relations: Vec::new(),
            hooks: Arc::new(NoopHooks),
        }
    }

    /// Declares a relation.
    pub fn with_relation(mut self, relation: RelationDescriptor) -> Self {
        self.relations.push(relation);
        self
    }

    /// Attaches lifecycle hooks.
    pub fn with_hooks<H: LifecycleHooks + 'static>(self, hooks: H) -> Self {
        self.with_shared_hooks(Arc::new(hooks))
    }

    /// Attaches shared lifecycle hooks.
    pub fn with_shared_hooks(mut self, hooks: Arc<dyn LifecycleHooks>) -> Self {
        self.hooks = hooks;
        self
    }

    /// Returns the entity type.
    pub fn entity_type(&self) -> &str {
        &self.entity_type
    }

    /// Returns the policy, if the type is soft-deletable.
    pub fn policy(&self) -> Option<&ScopePolicy> {
        self.policy.as_ref()
    }

    /// Returns the declared relations in declaration order.
    pub fn relations(&self) -> &[RelationDescriptor] {
        &self.relations
    }

    /// Returns the relation with the given name.
    pub fn relation(&self, name: &str) -> Option<&RelationDescriptor> {
        self.relations.iter().find(|r| r.name == name)
    }

    /// Returns the lifecycle hooks.
    pub fn hooks(&self) -> &Arc<dyn LifecycleHooks> {
        &self.hooks
    }
}

impl fmt::Debug for EntityRegistration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EntityRegistration")
            .field("entity_type", &self.entity_type)
            .field("policy", &self.policy)
            .field("relations", &self.relations)
            .finish_non_exhaustive()
    }
}

/// Builder for [`EntityRegistry`].
#[derive(Debug, Default)]
pub struct RegistryBuilder {
    entries: Vec<EntityRegistration>,
}

impl RegistryBuilder {
    /// Creates an empty builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds a builder from configuration. Hooks default to no-ops.
    pub fn from_config(config: &RegistryConfig) -> Result<Self, RegistryError> {
        let mut builder = Self::new();
        for entity in &config.entities {
            let mut registration = match &entity.policy {
                Some(policy) => {
                    EntityRegistration::soft_deletable(&entity.entity_type, policy.to_policy()?)
                }
                None => EntityRegistration::plain(&entity.entity_type),
            };
            for relation in &entity.relations {
                registration = registration.with_relation(relation.to_descriptor());
            }
            builder = builder.register(registration);
        }
        Ok(builder)
    }

    /// Adds a registration.
    pub fn register(mut self, registration: EntityRegistration) -> Self {
        self.entries.push(registration);
        self
    }

    /// Attaches hooks to an entity type, adding it as a plain type if it is not registered yet.
    pub fn with_hooks<H: LifecycleHooks + 'static>(mut self, entity_type: &str, hooks: H) -> Self {
        let hooks: Arc<dyn LifecycleHooks> = Arc::new(hooks);
        match self.entries.iter_mut().find(|e| e.entity_type == entity_type) {
            Some(entry) => entry.hooks = hooks,
            None => self
                .entries
                .push(EntityRegistration::plain(entity_type).with_shared_hooks(hooks)),
        }
        self
    }

    /// Validates and freezes the registry.
    ///
    /// # Errors
    ///
    /// - `DuplicateRegistration` if a type was registered twice
    /// - `DuplicateRelation` if a type declares two relations with the same name
    pub fn build(self) -> Result<EntityRegistry, RegistryError> {
        let mut entities = HashMap::with_capacity(self.entries.len());
        for entry in self.entries {
            let mut names = HashSet::new();
            for relation in &entry.relations {
                if !names.insert(relation.name.as_str()) {
                    return Err(RegistryError::DuplicateRelation {
                        entity_type: entry.entity_type.clone(),
                        relation: relation.name.clone(),
                    });
                }
            }
            if entities.contains_key(&entry.entity_type) {
                return Err(RegistryError::DuplicateRegistration {
                    entity_type: entry.entity_type,
                });
            }
            debug!(
                entity_type = %entry.entity_type,
                soft_deletable = entry.policy.is_some(),
                relations = entry.relations.len(),
                "Registered entity type"
            );
            entities.insert(entry.entity_type.clone(), entry);
        }
        Ok(EntityRegistry { entities })
    }
}

/// Frozen per-entity-type configuration.
#[derive(Debug, Default)]
pub struct EntityRegistry {
    entities: HashMap<String, EntityRegistration>,
}

impl EntityRegistry {
    /// Starts a builder.
    pub fn builder() -> RegistryBuilder {
        RegistryBuilder::new()
    }

    /// Builds a registry straight from configuration, with no-op hooks.
    pub fn from_config(config: &RegistryConfig) -> Result<Self, RegistryError> {
        RegistryBuilder::from_config(config)?.build()
    }

    /// Returns the registration for an entity type.
    pub fn registration(&self, entity_type: &str) -> Result<&EntityRegistration, RegistryError> {
        self.entities
            .get(entity_type)
            .ok_or_else(|| RegistryError::UnknownEntityType {
                entity_type: entity_type.to_string(),
            })
    }

    /// Returns the policy of a soft-deletable type, `None` for plain or unknown types.
    pub fn policy(&self, entity_type: &str) -> Option<&ScopePolicy> {
        self.entities.get(entity_type).and_then(|e| e.policy())
    }

    /// Returns the policy, failing for plain or unknown types.
    pub fn require_policy(&self, entity_type: &str) -> Result<&ScopePolicy, RegistryError> {
        self.registration(entity_type)?
            .policy()
            .ok_or_else(|| RegistryError::NotSoftDeletable {
                entity_type: entity_type.to_string(),
            })
    }

    /// Returns `true` if the type carries a soft-delete policy.
    pub fn is_soft_deletable(&self, entity_type: &str) -> bool {
        self.policy(entity_type).is_some()
    }

    /// Returns a declared relation.
    pub fn relation(
        &self,
        entity_type: &str,
        name: &str,
    ) -> Result<&RelationDescriptor, RegistryError> {
        self.registration(entity_type)?
            .relation(name)
            .ok_or_else(|| RegistryError::UnknownRelation {
                entity_type: entity_type.to_string(),
                relation: name.to_string(),
            })
    }

    /// Returns the declared relations of a type; empty for unknown types.
    pub fn relations(&self, entity_type: &str) -> &[RelationDescriptor] {
        self.entities
            .get(entity_type)
            .map(|e| e.relations())
            .unwrap_or(&[])
    }

    /// Returns the hooks for a type; no-ops for unknown types.
    pub fn hooks(&self, entity_type: &str) -> Arc<dyn LifecycleHooks> {
        self.entities
            .get(entity_type)
            .map(|e| e.hooks().clone())
            .unwrap_or_else(|| Arc::new(NoopHooks))
    }

    /// Returns every registered entity type name.
    pub fn entity_types(&self) -> impl Iterator<Item = &str> {
        self.entities.keys().map(String::as_str)
    }
}
