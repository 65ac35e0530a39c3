//! Lazily synthesized operation variants.
//!
//! A variant is a base operation combined with a visibility [`Modifier`]:
//! `count-including-deleted`, `all-deleted-only`, `android-including-deleted`
//! and so on. Variants are built the first time they are requested and cached
//! by `(entity type, base, modifier)`; later requests are plain lookups.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::RwLock;
use tracing::debug;

use crate::error::TombstoneResult;
use crate::registry::EntityRegistry;
use crate::scope::OperationContext;
use crate::storage::TombstoneStorage;

use super::handler::{OperationCall, OperationOutput, OperationTarget};

/// Visibility modifier appended to a base operation name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Modifier {
    /// Records in every state; the default filter is suspended.
    IncludingDeleted,
    /// Only soft-deleted records; the filter is suspended and inverted.
    DeletedOnly,
}

impl Modifier {
    /// Every modifier.
    pub const ALL: [Modifier; 2] = [Modifier::IncludingDeleted, Modifier::DeletedOnly];

    /// Returns the name suffix.
    pub fn suffix(&self) -> &'static str {
        match self {
            Modifier::IncludingDeleted => "-including-deleted",
            Modifier::DeletedOnly => "-deleted-only",
        }
    }

    /// Splits `name` into its base and modifier.
    ///
    /// ```
    /// use helios_tombstone::dispatch::Modifier;
    ///
    /// assert_eq!(Modifier::split("count-deleted-only"), Some(("count", Modifier::DeletedOnly)));
    /// assert_eq!(Modifier::split("count"), None);
    /// assert_eq!(Modifier::split("-including-deleted"), None);
    /// ```
    pub fn split(name: &str) -> Option<(&str, Modifier)> {
        Self::ALL.into_iter().find_map(|modifier| {
            name.strip_suffix(modifier.suffix())
                .filter(|base| !base.is_empty())
                .map(|base| (base, modifier))
        })
    }
}

impl fmt::Display for Modifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.suffix().trim_start_matches('-'))
    }
}

/// An operation a variant can be derived from.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum BaseOperation {
    /// Every matching record (`all`, alias `find`).
    All,
    /// The first matching record.
    First,
    /// Number of matching records.
    Count,
    /// Sum of a field.
    Sum,
    /// Mean of a field.
    Average,
    /// Smallest value of a field.
    Minimum,
    /// Largest value of a field.
    Maximum,
    /// Whether any record matches.
    Exists,
    /// The targets of a named relation of a record.
    Relation(String),
}

impl BaseOperation {
    /// Parses a type-level base operation name.
    pub fn parse(name: &str) -> Option<Self> {
        Some(match name {
            "all" | "find" => BaseOperation::All,
            "first" => BaseOperation::First,
            "count" => BaseOperation::Count,
            "sum" => BaseOperation::Sum,
            "average" => BaseOperation::Average,
            "minimum" => BaseOperation::Minimum,
            "maximum" => BaseOperation::Maximum,
            "exists" => BaseOperation::Exists,
            _ => return None,
        })
    }

    /// Resolves a base name against a call target.
    ///
    /// Type targets accept the type-level operations; record targets accept
    /// the names of the record type's declared relations.
    pub fn resolve(registry: &EntityRegistry, target: &OperationTarget, name: &str) -> Option<Self> {
        match target {
            OperationTarget::Type(_) => Self::parse(name),
            OperationTarget::Record(record) => registry
                .relation(record.entity_type(), name)
                .ok()
                .map(|relation| BaseOperation::Relation(relation.name.clone())),
        }
    }

    /// Returns the canonical name.
    pub fn name(&self) -> &str {
        match self {
            BaseOperation::All => "all",
            BaseOperation::First => "first",
            BaseOperation::Count => "count",
            BaseOperation::Sum => "sum",
            BaseOperation::Average => "average",
            BaseOperation::Minimum => "minimum",
            BaseOperation::Maximum => "maximum",
            BaseOperation::Exists => "exists",
            BaseOperation::Relation(name) => name,
        }
    }
}

/// Cache key for a synthesized variant.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct VariantKey {
    /// Entity type the variant was requested on.
    pub entity_type: String,
    /// Canonical base name.
    pub base: String,
    /// Modifier.
    pub modifier: Modifier,
}

impl fmt::Display for VariantKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}{}", self.entity_type, self.base, self.modifier.suffix())
    }
}

/// A synthesized variant.
#[derive(Debug, Clone)]
pub struct Variant {
    key: VariantKey,
    base: BaseOperation,
    /// Entity type whose filter the variant suspends.
    scoped_type: String,
}

impl Variant {
    /// Returns the cache key.
    pub fn key(&self) -> &VariantKey {
        &self.key
    }

    /// Returns the base operation.
    pub fn base(&self) -> &BaseOperation {
        &self.base
    }

    /// Returns the modifier.
    pub fn modifier(&self) -> Modifier {
        self.key.modifier
    }

    /// Runs the base operation with the default filter of the scoped type
    /// suspended, adding the inverted filter for [`Modifier::DeletedOnly`].
    pub async fn execute(
        &self,
        storage: &TombstoneStorage,
        ctx: &OperationContext,
        call: &OperationCall,
    ) -> TombstoneResult<OperationOutput> {
        let extra = match self.key.modifier {
            Modifier::IncludingDeleted => None,
            Modifier::DeletedOnly => Some(
                storage
                    .registry()
                    .require_policy(&self.scoped_type)?
                    .deleted_condition(),
            ),
        };

        let _guard = ctx.suspend(&self.scoped_type);
        storage.run_base(ctx, &self.base, call, extra).await
    }
}

/// Cache of synthesized variants.
#[derive(Default)]
pub struct VariantDispatcher {
    variants: RwLock<HashMap<VariantKey, Arc<Variant>>>,
    synthesized: AtomicU64,
}

impl VariantDispatcher {
    /// Creates an empty dispatcher.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the variant for `call`, synthesizing it on first request.
    ///
    /// Returns `None` if the name carries no modifier, the base is unknown
    /// for the target, or a type-level target is not soft-deletable.
    pub fn resolve(&self, registry: &EntityRegistry, call: &OperationCall) -> Option<Arc<Variant>> {
        let (base_name, modifier) = Modifier::split(&call.name)?;
        let base = BaseOperation::resolve(registry, &call.target, base_name)?;

        let scoped_type = match (&base, &call.target) {
            (BaseOperation::Relation(name), OperationTarget::Record(record)) => registry
                .relation(record.entity_type(), name)
                .ok()?
                .target_type
                .clone(),
            _ => {
                if !registry.is_soft_deletable(call.entity_type()) {
                    return None;
                }
                call.entity_type().to_string()
            }
        };

        let key = VariantKey {
            entity_type: call.entity_type().to_string(),
            base: base.name().to_string(),
            modifier,
        };

        if let Some(variant) = self.variants.read().get(&key) {
            return Some(Arc::clone(variant));
        }

        let mut variants = self.variants.write();
        let variant = variants.entry(key.clone()).or_insert_with(|| {
            self.synthesized.fetch_add(1, Ordering::SeqCst);
            debug!(variant = %key, scoped_type = %scoped_type, "Synthesized variant");
            Arc::new(Variant {
                key,
                base,
                scoped_type,
            })
        });
        Some(Arc::clone(variant))
    }

    /// Number of variants synthesized so far.
    pub fn synthesized_count(&self) -> u64 {
        self.synthesized.load(Ordering::SeqCst)
    }

    /// Number of cached variants.
    pub fn len(&self) -> usize {
        self.variants.read().len()
    }

    /// Returns `true` if nothing has been synthesized.
    pub fn is_empty(&self) -> bool {
        self.variants.read().is_empty()
    }
}

impl fmt::Debug for VariantDispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VariantDispatcher")
            .field("cached", &self.len())
            .field("synthesized", &self.synthesized_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatch::OperationArgs;
    use crate::policy::ScopePolicy;
    use crate::registry::EntityRegistration;
    use crate::types::{RelationDescriptor, StoredRecord};
    use serde_json::json;

    fn registry() -> EntityRegistry {
        EntityRegistry::builder()
            .register(
                EntityRegistration::soft_deletable("androids", ScopePolicy::default()).with_relation(
                    RelationDescriptor::has_many("components", "components", "android_id").dependent(),
                ),
            )
            .register(
                EntityRegistration::soft_deletable("components", ScopePolicy::default()).with_relation(
                    RelationDescriptor::belongs_to("android", "androids", "android_id"),
                ),
            )
            .register(EntityRegistration::plain("people"))
            .build()
            .unwrap()
    }

    #[test]
    fn test_split_prefers_full_suffix() {
        assert_eq!(
            Modifier::split("all-including-deleted"),
            Some(("all", Modifier::IncludingDeleted))
        );
        assert_eq!(Modifier::split("count-deleted"), None);
    }

    #[test]
    fn test_synthesis_is_cached() {
        let registry = registry();
        let dispatcher = VariantDispatcher::new();
        let call = OperationCall::on_type("androids", "count-deleted-only", OperationArgs::new());

        let first = dispatcher.resolve(&registry, &call).unwrap();
        let second = dispatcher.resolve(&registry, &call).unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(dispatcher.synthesized_count(), 1);

        let alias = OperationCall::on_type("androids", "find-deleted-only", OperationArgs::new());
        let other = OperationCall::on_type("androids", "all-deleted-only", OperationArgs::new());
        let a = dispatcher.resolve(&registry, &alias).unwrap();
        let b = dispatcher.resolve(&registry, &other).unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(dispatcher.synthesized_count(), 2);
    }

    #[test]
    fn test_unknown_and_plain_targets_do_not_resolve() {
        let registry = registry();
        let dispatcher = VariantDispatcher::new();
        let unknown = OperationCall::on_type("androids", "fly-including-deleted", OperationArgs::new());
        let plain = OperationCall::on_type("people", "count-including-deleted", OperationArgs::new());
        let bare = OperationCall::on_type("androids", "count", OperationArgs::new());
        assert!(dispatcher.resolve(&registry, &unknown).is_none());
        assert!(dispatcher.resolve(&registry, &plain).is_none());
        assert!(dispatcher.resolve(&registry, &bare).is_none());
        assert_eq!(dispatcher.synthesized_count(), 0);
    }

    #[test]
    fn test_relation_variant_scopes_target_type() {
        let registry = registry();
        let dispatcher = VariantDispatcher::new();
        let component = StoredRecord::from_value("components", "c1", json!({"android_id": "a1"}));
        let call = OperationCall::on_record(component, "android-including-deleted");

        let variant = dispatcher.resolve(&registry, &call).unwrap();
        assert_eq!(variant.base(), &BaseOperation::Relation("android".to_string()));
        assert_eq!(variant.scoped_type, "androids");
        assert_eq!(variant.key().to_string(), "components.android-including-deleted");
    }

    #[test]
    fn test_type_operations_not_resolved_on_records() {
        let registry = registry();
        let dispatcher = VariantDispatcher::new();
        let component = StoredRecord::from_value("components", "c1", json!({}));
        let call = OperationCall::on_record(component, "count-including-deleted");
        assert!(dispatcher.resolve(&registry, &call).is_none());
    }
}
