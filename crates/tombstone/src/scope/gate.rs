//! The default-scope filter.
//!
//! [`ScopedQueryGate`] is the one place where the default filter
//! `tombstone_field == not_destroyed_value` is attached to a query. Every read
//! and aggregate made by this crate goes through it.

use tracing::trace;

use crate::registry::EntityRegistry;
use crate::types::RecordQuery;

use super::context::ScopeContext;

/// Where a read originates.
///
/// Relationship pre-loading sets [`ReadOrigin::Preload`] explicitly; the gate
/// never infers it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReadOrigin {
    /// An ordinary read issued by a caller or a variant.
    #[default]
    Direct,
    /// Eager loading of a relation's targets on behalf of another read.
    Preload,
}

/// Applies the default filter to queries.
///
/// # Rules
///
/// 1. Types without a policy pass through unchanged.
/// 2. A [`ReadOrigin::Preload`] read is always filtered, even while the target
///    type is suspended.
/// 3. Otherwise a suspended type passes through unchanged.
/// 4. Otherwise the filter is added (once).
///
/// # Examples
///
/// ```
/// use helios_tombstone::policy::ScopePolicy;
/// use helios_tombstone::registry::{EntityRegistration, EntityRegistry};
/// use helios_tombstone::scope::{ReadOrigin, ScopeContext, ScopedQueryGate};
/// use helios_tombstone::types::{Condition, RecordQuery};
/// use serde_json::Value;
///
/// let registry = EntityRegistry::builder()
///     .register(EntityRegistration::soft_deletable("androids", ScopePolicy::timestamp("deleted_at")))
///     .build()
///     .unwrap();
/// let gate = ScopedQueryGate::new(&registry);
/// let scope = ScopeContext::new();
/// let active = Condition::eq("deleted_at", Value::Null);
///
/// let filtered = gate.apply(RecordQuery::new("androids"), &scope, ReadOrigin::Direct);
/// assert!(filtered.has_condition(&active));
///
/// let _guard = scope.suspend("androids");
/// let unfiltered = gate.apply(RecordQuery::new("androids"), &scope, ReadOrigin::Direct);
/// assert!(unfiltered.conditions().is_empty());
///
/// let preload = gate.apply(RecordQuery::new("androids"), &scope, ReadOrigin::Preload);
/// assert!(preload.has_condition(&active));
/// ```
#[derive(Debug, Clone, Copy)]
pub struct ScopedQueryGate<'a> {
    registry: &'a EntityRegistry,
}

impl<'a> ScopedQueryGate<'a> {
    /// Creates a gate over a registry.
    pub fn new(registry: &'a EntityRegistry) -> Self {
        Self { registry }
    }

    /// Returns `query` with the default filter applied according to the rules above.
    pub fn apply(&self, query: RecordQuery, scope: &ScopeContext, origin: ReadOrigin) -> RecordQuery {
        let Some(policy) = self.registry.policy(query.entity_type()) else {
            return query;
        };

        if origin == ReadOrigin::Direct && scope.is_suspended(query.entity_type()) {
            trace!(entity_type = query.entity_type(), "Default scope suspended");
            return query;
        }

        let condition = policy.active_condition();
        if query.has_condition(&condition) {
            return query;
        }
        query.with_condition(condition)
    }

    /// Returns `true` if a direct read of `entity_type` would be filtered now.
    pub fn is_filtering(&self, entity_type: &str, scope: &ScopeContext) -> bool {
        self.registry.is_soft_deletable(entity_type) && !scope.is_suspended(entity_type)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::ScopePolicy;
    use crate::registry::EntityRegistration;
    use crate::types::Condition;

    fn registry() -> EntityRegistry {
        EntityRegistry::builder()
            .register(EntityRegistration::soft_deletable(
                "pirates",
                ScopePolicy::flag("alive", false).unwrap(),
            ))
            .register(EntityRegistration::plain("people"))
            .build()
            .unwrap()
    }

    #[test]
    fn test_plain_types_pass_through() {
        let registry = registry();
        let gate = ScopedQueryGate::new(&registry);
        let query = gate.apply(RecordQuery::new("people"), &ScopeContext::new(), ReadOrigin::Direct);
        assert!(query.conditions().is_empty());
    }

    #[test]
    fn test_filter_uses_policy_polarity() {
        let registry = registry();
        let gate = ScopedQueryGate::new(&registry);
        let query = gate.apply(RecordQuery::new("pirates"), &ScopeContext::new(), ReadOrigin::Direct);
        assert_eq!(query.conditions(), &[Condition::eq("alive", true)]);
    }

    #[test]
    fn test_filter_not_duplicated() {
        let registry = registry();
        let gate = ScopedQueryGate::new(&registry);
        let scope = ScopeContext::new();
        let once = gate.apply(RecordQuery::new("pirates"), &scope, ReadOrigin::Direct);
        let twice = gate.apply(once, &scope, ReadOrigin::Preload);
        assert_eq!(twice.conditions().len(), 1);
    }

    #[test]
    fn test_suspension_is_per_type() {
        let registry = registry();
        let gate = ScopedQueryGate::new(&registry);
        let scope = ScopeContext::new();
        let _guard = scope.suspend("people");
        assert!(gate.is_filtering("pirates", &scope));
        let query = gate.apply(RecordQuery::new("pirates"), &scope, ReadOrigin::Direct);
        assert_eq!(query.conditions().len(), 1);
    }

    #[test]
    fn test_preload_reapplies_filter_inside_suspension() {
        let registry = registry();
        let gate = ScopedQueryGate::new(&registry);
        let scope = ScopeContext::new();
        let _guard = scope.suspend("pirates");
        assert!(!gate.is_filtering("pirates", &scope));
        let query = gate.apply(RecordQuery::new("pirates"), &scope, ReadOrigin::Preload);
        assert_eq!(query.conditions(), &[Condition::eq("alive", true)]);
    }
}
