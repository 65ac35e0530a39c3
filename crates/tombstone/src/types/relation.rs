//! Relationship descriptors.
//!
//! A [`RelationDescriptor`] is the read-only metadata for one declared
//! relation between two entity types. Cascading destroy and restore walk
//! these descriptors; they never infer behaviour from the relation's name.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::query::RecordQuery;
use super::record::{StoredRecord, values_equal};

/// Direction of a relation, seen from the declaring entity type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RelationKind {
    /// This entity owns many targets; the foreign key lives on the target.
    HasMany,
    /// This entity owns at most one target; the foreign key lives on the target.
    HasOne,
    /// This entity belongs to one target; the foreign key lives here.
    BelongsTo,
}

impl RelationKind {
    /// Returns `true` for the owning directions (`has_many`, `has_one`).
    pub fn is_owning(&self) -> bool {
        matches!(self, RelationKind::HasMany | RelationKind::HasOne)
    }
}

/// When a restore of the declaring record reaches across this relation.
///
/// This makes the owning/belonging asymmetry explicit instead of deriving it
/// from the relation's direction at restore time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RestoreRule {
    /// Restored with the owner by default. Ignored on `belongs_to` relations.
    WithOwner,
    /// Restored only when named in `RestoreOptions::include`.
    #[default]
    ExplicitOnly,
}

/// Metadata for one declared relation.
///
/// # Examples
///
/// ```
/// use helios_tombstone::types::{RelationDescriptor, RestoreRule};
///
/// let components = RelationDescriptor::has_many("components", "components", "android_id").dependent();
/// assert!(components.dependent_on_destroy);
/// assert_eq!(components.restore_rule, RestoreRule::WithOwner);
///
/// let android = RelationDescriptor::belongs_to("android", "androids", "android_id").dependent();
/// assert_eq!(android.restore_rule, RestoreRule::ExplicitOnly);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelationDescriptor {
    /// Relation name, unique per declaring entity type.
    pub name: String,
    /// Direction of the relation.
    pub kind: RelationKind,
    /// Entity type on the other side.
    pub target_type: String,
    /// Field holding the foreign key (on the target for owning relations, here for `belongs_to`).
    pub foreign_key: String,
    /// Field the foreign key points at (on this entity for owning relations, on the target for `belongs_to`).
    pub primary_key: String,
    /// Whether destroying the owner destroys the targets.
    pub dependent_on_destroy: bool,
    /// Restore behaviour for this relation.
    pub restore_rule: RestoreRule,
}

impl RelationDescriptor {
    fn new(
        name: impl Into<String>,
        kind: RelationKind,
        target_type: impl Into<String>,
        foreign_key: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            kind,
            target_type: target_type.into(),
            foreign_key: foreign_key.into(),
            primary_key: "id".to_string(),
            dependent_on_destroy: false,
            restore_rule: RestoreRule::ExplicitOnly,
        }
    }

    /// Declares a `has_many` relation.
    pub fn has_many(
        name: impl Into<String>,
        target_type: impl Into<String>,
        foreign_key: impl Into<String>,
    ) -> Self {
        Self::new(name, RelationKind::HasMany, target_type, foreign_key)
    }

    /// Declares a `has_one` relation.
    pub fn has_one(
        name: impl Into<String>,
        target_type: impl Into<String>,
        foreign_key: impl Into<String>,
    ) -> Self {
        Self::new(name, RelationKind::HasOne, target_type, foreign_key)
    }

    /// Declares a `belongs_to` relation.
    pub fn belongs_to(
        name: impl Into<String>,
        target_type: impl Into<String>,
        foreign_key: impl Into<String>,
    ) -> Self {
        Self::new(name, RelationKind::BelongsTo, target_type, foreign_key)
    }

    /// Marks the relation dependent-on-destroy.
    ///
    /// Owning relations also switch to [`RestoreRule::WithOwner`]; a
    /// `belongs_to` relation keeps [`RestoreRule::ExplicitOnly`].
    pub fn dependent(mut self) -> Self {
        self.dependent_on_destroy = true;
        self.restore_rule = if self.kind.is_owning() {
            RestoreRule::WithOwner
        } else {
            RestoreRule::ExplicitOnly
        };
        self
    }

    /// Overrides the referenced key field (defaults to `id`).
    pub fn with_primary_key(mut self, primary_key: impl Into<String>) -> Self {
        self.primary_key = primary_key.into();
        self
    }

    /// Overrides the restore rule.
    pub fn with_restore_rule(mut self, rule: RestoreRule) -> Self {
        self.restore_rule = rule;
        self
    }

    /// Returns `(field on the declaring record, field on the target)`.
    fn link_fields(&self) -> (&str, &str) {
        if self.kind.is_owning() {
            (&self.primary_key, &self.foreign_key)
        } else {
            (&self.foreign_key, &self.primary_key)
        }
    }

    /// Builds the unscoped query selecting this relation's targets for `record`.
    ///
    /// Returns `None` when the linking key on `record` is null, since nothing
    /// can be related through it.
    pub fn related_query(&self, record: &StoredRecord) -> Option<RecordQuery> {
        let (local, remote) = self.link_fields();

        let key = record.get(local);
        if key.is_null() {
            return None;
        }

        let query = RecordQuery::new(&self.target_type).where_eq(remote, key.clone());
        Some(match self.kind {
            RelationKind::HasMany => query,
            RelationKind::HasOne | RelationKind::BelongsTo => query.with_limit(1),
        })
    }

    /// Builds one query selecting this relation's targets for every record in `records`.
    ///
    /// Returns `None` when no record carries a usable linking key.
    pub fn preload_query(&self, records: &[StoredRecord]) -> Option<RecordQuery> {
        let (local, remote) = self.link_fields();

        let mut keys: Vec<Value> = Vec::new();
        for record in records {
            let key = record.get(local);
            if !key.is_null() && !keys.iter().any(|k| values_equal(k, key)) {
                keys.push(key.clone());
            }
        }
        if keys.is_empty() {
            return None;
        }
        Some(RecordQuery::new(&self.target_type).where_in(remote, keys))
    }

    /// Returns `true` if a restore of the owner reaches these targets without being asked.
    pub fn restores_with_owner(&self) -> bool {
        self.kind.is_owning() && self.restore_rule == RestoreRule::WithOwner
    }

    /// Returns `true` if this relation yields at most one record.
    pub fn is_singular(&self) -> bool {
        !matches!(self.kind, RelationKind::HasMany)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Condition;
    use serde_json::json;

    #[test]
    fn test_has_many_query() {
        let android = StoredRecord::from_value("androids", "a1", json!({}));
        let relation = RelationDescriptor::has_many("components", "components", "android_id");
        let query = relation.related_query(&android).unwrap();
        assert_eq!(query.entity_type(), "components");
        assert!(query.has_condition(&Condition::eq("android_id", "a1")));
        assert_eq!(query.limit(), None);
    }

    #[test]
    fn test_belongs_to_query() {
        let component = StoredRecord::from_value("components", "c1", json!({"android_id": "a1"}));
        let relation = RelationDescriptor::belongs_to("android", "androids", "android_id");
        let query = relation.related_query(&component).unwrap();
        assert_eq!(query.entity_type(), "androids");
        assert!(query.has_condition(&Condition::eq("id", "a1")));
        assert_eq!(query.limit(), Some(1));
    }

    #[test]
    fn test_null_foreign_key_has_no_targets() {
        let orphan = StoredRecord::from_value("components", "c1", json!({"android_id": null}));
        let relation = RelationDescriptor::belongs_to("android", "androids", "android_id");
        assert!(relation.related_query(&orphan).is_none());
    }

    #[test]
    fn test_preload_query_deduplicates_keys() {
        let components = vec![
            StoredRecord::from_value("components", "c1", json!({"android_id": "a1"})),
            StoredRecord::from_value("components", "c2", json!({"android_id": "a1"})),
            StoredRecord::from_value("components", "c3", json!({"android_id": null})),
        ];
        let relation = RelationDescriptor::belongs_to("android", "androids", "android_id");
        let query = relation.preload_query(&components).unwrap();
        assert!(query.has_condition(&Condition::is_in("id", vec![json!("a1")])));
    }

    #[test]
    fn test_dependent_sets_restore_rule() {
        let owning = RelationDescriptor::has_one("head", "heads", "android_id").dependent();
        assert_eq!(owning.restore_rule, RestoreRule::WithOwner);
        assert!(owning.is_singular());

        let parent = RelationDescriptor::belongs_to("android", "androids", "android_id").dependent();
        assert!(parent.dependent_on_destroy);
        assert_eq!(parent.restore_rule, RestoreRule::ExplicitOnly);
    }

    #[test]
    fn test_relation_kind_serde() {
        let kind: RelationKind = serde_json::from_str("\"has_many\"").unwrap();
        assert_eq!(kind, RelationKind::HasMany);
        let rule: RestoreRule = serde_json::from_str("\"with_owner\"").unwrap();
        assert_eq!(rule, RestoreRule::WithOwner);
    }
}
