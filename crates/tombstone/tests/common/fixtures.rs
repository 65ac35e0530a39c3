//! Test fixtures: a small schema of owners, androids and their parts, plus
//! flag-polarity entity types and hook-carrying types.
//!
//! ```text
//! people ──owns (dependent)──> androids ──owns (dependent)──> components ──owns (dependent)──> sub_components
//!                                 │ has_one sticker, has_many memories (parent_id), has_many dents ──> dings
//! ```

use std::sync::Arc;

use serde_json::{Value, json};

use helios_tombstone::backends::memory::InMemoryStore;
use helios_tombstone::core::RecordStore;
use helios_tombstone::policy::ScopePolicy;
use helios_tombstone::registry::{EntityRegistration, EntityRegistry};
use helios_tombstone::scope::OperationContext;
use helios_tombstone::storage::TombstoneStorage;
use helios_tombstone::types::{RecordQuery, RelationDescriptor, StoredRecord};

use super::hooks::{FailWhenFragile, HookLog, RaiseOnUpdate, RefuseWhenLocked, RenameOnDestroy};

/// Builds the fixture registry. Hooks on androids, vaults, deposits and
/// entries write to `log`.
pub fn registry(log: &HookLog) -> EntityRegistry {
    let flag = |field: &str, destroyed: bool| {
        ScopePolicy::flag(field, destroyed).expect("valid flag policy")
    };
    let timestamp = || ScopePolicy::timestamp("deleted_at");

    EntityRegistry::builder()
        .register(
            EntityRegistration::plain("people")
                .with_relation(RelationDescriptor::has_many("androids", "androids", "owner_id").dependent()),
        )
        .register(
            EntityRegistration::soft_deletable("androids", timestamp())
                .with_relation(RelationDescriptor::has_many("components", "components", "android_id").dependent())
                .with_relation(RelationDescriptor::has_one("sticker", "stickers", "android_id"))
                .with_relation(RelationDescriptor::has_many("memories", "memories", "parent_id"))
                .with_relation(RelationDescriptor::has_many("dents", "dents", "android_id"))
                .with_relation(RelationDescriptor::belongs_to("owner", "people", "owner_id"))
                .with_hooks(RaiseOnUpdate { log: log.clone() }),
        )
        .register(
            EntityRegistration::soft_deletable("components", timestamp())
                .with_relation(RelationDescriptor::belongs_to("android", "androids", "android_id").dependent())
                .with_relation(
                    RelationDescriptor::has_many("sub_components", "sub_components", "component_id").dependent(),
                )
                .with_hooks(RenameOnDestroy),
        )
        .register(
            EntityRegistration::soft_deletable("sub_components", timestamp())
                .with_relation(RelationDescriptor::belongs_to("component", "components", "component_id").dependent()),
        )
        .register(
            EntityRegistration::soft_deletable("memories", timestamp())
                .with_relation(RelationDescriptor::belongs_to("android", "androids", "parent_id")),
        )
        .register(
            EntityRegistration::soft_deletable("stickers", timestamp())
                .with_relation(RelationDescriptor::belongs_to("android", "androids", "android_id")),
        )
        .register(
            EntityRegistration::soft_deletable("dents", timestamp())
                .with_relation(RelationDescriptor::belongs_to("android", "androids", "android_id"))
                .with_relation(RelationDescriptor::has_many("dings", "dings", "dent_id")),
        )
        .register(
            EntityRegistration::soft_deletable("dings", flag("not_deleted", false))
                .with_relation(RelationDescriptor::belongs_to("dent", "dents", "dent_id")),
        )
        .register(EntityRegistration::soft_deletable("ninjas", flag("visible", false)))
        .register(EntityRegistration::soft_deletable("pirates", flag("alive", false)))
        .register(EntityRegistration::soft_deletable("dead_pirates", flag("alive", true)))
        .register(
            EntityRegistration::soft_deletable("vaults", timestamp())
                .with_relation(RelationDescriptor::has_many("deposits", "deposits", "vault_id").dependent())
                .with_hooks(RefuseWhenLocked { log: log.clone() }),
        )
        .register(
            EntityRegistration::soft_deletable("deposits", timestamp())
                .with_relation(RelationDescriptor::belongs_to("vault", "vaults", "vault_id"))
                .with_hooks(RefuseWhenLocked { log: log.clone() }),
        )
        .register(
            EntityRegistration::soft_deletable("ledgers", timestamp())
                .with_relation(RelationDescriptor::has_many("entries", "entries", "ledger_id").dependent()),
        )
        .register(
            EntityRegistration::soft_deletable("entries", timestamp())
                .with_relation(RelationDescriptor::belongs_to("ledger", "ledgers", "ledger_id"))
                .with_hooks(FailWhenFragile { log: log.clone() }),
        )
        .register(
            EntityRegistration::soft_deletable("nodes", timestamp())
                .with_relation(RelationDescriptor::has_many("children", "nodes", "parent_id").dependent())
                .with_relation(RelationDescriptor::belongs_to("parent", "nodes", "parent_id")),
        )
        .build()
        .expect("fixture registry is valid")
}

/// A storage facade with its hook log and a fresh operation context.
pub struct Fixture {
    pub storage: TombstoneStorage,
    pub ctx: OperationContext,
    pub log: HookLog,
}

impl Fixture {
    /// Inserts a record, panicking on failure.
    pub async fn insert(&self, entity_type: &str, fields: Value) -> StoredRecord {
        self.storage
            .insert(&self.ctx, entity_type, fields)
            .await
            .expect("insert fixture record")
    }

    /// Default-scoped count of `entity_type`.
    pub async fn count(&self, entity_type: &str) -> u64 {
        self.storage
            .count(&self.ctx, RecordQuery::new(entity_type))
            .await
            .expect("count")
    }

    /// Count of `entity_type` in every state.
    pub async fn count_with_destroyed(&self, entity_type: &str) -> u64 {
        let _guard = self.ctx.suspend(entity_type);
        self.count(entity_type).await
    }

    /// Reads a record in any state.
    pub async fn raw(&self, entity_type: &str, id: &str) -> Option<StoredRecord> {
        self.storage
            .store()
            .find(&RecordQuery::new(entity_type).with_id(id))
            .await
            .expect("raw read")
            .into_iter()
            .next()
    }

    /// Inserts the owner, androids and parts used by most scenarios.
    ///
    /// - person `luke` owning androids `r2d2` (serial 2) and `c3p0` (serial 3)
    /// - `r2d2` has components `arm` and `leg`; `arm` has sub-component `servo`
    /// - `r2d2` has sticker `s1`, memory `m1` and dent `d1`; `d1` has ding `g1`
    pub async fn seed_androids(&self) {
        self.insert("people", json!({"id": "luke", "name": "Luke Skywalker"})).await;
        self.insert("androids", json!({"id": "r2d2", "name": "R2D2", "owner_id": "luke", "serial": 2})).await;
        self.insert("androids", json!({"id": "c3p0", "name": "C3P0", "owner_id": "luke", "serial": 3})).await;
        self.insert("components", json!({"id": "arm", "name": "Arm", "android_id": "r2d2"})).await;
        self.insert("components", json!({"id": "leg", "name": "Leg", "android_id": "r2d2"})).await;
        self.insert("sub_components", json!({"id": "servo", "component_id": "arm"})).await;
        self.insert("stickers", json!({"id": "s1", "android_id": "r2d2"})).await;
        self.insert("memories", json!({"id": "m1", "parent_id": "r2d2"})).await;
        self.insert("dents", json!({"id": "d1", "android_id": "r2d2"})).await;
        self.insert("dings", json!({"id": "g1", "dent_id": "d1"})).await;
    }
}

/// A fixture over `store`.
pub fn fixture_with(store: Arc<dyn RecordStore>) -> Fixture {
    let log = HookLog::new();
    Fixture {
        storage: TombstoneStorage::new(store, registry(&log)),
        ctx: OperationContext::new(),
        log,
    }
}

/// A fixture over a fresh in-memory store.
pub fn memory_fixture() -> Fixture {
    fixture_with(Arc::new(InMemoryStore::new()))
}

/// A memory fixture with [`Fixture::seed_androids`] applied.
pub async fn seeded() -> Fixture {
    let fixture = memory_fixture();
    fixture.seed_androids().await;
    fixture
}
