//! Default scoping, suspension, pre-loading and registry configuration.

mod common;

use std::sync::Arc;

use serde_json::json;

use helios_tombstone::backends::memory::InMemoryStore;
use helios_tombstone::config::RegistryConfig;
use helios_tombstone::controller::RestoreOptions;
use helios_tombstone::dispatch::OperationArgs;
use helios_tombstone::policy::DestroyState;
use helios_tombstone::registry::EntityRegistry;
use helios_tombstone::scope::OperationContext;
use helios_tombstone::storage::TombstoneStorage;
use helios_tombstone::types::RecordQuery;

use common::*;

// ============================================================================
// Suspension
// ============================================================================

#[tokio::test]
async fn test_nested_suspensions() {
    let f = seeded().await;
    f.storage.destroy_by_id(&f.ctx, "androids", "r2d2").await.unwrap();

    {
        let _outer = f.ctx.suspend("androids");
        assert_eq!(f.count("androids").await, 2);
        {
            let _inner = f.ctx.suspend("androids");
            assert_eq!(f.ctx.scope().depth("androids"), 2);
            assert_eq!(f.count("androids").await, 2);
        }
        assert!(f.ctx.scope().is_suspended("androids"));
        assert_eq!(f.count("androids").await, 2);
        // Other types stay filtered.
        assert_eq!(f.count("components").await, 0);
    }

    assert!(f.ctx.scope().is_clear());
    assert_eq!(f.count("androids").await, 1);
}

#[tokio::test]
async fn test_cloned_context_shares_suspension() {
    let f = seeded().await;
    f.storage.destroy_by_id(&f.ctx, "androids", "r2d2").await.unwrap();
    let clone = f.ctx.clone();

    let _guard = f.ctx.suspend("androids");
    let visible = f
        .storage
        .count(&clone, RecordQuery::new("androids"))
        .await
        .unwrap();
    assert_eq!(visible, 2);
}

#[tokio::test]
async fn test_independent_contexts_do_not_leak() {
    let f = seeded().await;
    f.storage.destroy_by_id(&f.ctx, "androids", "r2d2").await.unwrap();
    let storage = &f.storage;

    let suspended = async {
        let ctx = OperationContext::new().with_correlation_id("suspended");
        let _guard = ctx.suspend("androids");
        tokio::task::yield_now().await;
        let n = storage.count(&ctx, RecordQuery::new("androids")).await.unwrap();
        tokio::task::yield_now().await;
        n
    };
    let scoped = async {
        let ctx = OperationContext::new().with_correlation_id("scoped");
        tokio::task::yield_now().await;
        storage.count(&ctx, RecordQuery::new("androids")).await.unwrap()
    };

    let (suspended, scoped) = tokio::join!(suspended, scoped);
    assert_eq!(suspended, 2);
    assert_eq!(scoped, 1);
}

#[tokio::test]
async fn test_scope_released_after_variant_error() {
    let f = seeded().await;

    let result = f
        .storage
        .invoke(&f.ctx, "androids", "sum-deleted-only", OperationArgs::new())
        .await;
    assert!(result.is_err());
    assert!(f.ctx.scope().is_clear());
}

// ============================================================================
// Pre-loading
// ============================================================================

#[tokio::test]
async fn test_preload_filters_inside_suspension() {
    let f = seeded().await;
    f.insert("components", json!({"id": "wheel", "android_id": "c3p0"})).await;
    f.storage.destroy_by_id(&f.ctx, "androids", "r2d2").await.unwrap();

    let _androids = f.ctx.suspend("androids");
    let _components = f.ctx.suspend("components");
    let set = f
        .storage
        .all(&f.ctx, RecordQuery::new("androids").with_include("components"))
        .await
        .unwrap();

    assert_eq!(set.len(), 2);
    let included: Vec<&str> = set.included("components").iter().map(|c| c.id()).collect();
    assert_eq!(included, ["wheel"]);

    // Direct reads inside the same suspension see every component.
    assert_eq!(f.count("components").await, 3);
}

#[tokio::test]
async fn test_preload_without_suspension() {
    let f = seeded().await;

    let set = f
        .storage
        .all(
            &f.ctx,
            RecordQuery::new("androids")
                .with_id("r2d2")
                .with_include("components")
                .with_include("sticker"),
        )
        .await
        .unwrap();

    assert_eq!(set.included("components").len(), 2);
    assert_eq!(set.included("sticker").len(), 1);
    assert!(set.included("memories").is_empty());
}

#[tokio::test]
async fn test_preload_unknown_relation() {
    let f = seeded().await;
    let err = f
        .storage
        .all(&f.ctx, RecordQuery::new("androids").with_include("wheels"))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        helios_tombstone::TombstoneError::Registry(
            helios_tombstone::error::RegistryError::UnknownRelation { .. }
        )
    ));
}

// ============================================================================
// Record state
// ============================================================================

#[tokio::test]
async fn test_state_transitions() {
    let f = seeded().await;
    let state = || f.storage.state_of(&f.ctx, "androids", "r2d2");

    assert_eq!(state().await.unwrap(), DestroyState::Active);
    f.storage.destroy_by_id(&f.ctx, "androids", "r2d2").await.unwrap();
    assert_eq!(state().await.unwrap(), DestroyState::SoftDeleted);
    f.storage
        .restore(&f.ctx, "androids", "r2d2", &RestoreOptions::default())
        .await
        .unwrap();
    assert_eq!(state().await.unwrap(), DestroyState::Active);
    f.storage.hard_delete_by_id(&f.ctx, "androids", "r2d2").await.unwrap();
    assert_eq!(state().await.unwrap(), DestroyState::HardDeleted);
    assert!(f.ctx.scope().is_clear());
}

#[tokio::test]
async fn test_insert_fills_tombstone_field() {
    let f = memory_fixture();

    let explicit = f.insert("androids", json!({"id": "bb8", "name": "BB-8"})).await;
    assert_eq!(explicit.id(), "bb8");
    assert!(explicit.get("deleted_at").is_null());
    assert!(explicit.fields().contains_key("deleted_at"));

    let generated = f.insert("dings", json!({})).await;
    assert_eq!(generated.id().len(), 36);
    assert_eq!(generated.get("not_deleted"), &json!(true));

    let person = f.insert("people", json!({"id": 7})).await;
    assert_eq!(person.id(), "7");
    assert_eq!(person.fields().len(), 1);

    let err = f
        .storage
        .insert(&f.ctx, "androids", json!({"id": "bb8"}))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        helios_tombstone::TombstoneError::Record(
            helios_tombstone::error::RecordError::AlreadyExists { .. }
        )
    ));
}

#[tokio::test]
async fn test_insert_rejects_non_object_fields() {
    let f = memory_fixture();
    for bad in [json!(["bb8"]), json!("bb8"), json!(null)] {
        let err = f.storage.insert(&f.ctx, "androids", bad).await.unwrap_err();
        assert!(matches!(
            err,
            helios_tombstone::TombstoneError::Backend(
                helios_tombstone::error::BackendError::SerializationError { .. }
            )
        ));
    }
    assert_eq!(f.count_with_destroyed("androids").await, 0);
}

// ============================================================================
// Configuration
// ============================================================================

const CONFIG: &str = r#"{
    "entities": [
        {
            "entity_type": "ships",
            "policy": {},
            "relations": [
                {
                    "name": "crew",
                    "kind": "has_many",
                    "target_type": "sailors",
                    "foreign_key": "ship_id",
                    "dependent": true
                }
            ]
        },
        {
            "entity_type": "sailors",
            "policy": {
                "field": "aboard",
                "destroyed": { "kind": "literal", "value": false },
                "not_destroyed": true
            },
            "relations": [
                {
                    "name": "ship",
                    "kind": "belongs_to",
                    "target_type": "ships",
                    "foreign_key": "ship_id"
                }
            ]
        },
        { "entity_type": "ports" }
    ]
}"#;

#[tokio::test]
async fn test_registry_from_config() {
    let config: RegistryConfig = serde_json::from_str(CONFIG).unwrap();
    let registry = EntityRegistry::from_config(&config).unwrap();
    assert!(registry.is_soft_deletable("ships"));
    assert!(!registry.is_soft_deletable("ports"));

    let storage = TombstoneStorage::new(Arc::new(InMemoryStore::new()), registry);
    let ctx = OperationContext::new();
    storage.insert(&ctx, "ships", json!({"id": "pearl"})).await.unwrap();
    storage
        .insert(&ctx, "sailors", json!({"id": "gibbs", "ship_id": "pearl"}))
        .await
        .unwrap();

    storage.destroy_by_id(&ctx, "ships", "pearl").await.unwrap();
    let sailors = storage
        .invoke(&ctx, "sailors", "all-deleted-only", OperationArgs::new())
        .await
        .unwrap();
    assert_eq!(sailors.records()[0].get("aboard"), &json!(false));

    let ship = storage.invoke_on(&ctx, sailors.records()[0], "ship-including-deleted").await.unwrap();
    assert!(ship.records()[0].get("deleted_at").is_string());

    storage
        .restore(&ctx, "ships", "pearl", &RestoreOptions::default())
        .await
        .unwrap();
    assert_eq!(storage.count(&ctx, RecordQuery::new("sailors")).await.unwrap(), 1);
}

#[test]
fn test_config_rejects_bad_flag_policy() {
    let config: RegistryConfig = serde_json::from_str(
        r#"{"entities": [{"entity_type": "ghosts", "policy": {"field": "gone", "destroyed": {"kind": "literal", "value": null}}}]}"#,
    )
    .unwrap();
    assert!(EntityRegistry::from_config(&config).is_err());
}
