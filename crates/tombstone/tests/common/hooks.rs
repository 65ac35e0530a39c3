//! Lifecycle hooks used by the fixtures.

use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::json;

use helios_tombstone::core::{HookDecision, LifecycleHooks, StoreTransaction};
use helios_tombstone::error::HookError;
use helios_tombstone::types::StoredRecord;
use helios_tombstone::TombstoneResult;

/// Name written by [`RenameOnDestroy`].
pub const RENAMED: &str = "Something Else!";

/// Shared log of hook invocations, as `"<hook> <type>/<id>"`.
#[derive(Debug, Clone, Default)]
pub struct HookLog(Arc<Mutex<Vec<String>>>);

impl HookLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, hook: &str, record: &StoredRecord) {
        self.0.lock().push(format!("{} {}", hook, record.key()));
    }

    pub fn entries(&self) -> Vec<String> {
        self.0.lock().clone()
    }

    pub fn contains(&self, hook: &str) -> bool {
        self.0.lock().iter().any(|e| e.starts_with(hook))
    }

    pub fn clear(&self) {
        self.0.lock().clear();
    }
}

/// Refuses every update through the general update path.
///
/// Destroy and restore must never reach it.
pub struct RaiseOnUpdate {
    pub log: HookLog,
}

#[async_trait]
impl LifecycleHooks for RaiseOnUpdate {
    async fn before_update(
        &self,
        record: &StoredRecord,
        _tx: &mut dyn StoreTransaction,
    ) -> TombstoneResult<HookDecision> {
        self.log.push("before_update", record);
        Err(HookError::failed("before_update", &record.key(), "hell").into())
    }

    async fn before_destroy(
        &self,
        record: &StoredRecord,
        _tx: &mut dyn StoreTransaction,
    ) -> TombstoneResult<HookDecision> {
        self.log.push("before_destroy", record);
        Ok(HookDecision::Proceed)
    }

    async fn after_destroy(
        &self,
        record: &StoredRecord,
        _tx: &mut dyn StoreTransaction,
    ) -> TombstoneResult<()> {
        self.log.push("after_destroy", record);
        Ok(())
    }

    async fn before_restore(
        &self,
        record: &StoredRecord,
        _tx: &mut dyn StoreTransaction,
    ) -> TombstoneResult<HookDecision> {
        self.log.push("before_restore", record);
        Ok(HookDecision::Proceed)
    }

    async fn after_restore(
        &self,
        record: &StoredRecord,
        _tx: &mut dyn StoreTransaction,
    ) -> TombstoneResult<()> {
        self.log.push("after_restore", record);
        Ok(())
    }
}

/// Renames the record inside the destroy transaction.
pub struct RenameOnDestroy;

#[async_trait]
impl LifecycleHooks for RenameOnDestroy {
    async fn after_destroy(
        &self,
        record: &StoredRecord,
        tx: &mut dyn StoreTransaction,
    ) -> TombstoneResult<()> {
        tx.update_field(&record.key(), "name", json!(RENAMED)).await?;
        Ok(())
    }
}

/// Refuses to be destroyed or restored when `locked` is true.
pub struct RefuseWhenLocked {
    pub log: HookLog,
}

#[async_trait]
impl LifecycleHooks for RefuseWhenLocked {
    async fn before_destroy(
        &self,
        record: &StoredRecord,
        _tx: &mut dyn StoreTransaction,
    ) -> TombstoneResult<HookDecision> {
        self.log.push("before_destroy", record);
        Ok(HookDecision::from(record.get("locked").as_bool() != Some(true)))
    }

    async fn after_destroy(
        &self,
        record: &StoredRecord,
        _tx: &mut dyn StoreTransaction,
    ) -> TombstoneResult<()> {
        self.log.push("after_destroy", record);
        Ok(())
    }

    async fn before_restore(
        &self,
        record: &StoredRecord,
        _tx: &mut dyn StoreTransaction,
    ) -> TombstoneResult<HookDecision> {
        self.log.push("before_restore", record);
        Ok(HookDecision::from(record.get("locked").as_bool() != Some(true)))
    }
}

/// For records with `fragile: true`, writes a marker and then fails in
/// both after hooks.
pub struct FailWhenFragile {
    pub log: HookLog,
}

fn fragile(record: &StoredRecord) -> bool {
    record.get("fragile").as_bool() == Some(true)
}

#[async_trait]
impl LifecycleHooks for FailWhenFragile {
    async fn after_destroy(
        &self,
        record: &StoredRecord,
        tx: &mut dyn StoreTransaction,
    ) -> TombstoneResult<()> {
        self.log.push("after_destroy", record);
        if !fragile(record) {
            return Ok(());
        }
        tx.update_field(&record.key(), "marker", json!("written")).await?;
        Err(HookError::failed("after_destroy", &record.key(), "archive offline").into())
    }

    async fn after_restore(
        &self,
        record: &StoredRecord,
        tx: &mut dyn StoreTransaction,
    ) -> TombstoneResult<()> {
        self.log.push("after_restore", record);
        if !fragile(record) {
            return Ok(());
        }
        tx.update_field(&record.key(), "marker", json!("written")).await?;
        Err(HookError::failed("after_restore", &record.key(), "archive offline").into())
    }
}
