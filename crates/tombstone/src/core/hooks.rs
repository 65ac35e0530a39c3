//! Lifecycle hook dispatch.
//!
//! Hooks are registered per entity type. Destroy and restore call only their
//! own pair of hooks; the update pair runs only for
//! [`TombstoneStorage::update`](crate::storage::TombstoneStorage::update).
//!
//! Every hook receives the open [`StoreTransaction`], so any write it makes
//! commits or rolls back together with the mutation it is attached to.
//!
//! # Example
//!
//! ```
//! use async_trait::async_trait;
//! use helios_tombstone::core::{HookDecision, LifecycleHooks, StoreTransaction};
//! use helios_tombstone::types::StoredRecord;
//! use helios_tombstone::TombstoneResult;
//!
//! /// Refuses to destroy records flagged as permanent.
//! struct KeepPermanent;
//!
//! #[async_trait]
//! impl LifecycleHooks for KeepPermanent {
//!     async fn before_destroy(
//!         &self,
//!         record: &StoredRecord,
//!         _tx: &mut dyn StoreTransaction,
//!     ) -> TombstoneResult<HookDecision> {
//!         if record.get("permanent").as_bool() == Some(true) {
//!             return Ok(HookDecision::Abort);
//!         }
//!         Ok(HookDecision::Proceed)
//!     }
//! }
//! ```

use async_trait::async_trait;

use crate::error::TombstoneResult;
use crate::types::StoredRecord;

use super::store::StoreTransaction;

/// Outcome of a before hook.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HookDecision {
    /// Continue with the transition.
    #[default]
    Proceed,
    /// Refuse the transition; nothing is written.
    Abort,
}

impl HookDecision {
    /// Returns `true` for `Abort`.
    pub fn is_abort(&self) -> bool {
        matches!(self, HookDecision::Abort)
    }
}

impl From<bool> for HookDecision {
    fn from(proceed: bool) -> Self {
        if proceed {
            HookDecision::Proceed
        } else {
            HookDecision::Abort
        }
    }
}

/// Per-entity-type lifecycle hooks. All methods default to no-ops.
#[async_trait]
pub trait LifecycleHooks: Send + Sync {
    /// Runs before the tombstone is written. `Abort` leaves the record untouched.
    async fn before_destroy(
        &self,
        _record: &StoredRecord,
        _tx: &mut dyn StoreTransaction,
    ) -> TombstoneResult<HookDecision> {
        Ok(HookDecision::Proceed)
    }

    /// Runs after the tombstone is written. An error rolls the write back.
    async fn after_destroy(
        &self,
        _record: &StoredRecord,
        _tx: &mut dyn StoreTransaction,
    ) -> TombstoneResult<()> {
        Ok(())
    }

    /// Runs before the tombstone is cleared.
    async fn before_restore(
        &self,
        _record: &StoredRecord,
        _tx: &mut dyn StoreTransaction,
    ) -> TombstoneResult<HookDecision> {
        Ok(HookDecision::Proceed)
    }

    /// Runs after the tombstone is cleared. An error rolls the write back.
    async fn after_restore(
        &self,
        _record: &StoredRecord,
        _tx: &mut dyn StoreTransaction,
    ) -> TombstoneResult<()> {
        Ok(())
    }

    /// Runs before a general update. Never called by destroy or restore.
    async fn before_update(
        &self,
        _record: &StoredRecord,
        _tx: &mut dyn StoreTransaction,
    ) -> TombstoneResult<HookDecision> {
        Ok(HookDecision::Proceed)
    }

    /// Runs after a general update. Never called by destroy or restore.
    async fn after_update(
        &self,
        _record: &StoredRecord,
        _tx: &mut dyn StoreTransaction,
    ) -> TombstoneResult<()> {
        Ok(())
    }
}

/// Hooks that do nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopHooks;

impl LifecycleHooks for NoopHooks {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decision_from_bool() {
        assert_eq!(HookDecision::from(true), HookDecision::Proceed);
        assert!(HookDecision::from(false).is_abort());
        assert_eq!(HookDecision::default(), HookDecision::Proceed);
    }
}
