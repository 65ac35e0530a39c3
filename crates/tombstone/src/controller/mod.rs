//! State transitions.
//!
//! - [`DestroyController`] - Active → SoftDeleted (hook-gated, atomic) and hard delete
//! - [`RestoreController`] - SoftDeleted → Active with cascading restore
//!
//! Each instance's tombstone write runs with its own hooks inside one
//! [`StoreTransaction`]; a failing after hook rolls the write back.

use std::future::Future;
use std::pin::Pin;

use tracing::warn;

use crate::core::StoreTransaction;
use crate::error::TombstoneResult;
use crate::types::{RecordKey, RecordQuery, StoredRecord};

mod destroy;
mod restore;

pub use destroy::{DestroyAllOutcome, DestroyController};
pub use restore::{CascadePolicy, RestoreController, RestoreOptions, RestoreOutcome};

/// Boxed future used by the recursive cascades.
pub(crate) type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Reads one record by key through a transaction, ignoring the default scope.
pub(crate) async fn read_in_tx(
    tx: &mut dyn StoreTransaction,
    key: &RecordKey,
) -> TombstoneResult<Option<StoredRecord>> {
    let query = RecordQuery::new(&key.entity_type)
        .with_id(&key.id)
        .with_limit(1);
    Ok(tx.find(&query).await?.into_iter().next())
}

/// Rolls back, logging a rollback failure instead of returning it.
pub(crate) async fn rollback_quietly(tx: Box<dyn StoreTransaction>, key: &RecordKey) {
    if let Err(e) = tx.rollback().await {
        warn!(record = %key, error = %e, "Rollback failed");
    }
}
