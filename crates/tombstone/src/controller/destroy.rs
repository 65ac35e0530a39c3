//! Soft destroy and hard delete.

use std::collections::HashSet;
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::core::{RecordStore, StoreTransaction};
use crate::error::{RecordError, TombstoneError, TombstoneResult};
use crate::registry::EntityRegistry;
use crate::scope::{OperationContext, ReadOrigin, ScopedQueryGate};
use crate::types::{RecordKey, RecordQuery, StoredRecord};

use super::{BoxFuture, read_in_tx, rollback_quietly};

/// Result of [`DestroyController::destroy_all`].
#[derive(Debug, Clone, Default)]
pub struct DestroyAllOutcome {
    /// Records that were soft-deleted, in resolution order.
    pub destroyed: Vec<StoredRecord>,
    /// Records whose before-destroy hook refused.
    pub aborted: Vec<RecordKey>,
}

/// Drives the Active → SoftDeleted transition and physical removal.
///
/// # Destroy
///
/// For one record, inside a single transaction:
///
/// 1. `before_destroy`; `Abort` ends the call with [`TombstoneError::Aborted`]
///    and nothing written.
/// 2. Owning `dependent` relations to soft-deletable types are destroyed the
///    same way, recursively. A dependent whose hook aborts is left alone.
/// 3. The tombstone field is set to the resolved destroyed value with
///    [`StoreTransaction::update_field`]; update hooks do not run.
/// 4. `after_destroy`; an error rolls back everything above and is returned
///    unchanged.
///
/// Destroying a record that is already soft-deleted still runs both hooks and
/// the cascade over active dependents; only the tombstone write is skipped.
///
/// A record of a plain type has no tombstone. Its dependents are cascaded as
/// above and the row itself is physically removed in the same transaction.
#[derive(Clone)]
pub struct DestroyController {
    store: Arc<dyn RecordStore>,
    registry: Arc<EntityRegistry>,
}

impl DestroyController {
    /// Creates a controller.
    pub fn new(store: Arc<dyn RecordStore>, registry: Arc<EntityRegistry>) -> Self {
        Self { store, registry }
    }

    /// Soft-deletes one record and its dependents atomically.
    pub async fn destroy(
        &self,
        ctx: &OperationContext,
        record: &StoredRecord,
    ) -> TombstoneResult<StoredRecord> {
        let key = record.key();
        self.registry.registration(&key.entity_type)?;

        let mut tx = self.store.begin().await?;
        let mut visited = HashSet::new();

        match self.destroy_in(tx.as_mut(), key.clone(), &mut visited).await {
            Ok(destroyed) => {
                tx.commit().await?;
                info!(
                    record = %key,
                    cascaded = visited.len().saturating_sub(1),
                    correlation_id = ctx.correlation_id(),
                    "Destroyed record"
                );
                Ok(destroyed)
            }
            Err(e) => {
                rollback_quietly(tx, &key).await;
                if e.is_aborted() {
                    warn!(record = %key, "Destroy aborted by before_destroy");
                } else {
                    warn!(record = %key, error = %e, "Destroy rolled back");
                }
                Err(e)
            }
        }
    }

    /// Destroys every record matched by `query` under the default scope.
    ///
    /// Each record is destroyed in its own transaction. Aborted records are
    /// collected; any other failure stops the batch and is returned, leaving
    /// records destroyed so far destroyed.
    pub async fn destroy_all(
        &self,
        ctx: &OperationContext,
        query: RecordQuery,
    ) -> TombstoneResult<DestroyAllOutcome> {
        self.registry.registration(query.entity_type())?;

        let gate = ScopedQueryGate::new(&self.registry);
        let query = gate.apply(query, ctx.scope(), ReadOrigin::Direct);
        let targets = self.store.find(&query).await?;

        let mut outcome = DestroyAllOutcome::default();
        for target in targets {
            match self.destroy(ctx, &target).await {
                Ok(record) => outcome.destroyed.push(record),
                Err(e) if e.is_aborted() => outcome.aborted.push(target.key()),
                Err(e) => return Err(e),
            }
        }

        info!(
            entity_type = query.entity_type(),
            destroyed = outcome.destroyed.len(),
            aborted = outcome.aborted.len(),
            "Batch destroy complete"
        );
        Ok(outcome)
    }

    /// Physically removes every record matched by `query`, in any state.
    ///
    /// Runs inside a suspension of the default scope; fires no hooks and does
    /// not cascade. Returns the number of records removed.
    pub async fn hard_delete(
        &self,
        ctx: &OperationContext,
        query: RecordQuery,
    ) -> TombstoneResult<u64> {
        let _guard = ctx.suspend(query.entity_type());
        let gate = ScopedQueryGate::new(&self.registry);
        let query = gate.apply(query, ctx.scope(), ReadOrigin::Direct);

        let removed = self.store.delete_where(&query).await?;
        info!(
            entity_type = query.entity_type(),
            removed,
            "Hard deleted records"
        );
        Ok(removed)
    }

    fn destroy_in<'a>(
        &'a self,
        tx: &'a mut dyn StoreTransaction,
        key: RecordKey,
        visited: &'a mut HashSet<RecordKey>,
    ) -> BoxFuture<'a, TombstoneResult<StoredRecord>> {
        Box::pin(async move {
            visited.insert(key.clone());

            let policy = self.registry.registration(&key.entity_type)?.policy();
            let current = read_in_tx(&mut *tx, &key)
                .await?
                .ok_or_else(|| RecordError::not_found(&key.entity_type, &key.id))?;

            let hooks = self.registry.hooks(&key.entity_type);
            if hooks.before_destroy(&current, &mut *tx).await?.is_abort() {
                return Err(TombstoneError::aborted("before_destroy", &key));
            }

            for relation in self.registry.relations(&key.entity_type) {
                if !(relation.dependent_on_destroy && relation.kind.is_owning()) {
                    continue;
                }
                let Some(target_policy) = self.registry.policy(&relation.target_type) else {
                    continue;
                };
                let Some(query) = relation.related_query(&current) else {
                    continue;
                };

                let dependents = tx
                    .find(&query.with_condition(target_policy.active_condition()))
                    .await?;
                for dependent in dependents {
                    let child = dependent.key();
                    if visited.contains(&child) {
                        continue;
                    }
                    debug!(parent = %key, relation = %relation.name, child = %child, "Cascading destroy");
                    match self.destroy_in(&mut *tx, child.clone(), &mut *visited).await {
                        Ok(_) => {}
                        Err(e) if e.is_aborted() => {
                            warn!(parent = %key, child = %child, "Dependent destroy aborted, skipping");
                        }
                        Err(e) => return Err(e),
                    }
                }
            }

            let updated = match policy {
                Some(policy) if policy.is_active(&current) => {
                    let value = policy.resolve_destroyed()?;
                    tx.update_field(&key, policy.tombstone_field(), value)
                        .await?
                }
                Some(_) => {
                    debug!(record = %key, "Already soft-deleted, tombstone kept");
                    current
                }
                None => {
                    tx.delete(&key).await?;
                    debug!(record = %key, "Removed plain record");
                    current
                }
            };

            hooks.after_destroy(&updated, &mut *tx).await?;

            Ok(read_in_tx(&mut *tx, &key).await?.unwrap_or(updated))
        })
    }
}

impl std::fmt::Debug for DestroyController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DestroyController")
            .field("backend", &self.store.backend_name())
            .finish_non_exhaustive()
    }
}
