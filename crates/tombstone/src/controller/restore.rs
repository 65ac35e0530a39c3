//! Restore and cascading restore.

use std::collections::HashSet;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::core::RecordStore;
use crate::error::{CascadeError, CascadeFailure, RecordError, TombstoneError, TombstoneResult};
use crate::registry::EntityRegistry;
use crate::scope::{OperationContext, ReadOrigin, ScopedQueryGate};
use crate::types::{RecordKey, RecordQuery, RelationDescriptor, StoredRecord};

use super::{BoxFuture, read_in_tx, rollback_quietly};

/// What to do when one branch of a cascading restore fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CascadePolicy {
    /// Stop at the first failed branch and return
    /// [`CascadeError::Branch`]. Records restored before the failure stay
    /// restored.
    #[default]
    FailFast,
    /// Keep restoring the remaining branches and return
    /// [`CascadeError::Partial`] listing every failure.
    BestEffort,
}

/// Options for [`RestoreController::restore`].
///
/// # Examples
///
/// ```
/// use helios_tombstone::controller::RestoreOptions;
///
/// // Default: restore dependents destroyed along with the record.
/// assert!(RestoreOptions::default().cascades_dependents());
///
/// // An explicit include list turns the default cascade off...
/// let parent_only = RestoreOptions::default().include("android");
/// assert!(!parent_only.cascades_dependents());
///
/// // ...unless it is asked for again.
/// let both = parent_only.with_destroyed_dependents(true);
/// assert!(both.cascades_dependents());
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RestoreOptions {
    /// Relations restored unconditionally, in either direction.
    #[serde(default)]
    pub include: Vec<String>,

    /// Whether owning dependent relations are restored. `None` means
    /// "true unless `include` is non-empty".
    #[serde(default)]
    pub include_destroyed_dependents: Option<bool>,

    /// Failure handling for cascade branches.
    #[serde(default)]
    pub cascade_policy: CascadePolicy,
}

impl RestoreOptions {
    /// Creates default options.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a relation to the include list.
    pub fn include(mut self, relation: impl Into<String>) -> Self {
        self.include.push(relation.into());
        self
    }

    /// Sets `include_destroyed_dependents` explicitly.
    pub fn with_destroyed_dependents(mut self, enabled: bool) -> Self {
        self.include_destroyed_dependents = Some(enabled);
        self
    }

    /// Sets the cascade failure policy.
    pub fn with_cascade_policy(mut self, policy: CascadePolicy) -> Self {
        self.cascade_policy = policy;
        self
    }

    /// Returns the effective `include_destroyed_dependents`.
    pub fn cascades_dependents(&self) -> bool {
        self.include_destroyed_dependents
            .unwrap_or(self.include.is_empty())
    }

    /// Returns `true` if a restore should cross `relation`.
    ///
    /// Explicit inclusion always wins; the default cascade only covers owning
    /// relations whose rule is [`RestoreRule::WithOwner`](crate::types::RestoreRule::WithOwner).
    pub fn should_restore(&self, relation: &RelationDescriptor) -> bool {
        self.include.iter().any(|name| name == &relation.name)
            || (self.cascades_dependents() && relation.restores_with_owner())
    }
}

/// Result of a successful restore.
#[derive(Debug, Clone)]
pub struct RestoreOutcome {
    /// The requested record, as it is after the restore.
    pub record: StoredRecord,
    /// Every record whose tombstone was cleared, in restore order.
    pub restored: Vec<RecordKey>,
}

/// Drives the SoftDeleted → Active transition.
///
/// The requested record is located with its type's default scope suspended,
/// so it is found in any state. Each restored record gets its own
/// transaction holding its tombstone write and its `before_restore` /
/// `after_restore` hooks; update hooks never run. The cascade is not atomic
/// across records.
///
/// Cascading visits only soft-deleted targets and never the same record
/// twice, so cyclic relation graphs terminate.
#[derive(Clone)]
pub struct RestoreController {
    store: Arc<dyn RecordStore>,
    registry: Arc<EntityRegistry>,
}

/// Mutable state threaded through one cascading restore.
struct CascadeState {
    visited: HashSet<RecordKey>,
    restored: Vec<RecordKey>,
    failures: Vec<CascadeFailure>,
}

impl RestoreController {
    /// Creates a controller.
    pub fn new(store: Arc<dyn RecordStore>, registry: Arc<EntityRegistry>) -> Self {
        Self { store, registry }
    }

    /// Restores a record by ID and cascades according to `options`.
    ///
    /// # Errors
    ///
    /// - `RecordError::NotFound` if no row exists
    /// - `TombstoneError::Aborted` if `before_restore` refused
    /// - the hook's own error if `after_restore` failed (the write is rolled back)
    /// - `CascadeError` if a related branch failed
    pub async fn restore(
        &self,
        ctx: &OperationContext,
        entity_type: &str,
        id: &str,
        options: &RestoreOptions,
    ) -> TombstoneResult<RestoreOutcome> {
        self.registry.require_policy(entity_type)?;

        let record = {
            let _guard = ctx.suspend(entity_type);
            let gate = ScopedQueryGate::new(&self.registry);
            let query = gate.apply(
                RecordQuery::new(entity_type).with_id(id).with_limit(1),
                ctx.scope(),
                ReadOrigin::Direct,
            );
            self.store
                .find(&query)
                .await?
                .into_iter()
                .next()
                .ok_or_else(|| RecordError::not_found(entity_type, id))?
        };

        let key = record.key();
        let mut state = CascadeState {
            visited: HashSet::new(),
            restored: Vec::new(),
            failures: Vec::new(),
        };

        self.restore_node(ctx, record, options, &mut state).await?;

        if !state.failures.is_empty() {
            warn!(
                record = %key,
                failed = state.failures.len(),
                restored = state.restored.len(),
                "Restore finished with failed branches"
            );
            return Err(CascadeError::Partial {
                restored: state.restored.len(),
                failures: state.failures,
            }
            .into());
        }

        let record = {
            let _guard = ctx.suspend(entity_type);
            let query = RecordQuery::new(entity_type).with_id(id).with_limit(1);
            self.store
                .find(&query)
                .await?
                .into_iter()
                .next()
                .ok_or_else(|| RecordError::not_found(entity_type, id))?
        };

        info!(
            record = %key,
            restored = state.restored.len(),
            correlation_id = ctx.correlation_id(),
            "Restored record"
        );
        Ok(RestoreOutcome {
            record,
            restored: state.restored,
        })
    }

    /// Restores `record` itself, then walks its relations.
    ///
    /// Returns `Err` for this record's own failure. Branch failures are
    /// returned (fail-fast) or collected in `state` (best-effort).
    fn restore_node<'a>(
        &'a self,
        ctx: &'a OperationContext,
        record: StoredRecord,
        options: &'a RestoreOptions,
        state: &'a mut CascadeState,
    ) -> BoxFuture<'a, TombstoneResult<()>> {
        Box::pin(async move {
            let key = record.key();
            state.visited.insert(key.clone());

            if self.restore_one(&record).await? {
                state.restored.push(key.clone());
            }

            for relation in self.registry.relations(&key.entity_type) {
                if !options.should_restore(relation) {
                    continue;
                }
                let Some(target_policy) = self.registry.policy(&relation.target_type) else {
                    continue;
                };
                let Some(query) = relation.related_query(&record) else {
                    continue;
                };

                // Deleted-only read of the targets.
                let targets = {
                    let _guard = ctx.suspend(&relation.target_type);
                    let gate = ScopedQueryGate::new(&self.registry);
                    let query = gate
                        .apply(query, ctx.scope(), ReadOrigin::Direct)
                        .with_condition(target_policy.deleted_condition());
                    self.store.find(&query).await?
                };

                for target in targets {
                    let target_key = target.key();
                    if state.visited.contains(&target_key) {
                        continue;
                    }
                    debug!(parent = %key, relation = %relation.name, target = %target_key, "Cascading restore");

                    let result = self.restore_node(ctx, target, options, &mut *state).await;
                    let error = match result {
                        Ok(()) => continue,
                        Err(e) if e.is_aborted() => {
                            warn!(parent = %key, target = %target_key, "Related restore aborted, skipping");
                            continue;
                        }
                        Err(e) => e,
                    };

                    match options.cascade_policy {
                        CascadePolicy::FailFast => {
                            // Deeper branches already carry their own location.
                            if matches!(error, TombstoneError::Cascade(_)) {
                                return Err(error);
                            }
                            return Err(CascadeError::Branch {
                                relation: relation.name.clone(),
                                entity_type: target_key.entity_type,
                                id: target_key.id,
                                source: Box::new(error),
                            }
                            .into());
                        }
                        CascadePolicy::BestEffort => {
                            warn!(parent = %key, target = %target_key, error = %error, "Related restore failed, continuing");
                            state.failures.push(CascadeFailure {
                                relation: relation.name.clone(),
                                target: target_key,
                                error,
                            });
                        }
                    }
                }
            }

            Ok(())
        })
    }

    /// Clears one record's tombstone in its own transaction.
    ///
    /// Returns `false` without running hooks if the record is already active.
    async fn restore_one(&self, record: &StoredRecord) -> TombstoneResult<bool> {
        let key = record.key();
        let policy = self.registry.require_policy(&key.entity_type)?;
        let hooks = self.registry.hooks(&key.entity_type);

        let mut tx = self.store.begin().await?;
        let current = match read_in_tx(tx.as_mut(), &key).await {
            Ok(Some(current)) => current,
            Ok(None) => {
                rollback_quietly(tx, &key).await;
                return Err(RecordError::not_found(&key.entity_type, &key.id).into());
            }
            Err(e) => {
                rollback_quietly(tx, &key).await;
                return Err(e);
            }
        };

        if policy.is_active(&current) {
            rollback_quietly(tx, &key).await;
            return Ok(false);
        }

        let result: TombstoneResult<()> = async {
            if hooks.before_restore(&current, tx.as_mut()).await?.is_abort() {
                return Err(TombstoneError::aborted("before_restore", &key));
            }
            let updated = tx
                .as_mut()
                .update_field(&key, policy.tombstone_field(), policy.not_destroyed_value().clone())
                .await?;
            hooks.after_restore(&updated, tx.as_mut()).await
        }
        .await;

        match result {
            Ok(()) => {
                tx.commit().await?;
                debug!(record = %key, "Cleared tombstone");
                Ok(true)
            }
            Err(e) => {
                rollback_quietly(tx, &key).await;
                Err(e)
            }
        }
    }
}

impl std::fmt::Debug for RestoreController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RestoreController")
            .field("backend", &self.store.backend_name())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::RelationDescriptor;

    fn components() -> RelationDescriptor {
        RelationDescriptor::has_many("components", "components", "android_id").dependent()
    }

    fn android() -> RelationDescriptor {
        RelationDescriptor::belongs_to("android", "androids", "android_id").dependent()
    }

    #[test]
    fn test_default_options_cascade_dependents_only() {
        let options = RestoreOptions::default();
        assert!(options.should_restore(&components()));
        assert!(!options.should_restore(&android()));
    }

    #[test]
    fn test_include_wins_over_default() {
        let options = RestoreOptions::new().include("android");
        assert!(options.should_restore(&android()));
        assert!(!options.should_restore(&components()));
    }

    #[test]
    fn test_dependents_disabled() {
        let options = RestoreOptions::new().with_destroyed_dependents(false);
        assert!(!options.should_restore(&components()));
    }

    #[test]
    fn test_include_plus_dependents() {
        let options = RestoreOptions::new()
            .include("android")
            .with_destroyed_dependents(true);
        assert!(options.should_restore(&android()));
        assert!(options.should_restore(&components()));
    }

    #[test]
    fn test_non_dependent_owning_relation_is_explicit_only() {
        let plain = RelationDescriptor::has_many("memories", "memories", "android_id");
        assert!(!RestoreOptions::default().should_restore(&plain));
        assert!(RestoreOptions::new().include("memories").should_restore(&plain));
    }

    #[test]
    fn test_options_deserialize() {
        let options: RestoreOptions = serde_json::from_str(
            r#"{"include": ["android"], "cascade_policy": "best_effort"}"#,
        )
        .unwrap();
        assert_eq!(options.cascade_policy, CascadePolicy::BestEffort);
        assert!(!options.cascades_dependents());
    }
}
