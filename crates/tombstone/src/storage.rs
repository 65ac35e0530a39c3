//! The caller-facing facade.
//!
//! [`TombstoneStorage`] wraps a [`RecordStore`] and an [`EntityRegistry`] and
//! exposes the soft-delete aware surface: default-scoped reads and
//! aggregates, destroy, restore, hard delete, relation accessors and
//! named-operation dispatch.
//!
//! Every method takes an [`OperationContext`]. Reads made through the same
//! context see that context's suspensions, and nothing else's.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//!
//! use helios_tombstone::backends::memory::InMemoryStore;
//! use helios_tombstone::controller::RestoreOptions;
//! use helios_tombstone::dispatch::OperationArgs;
//! use helios_tombstone::policy::ScopePolicy;
//! use helios_tombstone::registry::{EntityRegistration, EntityRegistry};
//! use helios_tombstone::scope::OperationContext;
//! use helios_tombstone::storage::TombstoneStorage;
//! use helios_tombstone::types::RecordQuery;
//! use serde_json::json;
//!
//! # tokio_test::block_on(async {
//! let registry = EntityRegistry::builder()
//!     .register(EntityRegistration::soft_deletable("dents", ScopePolicy::timestamp("deleted_at")))
//!     .build()?;
//! let storage = TombstoneStorage::new(Arc::new(InMemoryStore::new()), registry);
//! let ctx = OperationContext::new();
//!
//! let r = storage.insert(&ctx, "dents", json!({"id": "r"})).await?;
//! storage.insert(&ctx, "dents", json!({"id": "c"})).await?;
//! storage.destroy(&ctx, &r).await?;
//!
//! let all = RecordQuery::new("dents");
//! assert_eq!(storage.count(&ctx, all.clone()).await?, 1);
//!
//! let including = storage
//!     .invoke(&ctx, "dents", "count-including-deleted", OperationArgs::new())
//!     .await?;
//! assert_eq!(including.as_count(), Some(2));
//!
//! storage.restore(&ctx, "dents", "r", &RestoreOptions::default()).await?;
//! assert_eq!(storage.count(&ctx, all).await?, 2);
//! # Ok::<(), helios_tombstone::TombstoneError>(())
//! # });
//! ```

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use serde_json::{Map, Value};
use tracing::{debug, instrument, warn};

use crate::controller::{
    DestroyAllOutcome, DestroyController, RestoreController, RestoreOptions, RestoreOutcome,
    read_in_tx, rollback_quietly,
};
use crate::core::RecordStore;
use crate::dispatch::{
    BaseOperation, OperationArgs, OperationCall, OperationHandler, OperationOutput, VariantDispatcher,
};
use crate::error::{BackendError, DispatchError, RecordError, TombstoneError, TombstoneResult};
use crate::policy::DestroyState;
use crate::registry::EntityRegistry;
use crate::scope::{OperationContext, ReadOrigin, ScopedQueryGate};
use crate::types::{
    Aggregate, Condition, RecordKey, RecordQuery, RecordSet, StoredRecord, value_as_id,
};

/// Soft-delete aware access to a record store.
pub struct TombstoneStorage {
    store: Arc<dyn RecordStore>,
    registry: Arc<EntityRegistry>,
    dispatcher: VariantDispatcher,
    fallbacks: Vec<Arc<dyn OperationHandler>>,
    destroyer: DestroyController,
    restorer: RestoreController,
}

impl TombstoneStorage {
    /// Creates a facade over `store` for the entity types in `registry`.
    pub fn new(store: Arc<dyn RecordStore>, registry: EntityRegistry) -> Self {
        Self::with_shared_registry(store, Arc::new(registry))
    }

    /// Creates a facade sharing an existing registry.
    pub fn with_shared_registry(store: Arc<dyn RecordStore>, registry: Arc<EntityRegistry>) -> Self {
        Self {
            destroyer: DestroyController::new(Arc::clone(&store), Arc::clone(&registry)),
            restorer: RestoreController::new(Arc::clone(&store), Arc::clone(&registry)),
            store,
            registry,
            dispatcher: VariantDispatcher::new(),
            fallbacks: Vec::new(),
        }
    }

    /// Appends a handler for operation names this layer does not recognise.
    pub fn with_fallback<H: OperationHandler + 'static>(mut self, handler: H) -> Self {
        self.fallbacks.push(Arc::new(handler));
        self
    }

    /// Returns the underlying store.
    pub fn store(&self) -> &Arc<dyn RecordStore> {
        &self.store
    }

    /// Returns the registry.
    pub fn registry(&self) -> &EntityRegistry {
        &self.registry
    }

    /// Returns the variant dispatcher.
    pub fn dispatcher(&self) -> &VariantDispatcher {
        &self.dispatcher
    }

    fn gate(&self) -> ScopedQueryGate<'_> {
        ScopedQueryGate::new(&self.registry)
    }

    // ===== Writes =====

    /// Inserts a record.
    ///
    /// The ID is taken from `fields["id"]` or generated. A soft-deletable
    /// record without a tombstone field gets the not-destroyed sentinel.
    ///
    /// # Errors
    ///
    /// Returns `BackendError::SerializationError` if `fields` is not a JSON object.
    #[instrument(skip(self, ctx, fields), fields(entity_type = %entity_type))]
    pub async fn insert(
        &self,
        ctx: &OperationContext,
        entity_type: &str,
        fields: Value,
    ) -> TombstoneResult<StoredRecord> {
        let mut fields = match fields {
            Value::Object(map) => map,
            other => {
                return Err(BackendError::SerializationError {
                    message: format!("{entity_type} record must be a JSON object, got {other}"),
                }
                .into());
            }
        };
        let id = fields
            .get("id")
            .and_then(value_as_id)
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

        if let Some(policy) = self.registry.policy(entity_type) {
            fields
                .entry(policy.tombstone_field().to_string())
                .or_insert_with(|| policy.not_destroyed_value().clone());
        }

        let record = self
            .store
            .insert(StoredRecord::new(entity_type, id, fields))
            .await?;
        debug!(
            record = %record.key(),
            correlation_id = ctx.correlation_id(),
            "Inserted record"
        );
        Ok(record)
    }

    /// Updates a record through the general update path.
    ///
    /// Runs `before_update` and `after_update` in one transaction with the
    /// write. The record is addressed by key in any state.
    #[instrument(skip(self, ctx, fields), fields(record = %key))]
    pub async fn update(
        &self,
        ctx: &OperationContext,
        key: &RecordKey,
        fields: Map<String, Value>,
    ) -> TombstoneResult<StoredRecord> {
        let hooks = self.registry.hooks(&key.entity_type);
        let mut tx = self.store.begin().await?;

        let result: TombstoneResult<StoredRecord> = async {
            let current = read_in_tx(tx.as_mut(), key)
                .await?
                .ok_or_else(|| RecordError::not_found(&key.entity_type, &key.id))?;
            if hooks.before_update(&current, tx.as_mut()).await?.is_abort() {
                return Err(TombstoneError::aborted("before_update", key));
            }
            let updated = tx.as_mut().update(key, fields).await?;
            hooks.after_update(&updated, tx.as_mut()).await?;
            Ok(read_in_tx(tx.as_mut(), key).await?.unwrap_or(updated))
        }
        .await;

        match result {
            Ok(record) => {
                tx.commit().await?;
                debug!(
                    record = %key,
                    correlation_id = ctx.correlation_id(),
                    "Updated record"
                );
                Ok(record)
            }
            Err(e) => {
                rollback_quietly(tx, key).await;
                Err(e)
            }
        }
    }

    // ===== Default-scoped reads =====

    /// Returns the records matching `query`, with `includes` preloaded.
    #[instrument(skip(self, ctx, query), fields(entity_type = %query.entity_type()))]
    pub async fn all(&self, ctx: &OperationContext, query: RecordQuery) -> TombstoneResult<RecordSet> {
        let query = self.gate().apply(query, ctx.scope(), ReadOrigin::Direct);
        let records = self.store.find(&query).await?;

        let mut included = BTreeMap::new();
        for relation in query.includes() {
            let targets = self.preload(ctx, &records, query.entity_type(), relation).await?;
            included.insert(relation.clone(), targets);
        }
        Ok(RecordSet { records, included })
    }

    /// Alias for [`all`](Self::all).
    pub async fn find(&self, ctx: &OperationContext, query: RecordQuery) -> TombstoneResult<RecordSet> {
        self.all(ctx, query).await
    }

    /// Returns the first record matching `query`.
    pub async fn first(
        &self,
        ctx: &OperationContext,
        query: RecordQuery,
    ) -> TombstoneResult<Option<StoredRecord>> {
        let set = self.all(ctx, query.with_limit(1)).await?;
        Ok(set.records.into_iter().next())
    }

    /// Returns one record by ID, under the default scope.
    pub async fn find_by_id(
        &self,
        ctx: &OperationContext,
        entity_type: &str,
        id: &str,
    ) -> TombstoneResult<StoredRecord> {
        self.first(ctx, RecordQuery::new(entity_type).with_id(id))
            .await?
            .ok_or_else(|| RecordError::not_found(entity_type, id).into())
    }

    /// Counts the records matching `query`.
    #[instrument(skip(self, ctx, query), fields(entity_type = %query.entity_type()))]
    pub async fn count(&self, ctx: &OperationContext, query: RecordQuery) -> TombstoneResult<u64> {
        let query = self.gate().apply(query, ctx.scope(), ReadOrigin::Direct);
        self.store.count(&query).await
    }

    /// Returns `true` if any record matches `query`.
    pub async fn exists(&self, ctx: &OperationContext, query: RecordQuery) -> TombstoneResult<bool> {
        Ok(self.first(ctx, query).await?.is_some())
    }

    /// Sums `field` over the matching records; `0` when none match.
    pub async fn sum(
        &self,
        ctx: &OperationContext,
        query: RecordQuery,
        field: &str,
    ) -> TombstoneResult<f64> {
        Ok(self
            .aggregate(ctx, query, Aggregate::Sum(field.to_string()))
            .await?
            .unwrap_or(0.0))
    }

    /// Averages `field` over the matching records.
    pub async fn average(
        &self,
        ctx: &OperationContext,
        query: RecordQuery,
        field: &str,
    ) -> TombstoneResult<Option<f64>> {
        self.aggregate(ctx, query, Aggregate::Average(field.to_string()))
            .await
    }

    /// Smallest value of `field` over the matching records.
    pub async fn minimum(
        &self,
        ctx: &OperationContext,
        query: RecordQuery,
        field: &str,
    ) -> TombstoneResult<Option<f64>> {
        self.aggregate(ctx, query, Aggregate::Minimum(field.to_string()))
            .await
    }

    /// Largest value of `field` over the matching records.
    pub async fn maximum(
        &self,
        ctx: &OperationContext,
        query: RecordQuery,
        field: &str,
    ) -> TombstoneResult<Option<f64>> {
        self.aggregate(ctx, query, Aggregate::Maximum(field.to_string()))
            .await
    }

    async fn aggregate(
        &self,
        ctx: &OperationContext,
        query: RecordQuery,
        aggregate: Aggregate,
    ) -> TombstoneResult<Option<f64>> {
        let query = self.gate().apply(query, ctx.scope(), ReadOrigin::Direct);
        self.store.aggregate(&query, &aggregate).await
    }

    /// Loads the targets of `relation` for every record in `records`.
    ///
    /// Pre-load reads are always filtered by the target type's default scope,
    /// even inside a suspension of that type.
    pub async fn preload(
        &self,
        ctx: &OperationContext,
        records: &[StoredRecord],
        entity_type: &str,
        relation: &str,
    ) -> TombstoneResult<Vec<StoredRecord>> {
        let relation = self.registry.relation(entity_type, relation)?;
        let Some(query) = relation.preload_query(records) else {
            return Ok(Vec::new());
        };
        let query = self.gate().apply(query, ctx.scope(), ReadOrigin::Preload);
        self.store.find(&query).await
    }

    /// Returns the targets of `relation` for `record` under the target's default scope.
    pub async fn related(
        &self,
        ctx: &OperationContext,
        record: &StoredRecord,
        relation: &str,
    ) -> TombstoneResult<RecordSet> {
        self.related_with(ctx, record, relation, None).await
    }

    async fn related_with(
        &self,
        ctx: &OperationContext,
        record: &StoredRecord,
        relation: &str,
        extra: Option<Condition>,
    ) -> TombstoneResult<RecordSet> {
        let relation = self.registry.relation(record.entity_type(), relation)?;
        let Some(mut query) = relation.related_query(record) else {
            return Ok(RecordSet::default());
        };
        if let Some(condition) = extra {
            query = query.with_condition(condition);
        }
        let query = self.gate().apply(query, ctx.scope(), ReadOrigin::Direct);
        Ok(RecordSet::new(self.store.find(&query).await?))
    }

    /// Returns the state of a record, looking past the default scope.
    #[instrument(skip(self, ctx), fields(entity_type = %entity_type, id = %id))]
    pub async fn state_of(
        &self,
        ctx: &OperationContext,
        entity_type: &str,
        id: &str,
    ) -> TombstoneResult<DestroyState> {
        let policy = self.registry.require_policy(entity_type)?;
        let _guard = ctx.suspend(entity_type);
        let query = self.gate().apply(
            RecordQuery::new(entity_type).with_id(id).with_limit(1),
            ctx.scope(),
            ReadOrigin::Direct,
        );
        Ok(match self.store.find(&query).await?.first() {
            Some(record) => policy.state_of(record),
            None => DestroyState::HardDeleted,
        })
    }

    // ===== State transitions =====

    /// Soft-deletes a record and its dependents.
    ///
    /// Returns [`TombstoneError::Aborted`] if `before_destroy` refused.
    #[instrument(skip(self, ctx, record), fields(record = %record.key()))]
    pub async fn destroy(
        &self,
        ctx: &OperationContext,
        record: &StoredRecord,
    ) -> TombstoneResult<StoredRecord> {
        self.destroyer.destroy(ctx, record).await
    }

    /// Soft-deletes a record found by ID under the default scope.
    pub async fn destroy_by_id(
        &self,
        ctx: &OperationContext,
        entity_type: &str,
        id: &str,
    ) -> TombstoneResult<StoredRecord> {
        let record = self.find_by_id(ctx, entity_type, id).await?;
        self.destroy(ctx, &record).await
    }

    /// Soft-deletes every record matched by `query` under the default scope.
    #[instrument(skip(self, ctx, query), fields(entity_type = %query.entity_type()))]
    pub async fn destroy_all(
        &self,
        ctx: &OperationContext,
        query: RecordQuery,
    ) -> TombstoneResult<DestroyAllOutcome> {
        self.destroyer.destroy_all(ctx, query).await
    }

    /// Physically removes the records matched by `query`, in any state.
    #[instrument(skip(self, ctx, query), fields(entity_type = %query.entity_type()))]
    pub async fn hard_delete(&self, ctx: &OperationContext, query: RecordQuery) -> TombstoneResult<u64> {
        self.destroyer.hard_delete(ctx, query).await
    }

    /// Physically removes one record, in any state.
    ///
    /// Returns `RecordError::NotFound` if there was no such row.
    pub async fn hard_delete_by_id(
        &self,
        ctx: &OperationContext,
        entity_type: &str,
        id: &str,
    ) -> TombstoneResult<()> {
        let removed = self
            .hard_delete(ctx, RecordQuery::new(entity_type).with_id(id))
            .await?;
        if removed == 0 {
            return Err(RecordError::not_found(entity_type, id).into());
        }
        Ok(())
    }

    /// Restores a record by ID and cascades according to `options`.
    #[instrument(skip(self, ctx, options), fields(entity_type = %entity_type, id = %id))]
    pub async fn restore(
        &self,
        ctx: &OperationContext,
        entity_type: &str,
        id: &str,
        options: &RestoreOptions,
    ) -> TombstoneResult<RestoreOutcome> {
        self.restorer.restore(ctx, entity_type, id, options).await
    }

    /// Restores a record already in hand.
    pub async fn restore_record(
        &self,
        ctx: &OperationContext,
        record: &StoredRecord,
        options: &RestoreOptions,
    ) -> TombstoneResult<RestoreOutcome> {
        self.restore(ctx, record.entity_type(), record.id(), options)
            .await
    }

    // ===== Named operations =====

    /// Invokes a named operation on an entity type.
    ///
    /// Accepts base names (`all`, `find`, `first`, `count`, `sum`, `average`,
    /// `minimum`, `maximum`, `exists`) and their `-including-deleted` and
    /// `-deleted-only` variants; anything else goes to the fallback handlers.
    pub async fn invoke(
        &self,
        ctx: &OperationContext,
        entity_type: &str,
        name: &str,
        args: OperationArgs,
    ) -> TombstoneResult<OperationOutput> {
        self.dispatch(ctx, OperationCall::on_type(entity_type, name, args))
            .await
    }

    /// Invokes a named operation on a record.
    ///
    /// Accepts relation names and their `-including-deleted` and
    /// `-deleted-only` variants; anything else goes to the fallback handlers.
    pub async fn invoke_on(
        &self,
        ctx: &OperationContext,
        record: &StoredRecord,
        name: &str,
    ) -> TombstoneResult<OperationOutput> {
        self.dispatch(ctx, OperationCall::on_record(record.clone(), name))
            .await
    }

    /// Dispatches a prepared call.
    #[instrument(skip(self, ctx, call), fields(operation = %call.name, target = %call.target))]
    pub async fn dispatch(
        &self,
        ctx: &OperationContext,
        call: OperationCall,
    ) -> TombstoneResult<OperationOutput> {
        if let Some(variant) = self.dispatcher.resolve(&self.registry, &call) {
            return variant.execute(self, ctx, &call).await;
        }

        if let Some(base) = BaseOperation::resolve(&self.registry, &call.target, &call.name) {
            return self.run_base(ctx, &base, &call, None).await;
        }

        for handler in &self.fallbacks {
            if let Some(output) = handler.handle(self, ctx, &call).await? {
                return Ok(output);
            }
        }

        warn!(operation = %call.name, target = %call.target, "Unknown operation");
        Err(DispatchError::UnknownOperation {
            entity_type: call.entity_type().to_string(),
            name: call.name,
        }
        .into())
    }

    /// Runs a base operation for `call`, optionally narrowed by `extra`.
    pub(crate) async fn run_base(
        &self,
        ctx: &OperationContext,
        base: &BaseOperation,
        call: &OperationCall,
        extra: Option<Condition>,
    ) -> TombstoneResult<OperationOutput> {
        let mut query = call.query();
        if query.entity_type() != call.entity_type() {
            return Err(DispatchError::UnsupportedTarget {
                operation: call.name.clone(),
                target: format!("{} query on {}", query.entity_type(), call.target),
            }
            .into());
        }
        if let Some(condition) = &extra {
            query = query.with_condition(condition.clone());
        }
        let field = || {
            call.args
                .field
                .as_deref()
                .ok_or_else(|| DispatchError::MissingField {
                    operation: call.name.clone(),
                })
        };

        Ok(match base {
            BaseOperation::All => OperationOutput::Records(self.all(ctx, query).await?),
            BaseOperation::First => OperationOutput::Record(self.first(ctx, query).await?),
            BaseOperation::Count => OperationOutput::Count(self.count(ctx, query).await?),
            BaseOperation::Exists => OperationOutput::Bool(self.exists(ctx, query).await?),
            BaseOperation::Sum => OperationOutput::Number(Some(self.sum(ctx, query, field()?).await?)),
            BaseOperation::Average => OperationOutput::Number(self.average(ctx, query, field()?).await?),
            BaseOperation::Minimum => OperationOutput::Number(self.minimum(ctx, query, field()?).await?),
            BaseOperation::Maximum => OperationOutput::Number(self.maximum(ctx, query, field()?).await?),
            BaseOperation::Relation(name) => {
                let record = call.target.record().ok_or_else(|| DispatchError::UnsupportedTarget {
                    operation: call.name.clone(),
                    target: call.target.to_string(),
                })?;
                let singular = self.registry.relation(record.entity_type(), name)?.is_singular();
                let set = self.related_with(ctx, record, name, extra).await?;
                if singular {
                    OperationOutput::Record(set.records.into_iter().next())
                } else {
                    OperationOutput::Records(set)
                }
            }
        })
    }
}

impl fmt::Debug for TombstoneStorage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TombstoneStorage")
            .field("backend", &self.store.backend_name())
            .field("registry", &self.registry)
            .field("dispatcher", &self.dispatcher)
            .field("fallbacks", &self.fallbacks.len())
            .finish()
    }
}
