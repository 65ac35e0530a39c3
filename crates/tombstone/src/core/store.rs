//! Record store traits.
//!
//! These traits are the narrow boundary to the host persistence engine. The
//! tombstone layer never builds storage-specific queries itself: it hands a
//! [`RecordQuery`] to a [`RecordStore`] and trusts the store to evaluate it.
//!
//! Stores see queries *after* the [`ScopedQueryGate`](crate::scope::ScopedQueryGate)
//! has run, so they apply exactly the conditions they are given and nothing
//! more.

use async_trait::async_trait;
use serde_json::{Map, Value};

use crate::error::TombstoneResult;
use crate::types::{Aggregate, RecordKey, RecordQuery, StoredRecord};

/// Query execution, physical delete and unit-of-work provider.
///
/// # Example
///
/// ```
/// use helios_tombstone::backends::memory::InMemoryStore;
/// use helios_tombstone::core::RecordStore;
/// use helios_tombstone::types::{RecordQuery, StoredRecord};
/// use serde_json::json;
///
/// # tokio_test::block_on(async {
/// let store = InMemoryStore::new();
/// store
///     .insert(StoredRecord::from_value("androids", "r2d2", json!({"deleted_at": null})))
///     .await?;
///
/// let count = store.count(&RecordQuery::new("androids")).await?;
/// assert_eq!(count, 1);
/// # Ok::<(), helios_tombstone::TombstoneError>(())
/// # });
/// ```
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Returns a short name identifying the backend (e.g. `"memory"`, `"sqlite"`).
    fn backend_name(&self) -> &'static str;

    /// Inserts a new record.
    ///
    /// # Errors
    ///
    /// Returns `RecordError::AlreadyExists` if the key is taken.
    async fn insert(&self, record: StoredRecord) -> TombstoneResult<StoredRecord>;

    /// Returns the records matching the query, honouring sort, offset and limit.
    async fn find(&self, query: &RecordQuery) -> TombstoneResult<Vec<StoredRecord>>;

    /// Counts the records matching the query's conditions.
    async fn count(&self, query: &RecordQuery) -> TombstoneResult<u64>;

    /// Computes a numeric aggregate over the records matching the query's conditions.
    async fn aggregate(
        &self,
        query: &RecordQuery,
        aggregate: &Aggregate,
    ) -> TombstoneResult<Option<f64>>;

    /// Physically removes every record matching the query's conditions.
    ///
    /// No hooks run and no default filter is implied. Returns the number of
    /// rows removed.
    async fn delete_where(&self, query: &RecordQuery) -> TombstoneResult<u64>;

    /// Opens a rollback-capable unit of work.
    async fn begin(&self) -> TombstoneResult<Box<dyn StoreTransaction>>;

    /// Writes `fields` to an existing record in its own unit of work.
    ///
    /// This is a raw store write; it does not run lifecycle hooks.
    async fn update(
        &self,
        key: &RecordKey,
        fields: Map<String, Value>,
    ) -> TombstoneResult<StoredRecord> {
        let mut tx = self.begin().await?;
        match tx.update(key, fields).await {
            Ok(record) => {
                tx.commit().await?;
                Ok(record)
            }
            Err(e) => {
                tx.rollback().await?;
                Err(e)
            }
        }
    }
}

/// A rollback-capable unit of work.
///
/// Writes made through a transaction are invisible to the parent store until
/// [`commit`](Self::commit). Dropping a transaction without committing rolls
/// it back.
#[async_trait]
pub trait StoreTransaction: Send {
    /// Reads records as seen by this transaction.
    async fn find(&mut self, query: &RecordQuery) -> TombstoneResult<Vec<StoredRecord>>;

    /// Merges `fields` into an existing record.
    ///
    /// # Errors
    ///
    /// Returns `RecordError::NotFound` if the record does not exist.
    async fn update(
        &mut self,
        key: &RecordKey,
        fields: Map<String, Value>,
    ) -> TombstoneResult<StoredRecord>;

    /// Sets a single field, bypassing every hook chain.
    async fn update_field(
        &mut self,
        key: &RecordKey,
        field: &str,
        value: Value,
    ) -> TombstoneResult<StoredRecord> {
        let mut fields = Map::new();
        fields.insert(field.to_string(), value);
        self.update(key, fields).await
    }

    /// Physically removes one record. Returns `false` if there was no such row.
    async fn delete(&mut self, key: &RecordKey) -> TombstoneResult<bool>;

    /// Commits the transaction.
    async fn commit(self: Box<Self>) -> TombstoneResult<()>;

    /// Rolls back the transaction.
    async fn rollback(self: Box<Self>) -> TombstoneResult<()>;
}
