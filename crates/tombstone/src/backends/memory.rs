//! In-memory record store.
//!
//! Tables keep insertion order. Readers take a shared lock on the committed
//! tables; writers (including every open transaction) serialize on a single
//! async writer lock. A transaction works on a private copy of the tables and
//! swaps it in on commit, so uncommitted writes are never visible to readers.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;
use serde_json::{Map, Value};
use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::core::{RecordStore, StoreTransaction};
use crate::error::{RecordError, TombstoneResult, TransactionError};
use crate::types::{Aggregate, RecordKey, RecordQuery, StoredRecord};

type Tables = HashMap<String, Vec<StoredRecord>>;

fn locate<'a>(tables: &'a mut Tables, key: &RecordKey) -> Option<&'a mut StoredRecord> {
    tables
        .get_mut(&key.entity_type)?
        .iter_mut()
        .find(|r| r.id() == key.id)
}

fn select(tables: &Tables, query: &RecordQuery) -> Vec<StoredRecord> {
    tables
        .get(query.entity_type())
        .map(|table| query.select(table))
        .unwrap_or_default()
}

fn matching<'a>(tables: &'a Tables, query: &'a RecordQuery) -> impl Iterator<Item = &'a StoredRecord> {
    tables
        .get(query.entity_type())
        .into_iter()
        .flatten()
        .filter(move |r| query.matches(r))
}

/// A record store held entirely in memory.
///
/// # Example
///
/// ```
/// use helios_tombstone::backends::memory::InMemoryStore;
/// use helios_tombstone::core::RecordStore;
///
/// let store = InMemoryStore::new();
/// assert_eq!(store.backend_name(), "memory");
/// ```
#[derive(Clone, Default)]
pub struct InMemoryStore {
    tables: Arc<RwLock<Tables>>,
    writer: Arc<Mutex<()>>,
}

impl InMemoryStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of rows of `entity_type`, in any state.
    pub fn len(&self, entity_type: &str) -> usize {
        self.tables.read().get(entity_type).map_or(0, Vec::len)
    }

    /// Returns `true` if the store holds no rows at all.
    pub fn is_empty(&self) -> bool {
        self.tables.read().values().all(Vec::is_empty)
    }
}

impl fmt::Debug for InMemoryStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tables = self.tables.read();
        let sizes: HashMap<&str, usize> = tables.iter().map(|(k, v)| (k.as_str(), v.len())).collect();
        f.debug_struct("InMemoryStore").field("tables", &sizes).finish()
    }
}

#[async_trait]
impl RecordStore for InMemoryStore {
    fn backend_name(&self) -> &'static str {
        "memory"
    }

    async fn insert(&self, record: StoredRecord) -> TombstoneResult<StoredRecord> {
        let _writer = self.writer.lock().await;
        let mut tables = self.tables.write();
        let table = tables.entry(record.entity_type().to_string()).or_default();
        if table.iter().any(|r| r.id() == record.id()) {
            return Err(RecordError::AlreadyExists {
                entity_type: record.entity_type().to_string(),
                id: record.id().to_string(),
            }
            .into());
        }
        table.push(record.clone());
        Ok(record)
    }

    async fn find(&self, query: &RecordQuery) -> TombstoneResult<Vec<StoredRecord>> {
        Ok(select(&self.tables.read(), query))
    }

    async fn count(&self, query: &RecordQuery) -> TombstoneResult<u64> {
        Ok(matching(&self.tables.read(), query).count() as u64)
    }

    async fn aggregate(
        &self,
        query: &RecordQuery,
        aggregate: &Aggregate,
    ) -> TombstoneResult<Option<f64>> {
        Ok(aggregate.compute(matching(&self.tables.read(), query)))
    }

    async fn delete_where(&self, query: &RecordQuery) -> TombstoneResult<u64> {
        let _writer = self.writer.lock().await;
        let mut tables = self.tables.write();
        let Some(table) = tables.get_mut(query.entity_type()) else {
            return Ok(0);
        };
        let before = table.len();
        table.retain(|r| !query.matches(r));
        Ok((before - table.len()) as u64)
    }

    async fn begin(&self) -> TombstoneResult<Box<dyn StoreTransaction>> {
        let writer = Arc::clone(&self.writer).lock_owned().await;
        let working = self.tables.read().clone();
        Ok(Box::new(InMemoryTransaction {
            shared: Arc::clone(&self.tables),
            working,
            writer: Some(writer),
        }))
    }
}

/// A transaction over an [`InMemoryStore`].
pub struct InMemoryTransaction {
    shared: Arc<RwLock<Tables>>,
    working: Tables,
    writer: Option<OwnedMutexGuard<()>>,
}

impl InMemoryTransaction {
    fn ensure_active(&self) -> TombstoneResult<()> {
        if self.writer.is_none() {
            return Err(TransactionError::InvalidTransaction.into());
        }
        Ok(())
    }
}

impl fmt::Debug for InMemoryTransaction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InMemoryTransaction")
            .field("active", &self.writer.is_some())
            .finish()
    }
}

#[async_trait]
impl StoreTransaction for InMemoryTransaction {
    async fn find(&mut self, query: &RecordQuery) -> TombstoneResult<Vec<StoredRecord>> {
        self.ensure_active()?;
        Ok(select(&self.working, query))
    }

    async fn update(
        &mut self,
        key: &RecordKey,
        fields: Map<String, Value>,
    ) -> TombstoneResult<StoredRecord> {
        self.ensure_active()?;
        let record = locate(&mut self.working, key)
            .ok_or_else(|| RecordError::not_found(&key.entity_type, &key.id))?;
        record.merge(fields);
        Ok(record.clone())
    }

    async fn delete(&mut self, key: &RecordKey) -> TombstoneResult<bool> {
        self.ensure_active()?;
        let Some(table) = self.working.get_mut(&key.entity_type) else {
            return Ok(false);
        };
        let before = table.len();
        table.retain(|r| r.id() != key.id);
        Ok(table.len() < before)
    }

    async fn commit(mut self: Box<Self>) -> TombstoneResult<()> {
        self.ensure_active()?;
        let working = std::mem::take(&mut self.working);
        *self.shared.write() = working;
        self.writer = None;
        Ok(())
    }

    async fn rollback(mut self: Box<Self>) -> TombstoneResult<()> {
        self.ensure_active()?;
        self.writer = None;
        Ok(())
    }
}
