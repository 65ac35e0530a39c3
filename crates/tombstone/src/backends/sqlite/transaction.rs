//! Transaction support for the SQLite store.

use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use r2d2::PooledConnection;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::{Connection, OptionalExtension, params, params_from_iter};
use serde_json::{Map, Value};

use crate::core::StoreTransaction;
use crate::error::{BackendError, RecordError, TombstoneError, TombstoneResult, TransactionError};
use crate::types::{RecordKey, RecordQuery, StoredRecord};

use super::sql;

pub(crate) fn internal_error(message: String) -> TombstoneError {
    TombstoneError::Backend(BackendError::Internal {
        backend_name: "sqlite".to_string(),
        message,
        source: None,
    })
}

/// Runs a `SELECT entity_type, id, data` statement.
pub(crate) fn query_records(conn: &Connection, query: &RecordQuery) -> TombstoneResult<Vec<StoredRecord>> {
    let statement = sql::select(query);
    let mut stmt = conn
        .prepare(&statement.sql)
        .map_err(|e| internal_error(format!("Failed to prepare query: {}", e)))?;

    let rows = stmt
        .query_map(params_from_iter(statement.params.iter()), |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
            ))
        })
        .map_err(|e| internal_error(format!("Failed to run query: {}", e)))?;

    let mut records = Vec::new();
    for row in rows {
        let (entity_type, id, data) =
            row.map_err(|e| internal_error(format!("Failed to read row: {}", e)))?;
        records.push(sql::record_from_row(entity_type, id, &data)?);
    }
    Ok(records)
}

/// A SQLite transaction, opened with `BEGIN IMMEDIATE`.
///
/// Dropping an active transaction rolls it back.
pub struct SqliteTransaction {
    /// The connection used for this transaction.
    conn: Arc<Mutex<PooledConnection<SqliteConnectionManager>>>,
    /// Whether the transaction is still active.
    active: bool,
}

impl std::fmt::Debug for SqliteTransaction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteTransaction")
            .field("active", &self.active)
            .finish()
    }
}

impl SqliteTransaction {
    pub(crate) fn new(conn: PooledConnection<SqliteConnectionManager>) -> TombstoneResult<Self> {
        conn.execute("BEGIN IMMEDIATE", []).map_err(|e| {
            TombstoneError::Transaction(TransactionError::RolledBack {
                reason: format!("Failed to begin transaction: {}", e),
            })
        })?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            active: true,
        })
    }

    fn ensure_active(&self) -> TombstoneResult<()> {
        if !self.active {
            return Err(TombstoneError::Transaction(
                TransactionError::InvalidTransaction,
            ));
        }
        Ok(())
    }

    fn finish(&mut self, statement: &str) -> TombstoneResult<()> {
        self.ensure_active()?;
        let conn = self.conn.lock();
        conn.execute(statement, []).map_err(|e| {
            TombstoneError::Transaction(TransactionError::RolledBack {
                reason: format!("{} failed: {}", statement, e),
            })
        })?;
        drop(conn);
        self.active = false;
        Ok(())
    }
}

#[async_trait]
impl StoreTransaction for SqliteTransaction {
    async fn find(&mut self, query: &RecordQuery) -> TombstoneResult<Vec<StoredRecord>> {
        self.ensure_active()?;
        let conn = self.conn.lock();
        query_records(&conn, query)
    }

    async fn update(
        &mut self,
        key: &RecordKey,
        fields: Map<String, Value>,
    ) -> TombstoneResult<StoredRecord> {
        self.ensure_active()?;
        let conn = self.conn.lock();

        let data: Option<String> = conn
            .query_row(
                "SELECT data FROM records WHERE entity_type = ?1 AND id = ?2",
                params![key.entity_type, key.id],
                |row| row.get(0),
            )
            .optional()
            .map_err(|e| internal_error(format!("Failed to read record: {}", e)))?;

        let data = data.ok_or_else(|| RecordError::not_found(&key.entity_type, &key.id))?;
        let mut record = sql::record_from_row(key.entity_type.clone(), key.id.clone(), &data)?;
        record.merge(fields);

        let serialized = serde_json::to_string(record.fields())?;
        conn.execute(
            "UPDATE records SET data = ?1 WHERE entity_type = ?2 AND id = ?3",
            params![serialized, key.entity_type, key.id],
        )
        .map_err(|e| internal_error(format!("Failed to update record: {}", e)))?;

        Ok(record)
    }

    async fn delete(&mut self, key: &RecordKey) -> TombstoneResult<bool> {
        self.ensure_active()?;
        let conn = self.conn.lock();
        let removed = conn
            .execute(
                "DELETE FROM records WHERE entity_type = ?1 AND id = ?2",
                params![key.entity_type, key.id],
            )
            .map_err(|e| internal_error(format!("Failed to delete record: {}", e)))?;
        Ok(removed > 0)
    }

    async fn commit(mut self: Box<Self>) -> TombstoneResult<()> {
        self.finish("COMMIT")
    }

    async fn rollback(mut self: Box<Self>) -> TombstoneResult<()> {
        self.finish("ROLLBACK")
    }
}

impl Drop for SqliteTransaction {
    fn drop(&mut self) {
        // Roll back anything not explicitly committed or rolled back
        if self.active {
            let conn = self.conn.lock();
            let _ = conn.execute("ROLLBACK", []);
        }
    }
}
