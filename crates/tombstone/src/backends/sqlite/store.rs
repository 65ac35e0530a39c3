//! [`RecordStore`] implementation for SQLite.

use async_trait::async_trait;
use rusqlite::{ErrorCode, params, params_from_iter};
use tracing::debug;

use crate::core::{RecordStore, StoreTransaction};
use crate::error::{RecordError, TombstoneResult};
use crate::types::{Aggregate, RecordQuery, StoredRecord};

use super::SqliteStore;
use super::sql;
use super::transaction::{SqliteTransaction, internal_error, query_records};

#[async_trait]
impl RecordStore for SqliteStore {
    fn backend_name(&self) -> &'static str {
        "sqlite"
    }

    async fn insert(&self, record: StoredRecord) -> TombstoneResult<StoredRecord> {
        let conn = self.get_connection()?;
        let data = serde_json::to_string(record.fields())?;

        let result = conn.execute(
            "INSERT INTO records (entity_type, id, data) VALUES (?1, ?2, ?3)",
            params![record.entity_type(), record.id(), data],
        );

        match result {
            Ok(_) => Ok(record),
            Err(rusqlite::Error::SqliteFailure(e, _)) if e.code == ErrorCode::ConstraintViolation => {
                Err(RecordError::AlreadyExists {
                    entity_type: record.entity_type().to_string(),
                    id: record.id().to_string(),
                }
                .into())
            }
            Err(e) => Err(internal_error(format!("Failed to insert record: {}", e))),
        }
    }

    async fn find(&self, query: &RecordQuery) -> TombstoneResult<Vec<StoredRecord>> {
        let conn = self.get_connection()?;
        query_records(&conn, query)
    }

    async fn count(&self, query: &RecordQuery) -> TombstoneResult<u64> {
        let conn = self.get_connection()?;
        let statement = sql::count(query);
        let count: i64 = conn
            .query_row(&statement.sql, params_from_iter(statement.params.iter()), |row| {
                row.get(0)
            })
            .map_err(|e| internal_error(format!("Failed to count records: {}", e)))?;
        Ok(count.max(0) as u64)
    }

    async fn aggregate(
        &self,
        query: &RecordQuery,
        aggregate: &Aggregate,
    ) -> TombstoneResult<Option<f64>> {
        let conn = self.get_connection()?;
        let statement = sql::aggregate(query, aggregate);
        conn.query_row(&statement.sql, params_from_iter(statement.params.iter()), |row| {
            row.get::<_, Option<f64>>(0)
        })
        .map_err(|e| internal_error(format!("Failed to aggregate records: {}", e)))
    }

    async fn delete_where(&self, query: &RecordQuery) -> TombstoneResult<u64> {
        let conn = self.get_connection()?;
        let statement = sql::delete(query);
        let removed = conn
            .execute(&statement.sql, params_from_iter(statement.params.iter()))
            .map_err(|e| internal_error(format!("Failed to delete records: {}", e)))?;
        debug!(entity_type = %query.entity_type(), removed, "Deleted rows");
        Ok(removed as u64)
    }

    async fn begin(&self) -> TombstoneResult<Box<dyn StoreTransaction>> {
        let conn = self.get_connection()?;
        Ok(Box::new(SqliteTransaction::new(conn)?))
    }
}
