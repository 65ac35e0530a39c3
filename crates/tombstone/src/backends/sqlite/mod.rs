//! SQLite record store.
//!
//! Records live as JSON documents in one table keyed by entity type and ID.
//! Query conditions, sorting and aggregates are translated to SQL over
//! `json_extract`/`json_type`, following the same null-safe comparison rules
//! the in-memory store uses.
//!
//! # Example
//!
//! ```no_run
//! use helios_tombstone::backends::sqlite::{SqliteStore, SqliteStoreConfig};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! // In-memory database, schema created on construction
//! let store = SqliteStore::in_memory()?;
//!
//! // File database with a bigger pool
//! let config = SqliteStoreConfig {
//!     max_connections: 16,
//!     ..Default::default()
//! };
//! let store = SqliteStore::with_config("./data/records.db", config)?;
//! # Ok(())
//! # }
//! ```
//!
//! # Schema
//!
//! ```sql
//! CREATE TABLE records (
//!     seq INTEGER PRIMARY KEY AUTOINCREMENT,  -- insertion order
//!     entity_type TEXT NOT NULL,
//!     id TEXT NOT NULL,
//!     data TEXT NOT NULL,                     -- JSON object, "id" included
//!     UNIQUE (entity_type, id)
//! );
//! ```

mod backend;
mod schema;
mod sql;
mod store;
mod transaction;

pub use backend::{SqliteStore, SqliteStoreConfig};
pub use transaction::SqliteTransaction;
