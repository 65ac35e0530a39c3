//! Record store implementations.
//!
//! # Available Backends
//!
//! | Backend | Feature | Description |
//! |---------|---------|-------------|
//! | Memory | always | Insertion-ordered tables behind a lock, for tests and embedding |
//! | SQLite | `sqlite` | JSON rows in a single table, in-memory or file-backed |
//!
//! # Example
//!
//! ```no_run
//! # #[cfg(feature = "sqlite")]
//! use helios_tombstone::backends::sqlite::SqliteStore;
//!
//! # #[cfg(feature = "sqlite")]
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! // Create an in-memory SQLite store
//! let store = SqliteStore::in_memory()?;
//!
//! // Or use a file-based database
//! let store = SqliteStore::open("./data/records.db")?;
//! # Ok(())
//! # }
//! ```

pub mod memory;

#[cfg(feature = "sqlite")]
pub mod sqlite;
