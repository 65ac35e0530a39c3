//! Helios Tombstone: a soft-delete policy layer for record stores.
//!
//! Records of a soft-deletable entity type are never removed by `destroy`.
//! Instead a tombstone field is set to a "destroyed" value, and every ordinary
//! read quietly skips tombstoned rows. Callers can lift that filter for one
//! operation, ask for deleted rows only, restore records (optionally cascading
//! through relations), or hard-delete rows for good.
//!
//! # Features
//!
//! - **Default scoping**: reads on soft-deletable types return active rows only
//! - **Configurable tombstones**: timestamp columns, boolean flags in either
//!   polarity, or any sentinel pair
//! - **Destroy and restore**: lifecycle hooks, dependent cascades, cycle-safe
//!   traversal, and per-call cascade failure policy
//! - **Variants**: `count-including-deleted`, `all-deleted-only`,
//!   `<relation>-including-deleted` and friends are synthesized on first use
//!   and cached
//! - **Backends**: an in-memory store, and SQLite behind the `sqlite` feature
//!
//! # Architecture
//!
//! - [`types`] - Records, queries, aggregates and relation descriptors
//! - [`policy`] - Tombstone field and sentinel values per entity type
//! - [`registry`] - Entity registrations, relations and hooks
//! - [`config`] - Serde-loadable registry configuration
//! - [`scope`] - Per-operation filter suspension and the query gate
//! - [`core`] - Store and transaction traits, lifecycle hooks
//! - [`controller`] - Destroy and restore
//! - [`dispatch`] - Named operations and variant synthesis
//! - [`storage`] - The caller-facing facade
//! - [`backends`] - Store implementations
//! - [`error`] - Error types
//!
//! # Quick Start
//!
//! ```
//! use std::sync::Arc;
//!
//! use helios_tombstone::backends::memory::InMemoryStore;
//! use helios_tombstone::{EntityRegistration, EntityRegistry, OperationContext, ScopePolicy, TombstoneStorage};
//! use helios_tombstone::types::RecordQuery;
//! use serde_json::json;
//!
//! # tokio_test::block_on(async {
//! let registry = EntityRegistry::builder()
//!     .register(EntityRegistration::soft_deletable("pirates", ScopePolicy::flag("alive", false)?))
//!     .build()?;
//! let storage = TombstoneStorage::new(Arc::new(InMemoryStore::new()), registry);
//! let ctx = OperationContext::new();
//!
//! let pirate = storage.insert(&ctx, "pirates", json!({"name": "Flint"})).await?;
//! assert_eq!(pirate.get("alive"), &json!(true));
//!
//! storage.destroy(&ctx, &pirate).await?;
//! assert!(storage.all(&ctx, RecordQuery::new("pirates")).await?.is_empty());
//! # Ok::<(), helios_tombstone::TombstoneError>(())
//! # });
//! ```
//!
//! # Scoping
//!
//! Suspending the filter is tied to an [`OperationContext`], not to a thread
//! or to the process. Two contexts never observe each other's suspensions:
//!
//! ```
//! use helios_tombstone::OperationContext;
//!
//! let ctx = OperationContext::new();
//! let other = OperationContext::new();
//! {
//!     let _guard = ctx.suspend("pirates");
//!     assert!(ctx.scope().is_suspended("pirates"));
//!     assert!(!other.scope().is_suspended("pirates"));
//! }
//! assert!(ctx.scope().is_clear());
//! ```

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]

pub mod backends;
pub mod config;
pub mod controller;
pub mod core;
pub mod dispatch;
pub mod error;
pub mod policy;
pub mod registry;
pub mod scope;
pub mod storage;
pub mod types;

// Re-export commonly used types at crate root
pub use error::{TombstoneError, TombstoneResult};
pub use policy::{DestroyState, DestroyedValue, ScopePolicy};
pub use registry::{EntityRegistration, EntityRegistry};
pub use scope::{OperationContext, ScopedQueryGate};
pub use storage::TombstoneStorage;
pub use types::{RecordKey, RecordQuery, StoredRecord};

// Re-export core traits
pub use core::{HookDecision, LifecycleHooks, RecordStore, StoreTransaction};

// Re-export controllers and dispatch
pub use controller::{CascadePolicy, DestroyController, RestoreController, RestoreOptions};
pub use dispatch::{OperationArgs, OperationHandler, OperationOutput, VariantDispatcher};

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Crate name.
pub const NAME: &str = env!("CARGO_PKG_NAME");
