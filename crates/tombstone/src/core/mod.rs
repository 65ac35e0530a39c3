//! Traits for the collaborators this layer drives but does not implement.
//!
//! - [`RecordStore`] - Query execution, physical delete, units of work
//! - [`StoreTransaction`] - Rollback-capable unit of work and single-field mutator
//! - [`LifecycleHooks`] - Before/after hooks for destroy, restore and update
//!
//! ```text
//! TombstoneStorage
//!     ├── ScopedQueryGate ──► RecordStore::find / count / aggregate
//!     ├── DestroyController ─► RecordStore::begin ─► StoreTransaction + LifecycleHooks
//!     └── RestoreController ─► RecordStore::begin ─► StoreTransaction + LifecycleHooks
//! ```

mod hooks;
mod store;

pub use hooks::{HookDecision, LifecycleHooks, NoopHooks};
pub use store::{RecordStore, StoreTransaction};
