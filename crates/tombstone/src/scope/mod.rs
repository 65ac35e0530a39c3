//! Default-scope filtering and its suspension.
//!
//! - [`ScopedQueryGate`] - Attaches the default filter to queries
//! - [`ScopeContext`], [`ScopeGuard`] - Re-entrant, per-type suspension of that filter
//! - [`OperationContext`] - The per-request context every operation receives
//! - [`ReadOrigin`] - Marks pre-load reads, which are always filtered

mod context;
mod gate;

pub use context::{OperationContext, ScopeContext, ScopeGuard};
pub use gate::{ReadOrigin, ScopedQueryGate};
