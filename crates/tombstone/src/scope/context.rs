//! Exclusive-scope suspension context.
//!
//! This module defines [`ScopeContext`], the per-operation record of which
//! entity types currently have their default filter suspended, and
//! [`OperationContext`], which carries it through every storage call.
//!
//! Suspension is a per-entity-type depth counter. [`ScopeContext::suspend`]
//! increments it and returns a [`ScopeGuard`] that decrements it when dropped,
//! so the counter is restored on every exit path, including `?` propagation
//! and panics unwinding through the guard.
//!
//! The context is owned by the operation, never by the process: two
//! concurrent top-level operations each start at depth zero and cannot see
//! each other's suspensions.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::debug;

/// Per-operation suspension state.
///
/// Cloning shares the underlying counters, so clones belong to the same
/// logical operation.
///
/// # Examples
///
/// ```
/// use helios_tombstone::scope::ScopeContext;
///
/// let scope = ScopeContext::new();
/// {
///     let _outer = scope.suspend("androids");
///     {
///         let _inner = scope.suspend("androids");
///         assert_eq!(scope.depth("androids"), 2);
///     }
///     // Inner exit does not re-enable the filter early.
///     assert!(scope.is_suspended("androids"));
/// }
/// assert!(!scope.is_suspended("androids"));
/// ```
#[derive(Clone, Default)]
pub struct ScopeContext {
    frames: Arc<Mutex<HashMap<String, usize>>>,
}

impl ScopeContext {
    /// Creates a context with no suspensions.
    pub fn new() -> Self {
        Self::default()
    }

    /// Suspends the default filter for `entity_type` until the guard is dropped.
    pub fn suspend(&self, entity_type: &str) -> ScopeGuard {
        let depth = {
            let mut frames = self.frames.lock();
            let depth = frames.entry(entity_type.to_string()).or_insert(0);
            *depth += 1;
            *depth
        };
        debug!(entity_type, depth, "Entered exclusive scope");
        ScopeGuard {
            frames: Arc::clone(&self.frames),
            entity_type: entity_type.to_string(),
        }
    }

    /// Returns `true` while at least one suspension for `entity_type` is live.
    pub fn is_suspended(&self, entity_type: &str) -> bool {
        self.depth(entity_type) > 0
    }

    /// Returns the current suspension depth for `entity_type`.
    pub fn depth(&self, entity_type: &str) -> usize {
        self.frames.lock().get(entity_type).copied().unwrap_or(0)
    }

    /// Returns `true` if no entity type is suspended.
    pub fn is_clear(&self) -> bool {
        self.frames.lock().is_empty()
    }
}

impl fmt::Debug for ScopeContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScopeContext")
            .field("frames", &*self.frames.lock())
            .finish()
    }
}

/// Releases one suspension frame on drop.
#[must_use = "the suspension ends as soon as the guard is dropped"]
pub struct ScopeGuard {
    frames: Arc<Mutex<HashMap<String, usize>>>,
    entity_type: String,
}

impl ScopeGuard {
    /// Returns the entity type this guard suspends.
    pub fn entity_type(&self) -> &str {
        &self.entity_type
    }
}

impl fmt::Debug for ScopeGuard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScopeGuard")
            .field("entity_type", &self.entity_type)
            .finish()
    }
}

impl Drop for ScopeGuard {
    fn drop(&mut self) {
        let mut frames = self.frames.lock();
        let remaining = frames
            .get(&self.entity_type)
            .copied()
            .unwrap_or(0)
            .saturating_sub(1);
        if remaining == 0 {
            frames.remove(&self.entity_type);
        } else {
            frames.insert(self.entity_type.clone(), remaining);
        }
        drop(frames);
        debug!(entity_type = %self.entity_type, depth = remaining, "Exited exclusive scope");
    }
}

/// Context passed to every storage operation.
///
/// Create one per top-level request with [`OperationContext::new`]; clones
/// share its scope state and are meant for nested calls made on behalf of the
/// same request (for example from inside a hook).
///
/// # Examples
///
/// ```
/// use helios_tombstone::scope::OperationContext;
///
/// let ctx = OperationContext::new().with_correlation_id("req-42");
/// assert_eq!(ctx.correlation_id(), Some("req-42"));
/// assert!(ctx.scope().is_clear());
/// ```
#[derive(Debug, Clone, Default)]
pub struct OperationContext {
    scope: ScopeContext,
    correlation_id: Option<String>,
}

impl OperationContext {
    /// Creates a fresh context with no active suspensions.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets a correlation ID for tracing.
    pub fn with_correlation_id(mut self, correlation_id: impl Into<String>) -> Self {
        self.correlation_id = Some(correlation_id.into());
        self
    }

    /// Returns the correlation ID, if set.
    pub fn correlation_id(&self) -> Option<&str> {
        self.correlation_id.as_deref()
    }

    /// Returns the scope state.
    pub fn scope(&self) -> &ScopeContext {
        &self.scope
    }

    /// Shorthand for `self.scope().suspend(entity_type)`.
    pub fn suspend(&self, entity_type: &str) -> ScopeGuard {
        self.scope.suspend(entity_type)
    }
}
