//! Error types for the tombstone layer.
//!
//! This module defines all error types used by the soft-delete policy layer,
//! following a hierarchy that separates record errors, hook errors, cascade
//! errors, registration errors, dispatch errors and backend errors.

// Error enum variant fields are self-documenting via their #[error(...)] messages
#![allow(missing_docs)]

use thiserror::Error;

use crate::types::RecordKey;

/// The primary error type for all tombstone operations.
///
/// `Aborted` is not a fault: it is the normal outcome of a before-destroy
/// (or before-restore) hook refusing the transition, and callers are
/// expected to check for it with [`TombstoneError::is_aborted`].
#[derive(Error, Debug)]
pub enum TombstoneError {
    /// A before hook refused the transition. No state was changed.
    #[error("{hook} aborted for {entity_type}/{id}")]
    Aborted {
        hook: &'static str,
        entity_type: String,
        id: String,
    },

    /// Record state errors
    #[error(transparent)]
    Record(#[from] RecordError),

    /// Lifecycle hook failures
    #[error(transparent)]
    Hook(#[from] HookError),

    /// Cascading restore failures
    #[error(transparent)]
    Cascade(#[from] CascadeError),

    /// Entity registration errors
    #[error(transparent)]
    Registry(#[from] RegistryError),

    /// Operation dispatch errors
    #[error(transparent)]
    Dispatch(#[from] DispatchError),

    /// Transaction errors
    #[error(transparent)]
    Transaction(#[from] TransactionError),

    /// Backend-specific errors
    #[error(transparent)]
    Backend(#[from] BackendError),
}

impl TombstoneError {
    /// Returns `true` if a before hook refused the operation.
    pub fn is_aborted(&self) -> bool {
        matches!(self, TombstoneError::Aborted { .. })
    }

    /// Returns `true` if the target record does not exist in the applicable scope.
    pub fn is_not_found(&self) -> bool {
        matches!(self, TombstoneError::Record(RecordError::NotFound { .. }))
    }

    pub(crate) fn aborted(hook: &'static str, key: &RecordKey) -> Self {
        TombstoneError::Aborted {
            hook,
            entity_type: key.entity_type.clone(),
            id: key.id.clone(),
        }
    }
}

/// Errors related to record state.
#[derive(Error, Debug)]
pub enum RecordError {
    /// The record does not exist under the applicable scope.
    #[error("record not found: {entity_type}/{id}")]
    NotFound { entity_type: String, id: String },

    /// A record with the given ID already exists.
    #[error("record already exists: {entity_type}/{id}")]
    AlreadyExists { entity_type: String, id: String },
}

impl RecordError {
    pub(crate) fn not_found(entity_type: &str, id: &str) -> Self {
        RecordError::NotFound {
            entity_type: entity_type.to_string(),
            id: id.to_string(),
        }
    }
}

/// Errors raised by lifecycle hooks.
#[derive(Error, Debug)]
pub enum HookError {
    /// A hook failed after the mutation was applied.
    #[error("{hook} failed for {entity_type}/{id}: {message}")]
    Failed {
        hook: String,
        entity_type: String,
        id: String,
        message: String,
    },
}

impl HookError {
    /// Builds a hook failure for the given record.
    pub fn failed(hook: impl Into<String>, key: &RecordKey, message: impl Into<String>) -> Self {
        HookError::Failed {
            hook: hook.into(),
            entity_type: key.entity_type.clone(),
            id: key.id.clone(),
            message: message.into(),
        }
    }
}

/// A single failed branch of a cascading restore.
#[derive(Debug)]
pub struct CascadeFailure {
    /// The relation being traversed.
    pub relation: String,
    /// The record the cascade was trying to restore.
    pub target: RecordKey,
    /// The underlying failure.
    pub error: TombstoneError,
}

/// Errors related to cascading restore.
#[derive(Error, Debug)]
pub enum CascadeError {
    /// A branch failed and the cascade was stopped (fail-fast policy).
    #[error("cascade through '{relation}' failed at {entity_type}/{id}: {source}")]
    Branch {
        relation: String,
        entity_type: String,
        id: String,
        #[source]
        source: Box<TombstoneError>,
    },

    /// One or more branches failed while the rest of the cascade ran (best-effort policy).
    #[error("cascade finished with {} failed branch(es), {restored} record(s) restored", failures.len())]
    Partial {
        failures: Vec<CascadeFailure>,
        restored: usize,
    },
}

/// Errors related to entity registration and policy configuration.
#[derive(Error, Debug)]
pub enum RegistryError {
    /// The entity type was never registered.
    #[error("unknown entity type: {entity_type}")]
    UnknownEntityType { entity_type: String },

    /// The entity type is registered but does not carry a soft-delete policy.
    #[error("entity type {entity_type} is not soft-deletable")]
    NotSoftDeletable { entity_type: String },

    /// The relation is not declared on the entity type.
    #[error("unknown relation '{relation}' on {entity_type}")]
    UnknownRelation {
        entity_type: String,
        relation: String,
    },

    /// Two relations on one entity type share a name.
    #[error("relation '{relation}' declared more than once on {entity_type}")]
    DuplicateRelation {
        entity_type: String,
        relation: String,
    },

    /// The entity type was registered twice.
    #[error("entity type {entity_type} registered more than once")]
    DuplicateRegistration { entity_type: String },

    /// The policy cannot distinguish destroyed from active records.
    #[error("invalid policy for field '{field}': {message}")]
    InvalidPolicy { field: String, message: String },
}

/// Errors related to operation dispatch.
#[derive(Error, Debug)]
pub enum DispatchError {
    /// No handler recognised the operation name.
    #[error("unknown operation '{name}' on {entity_type}")]
    UnknownOperation { entity_type: String, name: String },

    /// The operation needs a field argument (e.g. `sum`).
    #[error("operation '{operation}' requires a field argument")]
    MissingField { operation: String },

    /// The operation exists but not for this kind of target.
    #[error("operation '{operation}' cannot be invoked on {target}")]
    UnsupportedTarget { operation: String, target: String },
}

/// Errors related to transactions.
#[derive(Error, Debug)]
pub enum TransactionError {
    /// Transaction is no longer valid (already committed or rolled back).
    #[error("transaction no longer valid")]
    InvalidTransaction,

    /// Transaction was rolled back.
    #[error("transaction rolled back: {reason}")]
    RolledBack { reason: String },
}

/// Errors originating from the record store backend.
#[derive(Error, Debug)]
pub enum BackendError {
    /// Connection to the backend failed.
    #[error("connection failed to {backend_name}: {message}")]
    ConnectionFailed {
        backend_name: String,
        message: String,
    },

    /// Connection pool exhausted.
    #[error("connection pool exhausted for {backend_name}")]
    PoolExhausted { backend_name: String },

    /// Internal backend error.
    #[error("internal error in {backend_name}: {message}")]
    Internal {
        backend_name: String,
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Query execution error.
    #[error("query execution failed: {message}")]
    QueryError { message: String },

    /// Serialization/deserialization error.
    #[error("serialization error: {message}")]
    SerializationError { message: String },
}

/// Result type alias for tombstone operations.
pub type TombstoneResult<T> = Result<T, TombstoneError>;

impl From<serde_json::Error> for TombstoneError {
    fn from(err: serde_json::Error) -> Self {
        TombstoneError::Backend(BackendError::SerializationError {
            message: err.to_string(),
        })
    }
}

#[cfg(feature = "sqlite")]
impl From<rusqlite::Error> for TombstoneError {
    fn from(err: rusqlite::Error) -> Self {
        TombstoneError::Backend(BackendError::Internal {
            backend_name: "sqlite".to_string(),
            message: err.to_string(),
            source: Some(Box::new(err)),
        })
    }
}

#[cfg(feature = "sqlite")]
impl From<r2d2::Error> for TombstoneError {
    fn from(_err: r2d2::Error) -> Self {
        TombstoneError::Backend(BackendError::PoolExhausted {
            backend_name: "sqlite".to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_error_display() {
        let err = TombstoneError::Record(RecordError::not_found("androids", "r2d2"));
        assert_eq!(err.to_string(), "record not found: androids/r2d2");
        assert!(err.is_not_found());
        assert!(!err.is_aborted());
    }

    #[test]
    fn test_aborted_display() {
        let key = RecordKey::new("pirates", "7");
        let err = TombstoneError::aborted("before_destroy", &key);
        assert!(err.is_aborted());
        assert_eq!(err.to_string(), "before_destroy aborted for pirates/7");
    }

    #[test]
    fn test_hook_error_display() {
        let key = RecordKey::new("components", "c1");
        let err = HookError::failed("after_destroy", &key, "boom");
        assert_eq!(
            err.to_string(),
            "after_destroy failed for components/c1: boom"
        );
    }

    #[test]
    fn test_cascade_partial_display() {
        let err = CascadeError::Partial {
            failures: vec![CascadeFailure {
                relation: "components".to_string(),
                target: RecordKey::new("components", "c1"),
                error: TombstoneError::Record(RecordError::not_found("components", "c1")),
            }],
            restored: 3,
        };
        assert_eq!(
            err.to_string(),
            "cascade finished with 1 failed branch(es), 3 record(s) restored"
        );
    }

    #[test]
    fn test_from_serde_json_error() {
        let parse = serde_json::from_str::<serde_json::Value>("{not json");
        let err: TombstoneError = parse.unwrap_err().into();
        assert!(matches!(
            err,
            TombstoneError::Backend(BackendError::SerializationError { .. })
        ));
    }
}
