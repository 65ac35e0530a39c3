//! Named-operation dispatch.
//!
//! [`TombstoneStorage::invoke`](crate::storage::TombstoneStorage::invoke)
//! resolves a name in this order:
//!
//! 1. `<base><modifier>` through the [`VariantDispatcher`], where the modifier
//!    is `-including-deleted` or `-deleted-only`
//! 2. a plain base operation (`all`, `count`, a relation name on a record, ...)
//! 3. each registered [`OperationHandler`], in order
//! 4. [`DispatchError::UnknownOperation`](crate::error::DispatchError::UnknownOperation)

mod handler;
mod variant;

pub use handler::{OperationArgs, OperationCall, OperationHandler, OperationOutput, OperationTarget};
pub use variant::{BaseOperation, Modifier, Variant, VariantDispatcher, VariantKey};
