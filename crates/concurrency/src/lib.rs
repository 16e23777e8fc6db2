//! Concurrency layer for the document master
//!
//! This crate implements optimistic concurrency control (OCC) with:
//! - TransactionContext: read-set tracking and buffered row writes
//! - Conflict detection at commit time (first committer wins)
//! - TransactionManager: validate-then-apply under a commit lock

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod manager;
pub mod transaction;
pub mod validation;

pub use manager::TransactionManager;
pub use transaction::{CommitError, PendingOperations, TransactionContext, TransactionStatus};
pub use validation::{validate_read_set, ConflictType, ValidationResult};
