//! Error types for the document master
//!
//! Every fallible operation in the workspace returns [`MasterResult`].
//! Variants carry structured fields so callers can branch on the kind of
//! failure without parsing messages.
//!
//! # Categories
//!
//! | Category | Variants | Retried |
//! |----------|----------|---------|
//! | Caller | `SchemeMismatch`, `MalformedIdentifier`, `InvalidArgument` | no |
//! | Lookup | `NotFound` | no |
//! | Staleness | `NotLatestVersion`, `NotLatestCorrection` | no |
//! | Concurrency | `WriteConflict` | yes |
//! | Interruption | `DeadlineExceeded`, `Cancelled` | no |
//! | System | `Serialization`, `Config`, `Storage`, `Internal` | no |
//!
//! `NotFound` is a routine outcome ("does this object exist at that
//! coordinate") and is never logged as an error.

use serde::{Deserialize, Serialize};

/// Result alias used throughout the workspace
pub type MasterResult<T> = std::result::Result<T, MasterError>;

/// Errors produced by the document master and its collaborators
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
pub enum MasterError {
    // ==================== Caller errors ====================
    /// Identifier belongs to a different master
    #[error("scheme mismatch: expected {expected}, got {actual}")]
    SchemeMismatch {
        /// Scheme configured on this master
        expected: String,
        /// Scheme carried by the identifier
        actual: String,
    },

    /// Identifier payload could not be decoded
    #[error("malformed identifier {id}: {reason}")]
    MalformedIdentifier {
        /// Identifier as supplied
        id: String,
        /// What was wrong with it
        reason: String,
    },

    /// Request is structurally invalid
    #[error("invalid argument: {reason}")]
    InvalidArgument {
        /// Description of the problem
        reason: String,
    },

    // ==================== Lookup ====================
    /// No row satisfies the lookup
    #[error("{entity} not found: {id}")]
    NotFound {
        /// Kind of thing looked up (table name)
        entity: String,
        /// Identifier or coordinate that was looked up
        id: String,
    },

    // ==================== Staleness ====================
    /// Referenced row is no longer the latest version
    #[error("not the latest version: {id}")]
    NotLatestVersion {
        /// The stale identifier
        id: String,
    },

    /// Referenced row is no longer the latest correction
    #[error("not the latest correction: {id}")]
    NotLatestCorrection {
        /// The stale identifier
        id: String,
    },

    // ==================== Concurrency ====================
    /// A concurrent writer changed the rows this mutation depended on
    #[error("write conflict: {detail}")]
    WriteConflict {
        /// What conflicted
        detail: String,
    },

    // ==================== Interruption ====================
    /// Caller-supplied deadline passed before the operation completed
    #[error("deadline exceeded during {operation}")]
    DeadlineExceeded {
        /// Operation that was interrupted
        operation: String,
    },

    /// Caller cancelled the operation
    #[error("cancelled during {operation}")]
    Cancelled {
        /// Operation that was interrupted
        operation: String,
    },

    // ==================== System ====================
    /// Mapping between content and columns failed
    #[error("serialization error: {message}")]
    Serialization {
        /// Underlying failure
        message: String,
    },

    /// Configuration could not be loaded or is invalid
    #[error("configuration error: {reason}")]
    Config {
        /// Description of the problem
        reason: String,
    },

    /// Storage collaborator failed
    #[error("storage error: {message}")]
    Storage {
        /// Underlying failure
        message: String,
    },

    /// Broken internal invariant
    #[error("internal error: {message}")]
    Internal {
        /// Description of the problem
        message: String,
    },
}

impl MasterError {
    // =========================================================================
    // Constructors
    // =========================================================================

    /// Create a `NotFound` error
    pub fn not_found(entity: impl Into<String>, id: impl ToString) -> Self {
        MasterError::NotFound {
            entity: entity.into(),
            id: id.to_string(),
        }
    }

    /// Create a `MalformedIdentifier` error
    pub fn malformed(id: impl ToString, reason: impl Into<String>) -> Self {
        MasterError::MalformedIdentifier {
            id: id.to_string(),
            reason: reason.into(),
        }
    }

    /// Create an `InvalidArgument` error
    pub fn invalid_argument(reason: impl Into<String>) -> Self {
        MasterError::InvalidArgument {
            reason: reason.into(),
        }
    }

    /// Create a `WriteConflict` error
    pub fn write_conflict(detail: impl Into<String>) -> Self {
        MasterError::WriteConflict {
            detail: detail.into(),
        }
    }

    /// Create a `Serialization` error
    pub fn serialization(message: impl ToString) -> Self {
        MasterError::Serialization {
            message: message.to_string(),
        }
    }

    /// Create a `Config` error
    pub fn config(reason: impl Into<String>) -> Self {
        MasterError::Config {
            reason: reason.into(),
        }
    }

    /// Create an `Internal` error
    pub fn internal(message: impl Into<String>) -> Self {
        MasterError::Internal {
            message: message.into(),
        }
    }

    // =========================================================================
    // Classification
    // =========================================================================

    /// True for the only retryable kind: a concurrent writer won the race
    pub fn is_conflict(&self) -> bool {
        matches!(self, MasterError::WriteConflict { .. })
    }

    /// True when the lookup legitimately found nothing
    pub fn is_not_found(&self) -> bool {
        matches!(self, MasterError::NotFound { .. })
    }

    /// True when the caller supplied an unusable identifier or request
    pub fn is_caller_error(&self) -> bool {
        matches!(
            self,
            MasterError::SchemeMismatch { .. }
                | MasterError::MalformedIdentifier { .. }
                | MasterError::InvalidArgument { .. }
        )
    }

    /// True when the mutation referenced a superseded row
    pub fn is_stale(&self) -> bool {
        matches!(
            self,
            MasterError::NotLatestVersion { .. } | MasterError::NotLatestCorrection { .. }
        )
    }

    /// True when the caller's deadline or cancellation stopped the operation
    pub fn is_interrupted(&self) -> bool {
        matches!(
            self,
            MasterError::DeadlineExceeded { .. } | MasterError::Cancelled { .. }
        )
    }
}
