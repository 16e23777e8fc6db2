//! Transaction validation for OCC
//!
//! Rules:
//! - First committer wins, judged on the READ-SET: an object read by a
//!   transaction must carry the same stamp at commit time
//! - Integrity rules enforced by storage while applying are reported as
//!   conflicts too, since they mean another writer got there first

use crate::transaction::TransactionContext;
use docmaster_core::RowStorage;

/// Types of conflicts detected at commit
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConflictType {
    /// Object was modified after this transaction read it
    ReadWriteConflict {
        /// Object that moved on
        object_id: i64,
        /// Stamp observed when read
        read_stamp: u64,
        /// Stamp at validation time
        current_stamp: u64,
    },

    /// Storage refused the batch
    IntegrityViolation {
        /// Storage's description
        detail: String,
    },
}

impl std::fmt::Display for ConflictType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConflictType::ReadWriteConflict {
                object_id,
                read_stamp,
                current_stamp,
            } => write!(
                f,
                "object {} changed (read at {}, now {})",
                object_id, read_stamp, current_stamp
            ),
            ConflictType::IntegrityViolation { detail } => f.write_str(detail),
        }
    }
}

/// Result of transaction validation
///
/// A transaction commits only if `is_valid()` returns true.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationResult {
    /// All conflicts detected
    pub conflicts: Vec<ConflictType>,
}

impl ValidationResult {
    /// No conflicts
    pub fn ok() -> Self {
        ValidationResult {
            conflicts: Vec::new(),
        }
    }

    /// A single conflict
    pub fn conflict(conflict: ConflictType) -> Self {
        ValidationResult {
            conflicts: vec![conflict],
        }
    }

    /// Check if validation passed
    pub fn is_valid(&self) -> bool {
        self.conflicts.is_empty()
    }

    /// Merge another result into this one
    pub fn merge(&mut self, other: ValidationResult) {
        self.conflicts.extend(other.conflicts);
    }

    /// Number of conflicts
    pub fn conflict_count(&self) -> usize {
        self.conflicts.len()
    }

    /// One-line description of every conflict
    pub fn describe(&self) -> String {
        self.conflicts
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join("; ")
    }
}

/// Validate the read-set against current storage stamps
pub fn validate_read_set<S: RowStorage + ?Sized>(
    txn: &TransactionContext,
    store: &S,
) -> ValidationResult {
    let mut result = ValidationResult::ok();
    let mut objects: Vec<(&i64, &u64)> = txn.read_set().iter().collect();
    objects.sort_unstable();

    for (&object_id, &read_stamp) in objects {
        let current_stamp = store.object_stamp(object_id);
        if current_stamp != read_stamp {
            result.merge(ValidationResult::conflict(ConflictType::ReadWriteConflict {
                object_id,
                read_stamp,
                current_stamp,
            }));
        }
    }
    result
}
