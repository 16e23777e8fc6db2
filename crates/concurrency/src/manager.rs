//! Transaction manager for coordinating commit operations
//!
//! Provides atomic commit by orchestrating:
//! 1. Validation (first-committer-wins on the read-set)
//! 2. Storage application (visibility)
//!
//! ## Commit Sequence
//!
//! ```text
//! 1. mark_validating()       - Active → Validating
//! 2. check caller context    - deadline / cancellation
//! 3. acquire commit lock
//! 4. validate_read_set()     - IF conflicts: abort, return ValidationFailed
//! 5. allocate commit version
//! 6. apply_batch() to storage - IF rejected: abort, nothing visible
//! 7. mark_committed()
//! ```
//!
//! The commit lock spans validation and apply, so no other commit can slip
//! between them.

use crate::transaction::{CommitError, TransactionContext};
use crate::validation::{validate_read_set, ConflictType, ValidationResult};
use docmaster_core::{CallContext, RowStorage};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, warn};

/// Manages transaction lifecycle and atomic commits
pub struct TransactionManager {
    /// Global commit version; each committed writing transaction bumps it once
    version: AtomicU64,
    next_txn_id: AtomicU64,
    commit_lock: Mutex<()>,
}

impl TransactionManager {
    /// Manager whose next commit version follows `initial_version`
    pub fn new(initial_version: u64) -> Self {
        TransactionManager {
            version: AtomicU64::new(initial_version),
            next_txn_id: AtomicU64::new(1),
            commit_lock: Mutex::new(()),
        }
    }

    /// Current global version
    pub fn current_version(&self) -> u64 {
        self.version.load(Ordering::SeqCst)
    }

    /// Allocate next transaction id
    pub fn next_txn_id(&self) -> u64 {
        self.next_txn_id.fetch_add(1, Ordering::SeqCst)
    }

    fn allocate_version(&self) -> u64 {
        self.version.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Begin a transaction
    pub fn begin(&self, operation: &'static str, context: CallContext) -> TransactionContext {
        TransactionContext::new(self.next_txn_id(), operation, context)
    }

    /// Commit a transaction atomically
    ///
    /// Read-only transactions commit without touching storage.
    ///
    /// # Returns
    /// - `Ok(commit_version)` on success (current version for read-only)
    /// - `Err(CommitError)` if validation fails, storage rejects the batch,
    ///   or the caller's context is done; the transaction is then aborted
    pub fn commit<S: RowStorage + ?Sized>(
        &self,
        txn: &mut TransactionContext,
        store: &S,
    ) -> Result<u64, CommitError> {
        txn.mark_validating()?;

        if let Err(e) = txn.check_context() {
            txn.mark_aborted(e.to_string());
            return Err(CommitError::Aborted(e));
        }

        if txn.is_read_only() {
            txn.mark_committed()?;
            return Ok(self.current_version());
        }

        let _guard = self.commit_lock.lock();

        let validation = validate_read_set(txn, store);
        if !validation.is_valid() {
            debug!(
                target: "docmaster::txn",
                txn_id = txn.txn_id,
                operation = txn.operation(),
                conflicts = validation.conflict_count(),
                "validation failed"
            );
            txn.mark_aborted(validation.describe());
            return Err(CommitError::ValidationFailed(validation));
        }

        let commit_version = self.allocate_version();
        match store.apply_batch(txn.writes(), commit_version) {
            Ok(applied) => {
                txn.mark_committed()?;
                debug!(
                    target: "docmaster::txn",
                    txn_id = txn.txn_id,
                    operation = txn.operation(),
                    commit_version,
                    inserted = applied.rows_inserted,
                    closed = applied.rows_closed,
                    "committed"
                );
                Ok(commit_version)
            }
            Err(e) if e.is_conflict() => {
                warn!(
                    target: "docmaster::txn",
                    txn_id = txn.txn_id,
                    operation = txn.operation(),
                    error = %e,
                    "storage rejected batch"
                );
                txn.mark_aborted(e.to_string());
                Err(CommitError::ValidationFailed(ValidationResult::conflict(
                    ConflictType::IntegrityViolation {
                        detail: e.to_string(),
                    },
                )))
            }
            Err(e) => {
                txn.mark_aborted(e.to_string());
                Err(CommitError::Aborted(e))
            }
        }
    }
}

impl Default for TransactionManager {
    fn default() -> Self {
        TransactionManager::new(0)
    }
}
