//! Transaction context for OCC
//!
//! A mutation runs inside one [`TransactionContext`]. Reads go straight to
//! committed storage and record the modification stamp of every object they
//! touch; writes are buffered. At commit the manager re-checks those stamps
//! (first committer wins) and applies the buffer in one atomic batch.
//!
//! Buffered writes are not visible to reads in the same transaction. Every
//! mutation reads what it needs before it writes.

use crate::validation::ValidationResult;
use docmaster_core::{
    Axis, CallContext, MasterError, MasterResult, Row, RowQuery, RowStorage, RowWrite, Timestamp,
};
use std::collections::HashMap;
use std::time::{Duration, Instant};

/// Error type for commit failures
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum CommitError {
    /// A concurrent writer invalidated what this transaction read, or storage
    /// rejected the batch on an integrity rule
    #[error("commit failed: {} conflict(s)", .0.conflict_count())]
    ValidationFailed(ValidationResult),

    /// Transaction was not in the right state to commit
    #[error("invalid transaction state: {0}")]
    InvalidState(String),

    /// Deadline, cancellation or a storage failure stopped the commit
    #[error("commit aborted: {0}")]
    Aborted(MasterError),
}

impl From<CommitError> for MasterError {
    fn from(e: CommitError) -> Self {
        match e {
            CommitError::ValidationFailed(result) => MasterError::WriteConflict {
                detail: result.describe(),
            },
            CommitError::InvalidState(msg) => MasterError::internal(msg),
            CommitError::Aborted(inner) => inner,
        }
    }
}

/// Status of a transaction in its lifecycle
///
/// State transitions:
/// - `Active` → `Validating` (begin commit)
/// - `Validating` → `Committed` (validation and apply succeeded)
/// - `Validating` → `Aborted` (conflict or storage rejection)
/// - `Active` → `Aborted` (error inside the mutation)
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransactionStatus {
    /// Executing, can read and write
    Active,
    /// Being validated
    Validating,
    /// Applied to storage
    Committed,
    /// Discarded
    Aborted {
        /// Why
        reason: String,
    },
}

/// Summary of buffered writes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PendingOperations {
    /// Buffered inserts
    pub inserts: usize,
    /// Buffered interval closes
    pub closes: usize,
}

impl PendingOperations {
    /// Total buffered writes
    pub fn total(&self) -> usize {
        self.inserts + self.closes
    }

    /// True if nothing is buffered
    pub fn is_empty(&self) -> bool {
        self.total() == 0
    }
}

/// Transaction state for one mutation attempt
#[derive(Debug)]
pub struct TransactionContext {
    /// Unique transaction id
    pub txn_id: u64,
    operation: &'static str,
    /// object id → stamp observed by the first read of that object
    read_set: HashMap<i64, u64>,
    writes: Vec<RowWrite>,
    status: TransactionStatus,
    start_time: Instant,
    context: CallContext,
}

impl TransactionContext {
    /// Begin a transaction for `operation` under the caller's context
    pub fn new(txn_id: u64, operation: &'static str, context: CallContext) -> Self {
        TransactionContext {
            txn_id,
            operation,
            read_set: HashMap::new(),
            writes: Vec::new(),
            status: TransactionStatus::Active,
            start_time: Instant::now(),
            context,
        }
    }

    /// Name of the operation this transaction belongs to
    pub fn operation(&self) -> &'static str {
        self.operation
    }

    // === Reads ===

    /// Row by primary key, recording the object's stamp
    ///
    /// # Errors
    /// Fails if the transaction is not active, the caller's context is done,
    /// or storage fails.
    pub fn fetch_row<S: RowStorage + ?Sized>(
        &mut self,
        store: &S,
        row_id: i64,
    ) -> MasterResult<Option<Row>> {
        self.ensure_active()?;
        let fetched = store.fetch_row(row_id)?;
        Ok(fetched.map(|stamped| {
            self.record_read(stamped.value.object_id, stamped.stamp);
            stamped.value
        }))
    }

    /// Rows matching a query, recording the object's stamp
    ///
    /// # Errors
    /// Same as [`TransactionContext::fetch_row`].
    pub fn query<S: RowStorage + ?Sized>(
        &mut self,
        store: &S,
        query: &RowQuery,
    ) -> MasterResult<Vec<Row>> {
        self.ensure_active()?;
        let result = store.query(query)?;
        self.record_read(query.object_id(), result.stamp);
        Ok(result.value)
    }

    /// Number of rows matching a query, recording the object's stamp
    ///
    /// # Errors
    /// Same as [`TransactionContext::fetch_row`].
    pub fn count<S: RowStorage + ?Sized>(
        &mut self,
        store: &S,
        query: &RowQuery,
    ) -> MasterResult<usize> {
        self.ensure_active()?;
        let result = store.count(query)?;
        self.record_read(query.object_id(), result.stamp);
        Ok(result.value)
    }

    fn record_read(&mut self, object_id: i64, stamp: u64) {
        self.read_set.entry(object_id).or_insert(stamp);
    }

    /// Stamp recorded for an object, if it was read
    pub fn read_stamp(&self, object_id: i64) -> Option<u64> {
        self.read_set.get(&object_id).copied()
    }

    /// Every `(object id, stamp)` read so far
    pub fn read_set(&self) -> &HashMap<i64, u64> {
        &self.read_set
    }

    // === Writes ===

    /// Buffer a row insert
    ///
    /// # Errors
    /// Fails if the transaction is not active or the caller's context is done.
    pub fn insert(&mut self, row: Row) -> MasterResult<()> {
        self.ensure_active()?;
        self.writes.push(RowWrite::Insert(row));
        Ok(())
    }

    /// Buffer closing a row's valid-time interval at `at`
    ///
    /// # Errors
    /// Same as [`TransactionContext::insert`].
    pub fn close_version(&mut self, row: &Row, at: Timestamp) -> MasterResult<()> {
        self.close(row, Axis::Version, at)
    }

    /// Buffer closing a row's transaction-time interval at `at`
    ///
    /// # Errors
    /// Same as [`TransactionContext::insert`].
    pub fn close_correction(&mut self, row: &Row, at: Timestamp) -> MasterResult<()> {
        self.close(row, Axis::Correction, at)
    }

    fn close(&mut self, row: &Row, axis: Axis, at: Timestamp) -> MasterResult<()> {
        self.ensure_active()?;
        self.writes.push(RowWrite::Close {
            row_id: row.row_id,
            object_id: row.object_id,
            axis,
            at,
        });
        Ok(())
    }

    /// Buffered writes in submission order
    pub fn writes(&self) -> &[RowWrite] {
        &self.writes
    }

    /// Counts of buffered writes
    pub fn pending_operations(&self) -> PendingOperations {
        self.writes
            .iter()
            .fold(PendingOperations::default(), |mut acc, w| {
                match w {
                    RowWrite::Insert(_) => acc.inserts += 1,
                    RowWrite::Close { .. } => acc.closes += 1,
                }
                acc
            })
    }

    /// True if nothing was written
    pub fn is_read_only(&self) -> bool {
        self.writes.is_empty()
    }

    // === State Management ===

    /// Current status
    pub fn status(&self) -> &TransactionStatus {
        &self.status
    }

    /// Check if transaction is in Active state
    pub fn is_active(&self) -> bool {
        matches!(self.status, TransactionStatus::Active)
    }

    /// Check if transaction is committed
    pub fn is_committed(&self) -> bool {
        matches!(self.status, TransactionStatus::Committed)
    }

    /// Check if transaction is aborted
    pub fn is_aborted(&self) -> bool {
        matches!(self.status, TransactionStatus::Aborted { .. })
    }

    /// Abort reason, if aborted
    pub fn abort_reason(&self) -> Option<&str> {
        match &self.status {
            TransactionStatus::Aborted { reason } => Some(reason),
            _ => None,
        }
    }

    /// Time since the transaction began
    pub fn elapsed(&self) -> Duration {
        self.start_time.elapsed()
    }

    /// Fail unless the caller's deadline and cancellation still allow work
    ///
    /// # Errors
    /// `DeadlineExceeded` or `Cancelled`.
    pub fn check_context(&self) -> MasterResult<()> {
        self.context.check(self.operation)
    }

    /// Fail unless the transaction can accept operations
    ///
    /// # Errors
    /// `Internal` if not `Active`, otherwise the context check.
    pub fn ensure_active(&self) -> MasterResult<()> {
        if !self.is_active() {
            return Err(MasterError::internal(format!(
                "transaction {} is not active: {:?}",
                self.txn_id, self.status
            )));
        }
        self.check_context()
    }

    /// `Active` → `Validating`
    ///
    /// # Errors
    /// `InvalidState` if not active.
    pub fn mark_validating(&mut self) -> Result<(), CommitError> {
        if !self.is_active() {
            return Err(CommitError::InvalidState(format!(
                "cannot validate transaction {} from state {:?}",
                self.txn_id, self.status
            )));
        }
        self.status = TransactionStatus::Validating;
        Ok(())
    }

    /// `Validating` → `Committed`
    ///
    /// # Errors
    /// `InvalidState` if not validating.
    pub fn mark_committed(&mut self) -> Result<(), CommitError> {
        match self.status {
            TransactionStatus::Validating => {
                self.status = TransactionStatus::Committed;
                Ok(())
            }
            _ => Err(CommitError::InvalidState(format!(
                "cannot commit transaction {} from state {:?}",
                self.txn_id, self.status
            ))),
        }
    }

    /// Discard the transaction; buffered writes are dropped
    ///
    /// Has no effect once committed or already aborted.
    pub fn mark_aborted(&mut self, reason: impl Into<String>) {
        if matches!(
            self.status,
            TransactionStatus::Active | TransactionStatus::Validating
        ) {
            self.status = TransactionStatus::Aborted {
                reason: reason.into(),
            };
            self.writes.clear();
        }
    }
}
