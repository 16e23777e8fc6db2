//! Core traits for row storage
//!
//! The master talks to its table only through [`RowStorage`]. Any backend
//! that can fetch by primary key, run an object-scoped [`RowQuery`] and apply
//! a batch of writes atomically can host a master.

use crate::error::MasterResult;
use crate::query::RowQuery;
use crate::row::{Axis, Row};
use crate::timestamp::Timestamp;

/// A value read from storage together with the modification stamp of the
/// object it belongs to at the time of the read
///
/// Stamps are compared at commit time to detect concurrent writers.
#[derive(Debug, Clone, PartialEq)]
pub struct Stamped<T> {
    /// The value read
    pub value: T,
    /// Object modification stamp observed by the read (0 = never written)
    pub stamp: u64,
}

/// One buffered write of a mutation
#[derive(Debug, Clone, PartialEq)]
pub enum RowWrite {
    /// Insert a new row
    Insert(Row),
    /// Close the open interval of an existing row on one axis
    Close {
        /// Row to close
        row_id: i64,
        /// Object the row belongs to
        object_id: i64,
        /// Axis whose `*_to` column is set
        axis: Axis,
        /// New end of the interval
        at: Timestamp,
    },
}

impl RowWrite {
    /// Object touched by the write
    pub fn object_id(&self) -> i64 {
        match self {
            RowWrite::Insert(row) => row.object_id,
            RowWrite::Close { object_id, .. } => *object_id,
        }
    }
}

/// Outcome of applying a write batch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ApplyResult {
    /// Stamp assigned to every object touched by the batch
    pub commit_version: u64,
    /// Rows inserted
    pub rows_inserted: usize,
    /// Intervals closed
    pub rows_closed: usize,
}

/// Source of monotonically increasing row ids
pub trait RowIdSource: Send + Sync {
    /// Allocate the next row id
    ///
    /// Ids allocated by aborted transactions are not reused.
    ///
    /// # Errors
    ///
    /// Returns an error if the sequence is exhausted or unavailable.
    fn next_row_id(&self) -> MasterResult<i64>;
}

/// Storage abstraction for a bitemporal document table
///
/// Thread safety: all methods may be called concurrently.
pub trait RowStorage: RowIdSource {
    /// Name of the table, used in messages
    fn table_name(&self) -> &str;

    /// Row by primary key, no interval filter
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    fn fetch_row(&self, row_id: i64) -> MasterResult<Option<Stamped<Row>>>;

    /// Rows matching an object-scoped query, ordered and windowed
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    fn query(&self, query: &RowQuery) -> MasterResult<Stamped<Vec<Row>>>;

    /// Number of rows matching a query, ignoring its window
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    fn count(&self, query: &RowQuery) -> MasterResult<Stamped<usize>>;

    /// Current modification stamp of an object (0 if it has no rows)
    fn object_stamp(&self, object_id: i64) -> u64;

    /// Highest commit version applied so far
    fn current_version(&self) -> u64;

    /// Reserve the storage for one writer
    ///
    /// Commit versions and the commit lock live with the writer, so two
    /// writers over one storage could stamp different batches alike.
    ///
    /// # Errors
    ///
    /// `Config` if another writer holds the storage.
    fn claim_writer(&self) -> MasterResult<()>;

    /// Release a claim taken with [`RowStorage::claim_writer`]
    fn release_writer(&self);

    /// Apply a batch atomically
    ///
    /// Either every write is applied and every touched object is stamped
    /// with `commit_version`, or nothing changes. Implementations must reject
    /// with `WriteConflict` any batch that closes an interval which is no
    /// longer open, inserts an existing row id, or leaves two current rows
    /// of one object overlapping in valid time.
    ///
    /// # Errors
    ///
    /// `WriteConflict` on integrity violations, `InvalidArgument` on
    /// malformed rows, other kinds on backend failure.
    fn apply_batch(&self, writes: &[RowWrite], commit_version: u64) -> MasterResult<ApplyResult>;
}
