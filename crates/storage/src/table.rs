//! RowTable: in-memory bitemporal document table
//!
//! Implements [`RowStorage`] using:
//! - `BTreeMap<i64, Row>` keyed by row id
//! - a per-object index holding the object's row ids and its modification stamp
//! - `parking_lot::RwLock` so readers never see a partially applied batch
//! - `AtomicU64` tracking the highest applied commit version
//!
//! # Design Notes
//!
//! - Rows are never removed. Closing an interval rewrites the row in place.
//! - Reads return the stamp of the object they touched, taken under the same
//!   read lock as the rows, so a commit can detect that the object moved on.
//! - `apply_batch` stages and checks the whole batch under the write lock
//!   before mutating anything.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;
use rustc_hash::FxHashMap;
use tracing::{debug, trace};

use docmaster_core::{
    ApplyResult, MasterError, MasterResult, Row, RowIdSource, RowQuery, RowStorage, RowWrite, Stamped,
};

use crate::integrity;
use crate::sequence::RowSequence;

#[derive(Debug, Default)]
struct ObjectEntry {
    rows: BTreeSet<i64>,
    stamp: u64,
}

#[derive(Debug, Default)]
struct TableData {
    rows: BTreeMap<i64, Row>,
    objects: FxHashMap<i64, ObjectEntry>,
}

impl TableData {
    fn object_rows(&self, object_id: i64) -> impl Iterator<Item = &Row> {
        self.objects
            .get(&object_id)
            .into_iter()
            .flat_map(|entry| entry.rows.iter())
            .filter_map(|id| self.rows.get(id))
    }

    fn stamp(&self, object_id: i64) -> u64 {
        self.objects.get(&object_id).map_or(0, |e| e.stamp)
    }
}

/// In-memory row table
///
/// Thread-safe through `parking_lot::RwLock` and atomics. Cheap to share
/// behind an `Arc`.
#[derive(Debug)]
pub struct RowTable {
    name: String,
    data: Arc<RwLock<TableData>>,
    version: AtomicU64,
    sequence: RowSequence,
    writer: AtomicBool,
}

impl RowTable {
    /// Empty table; row ids start at 1000
    pub fn new(name: impl Into<String>) -> Self {
        Self::with_sequence(name, RowSequence::default())
    }

    /// Empty table drawing row ids from `sequence`
    pub fn with_sequence(name: impl Into<String>, sequence: RowSequence) -> Self {
        RowTable {
            name: name.into(),
            data: Arc::new(RwLock::new(TableData::default())),
            version: AtomicU64::new(0),
            sequence,
            writer: AtomicBool::new(false),
        }
    }

    /// Total number of stored rows
    pub fn len(&self) -> usize {
        self.data.read().rows.len()
    }

    /// True if no rows are stored
    pub fn is_empty(&self) -> bool {
        self.data.read().rows.is_empty()
    }

    /// Number of distinct objects
    pub fn object_count(&self) -> usize {
        self.data.read().objects.len()
    }

    /// Every row of an object in row-id order
    pub fn rows_of(&self, object_id: i64) -> Vec<Row> {
        self.data.read().object_rows(object_id).cloned().collect()
    }

    /// Every stored row in row-id order
    pub fn all_rows(&self) -> Vec<Row> {
        self.data.read().rows.values().cloned().collect()
    }

    /// Ids of every object with at least one row
    pub fn object_ids(&self) -> Vec<i64> {
        let mut ids: Vec<i64> = self.data.read().objects.keys().copied().collect();
        ids.sort_unstable();
        ids
    }
}

impl RowIdSource for RowTable {
    fn next_row_id(&self) -> MasterResult<i64> {
        self.sequence.next_row_id()
    }
}

impl RowStorage for RowTable {
    fn table_name(&self) -> &str {
        &self.name
    }

    fn fetch_row(&self, row_id: i64) -> MasterResult<Option<Stamped<Row>>> {
        let data = self.data.read();
        Ok(data.rows.get(&row_id).map(|row| Stamped {
            stamp: data.stamp(row.object_id),
            value: row.clone(),
        }))
    }

    fn query(&self, query: &RowQuery) -> MasterResult<Stamped<Vec<Row>>> {
        let data = self.data.read();
        let rows = query.evaluate(data.object_rows(query.object_id()));
        trace!(
            target: "docmaster::storage",
            table = %self.name,
            object_id = query.object_id(),
            matched = rows.len(),
            "query"
        );
        Ok(Stamped {
            stamp: data.stamp(query.object_id()),
            value: rows,
        })
    }

    fn count(&self, query: &RowQuery) -> MasterResult<Stamped<usize>> {
        let data = self.data.read();
        let count = data
            .object_rows(query.object_id())
            .filter(|r| query.matches(r))
            .count();
        Ok(Stamped {
            stamp: data.stamp(query.object_id()),
            value: count,
        })
    }

    fn object_stamp(&self, object_id: i64) -> u64 {
        self.data.read().stamp(object_id)
    }

    fn current_version(&self) -> u64 {
        self.version.load(Ordering::Acquire)
    }

    fn claim_writer(&self) -> MasterResult<()> {
        self.writer
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map(|_| ())
            .map_err(|_| {
                MasterError::config(format!("table {} already has a writing master", self.name))
            })
    }

    fn release_writer(&self) {
        self.writer.store(false, Ordering::Release);
    }

    fn apply_batch(&self, writes: &[RowWrite], commit_version: u64) -> MasterResult<ApplyResult> {
        let mut data = self.data.write();

        let staged = integrity::stage(writes, |id| data.rows.get(&id))?;
        for &object_id in &staged.objects {
            let merged = data
                .object_rows(object_id)
                .filter(|r| !staged.rows.contains_key(&r.row_id))
                .chain(staged.rows.values().filter(|r| r.object_id == object_id));
            integrity::check_current_rows(object_id, merged)?;
        }

        for (row_id, row) in staged.rows {
            let entry = data.objects.entry(row.object_id).or_default();
            entry.rows.insert(row_id);
            data.rows.insert(row_id, row);
        }
        for object_id in &staged.objects {
            if let Some(entry) = data.objects.get_mut(object_id) {
                entry.stamp = commit_version;
            }
        }
        self.version.fetch_max(commit_version, Ordering::AcqRel);

        debug!(
            target: "docmaster::storage",
            table = %self.name,
            commit_version,
            inserted = staged.rows_inserted,
            closed = staged.rows_closed,
            "applied batch"
        );

        Ok(ApplyResult {
            commit_version,
            rows_inserted: staged.rows_inserted,
            rows_closed: staged.rows_closed,
        })
    }
}
