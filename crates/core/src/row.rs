//! Stored row model

use crate::timestamp::Timestamp;
use crate::value::Columns;
use serde::{Deserialize, Serialize};

/// Which time axis a predicate or close operation applies to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Axis {
    /// Valid time (`version_from` / `version_to`)
    Version,
    /// Transaction time (`correction_from` / `correction_to`)
    Correction,
}

impl std::fmt::Display for Axis {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Axis::Version => f.write_str("version"),
            Axis::Correction => f.write_str("correction"),
        }
    }
}

/// One row of a bitemporal document table
///
/// Both intervals are half-open `[from, to)`. An end equal to
/// [`Timestamp::MAX`] means the interval is still open.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Row {
    /// Primary key, unique across the table
    pub row_id: i64,
    /// Logical document this row belongs to
    pub object_id: i64,
    /// Valid-time start (inclusive)
    pub version_from: Timestamp,
    /// Valid-time end (exclusive)
    pub version_to: Timestamp,
    /// Transaction-time start (inclusive)
    pub correction_from: Timestamp,
    /// Transaction-time end (exclusive)
    pub correction_to: Timestamp,
    /// Entity columns owned by the mapper
    pub columns: Columns,
}

impl Row {
    /// A row open on both axes from `now`
    pub fn fully_open(row_id: i64, object_id: i64, now: Timestamp, columns: Columns) -> Self {
        Row {
            row_id,
            object_id,
            version_from: now,
            version_to: Timestamp::MAX,
            correction_from: now,
            correction_to: Timestamp::MAX,
            columns,
        }
    }

    /// `(from, to)` on the given axis
    pub fn interval(&self, axis: Axis) -> (Timestamp, Timestamp) {
        match axis {
            Axis::Version => (self.version_from, self.version_to),
            Axis::Correction => (self.correction_from, self.correction_to),
        }
    }

    /// True if the valid-time interval is open-ended
    pub fn is_latest_version(&self) -> bool {
        self.version_to.is_open_ended()
    }

    /// True if the transaction-time interval is open-ended
    pub fn is_latest_correction(&self) -> bool {
        self.correction_to.is_open_ended()
    }

    /// True if both intervals are open-ended
    pub fn is_fully_open(&self) -> bool {
        self.is_latest_version() && self.is_latest_correction()
    }

    /// True if the row's interval on `axis` contains `instant`
    pub fn is_open_at(&self, axis: Axis, instant: Timestamp) -> bool {
        let (from, to) = self.interval(axis);
        from <= instant && to > instant
    }

    /// True if the row is the one visible at `(version, correction)`
    pub fn is_visible_at(&self, version: Timestamp, correction: Timestamp) -> bool {
        self.is_open_at(Axis::Version, version) && self.is_open_at(Axis::Correction, correction)
    }

    /// True if the valid-time intervals of two rows share an instant
    pub fn version_overlaps(&self, other: &Row) -> bool {
        let non_empty = self.version_from < self.version_to && other.version_from < other.version_to;
        non_empty && self.version_from < other.version_to && other.version_from < self.version_to
    }
}
