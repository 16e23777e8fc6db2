//! Query builders for resolution and history

use crate::table::TableLayout;
use docmaster_core::{Axis, RowPredicate, RowQuery, Timestamp};

/// Rows of `object_id` visible at `(version, correction)`
///
/// Both instants must already be fixed; "latest" is resolved by the caller.
pub(crate) fn point_in_time(
    table: &TableLayout,
    object_id: i64,
    version: Timestamp,
    correction: Timestamp,
) -> RowQuery {
    RowQuery::for_object(object_id)
        .with(RowPredicate::OpenAt {
            axis: Axis::Version,
            instant: version,
        })
        .with(RowPredicate::OpenAt {
            axis: Axis::Correction,
            instant: correction,
        })
        .with_opt(table.extra_predicate())
}

/// Condition for one axis of a history request
///
/// Equal bounds select rows open at that instant; otherwise rows whose
/// interval overlaps `[from, to]`. No bounds means no condition.
pub(crate) fn axis_range(
    axis: Axis,
    from: Option<Timestamp>,
    to: Option<Timestamp>,
) -> Option<RowPredicate> {
    match (from, to) {
        (None, None) => None,
        (Some(f), Some(t)) if f == t => Some(RowPredicate::OpenAt { axis, instant: f }),
        (from, to) => Some(RowPredicate::Overlaps { axis, from, to }),
    }
}

/// History of `object_id` restricted on both axes, ordered newest first
pub(crate) fn history(
    table: &TableLayout,
    object_id: i64,
    versions: (Option<Timestamp>, Option<Timestamp>),
    corrections: (Option<Timestamp>, Option<Timestamp>),
) -> RowQuery {
    RowQuery::for_object(object_id)
        .with_opt(axis_range(Axis::Version, versions.0, versions.1))
        .with_opt(axis_range(Axis::Correction, corrections.0, corrections.1))
        .with_opt(table.extra_predicate())
        .ordered(table.history_order())
}

/// Rows of `object_id` that are the current correction of their version
pub(crate) fn current_rows(object_id: i64) -> RowQuery {
    RowQuery::for_object(object_id).with(RowPredicate::Unclosed(Axis::Correction))
}
