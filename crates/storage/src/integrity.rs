//! Integrity rules for write batches
//!
//! A batch is staged against the committed rows before anything is applied.
//! Staging fails if any write is individually invalid, and the staged result
//! is then checked per touched object:
//!
//! - an interval may be closed only while it is still open
//! - a row id may be inserted only once
//! - current rows (`correction_to = +∞`) of one object must not overlap in
//!   valid time, which also rules out two fully open rows

use std::collections::{BTreeMap, BTreeSet};

use docmaster_core::{Axis, MasterError, MasterResult, Row, RowWrite, Timestamp};

/// Rows as they will look after the batch is applied
#[derive(Debug, Default)]
pub struct StagedBatch {
    /// New and modified rows, keyed by row id
    pub rows: BTreeMap<i64, Row>,
    /// Objects touched by the batch
    pub objects: BTreeSet<i64>,
    /// Number of inserts
    pub rows_inserted: usize,
    /// Number of closes
    pub rows_closed: usize,
}

/// Stage a batch against committed rows
///
/// # Errors
///
/// `WriteConflict` if a close targets a missing or already closed interval or
/// an insert reuses a row id; `InvalidArgument` for malformed rows.
pub fn stage<'a, F>(writes: &[RowWrite], committed: F) -> MasterResult<StagedBatch>
where
    F: Fn(i64) -> Option<&'a Row>,
{
    let mut staged = StagedBatch::default();

    for write in writes {
        match write {
            RowWrite::Insert(row) => {
                if committed(row.row_id).is_some() || staged.rows.contains_key(&row.row_id) {
                    return Err(MasterError::write_conflict(format!(
                        "row {} already exists",
                        row.row_id
                    )));
                }
                check_intervals(row)?;
                staged.objects.insert(row.object_id);
                staged.rows.insert(row.row_id, row.clone());
                staged.rows_inserted += 1;
            }
            RowWrite::Close {
                row_id,
                object_id,
                axis,
                at,
            } => {
                let mut row = match staged.rows.get(row_id) {
                    Some(r) => r.clone(),
                    None => committed(*row_id).cloned().ok_or_else(|| {
                        MasterError::write_conflict(format!("row {} does not exist", row_id))
                    })?,
                };
                if row.object_id != *object_id {
                    return Err(MasterError::internal(format!(
                        "row {} belongs to object {}, not {}",
                        row_id, row.object_id, object_id
                    )));
                }
                close(&mut row, *axis, *at)?;
                staged.objects.insert(row.object_id);
                staged.rows.insert(row.row_id, row);
                staged.rows_closed += 1;
            }
        }
    }

    Ok(staged)
}

fn close(row: &mut Row, axis: Axis, at: Timestamp) -> MasterResult<()> {
    let (from, to) = row.interval(axis);
    if !to.is_open_ended() {
        return Err(MasterError::write_conflict(format!(
            "row {} {} interval already closed at {}",
            row.row_id, axis, to
        )));
    }
    if at < from || at.is_open_ended() {
        return Err(MasterError::invalid_argument(format!(
            "cannot close row {} {} interval starting {} at {}",
            row.row_id, axis, from, at
        )));
    }
    match axis {
        Axis::Version => row.version_to = at,
        Axis::Correction => row.correction_to = at,
    }
    Ok(())
}

fn check_intervals(row: &Row) -> MasterResult<()> {
    if row.version_from > row.version_to || row.version_from.is_open_ended() {
        return Err(MasterError::invalid_argument(format!(
            "row {} has invalid version interval [{}, {})",
            row.row_id, row.version_from, row.version_to
        )));
    }
    if row.correction_from > row.correction_to || row.correction_from.is_open_ended() {
        return Err(MasterError::invalid_argument(format!(
            "row {} has invalid correction interval [{}, {})",
            row.row_id, row.correction_from, row.correction_to
        )));
    }
    Ok(())
}

/// Check the current rows of one object after staging
///
/// # Errors
///
/// `WriteConflict` if two current rows overlap in valid time.
pub fn check_current_rows<'a>(
    object_id: i64,
    rows: impl IntoIterator<Item = &'a Row>,
) -> MasterResult<()> {
    let mut current: Vec<&Row> = rows
        .into_iter()
        .filter(|r| r.is_latest_correction() && r.version_from < r.version_to)
        .collect();
    current.sort_by_key(|r| (r.version_from, r.row_id));

    for pair in current.windows(2) {
        if pair[0].version_overlaps(pair[1]) {
            return Err(MasterError::write_conflict(format!(
                "object {}: current rows {} and {} overlap in valid time",
                object_id, pair[0].row_id, pair[1].row_id
            )));
        }
    }
    Ok(())
}
