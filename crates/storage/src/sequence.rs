//! Row-id sequence

use docmaster_core::{MasterError, MasterResult, RowIdSource};
use std::sync::atomic::{AtomicI64, Ordering};

/// Monotonically increasing row ids starting at a configurable value
#[derive(Debug)]
pub struct RowSequence {
    next: AtomicI64,
}

impl RowSequence {
    /// Sequence whose first id is `first`
    pub fn starting_at(first: i64) -> Self {
        RowSequence {
            next: AtomicI64::new(first),
        }
    }

    /// Id the next call will return, without allocating it
    pub fn peek(&self) -> i64 {
        self.next.load(Ordering::SeqCst)
    }
}

impl Default for RowSequence {
    fn default() -> Self {
        RowSequence::starting_at(1000)
    }
}

impl RowIdSource for RowSequence {
    fn next_row_id(&self) -> MasterResult<i64> {
        let id = self.next.fetch_add(1, Ordering::SeqCst);
        if id < 0 || id == i64::MAX {
            return Err(MasterError::Storage {
                message: "row id sequence exhausted".to_string(),
            });
        }
        Ok(id)
    }
}
