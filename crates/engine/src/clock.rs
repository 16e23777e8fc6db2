//! Source of "now" for mutations and latest-resolution
//!
//! The clock is handed to the master explicitly. Tests use [`ManualClock`] to
//! make every instant deterministic.

use docmaster_core::Timestamp;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// Provides the current instant
pub trait Clock: Send + Sync {
    /// The current instant; must never return the open-ended sentinel
    fn now(&self) -> Timestamp;
}

/// Wall-clock time
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Timestamp {
        Timestamp::now()
    }
}

/// Clock that only moves when told to
#[derive(Debug)]
pub struct ManualClock {
    micros: AtomicU64,
}

impl ManualClock {
    /// Clock reading `start`
    pub fn new(start: Timestamp) -> Self {
        ManualClock {
            micros: AtomicU64::new(start.as_micros()),
        }
    }

    /// Jump to an instant
    pub fn set(&self, instant: Timestamp) {
        self.micros.store(instant.as_micros(), Ordering::SeqCst);
    }

    /// Move forward and return the new reading
    ///
    /// Saturates at the last real instant, one below the open-ended sentinel.
    pub fn advance(&self, by: Duration) -> Timestamp {
        let last = Timestamp::MAX.as_micros() - 1;
        let by = u64::try_from(by.as_micros()).unwrap_or(u64::MAX);
        let step = |micros: u64| micros.checked_add(by).map_or(last, |m| m.min(last));
        let before = match self
            .micros
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |m| Some(step(m)))
        {
            Ok(before) | Err(before) => before,
        };
        Timestamp::from_micros(step(before))
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Timestamp {
        Timestamp::from_micros(self.micros.load(Ordering::SeqCst))
    }
}
