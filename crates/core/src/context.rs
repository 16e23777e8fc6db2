//! Per-call deadline and cancellation

use crate::error::{MasterError, MasterResult};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Deadline and cancellation state carried by one public call
///
/// Checked before every storage round trip and before commit. An expired or
/// cancelled context aborts the in-flight transaction; nothing it buffered
/// becomes visible.
#[derive(Debug, Clone, Default)]
pub struct CallContext {
    deadline: Option<Instant>,
    cancelled: Option<Arc<AtomicBool>>,
}

/// Handle that cancels every context sharing its flag
#[derive(Debug, Clone)]
pub struct CancelHandle(Arc<AtomicBool>);

impl CancelHandle {
    /// Request cancellation
    pub fn cancel(&self) {
        self.0.store(true, Ordering::Release);
    }

    /// True once cancelled
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

impl CallContext {
    /// No deadline, not cancellable
    pub fn background() -> Self {
        CallContext::default()
    }

    /// Expire at a fixed instant
    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(match self.deadline {
            Some(existing) => existing.min(deadline),
            None => deadline,
        });
        self
    }

    /// Expire after `timeout` from now
    pub fn with_timeout(self, timeout: Duration) -> Self {
        self.with_deadline(Instant::now() + timeout)
    }

    /// Attach a fresh cancellation flag and return its handle
    pub fn cancellable(mut self) -> (Self, CancelHandle) {
        let flag = Arc::new(AtomicBool::new(false));
        self.cancelled = Some(Arc::clone(&flag));
        (self, CancelHandle(flag))
    }

    /// The deadline, if any
    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Time left before the deadline, `None` without a deadline
    pub fn remaining(&self) -> Option<Duration> {
        self.deadline
            .map(|d| d.saturating_duration_since(Instant::now()))
    }

    /// True if cancelled or past the deadline
    pub fn is_done(&self) -> bool {
        self.is_cancelled() || self.is_expired()
    }

    fn is_cancelled(&self) -> bool {
        self.cancelled
            .as_ref()
            .map_or(false, |flag| flag.load(Ordering::Acquire))
    }

    fn is_expired(&self) -> bool {
        self.deadline.map_or(false, |d| Instant::now() >= d)
    }

    /// Fail with `Cancelled` or `DeadlineExceeded` if the call must stop
    pub fn check(&self, operation: &str) -> MasterResult<()> {
        if self.is_cancelled() {
            return Err(MasterError::Cancelled {
                operation: operation.to_string(),
            });
        }
        if self.is_expired() {
            return Err(MasterError::DeadlineExceeded {
                operation: operation.to_string(),
            });
        }
        Ok(())
    }
}
