//! Per-operation counters and timers
//!
//! # Memory Ordering
//!
//! Every counter uses Relaxed ordering. They are observational only and do
//! not synchronize any other memory; a snapshot taken under load may be
//! slightly inconsistent across counters.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// Public operation of the master
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    /// `get`
    Get,
    /// `get_at`
    GetAt,
    /// `get_many`
    GetMany,
    /// `history`
    History,
    /// `add`
    Add,
    /// `update`
    Update,
    /// `correct`
    Correct,
    /// `remove`
    Remove,
    /// `replace_version`
    ReplaceVersion,
    /// `replace_versions`
    ReplaceVersions,
    /// `replace_all_versions`
    ReplaceAllVersions,
    /// `remove_version`
    RemoveVersion,
    /// `add_version`
    AddVersion,
}

impl Operation {
    /// Every operation, in index order
    pub const ALL: [Operation; 13] = [
        Operation::Get,
        Operation::GetAt,
        Operation::GetMany,
        Operation::History,
        Operation::Add,
        Operation::Update,
        Operation::Correct,
        Operation::Remove,
        Operation::ReplaceVersion,
        Operation::ReplaceVersions,
        Operation::ReplaceAllVersions,
        Operation::RemoveVersion,
        Operation::AddVersion,
    ];

    /// Name used in logs and timers
    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::Get => "get",
            Operation::GetAt => "get_at",
            Operation::GetMany => "get_many",
            Operation::History => "history",
            Operation::Add => "add",
            Operation::Update => "update",
            Operation::Correct => "correct",
            Operation::Remove => "remove",
            Operation::ReplaceVersion => "replace_version",
            Operation::ReplaceVersions => "replace_versions",
            Operation::ReplaceAllVersions => "replace_all_versions",
            Operation::RemoveVersion => "remove_version",
            Operation::AddVersion => "add_version",
        }
    }

    fn index(&self) -> usize {
        *self as usize
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Default)]
struct OperationCounters {
    calls: AtomicU64,
    failures: AtomicU64,
    total_micros: AtomicU64,
}

/// Counters for one master
#[derive(Debug, Default)]
pub struct MasterMetrics {
    operations: [OperationCounters; 13],
    conflicts_retried: AtomicU64,
}

impl MasterMetrics {
    /// Fresh counters
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one completed call
    pub fn record(&self, op: Operation, elapsed: Duration, succeeded: bool) {
        let counters = &self.operations[op.index()];
        counters.calls.fetch_add(1, Ordering::Relaxed);
        if !succeeded {
            counters.failures.fetch_add(1, Ordering::Relaxed);
        }
        let micros = u64::try_from(elapsed.as_micros()).unwrap_or(u64::MAX);
        counters.total_micros.fetch_add(micros, Ordering::Relaxed);
    }

    /// Record a conflict that is about to be retried
    pub fn record_retry(&self) {
        self.conflicts_retried.fetch_add(1, Ordering::Relaxed);
    }

    /// Snapshot of one operation's counters
    pub fn operation(&self, op: Operation) -> OperationStats {
        let counters = &self.operations[op.index()];
        OperationStats {
            operation: op,
            calls: counters.calls.load(Ordering::Relaxed),
            failures: counters.failures.load(Ordering::Relaxed),
            total_time: Duration::from_micros(counters.total_micros.load(Ordering::Relaxed)),
        }
    }

    /// Snapshot of every counter
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            operations: Operation::ALL.iter().map(|op| self.operation(*op)).collect(),
            conflicts_retried: self.conflicts_retried.load(Ordering::Relaxed),
        }
    }
}

/// Counters of one operation at a point in time
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OperationStats {
    /// Which operation
    pub operation: Operation,
    /// Completed calls
    pub calls: u64,
    /// Calls that returned an error
    pub failures: u64,
    /// Cumulative latency
    pub total_time: Duration,
}

impl OperationStats {
    /// Mean latency, zero if never called
    pub fn mean_time(&self) -> Duration {
        if self.calls == 0 {
            Duration::ZERO
        } else {
            self.total_time / u32::try_from(self.calls).unwrap_or(u32::MAX)
        }
    }
}

/// All counters of a master at a point in time
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetricsSnapshot {
    /// Per-operation counters, in [`Operation::ALL`] order
    pub operations: Vec<OperationStats>,
    /// Conflicts that triggered a retry
    pub conflicts_retried: u64,
}

impl MetricsSnapshot {
    /// Counters of one operation
    pub fn get(&self, op: Operation) -> Option<&OperationStats> {
        self.operations.iter().find(|s| s.operation == op)
    }

    /// Calls across every operation
    pub fn total_calls(&self) -> u64 {
        self.operations.iter().map(|s| s.calls).sum()
    }
}
