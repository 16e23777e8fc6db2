//! Shared test utilities for the integration suites.
//!
//! Import via `#[path = "../common/mod.rs"] mod common;` from a suite's main.rs.

#![allow(dead_code)]

use docmaster::{
    ChangeEvent, ChangeType, Document, DocumentMaster, ManualClock, MasterConfig, ObjectId,
    Row, RowTable, SerdeMapper, Timestamp, UniqueId, VersionCorrection,
};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Once};
use std::time::Duration;

// ============================================================================
// Initialization
// ============================================================================

static INIT_TRACING: Once = Once::new();

/// Route `tracing` output through the test harness; `RUST_LOG` filters it
pub fn init_tracing() {
    INIT_TRACING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}

// ============================================================================
// Content
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Named {
    pub name: String,
}

pub fn named(name: &str) -> Document<Named> {
    Document::new(Named {
        name: name.to_string(),
    })
}

// ============================================================================
// TestMaster
// ============================================================================

pub type Master = DocumentMaster<SerdeMapper<Named>>;

pub const EPOCH_SECS: u64 = 1_600_000_000;

/// A master over its own table with a manual clock and an event log
pub struct TestMaster {
    pub master: Arc<Master>,
    pub clock: Arc<ManualClock>,
    pub storage: Arc<RowTable>,
    events: Arc<Mutex<Vec<ChangeEvent>>>,
}

impl TestMaster {
    pub fn new() -> Self {
        Self::with_config(MasterConfig::new("DbDoc"))
    }

    pub fn with_config(config: MasterConfig) -> Self {
        init_tracing();
        let clock = Arc::new(ManualClock::new(Timestamp::from_secs(EPOCH_SECS)));
        let storage = Arc::new(RowTable::new("doc"));
        let events = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&events);

        let master = DocumentMaster::builder(config, SerdeMapper::new())
            .storage(Arc::clone(&storage))
            .clock(clock.clone())
            .listener(Arc::new(move |e: &ChangeEvent| -> anyhow::Result<()> {
                sink.lock().push(e.clone());
                Ok(())
            }))
            .build()
            .unwrap();

        TestMaster {
            master: Arc::new(master),
            clock,
            storage,
            events,
        }
    }

    /// Instant `secs` after the starting instant
    pub fn t(&self, secs: u64) -> Timestamp {
        Timestamp::from_secs(EPOCH_SECS + secs)
    }

    /// Move the clock to `secs` after the starting instant
    pub fn set_time(&self, secs: u64) {
        self.clock.set(self.t(secs));
    }

    pub fn events(&self) -> Vec<ChangeEvent> {
        self.events.lock().clone()
    }

    pub fn change_types(&self) -> Vec<ChangeType> {
        self.events.lock().iter().map(|e| e.change_type).collect()
    }

    /// Name visible at a coordinate, `None` if nothing is
    pub fn name_at(&self, oid: &ObjectId, vc: VersionCorrection) -> Option<String> {
        match self.master.get_at(oid, vc) {
            Ok(doc) => Some(doc.content.name),
            Err(e) if e.is_not_found() => None,
            Err(e) => panic!("get_at({}, {}) failed: {}", oid, vc, e),
        }
    }

    /// Numeric object id of an identifier
    pub fn oid_of(&self, id: &UniqueId) -> i64 {
        self.master.codec().extract_oid(id).unwrap()
    }
}

// ============================================================================
// Interval invariants
// ============================================================================

/// Rows of one object that were the current correction at `instant`
pub fn visible_at(rows: &[Row], instant: Timestamp) -> Vec<&Row> {
    rows.iter()
        .filter(|r| r.correction_from <= instant && instant < r.correction_to)
        .collect()
}

/// Non-empty version intervals among `rows` do not overlap
pub fn assert_versions_disjoint(rows: &[&Row]) {
    let mut spans: Vec<(Timestamp, Timestamp, i64)> = rows
        .iter()
        .filter(|r| r.version_from < r.version_to)
        .map(|r| (r.version_from, r.version_to, r.row_id))
        .collect();
    spans.sort();
    for pair in spans.windows(2) {
        assert!(
            pair[0].1 <= pair[1].0,
            "rows {} [{}, {}) and {} [{}, {}) overlap",
            pair[0].2,
            pair[0].0,
            pair[0].1,
            pair[1].2,
            pair[1].0,
            pair[1].1
        );
    }
}

/// At most one row is open on both axes
pub fn assert_at_most_one_open(rows: &[Row]) {
    let open: Vec<i64> = rows
        .iter()
        .filter(|r| r.is_fully_open())
        .map(|r| r.row_id)
        .collect();
    assert!(open.len() <= 1, "fully open rows {:?}", open);
}

/// Both invariants over the current view and at every correction instant
pub fn assert_object_invariants(rows: &[Row]) {
    assert_at_most_one_open(rows);
    let mut instants: Vec<Timestamp> = rows.iter().map(|r| r.correction_from).collect();
    instants.extend(
        rows.iter()
            .map(|r| r.correction_to)
            .filter(|t| !t.is_open_ended()),
    );
    instants.sort();
    instants.dedup();
    for instant in instants {
        assert_versions_disjoint(&visible_at(rows, instant));
    }
}

pub fn secs(n: u64) -> Duration {
    Duration::from_secs(n)
}
