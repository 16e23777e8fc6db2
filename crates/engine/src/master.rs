//! The document master
//!
//! [`DocumentMaster`] ties an identifier scheme, a row table, a content
//! mapper and a clock together. Every public operation runs through a
//! [`ScopedMaster`], which carries the caller's [`CallContext`]. The plain
//! methods on `DocumentMaster` use the context derived from the config.
//!
//! # Example
//!
//! ```ignore
//! use docmaster_engine::{DocumentMaster, MasterConfig, SerdeMapper};
//!
//! let master = DocumentMaster::builder(MasterConfig::new("DbSec"), SerdeMapper::<Security>::new())
//!     .build()?;
//! let added = master.add(Document::new(security))?;
//! let latest = master.get(added.unique_id.as_ref().unwrap())?;
//! ```

use crate::change::{ChangeEvent, ChangeListener, ChangeManager};
use crate::clock::{Clock, SystemClock};
use crate::config::MasterConfig;
use crate::mapper::RowMapper;
use crate::metrics::{MasterMetrics, MetricsSnapshot, Operation};
use crate::retry::{run_with_retry, RetryConfig};
use crate::table::TableLayout;
use docmaster_concurrency::{TransactionContext, TransactionManager};
use docmaster_core::{
    CallContext, Document, IdCodec, MasterError, MasterResult, Row, RowStorage, Timestamp,
    UniqueId,
};
use docmaster_storage::RowTable;
use std::fmt;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, warn};

/// Default table name
pub const DEFAULT_TABLE: &str = "document";

/// Bitemporal document master over one row table
///
/// `Send + Sync`; share it through an `Arc`. A master claims its storage
/// when built and releases it when dropped; a second master over the same
/// storage fails to build.
pub struct DocumentMaster<M: RowMapper, S: RowStorage = RowTable> {
    pub(crate) config: MasterConfig,
    pub(crate) retry: RetryConfig,
    pub(crate) codec: IdCodec,
    pub(crate) table: TableLayout,
    pub(crate) mapper: M,
    pub(crate) storage: Arc<S>,
    pub(crate) clock: Arc<dyn Clock>,
    pub(crate) txn_manager: TransactionManager,
    pub(crate) changes: ChangeManager,
    pub(crate) metrics: MasterMetrics,
}

impl<M: RowMapper> DocumentMaster<M, RowTable> {
    /// Builder over a fresh in-memory table
    pub fn builder(config: MasterConfig, mapper: M) -> MasterBuilder<M, RowTable> {
        MasterBuilder::new(config, mapper)
    }

    /// Master over a fresh in-memory table with the system clock
    ///
    /// # Errors
    ///
    /// `Config` if the config is invalid.
    pub fn in_memory(config: MasterConfig, mapper: M) -> MasterResult<Self> {
        Self::builder(config, mapper).build()
    }
}

impl<M: RowMapper, S: RowStorage> DocumentMaster<M, S> {
    /// Operations bound to the caller's deadline and cancellation
    pub fn with_context(&self, context: &CallContext) -> ScopedMaster<'_, M, S> {
        ScopedMaster {
            master: self,
            context: context.clone(),
        }
    }

    fn scoped(&self) -> ScopedMaster<'_, M, S> {
        ScopedMaster {
            master: self,
            context: self.config.default_context(),
        }
    }

    /// Configuration in effect
    pub fn config(&self) -> &MasterConfig {
        &self.config
    }

    /// Identifier codec for this master's scheme
    pub fn codec(&self) -> &IdCodec {
        &self.codec
    }

    /// Table description
    pub fn table(&self) -> &TableLayout {
        &self.table
    }

    /// Underlying row storage
    pub fn storage(&self) -> &Arc<S> {
        &self.storage
    }

    /// Content mapper
    pub fn mapper(&self) -> &M {
        &self.mapper
    }

    /// Register a change listener
    pub fn add_listener(&self, listener: Arc<dyn ChangeListener>) {
        self.changes.add_listener(listener);
    }

    /// Unregister a change listener
    pub fn remove_listener(&self, listener: &Arc<dyn ChangeListener>) -> bool {
        self.changes.remove_listener(listener)
    }

    /// Counters since the master was built
    pub fn metrics(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }
}

/// Forwards the plain operations to a default-context [`ScopedMaster`]
macro_rules! forward {
    ($( $(#[$doc:meta])* fn $name:ident(&self $(, $arg:ident : $ty:ty)*) -> $ret:ty; )*) => {
        impl<M: RowMapper, S: RowStorage> DocumentMaster<M, S> {
            $(
                $(#[$doc])*
                pub fn $name(&self $(, $arg: $ty)*) -> $ret {
                    self.scoped().$name($($arg),*)
                }
            )*
        }
    };
}

forward! {
    /// Document by versioned or object identifier; see [`ScopedMaster::get`]
    fn get(&self, id: &UniqueId) -> MasterResult<Document<M::Content>>;
    /// Document at a bitemporal coordinate; see [`ScopedMaster::get_at`]
    fn get_at(&self, object_id: &docmaster_core::ObjectId, vc: docmaster_core::VersionCorrection) -> MasterResult<Document<M::Content>>;
    /// Many documents; see [`ScopedMaster::get_many`]
    fn get_many(&self, ids: &[UniqueId]) -> MasterResult<std::collections::HashMap<UniqueId, Document<M::Content>>>;
    /// History of an object; see [`ScopedMaster::history`]
    fn history(&self, request: &crate::history::HistoryRequest) -> MasterResult<crate::history::HistoryResult<M::Content>>;
    /// Store a new object; see [`ScopedMaster::add`]
    fn add(&self, document: Document<M::Content>) -> MasterResult<Document<M::Content>>;
    /// Supersede the latest version; see [`ScopedMaster::update`]
    fn update(&self, document: Document<M::Content>) -> MasterResult<Document<M::Content>>;
    /// Correct a version; see [`ScopedMaster::correct`]
    fn correct(&self, document: Document<M::Content>) -> MasterResult<Document<M::Content>>;
    /// End the latest version; see [`ScopedMaster::remove`]
    fn remove(&self, id: &UniqueId) -> MasterResult<()>;
    /// Replace one version; see [`ScopedMaster::replace_version`]
    fn replace_version(&self, id: &UniqueId, replacements: Vec<Document<M::Content>>) -> MasterResult<Vec<UniqueId>>;
    /// Replace one version with one document; see [`ScopedMaster::replace_version_document`]
    fn replace_version_document(&self, document: Document<M::Content>) -> MasterResult<UniqueId>;
    /// Replace a valid-time range; see [`ScopedMaster::replace_versions`]
    fn replace_versions(&self, object_id: &docmaster_core::ObjectId, replacements: Vec<Document<M::Content>>) -> MasterResult<Vec<UniqueId>>;
    /// Replace every version; see [`ScopedMaster::replace_all_versions`]
    fn replace_all_versions(&self, object_id: &docmaster_core::ObjectId, replacements: Vec<Document<M::Content>>) -> MasterResult<Vec<UniqueId>>;
    /// Remove one version; see [`ScopedMaster::remove_version`]
    fn remove_version(&self, id: &UniqueId) -> MasterResult<()>;
    /// Insert a version; see [`ScopedMaster::add_version`]
    fn add_version(&self, object_id: &docmaster_core::ObjectId, document: Document<M::Content>) -> MasterResult<UniqueId>;
}

impl<M: RowMapper, S: RowStorage> Drop for DocumentMaster<M, S> {
    fn drop(&mut self) {
        self.storage.release_writer();
    }
}

impl<M: RowMapper, S: RowStorage> fmt::Debug for DocumentMaster<M, S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DocumentMaster")
            .field("scheme", &self.codec.scheme())
            .field("table", &self.table)
            .field("changes", &self.changes)
            .finish()
    }
}

/// A master bound to one caller's [`CallContext`]
pub struct ScopedMaster<'a, M: RowMapper, S: RowStorage = RowTable> {
    pub(crate) master: &'a DocumentMaster<M, S>,
    pub(crate) context: CallContext,
}

impl<'a, M: RowMapper, S: RowStorage> ScopedMaster<'a, M, S> {
    /// The bound context
    pub fn context(&self) -> &CallContext {
        &self.context
    }

    /// Time, log and count one public call
    pub(crate) fn observe<T>(
        &self,
        op: Operation,
        target_id: &dyn fmt::Display,
        f: impl FnOnce() -> MasterResult<T>,
    ) -> MasterResult<T> {
        debug!(
            target: "docmaster::master",
            operation = op.as_str(),
            table = self.master.table.name(),
            id = %target_id,
            "call"
        );
        let start = Instant::now();
        let result = f();
        self.master.metrics.record(op, start.elapsed(), result.is_ok());

        if let Err(e) = &result {
            if e.is_not_found() || e.is_caller_error() || e.is_stale() || e.is_interrupted() {
                debug!(target: "docmaster::master", operation = op.as_str(), id = %target_id, error = %e, "rejected");
            } else {
                warn!(target: "docmaster::master", operation = op.as_str(), id = %target_id, error = %e, "failed");
            }
        }
        result
    }

    /// Run `f` as one retrying transaction and publish its event after commit
    ///
    /// `f` receives the transaction and the attempt's "now". Each attempt
    /// starts from fresh storage state; a conflicting attempt is discarded
    /// whole and `f` runs again.
    pub(crate) fn transact<T>(
        &self,
        op: Operation,
        mut f: impl FnMut(&mut TransactionContext, Timestamp) -> MasterResult<(T, Option<ChangeEvent>)>,
    ) -> MasterResult<T> {
        let master = self.master;
        let (value, event) = run_with_retry(
            &master.retry,
            op.as_str(),
            &self.context,
            |_attempt| {
                let mut txn = master.txn_manager.begin(op.as_str(), self.context.clone());
                let now = master.clock.now();
                match f(&mut txn, now) {
                    Ok(outcome) => {
                        master.txn_manager.commit(&mut txn, master.storage.as_ref())?;
                        Ok(outcome)
                    }
                    Err(e) => {
                        txn.mark_aborted(e.to_string());
                        Err(e)
                    }
                }
            },
            |_| master.metrics.record_retry(),
        )?;

        if let Some(event) = event {
            master.changes.publish(&event);
        }
        Ok(value)
    }

    /// Allocate a row id for an insert
    pub(crate) fn next_row_id(&self) -> MasterResult<i64> {
        self.master.storage.next_row_id()
    }

    /// Document for a stored row, decoding its content
    pub(crate) fn to_document(&self, row: &Row) -> MasterResult<Document<M::Content>> {
        let content = self.master.mapper.from_columns(&row.columns)?;
        Ok(self.document_for(row, content))
    }

    /// Document for a stored row with already known content
    pub(crate) fn document_for(&self, row: &Row, content: M::Content) -> Document<M::Content> {
        Document {
            unique_id: Some(self.master.codec.make_unique_id(row.object_id, row.row_id)),
            version_from: Some(row.version_from),
            version_to: Some(row.version_to),
            correction_from: Some(row.correction_from),
            correction_to: Some(row.correction_to),
            content,
        }
    }

    /// Versioned identifier of a row
    pub(crate) fn unique_id_of(&self, row: &Row) -> UniqueId {
        self.master.codec.make_unique_id(row.object_id, row.row_id)
    }
}

/// Builder for [`DocumentMaster`]
pub struct MasterBuilder<M: RowMapper, S: RowStorage = RowTable> {
    config: MasterConfig,
    mapper: M,
    table: TableLayout,
    storage: Arc<S>,
    clock: Arc<dyn Clock>,
    listeners: Vec<Arc<dyn ChangeListener>>,
}

impl<M: RowMapper> MasterBuilder<M, RowTable> {
    /// Builder over a fresh in-memory table
    pub fn new(config: MasterConfig, mapper: M) -> Self {
        MasterBuilder {
            config,
            mapper,
            table: TableLayout::new(DEFAULT_TABLE),
            storage: Arc::new(RowTable::new(DEFAULT_TABLE)),
            clock: Arc::new(SystemClock),
            listeners: Vec::new(),
        }
    }
}

impl<M: RowMapper, S: RowStorage> MasterBuilder<M, S> {
    /// Use existing storage
    pub fn storage<S2: RowStorage>(self, storage: Arc<S2>) -> MasterBuilder<M, S2> {
        MasterBuilder {
            config: self.config,
            mapper: self.mapper,
            table: self.table,
            storage,
            clock: self.clock,
            listeners: self.listeners,
        }
    }

    /// Set the table description
    pub fn table(mut self, table: TableLayout) -> Self {
        self.table = table;
        self
    }

    /// Set the clock
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Register a change listener
    pub fn listener(mut self, listener: Arc<dyn ChangeListener>) -> Self {
        self.listeners.push(listener);
        self
    }

    /// Validate the config, claim the storage and build
    ///
    /// The storage stays claimed until the master is dropped.
    ///
    /// # Errors
    ///
    /// `Config` if the config is invalid or another master drives the
    /// storage.
    pub fn build(self) -> MasterResult<DocumentMaster<M, S>> {
        self.config.validate()?;
        let codec = IdCodec::new(self.config.scheme.as_str())?;
        self.storage.claim_writer()?;
        let changes = ChangeManager::new();
        for listener in self.listeners {
            changes.add_listener(listener);
        }
        let txn_manager = TransactionManager::new(self.storage.current_version());

        debug!(
            target: "docmaster::master",
            scheme = codec.scheme(),
            table = self.table.name(),
            storage = self.storage.table_name(),
            "master built"
        );

        Ok(DocumentMaster {
            retry: self.config.retry(),
            config: self.config,
            codec,
            table: self.table,
            mapper: self.mapper,
            storage: self.storage,
            clock: self.clock,
            txn_manager,
            changes,
            metrics: MasterMetrics::new(),
        })
    }
}

impl<M: RowMapper, S: RowStorage> fmt::Debug for MasterBuilder<M, S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MasterBuilder")
            .field("config", &self.config)
            .field("table", &self.table)
            .field("listeners", &self.listeners.len())
            .finish()
    }
}

/// Fail unless `at` does not precede `from`
///
/// Closing an interval before it starts would corrupt it.
pub(crate) fn ensure_not_before(at: Timestamp, from: Timestamp, id: &UniqueId) -> MasterResult<()> {
    if at < from {
        return Err(MasterError::invalid_argument(format!(
            "{} starts at {}, after the current instant {}",
            id, from, at
        )));
    }
    Ok(())
}

/// Fail with a retryable conflict if `id` was committed after `now`
///
/// Correction instants come from the clock, so a row read inside the
/// transaction with a later `correction_from` was written by a concurrent
/// commit after this attempt drew its "now".
pub(crate) fn ensure_committed_before(
    now: Timestamp,
    correction_from: Timestamp,
    id: &UniqueId,
) -> MasterResult<()> {
    if now < correction_from {
        return Err(MasterError::write_conflict(format!(
            "{} committed at {}, after this attempt started at {}",
            id, correction_from, now
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{content, Content, ContentMapper, TestMaster};
    use crate::ManualClock;
    use docmaster_core::{Axis, Columns, RowIdSource, RowWrite};
    use parking_lot::Mutex;
    use std::time::Duration;

    type Race = Box<dyn FnOnce() + Send>;

    /// Runs a one-shot write between an update's read and its commit
    struct RacingMapper {
        race: Mutex<Option<Race>>,
    }

    impl RowMapper for RacingMapper {
        type Content = Content;

        fn to_columns(&self, content: &Content) -> MasterResult<Columns> {
            ContentMapper.to_columns(content)
        }

        fn from_columns(&self, columns: &Columns) -> MasterResult<Content> {
            ContentMapper.from_columns(columns)
        }

        fn merge_non_updated(&self, _new: &mut Content, _old: &Content) -> MasterResult<()> {
            if let Some(race) = self.race.lock().take() {
                race();
            }
            Ok(())
        }
    }

    fn racing_master(
        config: MasterConfig,
    ) -> (DocumentMaster<RacingMapper>, Arc<RowTable>, Arc<ManualClock>) {
        let storage = Arc::new(RowTable::new("race"));
        let clock = Arc::new(ManualClock::new(Timestamp::from_secs(1_000)));
        let master = DocumentMaster::builder(
            config,
            RacingMapper {
                race: Mutex::new(None),
            },
        )
        .storage(Arc::clone(&storage))
        .clock(clock.clone())
        .build()
        .unwrap();
        (master, storage, clock)
    }

    fn arm(master: &DocumentMaster<RacingMapper>, race: impl FnOnce() + Send + 'static) {
        *master.mapper().race.lock() = Some(Box::new(race));
    }

    /// A write that touches the object without changing what is current
    fn touch(storage: Arc<RowTable>, object_id: i64) -> impl FnOnce() + Send + 'static {
        move || {
            let mut row = Row::fully_open(
                storage.next_row_id().unwrap(),
                object_id,
                Timestamp::from_secs(1),
                Columns::new(),
            );
            row.correction_to = Timestamp::from_secs(2);
            let version = storage.current_version() + 1;
            storage.apply_batch(&[RowWrite::Insert(row)], version).unwrap();
        }
    }

    #[test]
    fn test_build_rejects_bad_config() {
        let err = DocumentMaster::in_memory(MasterConfig::new("bad~scheme"), ContentMapper)
            .unwrap_err();
        assert!(matches!(err, MasterError::Config { .. }));
    }

    #[test]
    fn test_one_master_per_storage() {
        let storage = Arc::new(RowTable::new("shared"));
        let build = || {
            DocumentMaster::builder(MasterConfig::new("DbTest"), ContentMapper)
                .storage(Arc::clone(&storage))
                .build()
        };
        let first = build().unwrap();
        let err = build().unwrap_err();
        assert!(matches!(err, MasterError::Config { .. }));

        drop(first);
        let second = build().unwrap();
        second.add(Document::new(content("a", 1))).unwrap();
    }

    #[test]
    fn test_conflict_is_retried() {
        let (master, storage, clock) = racing_master(MasterConfig::new("DbRace"));
        let v1 = master.add(Document::new(content("a", 1))).unwrap();
        clock.advance(Duration::from_secs(1));
        let oid = master.codec().extract_oid(v1.unique_id.as_ref().unwrap()).unwrap();
        arm(&master, touch(Arc::clone(&storage), oid));

        let v2 = master.update(v1).unwrap();
        assert!(v2.is_latest_version());
        assert_eq!(master.metrics().conflicts_retried, 1);
    }

    #[test]
    fn test_retry_sees_concurrent_update() {
        let (master, storage, clock) = racing_master(MasterConfig::new("DbRace"));
        let v1 = master.add(Document::new(content("a", 1))).unwrap();
        let id = v1.unique_id.clone().unwrap();
        let row_id = master.codec().extract_row_id(&id).unwrap();
        let at = clock.advance(Duration::from_secs(1));

        let racer = Arc::clone(&storage);
        arm(&master, move || {
            let close = RowWrite::Close {
                row_id,
                object_id: row_id,
                axis: Axis::Version,
                at,
            };
            let version = racer.current_version() + 1;
            racer.apply_batch(&[close], version).unwrap();
        });

        let err = master.update(v1).unwrap_err();
        assert!(matches!(err, MasterError::NotLatestVersion { .. }));
        assert_eq!(storage.len(), 1);
        assert_eq!(master.metrics().conflicts_retried, 1);
    }

    #[test]
    fn test_conflict_surfaces_without_retries() {
        let config = MasterConfig::new("DbRace").with_max_retries(0);
        let (master, storage, clock) = racing_master(config);
        let v1 = master.add(Document::new(content("a", 1))).unwrap();
        clock.advance(Duration::from_secs(1));
        let oid = master.codec().extract_oid(v1.unique_id.as_ref().unwrap()).unwrap();
        arm(&master, touch(Arc::clone(&storage), oid));

        let err = master.update(v1.clone()).unwrap_err();
        assert!(err.is_conflict());
        // nothing of the failed attempt was applied
        assert!(master.get(v1.unique_id.as_ref().unwrap()).unwrap().is_latest_version());
    }

    #[test]
    fn test_cancelled_context_stops_before_writing() {
        let t = TestMaster::new();
        let (context, handle) = CallContext::background().cancellable();
        handle.cancel();
        let err = t
            .master
            .with_context(&context)
            .add(Document::new(content("a", 1)))
            .unwrap_err();
        assert!(matches!(err, MasterError::Cancelled { .. }));
        assert_eq!(t.storage.len(), 0);
        assert!(t.events().is_empty());
    }

    #[test]
    fn test_expired_deadline() {
        let t = TestMaster::new();
        let added = t.master.add(Document::new(content("a", 1))).unwrap();
        let context = CallContext::background().with_timeout(Duration::ZERO);
        let err = t
            .master
            .with_context(&context)
            .get(added.unique_id.as_ref().unwrap())
            .unwrap_err();
        assert!(matches!(err, MasterError::DeadlineExceeded { .. }));
    }

    /// Lets a one-shot write commit just after the instant it hands out
    struct RacingClock {
        inner: ManualClock,
        race: Mutex<Option<Race>>,
    }

    impl Clock for RacingClock {
        fn now(&self) -> Timestamp {
            let race = self.race.lock().take();
            let reading = self.inner.now();
            if let Some(race) = race {
                self.inner.advance(Duration::from_micros(1));
                race();
            }
            reading
        }
    }

    #[test]
    fn test_remove_retries_past_update_committed_after_now() {
        let storage = Arc::new(RowTable::new("race"));
        let clock = Arc::new(RacingClock {
            inner: ManualClock::new(Timestamp::from_secs(1)),
            race: Mutex::new(None),
        });
        let master = Arc::new(
            DocumentMaster::builder(MasterConfig::new("DbTest"), ContentMapper)
                .storage(Arc::clone(&storage))
                .clock(clock.clone())
                .build()
                .unwrap(),
        );
        let v1 = master.add(Document::new(content("a", 1))).unwrap();
        clock.inner.set(Timestamp::from_secs(2));

        let racer = Arc::clone(&master);
        let stale = v1.clone();
        *clock.race.lock() = Some(Box::new(move || {
            let mut next = stale;
            next.content = content("a", 2);
            racer.update(next).unwrap();
        }));

        let latest = v1.unique_id.unwrap().to_latest();
        master.remove(&latest).unwrap();
        assert_eq!(master.metrics().conflicts_retried, 1);
        assert!(master.get(&latest).unwrap_err().is_not_found());

        let oid = master.codec().extract_oid(&latest).unwrap();
        let rows = storage.rows_of(oid);
        assert!(rows.iter().all(|r| !r.is_fully_open()));
        assert_eq!(rows.len(), 2);
    }

    #[test]
    fn test_metrics_count_calls_and_failures() {
        let t = TestMaster::new();
        let added = t.master.add(Document::new(content("a", 1))).unwrap();
        let id = added.unique_id.unwrap();
        t.master.get(&id).unwrap();
        t.master.remove(&id.to_latest()).unwrap();
        assert!(t.master.get(&id.to_latest()).is_err());

        let snapshot = t.master.metrics();
        let gets = snapshot.get(Operation::Get).unwrap();
        assert_eq!(gets.calls, 2);
        assert_eq!(gets.failures, 1);
        assert_eq!(snapshot.total_calls(), 4);
    }

    #[test]
    fn test_removed_listener_is_not_called() {
        let t = TestMaster::new();
        let calls = Arc::new(Mutex::new(0));
        let sink = Arc::clone(&calls);
        let listener: Arc<dyn ChangeListener> =
            Arc::new(move |_: &ChangeEvent| -> anyhow::Result<()> {
                *sink.lock() += 1;
                Ok(())
            });
        t.master.add_listener(Arc::clone(&listener));
        t.master.add(Document::new(content("a", 1))).unwrap();
        assert!(t.master.remove_listener(&listener));
        t.master.add(Document::new(content("b", 1))).unwrap();
        assert_eq!(*calls.lock(), 1);
    }
}
