//! Deterministic master for unit tests

use crate::change::{ChangeEvent, ChangeType};
use crate::clock::ManualClock;
use crate::config::MasterConfig;
use crate::mapper::RowMapper;
use crate::master::DocumentMaster;
use docmaster_core::{Columns, MasterError, MasterResult, Timestamp, Value};
use docmaster_storage::RowTable;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Content {
    pub name: String,
    pub value: i64,
}

pub(crate) fn content(name: &str, value: i64) -> Content {
    Content {
        name: name.to_string(),
        value,
    }
}

/// Two plain columns; an empty name on update keeps the old name
pub(crate) struct ContentMapper;

impl RowMapper for ContentMapper {
    type Content = Content;

    fn to_columns(&self, content: &Content) -> MasterResult<Columns> {
        let mut columns = Columns::new();
        columns.insert("name".into(), Value::from(content.name.as_str()));
        columns.insert("value".into(), Value::Int(content.value));
        Ok(columns)
    }

    fn from_columns(&self, columns: &Columns) -> MasterResult<Content> {
        let name = columns
            .get("name")
            .and_then(Value::as_str)
            .ok_or_else(|| MasterError::serialization("missing name"))?;
        let value = columns
            .get("value")
            .and_then(Value::as_int)
            .ok_or_else(|| MasterError::serialization("missing value"))?;
        Ok(content(name, value))
    }

    fn merge_non_updated(&self, new: &mut Content, old: &Content) -> MasterResult<()> {
        if new.name.is_empty() {
            new.name = old.name.clone();
        }
        Ok(())
    }
}

pub(crate) struct TestMaster {
    pub master: DocumentMaster<ContentMapper>,
    pub clock: Arc<ManualClock>,
    pub storage: Arc<RowTable>,
    events: Arc<Mutex<Vec<ChangeType>>>,
    start: Timestamp,
}

impl TestMaster {
    pub fn new() -> Self {
        Self::with_config(MasterConfig::new("DbTest"))
    }

    pub fn with_config(config: MasterConfig) -> Self {
        let start = Timestamp::from_secs(1_700_000_000);
        let clock = Arc::new(ManualClock::new(start));
        let storage = Arc::new(RowTable::new("test_doc"));
        let events = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&events);

        let master = DocumentMaster::builder(config, ContentMapper)
            .storage(Arc::clone(&storage))
            .clock(clock.clone())
            .listener(Arc::new(move |e: &ChangeEvent| -> anyhow::Result<()> {
                sink.lock().push(e.change_type);
                Ok(())
            }))
            .build()
            .unwrap();

        TestMaster {
            master,
            clock,
            storage,
            events,
            start,
        }
    }

    pub fn start(&self) -> Timestamp {
        self.start
    }

    /// `start` plus whole seconds
    pub fn at(&self, secs: u64) -> Timestamp {
        self.start.saturating_add(Duration::from_secs(secs))
    }

    pub fn clock_now(&self) -> Timestamp {
        crate::clock::Clock::now(self.clock.as_ref())
    }

    pub fn events(&self) -> Vec<ChangeType> {
        self.events.lock().clone()
    }
}
