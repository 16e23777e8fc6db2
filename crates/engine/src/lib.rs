//! Bitemporal document master engine
//!
//! This crate orchestrates all lower layers:
//! - DocumentMaster: the master, built from config, mapper, table and clock
//! - Point-in-time resolution and history queries
//! - Mutations (add, update, correct, remove) and the replace-version family,
//!   each one retrying OCC transaction
//! - Change notification after commit
//! - Configuration, clock, metrics
//!
//! The engine is the only component that knows about:
//! - Identifier schemes and the document envelope
//! - "now" and the open-ended sentinel on both time axes
//! - Retry on write conflicts

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod change;
pub mod clock;
pub mod config;
pub mod history;
pub mod mapper;
pub mod master;
pub mod metrics;
mod mutation;
mod predicates;
mod replace;
mod resolver;
pub mod retry;
pub mod table;

#[cfg(test)]
pub(crate) mod test_support;

pub use change::{ChangeEvent, ChangeListener, ChangeManager, ChangeType};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::MasterConfig;
pub use history::{HistoryRequest, HistoryResult};
pub use mapper::{RowMapper, SerdeMapper};
pub use master::{DocumentMaster, MasterBuilder, ScopedMaster};
pub use metrics::{MetricsSnapshot, Operation, OperationStats};
pub use retry::RetryConfig;
pub use table::TableLayout;
