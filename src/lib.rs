//! Docmaster - bitemporal document master
//!
//! Stores versioned, correctable documents. Every document has a valid-time
//! interval (when the fact holds) and a correction interval (when the master
//! believed it). Nothing is deleted: updates, corrections and removals close
//! an interval and insert new rows.
//!
//! # Quick Start
//!
//! ```ignore
//! use docmaster::{Document, DocumentMaster, MasterConfig, SerdeMapper, VersionCorrection};
//!
//! let master = DocumentMaster::in_memory(MasterConfig::new("DbSec"), SerdeMapper::<Security>::new())?;
//! let added = master.add(Document::new(security))?;
//! let oid = added.unique_id.as_ref().unwrap().object_id();
//! let then = master.get_at(&oid, VersionCorrection::of_version_as_of(instant))?;
//! ```
//!
//! # Architecture
//!
//! - `docmaster-core`: identifiers, timestamps, rows, queries, errors
//! - `docmaster-storage`: the in-memory row table and its integrity checks
//! - `docmaster-concurrency`: optimistic transactions over the table
//! - `docmaster-engine`: the master itself

pub use docmaster_core::{
    Axis, CallContext, CancelHandle, Columns, Document, IdCodec, MasterError, MasterResult,
    ObjectId, ObjectIdentifiable, Paging, PagingRequest, Row, RowStorage, Timestamp, UniqueId,
    Value, VersionCorrection,
};
pub use docmaster_engine::*;
pub use docmaster_storage::RowTable;
