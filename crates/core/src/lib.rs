//! Core types and traits for the bitemporal document master
//!
//! This crate defines the foundational types used throughout the workspace:
//! - MasterError: error taxonomy shared by every layer
//! - Timestamp: instants on either time axis, with the open-ended sentinel
//! - ObjectId / UniqueId and the IdCodec that maps them to row keys
//! - VersionCorrection: bitemporal query coordinate
//! - Document: content envelope with identifier and intervals
//! - PagingRequest / Paging
//! - Row, RowQuery, RowPredicate: the storage-facing row model
//! - RowStorage / RowIdSource: storage traits
//! - CallContext: per-call deadline and cancellation

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod codec;
pub mod context;
pub mod document;
pub mod error;
pub mod ids;
pub mod paging;
pub mod query;
pub mod row;
pub mod timestamp;
pub mod traits;
pub mod value;
pub mod version_correction;

pub use codec::IdCodec;
pub use context::{CallContext, CancelHandle};
pub use document::Document;
pub use error::{MasterError, MasterResult};
pub use ids::{ObjectId, ObjectIdentifiable, UniqueId};
pub use paging::{Paging, PagingRequest};
pub use query::{RowComparator, RowFilter, RowOrder, RowPredicate, RowQuery};
pub use row::{Axis, Row};
pub use timestamp::Timestamp;
pub use traits::{ApplyResult, RowIdSource, RowStorage, RowWrite, Stamped};
pub use value::{Columns, Value};
pub use version_correction::VersionCorrection;
