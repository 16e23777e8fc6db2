//! Storage layer for the document master
//!
//! This crate implements an in-memory bitemporal row table with:
//! - RowTable: BTreeMap-based rows behind a `parking_lot::RwLock`
//! - Per-object index with modification stamps for conflict detection
//! - RowSequence: atomic row-id source
//! - Integrity checks that make every write batch all-or-nothing

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod integrity;
pub mod sequence;
pub mod table;

pub use sequence::RowSequence;
pub use table::RowTable;
