//! Point-in-time resolution
//!
//! A versioned identifier names one row directly. An object identifier is
//! resolved against a [`VersionCorrection`]: "latest" components are pinned to
//! a single `now` first, then exactly one row may be visible at the resulting
//! coordinate.

use crate::master::ScopedMaster;
use crate::mapper::RowMapper;
use crate::metrics::Operation;
use crate::predicates;
use docmaster_core::{
    Document, MasterError, MasterResult, ObjectId, ObjectIdentifiable, Row, RowStorage,
    UniqueId, VersionCorrection,
};
use std::collections::HashMap;

impl<'a, M: RowMapper, S: RowStorage> ScopedMaster<'a, M, S> {
    /// Document by identifier
    ///
    /// A versioned identifier returns that exact row, whatever its intervals.
    /// An object identifier returns the latest version, latest correction.
    ///
    /// # Errors
    ///
    /// `SchemeMismatch`, `MalformedIdentifier`, or `NotFound`.
    pub fn get(&self, id: &UniqueId) -> MasterResult<Document<M::Content>> {
        self.observe(Operation::Get, id, || {
            self.master.codec.check_scheme(id)?;
            if id.is_versioned() {
                let row = self.load_row(Operation::Get, id)?;
                self.to_document(&row)
            } else {
                self.resolve(Operation::Get, &id.object_id(), VersionCorrection::LATEST)
            }
        })
    }

    /// Document visible at `vc`
    ///
    /// # Errors
    ///
    /// `SchemeMismatch`, `MalformedIdentifier`, or `NotFound` when nothing is
    /// visible at that coordinate.
    pub fn get_at(
        &self,
        object_id: &ObjectId,
        vc: VersionCorrection,
    ) -> MasterResult<Document<M::Content>> {
        self.observe(Operation::GetAt, object_id, || {
            self.resolve(Operation::GetAt, object_id, vc)
        })
    }

    /// Documents for many identifiers, keyed by the identifier asked for
    ///
    /// # Errors
    ///
    /// Fails as a whole if any identifier fails as in [`ScopedMaster::get`].
    pub fn get_many(
        &self,
        ids: &[UniqueId],
    ) -> MasterResult<HashMap<UniqueId, Document<M::Content>>> {
        let label = format!("{} ids", ids.len());
        self.observe(Operation::GetMany, &label, || {
            let mut found = HashMap::with_capacity(ids.len());
            for id in ids {
                self.master.codec.check_scheme(id)?;
                let document = if id.is_versioned() {
                    let row = self.load_row(Operation::GetMany, id)?;
                    self.to_document(&row)?
                } else {
                    self.resolve(Operation::GetMany, &id.object_id(), VersionCorrection::LATEST)?
                };
                found.insert(id.clone(), document);
            }
            Ok(found)
        })
    }

    /// Document visible at `vc`; `op` names the calling operation
    fn resolve(
        &self,
        op: Operation,
        object_id: &ObjectId,
        vc: VersionCorrection,
    ) -> MasterResult<Document<M::Content>> {
        let codec = &self.master.codec;
        codec.check_scheme(object_id)?;
        let oid = codec.extract_oid(object_id)?;
        let now = self.master.clock.now();
        let fixed = vc.with_latest_fixed(now);
        let version = fixed.version_as_of().unwrap_or(now);
        let correction = fixed.corrected_to().unwrap_or(now);

        self.context.check(op.as_str())?;
        let query = predicates::point_in_time(&self.master.table, oid, version, correction);
        let mut rows = self.master.storage.query(&query)?.value;
        match rows.len() {
            0 => Err(MasterError::not_found(
                "document",
                format!("{} at {}", object_id, vc),
            )),
            1 => {
                let row = rows.remove(0);
                self.to_document(&row)
            }
            n => Err(MasterError::internal(format!(
                "{} rows of {} visible at {}",
                n, object_id, fixed
            ))),
        }
    }

    /// Stored row named by a versioned identifier
    pub(crate) fn load_row(&self, op: Operation, id: &UniqueId) -> MasterResult<Row> {
        let codec = &self.master.codec;
        let oid = codec.extract_oid(id)?;
        let row_id = codec.extract_row_id(id)?;
        self.context.check(op.as_str())?;
        match self.master.storage.fetch_row(row_id)? {
            Some(stamped) if stamped.value.object_id == oid => Ok(stamped.value),
            _ => Err(MasterError::not_found("document", id)),
        }
    }
}
