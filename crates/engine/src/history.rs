//! History queries
//!
//! Lists the rows of one object filtered on either time axis, newest first,
//! one page at a time.

use crate::master::ScopedMaster;
use crate::mapper::RowMapper;
use crate::metrics::Operation;
use crate::predicates;
use docmaster_core::{
    Document, MasterResult, ObjectId, Paging, PagingRequest, RowStorage, Timestamp,
};

/// What to list
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryRequest {
    /// Object whose rows are listed
    pub object_id: ObjectId,
    /// Lower bound on the valid-time axis
    pub versions_from: Option<Timestamp>,
    /// Upper bound on the valid-time axis
    pub versions_to: Option<Timestamp>,
    /// Lower bound on the transaction-time axis
    pub corrections_from: Option<Timestamp>,
    /// Upper bound on the transaction-time axis
    pub corrections_to: Option<Timestamp>,
    /// Page to return
    pub paging: PagingRequest,
}

impl HistoryRequest {
    /// Every row of the object
    pub fn new(object_id: ObjectId) -> Self {
        HistoryRequest {
            object_id,
            versions_from: None,
            versions_to: None,
            corrections_from: None,
            corrections_to: None,
            paging: PagingRequest::ALL,
        }
    }

    /// Restrict the valid-time axis; equal bounds select one instant
    pub fn versions(mut self, from: Option<Timestamp>, to: Option<Timestamp>) -> Self {
        self.versions_from = from;
        self.versions_to = to;
        self
    }

    /// Restrict the transaction-time axis; equal bounds select one instant
    pub fn corrections(mut self, from: Option<Timestamp>, to: Option<Timestamp>) -> Self {
        self.corrections_from = from;
        self.corrections_to = to;
        self
    }

    /// Select a page
    pub fn paging(mut self, paging: PagingRequest) -> Self {
        self.paging = paging;
        self
    }
}

/// One page of history
#[derive(Debug, Clone, PartialEq)]
pub struct HistoryResult<T> {
    /// Documents on this page, newest first
    pub documents: Vec<Document<T>>,
    /// Page request and total number of matching rows
    pub paging: Paging,
}

impl<T> HistoryResult<T> {
    /// First document on the page
    pub fn first(&self) -> Option<&Document<T>> {
        self.documents.first()
    }
}

impl<'a, M: RowMapper, S: RowStorage> ScopedMaster<'a, M, S> {
    /// Rows of an object matching the request, newest first
    ///
    /// # Errors
    ///
    /// `SchemeMismatch` or `MalformedIdentifier` for a foreign identifier.
    /// An object without rows yields an empty page, not `NotFound`.
    pub fn history(&self, request: &HistoryRequest) -> MasterResult<HistoryResult<M::Content>> {
        self.observe(Operation::History, &request.object_id, || {
            let codec = &self.master.codec;
            codec.check_scheme(&request.object_id)?;
            let oid = codec.extract_oid(&request.object_id)?;
            let query = predicates::history(
                &self.master.table,
                oid,
                (request.versions_from, request.versions_to),
                (request.corrections_from, request.corrections_to),
            );
            let storage = &self.master.storage;
            let op = Operation::History.as_str();

            let (rows, total) = if request.paging.is_all() {
                self.context.check(op)?;
                let rows = storage.query(&query)?.value;
                let total = rows.len();
                (rows, total)
            } else {
                self.context.check(op)?;
                let total = storage.count(&query)?.value;
                if total == 0 || request.paging.is_none() {
                    (Vec::new(), total)
                } else {
                    self.context.check(op)?;
                    let window = query.windowed(
                        request.paging.first_item(),
                        request.paging.paging_size(),
                    );
                    (storage.query(&window)?.value, total)
                }
            };

            let documents = rows
                .iter()
                .map(|row| self.to_document(row))
                .collect::<MasterResult<Vec<_>>>()?;
            Ok(HistoryResult {
                documents,
                paging: Paging::new(request.paging, total),
            })
        })
    }
}
