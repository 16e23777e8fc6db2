//! Add, update, correct and remove
//!
//! Every mutation finds the row to close, closes one of its intervals and
//! inserts the replacement, all in one transaction. Rows are never deleted and
//! never rewritten apart from closing an open interval once.
//!
//! | Op | Closes | Inserts |
//! |----|--------|---------|
//! | add | nothing | `(now, +inf, now, +inf)` with a fresh object id |
//! | update | `version_to = now` | `(now, +inf, now, +inf)` |
//! | correct | `correction_to = now` | `(vf, vt, now, +inf)` |
//! | remove | `version_to = now` | nothing |
//!
//! Removing by object id also cuts current rows that are not open-ended: their
//! correction closes and the part before now is inserted again.

use crate::change::{ChangeEvent, ChangeType};
use crate::master::{ensure_committed_before, ensure_not_before, ScopedMaster};
use crate::mapper::RowMapper;
use crate::metrics::Operation;
use crate::predicates;
use docmaster_concurrency::TransactionContext;
use docmaster_core::{
    Axis, Document, MasterError, MasterResult, ObjectIdentifiable, Row, RowOrder, RowPredicate,
    RowStorage, Timestamp, UniqueId,
};

impl<'a, M: RowMapper, S: RowStorage> ScopedMaster<'a, M, S> {
    /// Store a new object
    ///
    /// The document must not carry an identifier. Returns it with identifier
    /// and intervals populated.
    ///
    /// # Errors
    ///
    /// `InvalidArgument` if the document already has an identifier.
    pub fn add(&self, document: Document<M::Content>) -> MasterResult<Document<M::Content>> {
        let label = "new";
        self.observe(Operation::Add, &label, || {
            if let Some(id) = &document.unique_id {
                return Err(MasterError::invalid_argument(format!(
                    "document to add already has identifier {}",
                    id
                )));
            }
            let columns = self.master.mapper.to_columns(&document.content)?;

            self.transact(Operation::Add, |txn, now| {
                let row_id = self.next_row_id()?;
                let row = Row::fully_open(row_id, row_id, now, columns.clone());
                txn.insert(row.clone())?;

                let added = self.document_for(&row, document.content.clone());
                let event = ChangeEvent {
                    change_type: ChangeType::Added,
                    object_id: self.master.codec.make_object_id(row_id),
                    before_id: None,
                    after_id: added.unique_id.clone(),
                    version_from: now,
                    version_to: Timestamp::MAX,
                    effective_instant: now,
                };
                Ok((added, Some(event)))
            })
        })
    }

    /// Supersede the latest version of an object
    ///
    /// `document.unique_id` must name the object's current row: latest
    /// version and latest correction. That row's version ends now and a new
    /// row starts now.
    ///
    /// # Errors
    ///
    /// `InvalidArgument` without a versioned identifier, `NotFound` if the
    /// row does not exist, `NotLatestVersion` if it has been superseded.
    pub fn update(&self, document: Document<M::Content>) -> MasterResult<Document<M::Content>> {
        let id = required_versioned_id(&document, "update")?;
        self.observe(Operation::Update, &id, || {
            self.master.codec.check_scheme(&id)?;

            self.transact(Operation::Update, |txn, now| {
                let old = self.fetch_for_update(txn, &id)?;
                if !old.is_fully_open() {
                    return Err(MasterError::NotLatestVersion { id: id.to_string() });
                }
                ensure_committed_before(now, old.correction_from, &id)?;
                ensure_not_before(now, old.version_from, &id)?;

                let mut content = document.content.clone();
                let previous = self.master.mapper.from_columns(&old.columns)?;
                self.master.mapper.merge_non_updated(&mut content, &previous)?;

                txn.close_version(&old, now)?;
                let row = Row::fully_open(
                    self.next_row_id()?,
                    old.object_id,
                    now,
                    self.master.mapper.to_columns(&content)?,
                );
                txn.insert(row.clone())?;

                let updated = self.document_for(&row, content);
                let event = ChangeEvent {
                    change_type: ChangeType::Updated,
                    object_id: id.object_id(),
                    before_id: Some(id.clone()),
                    after_id: updated.unique_id.clone(),
                    version_from: now,
                    version_to: Timestamp::MAX,
                    effective_instant: now,
                };
                Ok((updated, Some(event)))
            })
        })
    }

    /// Correct a version without changing its valid-time interval
    ///
    /// `document.unique_id` must name the latest correction of some version,
    /// which need not be the latest version.
    ///
    /// # Errors
    ///
    /// `InvalidArgument` without a versioned identifier, `NotFound` if the
    /// row does not exist, `NotLatestCorrection` if it has been corrected.
    pub fn correct(&self, document: Document<M::Content>) -> MasterResult<Document<M::Content>> {
        let id = required_versioned_id(&document, "correct")?;
        self.observe(Operation::Correct, &id, || {
            self.master.codec.check_scheme(&id)?;

            self.transact(Operation::Correct, |txn, now| {
                let old = self.fetch_for_update(txn, &id)?;
                if !old.is_latest_correction() {
                    return Err(MasterError::NotLatestCorrection { id: id.to_string() });
                }
                ensure_committed_before(now, old.correction_from, &id)?;

                let mut content = document.content.clone();
                let previous = self.master.mapper.from_columns(&old.columns)?;
                self.master.mapper.merge_non_updated(&mut content, &previous)?;

                txn.close_correction(&old, now)?;
                let row = Row {
                    row_id: self.next_row_id()?,
                    object_id: old.object_id,
                    version_from: old.version_from,
                    version_to: old.version_to,
                    correction_from: now,
                    correction_to: Timestamp::MAX,
                    columns: self.master.mapper.to_columns(&content)?,
                };
                txn.insert(row.clone())?;

                let corrected = self.document_for(&row, content);
                let event = ChangeEvent {
                    change_type: ChangeType::Corrected,
                    object_id: id.object_id(),
                    before_id: Some(id.clone()),
                    after_id: corrected.unique_id.clone(),
                    version_from: old.version_from,
                    version_to: old.version_to,
                    effective_instant: now,
                };
                Ok((corrected, Some(event)))
            })
        })
    }

    /// End the latest version of an object
    ///
    /// A versioned identifier must name the current row, whose version then
    /// ends now. An object identifier ends whatever is current from now on:
    /// an open row is closed in place, any other current row reaching past
    /// now is replaced by its part before now.
    ///
    /// # Errors
    ///
    /// `NotLatestVersion` for a superseded versioned identifier, `NotFound`
    /// if the row does not exist or the object is already removed.
    pub fn remove(&self, id: &UniqueId) -> MasterResult<()> {
        self.observe(Operation::Remove, id, || {
            let codec = &self.master.codec;
            codec.check_scheme(id)?;
            let oid = codec.extract_oid(id)?;

            self.transact(Operation::Remove, |txn, now| {
                let before_id = if id.is_versioned() {
                    let row = self.fetch_for_update(txn, id)?;
                    if !row.is_fully_open() {
                        return Err(MasterError::NotLatestVersion { id: id.to_string() });
                    }
                    let row_id = self.unique_id_of(&row);
                    ensure_committed_before(now, row.correction_from, &row_id)?;
                    ensure_not_before(now, row.version_from, &row_id)?;
                    txn.close_version(&row, now)?;
                    row_id
                } else {
                    self.end_current_rows(txn, oid, now)?
                        .ok_or_else(|| MasterError::not_found("document", id))?
                };

                let event = ChangeEvent {
                    change_type: ChangeType::Removed,
                    object_id: id.object_id(),
                    before_id: Some(before_id),
                    after_id: None,
                    version_from: now,
                    version_to: Timestamp::MAX,
                    effective_instant: now,
                };
                Ok(((), Some(event)))
            })
        })
    }

    /// Cut every current row of `oid` at `now`
    ///
    /// Returns the row that was visible at `now`, or the earliest later row,
    /// or `None` if nothing reaches past `now`.
    fn end_current_rows(
        &self,
        txn: &mut TransactionContext,
        oid: i64,
        now: Timestamp,
    ) -> MasterResult<Option<UniqueId>> {
        let query = predicates::current_rows(oid)
            .with(RowPredicate::Intersects {
                axis: Axis::Version,
                from: now,
                to: Timestamp::MAX,
            })
            .with_opt(self.master.table.extra_predicate())
            .ordered(RowOrder::OldestFirst);
        let rows = txn.query(self.master.storage.as_ref(), &query)?;

        for row in &rows {
            ensure_committed_before(now, row.correction_from, &self.unique_id_of(row))?;
            if row.is_fully_open() && row.version_from <= now {
                txn.close_version(row, now)?;
                continue;
            }
            txn.close_correction(row, now)?;
            if row.version_from < now {
                self.insert_trimmed(txn, row, row.version_from, now, now)?;
            }
        }
        Ok(rows.first().map(|row| self.unique_id_of(row)))
    }

    /// Row named by a versioned identifier, read inside the transaction
    pub(crate) fn fetch_for_update(
        &self,
        txn: &mut TransactionContext,
        id: &UniqueId,
    ) -> MasterResult<Row> {
        let codec = &self.master.codec;
        let oid = codec.extract_oid(id)?;
        let row_id = codec.extract_row_id(id)?;
        match txn.fetch_row(self.master.storage.as_ref(), row_id)? {
            Some(row) if row.object_id == oid => Ok(row),
            _ => Err(MasterError::not_found("document", id)),
        }
    }
}

/// Versioned identifier carried by a document
pub(crate) fn required_versioned_id<T>(
    document: &Document<T>,
    operation: &str,
) -> MasterResult<UniqueId> {
    match &document.unique_id {
        Some(id) if id.is_versioned() => Ok(id.clone()),
        Some(id) => Err(MasterError::invalid_argument(format!(
            "{} requires a versioned identifier, got {}",
            operation, id
        ))),
        None => Err(MasterError::invalid_argument(format!(
            "{} requires a document with an identifier",
            operation
        ))),
    }
}
