//! Rewriting valid-time history
//!
//! These operations rewrite the versions of an object over some valid-time
//! range. Nothing is deleted: every affected row has its correction closed
//! at `now` and the new picture is inserted as rows whose correction starts at
//! `now`. Replacement documents are chained in `version_from` order, each one
//! ending where the next begins.

use crate::change::{ChangeEvent, ChangeType};
use crate::master::{ensure_committed_before, ScopedMaster};
use crate::mapper::RowMapper;
use crate::metrics::Operation;
use crate::mutation::required_versioned_id;
use crate::predicates;
use docmaster_concurrency::TransactionContext;
use docmaster_core::{
    Axis, Document, MasterError, MasterResult, ObjectId, ObjectIdentifiable, Row, RowPredicate,
    RowQuery, RowStorage, Timestamp, UniqueId,
};
use std::collections::BTreeSet;

/// Replacement content with its resolved start
struct Replacement<'d, T> {
    version_from: Timestamp,
    content: &'d T,
}

impl<'a, M: RowMapper, S: RowStorage> ScopedMaster<'a, M, S> {
    /// Replace one stored version with a chain of versions
    ///
    /// The row must be the latest correction of its version. Replacements
    /// must start at distinct instants inside the row's valid-time interval,
    /// the earliest exactly at its start. A single replacement may omit
    /// `version_from`. An empty list removes the version, see
    /// [`ScopedMaster::remove_version`].
    ///
    /// Returns the identifiers of the inserted rows, earliest first.
    ///
    /// # Errors
    ///
    /// `NotFound`, `NotLatestCorrection`, or `InvalidArgument` for
    /// replacements that do not fit the stored interval.
    pub fn replace_version(
        &self,
        id: &UniqueId,
        replacements: Vec<Document<M::Content>>,
    ) -> MasterResult<Vec<UniqueId>> {
        self.observe(Operation::ReplaceVersion, id, || {
            self.replace_one(Operation::ReplaceVersion, id, &replacements)
        })
    }

    /// Replace the version named by `document.unique_id` with `document`
    ///
    /// # Errors
    ///
    /// As [`ScopedMaster::replace_version`]; `InvalidArgument` without a
    /// versioned identifier.
    pub fn replace_version_document(
        &self,
        document: Document<M::Content>,
    ) -> MasterResult<UniqueId> {
        let id = required_versioned_id(&document, "replace_version")?;
        self.observe(Operation::ReplaceVersion, &id, || {
            let ids = self.replace_one(Operation::ReplaceVersion, &id, std::slice::from_ref(&document))?;
            ids.into_iter()
                .next()
                .ok_or_else(|| MasterError::internal("replacement inserted no row"))
        })
    }

    /// Remove one version from valid-time history
    ///
    /// The previous version, if any, is extended over the removed interval.
    /// Otherwise the interval is left empty.
    ///
    /// # Errors
    ///
    /// `NotFound` or `NotLatestCorrection`.
    pub fn remove_version(&self, id: &UniqueId) -> MasterResult<()> {
        self.observe(Operation::RemoveVersion, id, || {
            self.replace_one(Operation::RemoveVersion, id, &[]).map(|_| ())
        })
    }

    /// Replace whatever is current over a valid-time range
    ///
    /// The range runs from the earliest `version_from` to the last
    /// replacement's `version_to` (open-ended if unset). Current rows sticking
    /// out of the range keep their outside parts. An empty list does nothing.
    ///
    /// # Errors
    ///
    /// `NotFound` for an object without rows; `InvalidArgument` for missing
    /// or duplicate `version_from`s or an empty range.
    pub fn replace_versions(
        &self,
        object_id: &ObjectId,
        replacements: Vec<Document<M::Content>>,
    ) -> MasterResult<Vec<UniqueId>> {
        self.observe(Operation::ReplaceVersions, object_id, || {
            self.replace_range(Operation::ReplaceVersions, object_id, &replacements, false)
        })
    }

    /// Insert one version, ending where the next current version starts
    ///
    /// A set `version_to` is used as is.
    ///
    /// # Errors
    ///
    /// As [`ScopedMaster::replace_versions`].
    pub fn add_version(
        &self,
        object_id: &ObjectId,
        document: Document<M::Content>,
    ) -> MasterResult<UniqueId> {
        self.observe(Operation::AddVersion, object_id, || {
            let ids = self.replace_range(
                Operation::AddVersion,
                object_id,
                std::slice::from_ref(&document),
                true,
            )?;
            ids.into_iter()
                .next()
                .ok_or_else(|| MasterError::internal("add_version inserted no row"))
        })
    }

    /// Replace every current version of an object
    ///
    /// An empty list leaves nothing current: the object is removed from
    /// every point of valid time.
    ///
    /// # Errors
    ///
    /// `NotFound` for an object without rows; `InvalidArgument` for missing
    /// or duplicate `version_from`s.
    pub fn replace_all_versions(
        &self,
        object_id: &ObjectId,
        replacements: Vec<Document<M::Content>>,
    ) -> MasterResult<Vec<UniqueId>> {
        self.observe(Operation::ReplaceAllVersions, object_id, || {
            let codec = &self.master.codec;
            codec.check_scheme(object_id)?;
            let oid = codec.extract_oid(object_id)?;
            let chain = ordered_replacements(&replacements)?;
            let upper = chain_end(&replacements).unwrap_or(Timestamp::MAX);
            if let Some(last) = chain.last() {
                ensure_range(last.version_from, upper)?;
            }

            self.transact(Operation::ReplaceAllVersions, |txn, now| {
                self.require_rows(txn, oid, object_id)?;
                let current = txn.query(
                    self.master.storage.as_ref(),
                    &predicates::current_rows(oid),
                )?;
                for row in &current {
                    ensure_committed_before(now, row.correction_from, &self.unique_id_of(row))?;
                    txn.close_correction(row, now)?;
                }

                let inserted = self.insert_chain(txn, oid, &chain, upper, now)?;
                let earliest = current.iter().map(|r| r.version_from).min();
                let event = match (inserted.first(), chain.first()) {
                    (Some(first), Some(start)) => ChangeEvent {
                        change_type: ChangeType::Updated,
                        object_id: object_id.clone(),
                        before_id: None,
                        after_id: Some(first.clone()),
                        version_from: start.version_from,
                        version_to: upper,
                        effective_instant: now,
                    },
                    _ => ChangeEvent {
                        change_type: ChangeType::Removed,
                        object_id: object_id.clone(),
                        before_id: None,
                        after_id: None,
                        version_from: earliest.unwrap_or(now),
                        version_to: Timestamp::MAX,
                        effective_instant: now,
                    },
                };
                Ok((inserted, Some(event)))
            })
        })
    }

    fn replace_one(
        &self,
        op: Operation,
        id: &UniqueId,
        replacements: &[Document<M::Content>],
    ) -> MasterResult<Vec<UniqueId>> {
        self.master.codec.check_scheme(id)?;
        if !id.is_versioned() {
            return Err(MasterError::invalid_argument(format!(
                "{} requires a versioned identifier, got {}",
                op, id
            )));
        }

        self.transact(op, |txn, now| {
            let stored = self.fetch_for_update(txn, id)?;
            if !stored.is_latest_correction() {
                return Err(MasterError::NotLatestCorrection { id: id.to_string() });
            }
            ensure_committed_before(now, stored.correction_from, id)?;

            if replacements.is_empty() {
                return self.drop_version(txn, id, &stored, now);
            }

            let chain = fitted_replacements(replacements, &stored, id)?;
            txn.close_correction(&stored, now)?;
            let inserted = self.insert_chain(txn, stored.object_id, &chain, stored.version_to, now)?;
            let event = ChangeEvent {
                change_type: ChangeType::Updated,
                object_id: id.object_id(),
                before_id: Some(id.clone()),
                after_id: inserted.first().cloned(),
                version_from: stored.version_from,
                version_to: stored.version_to,
                effective_instant: now,
            };
            Ok((inserted, Some(event)))
        })
    }

    /// Close `stored` and stretch the version before it, if any, over its gap
    fn drop_version(
        &self,
        txn: &mut TransactionContext,
        id: &UniqueId,
        stored: &Row,
        now: Timestamp,
    ) -> MasterResult<(Vec<UniqueId>, Option<ChangeEvent>)> {
        let before = predicates::current_rows(stored.object_id).with(RowPredicate::EndsAt {
            axis: Axis::Version,
            instant: stored.version_from,
        });
        let previous = txn
            .query(self.master.storage.as_ref(), &before)?
            .into_iter()
            .find(|r| r.row_id != stored.row_id);

        txn.close_correction(stored, now)?;

        let Some(previous) = previous else {
            let event = ChangeEvent {
                change_type: ChangeType::Removed,
                object_id: id.object_id(),
                before_id: Some(id.clone()),
                after_id: None,
                version_from: stored.version_from,
                version_to: stored.version_to,
                effective_instant: now,
            };
            return Ok((Vec::new(), Some(event)));
        };

        ensure_committed_before(now, previous.correction_from, &self.unique_id_of(&previous))?;
        txn.close_correction(&previous, now)?;
        let extended = Row {
            row_id: self.next_row_id()?,
            object_id: previous.object_id,
            version_from: previous.version_from,
            version_to: stored.version_to,
            correction_from: now,
            correction_to: Timestamp::MAX,
            columns: previous.columns.clone(),
        };
        txn.insert(extended.clone())?;

        let extended_id = self.unique_id_of(&extended);
        let event = ChangeEvent {
            change_type: ChangeType::Updated,
            object_id: id.object_id(),
            before_id: Some(id.clone()),
            after_id: Some(extended_id.clone()),
            version_from: previous.version_from,
            version_to: stored.version_to,
            effective_instant: now,
        };
        Ok((vec![extended_id], Some(event)))
    }

    fn replace_range(
        &self,
        op: Operation,
        object_id: &ObjectId,
        replacements: &[Document<M::Content>],
        end_at_next_version: bool,
    ) -> MasterResult<Vec<UniqueId>> {
        let codec = &self.master.codec;
        codec.check_scheme(object_id)?;
        let oid = codec.extract_oid(object_id)?;
        if replacements.is_empty() {
            return Ok(Vec::new());
        }
        let chain = ordered_replacements(replacements)?;
        let (lowest, highest) = match (chain.first(), chain.last()) {
            (Some(first), Some(last)) => (first.version_from, last.version_from),
            _ => return Ok(Vec::new()),
        };
        let explicit_end = chain_end(replacements);

        self.transact(op, |txn, now| {
            self.require_rows(txn, oid, object_id)?;
            let storage = self.master.storage.as_ref();

            let upper = match explicit_end {
                Some(end) => end,
                None if end_at_next_version => txn
                    .query(storage, &predicates::current_rows(oid))?
                    .iter()
                    .filter(|r| r.version_from < r.version_to)
                    .map(|r| r.version_from)
                    .filter(|vf| *vf > highest)
                    .min()
                    .unwrap_or(Timestamp::MAX),
                None => Timestamp::MAX,
            };
            ensure_range(highest, upper)?;

            let overlapped = predicates::current_rows(oid).with(RowPredicate::Intersects {
                axis: Axis::Version,
                from: lowest,
                to: upper,
            });
            for row in txn.query(storage, &overlapped)? {
                let row_id = self.unique_id_of(&row);
                ensure_committed_before(now, row.correction_from, &row_id)?;
                txn.close_correction(&row, now)?;
                if row.version_from < lowest {
                    self.insert_trimmed(txn, &row, row.version_from, lowest, now)?;
                }
                if row.version_to > upper {
                    self.insert_trimmed(txn, &row, upper, row.version_to, now)?;
                }
            }

            let inserted = self.insert_chain(txn, oid, &chain, upper, now)?;
            let event = ChangeEvent {
                change_type: ChangeType::Updated,
                object_id: object_id.clone(),
                before_id: None,
                after_id: inserted.first().cloned(),
                version_from: lowest,
                version_to: upper,
                effective_instant: now,
            };
            Ok((inserted, Some(event)))
        })
    }

    fn require_rows(
        &self,
        txn: &mut TransactionContext,
        oid: i64,
        object_id: &ObjectId,
    ) -> MasterResult<()> {
        if txn.count(self.master.storage.as_ref(), &RowQuery::for_object(oid))? == 0 {
            return Err(MasterError::not_found("document", object_id));
        }
        Ok(())
    }

    /// Re-insert part of a row as a new correction
    pub(crate) fn insert_trimmed(
        &self,
        txn: &mut TransactionContext,
        row: &Row,
        from: Timestamp,
        to: Timestamp,
        now: Timestamp,
    ) -> MasterResult<()> {
        txn.insert(Row {
            row_id: self.next_row_id()?,
            object_id: row.object_id,
            version_from: from,
            version_to: to,
            correction_from: now,
            correction_to: Timestamp::MAX,
            columns: row.columns.clone(),
        })
    }

    /// Insert replacements chained up to `end`
    fn insert_chain(
        &self,
        txn: &mut TransactionContext,
        oid: i64,
        chain: &[Replacement<'_, M::Content>],
        end: Timestamp,
        now: Timestamp,
    ) -> MasterResult<Vec<UniqueId>> {
        let mut ids = Vec::with_capacity(chain.len());
        for (i, replacement) in chain.iter().enumerate() {
            let version_to = chain.get(i + 1).map_or(end, |next| next.version_from);
            let row = Row {
                row_id: self.next_row_id()?,
                object_id: oid,
                version_from: replacement.version_from,
                version_to,
                correction_from: now,
                correction_to: Timestamp::MAX,
                columns: self.master.mapper.to_columns(replacement.content)?,
            };
            ids.push(self.unique_id_of(&row));
            txn.insert(row)?;
        }
        Ok(ids)
    }
}

/// Replacements sorted by `version_from`; every start required and distinct
fn ordered_replacements<T>(documents: &[Document<T>]) -> MasterResult<Vec<Replacement<'_, T>>> {
    let mut seen = BTreeSet::new();
    let mut chain = Vec::with_capacity(documents.len());
    for document in documents {
        let version_from = document.version_from.ok_or_else(|| {
            MasterError::invalid_argument("every replacement needs a version_from")
        })?;
        if !seen.insert(version_from) {
            return Err(MasterError::invalid_argument(format!(
                "two replacements start at {}",
                version_from
            )));
        }
        chain.push(Replacement {
            version_from,
            content: &document.content,
        });
    }
    chain.sort_by_key(|r| r.version_from);
    Ok(chain)
}

/// Replacements for one stored row, checked against its valid-time interval
fn fitted_replacements<'d, T>(
    documents: &'d [Document<T>],
    stored: &Row,
    id: &UniqueId,
) -> MasterResult<Vec<Replacement<'d, T>>> {
    let chain = match documents {
        [only] if only.version_from.is_none() => vec![Replacement {
            version_from: stored.version_from,
            content: &only.content,
        }],
        _ => ordered_replacements(documents)?,
    };

    if chain.first().map(|r| r.version_from) != Some(stored.version_from) {
        return Err(MasterError::invalid_argument(format!(
            "replacements of {} must start at its version_from {}",
            id, stored.version_from
        )));
    }
    if let Some(outside) = chain.iter().find(|r| r.version_from >= stored.version_to) {
        return Err(MasterError::invalid_argument(format!(
            "replacement starting at {} lies outside {} (ends {})",
            outside.version_from, id, stored.version_to
        )));
    }
    Ok(chain)
}

/// `version_to` of the latest-starting replacement, if it set one
fn chain_end<T>(documents: &[Document<T>]) -> Option<Timestamp> {
    documents
        .iter()
        .filter_map(|d| d.version_from.map(|vf| (vf, d.version_to)))
        .max_by_key(|(vf, _)| *vf)
        .and_then(|(_, vt)| vt)
}

fn ensure_range(last_start: Timestamp, end: Timestamp) -> MasterResult<()> {
    if end <= last_start {
        return Err(MasterError::invalid_argument(format!(
            "replacements end at {}, not after the last start {}",
            end, last_start
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use crate::test_support::{content, Content, TestMaster};
    use crate::ChangeType;
    use docmaster_core::{
        Document, MasterError, ObjectId, ObjectIdentifiable, UniqueId, VersionCorrection,
    };
    use std::time::Duration;

    /// Versions `1` over `[+0, +10)` and `2` from `+10`; the clock stands at `+20`
    struct Fixture {
        t: TestMaster,
        first: UniqueId,
        second: UniqueId,
        oid: ObjectId,
    }

    fn fixture() -> Fixture {
        let t = TestMaster::new();
        let v1 = t.master.add(Document::new(content("a", 1))).unwrap();
        t.clock.advance(Duration::from_secs(10));
        let mut next = v1.clone();
        next.content = content("a", 2);
        let v2 = t.master.update(next).unwrap();
        t.clock.advance(Duration::from_secs(10));
        let first = v1.unique_id.unwrap();
        let oid = first.object_id();
        Fixture {
            t,
            first,
            second: v2.unique_id.unwrap(),
            oid,
        }
    }

    impl Fixture {
        fn value_at(&self, secs: u64) -> Option<i64> {
            let vc = VersionCorrection::of_version_as_of(self.t.at(secs));
            match self.t.master.get_at(&self.oid, vc) {
                Ok(doc) => Some(doc.content.value),
                Err(e) if e.is_not_found() => None,
                Err(e) => panic!("unexpected error {}", e),
            }
        }

        fn doc(&self, value: i64, from: u64) -> Document<Content> {
            Document::new(content("r", value)).with_version_from(self.t.at(from))
        }
    }

    #[test]
    fn test_replace_version_with_chain() {
        let f = fixture();
        let ids = f
            .t
            .master
            .replace_version(&f.first, vec![f.doc(20, 5), f.doc(10, 0)])
            .unwrap();
        assert_eq!(ids.len(), 2);
        assert_eq!(f.value_at(3), Some(10));
        assert_eq!(f.value_at(7), Some(20));
        assert_eq!(f.value_at(12), Some(2));

        // the replaced row is still there, only its correction closed
        let old = f.t.master.get(&f.first).unwrap();
        assert!(!old.is_latest_correction());
        assert_eq!(f.t.events().last(), Some(&ChangeType::Updated));

        // as known before the replacement
        let before = VersionCorrection::of(Some(f.t.at(3)), Some(f.t.at(15)));
        assert_eq!(f.t.master.get_at(&f.oid, before).unwrap().content.value, 1);
    }

    #[test]
    fn test_replace_version_rejects_misfits() {
        let f = fixture();
        let err = f
            .t
            .master
            .replace_version(&f.first, vec![f.doc(10, 2)])
            .unwrap_err();
        assert!(matches!(err, MasterError::InvalidArgument { .. }));

        let err = f
            .t
            .master
            .replace_version(&f.first, vec![f.doc(10, 0), f.doc(11, 10)])
            .unwrap_err();
        assert!(matches!(err, MasterError::InvalidArgument { .. }));

        let err = f
            .t
            .master
            .replace_version(&f.first.to_latest(), vec![f.doc(10, 0)])
            .unwrap_err();
        assert!(matches!(err, MasterError::InvalidArgument { .. }));
        assert_eq!(f.value_at(3), Some(1));
    }

    #[test]
    fn test_replace_version_document_keeps_interval() {
        let f = fixture();
        let mut doc = f.t.master.get(&f.first).unwrap();
        doc.content = content("a", 100);
        let id = f.t.master.replace_version_document(doc).unwrap();

        let replaced = f.t.master.get(&id).unwrap();
        assert_eq!(replaced.version_from, Some(f.t.at(0)));
        assert_eq!(replaced.version_to, Some(f.t.at(10)));
        assert_eq!(f.value_at(5), Some(100));

        // the old row is no longer the latest correction
        let mut stale = f.t.master.get(&f.first).unwrap();
        stale.content = content("a", 101);
        let err = f.t.master.replace_version_document(stale).unwrap_err();
        assert!(matches!(err, MasterError::NotLatestCorrection { .. }));
    }

    #[test]
    fn test_remove_version_extends_previous() {
        let f = fixture();
        f.t.master.remove_version(&f.second).unwrap();
        assert_eq!(f.value_at(12), Some(1));
        assert_eq!(f.t.master.get(&f.oid.at_latest()).unwrap().content.value, 1);
        assert_eq!(f.t.events().last(), Some(&ChangeType::Updated));
    }

    #[test]
    fn test_remove_first_version_leaves_gap() {
        let f = fixture();
        f.t.master.remove_version(&f.first).unwrap();
        assert_eq!(f.value_at(5), None);
        assert_eq!(f.value_at(12), Some(2));
        assert_eq!(f.t.events().last(), Some(&ChangeType::Removed));

        let err = f.t.master.remove_version(&f.first).unwrap_err();
        assert!(matches!(err, MasterError::NotLatestCorrection { .. }));
    }

    #[test]
    fn test_replace_versions_trims_overlapped_rows() {
        let f = fixture();
        let doc = f.doc(50, 5).with_version_to(f.t.at(15));
        f.t.master.replace_versions(&f.oid, vec![doc]).unwrap();
        assert_eq!(f.value_at(3), Some(1));
        assert_eq!(f.value_at(7), Some(50));
        assert_eq!(f.value_at(12), Some(50));
        assert_eq!(f.value_at(16), Some(2));
    }

    #[test]
    fn test_replace_versions_open_ended() {
        let f = fixture();
        f.t
            .master
            .replace_versions(&f.oid, vec![f.doc(60, 8), f.doc(50, 4)])
            .unwrap();
        assert_eq!(f.value_at(2), Some(1));
        assert_eq!(f.value_at(5), Some(50));
        assert_eq!(f.value_at(9), Some(60));
        assert_eq!(f.value_at(30), Some(60));
    }

    #[test]
    fn test_replace_versions_rejects_bad_input() {
        let f = fixture();
        let master = &f.t.master;

        let no_start = Document::new(content("r", 1));
        assert!(matches!(
            master.replace_versions(&f.oid, vec![no_start]).unwrap_err(),
            MasterError::InvalidArgument { .. }
        ));
        assert!(matches!(
            master
                .replace_versions(&f.oid, vec![f.doc(1, 5), f.doc(2, 5)])
                .unwrap_err(),
            MasterError::InvalidArgument { .. }
        ));
        let backwards = f.doc(1, 5).with_version_to(f.t.at(5));
        assert!(matches!(
            master.replace_versions(&f.oid, vec![backwards]).unwrap_err(),
            MasterError::InvalidArgument { .. }
        ));

        let unknown = ObjectId::of("DbTest", "777777").unwrap();
        assert!(master
            .replace_versions(&unknown, vec![f.doc(1, 5)])
            .unwrap_err()
            .is_not_found());
        assert!(master.replace_versions(&f.oid, Vec::new()).unwrap().is_empty());
    }

    #[test]
    fn test_add_version_ends_at_next_version() {
        let f = fixture();
        let id = f.t.master.add_version(&f.oid, f.doc(70, 5)).unwrap();
        let added = f.t.master.get(&id).unwrap();
        assert_eq!(added.version_to, Some(f.t.at(10)));
        assert_eq!(f.value_at(3), Some(1));
        assert_eq!(f.value_at(7), Some(70));
        assert_eq!(f.value_at(12), Some(2));
    }

    #[test]
    fn test_add_version_after_latest_is_open_ended() {
        let f = fixture();
        let id = f.t.master.add_version(&f.oid, f.doc(80, 30)).unwrap();
        assert!(f.t.master.get(&id).unwrap().is_latest_version());
        assert_eq!(f.value_at(15), Some(2));
        assert_eq!(f.value_at(40), Some(80));
    }

    #[test]
    fn test_replace_all_versions() {
        let f = fixture();
        f.t
            .master
            .replace_all_versions(&f.oid, vec![f.doc(90, 0)])
            .unwrap();
        assert_eq!(f.value_at(3), Some(90));
        assert_eq!(f.value_at(12), Some(90));
        assert_eq!(f.t.events().last(), Some(&ChangeType::Updated));
    }

    #[test]
    fn test_replace_all_versions_with_nothing_removes() {
        let f = fixture();
        let ids = f.t.master.replace_all_versions(&f.oid, Vec::new()).unwrap();
        assert!(ids.is_empty());
        assert_eq!(f.value_at(3), None);
        assert!(f
            .t
            .master
            .get(&f.oid.at_latest())
            .unwrap_err()
            .is_not_found());
        assert_eq!(f.t.events().last(), Some(&ChangeType::Removed));
        // rows are kept
        assert_eq!(f.t.storage.len(), 2);
    }
}
