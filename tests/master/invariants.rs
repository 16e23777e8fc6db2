//! Interval invariants under random mutation sequences
//!
//! Whatever sequence of calls is made, for every object:
//! - at most one row is open on both axes
//! - at every correction instant the visible versions do not overlap
//! - paged history concatenates to the unpaged history

use crate::common::*;
use docmaster::{
    Document, HistoryRequest, MasterError, ObjectId, ObjectIdentifiable, PagingRequest,
};
use proptest::prelude::*;

#[derive(Debug, Clone)]
enum Op {
    Add(String),
    Update(usize, String),
    CorrectLatest(usize, String),
    CorrectOldest(usize, String),
    Remove(usize),
    AddVersion(usize, u64, String),
    ReplaceVersions(usize, u64, u64, String),
    RemoveOldestVersion(usize),
    Advance(u64),
}

fn name() -> impl Strategy<Value = String> {
    "[a-z]{1,6}"
}

fn op() -> impl Strategy<Value = Op> {
    prop_oneof![
        2 => name().prop_map(Op::Add),
        3 => (0usize..4, name()).prop_map(|(i, n)| Op::Update(i, n)),
        2 => (0usize..4, name()).prop_map(|(i, n)| Op::CorrectLatest(i, n)),
        1 => (0usize..4, name()).prop_map(|(i, n)| Op::CorrectOldest(i, n)),
        1 => (0usize..4).prop_map(Op::Remove),
        1 => (0usize..4, 0u64..60, name()).prop_map(|(i, at, n)| Op::AddVersion(i, at, n)),
        1 => (0usize..4, 0u64..60, 1u64..20, name())
            .prop_map(|(i, at, len, n)| Op::ReplaceVersions(i, at, len, n)),
        1 => (0usize..4).prop_map(Op::RemoveOldestVersion),
        3 => (0u64..4).prop_map(Op::Advance),
    ]
}

/// Errors a well-formed call may legitimately return
fn expected(err: &MasterError) -> bool {
    err.is_not_found() || err.is_stale() || matches!(err, MasterError::InvalidArgument { .. })
}

fn history(t: &TestMaster, oid: &ObjectId) -> Vec<Document<Named>> {
    t.master
        .history(&HistoryRequest::new(oid.clone()))
        .unwrap()
        .documents
}

fn pick(objects: &[ObjectId], i: usize) -> Option<ObjectId> {
    objects.get(i % objects.len().max(1)).cloned()
}

fn apply(t: &TestMaster, objects: &mut Vec<ObjectId>, op: &Op) -> Result<(), MasterError> {
    match op {
        Op::Add(n) => {
            let added = t.master.add(named(n))?;
            objects.push(added.unique_id.unwrap().object_id());
        }
        Op::Update(i, n) => {
            if let Some(oid) = pick(objects, *i) {
                let mut doc = t.master.get(&oid.at_latest())?;
                doc.content.name = n.clone();
                t.master.update(doc)?;
            }
        }
        Op::CorrectLatest(i, n) => {
            if let Some(oid) = pick(objects, *i) {
                let mut doc = t.master.get(&oid.at_latest())?;
                doc.content.name = n.clone();
                t.master.correct(doc)?;
            }
        }
        Op::CorrectOldest(i, n) => {
            if let Some(oid) = pick(objects, *i) {
                let oldest = history(t, &oid)
                    .into_iter()
                    .filter(|d| d.is_latest_correction())
                    .last();
                if let Some(mut doc) = oldest {
                    doc.content.name = n.clone();
                    t.master.correct(doc)?;
                }
            }
        }
        Op::Remove(i) => {
            if let Some(oid) = pick(objects, *i) {
                t.master.remove(&oid.at_latest())?;
            }
        }
        Op::AddVersion(i, at, n) => {
            if let Some(oid) = pick(objects, *i) {
                let doc = named(n).with_version_from(t.t(*at));
                t.master.add_version(&oid, doc)?;
            }
        }
        Op::ReplaceVersions(i, at, len, n) => {
            if let Some(oid) = pick(objects, *i) {
                let doc = named(n)
                    .with_version_from(t.t(*at))
                    .with_version_to(t.t(at + len));
                t.master.replace_versions(&oid, vec![doc])?;
            }
        }
        Op::RemoveOldestVersion(i) => {
            if let Some(oid) = pick(objects, *i) {
                let oldest = history(t, &oid)
                    .into_iter()
                    .filter(|d| d.is_latest_correction())
                    .last();
                if let Some(id) = oldest.and_then(|d| d.unique_id) {
                    t.master.remove_version(&id)?;
                }
            }
        }
        Op::Advance(s) => {
            t.clock.advance(secs(*s));
        }
    }
    Ok(())
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn random_sequences_keep_intervals_consistent(ops in prop::collection::vec(op(), 1..40)) {
        let t = TestMaster::new();
        let mut objects = Vec::new();

        for op in &ops {
            if let Err(e) = apply(&t, &mut objects, op) {
                prop_assert!(expected(&e), "{:?} failed unexpectedly: {}", op, e);
            }
        }

        for oid in &objects {
            let rows = t.storage.rows_of(t.master.codec().extract_oid(oid).unwrap());
            assert_object_invariants(&rows);
        }
    }

    #[test]
    fn paged_history_concatenates(updates in 1usize..12, page_size in 1usize..5) {
        let t = TestMaster::new();
        let mut doc = t.master.add(named("v0")).unwrap();
        for i in 0..updates {
            t.clock.advance(secs(1));
            doc.content.name = format!("v{}", i + 1);
            doc = if i % 3 == 2 {
                t.master.correct(doc).unwrap()
            } else {
                t.master.update(doc).unwrap()
            };
        }
        let oid = doc.unique_id.unwrap().object_id();
        let full = history(&t, &oid);

        let mut paged = Vec::new();
        let mut page = 1;
        loop {
            let request = HistoryRequest::new(oid.clone())
                .paging(PagingRequest::of_page(page, page_size).unwrap());
            let result = t.master.history(&request).unwrap();
            prop_assert_eq!(result.paging.total_items(), full.len());
            if result.documents.is_empty() {
                break;
            }
            paged.extend(result.documents);
            page += 1;
        }
        prop_assert_eq!(paged, full);
    }
}
