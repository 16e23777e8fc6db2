//! Worked scenarios
//!
//! One object walked through add, update, correct, remove and history, with
//! the clock at T0 = 0s, T1 = 10s, T2 = 20s, T3 = 30s.

use crate::common::*;
use docmaster::{
    ChangeType, Document, HistoryRequest, MasterConfig, MasterError, ObjectId,
    ObjectIdentifiable, PagingRequest, Timestamp, UniqueId, VersionCorrection,
};

struct Walk {
    t: TestMaster,
    oid: ObjectId,
    u1: UniqueId,
    u2: UniqueId,
    u3: UniqueId,
}

/// Steps 1 to 4
fn walk() -> Walk {
    let t = TestMaster::new();

    t.set_time(0);
    let d1 = t.master.add(named("A")).unwrap();
    let u1 = d1.unique_id.clone().unwrap();

    t.set_time(10);
    let mut next = d1;
    next.content.name = "B".into();
    let d2 = t.master.update(next).unwrap();
    let u2 = d2.unique_id.clone().unwrap();

    t.set_time(20);
    let mut fix = d2;
    fix.content.name = "B-fixed".into();
    let d3 = t.master.correct(fix).unwrap();
    let u3 = d3.unique_id.clone().unwrap();

    t.set_time(30);
    t.master.remove(&u3).unwrap();

    let oid = u1.object_id();
    Walk { t, oid, u1, u2, u3 }
}

#[test]
fn add_then_get() {
    let t = TestMaster::new();
    let added = t.master.add(named("A")).unwrap();
    assert_eq!(added.version_from, Some(t.t(0)));
    assert_eq!(added.version_to, Some(Timestamp::MAX));
    let id = added.unique_id.unwrap();
    assert_eq!(t.master.get(&id).unwrap().content.name, "A");
}

#[test]
fn update_keeps_the_past_visible() {
    let w = walk();
    let stored = w.t.master.get(&w.u1).unwrap();
    assert_eq!(stored.version_to, Some(w.t.t(10)));

    let u2 = w.t.master.get(&w.u2).unwrap();
    assert_eq!(w.u2.object_id(), w.oid);
    assert_ne!(w.u1, w.u2);
    assert_eq!(u2.version_from, Some(w.t.t(10)));

    let past = VersionCorrection::of_version_as_of(w.t.t(5));
    assert_eq!(w.t.name_at(&w.oid, past).as_deref(), Some("A"));
}

#[test]
fn correction_keeps_the_uncorrected_view() {
    let w = walk();
    let u2 = w.t.master.get(&w.u2).unwrap();
    let u3 = w.t.master.get(&w.u3).unwrap();
    assert_eq!(u2.correction_to, Some(w.t.t(20)));
    assert_eq!(u3.version_from, u2.version_from);
    assert_eq!(u3.correction_from, Some(w.t.t(20)));

    // as believed at T1.5, and now, both before the removal
    let at = w.t.t(25);
    let before_fix = VersionCorrection::of(Some(at), Some(w.t.t(15)));
    assert_eq!(w.t.name_at(&w.oid, before_fix).as_deref(), Some("B"));
    let after_fix = VersionCorrection::of_version_as_of(at);
    assert_eq!(w.t.name_at(&w.oid, after_fix).as_deref(), Some("B-fixed"));
}

#[test]
fn removal_keeps_history() {
    let w = walk();
    assert_eq!(w.t.name_at(&w.oid, VersionCorrection::LATEST), None);
    let err = w.t.master.get(&w.oid.at_latest()).unwrap_err();
    assert!(matches!(err, MasterError::NotFound { .. }));

    let earlier = VersionCorrection::of_version_as_of(w.t.t(25));
    assert_eq!(w.t.name_at(&w.oid, earlier).as_deref(), Some("B-fixed"));

    assert_eq!(
        w.t.change_types(),
        vec![
            ChangeType::Added,
            ChangeType::Updated,
            ChangeType::Corrected,
            ChangeType::Removed
        ]
    );
    let removed = w.t.events().pop().unwrap();
    assert_eq!(removed.before_id, Some(w.u3.clone()));
    assert_eq!(removed.effective_instant, w.t.t(30));
}

#[test]
fn history_lists_every_row_newest_first() {
    let w = walk();
    let all = w.t.master.history(&HistoryRequest::new(w.oid.clone())).unwrap();
    assert_eq!(all.documents.len(), all.paging.total_items());
    let ids: Vec<UniqueId> = all
        .documents
        .iter()
        .filter_map(|d| d.unique_id.clone())
        .collect();
    assert_eq!(ids, vec![w.u3.clone(), w.u2.clone(), w.u1.clone()]);

    let mut paged = Vec::new();
    for page in 1..=2 {
        let request = HistoryRequest::new(w.oid.clone())
            .paging(PagingRequest::of_page(page, 2).unwrap());
        paged.extend(w.t.master.history(&request).unwrap().documents);
    }
    assert_eq!(paged, all.documents);
}

#[test]
fn stale_correct_is_rejected_without_writes() {
    let w = walk();
    let rows = w.t.storage.len();
    let stale = w.t.master.get(&w.u2).unwrap();
    let err = w.t.master.correct(stale).unwrap_err();
    assert!(matches!(err, MasterError::NotLatestCorrection { .. }));
    assert_eq!(w.t.storage.len(), rows);
}

#[test]
fn invariants_hold_after_the_walk() {
    let w = walk();
    let rows = w.t.storage.rows_of(w.t.oid_of(&w.u1));
    assert_eq!(rows.len(), 3);
    assert_object_invariants(&rows);
}

#[test]
fn master_from_toml_config() {
    let config = MasterConfig::from_toml_str(
        r#"
        scheme = "DbToml"
        max_retries = 3
        "#,
    )
    .unwrap();
    let t = TestMaster::with_config(config);
    let added = t.master.add(Document::new(Named { name: "x".into() })).unwrap();
    assert_eq!(added.unique_id.unwrap().scheme(), "DbToml");
    assert_eq!(t.master.config().max_retries, 3);
}
