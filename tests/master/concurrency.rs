//! Racing writers
//!
//! Two callers holding the same versioned identifier write it at once. Each
//! call either commits or, retried or not, sees a row that is no longer the
//! latest and fails as stale instead of overwriting it.

use crate::common::*;
use docmaster::{Document, MasterError, MasterResult, ObjectIdentifiable};
use std::sync::{Arc, Barrier};
use std::thread;
use std::time::Duration;

/// Run two calls against one master from a shared starting line
///
/// Each thread moves the clock one microsecond before calling, so the two
/// calls may draw different instants and commit in either order.
fn race<A, B>(
    t: &TestMaster,
    a: impl FnOnce(&Master) -> MasterResult<A> + Send + 'static,
    b: impl FnOnce(&Master) -> MasterResult<B> + Send + 'static,
) -> (MasterResult<A>, MasterResult<B>)
where
    A: Send + 'static,
    B: Send + 'static,
{
    let barrier = Arc::new(Barrier::new(2));
    let shared = |barrier: Arc<Barrier>| (Arc::clone(&t.master), Arc::clone(&t.clock), barrier);

    let (master, clock, gate) = shared(Arc::clone(&barrier));
    let first = thread::spawn(move || {
        gate.wait();
        clock.advance(Duration::from_micros(1));
        a(master.as_ref())
    });
    let (master, clock, gate) = shared(barrier);
    let second = thread::spawn(move || {
        gate.wait();
        clock.advance(Duration::from_micros(1));
        b(master.as_ref())
    });
    (first.join().unwrap(), second.join().unwrap())
}

fn assert_ok_or_stale<T>(result: &MasterResult<T>) {
    if let Err(e) = result {
        assert!(e.is_stale(), "unexpected failure: {}", e);
    }
}

fn seeded(t: &TestMaster) -> Document<Named> {
    let base = t.master.add(named("A")).unwrap();
    t.clock.advance(secs(1));
    base
}

#[test]
fn racing_updates_have_one_winner() {
    for _ in 0..20 {
        let t = TestMaster::new();
        let base = t.master.add(named("A")).unwrap();
        t.clock.advance(secs(1));
        let barrier = Arc::new(Barrier::new(2));

        let handles: Vec<_> = ["B", "C"]
            .into_iter()
            .map(|name| {
                let master = Arc::clone(&t.master);
                let barrier = Arc::clone(&barrier);
                let mut doc = base.clone();
                doc.content.name = name.to_string();
                thread::spawn(move || {
                    barrier.wait();
                    master.update(doc)
                })
            })
            .collect();
        let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();

        let winners: Vec<_> = results.iter().filter_map(|r| r.as_ref().ok()).collect();
        assert_eq!(winners.len(), 1, "results: {:?}", results);
        let loser = results.iter().find_map(|r| r.as_ref().err()).unwrap();
        assert!(matches!(loser, MasterError::NotLatestVersion { .. }), "{}", loser);

        let oid = base.unique_id.as_ref().unwrap().object_id();
        let latest = t.master.get(&oid.at_latest()).unwrap();
        assert_eq!(latest.content, winners[0].content);
        assert_object_invariants(&t.storage.rows_of(t.oid_of(base.unique_id.as_ref().unwrap())));
        assert_eq!(t.storage.len(), 2);
    }
}

#[test]
fn parallel_objects_do_not_interfere() {
    let t = TestMaster::new();
    let barrier = Arc::new(Barrier::new(4));
    let handles: Vec<_> = (0..4)
        .map(|i| {
            let master = Arc::clone(&t.master);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                let mut doc = master.add(named(&format!("obj{}", i))).unwrap();
                for n in 0..10 {
                    doc.content.name = format!("obj{}-{}", i, n);
                    doc = master.correct(doc).unwrap();
                }
                doc
            })
        })
        .collect();

    for h in handles {
        let doc = h.join().unwrap();
        let id = doc.unique_id.unwrap();
        assert_eq!(t.master.get(&id.to_latest()).unwrap().content, doc.content);
        assert_object_invariants(&t.storage.rows_of(t.oid_of(&id)));
    }
    assert_eq!(t.storage.object_count(), 4);
    assert_eq!(t.master.metrics().conflicts_retried, 0);
}

#[test]
fn remove_racing_update_always_removes() {
    for _ in 0..50 {
        let t = TestMaster::new();
        let base = seeded(&t);
        let id = base.unique_id.clone().unwrap();
        let latest = id.to_latest();

        let mut next = base.clone();
        next.content.name = "B".to_string();
        let removed = latest.clone();
        let (updated, removal) = race(&t, move |m| m.update(next), move |m| m.remove(&removed));

        assert!(removal.is_ok(), "remove failed: {:?}", removal);
        assert_ok_or_stale(&updated);
        if let Err(e) = &updated {
            assert!(matches!(e, MasterError::NotLatestVersion { .. }), "{}", e);
        }
        assert!(t.master.get(&latest).unwrap_err().is_not_found());
        assert_object_invariants(&t.storage.rows_of(t.oid_of(&id)));
    }
}

#[test]
fn correct_racing_update_never_loses_a_write() {
    for _ in 0..50 {
        let t = TestMaster::new();
        let base = seeded(&t);
        let id = base.unique_id.clone().unwrap();

        let mut next = base.clone();
        next.content.name = "B".to_string();
        let mut fix = base.clone();
        fix.content.name = "A'".to_string();
        let (updated, corrected) = race(&t, move |m| m.update(next), move |m| m.correct(fix));

        assert_ok_or_stale(&updated);
        assert_ok_or_stale(&corrected);
        assert!(updated.is_ok() || corrected.is_ok());

        let latest = t.master.get(&id.to_latest()).unwrap();
        match &updated {
            Ok(doc) => assert_eq!(latest.content, doc.content),
            Err(_) => assert_eq!(latest.content.name, "A'"),
        }
        let rows = t.storage.rows_of(t.oid_of(&id));
        assert_at_most_one_open(&rows);
        assert_object_invariants(&rows);
    }
}

#[test]
fn racing_corrections_have_one_winner() {
    for _ in 0..20 {
        let t = TestMaster::new();
        let base = seeded(&t);
        let id = base.unique_id.clone().unwrap();

        let mut a = base.clone();
        a.content.name = "B".to_string();
        let mut b = base.clone();
        b.content.name = "C".to_string();
        let (first, second) = race(&t, move |m| m.correct(a), move |m| m.correct(b));

        assert_ok_or_stale(&first);
        assert_ok_or_stale(&second);
        assert!(first.is_ok() != second.is_ok(), "{:?} / {:?}", first, second);
        let loser = first.as_ref().err().or(second.as_ref().err()).unwrap();
        assert!(matches!(loser, MasterError::NotLatestCorrection { .. }), "{}", loser);
        assert_object_invariants(&t.storage.rows_of(t.oid_of(&id)));
    }
}
