use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;

use nestedset_core::{Filter, NestedSet, Node, NodeId, RecordStore};
use nestedset_sqlite::SqliteRecordStore;
use nestedset_test_support::{init_tracing, run_conformance_suite, snapshot, Office};

#[test]
fn conformance_in_memory() {
    run_conformance_suite(|| SqliteRecordStore::new_in_memory().expect("in-memory sqlite"));
}

#[test]
fn conformance_on_disk() {
    let dir = tempfile::tempdir().expect("tempdir");
    let next = AtomicUsize::new(0);
    run_conformance_suite(|| {
        let n = next.fetch_add(1, Ordering::Relaxed);
        SqliteRecordStore::new(dir.path().join(format!("suite-{n}.db"))).expect("open sqlite file")
    });
}

#[test]
fn records_survive_reopen() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("office.db");
    let set = NestedSet::default();
    let office = Office::with_base(0);
    {
        let mut store = SqliteRecordStore::new(&path).unwrap();
        office.seed_built(&set, &mut store, None);
    }
    let store = SqliteRecordStore::new(&path).unwrap();
    assert_eq!(snapshot(&store).len(), 10);
    let michael = store
        .find_by_id(office.michael, &Filter::all())
        .unwrap()
        .unwrap();
    assert_eq!((michael.lft, michael.rgt), (Some(1), Some(20)));
}

#[test]
fn concurrent_connections_keep_boundaries_consistent() {
    init_tracing();
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("shared.db");
    let set = Arc::new(NestedSet::default());
    let office = Office::with_base(0);
    {
        let mut store = SqliteRecordStore::new(&path).unwrap();
        office.seed_built(&set, &mut store, None);
    }

    let parents = [office.kelly, office.phyllis, office.oscar, office.michael];
    let handles: Vec<_> = parents
        .into_iter()
        .enumerate()
        .map(|(worker, parent)| {
            let set = Arc::clone(&set);
            let path = path.clone();
            thread::spawn(move || {
                let mut store = SqliteRecordStore::new(&path).unwrap();
                for i in 0..10u128 {
                    let id = NodeId(1_000 + worker as u128 * 100 + i);
                    set.create(&mut store, Node::child(id, parent)).unwrap();
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    let store = SqliteRecordStore::new(&path).unwrap();
    set.validate_invariants(&store, None).unwrap();
    let root = store
        .find_by_id(office.michael, &Filter::all())
        .unwrap()
        .unwrap();
    assert_eq!((root.lft, root.rgt), (Some(1), Some(100)));
}
