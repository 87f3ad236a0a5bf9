use nestedset_core::{
    Error, Filter, LifecycleHooks, Maintenance, MemoryRecordStore, NestedSet, NestedSetOptions,
    Node, NodeId, RecordStore, SkipReason,
};
use nestedset_test_support::{bounds_of, get, run_conformance_suite, Office};

#[test]
fn memory_store_conformance() {
    run_conformance_suite(MemoryRecordStore::new);
}

#[test]
fn self_parent_is_rejected() {
    let set = NestedSet::default();
    let mut store = MemoryRecordStore::new();
    let office = Office::with_base(0);
    office.seed_built(&set, &mut store, None);

    let err = set
        .create(&mut store, Node::child(office.joe, office.joe))
        .unwrap_err();
    assert!(matches!(err, Error::InvalidOperation(_)));
    assert_eq!(bounds_of(&store, office.michael), (1, 20));
}

#[test]
fn missing_parent_is_not_found() {
    let set = NestedSet::default();
    let mut store = MemoryRecordStore::new();
    Office::with_base(0).seed_built(&set, &mut store, None);

    let err = set
        .create(&mut store, Node::child(NodeId(77), NodeId(404)))
        .unwrap_err();
    assert!(matches!(err, Error::NotFound(NodeId(404))));
    assert!(store.find_by_id(NodeId(77), &Filter::all()).unwrap().is_none());
}

#[test]
fn root_level_nodes_wait_for_rebuild() {
    let set = NestedSet::default();
    let mut store = MemoryRecordStore::new();
    let office = Office::with_base(0);
    office.seed_built(&set, &mut store, None);

    let mut second_root = Node::root(NodeId(50));
    assert_eq!(
        set.before_create(&mut store, &mut second_root, |tx, n| tx.insert(n.clone()))
            .unwrap(),
        Maintenance::Skipped(SkipReason::RootLevel)
    );
    assert_eq!(get(&store, NodeId(50)).bounds(), None);

    let next = set.rebuild_partition(&mut store, None, 1).unwrap();
    assert_eq!(next, 23);
    assert_eq!(bounds_of(&store, office.michael), (1, 20));
    assert_eq!(bounds_of(&store, NodeId(50)), (21, 22));
    set.validate_invariants(&store, None).unwrap();
}

#[test]
fn rebuild_can_keep_stored_levels() {
    let set = NestedSet::new(NestedSetOptions::default().with_rebuild_levels(false));
    let mut store = MemoryRecordStore::new();
    let office = Office::with_base(0);
    office.seed_built(&set, &mut store, None);

    assert_eq!(bounds_of(&store, office.angela), (16, 19));
    assert_eq!(get(&store, office.oscar).lvl, 0);

    // Incremental maintenance still derives the level from the parent.
    let joe = set
        .create(&mut store, Node::child(office.joe, office.oscar))
        .unwrap();
    assert_eq!(joe.lvl, 1);
}

#[test]
fn rebuild_from_an_inner_node_uses_given_start() {
    let set = NestedSet::default();
    let mut store = MemoryRecordStore::new();
    let office = Office::with_base(0);
    office.seed(&mut store, None);

    let jim = set.rebuild_tree(&mut store, office.jim, 100).unwrap();
    assert_eq!((jim.lft, jim.rgt), (Some(100), Some(107)));
    assert_eq!(bounds_of(&store, office.stanley), (103, 104));
    assert_eq!(get(&store, office.michael).bounds(), None);
}

#[test]
fn removing_a_non_trailing_leaf_leaves_work_for_rebuild() {
    let set = NestedSet::default();
    let mut store = MemoryRecordStore::new();
    let office = Office::with_base(0);
    office.seed_built(&set, &mut store, None);

    // The slot closed is the one after Jim's last child, not Phyllis's own.
    assert!(set.delete(&mut store, office.phyllis).unwrap());
    assert_eq!(bounds_of(&store, office.jim), (8, 13));
    assert_eq!(bounds_of(&store, office.dwight), (13, 14));
    assert_eq!(bounds_of(&store, office.michael), (1, 18));
    assert!(matches!(
        set.validate_invariants(&store, None),
        Err(Error::InconsistentState(_))
    ));

    set.rebuild_tree(&mut store, office.michael, 1).unwrap();
    set.validate_invariants(&store, None).unwrap();
    assert_eq!(bounds_of(&store, office.stanley), (9, 10));
    assert_eq!(bounds_of(&store, office.dwight), (11, 12));
}

#[test]
fn rebuild_reports_cycles() {
    let set = NestedSet::default();
    let a = Node::child(NodeId(1), NodeId(2));
    let b = Node::child(NodeId(2), NodeId(1));
    let mut store = MemoryRecordStore::with_nodes([a, b]).unwrap();
    assert!(matches!(
        set.rebuild_tree(&mut store, NodeId(1), 1),
        Err(Error::InconsistentState(_))
    ));
}
