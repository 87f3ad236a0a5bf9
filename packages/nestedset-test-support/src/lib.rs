//! Shared conformance suite for [`RecordStore`] backends.
//!
//! Every check starts from an empty store, seeds the same ten-node org chart and asserts the
//! exact boundary numbers, so memory, SQLite and Postgres backends are held to identical
//! behaviour. Checks panic on failure, like any test helper.

use std::collections::BTreeSet;
use std::sync::Once;

use nestedset_core::{
    Delta, Field, Filter, FindOptions, GroupKey, Maintenance, NestedSet, NestedSetOptions, Node,
    NodeId, QueryOptions, RecordStore, SkipReason, SortOrder,
};
use tracing_subscriber::EnvFilter;

/// Installs a test-captured `fmt` subscriber once per test binary. `RUST_LOG` overrides the default.
pub fn init_tracing() {
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new("nestedset_core=debug"));
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .with_ansi(false)
            .try_init();
    });
}

/// Ids of the org chart: michael at the root, meredith/jim/angela below, and their reports.
#[derive(Clone, Copy, Debug)]
pub struct Office {
    pub michael: NodeId,
    pub meredith: NodeId,
    pub kelly: NodeId,
    pub creed: NodeId,
    pub jim: NodeId,
    pub phyllis: NodeId,
    pub stanley: NodeId,
    pub dwight: NodeId,
    pub angela: NodeId,
    pub oscar: NodeId,
    /// Not seeded; used for insertions.
    pub joe: NodeId,
}

impl Office {
    /// Ids `base + 1 ..= base + 11`, so several charts can share a store.
    pub fn with_base(base: u128) -> Self {
        Self {
            michael: NodeId(base + 1),
            meredith: NodeId(base + 2),
            kelly: NodeId(base + 3),
            creed: NodeId(base + 4),
            jim: NodeId(base + 5),
            phyllis: NodeId(base + 6),
            stanley: NodeId(base + 7),
            dwight: NodeId(base + 8),
            angela: NodeId(base + 9),
            oscar: NodeId(base + 10),
            joe: NodeId(base + 11),
        }
    }

    /// Records in insertion order; sibling order follows it.
    pub fn nodes(&self, group: Option<&GroupKey>) -> Vec<Node> {
        let edges = [
            (self.michael, None),
            (self.meredith, Some(self.michael)),
            (self.jim, Some(self.michael)),
            (self.angela, Some(self.michael)),
            (self.kelly, Some(self.meredith)),
            (self.creed, Some(self.meredith)),
            (self.phyllis, Some(self.jim)),
            (self.stanley, Some(self.jim)),
            (self.dwight, Some(self.jim)),
            (self.oscar, Some(self.angela)),
        ];
        edges
            .into_iter()
            .map(|(id, parent)| {
                let node = match parent {
                    Some(p) => Node::child(id, p),
                    None => Node::root(id),
                };
                match group {
                    Some(g) => node.with_group(g.clone()),
                    None => node,
                }
            })
            .collect()
    }

    pub fn seed<S: RecordStore>(&self, store: &mut S, group: Option<&GroupKey>) {
        for node in self.nodes(group) {
            store.insert(node).expect("seed office node");
        }
    }

    /// Seeds and rebuilds from `michael` at 1.
    pub fn seed_built<S: RecordStore>(&self, set: &NestedSet, store: &mut S, group: Option<&GroupKey>) {
        self.seed(store, group);
        set.rebuild_tree(store, self.michael, 1).expect("rebuild office");
    }
}

pub fn get<S: RecordStore>(store: &S, id: NodeId) -> Node {
    store
        .find_by_id(id, &Filter::all())
        .expect("find_by_id")
        .unwrap_or_else(|| panic!("node {id} missing"))
}

pub fn bounds_of<S: RecordStore>(store: &S, id: NodeId) -> (u64, u64) {
    let node = get(store, id);
    (
        node.lft.unwrap_or_else(|| panic!("{id} has no lft")),
        node.rgt.unwrap_or_else(|| panic!("{id} has no rgt")),
    )
}

pub fn snapshot<S: RecordStore>(store: &S) -> Vec<Node> {
    store
        .find_many(&Filter::all(), &FindOptions::default())
        .expect("find_many")
}

pub fn id_set(nodes: &[Node]) -> BTreeSet<NodeId> {
    nodes.iter().map(|n| n.id).collect()
}

/// Every boundary value of the given nodes, sorted.
pub fn boundary_values(nodes: &[Node]) -> Vec<u64> {
    let mut values: Vec<u64> = nodes
        .iter()
        .filter_map(|n| n.bounds())
        .flat_map(|b| [b.lft, b.rgt])
        .collect();
    values.sort_unstable();
    values
}

pub fn check_rebuild_scenario<S: RecordStore>(store: &mut S) {
    let set = NestedSet::default();
    let o = Office::with_base(0);
    o.seed(store, None);

    let root = set.rebuild_tree(store, o.michael, 1).expect("rebuild");
    assert_eq!((root.lft, root.rgt, root.lvl), (Some(1), Some(20), 0));

    assert_eq!(bounds_of(store, o.michael), (1, 20));
    assert_eq!(bounds_of(store, o.meredith), (2, 7));
    assert_eq!(bounds_of(store, o.kelly), (3, 4));
    assert_eq!(bounds_of(store, o.creed), (5, 6));
    assert_eq!(bounds_of(store, o.jim), (8, 15));
    assert_eq!(bounds_of(store, o.phyllis), (9, 10));
    assert_eq!(bounds_of(store, o.stanley), (11, 12));
    assert_eq!(bounds_of(store, o.dwight), (13, 14));
    assert_eq!(bounds_of(store, o.angela), (16, 19));
    assert_eq!(bounds_of(store, o.oscar), (17, 18));

    assert_eq!(get(store, o.meredith).lvl, 1);
    assert_eq!(get(store, o.oscar).lvl, 2);
    assert_eq!(boundary_values(&snapshot(store)), (1..=20).collect::<Vec<_>>());
    set.validate_invariants(store, None).expect("invariants");
}

pub fn check_rebuild_is_idempotent<S: RecordStore>(store: &mut S) {
    let set = NestedSet::default();
    let o = Office::with_base(0);
    o.seed_built(&set, store, None);
    let first = snapshot(store);
    set.rebuild_tree(store, o.michael, 1).expect("second rebuild");
    assert_eq!(snapshot(store), first);

    assert!(matches!(
        set.rebuild_tree(store, NodeId(999), 1),
        Err(nestedset_core::Error::NotFound(NodeId(999)))
    ));
}

pub fn check_insert_scenario<S: RecordStore>(store: &mut S) {
    let set = NestedSet::default();
    let o = Office::with_base(0);
    o.seed_built(&set, store, None);
    let before = snapshot(store);

    let joe = set
        .create(store, Node::child(o.joe, o.creed))
        .expect("create joe");
    assert_eq!((joe.lft, joe.rgt, joe.lvl), (Some(6), Some(7), 3));

    assert_eq!(bounds_of(store, o.michael), (1, 22));
    assert_eq!(bounds_of(store, o.meredith), (2, 9));
    assert_eq!(bounds_of(store, o.kelly), (3, 4));
    assert_eq!(bounds_of(store, o.creed), (5, 8));
    assert_eq!(bounds_of(store, o.joe), (6, 7));
    assert_eq!(bounds_of(store, o.jim), (10, 17));
    assert_eq!(bounds_of(store, o.angela), (18, 21));
    assert_eq!(bounds_of(store, o.oscar), (19, 20));

    // Ancestors grow by exactly 2; every other boundary moves by 0 or 2.
    let ancestors = [o.michael, o.meredith, o.creed];
    for old in &before {
        let new = get(store, old.id);
        let (ob, nb) = (old.bounds().expect("built"), new.bounds().expect("built"));
        if ancestors.contains(&old.id) {
            assert_eq!(nb.rgt, ob.rgt + 2, "{} rgt", old.id);
        }
        for (o_val, n_val) in [(ob.lft, nb.lft), (ob.rgt, nb.rgt)] {
            assert!(n_val == o_val || n_val == o_val + 2, "{} moved by {}", old.id, n_val as i64 - o_val as i64);
        }
    }
    set.validate_invariants(store, None).expect("invariants");
}

pub fn check_remove_scenario<S: RecordStore>(store: &mut S) {
    let set = NestedSet::default();
    let o = Office::with_base(0);
    o.seed_built(&set, store, None);

    assert!(set.delete(store, o.creed).expect("delete creed"));
    assert!(store
        .find_by_id(o.creed, &Filter::all())
        .expect("find")
        .is_none());
    assert_eq!(bounds_of(store, o.michael), (1, 18));
    assert_eq!(bounds_of(store, o.meredith), (2, 5));
    assert_eq!(bounds_of(store, o.kelly), (3, 4));
    assert_eq!(bounds_of(store, o.jim), (6, 13));
    assert_eq!(bounds_of(store, o.angela), (14, 17));
    assert_eq!(bounds_of(store, o.oscar), (15, 16));
    assert_eq!(boundary_values(&snapshot(store)), (1..=18).collect::<Vec<_>>());
    set.validate_invariants(store, None).expect("invariants");
}

pub fn check_removal_inverts_insertion<S: RecordStore>(store: &mut S) {
    let set = NestedSet::default();
    let o = Office::with_base(0);
    o.seed_built(&set, store, None);
    let before = snapshot(store);

    for parent in [o.creed, o.jim, o.michael, o.oscar] {
        set.create(store, Node::child(o.joe, parent)).expect("create");
        set.validate_invariants(store, None).expect("invariants after insert");
        assert!(set.delete(store, o.joe).expect("delete"));
        assert_eq!(snapshot(store), before, "insert/remove under {parent}");
    }
}

pub fn check_query_agreement<S: RecordStore>(store: &mut S) {
    let set = NestedSet::default();
    let o = Office::with_base(0);
    o.seed_built(&set, store, None);
    let all = QueryOptions::default();

    let kelly = get(store, o.kelly);
    let michael = get(store, o.michael);
    let meredith = get(store, o.meredith);
    let jim = get(store, o.jim);
    let angela = get(store, o.angela);

    let q = set.query(store, &kelly);
    assert_eq!(id_set(&q.ancestors(&all).unwrap()), BTreeSet::from([o.meredith, o.michael]));
    assert_eq!(
        id_set(&q.self_and_ancestors(&all).unwrap()),
        BTreeSet::from([o.kelly, o.meredith, o.michael])
    );
    assert_eq!(q.parent().unwrap().map(|n| n.id), Some(o.meredith));
    assert_eq!(q.level().unwrap(), 2);
    assert!(q.is_leaf());
    assert!(q.is_child());
    assert!(q.is_descendant_of(&michael));
    assert!(!q.is_ancestor_of(&michael));

    let q = set.query(store, &michael);
    assert_eq!(q.level().unwrap(), 0);
    assert_eq!(q.parent().unwrap(), None);
    assert_eq!(q.descendants(&all).unwrap().len(), 9);
    assert_eq!(q.self_and_descendants(&all).unwrap().len(), 10);
    assert!(q.is_ancestor_of(&kelly));
    assert!(!q.is_child());

    let q = set.query(store, &meredith);
    assert_eq!(id_set(&q.siblings(&all).unwrap()), BTreeSet::from([o.jim, o.angela]));
    assert_eq!(
        id_set(&q.self_and_siblings(&all).unwrap()),
        BTreeSet::from([o.meredith, o.jim, o.angela])
    );
    assert_eq!(id_set(&q.descendants(&all).unwrap()), BTreeSet::from([o.kelly, o.creed]));

    let q = set.query(store, &jim);
    assert_eq!(
        id_set(&q.children(&all).unwrap()),
        BTreeSet::from([o.phyllis, o.stanley, o.dwight])
    );

    let q = set.query(store, &angela);
    assert_eq!(id_set(&q.self_and_children(&all).unwrap()), BTreeSet::from([o.angela, o.oscar]));

    // Leaf law: boundaries and parent pointers agree.
    for node in snapshot(store) {
        let q = set.query(store, &node);
        assert_eq!(q.is_leaf(), q.children(&all).unwrap().is_empty(), "{}", node.id);
    }
}

pub fn check_query_options<S: RecordStore>(store: &mut S) {
    let set = NestedSet::default();
    let o = Office::with_base(0);
    o.seed_built(&set, store, None);
    let michael = get(store, o.michael);
    let q = set.query(store, &michael);

    let managers = q
        .descendants(&QueryOptions::filtered(Filter::all().eq(Field::Lvl, 1u32)))
        .unwrap();
    assert_eq!(id_set(&managers), BTreeSet::from([o.meredith, o.jim, o.angela]));

    let page = q
        .descendants(&QueryOptions::default().with_find(
            FindOptions::default()
                .sorted_by(Field::Lft, SortOrder::Desc)
                .page(0, 2),
        ))
        .unwrap();
    assert_eq!(page.iter().map(|n| n.id).collect::<Vec<_>>(), vec![o.oscar, o.angela]);

    let skipped = q
        .descendants(&QueryOptions::default().with_find(
            FindOptions::default()
                .sorted_by(Field::Lft, SortOrder::Asc)
                .page(1, 2),
        ))
        .unwrap();
    assert_eq!(skipped.iter().map(|n| n.id).collect::<Vec<_>>(), vec![o.kelly, o.creed]);

    let projected = q
        .children(&QueryOptions::default().with_find(
            FindOptions::default()
                .sorted_by(Field::Lft, SortOrder::Asc)
                .project(vec![Field::Lft]),
        ))
        .unwrap();
    assert_eq!(projected.len(), 3);
    assert_eq!(projected[0].id, o.meredith);
    assert_eq!(projected[0].lft, Some(2));
    assert_eq!(projected[0].rgt, None);
    assert_eq!(projected[0].parent, None);
}

pub fn check_unbuilt_tree_is_inert<S: RecordStore>(store: &mut S) {
    let set = NestedSet::default();
    let o = Office::with_base(0);
    o.seed(store, None);

    let joe = set.create(store, Node::child(o.joe, o.jim)).expect("create");
    assert_eq!(joe.bounds(), None);
    assert!(snapshot(store).iter().all(|n| n.bounds().is_none()));

    let kelly = get(store, o.kelly);
    let q = set.query(store, &kelly);
    assert!(q.ancestors(&QueryOptions::default()).unwrap().is_empty());
    assert_eq!(q.level().unwrap(), 0);
    let jim = get(store, o.jim);
    assert_eq!(set.query(store, &jim).children(&QueryOptions::default()).unwrap().len(), 4);

    assert!(set.delete(store, o.joe).expect("delete"));
    assert!(snapshot(store).iter().all(|n| n.bounds().is_none()));

    // A rebuild makes the same chart usable.
    set.rebuild_tree(store, o.michael, 1).expect("rebuild");
    let mut late = Node::child(o.joe, o.angela);
    let outcome =
        nestedset_core::LifecycleHooks::before_create(&set, store, &mut late, |tx, n| {
            tx.insert(n.clone())
        })
        .expect("hook");
    assert!(!outcome.is_skipped());
    assert_eq!(late.bounds().map(|b| (b.lft, b.rgt)), Some((19, 20)));
    assert_eq!(bounds_of(store, o.joe), (19, 20));

    // A fresh child beside an unbuilt sibling stays unbuilt.
    store.insert(Node::child(NodeId(500), o.oscar)).expect("unbuilt child");
    let mut blocked = Node::child(NodeId(501), o.oscar);
    assert_eq!(
        nestedset_core::LifecycleHooks::before_create(&set, store, &mut blocked, |_, _| Ok(()))
            .expect("hook"),
        Maintenance::Skipped(SkipReason::SiblingUnbuilt)
    );
    assert_eq!(blocked.bounds(), None);
}

pub fn check_partition_isolation<S: RecordStore>(store: &mut S) {
    let set = NestedSet::new(NestedSetOptions::grouped());
    let a = GroupKey::from("dunder");
    let b = GroupKey::from("mifflin");
    let office_a = Office::with_base(0);
    let office_b = Office::with_base(100);
    office_a.seed_built(&set, store, Some(&a));
    office_b.seed_built(&set, store, Some(&b));
    assert_eq!(bounds_of(store, office_b.michael), (1, 20));

    set.create(store, Node::child(office_a.joe, office_a.creed).with_group(a.clone()))
        .expect("create in a");
    assert_eq!(bounds_of(store, office_a.michael), (1, 22));
    assert_eq!(bounds_of(store, office_b.michael), (1, 20));
    assert_eq!(bounds_of(store, office_b.jim), (8, 15));

    let kelly_b = get(store, office_b.kelly);
    let ancestors = set
        .query(store, &kelly_b)
        .ancestors(&QueryOptions::default())
        .unwrap();
    assert_eq!(id_set(&ancestors), BTreeSet::from([office_b.meredith, office_b.michael]));

    set.validate_invariants(store, Some(&a)).expect("a invariants");
    set.validate_invariants(store, Some(&b)).expect("b invariants");

    let next = set.rebuild_partition(store, Some(&b), 1).expect("rebuild b");
    assert_eq!(next, 21);
    assert_eq!(bounds_of(store, office_a.michael), (1, 22));
}

pub fn check_failed_create_rolls_back<S: RecordStore>(store: &mut S) {
    let set = NestedSet::default();
    let o = Office::with_base(0);
    o.seed_built(&set, store, None);
    let before = snapshot(store);

    // Kelly already exists: the shift runs, the insert fails, nothing may remain shifted.
    let err = set.create(store, Node::child(o.kelly, o.creed));
    assert!(err.is_err());
    assert_eq!(snapshot(store), before);
}

/// Runs every check, each against a fresh store from `fresh`.
/// A shift that would take a boundary below zero fails with `InconsistentState` and writes nothing.
pub fn check_shift_below_zero_is_rejected<S: RecordStore>(store: &mut S) {
    let mut node = Node::root(NodeId(1));
    node.lft = Some(1);
    node.rgt = Some(2);
    store.insert(node).expect("insert");

    let result = store.update_many(&Filter::all(), Delta::lft(-5));
    assert!(matches!(result, Err(nestedset_core::Error::InconsistentState(_))));
    assert_eq!(bounds_of(store, NodeId(1)), (1, 2));

    let result = store.update_many(&Filter::all(), Delta::rgt(-3));
    assert!(matches!(result, Err(nestedset_core::Error::InconsistentState(_))));
    assert_eq!(bounds_of(store, NodeId(1)), (1, 2));
}

pub fn run_conformance_suite<S: RecordStore>(mut fresh: impl FnMut() -> S) {
    init_tracing();
    check_rebuild_scenario(&mut fresh());
    check_rebuild_is_idempotent(&mut fresh());
    check_insert_scenario(&mut fresh());
    check_remove_scenario(&mut fresh());
    check_removal_inverts_insertion(&mut fresh());
    check_query_agreement(&mut fresh());
    check_query_options(&mut fresh());
    check_unbuilt_tree_is_inert(&mut fresh());
    check_partition_isolation(&mut fresh());
    check_failed_create_rolls_back(&mut fresh());
    check_shift_below_zero_is_rejected(&mut fresh());
}
