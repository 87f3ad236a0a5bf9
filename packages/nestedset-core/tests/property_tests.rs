use std::collections::{BTreeSet, HashMap};

use proptest::prelude::*;
use proptest::sample::Index;

use nestedset_core::{
    Filter, FindOptions, MemoryRecordStore, NestedSet, Node, NodeId, QueryOptions, RecordStore,
};

/// Parent choice per node: `None` makes a root, `Some(i)` picks among the earlier nodes.
fn forest_shape() -> impl Strategy<Value = Vec<Option<Index>>> {
    prop::collection::vec(prop::option::weighted(0.85, any::<Index>()), 1..40)
}

fn build_forest(shape: &[Option<Index>]) -> Vec<Node> {
    shape
        .iter()
        .enumerate()
        .map(|(i, parent)| {
            let id = NodeId(i as u128 + 1);
            match parent {
                Some(index) if i > 0 => Node::child(id, NodeId(index.index(i) as u128 + 1)),
                _ => Node::root(id),
            }
        })
        .collect()
}

fn all_nodes(store: &MemoryRecordStore) -> Vec<Node> {
    store.find_many(&Filter::all(), &FindOptions::default()).unwrap()
}

fn parent_chain(nodes: &HashMap<NodeId, Node>, id: NodeId) -> BTreeSet<NodeId> {
    let mut out = BTreeSet::new();
    let mut cursor = nodes[&id].parent;
    while let Some(parent) = cursor {
        out.insert(parent);
        cursor = nodes[&parent].parent;
    }
    out
}

proptest! {
    #[test]
    fn rebuild_uses_each_boundary_once(shape in forest_shape(), start in 1u64..1_000) {
        let nodes = build_forest(&shape);
        let mut store = MemoryRecordStore::with_nodes(nodes.clone()).unwrap();
        let set = NestedSet::default();

        let next = set.rebuild_partition(&mut store, None, start).unwrap();
        let n = nodes.len() as u64;
        prop_assert_eq!(next, start + 2 * n);

        let mut values: Vec<u64> = all_nodes(&store)
            .iter()
            .flat_map(|node| [node.lft.unwrap(), node.rgt.unwrap()])
            .collect();
        values.sort_unstable();
        prop_assert_eq!(values, (start..start + 2 * n).collect::<Vec<_>>());
        set.validate_invariants(&store, None).unwrap();
    }

    #[test]
    fn rebuild_is_idempotent(shape in forest_shape()) {
        let mut store = MemoryRecordStore::with_nodes(build_forest(&shape)).unwrap();
        let set = NestedSet::default();
        set.rebuild_partition(&mut store, None, 1).unwrap();
        let first = store.snapshot();
        set.rebuild_partition(&mut store, None, 1).unwrap();
        prop_assert_eq!(store.snapshot(), first);
    }

    #[test]
    fn boundaries_agree_with_parent_pointers(shape in forest_shape()) {
        let mut store = MemoryRecordStore::with_nodes(build_forest(&shape)).unwrap();
        let set = NestedSet::default();
        set.rebuild_partition(&mut store, None, 1).unwrap();

        let nodes = all_nodes(&store);
        let by_id: HashMap<NodeId, Node> = nodes.iter().map(|n| (n.id, n.clone())).collect();
        let all = QueryOptions::default();
        for node in &nodes {
            let query = set.query(&store, node);
            let children = query.children(&all).unwrap();
            prop_assert_eq!(query.is_leaf(), children.is_empty());

            let ancestors: BTreeSet<NodeId> =
                query.ancestors(&all).unwrap().iter().map(|n| n.id).collect();
            let chain = parent_chain(&by_id, node.id);
            prop_assert_eq!(query.level().unwrap(), chain.len());
            prop_assert_eq!(node.lvl as usize, chain.len());
            prop_assert_eq!(ancestors, chain);
        }
    }

    #[test]
    fn leaf_insert_grows_ancestors_and_removal_restores(
        shape in forest_shape(),
        pick in any::<Index>(),
    ) {
        let nodes = build_forest(&shape);
        let mut store = MemoryRecordStore::with_nodes(nodes.clone()).unwrap();
        let set = NestedSet::default();
        set.rebuild_partition(&mut store, None, 1).unwrap();
        let before = store.snapshot();

        let parent = nodes[pick.index(nodes.len())].id;
        let fresh = NodeId(10_000);
        let created = set.create(&mut store, Node::child(fresh, parent)).unwrap();
        prop_assert!(created.bounds().is_some());
        set.validate_invariants(&store, None).unwrap();

        let by_id: HashMap<NodeId, Node> =
            all_nodes(&store).into_iter().map(|n| (n.id, n)).collect();
        let chain = parent_chain(&by_id, fresh);
        for old in &before {
            let new = &by_id[&old.id];
            let (ob, nb) = (old.bounds().unwrap(), new.bounds().unwrap());
            if chain.contains(&old.id) {
                prop_assert_eq!(nb.rgt, ob.rgt + 2);
            }
            prop_assert!(nb.lft == ob.lft || nb.lft == ob.lft + 2);
            prop_assert!(nb.rgt == ob.rgt || nb.rgt == ob.rgt + 2);
        }

        prop_assert!(set.delete(&mut store, fresh).unwrap());
        prop_assert_eq!(store.snapshot(), before);
    }
}
