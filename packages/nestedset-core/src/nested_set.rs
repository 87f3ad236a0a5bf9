use std::collections::{HashMap, HashSet};

use tracing::debug;

use crate::config::NestedSetOptions;
use crate::error::{Error, Result};
use crate::filter::{Field, Filter, FindOptions, SortOrder};
use crate::ids::{GroupKey, NodeId};
use crate::interval::{Bounds, Relation};
use crate::lock::PartitionLocks;
use crate::maintainer::{self, Maintenance};
use crate::node::Node;
use crate::query::NodeQuery;
use crate::rebuild;
use crate::traits::{LifecycleHooks, RecordStore};

/// Nested-set engine over any [`RecordStore`].
///
/// Holds no records itself: every call takes the store handle to work on, so one `NestedSet`
/// can be shared (`Arc`) by threads that each own a connection. Boundary mutations hold the
/// partition lock and run inside a store transaction for their whole read-compute-write
/// sequence.
#[derive(Debug, Default)]
pub struct NestedSet {
    options: NestedSetOptions,
    locks: PartitionLocks,
}

impl NestedSet {
    pub fn new(options: NestedSetOptions) -> Self {
        Self {
            options,
            locks: PartitionLocks::new(),
        }
    }

    pub fn options(&self) -> &NestedSetOptions {
        &self.options
    }

    /// Recomputes boundaries (and levels when enabled) for `root` and its whole subtree from
    /// parent pointers, starting at `left_start`.
    pub fn rebuild_tree<S: RecordStore>(
        &self,
        store: &mut S,
        root: NodeId,
        left_start: u64,
    ) -> Result<Node> {
        let group = store
            .find_by_id(root, &Filter::all())?
            .ok_or(Error::NotFound(root))?
            .group;
        let partition = self.options.partition(group.as_ref());
        let _guard = self.locks.lock(partition);
        store.transaction(partition, |tx| {
            rebuild::rebuild_subtree(tx, &self.options, root, left_start)
        })
    }

    /// Rebuilds every tree of a partition side by side. Returns the first unused boundary.
    pub fn rebuild_partition<S: RecordStore>(
        &self,
        store: &mut S,
        group: Option<&GroupKey>,
        left_start: u64,
    ) -> Result<u64> {
        let partition = self.options.partition(group);
        let _guard = self.locks.lock(partition);
        store.transaction(partition, |tx| {
            rebuild::rebuild_forest(tx, &self.options, group, left_start)
        })
    }

    /// Runs creation maintenance and commits `node`, atomically. Returns the node as stored.
    pub fn create<S: RecordStore>(&self, store: &mut S, mut node: Node) -> Result<Node> {
        self.insert_locked(store, &mut node, |tx, node| tx.insert(node.clone()))?;
        Ok(node)
    }

    /// Runs removal maintenance and deletes the record, atomically. `false` when absent.
    pub fn delete<S: RecordStore>(&self, store: &mut S, id: NodeId) -> Result<bool> {
        let removed = self.remove_locked(store, id, |tx, node| {
            if tx.remove(node.id)? {
                Ok(())
            } else {
                Err(Error::NotFound(node.id))
            }
        })?;
        Ok(removed.is_some())
    }

    fn insert_locked<S, F>(&self, store: &mut S, node: &mut Node, commit: F) -> Result<Maintenance>
    where
        S: RecordStore,
        F: FnOnce(&mut S, &Node) -> Result<()>,
    {
        let group = node.group.clone();
        let partition = self.options.partition(group.as_ref());
        let _guard = self.locks.lock(partition);
        store.transaction(partition, |tx| {
            let outcome = maintainer::prepare_insert(tx, &self.options, node)?;
            commit(tx, node)?;
            Ok(outcome)
        })
    }

    /// `Ok(None)` when the record does not exist once the partition lock is held.
    fn remove_locked<S, F>(
        &self,
        store: &mut S,
        id: NodeId,
        commit: F,
    ) -> Result<Option<Maintenance>>
    where
        S: RecordStore,
        F: FnOnce(&mut S, &Node) -> Result<()>,
    {
        // Only locates the partition; the record itself is re-read under the lock.
        let Some(located) = store.find_by_id(id, &Filter::all())? else {
            return Ok(None);
        };
        let partition = self.options.partition(located.group.as_ref());
        let _guard = self.locks.lock(partition);
        store.transaction(partition, |tx| {
            let Some(current) = tx.find_by_id(id, &Filter::all())? else {
                debug!("{} was removed concurrently", id);
                return Ok(None);
            };
            if self.options.partition(current.group.as_ref()) != partition {
                return Err(Error::InconsistentState(format!(
                    "{} changed partition while being removed",
                    id
                )));
            }
            let outcome = maintainer::prepare_remove(tx, &self.options, &current)?;
            commit(tx, &current)?;
            Ok(Some(outcome))
        })
    }

    pub fn query<'a, S: RecordStore>(&'a self, store: &'a S, node: &'a Node) -> NodeQuery<'a, S> {
        NodeQuery::new(store, &self.options, node)
    }

    /// Checks the built part of a partition: `lft < rgt`, every boundary value used once, no
    /// partial overlap, and every built child strictly inside its built parent. Nodes without
    /// boundaries are ignored.
    pub fn validate_invariants<S: RecordStore>(
        &self,
        store: &S,
        group: Option<&GroupKey>,
    ) -> Result<()> {
        let nodes = store.find_many(
            &self.options.scope(group),
            &FindOptions::default().sorted_by(Field::Lft, SortOrder::Asc),
        )?;
        let built: Vec<(&Node, Bounds)> = nodes
            .iter()
            .filter_map(|n| n.bounds().map(|b| (n, b)))
            .collect();

        let mut used = HashSet::new();
        for (node, bounds) in &built {
            if bounds.lft >= bounds.rgt {
                return Err(Error::InconsistentState(format!(
                    "{} has lft {} >= rgt {}",
                    node.id, bounds.lft, bounds.rgt
                )));
            }
            for value in [bounds.lft, bounds.rgt] {
                if !used.insert(value) {
                    return Err(Error::InconsistentState(format!(
                        "boundary {} used twice (seen again on {})",
                        value, node.id
                    )));
                }
            }
        }

        // Sorted by lft, an interval may only close open ancestors or nest inside the innermost.
        let mut open: Vec<(&Node, Bounds)> = Vec::new();
        for &(node, bounds) in &built {
            while open.last().is_some_and(|(_, top)| top.rgt < bounds.lft) {
                open.pop();
            }
            if let Some((outer, top)) = open.last() {
                if top.relation(&bounds) != Relation::Ancestor {
                    return Err(Error::InconsistentState(format!(
                        "{} [{}, {}] partially overlaps {} [{}, {}]",
                        node.id, bounds.lft, bounds.rgt, outer.id, top.lft, top.rgt
                    )));
                }
            }
            open.push((node, bounds));
        }

        let by_id: HashMap<NodeId, Bounds> = built.iter().map(|(n, b)| (n.id, *b)).collect();
        for (node, bounds) in &built {
            let Some(parent) = node.parent else {
                continue;
            };
            if let Some(parent_bounds) = by_id.get(&parent) {
                if parent_bounds.relation(bounds) != Relation::Ancestor {
                    return Err(Error::InconsistentState(format!(
                        "{} is not inside its parent {}",
                        node.id, parent
                    )));
                }
            }
        }

        debug!("validated {} built node(s)", built.len());
        Ok(())
    }
}

impl LifecycleHooks for NestedSet {
    fn before_create<S, F>(&self, store: &mut S, node: &mut Node, commit: F) -> Result<Maintenance>
    where
        S: RecordStore,
        F: FnOnce(&mut S, &Node) -> Result<()>,
    {
        self.insert_locked(store, node, commit)
    }

    fn before_delete<S, F>(&self, store: &mut S, node: &Node, commit: F) -> Result<Maintenance>
    where
        S: RecordStore,
        F: FnOnce(&mut S, &Node) -> Result<()>,
    {
        self.remove_locked(store, node.id, commit)?
            .ok_or(Error::NotFound(node.id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::maintainer::SkipReason;
    use crate::query::QueryOptions;
    use crate::traits::MemoryRecordStore;

    fn ids(nodes: &[Node]) -> Vec<NodeId> {
        let mut ids: Vec<_> = nodes.iter().map(|n| n.id).collect();
        ids.sort();
        ids
    }

    #[test]
    fn create_then_delete_restores_boundaries() {
        let set = NestedSet::default();
        let mut store = MemoryRecordStore::new();
        store.insert(Node::root(NodeId(1))).unwrap();
        store.insert(Node::child(NodeId(2), NodeId(1))).unwrap();
        set.rebuild_tree(&mut store, NodeId(1), 1).unwrap();
        let before = store.snapshot();

        let created = set.create(&mut store, Node::child(NodeId(3), NodeId(2))).unwrap();
        assert_eq!(created.bounds(), Some(Bounds::new(3, 4)));
        assert_eq!(created.lvl, 2);
        set.validate_invariants(&store, None).unwrap();

        assert!(set.delete(&mut store, NodeId(3)).unwrap());
        assert_eq!(store.snapshot(), before);
        assert!(!set.delete(&mut store, NodeId(3)).unwrap());
    }

    #[test]
    fn create_under_unbuilt_tree_stores_without_boundaries() {
        let set = NestedSet::default();
        let mut store = MemoryRecordStore::new();
        set.create(&mut store, Node::root(NodeId(1))).unwrap();
        let child = set.create(&mut store, Node::child(NodeId(2), NodeId(1))).unwrap();
        assert_eq!(child.bounds(), None);
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn hooks_report_skips() {
        let set = NestedSet::default();
        let mut store = MemoryRecordStore::with_nodes([Node::root(NodeId(1))]).unwrap();
        let mut node = Node::child(NodeId(2), NodeId(1));
        assert_eq!(
            set.before_create(&mut store, &mut node, |tx, n| tx.insert(n.clone()))
                .unwrap(),
            Maintenance::Skipped(SkipReason::ParentUnbuilt)
        );
        assert_eq!(store.len(), 2);
        assert_eq!(
            set.before_delete(&mut store, &Node::root(NodeId(1)), |_, _| Ok(()))
                .unwrap(),
            Maintenance::Skipped(SkipReason::RootLevel)
        );
    }

    fn built_family() -> (NestedSet, MemoryRecordStore) {
        let set = NestedSet::default();
        let mut store = MemoryRecordStore::with_nodes([
            Node::root(NodeId(1)),
            Node::child(NodeId(2), NodeId(1)),
            Node::child(NodeId(3), NodeId(1)),
        ])
        .unwrap();
        set.rebuild_tree(&mut store, NodeId(1), 1).unwrap();
        (set, store)
    }

    #[test]
    fn delete_hook_works_on_the_stored_record() {
        let (set, mut store) = built_family();
        let stale = store.find_by_id(NodeId(3), &Filter::all()).unwrap().unwrap();
        set.create(&mut store, Node::child(NodeId(4), NodeId(2))).unwrap();

        set.before_delete(&mut store, &stale, |tx, fresh| {
            assert_eq!(fresh.bounds(), Some(Bounds::new(6, 7)));
            tx.remove(fresh.id).map(|_| ())
        })
        .unwrap();
        set.validate_invariants(&store, None).unwrap();
        let root = store.find_by_id(NodeId(1), &Filter::all()).unwrap().unwrap();
        assert_eq!(root.bounds(), Some(Bounds::new(1, 6)));
    }

    #[test]
    fn delete_hook_on_missing_node_is_not_found() {
        let (set, mut store) = built_family();
        let gone = store.find_by_id(NodeId(3), &Filter::all()).unwrap().unwrap();
        assert!(set.delete(&mut store, NodeId(3)).unwrap());
        let before = store.snapshot();

        let result = set.before_delete(&mut store, &gone, |tx, n| tx.remove(n.id).map(|_| ()));
        assert!(matches!(result, Err(Error::NotFound(NodeId(3)))));
        assert_eq!(store.snapshot(), before);
    }

    #[test]
    fn failed_hook_commit_rolls_back_maintenance() {
        let (set, mut store) = built_family();
        let before = store.snapshot();
        let mut node = Node::child(NodeId(4), NodeId(3));

        let result = set.before_create(&mut store, &mut node, |_, _| {
            Err(Error::InvalidOperation("rejected".into()))
        });
        assert!(matches!(result, Err(Error::InvalidOperation(_))));
        assert_eq!(store.snapshot(), before);
    }

    #[test]
    fn failed_create_leaves_no_trace() {
        let set = NestedSet::default();
        let mut store = MemoryRecordStore::new();
        store.insert(Node::root(NodeId(1))).unwrap();
        store.insert(Node::child(NodeId(2), NodeId(1))).unwrap();
        set.rebuild_tree(&mut store, NodeId(1), 1).unwrap();
        let before = store.snapshot();

        // Duplicate id: the shift succeeds, the insert fails, the transaction rolls back.
        let err = set.create(&mut store, Node::child(NodeId(2), NodeId(1)));
        assert!(matches!(err, Err(Error::InvalidOperation(_))));
        assert_eq!(store.snapshot(), before);
    }

    #[test]
    fn queries_scope_to_group() {
        let set = NestedSet::new(NestedSetOptions::grouped());
        let mut store = MemoryRecordStore::new();
        for group in ["a", "b"] {
            let offset = if group == "a" { 0 } else { 10 };
            store
                .insert(Node::root(NodeId(offset + 1)).with_group(group))
                .unwrap();
            store
                .insert(Node::child(NodeId(offset + 2), NodeId(offset + 1)).with_group(group))
                .unwrap();
            set.rebuild_tree(&mut store, NodeId(offset + 1), 1).unwrap();
        }

        let root_a = store.find_by_id(NodeId(1), &Filter::all()).unwrap().unwrap();
        let descendants = set
            .query(&store, &root_a)
            .descendants(&QueryOptions::default())
            .unwrap();
        assert_eq!(ids(&descendants), vec![NodeId(2)]);
        set.validate_invariants(&store, Some(&GroupKey::from("a")))
            .unwrap();
        set.validate_invariants(&store, Some(&GroupKey::from("b")))
            .unwrap();
    }

    #[test]
    fn validation_reports_overlap() {
        let set = NestedSet::default();
        let mut a = Node::root(NodeId(1));
        a.lft = Some(1);
        a.rgt = Some(4);
        let mut b = Node::root(NodeId(2));
        b.lft = Some(3);
        b.rgt = Some(6);
        let store = MemoryRecordStore::with_nodes([a, b]).unwrap();
        assert!(matches!(
            set.validate_invariants(&store, None),
            Err(Error::InconsistentState(_))
        ));
    }
}
