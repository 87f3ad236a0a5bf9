//! Full derivation of `lft`/`rgt`/`lvl` from parent pointers.
//!
//! Children are visited in store order, depth first, each subtree starting at the running right
//! boundary of its parent. Over a subtree of `n` nodes starting at `L` the boundaries written are
//! exactly `L..L + 2n`, each used once. Traversal keeps an explicit stack so deep trees do not
//! exhaust the call stack.

use std::collections::HashSet;

use tracing::debug;

use crate::config::NestedSetOptions;
use crate::error::{Error, Result};
use crate::filter::{Field, Filter, FindOptions};
use crate::ids::{GroupKey, NodeId};
use crate::maintainer::child_level;
use crate::node::{Node, NodePatch};
use crate::traits::RecordStore;

struct Frame {
    node: Node,
    /// Next free boundary inside this node; becomes its `rgt` once all children are placed.
    next: u64,
    children: std::vec::IntoIter<Node>,
}

fn load_children<S: RecordStore>(store: &S, scope: &Filter, parent: NodeId) -> Result<Vec<Node>> {
    store.find_many(
        &scope.clone().eq(Field::Parent, parent),
        &FindOptions::default(),
    )
}

fn bump(value: u64) -> Result<u64> {
    value
        .checked_add(1)
        .ok_or_else(|| Error::InconsistentState("boundary overflow during rebuild".into()))
}

/// Rebuilds the subtree rooted at `root` starting at `left_start`. Fails with `NotFound` when
/// the root does not exist. Returns the root as persisted.
pub(crate) fn rebuild_subtree<S: RecordStore>(
    store: &mut S,
    options: &NestedSetOptions,
    root: NodeId,
    left_start: u64,
) -> Result<Node> {
    let mut root = store
        .find_by_id(root, &Filter::all())?
        .ok_or(Error::NotFound(root))?;
    let scope = options.scope(root.group.as_ref());

    root.lft = Some(left_start);
    if options.rebuild_levels && root.parent.is_none() {
        root.lvl = 0;
    }

    let mut visited = HashSet::from([root.id]);
    let mut written = 0usize;
    let children = load_children(store, &scope, root.id)?;
    let mut stack = vec![Frame {
        next: bump(left_start)?,
        node: root,
        children: children.into_iter(),
    }];

    while let Some(top) = stack.last_mut() {
        if let Some(mut child) = top.children.next() {
            if !visited.insert(child.id) {
                return Err(Error::InconsistentState(format!(
                    "parent pointers form a cycle through {}",
                    child.id
                )));
            }
            child.lft = Some(top.next);
            if options.rebuild_levels {
                child.lvl = child_level(top.node.lvl)?;
            }
            let next = bump(top.next)?;
            let grandchildren = load_children(store, &scope, child.id)?;
            stack.push(Frame {
                node: child,
                next,
                children: grandchildren.into_iter(),
            });
            continue;
        }

        let Some(frame) = stack.pop() else {
            break;
        };
        let lft = frame.node.lft.unwrap_or(left_start);
        let rgt = frame.next;
        let mut patch = NodePatch::bounds(lft, rgt);
        if options.rebuild_levels {
            patch = patch.with_lvl(frame.node.lvl);
        }
        let persisted = store.update_one(frame.node.id, &patch)?;
        written += 1;

        match stack.last_mut() {
            Some(parent) => parent.next = bump(rgt)?,
            None => {
                debug!(
                    "rebuilt subtree of {} ({} nodes, boundaries {}..={})",
                    persisted.id, written, lft, rgt
                );
                return Ok(persisted);
            }
        }
    }

    Err(Error::InconsistentState("rebuild finished without a root".into()))
}

/// Rebuilds every root of a partition in store order, laying the trees out side by side.
/// Returns the first boundary value left unused.
pub(crate) fn rebuild_forest<S: RecordStore>(
    store: &mut S,
    options: &NestedSetOptions,
    group: Option<&GroupKey>,
    left_start: u64,
) -> Result<u64> {
    let roots = store.find_many(
        &options.scope(group).eq(Field::Parent, None::<NodeId>),
        &FindOptions::default(),
    )?;
    let mut next = left_start;
    for root in &roots {
        let rebuilt = rebuild_subtree(store, options, root.id, next)?;
        next = bump(rebuilt.rgt.unwrap_or(next))?;
    }
    debug!("rebuilt {} root(s); next free boundary {}", roots.len(), next);
    Ok(next)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::traits::MemoryRecordStore;

    fn store_of(edges: &[(u128, Option<u128>)]) -> MemoryRecordStore {
        MemoryRecordStore::with_nodes(edges.iter().map(|&(id, parent)| match parent {
            Some(p) => Node::child(NodeId(id), NodeId(p)),
            None => Node::root(NodeId(id)),
        }))
        .unwrap()
    }

    fn bounds(store: &MemoryRecordStore, id: u128) -> (Option<u64>, Option<u64>, u32) {
        let node = store.find_by_id(NodeId(id), &Filter::all()).unwrap().unwrap();
        (node.lft, node.rgt, node.lvl)
    }

    #[test]
    fn lone_root_gets_adjacent_boundaries() {
        let mut store = store_of(&[(1, None)]);
        let root = rebuild_subtree(&mut store, &NestedSetOptions::default(), NodeId(1), 5).unwrap();
        assert_eq!((root.lft, root.rgt), (Some(5), Some(6)));
    }

    #[test]
    fn nested_children_follow_store_order() {
        let mut store = store_of(&[(1, None), (2, Some(1)), (3, Some(2)), (4, Some(1))]);
        rebuild_subtree(&mut store, &NestedSetOptions::default(), NodeId(1), 1).unwrap();
        assert_eq!(bounds(&store, 1), (Some(1), Some(8), 0));
        assert_eq!(bounds(&store, 2), (Some(2), Some(5), 1));
        assert_eq!(bounds(&store, 3), (Some(3), Some(4), 2));
        assert_eq!(bounds(&store, 4), (Some(6), Some(7), 1));
    }

    #[test]
    fn levels_untouched_when_disabled() {
        let mut store = store_of(&[(1, None), (2, Some(1))]);
        let options = NestedSetOptions::default().with_rebuild_levels(false);
        rebuild_subtree(&mut store, &options, NodeId(1), 1).unwrap();
        assert_eq!(bounds(&store, 2), (Some(2), Some(3), 0));
    }

    #[test]
    fn missing_root_is_not_found() {
        let mut store = store_of(&[(1, None)]);
        let err = rebuild_subtree(&mut store, &NestedSetOptions::default(), NodeId(7), 1);
        assert!(matches!(err, Err(Error::NotFound(NodeId(7)))));
    }

    #[test]
    fn level_overflow_is_reported() {
        let mut inner = Node::child(NodeId(1), NodeId(9));
        inner.lvl = u32::MAX;
        let mut store =
            MemoryRecordStore::with_nodes([inner, Node::child(NodeId(2), NodeId(1))]).unwrap();
        let err = rebuild_subtree(&mut store, &NestedSetOptions::default(), NodeId(1), 1);
        assert!(matches!(err, Err(Error::InconsistentState(_))));
    }

    #[test]
    fn cycles_are_reported() {
        let mut store = store_of(&[(1, Some(2)), (2, Some(1))]);
        let err = rebuild_subtree(&mut store, &NestedSetOptions::default(), NodeId(1), 1);
        assert!(matches!(err, Err(Error::InconsistentState(_))));
    }

    #[test]
    fn forest_lays_roots_side_by_side() {
        let mut store = store_of(&[(1, None), (2, Some(1)), (3, None)]);
        let next = rebuild_forest(&mut store, &NestedSetOptions::default(), None, 1).unwrap();
        assert_eq!(next, 7);
        assert_eq!(bounds(&store, 1), (Some(1), Some(4), 0));
        assert_eq!(bounds(&store, 3), (Some(5), Some(6), 0));
    }
}
