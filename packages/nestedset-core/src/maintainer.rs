//! Incremental boundary maintenance around single-node creation and removal.
//!
//! The insertion slot sits right after the right-most existing sibling subtree, or right after
//! the parent's `lft` when the node becomes its only child. Every boundary past that anchor
//! moves by `+2` to open the slot, and by `-2` to close it again on removal. Missing boundaries
//! on the parent or a sibling mean the tree is not built for this branch yet: the operation is
//! skipped and reported, never failed.

use tracing::{debug, trace, warn};

use crate::config::NestedSetOptions;
use crate::error::{Error, Result};
use crate::filter::{Delta, Field, Filter, FindOptions};
use crate::ids::NodeId;
use crate::interval::Bounds;
use crate::node::Node;
use crate::traits::RecordStore;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum SkipReason {
    /// The node has no parent; it waits for an explicit rebuild.
    RootLevel,
    ParentUnbuilt,
    SiblingUnbuilt,
    /// A node being removed never received boundaries, so it occupies no slot.
    NodeUnbuilt,
}

/// Outcome of a maintenance hook.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Maintenance {
    Shifted {
        /// Largest boundary left in place.
        anchor: u64,
        moved_lft: usize,
        moved_rgt: usize,
    },
    /// The tree is incomplete for this branch; nothing was written.
    Skipped(SkipReason),
}

impl Maintenance {
    pub fn is_skipped(&self) -> bool {
        matches!(self, Maintenance::Skipped(_))
    }
}

/// `parent + 1`, failing instead of wrapping at `u32::MAX`.
pub(crate) fn child_level(parent: u32) -> Result<u32> {
    parent
        .checked_add(1)
        .ok_or_else(|| Error::InconsistentState(format!("level overflow below lvl {parent}")))
}

fn skipped(node: &Node, reason: SkipReason) -> Maintenance {
    debug!("boundary maintenance for {} skipped: {:?}", node.id, reason);
    Maintenance::Skipped(reason)
}

fn fetch_parent<S: RecordStore>(store: &S, scope: &Filter, parent: NodeId) -> Result<Node> {
    store
        .find_by_id(parent, scope)?
        .ok_or(Error::NotFound(parent))
}

/// Largest sibling `rgt`, falling back to the parent's `lft`. `None` when a sibling is unbuilt.
fn sibling_anchor<S: RecordStore>(
    store: &S,
    scope: &Filter,
    parent: NodeId,
    parent_bounds: Bounds,
    node: NodeId,
) -> Result<Option<u64>> {
    let siblings = store.find_many(
        &scope.clone().eq(Field::Parent, parent).ne(Field::Id, node),
        &FindOptions::default(),
    )?;
    let mut max_rgt = None;
    for sibling in &siblings {
        let Some(bounds) = sibling.bounds() else {
            return Ok(None);
        };
        max_rgt = max_rgt.max(Some(bounds.rgt));
    }
    Ok(Some(max_rgt.unwrap_or(parent_bounds.lft)))
}

/// Two independent range updates: `lft > anchor` and `rgt > anchor`, each by `amount`.
fn shift<S: RecordStore>(
    store: &mut S,
    scope: &Filter,
    anchor: u64,
    amount: i64,
    exclude: Option<NodeId>,
) -> Result<Maintenance> {
    let mut base = scope.clone();
    if let Some(id) = exclude {
        base = base.ne(Field::Id, id);
    }
    let moved_lft = store.update_many(&base.clone().gt(Field::Lft, anchor), Delta::lft(amount))?;
    let moved_rgt = store.update_many(&base.gt(Field::Rgt, anchor), Delta::rgt(amount))?;
    trace!(
        "shifted boundaries past {} by {}: {} lft, {} rgt",
        anchor,
        amount,
        moved_lft,
        moved_rgt
    );
    Ok(Maintenance::Shifted {
        anchor,
        moved_lft,
        moved_rgt,
    })
}

/// Opens a slot for `node` (not yet persisted) and assigns its boundaries and level.
pub(crate) fn prepare_insert<S: RecordStore>(
    store: &mut S,
    options: &NestedSetOptions,
    node: &mut Node,
) -> Result<Maintenance> {
    let Some(parent_id) = node.parent else {
        return Ok(skipped(node, SkipReason::RootLevel));
    };
    if parent_id == node.id {
        return Err(Error::InvalidOperation(format!(
            "node {} cannot be its own parent",
            node.id
        )));
    }

    let scope = options.scope(node.group.as_ref());
    let parent = fetch_parent(store, &scope, parent_id)?;
    let Some(parent_bounds) = parent.bounds() else {
        return Ok(skipped(node, SkipReason::ParentUnbuilt));
    };
    node.lvl = child_level(parent.lvl)?;

    let Some(anchor) = sibling_anchor(store, &scope, parent_id, parent_bounds, node.id)? else {
        return Ok(skipped(node, SkipReason::SiblingUnbuilt));
    };

    let outcome = shift(store, &scope, anchor, 2, None)?;
    node.lft = Some(anchor + 1);
    node.rgt = Some(anchor + 2);
    Ok(outcome)
}

/// Closes the slot `node` occupied. The node's own record is left for the caller to delete.
pub(crate) fn prepare_remove<S: RecordStore>(
    store: &mut S,
    options: &NestedSetOptions,
    node: &Node,
) -> Result<Maintenance> {
    let Some(parent_id) = node.parent else {
        return Ok(skipped(node, SkipReason::RootLevel));
    };

    let scope = options.scope(node.group.as_ref());
    let parent = fetch_parent(store, &scope, parent_id)?;
    let Some(parent_bounds) = parent.bounds() else {
        return Ok(skipped(node, SkipReason::ParentUnbuilt));
    };
    let Some(anchor) = sibling_anchor(store, &scope, parent_id, parent_bounds, node.id)? else {
        return Ok(skipped(node, SkipReason::SiblingUnbuilt));
    };
    let Some(own) = node.bounds() else {
        return Ok(skipped(node, SkipReason::NodeUnbuilt));
    };

    if own != Bounds::new(anchor + 1, anchor + 2) {
        warn!(
            "removing {} which is not the trailing leaf of {}; partition needs a rebuild",
            node.id, parent_id
        );
    }
    shift(store, &scope, anchor, -2, Some(node.id))
}
