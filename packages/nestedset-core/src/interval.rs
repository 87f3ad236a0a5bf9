//! Pure interval geometry over `(lft, rgt)` pairs. No I/O.

use crate::node::Node;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// A node's loaded nested-set interval.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Bounds {
    pub lft: u64,
    pub rgt: u64,
}

/// How one interval sits relative to another.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Relation {
    Same,
    /// The receiver strictly contains the other interval.
    Ancestor,
    /// The receiver is strictly contained by the other interval.
    Descendant,
    Disjoint,
    /// Partial overlap or a shared boundary value. Never valid in a consistent partition.
    Overlapping,
}

impl Bounds {
    pub fn new(lft: u64, rgt: u64) -> Self {
        Self { lft, rgt }
    }

    /// Number of boundary values spanned, `2 * subtree size` in a contiguous tree.
    pub fn width(&self) -> u64 {
        self.rgt.saturating_sub(self.lft) + 1
    }

    pub fn is_leaf(&self) -> bool {
        self.rgt.checked_sub(self.lft) == Some(1)
    }

    pub fn relation(&self, other: &Bounds) -> Relation {
        if self == other {
            Relation::Same
        } else if self.lft < other.lft && other.rgt < self.rgt {
            Relation::Ancestor
        } else if other.lft < self.lft && self.rgt < other.rgt {
            Relation::Descendant
        } else if self.rgt < other.lft || other.rgt < self.lft {
            Relation::Disjoint
        } else {
            Relation::Overlapping
        }
    }
}

/// True iff both boundaries are set and `rgt - lft == 1`.
pub fn is_leaf(node: &Node) -> bool {
    node.bounds().is_some_and(|b| b.is_leaf())
}

/// True iff the node has a parent reference.
pub fn is_child(node: &Node) -> bool {
    node.parent.is_some()
}

/// `other.lft < node.lft < other.rgt`. False when either side lacks boundaries.
pub fn is_descendant_of(node: &Node, other: &Node) -> bool {
    match (node.bounds(), other.bounds()) {
        (Some(n), Some(o)) => o.lft < n.lft && n.lft < o.rgt,
        _ => false,
    }
}

/// `node.lft < other.lft < node.rgt`. False when either side lacks boundaries.
pub fn is_ancestor_of(node: &Node, other: &Node) -> bool {
    is_descendant_of(other, node)
}
