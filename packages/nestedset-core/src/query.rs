//! Relationship queries: each one is the containment relation specialised into a store filter.

use crate::config::NestedSetOptions;
use crate::error::{Error, Result};
use crate::filter::{Field, Filter, FindOptions};
use crate::interval;
use crate::node::Node;
use crate::traits::RecordStore;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Relationship {
    Ancestors,
    SelfAndAncestors,
    Children,
    SelfAndChildren,
    Descendants,
    SelfAndDescendants,
    Siblings,
    SelfAndSiblings,
}

impl Relationship {
    /// Filter selecting the related records of `node`, before partition scoping.
    ///
    /// `None` when the answer is empty by construction: containment queries on a node that has
    /// no boundaries yet.
    pub fn filter(self, node: &Node) -> Option<Filter> {
        let bounds = node.bounds();
        let filter = match self {
            Relationship::Ancestors => {
                let b = bounds?;
                Filter::all().lt(Field::Lft, b.lft).gt(Field::Rgt, b.rgt)
            }
            Relationship::SelfAndAncestors => {
                let b = bounds?;
                Filter::all().le(Field::Lft, b.lft).ge(Field::Rgt, b.rgt)
            }
            Relationship::Children => Filter::all().eq(Field::Parent, node.id),
            Relationship::SelfAndChildren => Filter::all().any_of(vec![
                Filter::all().eq(Field::Parent, node.id),
                Filter::all().eq(Field::Id, node.id),
            ]),
            Relationship::Descendants => {
                let b = bounds?;
                Filter::all().gt(Field::Lft, b.lft).lt(Field::Rgt, b.rgt)
            }
            Relationship::SelfAndDescendants => {
                let b = bounds?;
                Filter::all().ge(Field::Lft, b.lft).le(Field::Rgt, b.rgt)
            }
            Relationship::Siblings => Filter::all()
                .eq(Field::Parent, node.parent)
                .ne(Field::Id, node.id),
            Relationship::SelfAndSiblings => Filter::all().eq(Field::Parent, node.parent),
        };
        Some(filter)
    }
}

/// Optional narrowing and shaping on top of a relationship query.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct QueryOptions {
    /// Conjoined with the relationship filter.
    pub extra: Option<Filter>,
    pub find: FindOptions,
}

impl QueryOptions {
    pub fn filtered(extra: Filter) -> Self {
        Self {
            extra: Some(extra),
            find: FindOptions::default(),
        }
    }

    pub fn with_find(mut self, find: FindOptions) -> Self {
        self.find = find;
        self
    }
}

/// Read-only relationship view of one loaded node. Reasons only from the boundaries present
/// in the store at call time.
pub struct NodeQuery<'a, S> {
    store: &'a S,
    options: &'a NestedSetOptions,
    node: &'a Node,
}

impl<'a, S: RecordStore> NodeQuery<'a, S> {
    pub fn new(store: &'a S, options: &'a NestedSetOptions, node: &'a Node) -> Self {
        Self {
            store,
            options,
            node,
        }
    }

    fn scope(&self) -> Filter {
        self.options.scope(self.node.group.as_ref())
    }

    pub fn related(&self, relationship: Relationship, opts: &QueryOptions) -> Result<Vec<Node>> {
        let Some(filter) = relationship.filter(self.node) else {
            return Ok(Vec::new());
        };
        let mut filter = self.scope().and(filter);
        if let Some(extra) = &opts.extra {
            filter = filter.and(extra.clone());
        }
        self.store.find_many(&filter, &opts.find)
    }

    /// `Ok(None)` for a root; `NotFound` when the referenced parent is missing.
    pub fn parent(&self) -> Result<Option<Node>> {
        let Some(parent) = self.node.parent else {
            return Ok(None);
        };
        self.store
            .find_by_id(parent, &self.scope())?
            .map(Some)
            .ok_or(Error::NotFound(parent))
    }

    pub fn ancestors(&self, opts: &QueryOptions) -> Result<Vec<Node>> {
        self.related(Relationship::Ancestors, opts)
    }

    pub fn self_and_ancestors(&self, opts: &QueryOptions) -> Result<Vec<Node>> {
        self.related(Relationship::SelfAndAncestors, opts)
    }

    pub fn children(&self, opts: &QueryOptions) -> Result<Vec<Node>> {
        self.related(Relationship::Children, opts)
    }

    pub fn self_and_children(&self, opts: &QueryOptions) -> Result<Vec<Node>> {
        self.related(Relationship::SelfAndChildren, opts)
    }

    pub fn descendants(&self, opts: &QueryOptions) -> Result<Vec<Node>> {
        self.related(Relationship::Descendants, opts)
    }

    pub fn self_and_descendants(&self, opts: &QueryOptions) -> Result<Vec<Node>> {
        self.related(Relationship::SelfAndDescendants, opts)
    }

    pub fn siblings(&self, opts: &QueryOptions) -> Result<Vec<Node>> {
        self.related(Relationship::Siblings, opts)
    }

    pub fn self_and_siblings(&self, opts: &QueryOptions) -> Result<Vec<Node>> {
        self.related(Relationship::SelfAndSiblings, opts)
    }

    /// Number of ancestors, counted from the boundaries rather than the stored `lvl`.
    pub fn level(&self) -> Result<usize> {
        match Relationship::Ancestors.filter(self.node) {
            Some(filter) => self.store.count(&self.scope().and(filter)),
            None => Ok(0),
        }
    }

    pub fn is_leaf(&self) -> bool {
        interval::is_leaf(self.node)
    }

    pub fn is_child(&self) -> bool {
        interval::is_child(self.node)
    }

    pub fn is_descendant_of(&self, other: &Node) -> bool {
        interval::is_descendant_of(self.node, other)
    }

    pub fn is_ancestor_of(&self, other: &Node) -> bool {
        interval::is_ancestor_of(self.node, other)
    }
}
