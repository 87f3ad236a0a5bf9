use std::sync::Arc;

use parking_lot::Mutex;

use crate::error::{Error, Result};
use crate::filter::{Delta, Filter, FindOptions};
use crate::ids::{GroupKey, NodeId};
use crate::maintainer::Maintenance;
use crate::node::{Node, NodePatch};

/// Flat, query-only persistent collection of nodes.
///
/// Reads take `&self`; writes take `&mut self`. Handles are expected to be per-thread (one
/// connection each); the tree logic never assumes callers serialize for it.
pub trait RecordStore {
    /// Point lookup by id, restricted to records that also match `scope`.
    fn find_by_id(&self, id: NodeId, scope: &Filter) -> Result<Option<Node>>;

    fn find_many(&self, filter: &Filter, options: &FindOptions) -> Result<Vec<Node>>;

    fn count(&self, filter: &Filter) -> Result<usize> {
        Ok(self.find_many(filter, &FindOptions::default())?.len())
    }

    /// Applies `delta` to every matching record, returning how many were updated.
    fn update_many(&mut self, filter: &Filter, delta: Delta) -> Result<usize>;

    /// Writes the `Some` fields of `patch` and returns the updated record.
    fn update_one(&mut self, id: NodeId, patch: &NodePatch) -> Result<Node>;

    /// Commits a new record. Fails with `InvalidOperation` on a duplicate id.
    fn insert(&mut self, node: Node) -> Result<()>;

    /// Deletes a record, returning whether it existed.
    fn remove(&mut self, id: NodeId) -> Result<bool>;

    /// Runs `f` atomically. When `f` fails every write it made is undone. `scope` names the
    /// partition being mutated so stores can take partition-level locks. Calls made while a
    /// transaction is already open join it.
    fn transaction<T, F>(&mut self, scope: Option<&GroupKey>, f: F) -> Result<T>
    where
        F: FnOnce(&mut Self) -> Result<T>;
}

/// Boundary maintenance run exactly once around a node's creation or deletion.
///
/// Each hook takes the partition lock, opens a store transaction, runs the maintenance and then
/// `commit` (the caller's own `insert` or `remove` of the record) before releasing either. A
/// second writer to the same partition therefore observes the committed record, never the gap
/// between maintenance and commit. When `commit` fails the maintenance writes roll back too.
pub trait LifecycleHooks {
    /// May assign `lft`, `rgt` and `lvl` on the not-yet-persisted `node` before `commit` sees it.
    fn before_create<S, F>(&self, store: &mut S, node: &mut Node, commit: F) -> Result<Maintenance>
    where
        S: RecordStore,
        F: FnOnce(&mut S, &Node) -> Result<()>;

    /// Works on the record as re-read under the lock; `commit` receives that fresh copy. Fails
    /// with `NotFound` when the node is already gone.
    fn before_delete<S, F>(&self, store: &mut S, node: &Node, commit: F) -> Result<Maintenance>
    where
        S: RecordStore,
        F: FnOnce(&mut S, &Node) -> Result<()>;
}

#[derive(Clone, Debug)]
enum Undo {
    Restore(Node),
    Inserted(NodeId),
    Removed { index: usize, node: Node },
}

/// In-memory vector-backed store for prototyping and tests.
///
/// Clones share the same records, so each thread can own a handle. Transactions are tracked per
/// handle with an undo journal.
#[derive(Default)]
pub struct MemoryRecordStore {
    records: Arc<Mutex<Vec<Node>>>,
    journal: Option<Vec<Undo>>,
}

impl Clone for MemoryRecordStore {
    fn clone(&self) -> Self {
        Self {
            records: Arc::clone(&self.records),
            journal: None,
        }
    }
}

impl MemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_nodes(nodes: impl IntoIterator<Item = Node>) -> Result<Self> {
        let mut store = Self::new();
        for node in nodes {
            store.insert(node)?;
        }
        Ok(store)
    }

    /// Every record in insertion order.
    pub fn snapshot(&self) -> Vec<Node> {
        self.records.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.records.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.lock().is_empty()
    }

    fn record(&mut self, undo: Undo) {
        if let Some(journal) = self.journal.as_mut() {
            journal.push(undo);
        }
    }

    fn rollback(&self, journal: Vec<Undo>) {
        let mut records = self.records.lock();
        for undo in journal.into_iter().rev() {
            match undo {
                Undo::Restore(node) => {
                    if let Some(slot) = records.iter_mut().find(|n| n.id == node.id) {
                        *slot = node;
                    }
                }
                Undo::Inserted(id) => records.retain(|n| n.id != id),
                Undo::Removed { index, node } => {
                    let index = index.min(records.len());
                    records.insert(index, node);
                }
            }
        }
    }
}

impl RecordStore for MemoryRecordStore {
    fn find_by_id(&self, id: NodeId, scope: &Filter) -> Result<Option<Node>> {
        let records = self.records.lock();
        Ok(records
            .iter()
            .find(|n| n.id == id && scope.matches(n))
            .cloned())
    }

    fn find_many(&self, filter: &Filter, options: &FindOptions) -> Result<Vec<Node>> {
        let matched: Vec<Node> = {
            let records = self.records.lock();
            records.iter().filter(|n| filter.matches(n)).cloned().collect()
        };
        Ok(options.shape(matched))
    }

    fn count(&self, filter: &Filter) -> Result<usize> {
        Ok(self.records.lock().iter().filter(|n| filter.matches(n)).count())
    }

    fn update_many(&mut self, filter: &Filter, delta: Delta) -> Result<usize> {
        let before: Vec<Node> = {
            let mut records = self.records.lock();
            // Compute every new value first so a failing delta leaves nothing half-applied.
            let mut staged = Vec::new();
            for (idx, node) in records.iter().enumerate() {
                if filter.matches(node) {
                    let mut updated = node.clone();
                    delta.apply_to(&mut updated)?;
                    staged.push((idx, updated));
                }
            }
            staged
                .into_iter()
                .map(|(idx, updated)| std::mem::replace(&mut records[idx], updated))
                .collect()
        };
        let count = before.len();
        for node in before {
            self.record(Undo::Restore(node));
        }
        Ok(count)
    }

    fn update_one(&mut self, id: NodeId, patch: &NodePatch) -> Result<Node> {
        let (before, after) = {
            let mut records = self.records.lock();
            let slot = records
                .iter_mut()
                .find(|n| n.id == id)
                .ok_or(Error::NotFound(id))?;
            let before = slot.clone();
            slot.apply(patch);
            (before, slot.clone())
        };
        self.record(Undo::Restore(before));
        Ok(after)
    }

    fn insert(&mut self, node: Node) -> Result<()> {
        let id = node.id;
        {
            let mut records = self.records.lock();
            if records.iter().any(|n| n.id == id) {
                return Err(Error::InvalidOperation(format!("node {id} already exists")));
            }
            records.push(node);
        }
        self.record(Undo::Inserted(id));
        Ok(())
    }

    fn remove(&mut self, id: NodeId) -> Result<bool> {
        let removed = {
            let mut records = self.records.lock();
            let index = records.iter().position(|n| n.id == id);
            index.map(|index| (index, records.remove(index)))
        };
        match removed {
            Some((index, node)) => {
                self.record(Undo::Removed { index, node });
                Ok(true)
            }
            None => Ok(false),
        }
    }

    fn transaction<T, F>(&mut self, _scope: Option<&GroupKey>, f: F) -> Result<T>
    where
        F: FnOnce(&mut Self) -> Result<T>,
    {
        if self.journal.is_some() {
            return f(self);
        }
        self.journal = Some(Vec::new());
        let result = f(self);
        let journal = self.journal.take().unwrap_or_default();
        if result.is_err() {
            self.rollback(journal);
        }
        result
    }
}
