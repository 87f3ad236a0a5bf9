#![forbid(unsafe_code)]
//! Nested-set tree maintenance over a flat record store.
//! Each node carries `lft`/`rgt` boundaries whose interval containment mirrors ancestry, so a
//! whole subtree is one range query. This crate stays independent of concrete storage engines:
//! any host that can satisfy [`RecordStore`] gets the rebuilder, the incremental boundary
//! maintainer and the relationship queries.

pub mod config;
pub mod error;
pub mod filter;
pub mod ids;
pub mod interval;
pub mod lock;
pub mod maintainer;
pub mod nested_set;
pub mod node;
pub mod query;
mod rebuild;
#[cfg(feature = "sql-storage")]
pub mod sql;
pub mod traits;

pub use config::NestedSetOptions;
pub use error::{Error, Result};
pub use filter::{BoundField, Clause, CmpOp, Delta, Field, Filter, FindOptions, SortOrder, Value};
pub use ids::{GroupKey, NodeId};
pub use interval::{is_ancestor_of, is_child, is_descendant_of, is_leaf, Bounds, Relation};
pub use lock::{PartitionGuard, PartitionLocks};
pub use maintainer::{Maintenance, SkipReason};
pub use nested_set::NestedSet;
pub use node::{Node, NodePatch};
pub use query::{NodeQuery, QueryOptions, Relationship};
pub use traits::{LifecycleHooks, MemoryRecordStore, RecordStore};
