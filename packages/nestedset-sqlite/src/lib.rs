#![forbid(unsafe_code)]
//! SQLite-backed [`RecordStore`](nestedset_core::RecordStore) for the nested-set core.
//! One `SqliteRecordStore` wraps one connection; give each thread its own and share the
//! `NestedSet` between them. Boundary mutations run under `BEGIN IMMEDIATE`, which takes the
//! database write lock up front.

mod storage;
pub use storage::SqliteRecordStore;
