#![forbid(unsafe_code)]
//! PostgreSQL-backed [`RecordStore`](nestedset_core::RecordStore) for the nested-set core.
//!
//! Records live in one `nestedset_nodes` table resolved through the connection's
//! `search_path`. Boundary mutations run in a transaction that first takes a transaction-scoped
//! advisory lock for the partition, so concurrent writers to the same partition serialize
//! across processes while other partitions proceed.

mod lock_key;
mod schema;
mod store;

pub use lock_key::partition_lock_key;
pub use schema::{ensure_schema, isolate_schema_for_tests};
pub use store::PgRecordStore;
