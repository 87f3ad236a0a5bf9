use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::lock_api::ArcMutexGuard;
use parking_lot::{Mutex, RawMutex};

use crate::ids::GroupKey;

/// Held for the whole read-compute-write sequence of one boundary mutation.
pub type PartitionGuard = ArcMutexGuard<RawMutex, ()>;

/// One mutual-exclusion lock per partition (`None` is the ungrouped partition).
///
/// Boundary mutations in different partitions never touch the same records, so they only
/// serialize against their own partition. Reads take no lock.
#[derive(Debug, Default)]
pub struct PartitionLocks {
    partitions: Mutex<HashMap<Option<GroupKey>, Arc<Mutex<()>>>>,
}

impl PartitionLocks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lock(&self, partition: Option<&GroupKey>) -> PartitionGuard {
        let handle = {
            let mut partitions = self.partitions.lock();
            Arc::clone(partitions.entry(partition.cloned()).or_default())
        };
        handle.lock_arc()
    }

    /// Non-blocking variant; `None` while another mutation holds the partition.
    pub fn try_lock(&self, partition: Option<&GroupKey>) -> Option<PartitionGuard> {
        let handle = {
            let mut partitions = self.partitions.lock();
            Arc::clone(partitions.entry(partition.cloned()).or_default())
        };
        handle.try_lock_arc()
    }
}
