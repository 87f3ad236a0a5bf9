use crate::filter::{Field, Filter};
use crate::ids::GroupKey;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Behaviour switches for a [`NestedSet`](crate::NestedSet).
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize), serde(default))]
pub struct NestedSetOptions {
    /// Scope all interval arithmetic, queries and locks to nodes sharing the same grouping key.
    pub group_scoped: bool,
    /// Recompute `lvl` while rebuilding (`parent.lvl + 1`, true roots get 0).
    pub rebuild_levels: bool,
}

impl Default for NestedSetOptions {
    fn default() -> Self {
        Self {
            group_scoped: false,
            rebuild_levels: true,
        }
    }
}

impl NestedSetOptions {
    pub fn grouped() -> Self {
        Self {
            group_scoped: true,
            ..Self::default()
        }
    }

    pub fn with_rebuild_levels(mut self, enabled: bool) -> Self {
        self.rebuild_levels = enabled;
        self
    }

    /// Base filter restricting a store call to the partition of `group`.
    pub fn scope(&self, group: Option<&GroupKey>) -> Filter {
        if self.group_scoped {
            Filter::all().eq(Field::Group, group)
        } else {
            Filter::all()
        }
    }

    /// Partition identity used for locking; every node shares one partition when unscoped.
    pub fn partition<'a>(&self, group: Option<&'a GroupKey>) -> Option<&'a GroupKey> {
        if self.group_scoped {
            group
        } else {
            None
        }
    }
}
