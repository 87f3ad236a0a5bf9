use crate::filter::{Field, Value};
use crate::ids::{GroupKey, NodeId};
use crate::interval::Bounds;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// A record participating in the nested-set encoding.
///
/// `lft`/`rgt` stay `None` until a rebuild or the boundary maintainer assigns them. `lvl` is
/// maintained best-effort on insertion and set authoritatively by a rebuild.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Node {
    pub id: NodeId,
    pub parent: Option<NodeId>,
    #[cfg_attr(feature = "serde", serde(default))]
    pub lft: Option<u64>,
    #[cfg_attr(feature = "serde", serde(default))]
    pub rgt: Option<u64>,
    #[cfg_attr(feature = "serde", serde(default))]
    pub lvl: u32,
    #[cfg_attr(feature = "serde", serde(default))]
    pub group: Option<GroupKey>,
}

impl Node {
    pub fn root(id: NodeId) -> Self {
        Self {
            id,
            parent: None,
            lft: None,
            rgt: None,
            lvl: 0,
            group: None,
        }
    }

    pub fn child(id: NodeId, parent: NodeId) -> Self {
        Self {
            parent: Some(parent),
            ..Self::root(id)
        }
    }

    pub fn with_group(mut self, group: impl Into<GroupKey>) -> Self {
        self.group = Some(group.into());
        self
    }

    /// Both boundaries, or `None` while the node is outside the built tree.
    pub fn bounds(&self) -> Option<Bounds> {
        match (self.lft, self.rgt) {
            (Some(lft), Some(rgt)) => Some(Bounds { lft, rgt }),
            _ => None,
        }
    }

    pub fn apply(&mut self, patch: &NodePatch) {
        if let Some(lft) = patch.lft {
            self.lft = Some(lft);
        }
        if let Some(rgt) = patch.rgt {
            self.rgt = Some(rgt);
        }
        if let Some(lvl) = patch.lvl {
            self.lvl = lvl;
        }
    }

    /// Current value of `field`, `Value::Null` when absent.
    pub fn value(&self, field: Field) -> Value {
        match field {
            Field::Id => Value::Node(self.id),
            Field::Parent => self.parent.map_or(Value::Null, Value::Node),
            Field::Lft => self.lft.map_or(Value::Null, Value::Int),
            Field::Rgt => self.rgt.map_or(Value::Null, Value::Int),
            Field::Lvl => Value::Int(u64::from(self.lvl)),
            Field::Group => self.group.clone().map_or(Value::Null, Value::Group),
        }
    }

    /// Clears every optional field not listed. `id` is always kept.
    pub fn project(&mut self, fields: &[Field]) {
        let keep = |f: Field| fields.contains(&f);
        if !keep(Field::Parent) {
            self.parent = None;
        }
        if !keep(Field::Lft) {
            self.lft = None;
        }
        if !keep(Field::Rgt) {
            self.rgt = None;
        }
        if !keep(Field::Lvl) {
            self.lvl = 0;
        }
        if !keep(Field::Group) {
            self.group = None;
        }
    }
}

/// Partial assignment for `RecordStore::update_one`; only `Some` fields are written.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct NodePatch {
    pub lft: Option<u64>,
    pub rgt: Option<u64>,
    pub lvl: Option<u32>,
}

impl NodePatch {
    pub fn bounds(lft: u64, rgt: u64) -> Self {
        Self {
            lft: Some(lft),
            rgt: Some(rgt),
            lvl: None,
        }
    }

    pub fn with_lvl(mut self, lvl: u32) -> Self {
        self.lvl = Some(lvl);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.lft.is_none() && self.rgt.is_none() && self.lvl.is_none()
    }
}
