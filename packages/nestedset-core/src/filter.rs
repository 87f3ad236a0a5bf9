//! Store-independent filter language: conjunctions of field comparisons with set-membership OR.
//!
//! Comparisons follow SQL semantics with unknown collapsed to false: `Eq(Null)` means the field
//! is absent, `Ne(Null)` means present, and any other comparison touching an absent field fails.
//! [`Filter::matches`] is the reference evaluator; SQL backends render the same rules.

use std::cmp::Ordering;

use crate::error::{Error, Result};
use crate::ids::{GroupKey, NodeId};
use crate::node::Node;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum Field {
    Id,
    Parent,
    Lft,
    Rgt,
    Lvl,
    Group,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Value {
    Null,
    Node(NodeId),
    Int(u64),
    Group(GroupKey),
}

impl Value {
    fn cmp_same_kind(&self, other: &Value) -> Option<Ordering> {
        match (self, other) {
            (Value::Node(a), Value::Node(b)) => Some(a.cmp(b)),
            (Value::Int(a), Value::Int(b)) => Some(a.cmp(b)),
            (Value::Group(a), Value::Group(b)) => Some(a.cmp(b)),
            _ => None,
        }
    }

    /// Total order used for sorting: `Null` first, then by value.
    pub fn sort_cmp(&self, other: &Value) -> Ordering {
        match (self, other) {
            (Value::Null, Value::Null) => Ordering::Equal,
            (Value::Null, _) => Ordering::Less,
            (_, Value::Null) => Ordering::Greater,
            _ => self.cmp_same_kind(other).unwrap_or(Ordering::Equal),
        }
    }
}

impl From<NodeId> for Value {
    fn from(value: NodeId) -> Self {
        Value::Node(value)
    }
}

impl From<Option<NodeId>> for Value {
    fn from(value: Option<NodeId>) -> Self {
        value.map_or(Value::Null, Value::Node)
    }
}

impl From<u64> for Value {
    fn from(value: u64) -> Self {
        Value::Int(value)
    }
}

impl From<u32> for Value {
    fn from(value: u32) -> Self {
        Value::Int(u64::from(value))
    }
}

impl From<GroupKey> for Value {
    fn from(value: GroupKey) -> Self {
        Value::Group(value)
    }
}

impl From<Option<GroupKey>> for Value {
    fn from(value: Option<GroupKey>) -> Self {
        value.map_or(Value::Null, Value::Group)
    }
}

impl From<Option<&GroupKey>> for Value {
    fn from(value: Option<&GroupKey>) -> Self {
        value.cloned().into()
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum CmpOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl CmpOp {
    pub fn eval(self, lhs: &Value, rhs: &Value) -> bool {
        match (lhs, rhs) {
            (_, Value::Null) => match self {
                CmpOp::Eq => *lhs == Value::Null,
                CmpOp::Ne => *lhs != Value::Null,
                _ => false,
            },
            (Value::Null, _) => false,
            _ => match lhs.cmp_same_kind(rhs) {
                None => false,
                Some(ord) => match self {
                    CmpOp::Eq => ord == Ordering::Equal,
                    CmpOp::Ne => ord != Ordering::Equal,
                    CmpOp::Lt => ord == Ordering::Less,
                    CmpOp::Le => ord != Ordering::Greater,
                    CmpOp::Gt => ord == Ordering::Greater,
                    CmpOp::Ge => ord != Ordering::Less,
                },
            },
        }
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Clause {
    Cmp { field: Field, op: CmpOp, value: Value },
    /// Matches when any alternative matches; an empty list matches nothing.
    AnyOf(Vec<Filter>),
}

/// Conjunction of clauses. The empty filter matches every record.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct Filter {
    clauses: Vec<Clause>,
}

impl Filter {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn cmp(mut self, field: Field, op: CmpOp, value: impl Into<Value>) -> Self {
        self.clauses.push(Clause::Cmp {
            field,
            op,
            value: value.into(),
        });
        self
    }

    pub fn eq(self, field: Field, value: impl Into<Value>) -> Self {
        self.cmp(field, CmpOp::Eq, value)
    }

    pub fn ne(self, field: Field, value: impl Into<Value>) -> Self {
        self.cmp(field, CmpOp::Ne, value)
    }

    pub fn lt(self, field: Field, value: impl Into<Value>) -> Self {
        self.cmp(field, CmpOp::Lt, value)
    }

    pub fn le(self, field: Field, value: impl Into<Value>) -> Self {
        self.cmp(field, CmpOp::Le, value)
    }

    pub fn gt(self, field: Field, value: impl Into<Value>) -> Self {
        self.cmp(field, CmpOp::Gt, value)
    }

    pub fn ge(self, field: Field, value: impl Into<Value>) -> Self {
        self.cmp(field, CmpOp::Ge, value)
    }

    pub fn any_of(mut self, alternatives: Vec<Filter>) -> Self {
        self.clauses.push(Clause::AnyOf(alternatives));
        self
    }

    pub fn and(mut self, other: Filter) -> Self {
        self.clauses.extend(other.clauses);
        self
    }

    pub fn clauses(&self) -> &[Clause] {
        &self.clauses
    }

    pub fn is_all(&self) -> bool {
        self.clauses.is_empty()
    }

    pub fn matches(&self, node: &Node) -> bool {
        self.clauses.iter().all(|clause| match clause {
            Clause::Cmp { field, op, value } => op.eval(&node.value(*field), value),
            Clause::AnyOf(alternatives) => alternatives.iter().any(|f| f.matches(node)),
        })
    }
}

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum SortOrder {
    #[default]
    Asc,
    Desc,
}

/// Result shaping passed through to the store untouched by the tree logic.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct FindOptions {
    /// Fields to load; `None` loads all of them.
    pub projection: Option<Vec<Field>>,
    /// `None` keeps the store's insertion order.
    pub sort: Option<(Field, SortOrder)>,
    pub offset: usize,
    pub limit: Option<usize>,
}

impl FindOptions {
    pub fn sorted_by(mut self, field: Field, order: SortOrder) -> Self {
        self.sort = Some((field, order));
        self
    }

    pub fn project(mut self, fields: impl Into<Vec<Field>>) -> Self {
        self.projection = Some(fields.into());
        self
    }

    pub fn page(mut self, offset: usize, limit: usize) -> Self {
        self.offset = offset;
        self.limit = Some(limit);
        self
    }

    /// Applies sort, paging and projection to records already in insertion order.
    pub fn shape(&self, mut nodes: Vec<Node>) -> Vec<Node> {
        if let Some((field, order)) = self.sort {
            nodes.sort_by(|a, b| {
                let ord = a.value(field).sort_cmp(&b.value(field));
                match order {
                    SortOrder::Asc => ord,
                    SortOrder::Desc => ord.reverse(),
                }
            });
        }
        let limit = self.limit.unwrap_or(usize::MAX);
        let mut shaped: Vec<Node> = nodes.into_iter().skip(self.offset).take(limit).collect();
        if let Some(fields) = &self.projection {
            for node in &mut shaped {
                node.project(fields);
            }
        }
        shaped
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum BoundField {
    Lft,
    Rgt,
    Lvl,
}

impl From<BoundField> for Field {
    fn from(value: BoundField) -> Self {
        match value {
            BoundField::Lft => Field::Lft,
            BoundField::Rgt => Field::Rgt,
            BoundField::Lvl => Field::Lvl,
        }
    }
}

/// Numeric increment applied by `RecordStore::update_many`.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Delta {
    pub field: BoundField,
    pub amount: i64,
}

impl Delta {
    pub fn lft(amount: i64) -> Self {
        Self {
            field: BoundField::Lft,
            amount,
        }
    }

    pub fn rgt(amount: i64) -> Self {
        Self {
            field: BoundField::Rgt,
            amount,
        }
    }

    /// In-memory application. Absent boundaries stay absent.
    pub fn apply_to(&self, node: &mut Node) -> Result<()> {
        let shift = |value: u64| {
            value.checked_add_signed(self.amount).ok_or_else(|| {
                Error::InconsistentState(format!(
                    "shifting {:?} {} by {} leaves the valid range",
                    self.field, value, self.amount
                ))
            })
        };
        match self.field {
            BoundField::Lft => {
                if let Some(lft) = node.lft {
                    node.lft = Some(shift(lft)?);
                }
            }
            BoundField::Rgt => {
                if let Some(rgt) = node.rgt {
                    node.rgt = Some(shift(rgt)?);
                }
            }
            BoundField::Lvl => {
                let lvl = shift(u64::from(node.lvl))?;
                node.lvl = u32::try_from(lvl)
                    .map_err(|_| Error::InconsistentState("lvl overflow".into()))?;
            }
        }
        Ok(())
    }
}
