//! Rendering of [`Filter`]s and [`FindOptions`] into SQL for the SQL-backed record stores.
//!
//! Only conjunctions, disjunctions and plain comparisons are emitted (never `NOT`), so SQL's
//! unknown results collapse to false exactly like [`Filter::matches`]. Comparing a field with
//! a value of another kind renders as false, also matching the in-memory evaluator.

use crate::error::{Error, Result};
use crate::filter::{Clause, CmpOp, Field, Filter, FindOptions, SortOrder, Value};

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Dialect {
    /// `?N` placeholders, `LIMIT -1` for an unbounded page.
    Sqlite,
    /// `$N` placeholders.
    Postgres,
}

/// Parameter value bound to a rendered placeholder.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum SqlValue {
    Int(i64),
    Blob(Vec<u8>),
}

#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct SqlFilter {
    pub clause: String,
    pub params: Vec<SqlValue>,
}

pub fn column(field: Field) -> &'static str {
    match field {
        Field::Id => "id",
        Field::Parent => "parent",
        Field::Lft => "lft",
        Field::Rgt => "rgt",
        Field::Lvl => "lvl",
        Field::Group => "grp",
    }
}

pub fn int_param(value: u64) -> Result<i64> {
    i64::try_from(value).map_err(|_| Error::Storage(format!("integer {value} exceeds i64")))
}

fn operator(op: CmpOp) -> &'static str {
    match op {
        CmpOp::Eq => "=",
        CmpOp::Ne => "<>",
        CmpOp::Lt => "<",
        CmpOp::Le => "<=",
        CmpOp::Gt => ">",
        CmpOp::Ge => ">=",
    }
}

fn param_for(field: Field, value: &Value) -> Result<Option<SqlValue>> {
    Ok(match (field, value) {
        (Field::Id | Field::Parent, Value::Node(id)) => Some(SqlValue::Blob(id.to_bytes().to_vec())),
        (Field::Lft | Field::Rgt | Field::Lvl, Value::Int(n)) => Some(SqlValue::Int(int_param(*n)?)),
        (Field::Group, Value::Group(key)) => Some(SqlValue::Blob(key.as_bytes().to_vec())),
        _ => None,
    })
}

struct Renderer {
    dialect: Dialect,
    first: usize,
    params: Vec<SqlValue>,
}

impl Renderer {
    fn placeholder(&mut self, value: SqlValue) -> String {
        self.params.push(value);
        let n = self.first + self.params.len() - 1;
        match self.dialect {
            Dialect::Sqlite => format!("?{n}"),
            Dialect::Postgres => format!("${n}"),
        }
    }

    fn filter(&mut self, filter: &Filter) -> Result<String> {
        if filter.is_all() {
            return Ok("1=1".into());
        }
        let mut parts = Vec::with_capacity(filter.clauses().len());
        for clause in filter.clauses() {
            parts.push(self.clause(clause)?);
        }
        Ok(parts.join(" AND "))
    }

    fn clause(&mut self, clause: &Clause) -> Result<String> {
        match clause {
            Clause::Cmp { field, op, value } => {
                let col = column(*field);
                if *value == Value::Null {
                    return Ok(match op {
                        CmpOp::Eq => format!("{col} IS NULL"),
                        CmpOp::Ne => format!("{col} IS NOT NULL"),
                        _ => "0=1".into(),
                    });
                }
                match param_for(*field, value)? {
                    Some(param) => {
                        let ph = self.placeholder(param);
                        Ok(format!("{col} {} {ph}", operator(*op)))
                    }
                    None => Ok("0=1".into()),
                }
            }
            Clause::AnyOf(alternatives) => {
                if alternatives.is_empty() {
                    return Ok("0=1".into());
                }
                let mut parts = Vec::with_capacity(alternatives.len());
                for alt in alternatives {
                    parts.push(format!("({})", self.filter(alt)?));
                }
                Ok(format!("({})", parts.join(" OR ")))
            }
        }
    }
}

/// Renders `filter` as a boolean SQL expression. Placeholders are numbered from `first`.
pub fn render_filter(filter: &Filter, dialect: Dialect, first: usize) -> Result<SqlFilter> {
    let mut renderer = Renderer {
        dialect,
        first,
        params: Vec::new(),
    };
    let clause = renderer.filter(filter)?;
    Ok(SqlFilter {
        clause,
        params: renderer.params,
    })
}

/// `ORDER BY` (nulls first, like [`Value::sort_cmp`]) with `seq` as the insertion-order
/// tie-break, followed by paging.
pub fn render_shape(options: &FindOptions, dialect: Dialect) -> String {
    let mut out = String::from(" ORDER BY ");
    if let Some((field, order)) = options.sort {
        let col = column(field);
        match order {
            SortOrder::Asc => out.push_str(&format!("{col} ASC NULLS FIRST, ")),
            SortOrder::Desc => out.push_str(&format!("{col} DESC NULLS LAST, ")),
        }
    }
    out.push_str("seq ASC");
    match (options.limit, dialect) {
        (Some(limit), _) => out.push_str(&format!(" LIMIT {limit} OFFSET {}", options.offset)),
        (None, Dialect::Sqlite) if options.offset > 0 => {
            out.push_str(&format!(" LIMIT -1 OFFSET {}", options.offset))
        }
        (None, Dialect::Postgres) if options.offset > 0 => {
            out.push_str(&format!(" OFFSET {}", options.offset))
        }
        _ => {}
    }
    out
}
