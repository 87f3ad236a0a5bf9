use std::cell::RefCell;

use postgres::error::SqlState;
use postgres::types::ToSql;
use postgres::{Client, NoTls, Row};
use tracing::{trace, warn};

use nestedset_core::sql::{self, Dialect, SqlValue};
use nestedset_core::{
    BoundField, Delta, Error, Field, Filter, FindOptions, GroupKey, Node, NodeId, NodePatch,
    RecordStore, Result,
};

use crate::lock_key::partition_lock_key;
use crate::schema::ensure_schema;

const COLUMNS: &str = "id, parent, lft, rgt, lvl, grp";

type Param = Box<dyn ToSql + Sync>;

fn storage_debug<E: std::fmt::Debug>(e: E) -> Error {
    Error::Storage(format!("{e:?}"))
}

fn bytes_to_node(bytes: &[u8]) -> Result<NodeId> {
    NodeId::from_bytes(bytes).ok_or_else(|| Error::Storage("expected 16-byte node id".into()))
}

fn to_unsigned(column: &str, value: i64) -> Result<u64> {
    u64::try_from(value).map_err(|_| Error::Storage(format!("negative {column}: {value}")))
}

fn boxed(params: &[SqlValue]) -> Vec<Param> {
    params
        .iter()
        .map(|p| -> Param {
            match p {
                SqlValue::Int(n) => Box::new(*n),
                SqlValue::Blob(b) => Box::new(b.clone()),
            }
        })
        .collect()
}

fn refs(params: &[Param]) -> Vec<&(dyn ToSql + Sync)> {
    params.iter().map(|p| p.as_ref()).collect()
}

fn row_to_node(row: &Row) -> Result<Node> {
    let id: Vec<u8> = row.try_get(0).map_err(storage_debug)?;
    let parent: Option<Vec<u8>> = row.try_get(1).map_err(storage_debug)?;
    let lft: Option<i64> = row.try_get(2).map_err(storage_debug)?;
    let rgt: Option<i64> = row.try_get(3).map_err(storage_debug)?;
    let lvl: i64 = row.try_get(4).map_err(storage_debug)?;
    let grp: Option<Vec<u8>> = row.try_get(5).map_err(storage_debug)?;

    Ok(Node {
        id: bytes_to_node(&id)?,
        parent: parent.as_deref().map(bytes_to_node).transpose()?,
        lft: lft.map(|v| to_unsigned("lft", v)).transpose()?,
        rgt: rgt.map(|v| to_unsigned("rgt", v)).transpose()?,
        lvl: u32::try_from(lvl).map_err(|_| Error::Storage(format!("lvl out of range: {lvl}")))?,
        group: grp.map(GroupKey::new),
    })
}

/// PostgreSQL-backed `RecordStore` over one connection. Not `Sync`: give each thread its own.
pub struct PgRecordStore {
    client: RefCell<Client>,
    in_transaction: bool,
}

impl PgRecordStore {
    pub fn connect(url: &str) -> Result<Self> {
        let client = Client::connect(url, NoTls).map_err(storage_debug)?;
        Self::from_client(client)
    }

    /// Wraps an existing connection and makes sure the table exists.
    pub fn from_client(mut client: Client) -> Result<Self> {
        ensure_schema(&mut client)?;
        Ok(Self {
            client: RefCell::new(client),
            in_transaction: false,
        })
    }

    pub fn into_client(self) -> Client {
        self.client.into_inner()
    }

    fn execute(&self, query: &str, params: &[Param]) -> Result<u64> {
        self.client
            .borrow_mut()
            .execute(query, &refs(params))
            .map_err(storage_debug)
    }

    fn batch(&self, query: &str) -> Result<()> {
        self.client
            .borrow_mut()
            .batch_execute(query)
            .map_err(|e| Error::Storage(e.to_string()))
    }
}

impl RecordStore for PgRecordStore {
    fn find_by_id(&self, id: NodeId, scope: &Filter) -> Result<Option<Node>> {
        let filter = scope.clone().eq(Field::Id, id);
        Ok(self
            .find_many(&filter, &FindOptions::default())?
            .into_iter()
            .next())
    }

    fn find_many(&self, filter: &Filter, options: &FindOptions) -> Result<Vec<Node>> {
        let rendered = sql::render_filter(filter, Dialect::Postgres, 1)?;
        let query = format!(
            "SELECT {COLUMNS} FROM nestedset_nodes WHERE {}{}",
            rendered.clause,
            sql::render_shape(options, Dialect::Postgres)
        );
        trace!(%query, "find_many");
        let params = boxed(&rendered.params);
        let rows = self
            .client
            .borrow_mut()
            .query(query.as_str(), &refs(&params))
            .map_err(storage_debug)?;

        let mut nodes = Vec::with_capacity(rows.len());
        for row in &rows {
            let mut node = row_to_node(row)?;
            if let Some(fields) = &options.projection {
                node.project(fields);
            }
            nodes.push(node);
        }
        Ok(nodes)
    }

    fn count(&self, filter: &Filter) -> Result<usize> {
        let rendered = sql::render_filter(filter, Dialect::Postgres, 1)?;
        let query = format!(
            "SELECT COUNT(*) FROM nestedset_nodes WHERE {}",
            rendered.clause
        );
        let params = boxed(&rendered.params);
        let row = self
            .client
            .borrow_mut()
            .query_one(query.as_str(), &refs(&params))
            .map_err(storage_debug)?;
        let count: i64 = row.get(0);
        usize::try_from(count).map_err(|_| Error::Storage("negative count".into()))
    }

    fn update_many(&mut self, filter: &Filter, delta: Delta) -> Result<usize> {
        let col = sql::column(Field::from(delta.field));
        let rendered = sql::render_filter(filter, Dialect::Postgres, 2)?;
        let query = format!(
            "UPDATE nestedset_nodes SET {col} = {col} + $1 WHERE {}",
            rendered.clause
        );
        let mut params: Vec<Param> = vec![Box::new(delta.amount)];
        params.extend(boxed(&rendered.params));
        let result = self.client.borrow_mut().execute(query.as_str(), &refs(&params));
        let changed = match result {
            Ok(changed) => changed,
            Err(e) if e.code() == Some(&SqlState::CHECK_VIOLATION) => {
                return Err(Error::InconsistentState(format!(
                    "shifting {:?} by {} leaves the valid range",
                    delta.field, delta.amount
                )));
            }
            Err(e) => return Err(storage_debug(e)),
        };
        trace!(field = ?delta.field, amount = delta.amount, changed, "update_many");
        usize::try_from(changed).map_err(|_| Error::Storage("row count overflow".into()))
    }

    fn update_one(&mut self, id: NodeId, patch: &NodePatch) -> Result<Node> {
        let mut sets = Vec::new();
        let mut params: Vec<Param> = Vec::new();
        for (field, value) in [
            (BoundField::Lft, patch.lft),
            (BoundField::Rgt, patch.rgt),
            (BoundField::Lvl, patch.lvl.map(u64::from)),
        ] {
            if let Some(value) = value {
                params.push(Box::new(sql::int_param(value)?));
                sets.push(format!(
                    "{} = ${}",
                    sql::column(Field::from(field)),
                    params.len()
                ));
            }
        }
        if !sets.is_empty() {
            params.push(Box::new(id.to_bytes().to_vec()));
            let query = format!(
                "UPDATE nestedset_nodes SET {} WHERE id = ${}",
                sets.join(", "),
                params.len()
            );
            self.execute(&query, &params)?;
        }
        self.find_by_id(id, &Filter::all())?
            .ok_or(Error::NotFound(id))
    }

    fn insert(&mut self, node: Node) -> Result<()> {
        let params: Vec<Param> = vec![
            Box::new(node.id.to_bytes().to_vec()),
            Box::new(node.parent.map(|p| p.to_bytes().to_vec())),
            Box::new(node.lft.map(sql::int_param).transpose()?),
            Box::new(node.rgt.map(sql::int_param).transpose()?),
            Box::new(i64::from(node.lvl)),
            Box::new(node.group.as_ref().map(|g| g.as_bytes().to_vec())),
        ];
        let result = self.client.borrow_mut().execute(
            format!("INSERT INTO nestedset_nodes ({COLUMNS}) VALUES ($1, $2, $3, $4, $5, $6)")
                .as_str(),
            &refs(&params),
        );
        match result {
            Ok(_) => Ok(()),
            Err(e) if e.code() == Some(&SqlState::UNIQUE_VIOLATION) => Err(
                Error::InvalidOperation(format!("node {} already exists", node.id)),
            ),
            Err(e) => Err(storage_debug(e)),
        }
    }

    fn remove(&mut self, id: NodeId) -> Result<bool> {
        let params: Vec<Param> = vec![Box::new(id.to_bytes().to_vec())];
        let removed = self.execute("DELETE FROM nestedset_nodes WHERE id = $1", &params)?;
        Ok(removed > 0)
    }

    fn transaction<T, F>(&mut self, scope: Option<&GroupKey>, f: F) -> Result<T>
    where
        F: FnOnce(&mut Self) -> Result<T>,
    {
        if self.in_transaction {
            return f(self);
        }
        let key = partition_lock_key(scope);
        self.batch("BEGIN")?;
        let locked = self
            .client
            .borrow_mut()
            .query_one("SELECT pg_advisory_xact_lock($1)", &[&key])
            .map_err(storage_debug);
        if let Err(e) = locked {
            let _ = self.batch("ROLLBACK");
            return Err(e);
        }
        trace!(key, "partition transaction started");

        self.in_transaction = true;
        let result = f(self);
        self.in_transaction = false;
        match result {
            Ok(value) => {
                if let Err(e) = self.batch("COMMIT") {
                    let _ = self.batch("ROLLBACK");
                    return Err(e);
                }
                Ok(value)
            }
            Err(e) => {
                if let Err(rollback) = self.batch("ROLLBACK") {
                    warn!("rollback failed: {rollback}");
                }
                Err(e)
            }
        }
    }
}
