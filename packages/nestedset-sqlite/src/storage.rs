use std::path::Path;
use std::time::Duration;

use rusqlite::types::Value as SqlParam;
use rusqlite::{params, params_from_iter, Connection, ErrorCode, Row};
use tracing::{trace, warn};

use nestedset_core::sql::{self, Dialect, SqlValue};
use nestedset_core::{
    BoundField, Delta, Error, Field, Filter, FindOptions, GroupKey, Node, NodeId, NodePatch,
    RecordStore,
};

const COLUMNS: &str = "id, parent, lft, rgt, lvl, grp";

/// SQLite-backed `RecordStore`. Records live in a single `nodes` table; `seq` preserves
/// insertion order for unsorted reads.
pub struct SqliteRecordStore {
    conn: Connection,
    in_transaction: bool,
}

fn storage_err(e: rusqlite::Error) -> Error {
    Error::Storage(e.to_string())
}

impl SqliteRecordStore {
    pub fn new_in_memory() -> nestedset_core::Result<Self> {
        let conn = Connection::open_in_memory().map_err(storage_err)?;
        Self::from_connection(conn)
    }

    pub fn new(path: impl AsRef<Path>) -> nestedset_core::Result<Self> {
        let conn = Connection::open(path).map_err(storage_err)?;
        conn.busy_timeout(Duration::from_secs(5))
            .map_err(storage_err)?;
        Self::from_connection(conn)
    }

    pub fn from_connection(conn: Connection) -> nestedset_core::Result<Self> {
        let mut storage = Self {
            conn,
            in_transaction: false,
        };
        storage.ensure_schema()?;
        Ok(storage)
    }

    fn ensure_schema(&mut self) -> nestedset_core::Result<()> {
        self.conn
            .execute_batch(
                "CREATE TABLE IF NOT EXISTS nodes (
                    seq INTEGER PRIMARY KEY AUTOINCREMENT,
                    id BLOB NOT NULL UNIQUE,
                    parent BLOB,
                    lft INTEGER CHECK (lft >= 0),
                    rgt INTEGER CHECK (rgt >= 0),
                    lvl INTEGER NOT NULL DEFAULT 0 CHECK (lvl BETWEEN 0 AND 4294967295),
                    grp BLOB
                );
                CREATE INDEX IF NOT EXISTS idx_nodes_parent ON nodes(parent);
                CREATE INDEX IF NOT EXISTS idx_nodes_bounds ON nodes(grp, lft, rgt);",
            )
            .map_err(storage_err)
    }

    /// Direct access for callers that keep their own columns next to the tree.
    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    fn execute_batch(&self, sql: &str) -> nestedset_core::Result<()> {
        self.conn.execute_batch(sql).map_err(storage_err)
    }
}

impl RecordStore for SqliteRecordStore {
    fn find_by_id(&self, id: NodeId, scope: &Filter) -> nestedset_core::Result<Option<Node>> {
        let filter = scope.clone().eq(Field::Id, id);
        Ok(self
            .find_many(&filter, &FindOptions::default())?
            .into_iter()
            .next())
    }

    fn find_many(&self, filter: &Filter, options: &FindOptions) -> nestedset_core::Result<Vec<Node>> {
        let rendered = sql::render_filter(filter, Dialect::Sqlite, 1)?;
        let query = format!(
            "SELECT {COLUMNS} FROM nodes WHERE {}{}",
            rendered.clause,
            sql::render_shape(options, Dialect::Sqlite)
        );
        trace!(%query, "find_many");
        let mut stmt = self.conn.prepare(&query).map_err(storage_err)?;
        let rows = stmt
            .query_map(params_from_iter(bind(&rendered.params)), row_to_node)
            .map_err(storage_err)?;

        let mut nodes = Vec::new();
        for row in rows {
            let mut node = row.map_err(storage_err)?;
            if let Some(fields) = &options.projection {
                node.project(fields);
            }
            nodes.push(node);
        }
        Ok(nodes)
    }

    fn count(&self, filter: &Filter) -> nestedset_core::Result<usize> {
        let rendered = sql::render_filter(filter, Dialect::Sqlite, 1)?;
        let query = format!("SELECT COUNT(*) FROM nodes WHERE {}", rendered.clause);
        let count: i64 = self
            .conn
            .query_row(&query, params_from_iter(bind(&rendered.params)), |row| {
                row.get(0)
            })
            .map_err(storage_err)?;
        usize::try_from(count).map_err(|_| Error::Storage("negative count".into()))
    }

    fn update_many(&mut self, filter: &Filter, delta: Delta) -> nestedset_core::Result<usize> {
        let col = sql::column(Field::from(delta.field));
        let rendered = sql::render_filter(filter, Dialect::Sqlite, 2)?;
        let query = format!(
            "UPDATE nodes SET {col} = {col} + ?1 WHERE {}",
            rendered.clause
        );
        let mut values = vec![SqlParam::Integer(delta.amount)];
        values.extend(bind(&rendered.params));
        let changed = match self.conn.execute(&query, params_from_iter(values)) {
            Ok(changed) => changed,
            Err(rusqlite::Error::SqliteFailure(e, _))
                if e.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_CHECK =>
            {
                return Err(Error::InconsistentState(format!(
                    "shifting {:?} by {} leaves the valid range",
                    delta.field, delta.amount
                )));
            }
            Err(e) => return Err(storage_err(e)),
        };
        trace!(field = ?delta.field, amount = delta.amount, changed, "update_many");
        Ok(changed)
    }

    fn update_one(&mut self, id: NodeId, patch: &NodePatch) -> nestedset_core::Result<Node> {
        let mut sets = Vec::new();
        let mut values = Vec::new();
        for (field, value) in [
            (BoundField::Lft, patch.lft),
            (BoundField::Rgt, patch.rgt),
            (BoundField::Lvl, patch.lvl.map(u64::from)),
        ] {
            if let Some(value) = value {
                values.push(SqlParam::Integer(sql::int_param(value)?));
                sets.push(format!(
                    "{} = ?{}",
                    sql::column(Field::from(field)),
                    values.len()
                ));
            }
        }
        if !sets.is_empty() {
            values.push(SqlParam::Blob(id.to_bytes().to_vec()));
            let query = format!(
                "UPDATE nodes SET {} WHERE id = ?{}",
                sets.join(", "),
                values.len()
            );
            self.conn
                .execute(&query, params_from_iter(values))
                .map_err(storage_err)?;
        }
        self.find_by_id(id, &Filter::all())?
            .ok_or(Error::NotFound(id))
    }

    fn insert(&mut self, node: Node) -> nestedset_core::Result<()> {
        let result = self.conn.execute(
            &format!("INSERT INTO nodes ({COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6)"),
            params![
                node.id.to_bytes().to_vec(),
                node.parent.map(|p| p.to_bytes().to_vec()),
                node.lft.map(sql::int_param).transpose()?,
                node.rgt.map(sql::int_param).transpose()?,
                i64::from(node.lvl),
                node.group.as_ref().map(|g| g.as_bytes().to_vec()),
            ],
        );
        match result {
            Ok(_) => Ok(()),
            Err(rusqlite::Error::SqliteFailure(e, _))
                if e.code == ErrorCode::ConstraintViolation
                    && e.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE =>
            {
                Err(Error::InvalidOperation(format!("node {} already exists", node.id)))
            }
            Err(e) => Err(storage_err(e)),
        }
    }

    fn remove(&mut self, id: NodeId) -> nestedset_core::Result<bool> {
        let removed = self
            .conn
            .execute(
                "DELETE FROM nodes WHERE id = ?1",
                params![id.to_bytes().to_vec()],
            )
            .map_err(storage_err)?;
        Ok(removed > 0)
    }

    fn transaction<T, F>(&mut self, scope: Option<&GroupKey>, f: F) -> nestedset_core::Result<T>
    where
        F: FnOnce(&mut Self) -> nestedset_core::Result<T>,
    {
        if self.in_transaction {
            return f(self);
        }
        trace!(?scope, "BEGIN IMMEDIATE");
        self.execute_batch("BEGIN IMMEDIATE")?;
        self.in_transaction = true;
        let result = f(self);
        self.in_transaction = false;
        match result {
            Ok(value) => {
                if let Err(e) = self.execute_batch("COMMIT") {
                    let _ = self.execute_batch("ROLLBACK");
                    return Err(e);
                }
                Ok(value)
            }
            Err(e) => {
                if let Err(rollback) = self.execute_batch("ROLLBACK") {
                    warn!("rollback failed: {rollback}");
                }
                Err(e)
            }
        }
    }
}

fn bind(params: &[SqlValue]) -> Vec<SqlParam> {
    params
        .iter()
        .map(|p| match p {
            SqlValue::Int(n) => SqlParam::Integer(*n),
            SqlValue::Blob(b) => SqlParam::Blob(b.clone()),
        })
        .collect()
}

fn row_to_node(row: &Row<'_>) -> rusqlite::Result<Node> {
    let id: Vec<u8> = row.get(0)?;
    let parent: Option<Vec<u8>> = row.get(1)?;
    let lft: Option<i64> = row.get(2)?;
    let rgt: Option<i64> = row.get(3)?;
    let lvl: i64 = row.get(4)?;
    let grp: Option<Vec<u8>> = row.get(5)?;

    Ok(Node {
        id: blob_to_node(0, &id)?,
        parent: parent.map(|p| blob_to_node(1, &p)).transpose()?,
        lft: lft.map(|v| to_unsigned(2, v)).transpose()?,
        rgt: rgt.map(|v| to_unsigned(3, v)).transpose()?,
        lvl: to_unsigned(4, lvl).and_then(|v| {
            u32::try_from(v).map_err(|_| rusqlite::Error::IntegralValueOutOfRange(4, lvl))
        })?,
        group: grp.map(GroupKey::new),
    })
}

fn blob_to_node(column: usize, data: &[u8]) -> rusqlite::Result<NodeId> {
    NodeId::from_bytes(data).ok_or_else(|| {
        rusqlite::Error::InvalidColumnType(column, "node".to_string(), rusqlite::types::Type::Blob)
    })
}

fn to_unsigned(column: usize, value: i64) -> rusqlite::Result<u64> {
    u64::try_from(value).map_err(|_| rusqlite::Error::IntegralValueOutOfRange(column, value))
}
