use postgres::Client;
use nestedset_core::{Error, Result};

const SCHEMA_LOCK_KEY: i64 = 0x6e65737465647365; // "nestedse"

const SCHEMA_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS nestedset_nodes (
  seq BIGSERIAL PRIMARY KEY,
  id BYTEA NOT NULL UNIQUE,
  parent BYTEA,
  lft BIGINT CHECK (lft >= 0),
  rgt BIGINT CHECK (rgt >= 0),
  lvl BIGINT NOT NULL DEFAULT 0 CHECK (lvl BETWEEN 0 AND 4294967295),
  grp BYTEA
);

CREATE INDEX IF NOT EXISTS idx_nestedset_nodes_parent
  ON nestedset_nodes (parent);

CREATE INDEX IF NOT EXISTS idx_nestedset_nodes_bounds
  ON nestedset_nodes (grp, lft, rgt);
"#;

pub fn ensure_schema(client: &mut Client) -> Result<()> {
    // `CREATE TABLE IF NOT EXISTS` can still race on the catalog; serialize across processes.
    client
        .query_one("SELECT pg_advisory_lock($1)", &[&SCHEMA_LOCK_KEY])
        .map_err(|e| Error::Storage(format!("{e:?}")))?;

    let res = client
        .batch_execute(SCHEMA_SQL)
        .map_err(|e| Error::Storage(format!("{e:?}")));

    // Locks are also released when the connection is dropped.
    let _ = client.query_one("SELECT pg_advisory_unlock($1)", &[&SCHEMA_LOCK_KEY]);

    res
}

/// Creates `schema` and points this connection's `search_path` at it, so a test gets a private
/// `nestedset_nodes` table. `schema` must be a plain identifier.
pub fn isolate_schema_for_tests(client: &mut Client, schema: &str) -> Result<()> {
    if !schema
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '_')
    {
        return Err(Error::InvalidOperation(format!(
            "schema name {schema:?} is not a plain identifier"
        )));
    }
    client
        .batch_execute(&format!(
            "CREATE SCHEMA IF NOT EXISTS {schema}; SET search_path TO {schema};"
        ))
        .map_err(|e| Error::Storage(format!("{e:?}")))?;
    ensure_schema(client)
}
