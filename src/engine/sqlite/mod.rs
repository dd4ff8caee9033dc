//! `SQLite` Database Engine Implementation
//!
//! This module implements the `DatabaseEngine` trait for `SQLite` databases.
//!
//! # Features
//! - File-based connections opened read-only
//! - Schema introspection via `sqlite_master` and the `pragma_*` table functions
//! - Dry-run validation via `EXPLAIN QUERY PLAN`
//!
//! # Implementation Notes
//! - Uses `rusqlite` (synchronous driver; calls run after the last await point)
//! - BLOB data is Base64-encoded for JSON safety
//! - Lock waits bounded via `busy_timeout`
//! - Row limits enforced in application code
//! - No explicit schema support (`SQLite` uses catalogs)

use rusqlite::{Connection, OpenFlags, OptionalExtension, Row};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tracing::debug;

use crate::catalog::{Column, ForeignKey, Schema};
use crate::engine::pool::{Pool, Pooled};
use crate::engine::{ConnectionConfig, DatabaseEngine, DatabaseType, ExecutionResult};
use crate::error::{AskError, Result};

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// `SQLite` database engine implementation
pub struct SqliteEngine {
    path: PathBuf,
    pool: Pool<Connection>,
}

impl std::fmt::Debug for SqliteEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteEngine").field("path", &self.path).field("pool", &self.pool).finish()
    }
}

impl SqliteEngine {
    /// Create an engine for the database file named by `config`
    ///
    /// No connection is opened until first use.
    ///
    /// # Errors
    /// Returns `AskError::InvalidInput` if `config` is not a `SQLite` config with a file.
    pub fn new(config: &ConnectionConfig) -> Result<Self> {
        if config.engine != DatabaseType::SQLite {
            return Err(AskError::invalid_input(format!(
                "Expected SQLite engine, got {}",
                config.engine
            )));
        }

        let path = config
            .file
            .clone()
            .ok_or_else(|| AskError::invalid_input("SQLite requires 'file' parameter"))?;

        Ok(Self { path, pool: Pool::new(config.pool_size()) })
    }

    async fn acquire(&self) -> Result<Pooled<'_, Connection>> {
        self.pool.acquire_with(|| async { open_connection(&self.path) }).await
    }
}

impl DatabaseEngine for SqliteEngine {
    fn dialect(&self) -> DatabaseType {
        DatabaseType::SQLite
    }

    async fn ping(&self) -> Result<()> {
        let conn = self.acquire().await?;
        conn.query_row("SELECT sqlite_version()", [], |row| row.get::<_, String>(0))
            .map(|version| debug!(version = %version, "sqlite ping"))
            .map_err(|e| AskError::connection_failed(format!("Failed to query SQLite version: {e}")))
    }

    async fn introspect(&self) -> Result<Schema> {
        let conn = self.acquire().await?;
        introspect_schema(&conn)
    }

    async fn explain(&self, sql: &str) -> Result<()> {
        let conn = self.acquire().await?;
        explain_query(&conn, sql)
    }

    async fn execute(&self, sql: &str, max_rows: usize) -> Result<ExecutionResult> {
        let conn = self.acquire().await?;
        execute_query(&conn, sql, max_rows)
    }

    async fn close(&self) {
        self.pool.close();
    }
}

/// Open a read-only `SQLite` connection
fn open_connection(path: &Path) -> Result<Connection> {
    let flags = OpenFlags::SQLITE_OPEN_READ_ONLY
        | OpenFlags::SQLITE_OPEN_URI
        | OpenFlags::SQLITE_OPEN_NO_MUTEX;

    let conn = Connection::open_with_flags(path, flags).map_err(|e| {
        AskError::connection_failed(format!("Failed to open SQLite database: {e}"))
    })?;

    conn.busy_timeout(BUSY_TIMEOUT)
        .map_err(|e| AskError::connection_failed(format!("Failed to set busy timeout: {e}")))?;

    Ok(conn)
}

/// Tables and views, their columns in declared order, then every foreign key
fn introspect_schema(conn: &Connection) -> Result<Schema> {
    let mut stmt = conn
        .prepare(
            "SELECT name FROM sqlite_master
             WHERE type IN ('table', 'view')
             AND name NOT LIKE 'sqlite_%'
             ORDER BY name",
        )
        .map_err(|e| AskError::schema(format!("Failed to query tables: {e}")))?;

    let table_names: Vec<String> = stmt
        .query_map([], |row| row.get(0))
        .and_then(|rows| rows.collect())
        .map_err(|e| AskError::schema(format!("Failed to fetch table names: {e}")))?;

    let mut schema = Schema::new();
    for table in &table_names {
        let columns = introspect_columns(conn, table)?;
        schema.tables.insert(table.clone(), columns);
    }

    for table in &table_names {
        schema.foreign_keys.extend(introspect_foreign_keys(conn, table)?);
    }

    Ok(schema)
}

fn introspect_columns(conn: &Connection, table: &str) -> Result<Vec<Column>> {
    let mut stmt = conn
        .prepare(
            "SELECT name, type, \"notnull\", dflt_value
             FROM pragma_table_info(?1)
             ORDER BY cid",
        )
        .map_err(|e| AskError::schema(format!("Failed to prepare columns for {table}: {e}")))?;

    stmt.query_map([table], |row| {
        Ok(Column {
            name: row.get(0)?,
            data_type: row.get(1)?,
            nullable: row.get::<_, i64>(2)? == 0, // notnull: 0 = nullable, 1 = not null
            default: row.get(3)?,
        })
    })
    .and_then(|rows| rows.collect())
    .map_err(|e| AskError::schema(format!("Failed to query columns for {table}: {e}")))
}

fn introspect_foreign_keys(conn: &Connection, table: &str) -> Result<Vec<ForeignKey>> {
    let mut stmt = conn
        .prepare(
            "SELECT \"table\", \"from\", \"to\"
             FROM pragma_foreign_key_list(?1)
             ORDER BY id, seq",
        )
        .map_err(|e| {
            AskError::schema(format!("Failed to prepare foreign keys for {table}: {e}"))
        })?;

    let edges: Vec<(String, String, Option<String>)> = stmt
        .query_map([table], |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)))
        .and_then(|rows| rows.collect())
        .map_err(|e| AskError::schema(format!("Failed to query foreign keys for {table}: {e}")))?;

    let mut foreign_keys = Vec::with_capacity(edges.len());
    for (foreign_table, column, to) in edges {
        // `REFERENCES t` without a column list targets the primary key
        let foreign_column = match to {
            Some(col) => col,
            None => primary_key_column(conn, &foreign_table)?.unwrap_or_default(),
        };
        foreign_keys.push(ForeignKey {
            table: table.to_string(),
            column,
            foreign_table,
            foreign_column,
        });
    }

    Ok(foreign_keys)
}

fn primary_key_column(conn: &Connection, table: &str) -> Result<Option<String>> {
    conn.query_row(
        "SELECT name FROM pragma_table_info(?1) WHERE pk > 0 ORDER BY pk LIMIT 1",
        [table],
        |row| row.get(0),
    )
    .optional()
    .map_err(|e| AskError::schema(format!("Failed to query primary key for {table}: {e}")))
}

/// Prepare and step `EXPLAIN QUERY PLAN <sql>`; engine messages are kept verbatim
fn explain_query(conn: &Connection, sql: &str) -> Result<()> {
    let explain = format!("{} {sql}", DatabaseType::SQLite.explain_prefix());

    let mut stmt = conn.prepare(&explain).map_err(|e| AskError::execution(e.to_string()))?;
    let mut rows = stmt.query([]).map_err(|e| AskError::execution(e.to_string()))?;
    while rows.next().map_err(|e| AskError::execution(e.to_string()))?.is_some() {}

    Ok(())
}

/// Execute query and collect at most `max_rows` rows
fn execute_query(conn: &Connection, sql: &str, max_rows: usize) -> Result<ExecutionResult> {
    let start = Instant::now();

    let mut stmt = conn
        .prepare(sql)
        .map_err(|e| AskError::execution(format!("Failed to prepare query: {e}")))?;

    let fields: Vec<String> = stmt.column_names().iter().map(|s| (*s).to_string()).collect();

    let mut rows = stmt
        .query([])
        .map_err(|e| AskError::execution(format!("Failed to execute query: {e}")))?;

    let mut rows_data = Vec::new();
    while rows_data.len() < max_rows {
        match rows.next() {
            Ok(Some(row)) => rows_data.push(
                row_to_json(&fields, row)
                    .map_err(|e| AskError::execution(format!("Failed to fetch row: {e}")))?,
            ),
            Ok(None) => break,
            Err(e) => return Err(AskError::execution(format!("Failed to fetch row: {e}"))),
        }
    }

    Ok(ExecutionResult {
        row_count: rows_data.len(),
        rows: rows_data,
        fields,
        duration_ms: u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX),
    })
}

/// Convert a `SQLite` row to a JSON object keyed by column name
fn row_to_json(
    fields: &[String],
    row: &Row,
) -> std::result::Result<serde_json::Map<String, serde_json::Value>, rusqlite::Error> {
    let mut values = serde_json::Map::with_capacity(fields.len());

    for (idx, name) in fields.iter().enumerate() {
        values.insert(name.clone(), sqlite_value_to_json(row, idx)?);
    }

    Ok(values)
}

/// Convert `SQLite` value to JSON value
fn sqlite_value_to_json(
    row: &Row,
    idx: usize,
) -> std::result::Result<serde_json::Value, rusqlite::Error> {
    use rusqlite::types::ValueRef;

    Ok(match row.get_ref(idx)? {
        ValueRef::Null => serde_json::Value::Null,
        ValueRef::Integer(i) => serde_json::Value::Number(i.into()),
        ValueRef::Real(f) => serde_json::Number::from_f64(f)
            .map_or(serde_json::Value::Null, serde_json::Value::Number), // NaN/Infinity as null
        ValueRef::Text(s) => serde_json::Value::String(String::from_utf8_lossy(s).into_owned()),
        ValueRef::Blob(b) => {
            use base64::Engine;
            serde_json::Value::String(base64::engine::general_purpose::STANDARD.encode(b))
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn temp_db(name: &str, ddl: &str) -> PathBuf {
        let path = std::env::temp_dir().join(format!("askdb_{name}_{}.db", std::process::id()));
        let _ = std::fs::remove_file(&path);
        let conn = Connection::open(&path).expect("Failed to create temp database");
        conn.execute_batch(ddl).expect("Failed to apply DDL");
        path
    }

    fn engine_for(path: &Path) -> SqliteEngine {
        SqliteEngine::new(&ConnectionConfig::sqlite(path.to_path_buf())).unwrap()
    }

    #[test]
    fn test_new_wrong_engine() {
        let mut config = ConnectionConfig::sqlite("/tmp/x.db".into());
        config.engine = DatabaseType::Postgres;

        let err = SqliteEngine::new(&config).unwrap_err();
        assert!(err.message().contains("Expected SQLite engine"));
    }

    #[test]
    fn test_new_missing_file() {
        let mut config = ConnectionConfig::sqlite("/tmp/x.db".into());
        config.file = None;

        let err = SqliteEngine::new(&config).unwrap_err();
        assert!(err.message().contains("SQLite requires 'file' parameter"));
    }

    #[tokio::test]
    async fn test_ping_missing_database_fails() {
        let path = std::env::temp_dir().join("askdb_definitely_missing.db");
        let _ = std::fs::remove_file(&path);

        let err = engine_for(&path).ping().await.unwrap_err();
        assert_eq!(err.error_code(), "CONNECTION_FAILED");
    }

    #[tokio::test]
    async fn test_introspect_columns_in_declared_order() {
        let path = temp_db(
            "introspect",
            "CREATE TABLE users (
                id INTEGER PRIMARY KEY,
                name TEXT NOT NULL,
                email TEXT DEFAULT 'none'
            );",
        );

        let schema = engine_for(&path).introspect().await.unwrap();
        let (_, columns) = schema.find_table("users").unwrap();

        assert_eq!(
            columns,
            &[
                Column::new("id", "INTEGER", true, None),
                Column::new("name", "TEXT", false, None),
                Column::new("email", "TEXT", true, Some("'none'".to_string())),
            ]
        );

        let _ = std::fs::remove_file(&path);
    }

    #[tokio::test]
    async fn test_introspect_foreign_keys() {
        let path = temp_db(
            "fk",
            "CREATE TABLE users (id INTEGER PRIMARY KEY, name TEXT);
             CREATE TABLE posts (
                id INTEGER PRIMARY KEY,
                user_id INTEGER REFERENCES users(id),
                editor_id INTEGER REFERENCES users
             );",
        );

        let schema = engine_for(&path).introspect().await.unwrap();

        let mut edges: Vec<(&str, &str, &str, &str)> = schema
            .foreign_keys
            .iter()
            .map(|fk| {
                (
                    fk.table.as_str(),
                    fk.column.as_str(),
                    fk.foreign_table.as_str(),
                    fk.foreign_column.as_str(),
                )
            })
            .collect();
        edges.sort_unstable();

        assert_eq!(
            edges,
            vec![("posts", "editor_id", "users", "id"), ("posts", "user_id", "users", "id")]
        );

        let _ = std::fs::remove_file(&path);
    }

    #[tokio::test]
    async fn test_explain_reports_engine_message() {
        let path = temp_db("explain", "CREATE TABLE orders (id INTEGER, total REAL);");
        let engine = engine_for(&path);

        assert!(engine.explain("SELECT \"total\" FROM \"orders\"").await.is_ok());

        let err = engine.explain("SELECT \"totl\" FROM \"orders\"").await.unwrap_err();
        assert_eq!(err.error_code(), "EXECUTION_ERROR");
        assert!(err.message().contains("no such column: totl"), "{}", err.message());

        let err = engine.explain("SELECT * FROM ordrs").await.unwrap_err();
        assert!(err.message().contains("no such table: ordrs"), "{}", err.message());

        let _ = std::fs::remove_file(&path);
    }

    #[tokio::test]
    async fn test_connection_is_read_only() {
        let path = temp_db("readonly", "CREATE TABLE users (id INTEGER PRIMARY KEY, name TEXT);");

        let result = engine_for(&path).execute("INSERT INTO users (name) VALUES ('x')", 10).await;
        assert!(result.is_err());

        let _ = std::fs::remove_file(&path);
    }

    #[tokio::test]
    async fn test_execute_max_rows_limit() {
        let path = temp_db(
            "max_rows",
            "CREATE TABLE users (id INTEGER PRIMARY KEY, name TEXT);
             WITH RECURSIVE n(i) AS (SELECT 1 UNION ALL SELECT i + 1 FROM n WHERE i < 10)
             INSERT INTO users (name) SELECT 'User ' || i FROM n;",
        );

        let result = engine_for(&path).execute("SELECT * FROM users", 5).await.unwrap();
        assert_eq!(result.rows.len(), 5);
        assert_eq!(result.row_count, 5);
        assert_eq!(result.fields, vec!["id", "name"]);

        let _ = std::fs::remove_file(&path);
    }

    #[tokio::test]
    async fn test_execute_all_data_types() {
        let path = temp_db(
            "data_types",
            "CREATE TABLE test_types (
                int_col INTEGER,
                real_col REAL,
                text_col TEXT,
                blob_col BLOB,
                null_col TEXT
            );
            INSERT INTO test_types VALUES (42, 2.5, 'hello', x'010203', NULL);",
        );

        let result = engine_for(&path).execute("SELECT * FROM test_types", 10).await.unwrap();
        assert_eq!(result.row_count, 1);

        let row = &result.rows[0];
        assert_eq!(row["int_col"], serde_json::json!(42));
        assert_eq!(row["real_col"], serde_json::json!(2.5));
        assert_eq!(row["text_col"], serde_json::json!("hello"));
        assert_eq!(row["blob_col"], serde_json::json!("AQID"));
        assert_eq!(row["null_col"], serde_json::Value::Null);

        let _ = std::fs::remove_file(&path);
    }

    #[tokio::test]
    async fn test_closed_engine_rejects_requests() {
        let path = temp_db("closed", "CREATE TABLE t (id INTEGER);");
        let engine = engine_for(&path);

        engine.close().await;
        let err = engine.execute("SELECT * FROM t", 10).await.unwrap_err();
        assert_eq!(err.error_code(), "CONNECTION_FAILED");

        let _ = std::fs::remove_file(&path);
    }
}
