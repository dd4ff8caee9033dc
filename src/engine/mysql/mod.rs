//! `MySQL` Database Engine Implementation
//!
//! This module implements the `DatabaseEngine` trait for `MySQL` databases (including `MariaDB`).
//!
//! # Features
//! - Client-server connections via TCP through the driver's own pool
//! - Schema introspection via `information_schema` for the connected database
//! - Dry-run validation via `EXPLAIN`
//!
//! # Implementation Notes
//! - Uses `mysql_async` (async driver, requires tokio runtime)
//! - Pool constrained to the configured size; sessions set `TRANSACTION READ ONLY`
//! - ENUM and SET types converted to strings
//! - BLOB data is Base64-encoded when it is not valid UTF-8
//! - Row limits enforced while streaming the result

use mysql_async::prelude::*;
use mysql_async::{Conn, OptsBuilder, Pool, PoolConstraints, PoolOpts, Row, Value};
use std::collections::BTreeMap;
use std::time::Instant;
use tracing::debug;

use crate::catalog::{Column, ForeignKey, Schema};
use crate::engine::{ConnectionConfig, DatabaseEngine, DatabaseType, ExecutionResult};
use crate::error::{AskError, Result};

/// `MySQL` database engine implementation
#[derive(Debug)]
pub struct MySqlEngine {
    pool: Pool,
    closed: std::sync::atomic::AtomicBool,
}

impl MySqlEngine {
    /// Create an engine for the server named by `config`
    ///
    /// No connection is opened until first use.
    ///
    /// # Errors
    /// Returns `AskError::InvalidInput` for a non-`MySQL` config or missing parameters.
    pub fn new(config: &ConnectionConfig) -> Result<Self> {
        if config.engine != DatabaseType::MySQL {
            return Err(AskError::invalid_input(format!(
                "Expected MySQL engine, got {}",
                config.engine
            )));
        }

        Ok(Self {
            pool: Pool::new(build_mysql_opts(config)?),
            closed: std::sync::atomic::AtomicBool::new(false),
        })
    }

    async fn acquire(&self) -> Result<Conn> {
        if self.closed.load(std::sync::atomic::Ordering::Acquire) {
            return Err(AskError::connection_failed("Connection pool is closed"));
        }
        self.pool
            .get_conn()
            .await
            .map_err(|e| AskError::connection_failed(format!("Failed to connect to MySQL: {e}")))
    }
}

impl DatabaseEngine for MySqlEngine {
    fn dialect(&self) -> DatabaseType {
        DatabaseType::MySQL
    }

    async fn ping(&self) -> Result<()> {
        let mut conn = self.acquire().await?;
        let version: Option<String> = conn.query_first("SELECT VERSION()").await.map_err(|e| {
            AskError::connection_failed(format!("Failed to query MySQL version: {e}"))
        })?;

        debug!(version = ?version, "mysql ping");
        Ok(())
    }

    async fn introspect(&self) -> Result<Schema> {
        let mut conn = self.acquire().await?;
        introspect_schema(&mut conn).await
    }

    async fn explain(&self, sql: &str) -> Result<()> {
        let mut conn = self.acquire().await?;
        let explain = format!("{} {sql}", DatabaseType::MySQL.explain_prefix());

        conn.query_drop(explain).await.map_err(|e| AskError::execution(server_message(&e)))
    }

    async fn execute(&self, sql: &str, max_rows: usize) -> Result<ExecutionResult> {
        let mut conn = self.acquire().await?;
        let start = Instant::now();

        let mut result =
            conn.query_iter(sql).await.map_err(|e| AskError::execution(server_message(&e)))?;

        let fields: Vec<String> =
            result.columns_ref().iter().map(|c| c.name_str().into_owned()).collect();

        // Rows are read one at a time; the pool discards whatever is left unread
        let mut rows_data = Vec::new();
        while rows_data.len() < max_rows {
            match result.next().await.map_err(|e| AskError::execution(server_message(&e)))? {
                Some(row) => rows_data.push(row_to_json(&fields, &row)?),
                None => break,
            }
        }
        drop(result);

        Ok(ExecutionResult {
            row_count: rows_data.len(),
            rows: rows_data,
            fields,
            duration_ms: u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX),
        })
    }

    async fn close(&self) {
        if !self.closed.swap(true, std::sync::atomic::Ordering::AcqRel) {
            if let Err(e) = self.pool.clone().disconnect().await {
                debug!("mysql pool disconnect: {e}");
            }
        }
    }
}

/// Build `MySQL` connection options from `ConnectionConfig`
fn build_mysql_opts(config: &ConnectionConfig) -> Result<OptsBuilder> {
    let host = config
        .host
        .as_ref()
        .ok_or_else(|| AskError::invalid_input("MySQL requires 'host' parameter"))?;

    let port = config
        .port
        .ok_or_else(|| AskError::invalid_input("MySQL requires 'port' parameter"))?;

    let user = config
        .user
        .as_ref()
        .ok_or_else(|| AskError::invalid_input("MySQL requires 'user' parameter"))?;

    let database = config
        .database
        .as_ref()
        .ok_or_else(|| AskError::invalid_input("MySQL requires 'database' parameter"))?;

    let constraints = PoolConstraints::new(0, config.pool_size())
        .ok_or_else(|| AskError::invalid_input("Invalid MySQL pool size"))?;

    let opts = OptsBuilder::default()
        .ip_or_hostname(host)
        .tcp_port(port)
        .user(Some(user))
        .pass(config.password.as_ref())
        .db_name(Some(database))
        .pool_opts(PoolOpts::default().with_constraints(constraints))
        .setup(vec!["SET SESSION TRANSACTION READ ONLY"]);

    Ok(opts)
}

/// Server message without the driver's `ERROR <state> (<code>)` prefix
fn server_message(err: &mysql_async::Error) -> String {
    match err {
        mysql_async::Error::Server(server) => server.message.clone(),
        other => other.to_string(),
    }
}

/// Typed cell of an introspection row
fn cell<T: FromValue>(row: &Row, idx: usize) -> Result<T> {
    match row.get_opt::<T, usize>(idx) {
        Some(Ok(value)) => Ok(value),
        Some(Err(e)) => Err(AskError::schema(format!("Unexpected value in column {idx}: {e}"))),
        None => Err(AskError::schema(format!("Missing column {idx} in introspection row"))),
    }
}

async fn introspect_schema(conn: &mut Conn) -> Result<Schema> {
    let database: Option<String> = conn
        .query_first("SELECT DATABASE()")
        .await
        .map_err(|e| AskError::schema(format!("Failed to query current database: {e}")))?
        .flatten();
    let database =
        database.ok_or_else(|| AskError::schema("No database selected for introspection"))?;

    let table_rows: Vec<Row> = conn
        .exec(
            "SELECT table_name
             FROM information_schema.tables
             WHERE table_schema = ?
             ORDER BY table_name",
            (database.as_str(),),
        )
        .await
        .map_err(|e| AskError::schema(format!("Failed to list tables in '{database}': {e}")))?;

    let mut tables: BTreeMap<String, Vec<Column>> = BTreeMap::new();
    for row in &table_rows {
        tables.insert(cell(row, 0)?, Vec::new());
    }

    let column_rows: Vec<Row> = conn
        .exec(
            "SELECT table_name, column_name, column_type, is_nullable, column_default
             FROM information_schema.columns
             WHERE table_schema = ?
             ORDER BY table_name, ordinal_position",
            (database.as_str(),),
        )
        .await
        .map_err(|e| AskError::schema(format!("Failed to query columns in '{database}': {e}")))?;

    for row in &column_rows {
        let table: String = cell(row, 0)?;
        if let Some(columns) = tables.get_mut(&table) {
            let is_nullable: String = cell(row, 3)?;
            columns.push(Column {
                name: cell(row, 1)?,
                data_type: cell(row, 2)?,
                nullable: is_nullable == "YES",
                default: cell(row, 4)?,
            });
        }
    }

    let fk_rows: Vec<Row> = conn
        .exec(
            "SELECT table_name, column_name, referenced_table_name, referenced_column_name
             FROM information_schema.key_column_usage
             WHERE table_schema = ?
               AND referenced_table_name IS NOT NULL
             ORDER BY table_name, constraint_name, ordinal_position",
            (database.as_str(),),
        )
        .await
        .map_err(|e| AskError::schema(format!("Failed to query foreign keys: {e}")))?;

    let foreign_keys = fk_rows
        .iter()
        .map(|row| {
            Ok(ForeignKey {
                table: cell(row, 0)?,
                column: cell(row, 1)?,
                foreign_table: cell(row, 2)?,
                foreign_column: cell(row, 3)?,
            })
        })
        .collect::<Result<Vec<_>>>()?;

    Ok(Schema { tables, foreign_keys })
}

/// Convert a `MySQL` row to a JSON object keyed by column name
fn row_to_json(fields: &[String], row: &Row) -> Result<serde_json::Map<String, serde_json::Value>> {
    let mut map = serde_json::Map::with_capacity(fields.len());

    for (idx, name) in fields.iter().enumerate() {
        map.insert(name.clone(), mysql_value_to_json(row, idx)?);
    }

    Ok(map)
}

/// Convert `MySQL` value to JSON value
fn mysql_value_to_json(row: &Row, idx: usize) -> Result<serde_json::Value> {
    let value = row
        .as_ref(idx)
        .ok_or_else(|| AskError::execution(format!("Failed to get value at index {idx}")))?;

    Ok(value_to_json(value))
}

fn value_to_json(value: &Value) -> serde_json::Value {
    match value {
        Value::NULL => serde_json::Value::Null,

        Value::Bytes(bytes) => match std::str::from_utf8(bytes) {
            Ok(s) => serde_json::Value::String(s.to_string()),
            Err(_) => {
                use base64::Engine;
                serde_json::Value::String(base64::engine::general_purpose::STANDARD.encode(bytes))
            }
        },

        Value::Int(i) => serde_json::Value::from(*i),
        Value::UInt(u) => serde_json::Value::from(*u),

        // NaN/Infinity become null
        Value::Float(f) => serde_json::Value::from(f64::from(*f)),
        Value::Double(d) => serde_json::Value::from(*d),

        Value::Date(year, month, day, hour, minute, second, micro) => serde_json::Value::String(
            format!("{year:04}-{month:02}-{day:02}T{hour:02}:{minute:02}:{second:02}.{micro:06}"),
        ),

        Value::Time(is_negative, days, hours, minutes, seconds, micros) => {
            let sign = if *is_negative { "-" } else { "" };
            let total_hours = days * 24 + u32::from(*hours);
            serde_json::Value::String(format!(
                "{sign}{total_hours}:{minutes:02}:{seconds:02}.{micros:06}"
            ))
        }
    }
}
