//! `PostgreSQL` Database Engine Implementation
//!
//! This module implements the `DatabaseEngine` trait for `PostgreSQL` databases.
//!
//! # Features
//! - Client-server connections via TCP, pooled and reused across requests
//! - Schema introspection via `information_schema` for the current schema
//! - Dry-run validation via `EXPLAIN` over the extended protocol (single statement only)
//! - Rich type support (JSON/JSONB, NUMERIC, timestamps, UUID, common arrays)
//!
//! # Implementation Notes
//! - Uses `tokio-postgres` (async driver, requires tokio runtime)
//! - Every session runs with `default_transaction_read_only = on`
//! - JSON/JSONB preserved as nested JSON
//! - NUMERIC rendered as exact decimal strings
//! - BYTEA data is Base64-encoded for JSON safety
//! - Row limits enforced by a bounded portal fetch

use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::time::Instant;
use tokio_postgres::types::{FromSql, Type};
use tokio_postgres::{Client, Config, NoTls, Row};
use tracing::debug;

use crate::catalog::{Column, ForeignKey, Schema};
use crate::engine::pool::{Pool, Pooled};
use crate::engine::{ConnectionConfig, DatabaseEngine, DatabaseType, ExecutionResult};
use crate::error::{AskError, Result};

/// `PostgreSQL` database engine implementation
pub struct PostgresEngine {
    config: Config,
    pool: Pool<Client>,
}

impl std::fmt::Debug for PostgresEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PostgresEngine")
            .field("dbname", &self.config.get_dbname())
            .field("pool", &self.pool)
            .finish_non_exhaustive()
    }
}

impl PostgresEngine {
    /// Create an engine for the server named by `config`
    ///
    /// No connection is opened until first use.
    ///
    /// # Errors
    /// Returns `AskError::InvalidInput` for a non-`PostgreSQL` config or missing parameters.
    pub fn new(config: &ConnectionConfig) -> Result<Self> {
        if config.engine != DatabaseType::Postgres {
            return Err(AskError::invalid_input(format!(
                "Expected PostgreSQL engine, got {}",
                config.engine
            )));
        }

        Ok(Self {
            config: build_pg_config(config)?,
            pool: Pool::with_check(config.pool_size(), |client| !client.is_closed()),
        })
    }

    async fn acquire(&self) -> Result<Pooled<'_, Client>> {
        self.pool.acquire_with(|| connect(&self.config)).await
    }
}

impl DatabaseEngine for PostgresEngine {
    fn dialect(&self) -> DatabaseType {
        DatabaseType::Postgres
    }

    async fn ping(&self) -> Result<()> {
        let client = self.acquire().await?;
        let row = client.query_one("SELECT version()", &[]).await.map_err(|e| {
            AskError::connection_failed(format!("Failed to query PostgreSQL version: {e}"))
        })?;

        let version: String = row.get(0);
        debug!(version = %version, "postgres ping");
        Ok(())
    }

    async fn introspect(&self) -> Result<Schema> {
        let client = self.acquire().await?;
        introspect_schema(&client).await
    }

    async fn explain(&self, sql: &str) -> Result<()> {
        let mut client = self.acquire().await?;
        let explain = format!("{} {sql}", DatabaseType::Postgres.explain_prefix());

        match client.query(explain.as_str(), &[]).await {
            Ok(_) => Ok(()),
            Err(e) => {
                if e.is_closed() {
                    client.discard();
                }
                Err(AskError::execution(db_message(&e)))
            }
        }
    }

    async fn execute(&self, sql: &str, max_rows: usize) -> Result<ExecutionResult> {
        let mut client = self.acquire().await?;
        let start = Instant::now();

        // A portal fetch stops the server after `max_rows`; unread rows are never sent
        let outcome = async {
            let tx = client.transaction().await?;
            let stmt = tx.prepare(sql).await?;
            let rows = match portal_fetch_size(max_rows) {
                Some(size) => {
                    let portal = tx.bind(&stmt, &[]).await?;
                    tx.query_portal(&portal, size).await?
                }
                None => Vec::new(),
            };
            tx.rollback().await?;
            Ok::<_, tokio_postgres::Error>((stmt, rows))
        }
        .await;

        let (stmt, rows) = match outcome {
            Ok(outcome) => outcome,
            Err(e) => {
                if e.is_closed() {
                    client.discard();
                }
                return Err(AskError::execution(db_message(&e)));
            }
        };
        drop(client);

        let fields: Vec<String> = stmt.columns().iter().map(|c| c.name().to_string()).collect();

        let rows_data = rows
            .iter()
            .map(|row| row_to_json(&fields, row))
            .collect::<Result<Vec<_>>>()?;

        Ok(ExecutionResult {
            row_count: rows_data.len(),
            rows: rows_data,
            fields,
            duration_ms: u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX),
        })
    }

    async fn close(&self) {
        self.pool.close();
    }
}

/// Rows to request from a portal; `None` when nothing should be fetched
///
/// `query_portal` reads a size of 0 as "every row", so a zero cap never reaches it.
fn portal_fetch_size(max_rows: usize) -> Option<i32> {
    match i32::try_from(max_rows) {
        Ok(0) => None,
        Ok(size) => Some(size),
        Err(_) => Some(i32::MAX),
    }
}

/// Build `PostgreSQL` connection config from `ConnectionConfig`
fn build_pg_config(config: &ConnectionConfig) -> Result<Config> {
    let host = config
        .host
        .as_ref()
        .ok_or_else(|| AskError::invalid_input("PostgreSQL requires 'host' parameter"))?;

    let port = config
        .port
        .ok_or_else(|| AskError::invalid_input("PostgreSQL requires 'port' parameter"))?;

    let user = config
        .user
        .as_ref()
        .ok_or_else(|| AskError::invalid_input("PostgreSQL requires 'user' parameter"))?;

    let database = config
        .database
        .as_ref()
        .ok_or_else(|| AskError::invalid_input("PostgreSQL requires 'database' parameter"))?;

    let mut pg_config = Config::new();
    pg_config.host(host).port(port).user(user).dbname(database).application_name("askdb");
    if let Some(password) = &config.password {
        pg_config.password(password);
    }

    Ok(pg_config)
}

/// Open a read-only session
async fn connect(config: &Config) -> Result<Client> {
    let (client, connection) = config.connect(NoTls).await.map_err(|e| {
        AskError::connection_failed(format!("Failed to connect to PostgreSQL: {e}"))
    })?;

    // Connection errors are not logged to prevent credential leakage
    tokio::spawn(async move {
        let _ = connection.await;
    });

    client.batch_execute("SET default_transaction_read_only = on").await.map_err(|e| {
        AskError::connection_failed(format!("Failed to start read-only session: {e}"))
    })?;

    Ok(client)
}

/// Engine message without the driver's `db error:` decoration
fn db_message(err: &tokio_postgres::Error) -> String {
    err.as_db_error().map_or_else(|| err.to_string(), |db| db.message().to_string())
}

async fn introspect_schema(client: &Client) -> Result<Schema> {
    let row = client
        .query_one("SELECT current_schema()::text", &[])
        .await
        .map_err(|e| AskError::schema(format!("Failed to query current schema: {e}")))?;
    let namespace: String = row.get::<_, Option<String>>(0).unwrap_or_else(|| "public".to_string());

    let table_rows = client
        .query(
            "SELECT table_name::text
             FROM information_schema.tables
             WHERE table_schema = $1::text
             ORDER BY table_name",
            &[&namespace],
        )
        .await
        .map_err(|e| AskError::schema(format!("Failed to list tables in '{namespace}': {e}")))?;

    let mut tables: BTreeMap<String, Vec<Column>> =
        table_rows.iter().map(|row| (row.get(0), Vec::new())).collect();

    let column_rows = client
        .query(
            "SELECT table_name::text, column_name::text, data_type::text,
                    is_nullable::text, column_default::text
             FROM information_schema.columns
             WHERE table_schema = $1::text
             ORDER BY table_name, ordinal_position",
            &[&namespace],
        )
        .await
        .map_err(|e| AskError::schema(format!("Failed to query columns in '{namespace}': {e}")))?;

    for row in &column_rows {
        let table: String = row.get(0);
        if let Some(columns) = tables.get_mut(&table) {
            let is_nullable: String = row.get(3);
            columns.push(Column {
                name: row.get(1),
                data_type: row.get(2),
                nullable: is_nullable == "YES",
                default: row.get(4),
            });
        }
    }

    let fk_rows = client
        .query(
            "SELECT
                tc.table_name::text,
                kcu.column_name::text,
                ccu.table_name::text AS foreign_table_name,
                ccu.column_name::text AS foreign_column_name
             FROM information_schema.table_constraints AS tc
             JOIN information_schema.key_column_usage AS kcu
               ON tc.constraint_name = kcu.constraint_name
               AND tc.table_schema = kcu.table_schema
             JOIN information_schema.constraint_column_usage AS ccu
               ON ccu.constraint_name = tc.constraint_name
               AND ccu.table_schema = tc.table_schema
             WHERE tc.constraint_type = 'FOREIGN KEY'
               AND tc.table_schema = $1::text
             ORDER BY tc.table_name, tc.constraint_name, kcu.ordinal_position",
            &[&namespace],
        )
        .await
        .map_err(|e| AskError::schema(format!("Failed to query foreign keys: {e}")))?;

    let foreign_keys = fk_rows
        .iter()
        .map(|row| ForeignKey {
            table: row.get(0),
            column: row.get(1),
            foreign_table: row.get(2),
            foreign_column: row.get(3),
        })
        .collect();

    Ok(Schema { tables, foreign_keys })
}

/// Convert a `PostgreSQL` row to a JSON object keyed by column name
fn row_to_json(fields: &[String], row: &Row) -> Result<serde_json::Map<String, serde_json::Value>> {
    let mut values = serde_json::Map::with_capacity(fields.len());

    for (idx, name) in fields.iter().enumerate() {
        values.insert(name.clone(), postgres_value_to_json(row, idx)?);
    }

    Ok(values)
}

/// Read a nullable column value
fn get<'a, T: FromSql<'a>>(row: &'a Row, idx: usize) -> Result<Option<T>> {
    row.try_get::<_, Option<T>>(idx).map_err(|e| {
        AskError::execution(format!(
            "Failed to convert column '{}' ({}): {e}",
            row.columns()[idx].name(),
            row.columns()[idx].type_().name()
        ))
    })
}

fn array_to_json<T: Into<serde_json::Value>>(values: Vec<Option<T>>) -> serde_json::Value {
    serde_json::Value::Array(
        values.into_iter().map(|v| v.map_or(serde_json::Value::Null, Into::into)).collect(),
    )
}

/// Convert `PostgreSQL` value to JSON value
fn postgres_value_to_json(row: &Row, idx: usize) -> Result<serde_json::Value> {
    use serde_json::Value;

    let col_type = row.columns()[idx].type_();

    let value = match *col_type {
        Type::BOOL => get::<bool>(row, idx)?.map(Value::Bool),

        Type::INT2 => get::<i16>(row, idx)?.map(Value::from),
        Type::INT4 => get::<i32>(row, idx)?.map(Value::from),
        Type::INT8 => get::<i64>(row, idx)?.map(Value::from),
        Type::OID => get::<u32>(row, idx)?.map(Value::from),

        // NaN/Infinity become null
        Type::FLOAT4 => get::<f32>(row, idx)?.map(|v| Value::from(f64::from(v))),
        Type::FLOAT8 => get::<f64>(row, idx)?.map(Value::from),

        Type::NUMERIC => get::<PgNumeric>(row, idx)?.map(|n| Value::String(n.0)),

        Type::VARCHAR | Type::TEXT | Type::BPCHAR | Type::NAME => {
            get::<String>(row, idx)?.map(Value::String)
        }

        Type::JSON | Type::JSONB => get::<Value>(row, idx)?,

        Type::BYTEA => get::<Vec<u8>>(row, idx)?.map(|v| {
            use base64::Engine;
            Value::String(base64::engine::general_purpose::STANDARD.encode(v))
        }),

        Type::TIMESTAMP => get::<chrono::NaiveDateTime>(row, idx)?
            .map(|v| Value::String(v.format("%Y-%m-%dT%H:%M:%S%.f").to_string())),
        Type::TIMESTAMPTZ => get::<chrono::DateTime<chrono::Utc>>(row, idx)?
            .map(|v| Value::String(v.to_rfc3339())),
        Type::DATE => get::<chrono::NaiveDate>(row, idx)?
            .map(|v| Value::String(v.format("%Y-%m-%d").to_string())),
        Type::TIME => get::<chrono::NaiveTime>(row, idx)?
            .map(|v| Value::String(v.format("%H:%M:%S%.f").to_string())),

        Type::UUID => get::<uuid::Uuid>(row, idx)?.map(|v| Value::String(v.to_string())),

        Type::BOOL_ARRAY => get::<Vec<Option<bool>>>(row, idx)?.map(array_to_json),
        Type::INT2_ARRAY => get::<Vec<Option<i16>>>(row, idx)?.map(array_to_json),
        Type::INT4_ARRAY => get::<Vec<Option<i32>>>(row, idx)?.map(array_to_json),
        Type::INT8_ARRAY => get::<Vec<Option<i64>>>(row, idx)?.map(array_to_json),
        Type::FLOAT8_ARRAY => get::<Vec<Option<f64>>>(row, idx)?.map(array_to_json),
        Type::TEXT_ARRAY | Type::VARCHAR_ARRAY => {
            get::<Vec<Option<String>>>(row, idx)?.map(array_to_json)
        }

        // Anything else: raw wire bytes as text
        _ => get::<LossyText>(row, idx)?.map(|t| Value::String(t.0)),
    };

    Ok(value.unwrap_or(Value::Null))
}

/// NUMERIC decoded from the binary wire format into an exact decimal string
struct PgNumeric(String);

impl<'a> FromSql<'a> for PgNumeric {
    fn from_sql(
        _ty: &Type,
        raw: &'a [u8],
    ) -> std::result::Result<Self, Box<dyn std::error::Error + Sync + Send>> {
        decode_numeric(raw).map(PgNumeric).ok_or_else(|| "invalid NUMERIC value".into())
    }

    fn accepts(ty: &Type) -> bool {
        *ty == Type::NUMERIC
    }
}

/// Decode `ndigits, weight, sign, dscale, digits[ndigits]` (base 10000 groups)
fn decode_numeric(raw: &[u8]) -> Option<String> {
    let word = |i: usize| raw.get(i * 2..i * 2 + 2).map(|b| u16::from_be_bytes([b[0], b[1]]));

    let ndigits = usize::from(word(0)?);
    let weight = i32::from(word(1)? as i16);
    let sign = word(2)?;
    let dscale = usize::from(word(3)?);

    match sign {
        0xC000 => return Some("NaN".to_string()),
        0xD000 => return Some("Infinity".to_string()),
        0xF000 => return Some("-Infinity".to_string()),
        _ => {}
    }

    let digits = (0..ndigits).map(|i| word(4 + i)).collect::<Option<Vec<u16>>>()?;
    let digit = |idx: i32| usize::try_from(idx).ok().and_then(|i| digits.get(i).copied()).unwrap_or(0);

    let mut out = String::new();
    if sign == 0x4000 {
        out.push('-');
    }

    if weight < 0 {
        out.push('0');
    } else {
        for idx in 0..=weight {
            if idx == 0 {
                let _ = write!(out, "{}", digit(idx));
            } else {
                let _ = write!(out, "{:04}", digit(idx));
            }
        }
    }

    if dscale > 0 {
        let mut frac = String::with_capacity(dscale + 4);
        let mut idx = weight + 1;
        while frac.len() < dscale {
            let _ = write!(frac, "{:04}", digit(idx));
            idx += 1;
        }
        frac.truncate(dscale);
        out.push('.');
        out.push_str(&frac);
    }

    Some(out)
}

/// Fallback for types without a dedicated conversion
struct LossyText(String);

impl<'a> FromSql<'a> for LossyText {
    fn from_sql(
        _ty: &Type,
        raw: &'a [u8],
    ) -> std::result::Result<Self, Box<dyn std::error::Error + Sync + Send>> {
        Ok(Self(String::from_utf8_lossy(raw).into_owned()))
    }

    fn accepts(_ty: &Type) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::Engine;
    use pretty_assertions::assert_eq;

    // Live tests require a running PostgreSQL instance:
    // cargo test --features postgres -- --ignored

    fn local_config() -> ConnectionConfig {
        ConnectionConfig::postgres(
            "localhost".to_string(),
            5432,
            "postgres".to_string(),
            "postgres".to_string(),
            "postgres".to_string(),
        )
    }

    fn numeric(ndigits: u16, weight: i16, sign: u16, dscale: u16, digits: &[u16]) -> Vec<u8> {
        let mut raw = Vec::new();
        for word in [ndigits, weight as u16, sign, dscale].iter().chain(digits) {
            raw.extend_from_slice(&word.to_be_bytes());
        }
        raw
    }

    #[test]
    fn test_missing_database_error() {
        let mut config = local_config();
        config.database = None;

        let err = build_pg_config(&config).unwrap_err();
        assert!(err.message().contains("PostgreSQL requires 'database' parameter"));
    }

    #[test]
    fn test_missing_host_error() {
        let mut config = local_config();
        config.host = None;

        let err = PostgresEngine::new(&config).unwrap_err();
        assert!(err.message().contains("PostgreSQL requires 'host' parameter"));
    }

    #[test]
    fn test_wrong_engine() {
        let mut config = local_config();
        config.engine = DatabaseType::SQLite;

        let err = PostgresEngine::new(&config).unwrap_err();
        assert!(err.message().contains("Expected PostgreSQL engine"));
    }

    #[test]
    fn test_password_is_optional() {
        let mut config = local_config();
        config.password = None;
        assert!(build_pg_config(&config).is_ok());
    }

    #[test]
    fn test_decode_numeric() {
        assert_eq!(decode_numeric(&numeric(2, 0, 0, 2, &[123, 4500])).unwrap(), "123.45");
        assert_eq!(decode_numeric(&numeric(1, -1, 0, 3, &[10])).unwrap(), "0.001");
        assert_eq!(decode_numeric(&numeric(1, 1, 0, 0, &[1])).unwrap(), "10000");
        assert_eq!(decode_numeric(&numeric(1, 0, 0x4000, 0, &[42])).unwrap(), "-42");
        assert_eq!(decode_numeric(&numeric(0, 0, 0, 2, &[])).unwrap(), "0.00");
        assert_eq!(decode_numeric(&numeric(0, 0, 0xC000, 0, &[])).unwrap(), "NaN");
        assert!(decode_numeric(&[0, 1]).is_none());
    }

    #[tokio::test]
    #[ignore = "Requires running PostgreSQL instance"]
    async fn test_introspect_and_explain() {
        let engine = Engine::connect(&local_config()).await.unwrap();
        let schema = engine.introspect().await.unwrap();
        assert!(schema.table_count() > 0 || schema.is_empty());

        let err = engine.explain("SELECT no_such_column FROM pg_class").await.unwrap_err();
        assert!(err.message().contains("column \"no_such_column\" does not exist"));
    }

    #[test]
    fn test_portal_fetch_size() {
        assert_eq!(portal_fetch_size(1000), Some(1000));
        assert_eq!(portal_fetch_size(1), Some(1));
        assert_eq!(portal_fetch_size(0), None);
        assert_eq!(portal_fetch_size(usize::MAX), Some(i32::MAX));
    }

    #[tokio::test]
    #[ignore = "Requires running PostgreSQL instance"]
    async fn test_execute_stops_at_max_rows() {
        let engine = Engine::connect(&local_config()).await.unwrap();
        let result = engine
            .execute("SELECT n FROM generate_series(1, 10000000) AS n LIMIT 10000000", 1000)
            .await
            .unwrap();
        assert_eq!(result.row_count, 1000);
        assert_eq!(result.rows[999]["n"], serde_json::json!(1000));
        engine.close().await;
    }

    #[tokio::test]
    #[ignore = "Requires running PostgreSQL instance"]
    async fn test_session_is_read_only() {
        let engine = Engine::connect(&local_config()).await.unwrap();
        let err = engine.execute("CREATE TABLE askdb_should_fail (id int)", 10).await.unwrap_err();
        assert!(err.message().contains("read-only"));
    }

}
