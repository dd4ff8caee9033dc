//! Database Engine Traits and Core Types
//!
//! This module defines the database collaborator of the pipeline.
//! Each engine (`PostgreSQL`, `MySQL`, `SQLite`) implements the `DatabaseEngine` trait.
//!
//! # Pooled Design
//! An engine owns a bounded connection pool for its whole lifetime. Every method
//! acquires a connection with scoped lifetime and releases it on every exit path.
//!
//! # Engine Isolation
//! Each engine implementation is completely independent.
//! Exactly one engine is active per process; [`Engine`] dispatches to it.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::catalog::Schema;
use crate::error::{AskError, Result};

pub mod pool;

#[cfg(feature = "sqlite")]
pub mod sqlite;

#[cfg(feature = "postgres")]
pub mod postgres;

#[cfg(feature = "mysql")]
pub mod mysql;

/// Default number of pooled connections per engine
pub const DEFAULT_POOL_SIZE: usize = 10;

/// Supported database engine types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DatabaseType {
    /// `PostgreSQL` database
    Postgres,
    /// `MySQL` database (includes `MariaDB`)
    MySQL,
    /// `SQLite` database
    SQLite,
}

impl DatabaseType {
    /// Get the engine name as a string
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Postgres => "postgres",
            Self::MySQL => "mysql",
            Self::SQLite => "sqlite",
        }
    }

    /// Product name used in generation prompts
    #[must_use]
    pub const fn display_name(&self) -> &'static str {
        match self {
            Self::Postgres => "PostgreSQL",
            Self::MySQL => "MySQL",
            Self::SQLite => "SQLite",
        }
    }

    /// Character used to quote identifiers
    #[must_use]
    pub const fn quote_char(&self) -> char {
        match self {
            Self::Postgres | Self::SQLite => '"',
            Self::MySQL => '`',
        }
    }

    /// Statement prefix that asks the engine for a plan without running the query
    #[must_use]
    pub const fn explain_prefix(&self) -> &'static str {
        match self {
            Self::Postgres | Self::MySQL => "EXPLAIN",
            Self::SQLite => "EXPLAIN QUERY PLAN",
        }
    }
}

impl std::fmt::Display for DatabaseType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for DatabaseType {
    type Err = AskError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "postgres" | "postgresql" => Ok(Self::Postgres),
            "mysql" | "mariadb" => Ok(Self::MySQL),
            "sqlite" => Ok(Self::SQLite),
            other => Err(AskError::invalid_input(format!("Unknown database engine '{other}'"))),
        }
    }
}

/// Connection configuration for database engines
///
/// This struct contains all parameters needed to establish a database connection.
/// Fields are engine-specific (e.g., `file` only applies to `SQLite`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectionConfig {
    /// Database engine type
    pub engine: DatabaseType,

    /// Hostname (for postgres/mysql)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,

    /// Port number (for postgres/mysql)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,

    /// Username (for postgres/mysql)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,

    /// Password (for postgres/mysql)
    /// WARNING: Sensitive data, do not log or include in error messages
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,

    /// Database name (for postgres/mysql)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub database: Option<String>,

    /// Database file path (for sqlite)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file: Option<PathBuf>,

    /// Maximum number of pooled connections
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pool_size: Option<usize>,
}

impl ConnectionConfig {
    /// Create a new `PostgreSQL` connection config
    #[must_use]
    pub const fn postgres(
        host: String,
        port: u16,
        user: String,
        password: String,
        database: String,
    ) -> Self {
        Self {
            engine: DatabaseType::Postgres,
            host: Some(host),
            port: Some(port),
            user: Some(user),
            password: Some(password),
            database: Some(database),
            file: None,
            pool_size: None,
        }
    }

    /// Create a new `MySQL` connection config
    #[must_use]
    pub const fn mysql(
        host: String,
        port: u16,
        user: String,
        password: String,
        database: String,
    ) -> Self {
        Self {
            engine: DatabaseType::MySQL,
            host: Some(host),
            port: Some(port),
            user: Some(user),
            password: Some(password),
            database: Some(database),
            file: None,
            pool_size: None,
        }
    }

    /// Create a new `SQLite` connection config
    #[must_use]
    pub const fn sqlite(file: PathBuf) -> Self {
        Self {
            engine: DatabaseType::SQLite,
            host: None,
            port: None,
            user: None,
            password: None,
            database: None,
            file: Some(file),
            pool_size: None,
        }
    }

    /// Effective pool size (never zero)
    #[must_use]
    pub fn pool_size(&self) -> usize {
        self.pool_size.unwrap_or(DEFAULT_POOL_SIZE).max(1)
    }

    /// Short human-readable target description, free of credentials
    #[must_use]
    pub fn describe(&self) -> String {
        match self.engine {
            DatabaseType::SQLite => format!(
                "sqlite:{}",
                self.file.as_ref().map_or_else(|| "?".to_string(), |f| f.display().to_string())
            ),
            engine => format!(
                "{engine}://{}:{}/{}",
                self.host.as_deref().unwrap_or("?"),
                self.port.map_or_else(|| "?".to_string(), |p| p.to_string()),
                self.database.as_deref().unwrap_or("?"),
            ),
        }
    }
}

/// Rows returned by an executed query
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionResult {
    /// Result rows, each a map of column name to value
    pub rows: Vec<serde_json::Map<String, serde_json::Value>>,

    /// Number of rows returned
    pub row_count: usize,

    /// Column names in result-set order
    pub fields: Vec<String>,

    /// Engine-side execution time
    pub duration_ms: u64,
}

/// Database engine trait
///
/// All database engines implement this trait.
/// Engines are shared across concurrent requests, so every method takes `&self`.
pub trait DatabaseEngine: Send + Sync {
    /// Dialect of the active engine
    fn dialect(&self) -> DatabaseType;

    /// Open (or reuse) one connection and run a trivial round trip
    fn ping(&self) -> impl std::future::Future<Output = Result<()>> + Send;

    /// Introspect the queryable schema
    ///
    /// Tables of the active namespace, their columns in declared ordinal order,
    /// then the foreign-key constraints across all tables.
    fn introspect(&self) -> impl std::future::Future<Output = Result<Schema>> + Send;

    /// Ask the engine for an execution plan without materializing rows
    ///
    /// `sql` must be a single statement without a trailing terminator.
    /// An engine rejection is returned as `AskError::Execution` carrying the
    /// engine's message verbatim.
    fn explain(&self, sql: &str) -> impl std::future::Future<Output = Result<()>> + Send;

    /// Execute a read-only query, returning at most `max_rows` rows
    fn execute(
        &self,
        sql: &str,
        max_rows: usize,
    ) -> impl std::future::Future<Output = Result<ExecutionResult>> + Send;

    /// Close the pool; later calls fail with `AskError::ConnectionFailed`
    fn close(&self) -> impl std::future::Future<Output = ()> + Send;
}

/// The single active engine of a process
#[derive(Debug)]
pub enum Engine {
    #[cfg(feature = "postgres")]
    Postgres(postgres::PostgresEngine),
    #[cfg(feature = "mysql")]
    MySql(mysql::MySqlEngine),
    #[cfg(feature = "sqlite")]
    Sqlite(sqlite::SqliteEngine),
}

macro_rules! dispatch {
    ($self:expr, $engine:ident => $call:expr) => {
        match $self {
            #[cfg(feature = "postgres")]
            Engine::Postgres($engine) => $call,
            #[cfg(feature = "mysql")]
            Engine::MySql($engine) => $call,
            #[cfg(feature = "sqlite")]
            Engine::Sqlite($engine) => $call,
        }
    };
}

impl Engine {
    /// Build the engine named by `config` and verify it with one round trip
    ///
    /// # Errors
    /// Returns `AskError::Config` if the engine was not compiled in,
    /// `AskError::InvalidInput` for missing parameters and
    /// `AskError::ConnectionFailed` if the database cannot be reached.
    pub async fn connect(config: &ConnectionConfig) -> Result<Self> {
        let engine = match config.engine {
            #[cfg(feature = "postgres")]
            DatabaseType::Postgres => Self::Postgres(postgres::PostgresEngine::new(config)?),
            #[cfg(feature = "mysql")]
            DatabaseType::MySQL => Self::MySql(mysql::MySqlEngine::new(config)?),
            #[cfg(feature = "sqlite")]
            DatabaseType::SQLite => Self::Sqlite(sqlite::SqliteEngine::new(config)?),
            #[allow(unreachable_patterns)]
            other => {
                return Err(AskError::config(format!(
                    "Engine '{other}' is not enabled in this build"
                )))
            }
        };

        engine.ping().await?;
        tracing::info!(target = %config.describe(), "database engine connected");
        Ok(engine)
    }
}

impl DatabaseEngine for Engine {
    fn dialect(&self) -> DatabaseType {
        dispatch!(self, e => e.dialect())
    }

    async fn ping(&self) -> Result<()> {
        dispatch!(self, e => e.ping().await)
    }

    async fn introspect(&self) -> Result<Schema> {
        dispatch!(self, e => e.introspect().await)
    }

    async fn explain(&self, sql: &str) -> Result<()> {
        dispatch!(self, e => e.explain(sql).await)
    }

    async fn execute(&self, sql: &str, max_rows: usize) -> Result<ExecutionResult> {
        dispatch!(self, e => e.execute(sql, max_rows).await)
    }

    async fn close(&self) {
        dispatch!(self, e => e.close().await);
    }
}
