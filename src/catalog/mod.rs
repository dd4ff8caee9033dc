//! Schema Catalog
//!
//! Strongly-typed snapshot of the queryable schema: tables with their columns in
//! declared order, plus the foreign-key edges between them. A snapshot is extracted
//! fresh for every request and never cached.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt::Write as _;
use tracing::{debug, warn};

use crate::engine::DatabaseEngine;
use crate::error::Result;

/// Column of a table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Column {
    /// Column name as declared
    pub name: String,

    /// Engine-specific type name (empty when unknown)
    #[serde(rename = "type", default)]
    pub data_type: String,

    /// Whether the column accepts NULL
    #[serde(default = "default_nullable")]
    pub nullable: bool,

    /// Default expression, if declared
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<String>,
}

const fn default_nullable() -> bool {
    true
}

impl Column {
    /// Create a fully described column
    pub fn new(
        name: impl Into<String>,
        data_type: impl Into<String>,
        nullable: bool,
        default: Option<String>,
    ) -> Self {
        Self { name: name.into(), data_type: data_type.into(), nullable, default }
    }

    /// Create a column that carries only its name
    pub fn named(name: impl Into<String>) -> Self {
        Self::new(name, "", true, None)
    }
}

/// Foreign-key edge `(table, column) -> (foreign_table, foreign_column)`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ForeignKey {
    pub table: String,
    pub column: String,
    pub foreign_table: String,
    pub foreign_column: String,
}

/// Schema snapshot
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Schema {
    /// Table name to columns in declared ordinal order
    pub tables: BTreeMap<String, Vec<Column>>,

    /// Foreign-key edges across all tables
    #[serde(default)]
    pub foreign_keys: Vec<ForeignKey>,
}

impl Schema {
    /// Create an empty schema
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add (or replace) a table and its columns
    #[must_use]
    pub fn with_table(mut self, name: impl Into<String>, columns: Vec<Column>) -> Self {
        self.tables.insert(name.into(), columns);
        self
    }

    /// Add a foreign-key edge
    #[must_use]
    pub fn with_foreign_key(mut self, fk: ForeignKey) -> Self {
        self.foreign_keys.push(fk);
        self
    }

    /// Whether the schema has no tables
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }

    /// Number of tables
    #[must_use]
    pub fn table_count(&self) -> usize {
        self.tables.len()
    }

    /// Number of columns across all tables
    #[must_use]
    pub fn column_count(&self) -> usize {
        self.tables.values().map(Vec::len).sum()
    }

    /// Table names in catalog order
    pub fn table_names(&self) -> impl Iterator<Item = &str> {
        self.tables.keys().map(String::as_str)
    }

    /// Look up a table case-insensitively, preferring an exact-case match
    ///
    /// Returns the canonical table name and its columns.
    #[must_use]
    pub fn find_table(&self, name: &str) -> Option<(&str, &[Column])> {
        if let Some((key, cols)) = self.tables.get_key_value(name) {
            return Some((key.as_str(), cols.as_slice()));
        }
        self.tables
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(key, cols)| (key.as_str(), cols.as_slice()))
    }

    /// Whether `name` names a table, ignoring case
    #[must_use]
    pub fn has_table(&self, name: &str) -> bool {
        self.find_table(name).is_some()
    }

    /// Every distinct column name in the schema, in catalog order
    #[must_use]
    pub fn all_columns(&self) -> Vec<&str> {
        let mut seen = Vec::new();
        for col in self.tables.values().flatten() {
            if !seen.contains(&col.name.as_str()) {
                seen.push(col.name.as_str());
            }
        }
        seen
    }

    /// Resolve a bare word to the canonical spelling of a table or column name
    ///
    /// Tables are checked before columns; an exact-case match beats a
    /// case-insensitive one.
    #[must_use]
    pub fn resolve_identifier(&self, word: &str) -> Option<&str> {
        if let Some((table, _)) = self.find_table(word) {
            return Some(table);
        }
        let columns = || self.tables.values().flatten().map(|c| c.name.as_str());
        columns().find(|c| *c == word).or_else(|| columns().find(|c| c.eq_ignore_ascii_case(word)))
    }

    /// Render the schema as plain text for a generation prompt
    #[must_use]
    pub fn render(&self) -> String {
        let mut out = String::new();

        for (idx, (table, columns)) in self.tables.iter().enumerate() {
            if idx > 0 {
                out.push_str("\n\n");
            }
            let _ = write!(out, "Table: {table}");
            for col in columns {
                let _ = write!(out, "\n  - {}", col.name);
                if !col.data_type.is_empty() {
                    let _ = write!(out, ": {}", col.data_type);
                }
                if !col.nullable {
                    out.push_str(" NOT NULL");
                }
                if let Some(default) = &col.default {
                    let _ = write!(out, " DEFAULT {default}");
                }
            }
        }

        if !self.foreign_keys.is_empty() {
            out.push_str("\n\nForeign keys:");
            for fk in &self.foreign_keys {
                let _ = write!(
                    out,
                    "\n  - {}.{} -> {}.{}",
                    fk.table, fk.column, fk.foreign_table, fk.foreign_column
                );
            }
        }

        out
    }
}

/// Extract a fresh schema snapshot from the active engine
///
/// The engine acquires its own pooled connection and releases it before returning.
///
/// # Errors
/// Returns `AskError::Schema` when an introspection query fails, or
/// `AskError::ConnectionFailed` when no connection could be acquired.
pub async fn extract<E: DatabaseEngine>(engine: &E) -> Result<Schema> {
    match engine.introspect().await {
        Ok(schema) => {
            debug!(
                tables = schema.table_count(),
                columns = schema.column_count(),
                foreign_keys = schema.foreign_keys.len(),
                "schema extracted"
            );
            Ok(schema)
        }
        Err(err) => {
            warn!(code = err.error_code(), "schema extraction failed: {}", err);
            Err(err)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn shop() -> Schema {
        Schema::new()
            .with_table(
                "customers",
                vec![Column::new("id", "INTEGER", false, None), Column::new("name", "TEXT", true, None)],
            )
            .with_table(
                "orders",
                vec![
                    Column::new("id", "INTEGER", false, None),
                    Column::new("customer_id", "INTEGER", true, None),
                    Column::new("total", "REAL", true, Some("0".to_string())),
                ],
            )
            .with_foreign_key(ForeignKey {
                table: "orders".to_string(),
                column: "customer_id".to_string(),
                foreign_table: "customers".to_string(),
                foreign_column: "id".to_string(),
            })
    }

    #[test]
    fn test_find_table_prefers_exact_case() {
        let schema = Schema::new()
            .with_table("Orders", vec![Column::named("id")])
            .with_table("orders", vec![Column::named("total")]);

        assert_eq!(schema.find_table("orders").map(|(t, _)| t), Some("orders"));
        assert_eq!(schema.find_table("Orders").map(|(t, _)| t), Some("Orders"));
        assert!(schema.has_table("ORDERS"));
        assert!(!schema.has_table("invoices"));
    }

    #[test]
    fn test_resolve_identifier() {
        let schema = shop();
        assert_eq!(schema.resolve_identifier("ORDERS"), Some("orders"));
        assert_eq!(schema.resolve_identifier("Customer_Id"), Some("customer_id"));
        assert_eq!(schema.resolve_identifier("o"), None);
    }

    #[test]
    fn test_all_columns_are_distinct() {
        assert_eq!(shop().all_columns(), vec!["id", "name", "customer_id", "total"]);
    }

    #[test]
    fn test_counts() {
        let schema = shop();
        assert_eq!(schema.table_count(), 2);
        assert_eq!(schema.column_count(), 5);
        assert!(!schema.is_empty());
        assert!(Schema::new().is_empty());
    }

    #[test]
    fn test_render() {
        insta::assert_snapshot!(shop().render(), @r###"
        Table: customers
          - id: INTEGER NOT NULL
          - name: TEXT

        Table: orders
          - id: INTEGER NOT NULL
          - customer_id: INTEGER
          - total: REAL DEFAULT 0

        Foreign keys:
          - orders.customer_id -> customers.id
        "###);
    }

    #[test]
    fn test_minimal_columns_render_name_only() {
        let schema = Schema::new().with_table("orders", vec![Column::named("id")]);
        assert_eq!(schema.render(), "Table: orders\n  - id");
    }

    #[test]
    fn test_column_serializes_type_field() {
        let json = serde_json::to_value(Column::new("id", "INTEGER", false, None)).unwrap();
        assert_eq!(json, serde_json::json!({"name": "id", "type": "INTEGER", "nullable": false}));

        let col: Column = serde_json::from_value(serde_json::json!({"name": "id"})).unwrap();
        assert_eq!(col, Column::named("id"));
    }
}
