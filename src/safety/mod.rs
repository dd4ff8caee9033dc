//! Safety Screen for Generated Queries
//!
//! Heuristic, token-based filter run before any query reaches the engine.
//! Only a single read-only statement is let through.
//!
//! # Rejection Rules
//! - Empty input, or anything not starting with `SELECT` / `WITH`
//! - More than one statement (a mutating keyword after `;` gets its own message)
//! - Mutating keywords anywhere, including data-modifying CTE bodies
//! - `UNION [ALL | DISTINCT] SELECT` unless set operations are expected
//! - Comment markers (`--`, `/* */`, and `#` for `MySQL`)
//! - `EXEC` / `EXECUTE` and `SELECT ... INTO`
//! - A first `FROM` table that is neither in the schema nor defined by the query's `WITH`
//!
//! False negatives are possible; the read-only privilege of the execution role and
//! the dry-run stage remain the authoritative safety net.

use crate::catalog::Schema;
use crate::engine::DatabaseType;
use crate::error::{AskError, Result};
use crate::sql::{first_from_table, strip_terminators, Lexer, ScanLexer, Token, TokenKind};

/// Statements that change data, schema or privileges
const MUTATING_KEYWORDS: &[&str] = &[
    "ALTER", "CREATE", "DELETE", "DROP", "GRANT", "INSERT", "MERGE", "RENAME", "REPLACE",
    "REVOKE", "TRUNCATE", "UPDATE",
];

/// Mutating keywords that are also scalar function names
const MUTATING_FUNCTIONS: &[&str] = &["INSERT", "REPLACE"];

/// Pre-execution filter for generated queries
#[derive(Debug, Clone, Copy)]
pub struct SafetyScreen<L = ScanLexer> {
    dialect: DatabaseType,
    allow_union: bool,
    lexer: L,
}

impl SafetyScreen {
    /// Screen for `dialect`; set operations are rejected
    #[must_use]
    pub const fn new(dialect: DatabaseType) -> Self {
        Self { dialect, allow_union: false, lexer: ScanLexer }
    }
}

impl<L: Lexer> SafetyScreen<L> {
    /// Screen with a custom tokenizer
    pub const fn with_lexer(dialect: DatabaseType, lexer: L) -> Self {
        Self { dialect, allow_union: false, lexer }
    }

    /// Permit `UNION SELECT` (for deployments that expect set operations)
    #[must_use]
    pub const fn allow_union(mut self, allow: bool) -> Self {
        self.allow_union = allow;
        self
    }

    /// `true` when `sql` is safe to hand to the dry-run validator
    pub fn screen(&self, sql: &str, schema: &Schema) -> bool {
        self.check(sql, schema).is_ok()
    }

    /// Like [`SafetyScreen::screen`], reporting why a query was rejected
    ///
    /// # Errors
    /// Returns `AskError::SafetyRejection` naming the first rule that fired.
    pub fn check(&self, sql: &str, schema: &Schema) -> Result<()> {
        let body = strip_terminators(sql);
        if body.is_empty() {
            return Err(AskError::safety_rejection("empty query"));
        }

        let tokens = self.lexer.tokenize(body);

        if tokens.iter().any(|t| self.is_comment(t)) {
            return Err(AskError::safety_rejection("comment markers are not allowed"));
        }

        let significant: Vec<Token<'_>> =
            tokens.iter().copied().filter(Token::is_significant).collect();

        if let Some(sep) = significant.iter().position(|t| t.is_punct(';')) {
            if let Some(kw) = significant[sep..].iter().find_map(|t| mutating_word(t)) {
                return Err(AskError::safety_rejection(format!(
                    "mutating statement {kw} after a statement separator"
                )));
            }
            return Err(AskError::safety_rejection("multiple statements are not allowed"));
        }

        let Some(&first) = significant.first() else {
            return Err(AskError::safety_rejection("empty query"));
        };
        if !(first.is_word("SELECT") || first.is_word("WITH")) {
            return Err(AskError::safety_rejection(format!(
                "only SELECT or WITH queries are allowed, found {}",
                first.text.to_ascii_uppercase()
            )));
        }

        for (idx, token) in significant.iter().enumerate() {
            let next = significant.get(idx + 1);

            if token.kind != TokenKind::Word {
                continue;
            }

            let upper = token.text.to_ascii_uppercase();
            let is_call = next.is_some_and(|n| n.is_punct('('));

            if MUTATING_KEYWORDS.contains(&upper.as_str())
                && !(is_call && MUTATING_FUNCTIONS.contains(&upper.as_str()))
            {
                return Err(AskError::safety_rejection(format!(
                    "mutating keyword {upper} is not allowed"
                )));
            }

            match upper.as_str() {
                "EXEC" | "EXECUTE" => {
                    return Err(AskError::safety_rejection("procedure execution is not allowed"));
                }
                "INTO" => {
                    return Err(AskError::safety_rejection("SELECT ... INTO is not allowed"));
                }
                "UNION" if !self.allow_union && union_selects(&significant[idx + 1..]) => {
                    return Err(AskError::safety_rejection("UNION SELECT is not allowed"));
                }
                _ => {}
            }
        }

        if let Some(table) = first_from_table(&tokens) {
            let defined_by_query = cte_names(&tokens).iter().any(|n| n.eq_ignore_ascii_case(&table));
            if !defined_by_query && !schema.has_table(&table) {
                return Err(AskError::safety_rejection(format!("unknown table '{table}'")));
            }
        }

        Ok(())
    }

    fn is_comment(&self, token: &Token<'_>) -> bool {
        token.kind == TokenKind::Comment
            || (self.dialect == DatabaseType::MySQL
                && token.kind == TokenKind::Operator
                && token.text.contains('#'))
    }
}

fn mutating_word(token: &Token<'_>) -> Option<String> {
    (token.kind == TokenKind::Word)
        .then(|| token.text.to_ascii_uppercase())
        .filter(|upper| MUTATING_KEYWORDS.contains(&upper.as_str()))
}

/// Whether the tokens after `UNION` start another `SELECT`
fn union_selects(rest: &[Token<'_>]) -> bool {
    rest.iter()
        .find(|t| !(t.is_word("ALL") || t.is_word("DISTINCT") || t.is_punct('(')))
        .is_some_and(|t| t.is_word("SELECT"))
}

/// Names defined by `name [(cols)] AS (` in a `WITH` clause
fn cte_names(tokens: &[Token<'_>]) -> Vec<String> {
    let significant: Vec<&Token<'_>> = tokens.iter().filter(|t| t.is_significant()).collect();
    if !significant.first().is_some_and(|t| t.is_word("WITH")) {
        return Vec::new();
    }

    let mut names = Vec::new();
    for idx in 1..significant.len() {
        let opens_body = significant[idx].is_word("AS")
            && significant.get(idx + 1).is_some_and(|t| t.is_punct('('));
        if !opens_body {
            continue;
        }

        // Step back over an optional column list
        let mut name_idx = idx - 1;
        if significant[name_idx].is_punct(')') {
            let mut depth = 0usize;
            loop {
                let tok = significant[name_idx];
                if tok.is_punct(')') {
                    depth += 1;
                } else if tok.is_punct('(') {
                    depth -= 1;
                    if depth == 0 {
                        break;
                    }
                }
                if name_idx == 0 {
                    break;
                }
                name_idx -= 1;
            }
            name_idx = name_idx.saturating_sub(1);
        }

        if let Some(name) = significant[name_idx].identifier() {
            names.push(name);
        }
    }

    names
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::Column;

    fn shop() -> Schema {
        Schema::new()
            .with_table("orders", vec![Column::named("id"), Column::named("total")])
            .with_table("customers", vec![Column::named("id")])
    }

    fn pg() -> SafetyScreen {
        SafetyScreen::new(DatabaseType::Postgres)
    }

    fn reason(sql: &str) -> String {
        pg().check(sql, &shop()).unwrap_err().message()
    }

    #[test]
    fn test_allows_plain_select() {
        assert!(pg().screen("SELECT * FROM \"orders\" WHERE \"total\" > 100", &shop()));
        assert!(pg().screen("SELECT COUNT(*) FROM orders;", &shop()));
        assert!(pg().screen("select 1", &shop()));
    }

    #[test]
    fn test_allows_cte() {
        let sql = "WITH big AS (SELECT * FROM orders WHERE total > 5) SELECT COUNT(*) FROM big";
        assert!(pg().screen(sql, &shop()));

        let sql = "WITH big (n) AS (SELECT total FROM orders) SELECT n FROM big";
        assert!(pg().screen(sql, &shop()));
    }

    #[test]
    fn test_rejects_non_select() {
        for sql in [
            "DELETE FROM orders",
            "UPDATE orders SET total = 0",
            "INSERT INTO orders VALUES (1, 2)",
            "DROP TABLE orders",
            "EXPLAIN SELECT 1",
            "SHOW TABLES",
            "(SELECT 1)",
        ] {
            assert!(!pg().screen(sql, &shop()), "should reject {sql}");
        }
        assert!(reason("DELETE FROM orders").contains("only SELECT or WITH"));
    }

    #[test]
    fn test_rejects_mutation_after_separator() {
        for kw in [
            "DROP TABLE orders",
            "DELETE FROM orders",
            "TRUNCATE orders",
            "ALTER TABLE x",
            "CREATE TABLE x (id int)",
            "GRANT ALL ON orders TO x",
            "REVOKE ALL ON orders FROM x",
        ] {
            let sql = format!("SELECT 1; {kw}");
            assert!(!pg().screen(&sql, &shop()), "should reject {sql}");
            assert!(reason(&sql).contains("after a statement separator"));
        }
    }

    #[test]
    fn test_rejects_multiple_selects() {
        assert!(reason("SELECT 1; SELECT 2").contains("multiple statements"));
    }

    #[test]
    fn test_rejects_union_select() {
        assert!(!pg().screen("SELECT id FROM orders UNION SELECT id FROM customers", &shop()));
        assert!(!pg().screen("SELECT id FROM orders UNION ALL (SELECT id FROM customers)", &shop()));

        let permissive = pg().allow_union(true);
        assert!(permissive.screen("SELECT id FROM orders UNION SELECT id FROM customers", &shop()));
    }

    #[test]
    fn test_rejects_comments() {
        assert!(!pg().screen("SELECT * FROM orders -- WHERE total > 0", &shop()));
        assert!(!pg().screen("SELECT * FROM orders /* x */", &shop()));
        assert!(pg().screen("SELECT '--not a comment' FROM orders", &shop()));

        let mysql = SafetyScreen::new(DatabaseType::MySQL);
        assert!(!mysql.screen("SELECT * FROM orders # trailing", &shop()));
    }

    #[test]
    fn test_rejects_exec_and_into() {
        assert!(!pg().screen("SELECT EXEC('xp_cmdshell')", &shop()));
        assert!(!pg().screen("SELECT * INTO backup FROM orders", &shop()));
    }

    #[test]
    fn test_rejects_data_modifying_cte() {
        let sql = "WITH gone AS (DELETE FROM orders RETURNING *) SELECT * FROM gone";
        assert!(!pg().screen(sql, &shop()));
    }

    #[test]
    fn test_string_functions_are_not_mutations() {
        assert!(pg().screen("SELECT REPLACE(\"id\", 'a', 'b') FROM orders", &shop()));
    }

    #[test]
    fn test_rejects_unknown_from_table() {
        assert!(reason("SELECT * FROM invoices").contains("unknown table 'invoices'"));
        assert!(pg().screen("SELECT * FROM ORDERS", &shop()));
        assert!(pg().screen("SELECT * FROM public.orders", &shop()));
        assert!(pg().screen("SELECT * FROM (SELECT 1) AS t", &shop()));
    }

    #[test]
    fn test_from_inside_function_arguments_is_not_a_table() {
        let schema = Schema::new().with_table(
            "orders",
            vec![Column::named("id"), Column::named("created_at"), Column::named("total")],
        );
        let sql = "SELECT EXTRACT(YEAR FROM \"created_at\") AS y, SUM(\"total\") FROM \"orders\" GROUP BY y";
        assert!(pg().check(sql, &schema).is_ok());
        assert!(pg().check("SELECT TRIM(BOTH ' ' FROM total) FROM orders", &schema).is_ok());

        let err = pg().check("SELECT EXTRACT(YEAR FROM created_at) FROM invoices", &schema).unwrap_err();
        assert!(err.message().contains("unknown table 'invoices'"));
    }

    #[test]
    fn test_rejects_empty() {
        assert!(reason("  ;  ").contains("empty query"));
    }

    #[test]
    fn test_rejection_asks_to_rephrase() {
        let err = pg().check("DROP TABLE orders", &shop()).unwrap_err();
        assert_eq!(err.error_code(), "SAFETY_REJECTION");
        assert!(err.is_rephrasable());
    }
}
