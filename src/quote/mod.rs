//! Identifier Quoting
//!
//! Rewrites a query so that every bare word naming a schema table or column is
//! wrapped in the dialect's identifier quote, and every recognized keyword is
//! upper-cased. Everything else (literals, already-quoted identifiers, aliases,
//! function names, operators, whitespace) is passed through byte-for-byte.
//!
//! Quoting is a fixed point: `quote(quote(sql)) == quote(sql)`.

use crate::catalog::Schema;
use crate::sql::{is_keyword, next_significant, quote_ident, Lexer, ScanLexer, TokenKind};

/// Quotes schema identifiers and normalizes keyword casing
#[derive(Debug, Clone, Copy)]
pub struct IdentifierQuoter<L = ScanLexer> {
    quote_char: char,
    lexer: L,
}

impl IdentifierQuoter {
    /// Quoter for `quote_char` using the built-in scanner
    #[must_use]
    pub const fn new(quote_char: char) -> Self {
        Self { quote_char, lexer: ScanLexer }
    }
}

impl<L: Lexer> IdentifierQuoter<L> {
    /// Quoter with a custom tokenizer
    pub const fn with_lexer(quote_char: char, lexer: L) -> Self {
        Self { quote_char, lexer }
    }

    /// Identifier quote character of this quoter
    pub const fn quote_char(&self) -> char {
        self.quote_char
    }

    /// Quote schema identifiers in `sql`
    ///
    /// Per word token:
    /// 1. a keyword is upper-cased, even when the schema has a column of that name;
    /// 2. a word followed by `(` that is not a schema name is a function call and
    ///    passes through;
    /// 3. a word matching a table or column (ignoring case) becomes the quoted
    ///    canonical spelling from the schema;
    /// 4. anything else passes through unchanged.
    #[must_use]
    pub fn quote(&self, sql: &str, schema: &Schema) -> String {
        let tokens = self.lexer.tokenize(sql);
        let mut out = String::with_capacity(sql.len() + 16);

        for (idx, token) in tokens.iter().enumerate() {
            if token.kind != TokenKind::Word {
                out.push_str(token.text);
                continue;
            }

            if is_keyword(token.text) {
                out.push_str(&token.text.to_ascii_uppercase());
                continue;
            }

            let is_call = next_significant(&tokens, idx).is_some_and(|n| tokens[n].is_punct('('));
            match schema.resolve_identifier(token.text) {
                Some(canonical) if !is_call || schema.has_table(canonical) => {
                    out.push_str(&quote_ident(canonical, self.quote_char));
                }
                _ => out.push_str(token.text),
            }
        }

        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::Column;
    use pretty_assertions::assert_eq;

    fn orders() -> Schema {
        Schema::new()
            .with_table(
                "orders",
                vec![Column::named("id"), Column::named("customer_id"), Column::named("total")],
            )
            .with_table("Customers", vec![Column::named("id"), Column::named("fullName")])
    }

    fn pg(sql: &str) -> String {
        IdentifierQuoter::new('"').quote(sql, &orders())
    }

    #[test]
    fn test_quotes_tables_and_columns() {
        assert_eq!(
            pg("select * from orders where total > 100"),
            "SELECT * FROM \"orders\" WHERE \"total\" > 100"
        );
    }

    #[test]
    fn test_canonical_spelling_is_used() {
        assert_eq!(
            pg("SELECT FULLNAME FROM customers"),
            "SELECT \"fullName\" FROM \"Customers\""
        );
    }

    #[test]
    fn test_aliases_and_functions_pass_through() {
        assert_eq!(
            pg("SELECT o.total, count(o.id) AS n FROM orders o"),
            "SELECT o.\"total\", COUNT(o.\"id\") AS n FROM \"orders\" o"
        );
        assert_eq!(
            pg("SELECT my_func(total) FROM orders"),
            "SELECT my_func(\"total\") FROM \"orders\""
        );
    }

    #[test]
    fn test_literals_untouched() {
        assert_eq!(
            pg("SELECT * FROM orders WHERE customer_id = 'orders' AND total = 10.5"),
            "SELECT * FROM \"orders\" WHERE \"customer_id\" = 'orders' AND \"total\" = 10.5"
        );
    }

    #[test]
    fn test_already_quoted_untouched() {
        let sql = "SELECT \"Total\" FROM \"orders\"";
        assert_eq!(pg(sql), sql);
    }

    #[test]
    fn test_idempotent() {
        let inputs = [
            "select * from orders where total > 100",
            "SELECT o.id, c.fullname FROM orders o JOIN customers c ON o.customer_id = c.id",
            "with big as (select * from orders where total > 5) select count(*) from big",
            "SELECT id FROM orders -- trailing comment",
        ];
        for sql in inputs {
            let once = pg(sql);
            assert_eq!(pg(&once), once, "not a fixed point for {sql}");
        }
    }

    #[test]
    fn test_mysql_backticks() {
        let quoter = IdentifierQuoter::new('`');
        assert_eq!(
            quoter.quote("select total from orders limit 5", &orders()),
            "SELECT `total` FROM `orders` LIMIT 5"
        );
    }

    #[test]
    fn test_keyword_named_column_stays_keyword() {
        let schema = Schema::new().with_table("events", vec![Column::named("date")]);
        let quoter = IdentifierQuoter::new('"');
        assert_eq!(quoter.quote("select date from events", &schema), "SELECT DATE FROM \"events\"");
    }

    #[test]
    fn test_embedded_quote_is_escaped() {
        let schema = Schema::new().with_table("we\"ird", vec![]);
        let quoter = IdentifierQuoter::new('`');
        // Only bare words are matched, so a name with a quote never matches a word token
        assert_eq!(quoter.quote("SELECT 1", &schema), "SELECT 1");
        assert_eq!(quote_ident("a`b", '`'), "`a``b`");
    }
}
