//! SQL keyword table
//!
//! Reserved words of the supported dialects plus the built-in functions and type
//! names that generators commonly emit. A word in this table is never treated as
//! a schema identifier, so the table errs on the side of being too large.

/// Uppercase keywords, sorted for binary search
pub const KEYWORDS: &[&str] = &[
    "ABS", "ABSOLUTE", "ACTION", "ADD", "ALL", "ALLOCATE", "ALTER", "ANALYSE", "ANALYZE",
    "AND", "ANY", "ARE", "ARRAY", "ARRAY_AGG", "AS", "ASC", "ASENSITIVE", "ASSERTION",
    "ASYMMETRIC", "AT", "ATOMIC", "AUTHORIZATION", "AUTO_INCREMENT", "AVG", "BEGIN", "BETWEEN",
    "BIGINT", "BINARY", "BIT", "BIT_LENGTH", "BLOB", "BOOL", "BOOLEAN", "BOTH", "BY", "CALL",
    "CALLED", "CASCADE", "CASCADED", "CASE", "CAST", "CEIL", "CEILING", "CHAR", "CHARACTER",
    "CHARACTER_LENGTH", "CHAR_LENGTH", "CHECK", "CLOB", "CLOSE", "COALESCE", "COLLATE",
    "COLLATION", "COLUMN", "COMMIT", "CONCAT", "CONDITION", "CONNECT", "CONNECTION",
    "CONSTRAINT", "CONSTRAINTS", "CONTINUE", "CONVERT", "CORRESPONDING", "COUNT", "CREATE",
    "CROSS", "CUBE", "CUME_DIST", "CURRENT", "CURRENT_DATE", "CURRENT_ROLE", "CURRENT_SCHEMA",
    "CURRENT_TIME", "CURRENT_TIMESTAMP", "CURRENT_USER", "CURSOR", "CYCLE", "DATABASE", "DATE",
    "DATETIME", "DATE_TRUNC", "DAY", "DEALLOCATE", "DEC", "DECIMAL", "DECLARE", "DEFAULT",
    "DEFERRABLE", "DEFERRED", "DELETE", "DENSE_RANK", "DESC", "DESCRIBE", "DETERMINISTIC",
    "DISCONNECT", "DISTINCT", "DIV", "DO", "DOUBLE", "DROP", "ELSE", "ELSEIF", "END", "ESCAPE",
    "EVERY", "EXCEPT", "EXCEPTION", "EXEC", "EXECUTE", "EXISTS", "EXPLAIN", "EXTERNAL",
    "EXTRACT", "FALSE", "FETCH", "FILTER", "FIRST", "FIRST_VALUE", "FLOAT", "FLOOR",
    "FOLLOWING", "FOR", "FOREIGN", "FREEZE", "FROM", "FULL", "FUNCTION", "GET", "GLOBAL",
    "GRANT", "GREATEST", "GROUP", "GROUPING", "GROUPS", "GROUP_CONCAT", "HAVING", "HOUR",
    "IDENTITY", "IF", "IFNULL", "ILIKE", "IMMEDIATE", "IN", "INDEX", "INITIALLY", "INNER",
    "INOUT", "INPUT", "INSENSITIVE", "INSERT", "INT", "INTEGER", "INTERSECT", "INTERVAL",
    "INTO", "IS", "ISNULL", "ISOLATION", "JOIN", "JSON", "JSONB", "KEY", "LAG", "LANGUAGE",
    "LAST", "LAST_VALUE", "LATERAL", "LEAD", "LEADING", "LEAST", "LEFT", "LENGTH", "LEVEL",
    "LIKE", "LIMIT", "LOCAL", "LOCALTIME", "LOCALTIMESTAMP", "LOWER", "LTRIM", "MATCH",
    "MATERIALIZED", "MAX", "MEDIUMINT", "MERGE", "MIN", "MINUTE", "MOD", "MODIFIES", "MONTH",
    "NATIONAL", "NATURAL", "NCHAR", "NCLOB", "NEW", "NEXT", "NO", "NOT", "NOTNULL", "NOW",
    "NTILE", "NULL", "NULLIF", "NULLS", "NUMERIC", "OCTET_LENGTH", "OF", "OFFSET", "OLD", "ON",
    "ONLY", "OPEN", "OPTION", "OR", "ORDER", "OUT", "OUTER", "OVER", "OVERLAPS", "PARTIAL",
    "PARTITION", "PERCENT_RANK", "PLACING", "POSITION", "PRECEDING", "PRECISION", "PREPARE",
    "PRIMARY", "PRIOR", "PRIVILEGES", "PROCEDURE", "QUARTER", "RANGE", "RANK", "READ", "REAL",
    "RECURSIVE", "REFERENCES", "RELEASE", "RENAME", "REPLACE", "RESTRICT", "RETURN",
    "RETURNING", "RETURNS", "REVOKE", "RIGHT", "RLIKE", "ROLLBACK", "ROLLUP", "ROUND", "ROW",
    "ROWS", "ROW_NUMBER", "RTRIM", "SAVEPOINT", "SCHEMA", "SCROLL", "SECOND", "SELECT",
    "SENSITIVE", "SESSION_USER", "SET", "SHOW", "SIMILAR", "SMALLINT", "SOME", "SQL", "START",
    "STDDEV", "STRING_AGG", "SUBSTR", "SUBSTRING", "SUM", "SYMMETRIC", "SYSTEM_USER", "TABLE",
    "TABLESAMPLE", "TEMPORARY", "TEXT", "THEN", "TIES", "TIME", "TIMESTAMP", "TIMESTAMPTZ",
    "TINYINT", "TO", "TOP", "TRAILING", "TRANSACTION", "TRIM", "TRUE", "TRUNCATE", "UNBOUNDED",
    "UNION", "UNIQUE", "UNKNOWN", "UNNEST", "UPDATE", "UPPER", "USAGE", "USER", "USING",
    "VALUES", "VARCHAR", "VARIADIC", "VARIANCE", "VARYING", "VIEW", "WEEK", "WHEN", "WHERE",
    "WINDOW", "WITH", "WITHIN", "WITHOUT", "WORK", "XOR", "YEAR", "ZONE",
];

/// Whether `word` (any case) is a recognized SQL keyword
#[must_use]
pub fn is_keyword(word: &str) -> bool {
    let upper = word.to_ascii_uppercase();
    KEYWORDS.binary_search(&upper.as_str()).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keyword_table_is_sorted_and_unique() {
        for pair in KEYWORDS.windows(2) {
            assert!(pair[0] < pair[1], "{} must sort before {}", pair[0], pair[1]);
        }
    }

    #[test]
    fn test_keyword_lookup_ignores_case() {
        assert!(is_keyword("select"));
        assert!(is_keyword("SeLeCt"));
        assert!(is_keyword("ilike"));
        assert!(is_keyword("count"));
        assert!(is_keyword("RETURNING"));
    }

    #[test]
    fn test_identifiers_are_not_keywords() {
        assert!(!is_keyword("orders"));
        assert!(!is_keyword("customer_id"));
        assert!(!is_keyword("total"));
    }
}
