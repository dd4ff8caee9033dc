//! Auto-Repair of Unknown Identifiers
//!
//! Consumes the verbatim engine message of a failed dry run, finds the offending
//! column or table name, and substitutes the closest schema name.
//!
//! # Matching
//! Candidates are scanned in schema order; the first hit among these wins outright:
//! 1. case-insensitive equality
//! 2. `snake_case` form of the offender converted to `camelCase` equals the candidate
//! 3. candidate converted to `snake_case` equals the offender (ignoring case)
//!
//! Otherwise the candidate with the lowest Levenshtein distance (on lower-cased
//! text, ties resolved by schema order) is chosen, provided it is at most 3 edits away.
//!
//! Repair runs once per request. A repaired query must pass the safety screen and
//! the dry run again before it may execute.

use lazy_static::lazy_static;
use regex::Regex;
use serde::Serialize;
use tracing::debug;

use crate::catalog::Schema;
use crate::quote::IdentifierQuoter;
use crate::sql::{first_from_table, quote_ident, unquote, Lexer, ScanLexer, Token, TokenKind};

/// Largest edit distance accepted for a fuzzy substitution
pub const MAX_EDIT_DISTANCE: usize = 3;

/// Clause keywords some generators emit twice in a row
const DOUBLED_KEYWORDS: &[&str] = &["SELECT", "FROM", "WHERE", "ORDER", "BY"];

/// What the engine said was missing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RepairKind {
    Column,
    Table,
}

/// The identifier swap performed by a repair
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Substitution {
    pub kind: RepairKind,
    pub original: String,
    pub replacement: String,
    /// Edit distance; 0 for exact, case and naming-convention matches
    pub score: usize,
}

/// A rewritten query ready for re-validation
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Repair {
    pub sql: String,
    /// `None` when only doubled keywords were collapsed
    pub substitution: Option<Substitution>,
}

lazy_static! {
    /// Offender extraction per engine phrasing (PostgreSQL, `MySQL`, `SQLite`)
    static ref ERROR_PATTERNS: Vec<(RepairKind, Regex)> = [
        (RepairKind::Column, r#"(?i)column\s+"?([^"\s]+)"?"#),
        (RepairKind::Column, r"(?i)unknown column\s+'([^']+)'"),
        (RepairKind::Column, r"(?i)no such column:\s*(\S+)"),
        (RepairKind::Table, r#"(?i)relation\s+"?([^"\s]+)"?"#),
        (RepairKind::Table, r"(?i)table\s+'([^']+)'\s+doesn't exist"),
        (RepairKind::Table, r"(?i)no such table:\s*(\S+)"),
    ]
    .into_iter()
    .filter_map(|(kind, pattern)| Regex::new(pattern).ok().map(|re| (kind, re)))
    .collect();
}

/// Classify an engine message as an unknown-column or unknown-table error
#[must_use]
pub fn classify(message: &str) -> Option<RepairKind> {
    let lower = message.to_lowercase();
    if (lower.contains("column") && lower.contains("does not exist"))
        || lower.contains("unknown column")
        || lower.contains("no such column")
    {
        Some(RepairKind::Column)
    } else if (lower.contains("relation") && lower.contains("does not exist"))
        || (lower.contains("table") && lower.contains("doesn't exist"))
        || lower.contains("no such table")
    {
        Some(RepairKind::Table)
    } else {
        None
    }
}

/// Pull the offending identifier out of an engine message
///
/// Qualified names (`o.custmer_id`, `shop.ordrs`) are reduced to their last segment.
#[must_use]
pub fn offending_identifier(message: &str, kind: RepairKind) -> Option<String> {
    let raw = ERROR_PATTERNS
        .iter()
        .filter(|(k, _)| *k == kind)
        .find_map(|(_, re)| re.captures(message))
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str())?;

    let last = raw.rsplit('.').next().unwrap_or(raw);
    let name = last.trim_matches(|c| matches!(c, '"' | '`' | '\''));
    (!name.is_empty()).then(|| name.to_string())
}

/// `customer_id` -> `customerId`
#[must_use]
pub fn snake_to_camel(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut chars = name.chars().peekable();
    while let Some(c) = chars.next() {
        match chars.peek() {
            Some(&next) if c == '_' && next.is_ascii_lowercase() => {
                out.push(next.to_ascii_uppercase());
                chars.next();
            }
            _ => out.push(c),
        }
    }
    out
}

/// `customerId` -> `customer_id` (always lower-case)
#[must_use]
pub fn camel_to_snake(name: &str) -> String {
    let mut out = String::with_capacity(name.len() + 4);
    for c in name.chars() {
        if c.is_ascii_uppercase() {
            out.push('_');
        }
        out.push(c.to_ascii_lowercase());
    }
    out
}

/// Closest candidate to `wrong`, with its score
pub fn best_match<'s, I>(wrong: &str, candidates: I) -> Option<(&'s str, usize)>
where
    I: IntoIterator<Item = &'s str>,
{
    let wrong_lower = wrong.to_lowercase();
    let camel = snake_to_camel(wrong);
    let mut best: Option<(&str, usize)> = None;

    for candidate in candidates {
        if candidate.eq_ignore_ascii_case(wrong)
            || candidate == camel
            || camel_to_snake(candidate) == wrong_lower
        {
            return Some((candidate, 0));
        }

        let distance = strsim::levenshtein(&candidate.to_lowercase(), &wrong_lower);
        if distance <= MAX_EDIT_DISTANCE && best.map_or(true, |(_, d)| distance < d) {
            best = Some((candidate, distance));
        }
    }

    best
}

/// Error-driven identifier repair
#[derive(Debug, Clone, Copy)]
pub struct AutoRepairEngine<L = ScanLexer> {
    quote_char: char,
    lexer: L,
}

impl AutoRepairEngine {
    #[must_use]
    pub const fn new(quote_char: char) -> Self {
        Self { quote_char, lexer: ScanLexer }
    }
}

impl<L: Lexer + Clone> AutoRepairEngine<L> {
    pub const fn with_lexer(quote_char: char, lexer: L) -> Self {
        Self { quote_char, lexer }
    }

    /// Attempt one repair of `sql` given the engine's `error_message`
    ///
    /// Returns `None` when nothing could be changed: the message names no
    /// recognizable identifier, no candidate is close enough, or the rewrite
    /// leaves the text as it was.
    pub fn repair(&self, sql: &str, schema: &Schema, error_message: &str) -> Option<Repair> {
        let collapsed = self.collapse_doubled_keywords(sql);

        let substitution = classify(error_message).and_then(|kind| {
            let wrong = offending_identifier(error_message, kind)?;
            let found = self.find_replacement(&collapsed, schema, kind, &wrong);
            if found.is_none() {
                debug!(identifier = %wrong, ?kind, "no repair candidate within distance");
            }
            found
        });

        let rewritten = match &substitution {
            Some(sub) => {
                debug!(
                    from = %sub.original,
                    to = %sub.replacement,
                    score = sub.score,
                    "repairing identifier"
                );
                self.substitute(&collapsed, &sub.original, &sub.replacement)
            }
            None => collapsed,
        };

        let quoter = IdentifierQuoter::with_lexer(self.quote_char, self.lexer.clone());
        let requoted = quoter.quote(&rewritten, schema);

        (requoted != sql && requoted != quoter.quote(sql, schema))
            .then_some(Repair { sql: requoted, substitution })
    }

    fn find_replacement(
        &self,
        sql: &str,
        schema: &Schema,
        kind: RepairKind,
        wrong: &str,
    ) -> Option<Substitution> {
        let (replacement, score) = match kind {
            RepairKind::Table => best_match(wrong, schema.table_names())?,
            RepairKind::Column => {
                let tokens = self.lexer.tokenize(sql);
                let from_table = first_from_table(&tokens).and_then(|t| schema.find_table(&t));
                match from_table {
                    Some((table, columns)) => {
                        debug!(%table, "searching columns of FROM table");
                        best_match(wrong, columns.iter().map(|c| c.name.as_str()))?
                    }
                    None => best_match(wrong, schema.all_columns())?,
                }
            }
        };

        Some(Substitution {
            kind,
            original: wrong.to_string(),
            replacement: replacement.to_string(),
            score,
        })
    }

    /// Drop a clause keyword that immediately repeats the previous one
    fn collapse_doubled_keywords(&self, sql: &str) -> String {
        let tokens = self.lexer.tokenize(sql);
        let mut out = String::with_capacity(sql.len());
        let mut gap = String::new();
        let mut previous: Option<Token<'_>> = None;

        for token in tokens {
            if !token.is_significant() {
                gap.push_str(token.text);
                continue;
            }

            let doubled = previous.is_some_and(|prev| {
                prev.kind == TokenKind::Word
                    && token.is_word(prev.text)
                    && DOUBLED_KEYWORDS.iter().any(|kw| token.is_word(kw))
            });
            if doubled {
                gap.clear();
                continue;
            }

            out.push_str(&gap);
            gap.clear();
            out.push_str(token.text);
            previous = Some(token);
        }

        out.push_str(&gap);
        out
    }

    /// Rewrite every quoted or bare occurrence of `wrong`; literals are never touched
    fn substitute(&self, sql: &str, wrong: &str, replacement: &str) -> String {
        let quoted = quote_ident(replacement, self.quote_char);
        self.lexer
            .tokenize(sql)
            .iter()
            .map(|token| match token.kind {
                TokenKind::QuotedIdent if unquote(token.text).eq_ignore_ascii_case(wrong) => {
                    quoted.as_str()
                }
                TokenKind::Word if token.text.eq_ignore_ascii_case(wrong) => quoted.as_str(),
                _ => token.text,
            })
            .collect()
    }
}
