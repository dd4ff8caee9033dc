//! Approximate SQL Token Scanner
//!
//! The quoter, the safety screen and the repair engine all work on a flat token
//! stream rather than a parse tree. The scanner sits behind the [`Lexer`] trait so a
//! grammar-based tokenizer can replace it without touching those callers.
//!
//! # Token Classes
//! - Quoted string literals (`'...'`, with `''` escapes)
//! - Quoted identifiers (`"..."` and `` `...` ``)
//! - Numeric literals (`42`, `3.14`)
//! - Words (keywords, identifiers, aliases, function names)
//! - Operator runs (`>=`, `::`, `||`) and single punctuation (`(`, `,`, `;`, `.`)
//! - Whitespace and comments (`-- ...`, `/* ... */`)
//!
//! Concatenating the text of every token reproduces the input exactly.

pub mod keywords;

pub use keywords::is_keyword;

/// Classification of a scanned token
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    /// Bare word: keyword, identifier, alias or function name
    Word,
    /// Identifier wrapped in double quotes or backticks
    QuotedIdent,
    /// Single-quoted string literal
    StringLiteral,
    /// Integer or decimal literal
    Number,
    /// Run of operator characters
    Operator,
    /// Single punctuation character: `( ) , ; . [ ]`
    Punct,
    /// Run of whitespace
    Whitespace,
    /// Line or block comment
    Comment,
}

/// A token borrowed from the scanned input
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Token<'a> {
    pub kind: TokenKind,
    pub text: &'a str,
}

impl<'a> Token<'a> {
    /// Whether the token is a word equal to `word`, ignoring case
    #[must_use]
    pub fn is_word(&self, word: &str) -> bool {
        self.kind == TokenKind::Word && self.text.eq_ignore_ascii_case(word)
    }

    /// Whether the token is the punctuation character `ch`
    #[must_use]
    pub fn is_punct(&self, ch: char) -> bool {
        self.kind == TokenKind::Punct && self.text.len() == 1 && self.text.starts_with(ch)
    }

    /// Whether the token carries meaning (not whitespace or a comment)
    #[must_use]
    pub const fn is_significant(&self) -> bool {
        !matches!(self.kind, TokenKind::Whitespace | TokenKind::Comment)
    }

    /// Identifier name of a word or quoted identifier, with quotes removed
    #[must_use]
    pub fn identifier(&self) -> Option<String> {
        match self.kind {
            TokenKind::Word => Some(self.text.to_string()),
            TokenKind::QuotedIdent => Some(unquote(self.text)),
            _ => None,
        }
    }
}

/// Splits SQL text into tokens
pub trait Lexer: Send + Sync {
    /// Tokenize `sql`, preserving order and every byte of the input
    fn tokenize<'a>(&self, sql: &'a str) -> Vec<Token<'a>>;
}

/// Hand-written character scanner
#[derive(Debug, Clone, Copy, Default)]
pub struct ScanLexer;

const OPERATOR_CHARS: &[char] =
    &['<', '>', '=', '!', '+', '-', '*', '/', '%', '|', '&', '^', '~', ':', '?', '@', '#', '$'];

const PUNCT_CHARS: &[char] = &['(', ')', ',', ';', '.', '[', ']', '{', '}'];

impl Lexer for ScanLexer {
    fn tokenize<'a>(&self, sql: &'a str) -> Vec<Token<'a>> {
        let mut tokens = Vec::new();
        let mut chars = sql.char_indices().peekable();

        while let Some(&(start, ch)) = chars.peek() {
            let kind = match ch {
                '\'' => {
                    chars.next();
                    consume_quoted(&mut chars, '\'');
                    TokenKind::StringLiteral
                }
                '"' | '`' => {
                    chars.next();
                    consume_quoted(&mut chars, ch);
                    TokenKind::QuotedIdent
                }
                '-' if starts_with_at(sql, start, "--") => {
                    // Line comment: up to (not including) the newline
                    while let Some(&(_, c)) = chars.peek() {
                        if c == '\n' {
                            break;
                        }
                        chars.next();
                    }
                    TokenKind::Comment
                }
                '/' if starts_with_at(sql, start, "/*") => {
                    chars.next();
                    chars.next();
                    let mut prev = ' ';
                    for (_, c) in chars.by_ref() {
                        if prev == '*' && c == '/' {
                            break;
                        }
                        prev = c;
                    }
                    TokenKind::Comment
                }
                c if c.is_whitespace() => {
                    consume_while(&mut chars, char::is_whitespace);
                    TokenKind::Whitespace
                }
                c if c.is_ascii_digit() => {
                    consume_while(&mut chars, |c| c.is_ascii_digit());
                    if let Some(&(dot, '.')) = chars.peek() {
                        // Only a decimal point when followed by a digit or the end of the number
                        let after = sql[dot + 1..].chars().next();
                        if !after.is_some_and(|c| c.is_alphabetic() || c == '_') {
                            chars.next();
                            consume_while(&mut chars, |c| c.is_ascii_digit());
                        }
                    }
                    TokenKind::Number
                }
                c if c.is_alphabetic() || c == '_' => {
                    consume_while(&mut chars, |c| c.is_alphanumeric() || c == '_' || c == '$');
                    TokenKind::Word
                }
                c if PUNCT_CHARS.contains(&c) => {
                    chars.next();
                    TokenKind::Punct
                }
                c if OPERATOR_CHARS.contains(&c) => {
                    chars.next();
                    while let Some(&(idx, c)) = chars.peek() {
                        if !OPERATOR_CHARS.contains(&c)
                            || starts_with_at(sql, idx, "--")
                            || starts_with_at(sql, idx, "/*")
                        {
                            break;
                        }
                        chars.next();
                    }
                    TokenKind::Operator
                }
                _ => {
                    chars.next();
                    TokenKind::Operator
                }
            };

            let end = chars.peek().map_or(sql.len(), |&(idx, _)| idx);
            tokens.push(Token { kind, text: &sql[start..end] });
        }

        tokens
    }
}

fn starts_with_at(sql: &str, idx: usize, pattern: &str) -> bool {
    sql[idx..].starts_with(pattern)
}

fn consume_while<I>(chars: &mut std::iter::Peekable<I>, pred: impl Fn(char) -> bool)
where
    I: Iterator<Item = (usize, char)>,
{
    while let Some(&(_, c)) = chars.peek() {
        if !pred(c) {
            break;
        }
        chars.next();
    }
}

/// Consume the body of a quoted token; a doubled quote is an escaped quote
fn consume_quoted<I>(chars: &mut std::iter::Peekable<I>, quote: char)
where
    I: Iterator<Item = (usize, char)>,
{
    while let Some((_, c)) = chars.next() {
        if c == quote {
            if chars.peek().map(|&(_, next)| next) == Some(quote) {
                chars.next();
                continue;
            }
            return;
        }
    }
}

/// Strip surrounding quotes from a quoted identifier and undo doubled-quote escapes
#[must_use]
pub fn unquote(text: &str) -> String {
    let mut chars = text.chars();
    match chars.next() {
        Some(q @ ('"' | '`')) => {
            let inner = text[1..].strip_suffix(q).unwrap_or(&text[1..]);
            inner.replace(&format!("{q}{q}"), &q.to_string())
        }
        _ => text.to_string(),
    }
}

/// Wrap `name` in `quote_char`, doubling any embedded quote characters
#[must_use]
pub fn quote_ident(name: &str, quote_char: char) -> String {
    let escaped = name.replace(quote_char, &format!("{quote_char}{quote_char}"));
    format!("{quote_char}{escaped}{quote_char}")
}

/// Remove trailing statement terminators and whitespace
#[must_use]
pub fn strip_terminators(sql: &str) -> &str {
    sql.trim().trim_end_matches(|c: char| c == ';' || c.is_whitespace())
}

/// Index of the next significant token after `idx`
#[must_use]
pub fn next_significant(tokens: &[Token<'_>], idx: usize) -> Option<usize> {
    tokens.iter().enumerate().skip(idx + 1).find(|(_, t)| t.is_significant()).map(|(i, _)| i)
}

/// Table named by the outer statement's first `FROM` clause
///
/// Only a `FROM` outside every parenthesis counts, so the `FROM` of
/// `EXTRACT(YEAR FROM col)`, `TRIM(BOTH ' ' FROM col)`, subqueries and CTE bodies is
/// skipped. Schema-qualified names (`public.orders`) yield the last segment. A
/// subquery or a table-valued function in that position yields `None`.
#[must_use]
pub fn first_from_table(tokens: &[Token<'_>]) -> Option<String> {
    let from = top_level_position(tokens, |t| t.is_word("FROM"))?;
    let mut idx = next_significant(tokens, from)?;
    let mut name = tokens[idx].identifier()?;

    // Follow `schema.table` chains
    while let Some(dot) = next_significant(tokens, idx) {
        if !tokens[dot].is_punct('.') {
            break;
        }
        let Some(part) = next_significant(tokens, dot) else { break };
        match tokens[part].identifier() {
            Some(segment) => {
                name = segment;
                idx = part;
            }
            None => break,
        }
    }

    // Table-valued function, not a table
    if next_significant(tokens, idx).is_some_and(|n| tokens[n].is_punct('(')) {
        return None;
    }

    Some(name)
}

/// Index of the first token outside all parentheses that satisfies `pred`
fn top_level_position(tokens: &[Token<'_>], pred: impl Fn(&Token<'_>) -> bool) -> Option<usize> {
    let mut depth = 0usize;
    for (idx, token) in tokens.iter().enumerate() {
        if token.is_punct('(') {
            depth += 1;
        } else if token.is_punct(')') {
            depth = depth.saturating_sub(1);
        } else if depth == 0 && pred(token) {
            return Some(idx);
        }
    }
    None
}

/// Whether the statement already carries a row limit (`LIMIT n` or `FETCH FIRST/NEXT`)
#[must_use]
pub fn has_row_limit(tokens: &[Token<'_>]) -> bool {
    tokens.iter().enumerate().any(|(idx, t)| {
        t.is_word("LIMIT")
            || (t.is_word("FETCH")
                && next_significant(tokens, idx)
                    .is_some_and(|n| tokens[n].is_word("FIRST") || tokens[n].is_word("NEXT")))
    })
}
