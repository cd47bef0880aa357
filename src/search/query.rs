//! Boolean query parsing
//!
//! Grammar, lowest precedence first:
//!
//! ```text
//! query   := or
//! or      := and (OR and)*
//! and     := unary ((AND)? unary)*
//! unary   := NOT unary | word | "quoted phrase" | '(' query ')'
//! ```
//!
//! Keywords are case-insensitive. Offsets in errors are character offsets
//! into the original query string.

use std::fmt;
use thiserror::Error;

/// Parsed search expression. Pure once built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SearchQuery {
    Term(String),
    Phrase(Vec<String>),
    And(Vec<SearchQuery>),
    Or(Vec<SearchQuery>),
    Not(Box<SearchQuery>),
}

impl SearchQuery {
    fn and(mut items: Vec<SearchQuery>) -> Self {
        if items.len() == 1 {
            items.remove(0)
        } else {
            SearchQuery::And(items)
        }
    }

    fn or(mut items: Vec<SearchQuery>) -> Self {
        if items.len() == 1 {
            items.remove(0)
        } else {
            SearchQuery::Or(items)
        }
    }
}

impl fmt::Display for SearchQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SearchQuery::Term(word) => f.write_str(word),
            SearchQuery::Phrase(words) => write!(f, "\"{}\"", words.join(" ")),
            SearchQuery::Not(inner) => write!(f, "NOT {inner}"),
            SearchQuery::And(items) => write_joined(f, items, " AND "),
            SearchQuery::Or(items) => write_joined(f, items, " OR "),
        }
    }
}

fn write_joined(f: &mut fmt::Formatter<'_>, items: &[SearchQuery], sep: &str) -> fmt::Result {
    f.write_str("(")?;
    for (i, item) in items.iter().enumerate() {
        if i > 0 {
            f.write_str(sep)?;
        }
        write!(f, "{item}")?;
    }
    f.write_str(")")
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyntaxErrorKind {
    EmptyQuery,
    EmptyTerm,
    TrailingOperator,
    MissingOperand,
    UnbalancedParenthesis,
    UnterminatedQuote,
}

impl fmt::Display for SyntaxErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            SyntaxErrorKind::EmptyQuery => "empty query",
            SyntaxErrorKind::EmptyTerm => "empty term",
            SyntaxErrorKind::TrailingOperator => "trailing operator",
            SyntaxErrorKind::MissingOperand => "operator without operand",
            SyntaxErrorKind::UnbalancedParenthesis => "unbalanced parenthesis",
            SyntaxErrorKind::UnterminatedQuote => "unterminated quote",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("{kind} at offset {offset}")]
pub struct QuerySyntaxError {
    pub kind: SyntaxErrorKind,
    pub offset: usize,
}

impl QuerySyntaxError {
    fn new(kind: SyntaxErrorKind, offset: usize) -> Self {
        Self { kind, offset }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum TokenKind {
    LParen,
    RParen,
    And,
    Or,
    Not,
    Word(String),
    Phrase(Vec<String>),
}

#[derive(Debug, Clone)]
struct Token {
    kind: TokenKind,
    offset: usize,
}

fn is_delimiter(c: char) -> bool {
    c.is_whitespace() || matches!(c, '(' | ')' | '"')
}

fn tokenize(chars: &[char]) -> Result<Vec<Token>, QuerySyntaxError> {
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        if c.is_whitespace() {
            i += 1;
            continue;
        }
        let start = i;
        let kind = match c {
            '(' => {
                i += 1;
                TokenKind::LParen
            }
            ')' => {
                i += 1;
                TokenKind::RParen
            }
            '"' => {
                let close = chars[start + 1..]
                    .iter()
                    .position(|&ch| ch == '"')
                    .map(|p| start + 1 + p)
                    .ok_or(QuerySyntaxError::new(
                        SyntaxErrorKind::UnterminatedQuote,
                        start,
                    ))?;
                let phrase: String = chars[start + 1..close].iter().collect();
                let words: Vec<String> = phrase.split_whitespace().map(str::to_string).collect();
                if words.is_empty() {
                    return Err(QuerySyntaxError::new(SyntaxErrorKind::EmptyTerm, start));
                }
                i = close + 1;
                TokenKind::Phrase(words)
            }
            _ => {
                while i < chars.len() && !is_delimiter(chars[i]) {
                    i += 1;
                }
                let word: String = chars[start..i].iter().collect();
                match word.to_uppercase().as_str() {
                    "AND" => TokenKind::And,
                    "OR" => TokenKind::Or,
                    "NOT" => TokenKind::Not,
                    _ => TokenKind::Word(word),
                }
            }
        };
        tokens.push(Token {
            kind,
            offset: start,
        });
    }

    Ok(tokens)
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    depth: usize,
    /// Offset of the last non-whitespace character; used for errors at end of input
    end_offset: usize,
}

impl Parser {
    fn peek(&self) -> Option<&TokenKind> {
        self.tokens.get(self.pos).map(|t| &t.kind)
    }

    fn next(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    /// An open group always wins over whatever else ran out at end of input.
    fn eof_error(&self, kind: SyntaxErrorKind) -> QuerySyntaxError {
        if self.depth > 0 {
            QuerySyntaxError::new(SyntaxErrorKind::UnbalancedParenthesis, self.end_offset)
        } else {
            QuerySyntaxError::new(kind, self.end_offset)
        }
    }

    fn parse_or(&mut self) -> Result<SearchQuery, QuerySyntaxError> {
        let mut items = vec![self.parse_and()?];
        while matches!(self.peek(), Some(TokenKind::Or)) {
            self.pos += 1;
            items.push(self.parse_and()?);
        }
        Ok(SearchQuery::or(items))
    }

    fn parse_and(&mut self) -> Result<SearchQuery, QuerySyntaxError> {
        let mut items = vec![self.parse_unary()?];
        loop {
            match self.peek() {
                Some(TokenKind::And) => {
                    self.pos += 1;
                    items.push(self.parse_unary()?);
                }
                Some(
                    TokenKind::Word(_) | TokenKind::Phrase(_) | TokenKind::Not | TokenKind::LParen,
                ) => items.push(self.parse_unary()?),
                _ => break,
            }
        }
        Ok(SearchQuery::and(items))
    }

    fn parse_unary(&mut self) -> Result<SearchQuery, QuerySyntaxError> {
        let Some(token) = self.next() else {
            return Err(self.eof_error(SyntaxErrorKind::TrailingOperator));
        };

        match token.kind {
            TokenKind::Word(word) => Ok(SearchQuery::Term(word)),
            TokenKind::Phrase(words) => Ok(SearchQuery::Phrase(words)),
            TokenKind::Not => Ok(SearchQuery::Not(Box::new(self.parse_unary()?))),
            TokenKind::LParen => {
                if matches!(self.peek(), Some(TokenKind::RParen)) {
                    return Err(QuerySyntaxError::new(SyntaxErrorKind::EmptyTerm, token.offset));
                }
                self.depth += 1;
                let inner = self.parse_or()?;
                match self.next() {
                    Some(Token {
                        kind: TokenKind::RParen,
                        ..
                    }) => {
                        self.depth -= 1;
                        Ok(inner)
                    }
                    Some(other) => Err(QuerySyntaxError::new(
                        SyntaxErrorKind::UnbalancedParenthesis,
                        other.offset,
                    )),
                    None => Err(self.eof_error(SyntaxErrorKind::UnbalancedParenthesis)),
                }
            }
            TokenKind::RParen if self.depth == 0 => Err(QuerySyntaxError::new(
                SyntaxErrorKind::UnbalancedParenthesis,
                token.offset,
            )),
            TokenKind::RParen | TokenKind::And | TokenKind::Or => Err(QuerySyntaxError::new(
                SyntaxErrorKind::MissingOperand,
                token.offset,
            )),
        }
    }
}

/// Parse a boolean query string.
pub fn parse(input: &str) -> Result<SearchQuery, QuerySyntaxError> {
    let chars: Vec<char> = input.chars().collect();
    let tokens = tokenize(&chars)?;
    if tokens.is_empty() {
        return Err(QuerySyntaxError::new(SyntaxErrorKind::EmptyQuery, 0));
    }

    let end_offset = chars.iter().rposition(|c| !c.is_whitespace()).unwrap_or(0);
    let mut parser = Parser {
        tokens,
        pos: 0,
        depth: 0,
        end_offset,
    };

    let query = parser.parse_or()?;
    if let Some(extra) = parser.next() {
        // parse_or only stops early on a closing parenthesis with no opener
        return Err(QuerySyntaxError::new(
            SyntaxErrorKind::UnbalancedParenthesis,
            extra.offset,
        ));
    }
    Ok(query)
}
