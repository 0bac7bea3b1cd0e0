//! Tokenizer for definition files.
//!
//! Produces a stream of [`Token`]s from definition source text. Handles
//! keywords, quoted strings, `<...>` header paths, numbers (decimal, hex,
//! negative), identifiers (which may carry a `$variant` suffix), and
//! significant newlines. The body of a `define` is captured verbatim as a
//! single [`TokenKind::Raw`] token since it is a C expression.

use std::path::PathBuf;

use crate::error::ParseError;

/// A token with source location.
#[derive(Debug, Clone)]
pub struct Token {
    pub kind: TokenKind,
    pub span: Span,
}

/// Source location for error reporting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Span {
    pub file: PathBuf,
    pub line: usize,
    pub col: usize,
}

impl std::fmt::Display for Span {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}:{}", self.file.display(), self.line, self.col)
    }
}

/// Token variants.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenKind {
    // Keywords
    Include,
    Incdir,
    Define,
    Meta,
    Resource,

    // Literals
    /// Quoted string content (quotes stripped).
    String(String),
    /// `<path>` content (brackets stripped).
    Angle(String),
    /// Integer literal. Negative literals are stored two's-complement.
    Integer(u64),
    /// Identifier, possibly with a `$variant` suffix.
    Ident(String),
    /// Verbatim rest-of-line text (the value of a `define`).
    Raw(String),

    // Punctuation
    LParen,
    RParen,
    LBracket,
    RBracket,
    LBrace,
    RBrace,
    Comma,
    Colon,
    Equals,

    // Structure
    Newline,
    Eof,
}

/// Tokenize definition source text.
pub fn tokenize(source: &str, file: PathBuf) -> Result<Vec<Token>, ParseError> {
    let mut tokens = Vec::new();
    let mut chars = source.char_indices().peekable();
    let mut line = 1usize;
    let mut line_start = 0usize;

    let span = |line: usize, col: usize| Span { file: file.clone(), line, col };

    while let Some(&(pos, ch)) = chars.peek() {
        let col = pos - line_start + 1;

        match ch {
            '#' => {
                while let Some(&(_, c)) = chars.peek() {
                    if c == '\n' {
                        break;
                    }
                    chars.next();
                }
            }

            '\n' => {
                // Collapse consecutive newlines
                if tokens.last().is_some_and(|t: &Token| t.kind != TokenKind::Newline) {
                    tokens.push(Token { kind: TokenKind::Newline, span: span(line, col) });
                }
                chars.next();
                line += 1;
                line_start = pos + 1;
            }

            ' ' | '\t' | '\r' => {
                chars.next();
            }

            '"' => {
                chars.next();
                let mut s = String::new();
                loop {
                    match chars.next() {
                        Some((_, '"')) => break,
                        Some((_, '\\')) => {
                            if let Some((_, escaped)) = chars.next() {
                                match escaped {
                                    'n' => s.push('\n'),
                                    't' => s.push('\t'),
                                    '\\' => s.push('\\'),
                                    '"' => s.push('"'),
                                    _ => {
                                        s.push('\\');
                                        s.push(escaped);
                                    }
                                }
                            }
                        }
                        Some((_, '\n')) | None => {
                            return Err(ParseError::new(span(line, col), "unterminated string"));
                        }
                        Some((_, c)) => s.push(c),
                    }
                }
                tokens.push(Token { kind: TokenKind::String(s), span: span(line, col) });
            }

            '<' => {
                chars.next();
                let mut s = String::new();
                loop {
                    match chars.next() {
                        Some((_, '>')) => break,
                        Some((_, '\n')) | None => {
                            return Err(ParseError::new(span(line, col), "unterminated <path>"));
                        }
                        Some((_, c)) => s.push(c),
                    }
                }
                let path = s.trim();
                if path.is_empty() {
                    return Err(ParseError::new(span(line, col), "empty <path>"));
                }
                tokens.push(Token { kind: TokenKind::Angle(path.to_string()), span: span(line, col) });
            }

            '(' | ')' | '[' | ']' | '{' | '}' | ',' | ':' | '=' => {
                let kind = match ch {
                    '(' => TokenKind::LParen,
                    ')' => TokenKind::RParen,
                    '[' => TokenKind::LBracket,
                    ']' => TokenKind::RBracket,
                    '{' => TokenKind::LBrace,
                    '}' => TokenKind::RBrace,
                    ',' => TokenKind::Comma,
                    ':' => TokenKind::Colon,
                    _ => TokenKind::Equals,
                };
                tokens.push(Token { kind, span: span(line, col) });
                chars.next();
            }

            '-' | '0'..='9' => {
                let negative = ch == '-';
                chars.next();
                let start = if negative {
                    match chars.peek() {
                        Some(&(p, '0'..='9')) => p,
                        _ => return Err(ParseError::new(span(line, col), "expected digit after '-'")),
                    }
                } else {
                    pos
                };
                while let Some(&(_, c)) = chars.peek() {
                    if c.is_ascii_alphanumeric() || c == '_' {
                        chars.next();
                    } else {
                        break;
                    }
                }
                let end = chars.peek().map_or(source.len(), |&(p, _)| p);
                let raw = &source[start..end];
                let value = parse_integer(raw).ok_or_else(|| {
                    ParseError::new(span(line, col), format!("invalid integer literal '{raw}'"))
                })?;
                let value = if negative { value.wrapping_neg() } else { value };
                tokens.push(Token { kind: TokenKind::Integer(value), span: span(line, col) });
            }

            c if c.is_ascii_alphabetic() || c == '_' => {
                let start = pos;
                chars.next();
                while let Some(&(_, c)) = chars.peek() {
                    if c.is_ascii_alphanumeric() || c == '_' || c == '$' {
                        chars.next();
                    } else {
                        break;
                    }
                }
                let end = chars.peek().map_or(source.len(), |&(p, _)| p);
                let word = &source[start..end];

                let kind = match word {
                    "include" => TokenKind::Include,
                    "incdir" => TokenKind::Incdir,
                    "meta" => TokenKind::Meta,
                    "resource" => TokenKind::Resource,
                    "define" => TokenKind::Define,
                    _ => TokenKind::Ident(word.to_string()),
                };
                let is_define = kind == TokenKind::Define;
                tokens.push(Token { kind, span: span(line, col) });

                if is_define {
                    // define NAME <rest of line>
                    while let Some(&(_, ' ' | '\t')) = chars.peek() {
                        chars.next();
                    }
                    let Some(&(name_pos, c)) = chars.peek() else {
                        break;
                    };
                    if !(c.is_ascii_alphabetic() || c == '_') {
                        return Err(ParseError::new(
                            span(line, name_pos - line_start + 1),
                            "expected name after define",
                        ));
                    }
                    while let Some(&(_, c)) = chars.peek() {
                        if c.is_ascii_alphanumeric() || c == '_' {
                            chars.next();
                        } else {
                            break;
                        }
                    }
                    let name_end = chars.peek().map_or(source.len(), |&(p, _)| p);
                    tokens.push(Token {
                        kind: TokenKind::Ident(source[name_pos..name_end].to_string()),
                        span: span(line, name_pos - line_start + 1),
                    });

                    let value_col = name_end - line_start + 1;
                    while let Some(&(_, c)) = chars.peek() {
                        if c == '\n' {
                            break;
                        }
                        chars.next();
                    }
                    let value_end = chars.peek().map_or(source.len(), |&(p, _)| p);
                    let value = source[name_end..value_end].trim();
                    if value.is_empty() {
                        return Err(ParseError::new(span(line, value_col), "define without a value"));
                    }
                    tokens.push(Token {
                        kind: TokenKind::Raw(value.to_string()),
                        span: span(line, value_col),
                    });
                }
            }

            _ => {
                return Err(ParseError::new(span(line, col), format!("unexpected character '{ch}'")));
            }
        }
    }

    // Ensure we end with a newline before EOF for uniform parsing
    if tokens.last().is_some_and(|t| t.kind != TokenKind::Newline) {
        tokens.push(Token { kind: TokenKind::Newline, span: span(line, 1) });
    }

    tokens.push(Token { kind: TokenKind::Eof, span: Span { file, line, col: 1 } });

    Ok(tokens)
}

/// Parse a decimal or `0x` hex literal, ignoring `_` separators.
fn parse_integer(raw: &str) -> Option<u64> {
    let clean = raw.replace('_', "");
    if let Some(hex) = clean.strip_prefix("0x").or_else(|| clean.strip_prefix("0X")) {
        u64::from_str_radix(hex, 16).ok()
    } else {
        clean.parse::<u64>().ok()
    }
}
