//! Tokenizer for `${...}` expression bodies.

use super::error::ExprError;
use chrono::{DateTime, FixedOffset, NaiveDate};

#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    Ident(String),
    Str(String),
    Int(i64),
    Float(f64),
    Bool(bool),
    Date(DateTime<FixedOffset>),
    LParen,
    RParen,
    Comma,
}

/// A token plus the byte offset it starts at, for error reporting.
#[derive(Debug, Clone, PartialEq)]
pub struct Spanned {
    pub token: Token,
    pub offset: usize,
}

/// Tokenize an expression body (the text between `${` and `}`).
pub fn tokenize(source: &str) -> Result<Vec<Spanned>, ExprError> {
    let mut tokens = Vec::new();
    let mut chars = source.char_indices().peekable();

    while let Some(&(offset, ch)) = chars.peek() {
        match ch {
            c if c.is_whitespace() => {
                chars.next();
            }
            '(' => {
                chars.next();
                tokens.push(Spanned { token: Token::LParen, offset });
            }
            ')' => {
                chars.next();
                tokens.push(Spanned { token: Token::RParen, offset });
            }
            ',' => {
                chars.next();
                tokens.push(Spanned { token: Token::Comma, offset });
            }
            '\'' | '"' => {
                let token = scan_string(source, &mut chars, offset, ch)?;
                tokens.push(Spanned { token, offset });
            }
            c if c.is_ascii_digit() || c == '-' => {
                let token = scan_number(source, &mut chars, offset)?;
                tokens.push(Spanned { token, offset });
            }
            c if c.is_alphabetic() || c == '_' => {
                let token = scan_ident(&mut chars);
                tokens.push(Spanned { token, offset });
            }
            c => {
                return Err(ExprError::syntax(
                    source,
                    offset,
                    format!("unexpected character `{c}`"),
                ));
            }
        }
    }

    Ok(tokens)
}

type Chars<'a> = std::iter::Peekable<std::str::CharIndices<'a>>;

fn scan_string(
    source: &str,
    chars: &mut Chars<'_>,
    start: usize,
    quote: char,
) -> Result<Token, ExprError> {
    chars.next(); // opening quote
    let mut text = String::new();
    loop {
        match chars.next() {
            Some((_, c)) if c == quote => return Ok(Token::Str(text)),
            Some((escape_at, '\\')) => match chars.next() {
                Some((_, 'n')) => text.push('\n'),
                Some((_, 't')) => text.push('\t'),
                Some((_, c @ ('\\' | '\'' | '"'))) => text.push(c),
                other => {
                    let offset = other.map_or(escape_at, |(i, _)| i);
                    return Err(ExprError::syntax(source, offset, "invalid escape sequence"));
                }
            },
            Some((_, c)) => text.push(c),
            None => {
                return Err(ExprError::syntax(source, start, "unterminated string literal"));
            }
        }
    }
}

fn scan_ident(chars: &mut Chars<'_>) -> Token {
    let mut name = String::new();
    while let Some(&(_, c)) = chars.peek() {
        if c.is_alphanumeric() || c == '_' {
            name.push(c);
            chars.next();
        } else {
            break;
        }
    }
    match name.as_str() {
        "true" => Token::Bool(true),
        "false" => Token::Bool(false),
        _ => Token::Ident(name),
    }
}

/// Scan a numeric or date literal.
///
/// Dates are recognized by their second dash (`2024-06-01`,
/// `2024-06-01T12:00:00Z`); everything else is an integer or float.
fn scan_number(source: &str, chars: &mut Chars<'_>, start: usize) -> Result<Token, ExprError> {
    let mut text = String::new();
    while let Some(&(_, c)) = chars.peek() {
        if c.is_ascii_digit() || matches!(c, '.' | ':' | '-' | '+' | 'T' | 'Z') {
            text.push(c);
            chars.next();
        } else {
            break;
        }
    }

    let dashes = text.chars().skip(1).filter(|&c| c == '-').count();
    if dashes >= 2 {
        parse_date(&text)
            .map(Token::Date)
            .ok_or_else(|| ExprError::syntax(source, start, format!("invalid date literal `{text}`")))
    } else if text.contains('.') {
        text.parse()
            .map(Token::Float)
            .map_err(|_| ExprError::syntax(source, start, format!("invalid number `{text}`")))
    } else {
        text.parse()
            .map(Token::Int)
            .map_err(|_| ExprError::syntax(source, start, format!("invalid number `{text}`")))
    }
}

/// Parse an RFC 3339 timestamp or a plain `YYYY-MM-DD` date (midnight UTC).
pub fn parse_date(text: &str) -> Option<DateTime<FixedOffset>> {
    DateTime::parse_from_rfc3339(text).ok().or_else(|| {
        NaiveDate::parse_from_str(text, "%Y-%m-%d")
            .ok()
            .and_then(|d| d.and_hms_opt(0, 0, 0))
            .map(|dt| dt.and_utc().fixed_offset())
    })
}
