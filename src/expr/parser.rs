//! Recursive-descent parser producing immutable expression trees.
//!
//! Grammar:
//!
//! ```text
//! expr    := literal | IDENT | IDENT '(' [expr (',' expr)*] ')'
//! literal := STRING | INT | FLOAT | BOOL | DATE
//! ```
//!
//! `let(name, value)` parses as an ordinary call; the evaluator gives it
//! binding-form semantics.

use super::error::ExprError;
use super::token::{Spanned, Token, tokenize};
use chrono::{DateTime, FixedOffset};

#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    Str(String),
    Int(i64),
    Float(f64),
    Bool(bool),
    Date(DateTime<FixedOffset>),
}

/// A parsed expression tree. Produced fresh for every `${...}` occurrence;
/// never cached across resolutions.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Literal(Literal),
    Ident(String),
    Call { name: String, args: Vec<Expr> },
}

/// Parse a complete expression body, rejecting trailing tokens.
pub fn parse(source: &str) -> Result<Expr, ExprError> {
    let tokens = tokenize(source)?;
    let mut parser = Parser {
        source,
        tokens,
        pos: 0,
    };
    let expr = parser.parse_expr()?;
    if let Some(spanned) = parser.peek() {
        return Err(ExprError::syntax(
            source,
            spanned.offset,
            "unexpected trailing tokens",
        ));
    }
    Ok(expr)
}

struct Parser<'a> {
    source: &'a str,
    tokens: Vec<Spanned>,
    pos: usize,
}

impl Parser<'_> {
    fn peek(&self) -> Option<&Spanned> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Option<Spanned> {
        let spanned = self.tokens.get(self.pos).cloned();
        self.pos += 1;
        spanned
    }

    fn error_here(&self, message: &str) -> ExprError {
        let offset = self
            .tokens
            .get(self.pos)
            .map_or(self.source.len(), |s| s.offset);
        ExprError::syntax(self.source, offset, message)
    }

    fn parse_expr(&mut self) -> Result<Expr, ExprError> {
        let Some(spanned) = self.next() else {
            return Err(self.error_here("expected an expression"));
        };
        match spanned.token {
            Token::Str(s) => Ok(Expr::Literal(Literal::Str(s))),
            Token::Int(n) => Ok(Expr::Literal(Literal::Int(n))),
            Token::Float(f) => Ok(Expr::Literal(Literal::Float(f))),
            Token::Bool(b) => Ok(Expr::Literal(Literal::Bool(b))),
            Token::Date(d) => Ok(Expr::Literal(Literal::Date(d))),
            Token::Ident(name) => {
                if matches!(self.peek(), Some(s) if s.token == Token::LParen) {
                    self.next();
                    let args = self.parse_args()?;
                    Ok(Expr::Call { name, args })
                } else {
                    Ok(Expr::Ident(name))
                }
            }
            Token::LParen | Token::RParen | Token::Comma => Err(ExprError::syntax(
                self.source,
                spanned.offset,
                "expected an expression",
            )),
        }
    }

    fn parse_args(&mut self) -> Result<Vec<Expr>, ExprError> {
        let mut args = Vec::new();
        if matches!(self.peek(), Some(s) if s.token == Token::RParen) {
            self.next();
            return Ok(args);
        }
        loop {
            args.push(self.parse_expr()?);
            match self.next() {
                Some(Spanned {
                    token: Token::Comma, ..
                }) => continue,
                Some(Spanned {
                    token: Token::RParen,
                    ..
                }) => return Ok(args),
                Some(spanned) => {
                    return Err(ExprError::syntax(
                        self.source,
                        spanned.offset,
                        "expected `,` or `)`",
                    ));
                }
                None => return Err(self.error_here("unclosed argument list")),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_identifier() {
        assert_eq!(parse("title").unwrap(), Expr::Ident("title".into()));
    }

    #[test]
    fn parses_nested_calls() {
        let expr = parse("take(reverse(pages), 3)").unwrap();
        let Expr::Call { name, args } = expr else {
            panic!("expected call");
        };
        assert_eq!(name, "take");
        assert_eq!(args.len(), 2);
        assert!(matches!(&args[0], Expr::Call { name, .. } if name == "reverse"));
        assert_eq!(args[1], Expr::Literal(Literal::Int(3)));
    }

    #[test]
    fn parses_empty_argument_list() {
        assert_eq!(
            parse("now()").unwrap(),
            Expr::Call {
                name: "now".into(),
                args: vec![]
            }
        );
    }

    #[test]
    fn rejects_trailing_tokens() {
        assert!(matches!(
            parse("a b"),
            Err(ExprError::Syntax { offset: 2, .. })
        ));
    }

    #[test]
    fn rejects_unclosed_call() {
        assert!(parse("take(pages").is_err());
    }
}
