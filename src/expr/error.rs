//! Expression evaluation error types.

use thiserror::Error;

/// Errors raised while tokenizing, parsing or evaluating a `${...}`
/// expression.
#[derive(Debug, Error)]
pub enum ExprError {
    /// Malformed expression source. Carries the offending source text and
    /// the byte offset the tokenizer or parser stopped at.
    #[error("syntax error in `{source_text}` at byte {offset}: {message}")]
    Syntax {
        source_text: String,
        offset: usize,
        message: String,
    },

    /// An identifier or dictionary key that is bound nowhere in the
    /// current context.
    #[error("could not find \"{0}\" in the current context")]
    NotFound(String),

    #[error("type error: {0}")]
    Type(String),

    #[error("`{name}` expects {expected} argument(s), got {got}")]
    Arity {
        name: &'static str,
        expected: usize,
        got: usize,
    },

    /// Failure inside a callable value, e.g. a template compilation
    /// invoked from an expression.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl ExprError {
    pub fn syntax(source_text: &str, offset: usize, message: impl Into<String>) -> Self {
        ExprError::Syntax {
            source_text: source_text.to_string(),
            offset,
            message: message.into(),
        }
    }
}
