//! The compile-time expression language.
//!
//! `${...}` spans embedded in template text and attributes are tokenized
//! (`token`), parsed into immutable expression trees (`parser`) and
//! evaluated (`runtime`) against a scoped [`RuntimeContext`]. Built-in
//! functions live in `builtins`; the value model in `value`.
//!
//! Expressions are parsed lazily per encountered span and never cached:
//! every occurrence is re-tokenized and re-parsed when content is
//! resolved.

pub mod builtins;
pub mod context;
mod error;
pub mod parser;
pub mod runtime;
pub mod token;
pub mod value;

pub use context::RuntimeContext;
pub use error::ExprError;
pub use value::{Value, ValueMap};
