//! Errors that abort the config load (as opposed to skip-and-warn
//! element problems, which are logged and recovered from).

use crate::expr::ExprError;
use crate::format::FormatError;
use crate::site::LookupError;
use crate::xml::XmlError;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("no config file at `{0}`")]
    Missing(PathBuf),

    #[error("cannot read `{0}`: {1}")]
    Io(PathBuf, #[source] std::io::Error),

    #[error("invalid config root: {0}")]
    Root(String),

    #[error(transparent)]
    Xml(#[from] XmlError),

    #[error(transparent)]
    Format(#[from] FormatError),

    #[error(transparent)]
    Lookup(#[from] LookupError),

    #[error(transparent)]
    Expr(#[from] ExprError),
}
