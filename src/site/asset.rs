//! Compiled resource identities: assets and stylesheets.

use std::path::PathBuf;

/// A file copied verbatim into the site output. Stylesheets are assets
/// placed under `assets/css/`; generic assets under `assets/`.
///
/// Immutable once constructed.
#[derive(Debug, Clone, PartialEq)]
pub struct Asset {
    /// The copied file inside the output tree.
    pub file: PathBuf,
    pub name: String,
    /// Output-relative path, e.g. `assets/css/main.css`.
    pub href: String,
}

impl Asset {
    pub fn new(file: PathBuf, name: impl Into<String>, href: impl Into<String>) -> Self {
        Asset {
            file,
            name: name.into(),
            href: href.into(),
        }
    }
}
