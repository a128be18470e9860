//! Pages: templates instantiated with a concrete destination.

use super::template::Template;
use crate::expr::ValueMap;
use std::path::PathBuf;
use std::sync::Arc;

/// A template instantiated with a destination and optional body
/// sub-template.
///
/// A page borrows its templates from the enclosing group's table; the
/// association is established once at config-load time and never
/// mutated. Templates never reference pages back, so no ownership cycle
/// can form.
#[derive(Debug)]
pub struct Page {
    /// Absolute destination file, resolved once at load time.
    pub destination: PathBuf,
    /// Output-relative path, e.g. `about/index.html`.
    pub path: String,
    pub name: String,
    /// Free-form properties from the config element's attributes and
    /// children, exposed through the page's keyed lookup.
    pub properties: ValueMap,
    pub template: Arc<Template>,
    pub body: Option<Arc<Template>>,
}
