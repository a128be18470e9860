//! Templates: compilable source files bound to a format.

use crate::expr::{RuntimeContext, Value};
use crate::format::{DocumentType, Format};
use crate::resolve;
use crate::xml::Element;
use anyhow::{Context, Result};
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

/// A compilable source file plus its validator/formatter pair.
///
/// Compilation is parameterized by a runtime context and is not
/// memoized: every call re-reads the source file, so two pages sharing a
/// template each get a fresh resolution against their own context.
pub struct Template {
    pub file: PathBuf,
    pub name: String,
    pub format: Arc<Format>,
}

/// The output of one template compilation.
pub struct Compiled {
    pub doc_type: DocumentType,
    pub bytes: Vec<u8>,
}

impl Compiled {
    /// Convert into an expression value: markup output becomes a node
    /// that can be spliced into an enclosing tree, anything else a
    /// string.
    pub fn into_value(self) -> Result<Value> {
        if self.doc_type.is_markup() {
            let root = Element::parse(&self.bytes)?;
            Ok(Value::Node(Arc::new(root)))
        } else {
            Ok(Value::Str(String::from_utf8_lossy(&self.bytes).into_owned()))
        }
    }
}

impl Template {
    pub async fn compile(&self, ctx: &RuntimeContext) -> Result<Compiled> {
        let source = fs::read(&self.file)
            .with_context(|| format!("cannot read template `{}`", self.file.display()))?;

        let requested = self.format.validator.doc_type();
        let doc_type = self
            .format
            .validator
            .validate(&source, &requested)
            .with_context(|| format!("template `{}` failed validation", self.name))?;

        let input = if doc_type.is_markup() {
            let mut root = Element::parse(&source)?;
            resolve::resolve_element(&mut root, ctx).await?;
            root.to_bytes()?
        } else {
            source
        };

        let mut output = Vec::new();
        self.format
            .formatter
            .convert(&input, &mut output)
            .with_context(|| format!("template `{}` failed formatting", self.name))?;

        Ok(Compiled {
            doc_type: self.format.formatter.output_type(),
            bytes: output,
        })
    }
}

impl std::fmt::Debug for Template {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Template")
            .field("file", &self.file)
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}
