//! Document formats: validator and formatter contracts plus the keyed
//! format registry.
//!
//! Validators and formatters are the external collaborators of the
//! compilation engine: a validator checks a source document against its
//! schema and resolves the concrete document type, a formatter turns the
//! validated (and expression-resolved) markup into its output
//! representation.

mod raw;
mod xml;

pub use raw::{RawFormatter, RawValidator};
pub use xml::{TransformFormatter, XmlValidator};

use rustc_hash::FxHashMap;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;

/// Schema/format errors: aborts the compilation of the document that
/// raised them.
#[derive(Debug, Error)]
pub enum FormatError {
    #[error("document is not valid {expected}: {message}")]
    Schema {
        expected: DocumentType,
        message: String,
    },

    #[error("document type {found} is not accepted by validator for {expected}")]
    WrongType {
        found: DocumentType,
        expected: DocumentType,
    },

    #[error("cannot read `{0}`")]
    Io(PathBuf, #[source] std::io::Error),

    #[error("transform failed: {0}")]
    Transform(String),

    #[error("no format registered under key `{0}`")]
    UnknownFormat(String),
}

/// The content type and schema version of a document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentType {
    pub content_type: String,
    pub version: Option<String>,
}

impl DocumentType {
    pub fn new(content_type: impl Into<String>) -> Self {
        DocumentType {
            content_type: content_type.into(),
            version: None,
        }
    }

    pub fn with_version(content_type: impl Into<String>, version: impl Into<String>) -> Self {
        DocumentType {
            content_type: content_type.into(),
            version: Some(version.into()),
        }
    }

    /// Whether this type is assignable to `other`: content types match
    /// and `other` either accepts any version or the exact same one.
    pub fn is(&self, other: &DocumentType) -> bool {
        self.content_type == other.content_type
            && (other.version.is_none() || other.version == self.version)
    }

    /// XML/markup family types get expression resolution; everything
    /// else is copied verbatim through compilation.
    pub fn is_markup(&self) -> bool {
        let ct = self.content_type.as_str();
        ct == "text/xml"
            || ct == "application/xml"
            || ct == "text/html"
            || ct.ends_with("+xml")
    }
}

impl fmt::Display for DocumentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.version {
            Some(v) => write!(f, "{} [v{v}]", self.content_type),
            None => write!(f, "{} [any]", self.content_type),
        }
    }
}

/// Validates documents of a specific schema.
pub trait DocValidator: Send + Sync {
    /// The type of documents this validator checks.
    fn doc_type(&self) -> DocumentType;

    /// Validate `input` against the schema, narrowing `requested` to the
    /// concrete type the document was validated as.
    fn validate(&self, input: &[u8], requested: &DocumentType) -> Result<DocumentType, FormatError>;
}

/// Transforms validated markup into its output representation.
pub trait DocFormatter: Send + Sync {
    /// The type of documents this formatter produces.
    fn output_type(&self) -> DocumentType;

    /// One-time setup (e.g. loading a transform file). Called once when
    /// the format is registered, before any `convert`.
    fn initialize(&self) -> Result<(), FormatError> {
        Ok(())
    }

    fn convert(&self, input: &[u8], output: &mut Vec<u8>) -> Result<(), FormatError>;
}

/// A registered validator+formatter pair.
pub struct Format {
    pub validator: Arc<dyn DocValidator>,
    pub formatter: Arc<dyn DocFormatter>,
}

/// String-keyed registry of formats. `"xml"` and `"raw"` are built in;
/// `Format` config elements add custom pairs before any template
/// referencing them is loaded.
pub struct FormatRegistry {
    formats: FxHashMap<String, Arc<Format>>,
}

impl FormatRegistry {
    pub fn new() -> Result<Self, FormatError> {
        let mut registry = FormatRegistry {
            formats: FxHashMap::default(),
        };
        registry.register(
            "xml",
            Format {
                validator: Arc::new(XmlValidator::any()),
                formatter: Arc::new(TransformFormatter::identity()),
            },
        )?;
        registry.register(
            "raw",
            Format {
                validator: Arc::new(RawValidator),
                formatter: Arc::new(RawFormatter),
            },
        )?;
        Ok(registry)
    }

    /// Register a format, initializing its formatter.
    pub fn register(&mut self, key: impl Into<String>, format: Format) -> Result<(), FormatError> {
        format.formatter.initialize()?;
        self.formats.insert(key.into(), Arc::new(format));
        Ok(())
    }

    pub fn get(&self, key: &str) -> Result<Arc<Format>, FormatError> {
        self.formats
            .get(key)
            .cloned()
            .ok_or_else(|| FormatError::UnknownFormat(key.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn document_type_compatibility() {
        let any = DocumentType::new("application/xml");
        let v1 = DocumentType::with_version("application/xml", "1.0");
        let v2 = DocumentType::with_version("application/xml", "2.0");
        assert!(v1.is(&any));
        assert!(v1.is(&v1));
        assert!(!v1.is(&v2));
        assert!(!DocumentType::new("text/plain").is(&any));
    }

    #[test]
    fn markup_family_detection() {
        assert!(DocumentType::new("application/xml").is_markup());
        assert!(DocumentType::new("image/svg+xml").is_markup());
        assert!(DocumentType::new("text/html").is_markup());
        assert!(!DocumentType::new("text/plain").is_markup());
    }

    #[test]
    fn registry_has_builtin_formats() {
        let registry = FormatRegistry::new().unwrap();
        assert!(registry.get("xml").is_ok());
        assert!(registry.get("raw").is_ok());
        assert!(matches!(
            registry.get("custom"),
            Err(FormatError::UnknownFormat(key)) if key == "custom"
        ));
    }
}
