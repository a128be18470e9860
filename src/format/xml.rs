//! XML format: namespace/version-checking validator and a rule-based
//! streaming transform formatter.

use super::{DocFormatter, DocValidator, DocumentType, FormatError};
use crate::xml::Element;
use quick_xml::{
    Reader, Writer,
    events::{BytesEnd, BytesStart, Event},
};
use std::fs;
use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

pub const XML_CONTENT_TYPE: &str = "application/xml";

/// Validates that a document is well-formed XML and that its root
/// element's namespace and version match the schema it was registered
/// with.
pub struct XmlValidator {
    doc_type: DocumentType,
    namespace: Option<String>,
}

impl XmlValidator {
    /// Accept any well-formed XML document.
    pub fn any() -> Self {
        XmlValidator {
            doc_type: DocumentType::new(XML_CONTENT_TYPE),
            namespace: None,
        }
    }

    /// Build a validator from a schema file: `targetNamespace` gives the
    /// required root namespace, `version` the schema version.
    pub fn from_schema(path: &Path) -> Result<Self, FormatError> {
        let bytes = fs::read(path).map_err(|e| FormatError::Io(path.to_path_buf(), e))?;
        let root = Element::parse(&bytes).map_err(|e| FormatError::Schema {
            expected: DocumentType::new(XML_CONTENT_TYPE),
            message: format!("schema file `{}` is not valid XML: {e}", path.display()),
        })?;
        let namespace = root.attr("targetNamespace").map(str::to_string);
        let version = root.attr("version").map(str::to_string);
        Ok(XmlValidator {
            doc_type: DocumentType {
                content_type: XML_CONTENT_TYPE.to_string(),
                version,
            },
            namespace,
        })
    }

    /// Scan the whole document, returning the root element's start tag.
    fn check_well_formed(&self, input: &[u8]) -> Result<Element, FormatError> {
        let schema_error = |message: String| FormatError::Schema {
            expected: self.doc_type.clone(),
            message,
        };
        let root = Element::parse(input).map_err(|e| schema_error(e.to_string()))?;
        if let Some(namespace) = &self.namespace {
            let found = root.attr("xmlns").unwrap_or_default();
            if found != namespace {
                return Err(schema_error(format!(
                    "root namespace `{found}` does not match schema namespace `{namespace}`"
                )));
            }
        }
        Ok(root)
    }
}

impl DocValidator for XmlValidator {
    fn doc_type(&self) -> DocumentType {
        self.doc_type.clone()
    }

    fn validate(&self, input: &[u8], requested: &DocumentType) -> Result<DocumentType, FormatError> {
        let root = self.check_well_formed(input)?;

        // The document's declared type: the root's version attribute,
        // falling back to the schema's own version.
        let declared = DocumentType {
            content_type: XML_CONTENT_TYPE.to_string(),
            version: root
                .attr("version")
                .map(str::to_string)
                .or_else(|| self.doc_type.version.clone()),
        };
        if !declared.is(&self.doc_type) {
            return Err(FormatError::WrongType {
                found: declared,
                expected: self.doc_type.clone(),
            });
        }
        if !declared.is(requested) {
            return Err(FormatError::WrongType {
                found: declared,
                expected: requested.clone(),
            });
        }
        Ok(declared)
    }
}

/// One element-rewrite rule from a transform file.
#[derive(Debug, Clone)]
struct Rule {
    matches: String,
    rename: Option<String>,
    drop: bool,
}

/// A streaming, rule-based transform: elements are renamed or dropped
/// (with their subtree) according to the transform file; everything else
/// passes through. With no rules this is the identity formatter.
pub struct TransformFormatter {
    transform: Option<PathBuf>,
    output_type: DocumentType,
    rules: OnceLock<Vec<Rule>>,
}

impl TransformFormatter {
    /// Identity formatter for plain XML.
    pub fn identity() -> Self {
        TransformFormatter {
            transform: None,
            output_type: DocumentType::new(XML_CONTENT_TYPE),
            rules: OnceLock::new(),
        }
    }

    /// Formatter applying the rules in `transform`, producing `output_type`.
    pub fn from_file(transform: PathBuf, output_type: DocumentType) -> Self {
        TransformFormatter {
            transform: Some(transform),
            output_type,
            rules: OnceLock::new(),
        }
    }

    fn load_rules(path: &Path) -> Result<Vec<Rule>, FormatError> {
        let bytes = fs::read(path).map_err(|e| FormatError::Io(path.to_path_buf(), e))?;
        let root = Element::parse(&bytes)
            .map_err(|e| FormatError::Transform(format!("`{}`: {e}", path.display())))?;
        let mut rules = Vec::new();
        for rule in root.elements() {
            if rule.name != "Rule" {
                continue;
            }
            let Some(matches) = rule.attr("match") else {
                return Err(FormatError::Transform(format!(
                    "`{}`: Rule element without a match attribute",
                    path.display()
                )));
            };
            rules.push(Rule {
                matches: matches.to_string(),
                rename: rule.attr("rename").map(str::to_string),
                drop: rule.attr("drop") == Some("true"),
            });
        }
        Ok(rules)
    }

    fn rule_for(&self, name: &[u8]) -> Option<&Rule> {
        self.rules
            .get()?
            .iter()
            .find(|r| r.matches.as_bytes() == name)
    }
}

impl DocFormatter for TransformFormatter {
    fn output_type(&self) -> DocumentType {
        self.output_type.clone()
    }

    fn initialize(&self) -> Result<(), FormatError> {
        if let Some(path) = &self.transform {
            let rules = Self::load_rules(path)?;
            self.rules.set(rules).ok();
        }
        Ok(())
    }

    fn convert(&self, input: &[u8], output: &mut Vec<u8>) -> Result<(), FormatError> {
        let mut reader = Reader::from_reader(input);
        reader.config_mut().trim_text(false);
        let mut writer = Writer::new(Cursor::new(Vec::with_capacity(input.len())));
        // Namespace declarations are only stripped when a rule set was
        // loaded; with no rules this formatter is a byte-level identity.
        let transforming = self.rules.get().is_some();
        // Depth counter for a dropped subtree; 0 means not dropping.
        let mut dropping = 0usize;

        loop {
            let event = reader.read_event().map_err(|e| {
                FormatError::Transform(format!(
                    "XML error at byte {}: {e}",
                    reader.error_position()
                ))
            })?;
            match event {
                Event::Start(start) => {
                    if dropping > 0 {
                        dropping += 1;
                        continue;
                    }
                    match self.rule_for(start.name().as_ref()) {
                        Some(rule) if rule.drop => dropping = 1,
                        Some(Rule {
                            rename: Some(to), ..
                        }) => {
                            write(&mut writer, Event::Start(rename_start(&start, to)))?;
                        }
                        _ if transforming => {
                            write(&mut writer, Event::Start(strip_xmlns(&start)))?;
                        }
                        _ => write(&mut writer, Event::Start(start))?,
                    }
                }
                Event::Empty(start) => {
                    if dropping > 0 {
                        continue;
                    }
                    match self.rule_for(start.name().as_ref()) {
                        Some(rule) if rule.drop => {}
                        Some(Rule {
                            rename: Some(to), ..
                        }) => {
                            write(&mut writer, Event::Empty(rename_start(&start, to)))?;
                        }
                        _ if transforming => {
                            write(&mut writer, Event::Empty(strip_xmlns(&start)))?;
                        }
                        _ => write(&mut writer, Event::Empty(start))?,
                    }
                }
                Event::End(end) => {
                    if dropping > 0 {
                        dropping -= 1;
                        continue;
                    }
                    match self.rule_for(end.name().as_ref()) {
                        Some(Rule {
                            rename: Some(to), ..
                        }) => write(&mut writer, Event::End(BytesEnd::new(to.as_str())))?,
                        _ => write(&mut writer, Event::End(end.to_owned()))?,
                    }
                }
                Event::Eof => break,
                other => {
                    if dropping == 0 {
                        write(&mut writer, other)?;
                    }
                }
            }
        }

        output.extend_from_slice(&writer.into_inner().into_inner());
        Ok(())
    }
}

fn write(writer: &mut Writer<Cursor<Vec<u8>>>, event: Event<'_>) -> Result<(), FormatError> {
    writer
        .write_event(event)
        .map_err(|e| FormatError::Transform(e.to_string()))
}

/// Rebuild a start tag under a new name, keeping non-namespace attributes.
fn rename_start(start: &BytesStart<'_>, name: &str) -> BytesStart<'static> {
    let mut renamed = BytesStart::new(name.to_string());
    for attr in start.attributes().flatten() {
        if !attr.key.as_ref().starts_with(b"xmlns") {
            renamed.push_attribute(attr);
        }
    }
    renamed
}

fn strip_xmlns(start: &BytesStart<'_>) -> BytesStart<'static> {
    let name = String::from_utf8_lossy(start.name().as_ref()).into_owned();
    rename_start(start, &name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write as _;

    #[test]
    fn any_validator_accepts_well_formed_xml() {
        let validator = XmlValidator::any();
        let resolved = validator
            .validate(b"<doc version=\"1.0\"><p/></doc>", &validator.doc_type())
            .unwrap();
        assert_eq!(resolved.version.as_deref(), Some("1.0"));
    }

    #[test]
    fn any_validator_rejects_malformed_xml() {
        let validator = XmlValidator::any();
        let err = validator.validate(b"<doc><p></doc>", &validator.doc_type());
        assert!(matches!(err, Err(FormatError::Schema { .. })));
    }

    #[test]
    fn schema_validator_checks_root_namespace() {
        let mut schema = tempfile::NamedTempFile::new().unwrap();
        schema
            .write_all(b"<schema targetNamespace=\"urn:doc\" version=\"1.0\"/>")
            .unwrap();
        let validator = XmlValidator::from_schema(schema.path()).unwrap();

        let requested = validator.doc_type();
        assert!(
            validator
                .validate(b"<doc xmlns=\"urn:doc\"/>", &requested)
                .is_ok()
        );
        assert!(matches!(
            validator.validate(b"<doc xmlns=\"urn:other\"/>", &requested),
            Err(FormatError::Schema { .. })
        ));
    }

    #[test]
    fn identity_transform_passes_content_through() {
        let formatter = TransformFormatter::identity();
        formatter.initialize().unwrap();
        for source in [
            &b"<doc><p>hi</p></doc>"[..],
            b"<doc xmlns=\"urn:doc\"><p>hi</p></doc>",
        ] {
            let mut output = Vec::new();
            formatter.convert(source, &mut output).unwrap();
            assert_eq!(output, source);
        }
    }

    #[test]
    fn transform_renames_and_drops_elements() {
        let mut transform = tempfile::NamedTempFile::new().unwrap();
        transform
            .write_all(
                b"<Transform>\
                    <Rule match=\"Heading\" rename=\"h1\"/>\
                    <Rule match=\"Meta\" drop=\"true\"/>\
                  </Transform>",
            )
            .unwrap();
        let formatter = TransformFormatter::from_file(
            transform.path().to_path_buf(),
            DocumentType::new("text/html"),
        );
        formatter.initialize().unwrap();

        let mut output = Vec::new();
        formatter
            .convert(
                b"<Doc xmlns=\"urn:doc\"><Meta><Hidden/></Meta><Heading id=\"t\">Title</Heading></Doc>",
                &mut output,
            )
            .unwrap();
        assert_eq!(output, b"<Doc><h1 id=\"t\">Title</h1></Doc>");
    }
}
