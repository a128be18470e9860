//! Owned XML node tree.
//!
//! Template sources and the site config file are small documents that get
//! rewritten in place (expression resolution splices nodes into the tree),
//! so they are parsed into an owned tree instead of being streamed. The
//! transform formatter works on quick-xml events directly and does not use
//! this module.

use quick_xml::{
    Reader, Writer,
    events::{BytesEnd, BytesStart, BytesText, Event},
};
use std::io::Cursor;
use thiserror::Error;

/// XML reading/writing errors for owned trees.
#[derive(Debug, Error)]
pub enum XmlError {
    #[error("XML parse error at byte {0}")]
    Parse(u64, #[source] quick_xml::Error),

    #[error("document has no root element")]
    NoRoot,

    #[error("XML encoding error")]
    Encoding(#[from] quick_xml::encoding::EncodingError),

    #[error("XML write error")]
    Write(#[from] std::io::Error),
}

/// A node within an element: either a child element or a text run.
#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    Element(Element),
    Text(String),
}

/// An owned XML element with attributes and child nodes.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Element {
    pub name: String,
    pub attrs: Vec<(String, String)>,
    pub children: Vec<Node>,
}

impl Element {
    pub fn new(name: impl Into<String>) -> Self {
        Element {
            name: name.into(),
            attrs: Vec::new(),
            children: Vec::new(),
        }
    }

    /// Parse the root element of an XML document.
    ///
    /// Comments, processing instructions and the XML declaration are
    /// dropped; entity references are decoded into their text values.
    pub fn parse(content: &[u8]) -> Result<Element, XmlError> {
        let mut reader = Reader::from_reader(content);
        reader.config_mut().trim_text(false);

        loop {
            match read_event(&mut reader)? {
                Event::Start(start) => {
                    let mut root = element_from_start(&reader, &start)?;
                    read_children(&mut reader, &mut root)?;
                    return Ok(root);
                }
                Event::Empty(start) => return element_from_start(&reader, &start),
                Event::Eof => return Err(XmlError::NoRoot),
                _ => {}
            }
        }
    }

    /// Serialize this element (and its subtree) to UTF-8 XML bytes.
    pub fn to_bytes(&self) -> Result<Vec<u8>, XmlError> {
        let mut writer = Writer::new(Cursor::new(Vec::new()));
        write_element(&mut writer, self)?;
        Ok(writer.into_inner().into_inner())
    }

    /// Look up an attribute value by name.
    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attrs
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    /// Direct child elements, in document order.
    pub fn elements(&self) -> impl Iterator<Item = &Element> {
        self.children.iter().filter_map(|node| match node {
            Node::Element(elem) => Some(elem),
            Node::Text(_) => None,
        })
    }

    /// Concatenated direct text content (child elements excluded).
    pub fn text(&self) -> String {
        self.children
            .iter()
            .filter_map(|node| match node {
                Node::Text(text) => Some(text.as_str()),
                Node::Element(_) => None,
            })
            .collect()
    }

    /// Whether this element contains any child elements.
    pub fn has_elements(&self) -> bool {
        self.elements().next().is_some()
    }
}

fn read_event<'a>(reader: &mut Reader<&'a [u8]>) -> Result<Event<'a>, XmlError> {
    reader
        .read_event()
        .map_err(|e| XmlError::Parse(reader.error_position(), e))
}

fn element_from_start(
    reader: &Reader<&[u8]>,
    start: &BytesStart<'_>,
) -> Result<Element, XmlError> {
    let name = reader.decoder().decode(start.name().as_ref())?.into_owned();
    let mut attrs = Vec::new();
    for attr in start.attributes().flatten() {
        let key = reader.decoder().decode(attr.key.as_ref())?.into_owned();
        let value = attr
            .unescape_value()
            .map_or_else(|_| String::from_utf8_lossy(&attr.value).into_owned(), |v| {
                v.into_owned()
            });
        attrs.push((key, value));
    }
    Ok(Element {
        name,
        attrs,
        children: Vec::new(),
    })
}

fn read_children(reader: &mut Reader<&[u8]>, parent: &mut Element) -> Result<(), XmlError> {
    loop {
        match read_event(reader)? {
            Event::Start(start) => {
                let mut child = element_from_start(reader, &start)?;
                read_children(reader, &mut child)?;
                parent.children.push(Node::Element(child));
            }
            Event::Empty(start) => {
                let child = element_from_start(reader, &start)?;
                parent.children.push(Node::Element(child));
            }
            Event::Text(text) => {
                let text = reader.decoder().decode(&text)?.into_owned();
                push_text(parent, &text);
            }
            Event::CData(data) => {
                let text = String::from_utf8_lossy(&data).into_owned();
                push_text(parent, &text);
            }
            Event::GeneralRef(entity) => {
                let name = reader.decoder().decode(&entity)?.into_owned();
                push_text(parent, &decode_entity(&name));
            }
            Event::End(_) | Event::Eof => return Ok(()),
            Event::Comment(_) | Event::Decl(_) | Event::PI(_) | Event::DocType(_) => {}
        }
    }
}

/// Append text, merging with a trailing text node if present.
fn push_text(parent: &mut Element, text: &str) {
    if let Some(Node::Text(last)) = parent.children.last_mut() {
        last.push_str(text);
    } else {
        parent.children.push(Node::Text(text.to_string()));
    }
}

/// Decode the common named entities plus numeric character references.
fn decode_entity(name: &str) -> String {
    match name {
        "lt" => "<".to_string(),
        "gt" => ">".to_string(),
        "amp" => "&".to_string(),
        "quot" => "\"".to_string(),
        "apos" => "'".to_string(),
        _ => name
            .strip_prefix('#')
            .and_then(|num| {
                let code = num
                    .strip_prefix(['x', 'X'])
                    .map_or_else(|| num.parse().ok(), |hex| u32::from_str_radix(hex, 16).ok())?;
                char::from_u32(code).map(String::from)
            })
            .unwrap_or_else(|| format!("&{name};")),
    }
}

fn write_element(writer: &mut Writer<Cursor<Vec<u8>>>, elem: &Element) -> Result<(), XmlError> {
    let mut start = BytesStart::new(elem.name.as_str());
    for (key, value) in &elem.attrs {
        start.push_attribute((key.as_str(), value.as_str()));
    }

    if elem.children.is_empty() {
        writer.write_event(Event::Empty(start))?;
        return Ok(());
    }

    writer.write_event(Event::Start(start))?;
    for child in &elem.children {
        match child {
            Node::Element(elem) => write_element(writer, elem)?,
            Node::Text(text) => writer.write_event(Event::Text(BytesText::new(text)))?,
        }
    }
    writer.write_event(Event::End(BytesEnd::new(elem.name.as_str())))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_nested_elements() {
        let root = Element::parse(b"<a x=\"1\"><b>hi</b><c/></a>").unwrap();
        assert_eq!(root.name, "a");
        assert_eq!(root.attr("x"), Some("1"));
        let names: Vec<_> = root.elements().map(|e| e.name.as_str()).collect();
        assert_eq!(names, ["b", "c"]);
        assert_eq!(root.elements().next().unwrap().text(), "hi");
    }

    #[test]
    fn parse_decodes_entities() {
        let root = Element::parse(b"<p>a &amp; b &lt;c&gt;</p>").unwrap();
        assert_eq!(root.text(), "a & b <c>");
    }

    #[test]
    fn parse_missing_root_fails() {
        assert!(matches!(
            Element::parse(b"  \n  "),
            Err(XmlError::NoRoot)
        ));
    }

    #[test]
    fn roundtrip_preserves_structure() {
        let source = b"<a x=\"1\"><b>hi</b><c/></a>";
        let root = Element::parse(source).unwrap();
        let bytes = root.to_bytes().unwrap();
        assert_eq!(Element::parse(&bytes).unwrap(), root);
    }

    #[test]
    fn serialized_text_is_escaped() {
        let mut root = Element::new("p");
        root.children.push(Node::Text("a < b".to_string()));
        let bytes = root.to_bytes().unwrap();
        assert_eq!(bytes, b"<p>a &lt; b</p>");
    }
}
