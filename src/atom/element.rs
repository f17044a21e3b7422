use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::{Reader, Writer};
use std::io::Cursor;

use super::AtomError;

/// SEC-003: Maximum element nesting depth accepted when building a tree.
/// Prevents unbounded recursion from maliciously nested documents.
const MAX_DEPTH: usize = 64;

/// A node inside an [`Element`]: either a child element or a run of text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Node {
    Element(Element),
    Text(String),
}

/// An owned, namespace-unaware XML element.
///
/// Names are kept exactly as written in the source (including any prefix),
/// so a document read and written back keeps its element names. Lookups by
/// [`Element::child`] and friends compare *local* names, which lets the same
/// code handle `<entry>` and `<atom:entry>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Element {
    name: String,
    attributes: Vec<(String, String)>,
    children: Vec<Node>,
}

impl Element {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            attributes: Vec::new(),
            children: Vec::new(),
        }
    }

    /// Builder-style helper for an element containing a single text node.
    pub fn with_text(name: impl Into<String>, text: impl Into<String>) -> Self {
        let mut element = Self::new(name);
        element.set_text(text);
        element
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Element name with any namespace prefix removed.
    pub fn local_name(&self) -> &str {
        local(&self.name)
    }

    pub fn attribute(&self, key: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Sets an attribute, replacing an existing value with the same key.
    pub fn set_attribute(&mut self, key: impl Into<String>, value: impl Into<String>) {
        let key = key.into();
        let value = value.into();
        match self.attributes.iter_mut().find(|(k, _)| *k == key) {
            Some(slot) => slot.1 = value,
            None => self.attributes.push((key, value)),
        }
    }

    pub fn children(&self) -> impl Iterator<Item = &Element> {
        self.children.iter().filter_map(|node| match node {
            Node::Element(e) => Some(e),
            Node::Text(_) => None,
        })
    }

    pub fn first_child(&self) -> Option<&Element> {
        self.children().next()
    }

    /// First child element with the given local name.
    pub fn child(&self, local_name: &str) -> Option<&Element> {
        self.children().find(|e| e.local_name() == local_name)
    }

    pub fn child_mut(&mut self, local_name: &str) -> Option<&mut Element> {
        self.children.iter_mut().find_map(|node| match node {
            Node::Element(e) if e.local_name() == local_name => Some(e),
            _ => None,
        })
    }

    /// All child elements with the given local name, in document order.
    pub fn children_named<'a>(&'a self, local_name: &'a str) -> impl Iterator<Item = &'a Element> {
        self.children().filter(move |e| e.local_name() == local_name)
    }

    /// Concatenated text content of this element's direct text nodes.
    pub fn text(&self) -> String {
        self.children
            .iter()
            .filter_map(|node| match node {
                Node::Text(t) => Some(t.as_str()),
                Node::Element(_) => None,
            })
            .collect()
    }

    /// Replaces all children with a single text node.
    pub fn set_text(&mut self, text: impl Into<String>) {
        self.children.clear();
        self.children.push(Node::Text(text.into()));
    }

    pub fn push_child(&mut self, child: Element) {
        self.children.push(Node::Element(child));
    }

    /// Replaces the first child with the same local name, or appends when
    /// there is none.
    pub fn replace_child(&mut self, child: Element) {
        let local_name = child.local_name().to_string();
        match self.child_mut(&local_name) {
            Some(existing) => *existing = child,
            None => self.push_child(child),
        }
    }

    /// Parses a complete XML document and returns its root element.
    ///
    /// Comments, processing instructions and the DOCTYPE are dropped.
    /// Whitespace-only text between elements is trimmed.
    pub fn parse(bytes: &[u8]) -> Result<Element, AtomError> {
        // SEC-002: quick-xml (0.37) never expands custom <!ENTITY> declarations,
        // so entity-based XXE payloads surface as unescape errors below.
        let mut reader = Reader::from_reader(bytes);
        reader.config_mut().trim_text(true);

        let mut stack: Vec<Element> = Vec::new();
        let mut root: Option<Element> = None;
        let mut buf = Vec::new();

        loop {
            let event = reader
                .read_event_into(&mut buf)
                .map_err(|e| AtomError::Xml(e.to_string()))?;
            match event {
                Event::Start(e) => {
                    if root.is_some() {
                        return Err(AtomError::Xml("content after root element".into()));
                    }
                    if stack.len() >= MAX_DEPTH {
                        return Err(AtomError::TooDeep(MAX_DEPTH));
                    }
                    stack.push(element_from_start(&e, &reader)?);
                }
                Event::Empty(e) => {
                    let element = element_from_start(&e, &reader)?;
                    match stack.last_mut() {
                        Some(parent) => parent.push_child(element),
                        None if root.is_none() => root = Some(element),
                        None => {
                            return Err(AtomError::Xml("content after root element".into()))
                        }
                    }
                }
                Event::End(_) => {
                    // quick-xml checks that end tags match their start tags
                    let element = stack
                        .pop()
                        .ok_or_else(|| AtomError::Xml("unexpected end tag".into()))?;
                    match stack.last_mut() {
                        Some(parent) => parent.push_child(element),
                        None => root = Some(element),
                    }
                }
                Event::Text(e) => {
                    let text = e.unescape().map_err(|e| AtomError::Xml(e.to_string()))?;
                    if let Some(current) = stack.last_mut() {
                        current.children.push(Node::Text(text.into_owned()));
                    }
                }
                Event::CData(e) => {
                    if let Some(current) = stack.last_mut() {
                        let text = String::from_utf8_lossy(&e).into_owned();
                        current.children.push(Node::Text(text));
                    }
                }
                Event::Eof => break,
                _ => {}
            }
            buf.clear();
        }

        if !stack.is_empty() {
            return Err(AtomError::Xml("unexpected end of document".into()));
        }
        root.ok_or(AtomError::EmptyDocument)
    }

    /// Serializes this element as a standalone UTF-8 XML document.
    pub fn to_xml(&self) -> Result<String, AtomError> {
        let mut writer = Writer::new(Cursor::new(Vec::new()));
        writer
            .write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))
            .map_err(|e| AtomError::Xml(e.to_string()))?;
        self.write_into(&mut writer)?;
        let bytes = writer.into_inner().into_inner();
        String::from_utf8(bytes).map_err(|e| AtomError::Xml(e.to_string()))
    }

    fn write_into(&self, writer: &mut Writer<Cursor<Vec<u8>>>) -> Result<(), AtomError> {
        let mut start = BytesStart::new(self.name.as_str());
        for (key, value) in &self.attributes {
            start.push_attribute((key.as_str(), value.as_str()));
        }

        if self.children.is_empty() {
            return writer
                .write_event(Event::Empty(start))
                .map_err(|e| AtomError::Xml(e.to_string()));
        }

        writer
            .write_event(Event::Start(start))
            .map_err(|e| AtomError::Xml(e.to_string()))?;
        for child in &self.children {
            match child {
                Node::Element(e) => e.write_into(writer)?,
                Node::Text(t) => writer
                    .write_event(Event::Text(BytesText::new(t)))
                    .map_err(|e| AtomError::Xml(e.to_string()))?,
            }
        }
        writer
            .write_event(Event::End(BytesEnd::new(self.name.as_str())))
            .map_err(|e| AtomError::Xml(e.to_string()))
    }
}

fn element_from_start(e: &BytesStart<'_>, reader: &Reader<&[u8]>) -> Result<Element, AtomError> {
    let name = String::from_utf8_lossy(e.name().as_ref()).into_owned();
    let mut element = Element::new(name);
    for attr in e.attributes() {
        let attr = attr.map_err(|e| AtomError::Xml(e.to_string()))?;
        let key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
        let value = attr
            .decode_and_unescape_value(reader.decoder())
            .map_err(|e| AtomError::Xml(e.to_string()))?;
        element.attributes.push((key, value.into_owned()));
    }
    Ok(element)
}

fn local(name: &str) -> &str {
    name.rsplit_once(':').map_or(name, |(_, local)| local)
}
