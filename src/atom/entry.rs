use chrono::{DateTime, SecondsFormat, Utc};

use super::element::Element;
use super::{AtomError, ATOM_NS};

/// A single Atom entry, backed by its XML element tree.
///
/// Accessors read the well-known Atom children; everything else in the
/// tree (categories, extension elements, attributes) is kept untouched, so
/// an entry fetched from a server and edited here is sent back with all of
/// its other content intact.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    root: Element,
}

impl Default for Entry {
    fn default() -> Self {
        Self::new()
    }
}

impl Entry {
    /// Creates an empty `<entry xmlns="http://www.w3.org/2005/Atom"/>`.
    pub fn new() -> Self {
        let mut root = Element::new("entry");
        root.set_attribute("xmlns", ATOM_NS);
        Self { root }
    }

    /// Parses an Atom entry document (root element `entry`).
    pub fn parse(bytes: &[u8]) -> Result<Self, AtomError> {
        let root = Element::parse(bytes)?;
        Self::from_element(root)
    }

    pub fn from_element(root: Element) -> Result<Self, AtomError> {
        if root.local_name() != "entry" {
            return Err(AtomError::UnexpectedRoot(root.name().to_string()));
        }
        Ok(Self { root })
    }

    pub fn to_xml(&self) -> Result<String, AtomError> {
        self.root.to_xml()
    }

    pub fn element(&self) -> &Element {
        &self.root
    }

    pub fn id(&self) -> Option<String> {
        self.text_of("id")
    }

    pub fn set_id(&mut self, id: &str) {
        self.set_text_child("id", id);
    }

    pub fn title(&self) -> Option<String> {
        self.text_of("title")
    }

    pub fn set_title(&mut self, title: &str) {
        self.set_text_child("title", title);
    }

    pub fn content(&self) -> Option<String> {
        self.text_of("content")
    }

    pub fn set_content(&mut self, content: &str) {
        let mut element = Element::with_text(self.child_name("content"), content);
        element.set_attribute("type", "text");
        self.root.replace_child(element);
    }

    pub fn summary(&self) -> Option<String> {
        self.text_of("summary")
    }

    pub fn set_summary(&mut self, summary: &str) {
        let mut element = Element::with_text(self.child_name("summary"), summary);
        element.set_attribute("type", "text");
        self.root.replace_child(element);
    }

    /// `href` of every `<link>`, in document order.
    pub fn links(&self) -> Vec<String> {
        self.root
            .children_named("link")
            .filter_map(|link| link.attribute("href"))
            .map(str::to_string)
            .collect()
    }

    /// Appends a `<link href="..."/>`; existing links are kept.
    pub fn add_link(&mut self, href: &str) {
        let mut link = Element::new(self.child_name("link"));
        link.set_attribute("href", href);
        self.root.push_child(link);
    }

    /// `<name>` of every `<author>`, in document order.
    pub fn authors(&self) -> Vec<String> {
        self.root
            .children_named("author")
            .filter_map(|author| author.child("name"))
            .map(Element::text)
            .collect()
    }

    /// Appends an `<author><name>...</name></author>`; existing authors are kept.
    pub fn add_author(&mut self, name: &str) {
        let mut author = Element::new(self.child_name("author"));
        author.push_child(Element::with_text(self.child_name("name"), name));
        self.root.push_child(author);
    }

    pub fn updated(&self) -> Option<DateTime<Utc>> {
        self.date_of("updated")
    }

    pub fn set_updated(&mut self, at: DateTime<Utc>) {
        self.set_text_child("updated", &format_date(at));
    }

    pub fn published(&self) -> Option<DateTime<Utc>> {
        self.date_of("published")
    }

    pub fn set_published(&mut self, at: DateTime<Utc>) {
        self.set_text_child("published", &format_date(at));
    }

    /// Raw text of a date element, for values that are present but do not
    /// parse as RFC 3339.
    pub fn date_text(&self, local_name: &str) -> Option<String> {
        self.text_of(local_name)
    }

    fn text_of(&self, local_name: &str) -> Option<String> {
        self.root.child(local_name).map(Element::text)
    }

    fn date_of(&self, local_name: &str) -> Option<DateTime<Utc>> {
        let text = self.text_of(local_name)?;
        DateTime::parse_from_rfc3339(text.trim())
            .ok()
            .map(|dt| dt.with_timezone(&Utc))
    }

    fn set_text_child(&mut self, local_name: &str, text: &str) {
        let element = Element::with_text(self.child_name(local_name), text);
        self.root.replace_child(element);
    }

    /// Qualified name for a new child, reusing the root's namespace prefix so
    /// that `<atom:entry>` documents get `<atom:title>` children.
    fn child_name(&self, local_name: &str) -> String {
        match self.root.name().split_once(':') {
            Some((prefix, _)) => format!("{prefix}:{local_name}"),
            None => local_name.to_string(),
        }
    }
}

fn format_date(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::AutoSi, true)
}
