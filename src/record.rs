//! Flat records and the mapping between them and feed entries.
//!
//! A [`Record`] is what crosses the pipeline boundary in both directions:
//! the poller emits one per feed entry, and the publisher consumes one per
//! outbound event. The functions here are pure and never fail.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::atom::Entry;
use crate::feed::{format_date, FeedKind, NormalizedEntry};

/// Record fields that [`apply_record`] writes onto an entry.
pub const WRITABLE_KEYS: &[&str] = &["id", "title", "content", "link", "author", "summary"];

/// A flat `field name -> string value` mapping.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Record(BTreeMap<String, String>);

impl Record {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) -> Option<String> {
        self.0.insert(key.into(), value.into())
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Record {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(
            iter.into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }
}

/// Copies every field present on `entry` into a new record.
pub fn to_record(entry: &NormalizedEntry) -> Record {
    entry.iter().collect()
}

/// Writes the [`WRITABLE_KEYS`] fields of `record` onto `entry`.
///
/// `id`, `title`, `content` and `summary` overwrite; `link` and `author`
/// are appended next to any existing ones. Other fields are ignored.
/// `updated` is always set to the current time, last.
pub fn apply_record(record: &Record, mut entry: Entry) -> Entry {
    for (key, value) in record.iter() {
        match key {
            "id" => entry.set_id(value),
            "title" => entry.set_title(value),
            "content" => entry.set_content(value),
            "link" => entry.add_link(value),
            "author" => entry.add_author(value),
            "summary" => entry.set_summary(value),
            _ => {}
        }
    }
    entry.set_updated(Utc::now());
    entry
}

/// Reads an Atom entry into its normalized form, the same shape the poller
/// produces for entries of an Atom feed.
pub fn normalize_entry(entry: &Entry) -> NormalizedEntry {
    let mut normalized = NormalizedEntry::new(FeedKind::Atom);
    if let Some(id) = entry.id() {
        normalized.set("id", id);
    }
    if let Some(title) = entry.title() {
        normalized.set("title", title);
    }
    let links = entry.links();
    if !links.is_empty() {
        normalized.set("link", links.join(", "));
    }
    if let Some(updated) = entry
        .updated()
        .map(format_date)
        .or_else(|| entry.date_text("updated"))
    {
        normalized.set("updated", updated);
    }
    if let Some(author) = entry.authors().into_iter().next() {
        normalized.set("author", author);
    }
    if let Some(published) = entry
        .published()
        .map(format_date)
        .or_else(|| entry.date_text("published"))
    {
        normalized.set("published", published);
    }
    if let Some(summary) = entry.summary() {
        normalized.set("summary", summary);
    }
    normalized
}
