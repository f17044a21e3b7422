use chrono::{DateTime, SecondsFormat, Utc};
use feed_rs::model::FeedType;
use feed_rs::parser;
use thiserror::Error;

use super::entry::{FeedKind, NormalizedEntry, RSS_KEYS};
use crate::atom::{AtomError, Element};

/// Errors raised while turning a fetched document into entries.
#[derive(Debug, Error)]
pub enum ParseError {
    /// `feed-rs` could not read the document as a feed.
    #[error("Invalid feed document: {0}")]
    Feed(#[from] feed_rs::parser::ParseFeedError),
    /// The document is a feed, but not of the declared kind.
    #[error("Expected an Atom feed, found {0}")]
    NotAtom(String),
    /// The document is not well-formed XML.
    #[error("Invalid XML document: {0}")]
    Xml(#[from] AtomError),
    /// The RSS root element has no child element to hold items.
    #[error("RSS document <{0}> has no channel element")]
    MissingChannel(String),
    /// An RSS item lacks one of `title`, `pubDate`, `guid`, `link`.
    #[error("RSS item {index} is missing required element <{element}>")]
    MissingElement { index: usize, element: &'static str },
}

/// The entries of one parsed document, in document order.
///
/// The document is validated completely before this is handed out, so
/// iterating never fails midway. It is consumed by iteration and cannot be
/// restarted.
#[derive(Debug)]
pub struct FeedEntries {
    inner: std::vec::IntoIter<NormalizedEntry>,
}

impl Iterator for FeedEntries {
    type Item = NormalizedEntry;

    fn next(&mut self) -> Option<Self::Item> {
        self.inner.next()
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}

impl ExactSizeIterator for FeedEntries {}

/// Parses a feed document of the declared kind.
///
/// # Errors
///
/// - Atom: any [`ParseError::Feed`] from `feed-rs`, or [`ParseError::NotAtom`]
///   when the document is RSS/JSON.
/// - RSS: [`ParseError::Xml`] for malformed XML, [`ParseError::MissingChannel`]
///   when the root has no child element, and [`ParseError::MissingElement`]
///   when any item lacks a required child. One bad item fails the whole
///   document; nothing is returned for the good ones.
pub fn parse_feed(bytes: &[u8], kind: FeedKind) -> Result<FeedEntries, ParseError> {
    let entries = match kind {
        FeedKind::Atom => parse_atom(bytes)?,
        FeedKind::Rss => parse_rss(bytes)?,
    };
    Ok(FeedEntries {
        inner: entries.into_iter(),
    })
}

fn parse_atom(bytes: &[u8]) -> Result<Vec<NormalizedEntry>, ParseError> {
    // feed-rs invents a random id for entries without <id>; keep them id-less
    let feed = parser::Builder::new()
        .id_generator(|_, _, _| String::new())
        .build()
        .parse(bytes)?;
    if !matches!(feed.feed_type, FeedType::Atom) {
        return Err(ParseError::NotAtom(format!("{:?}", feed.feed_type)));
    }

    let entries = feed
        .entries
        .into_iter()
        .map(|entry| {
            let mut normalized = NormalizedEntry::new(FeedKind::Atom);
            if !entry.id.is_empty() {
                normalized.set("id", entry.id);
            }
            if let Some(title) = entry.title {
                normalized.set("title", title.content);
            }
            if !entry.links.is_empty() {
                let hrefs: Vec<String> = entry.links.into_iter().map(|l| l.href).collect();
                normalized.set("link", hrefs.join(", "));
            }
            if let Some(updated) = entry.updated {
                normalized.set("updated", format_date(updated));
            }
            if let Some(author) = entry.authors.into_iter().next() {
                normalized.set("author", author.name);
            }
            if let Some(published) = entry.published {
                normalized.set("published", format_date(published));
            }
            if let Some(summary) = entry.summary {
                normalized.set("summary", summary.content);
            }
            normalized
        })
        .collect();

    Ok(entries)
}

fn parse_rss(bytes: &[u8]) -> Result<Vec<NormalizedEntry>, ParseError> {
    let root = Element::parse(bytes)?;
    let channel = root
        .first_child()
        .ok_or_else(|| ParseError::MissingChannel(root.name().to_string()))?;

    channel
        .children_named("item")
        .enumerate()
        .map(|(index, item)| {
            let mut normalized = NormalizedEntry::new(FeedKind::Rss);
            for &key in RSS_KEYS {
                let element = item
                    .child(key)
                    .ok_or(ParseError::MissingElement { index, element: key })?;
                normalized.set(key, element.text());
            }
            Ok(normalized)
        })
        .collect()
}

pub(crate) fn format_date(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Secs, true)
}
