use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Element names extracted from an Atom `<entry>`, in output order.
pub const ATOM_KEYS: &[&str] = &[
    "id",
    "title",
    "link",
    "updated",
    "author",
    "published",
    "summary",
];

/// Element names extracted from an RSS `<item>`, in output order.
/// All four are required on every item.
pub const RSS_KEYS: &[&str] = &["title", "pubDate", "guid", "link"];

/// Syndication format of a polled document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FeedKind {
    Atom,
    Rss,
}

#[derive(Debug, Error)]
#[error("unknown feed type '{0}' (expected 'atom' or 'rss')")]
pub struct UnknownFeedKind(pub String);

impl FromStr for FeedKind {
    type Err = UnknownFeedKind;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "atom" => Ok(FeedKind::Atom),
            "rss" => Ok(FeedKind::Rss),
            _ => Err(UnknownFeedKind(s.to_string())),
        }
    }
}

impl fmt::Display for FeedKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            FeedKind::Atom => "atom",
            FeedKind::Rss => "rss",
        })
    }
}

impl FeedKind {
    pub fn recognized_keys(self) -> &'static [&'static str] {
        match self {
            FeedKind::Atom => ATOM_KEYS,
            FeedKind::Rss => RSS_KEYS,
        }
    }

    pub fn recognizes(self, key: &str) -> bool {
        self.recognized_keys().contains(&key)
    }
}

/// One feed entry reduced to its recognized elements.
///
/// Keys are always drawn from [`FeedKind::recognized_keys`]; [`set`] refuses
/// anything else, so an entry can never carry a field its kind does not
/// define. Absent elements are simply not present.
///
/// [`set`]: NormalizedEntry::set
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizedEntry {
    kind: FeedKind,
    fields: Vec<(&'static str, String)>,
}

impl NormalizedEntry {
    pub fn new(kind: FeedKind) -> Self {
        Self {
            kind,
            fields: Vec::new(),
        }
    }

    pub fn kind(&self) -> FeedKind {
        self.kind
    }

    /// Sets `key` to `value`, replacing any previous value.
    ///
    /// Returns `false` (and stores nothing) when `key` is not recognized for
    /// this entry's kind.
    pub fn set(&mut self, key: &str, value: impl Into<String>) -> bool {
        let Some(&key) = self.kind.recognized_keys().iter().find(|k| **k == key) else {
            return false;
        };
        let value = value.into();
        match self.fields.iter_mut().find(|(k, _)| *k == key) {
            Some(slot) => slot.1 = value,
            None => self.fields.push((key, value)),
        }
        true
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(k, _)| *k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Fields in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&'static str, &str)> {
        self.fields.iter().map(|(k, v)| (*k, v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}
