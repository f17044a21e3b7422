//! Atom entry documents for the publishing side.
//!
//! The Atom Publishing Protocol exchanges single `<entry>` documents: the
//! publisher builds new ones for `create`, and for `update` fetches the
//! current one, edits it, and sends it back. [`Entry`] wraps an owned
//! [`Element`] tree so those edits keep every part of the fetched entry that
//! the connector does not know about.
//!
//! Reading and writing use `quick-xml`, which never expands custom entity
//! declarations (SEC-002).

mod element;
mod entry;

use thiserror::Error;

pub use element::{Element, Node};
pub use entry::Entry;

/// The Atom namespace URI.
pub const ATOM_NS: &str = "http://www.w3.org/2005/Atom";

/// Errors raised while reading or writing Atom/XML documents.
#[derive(Debug, Error)]
pub enum AtomError {
    /// The bytes are not well-formed XML.
    #[error("XML error: {0}")]
    Xml(String),
    /// The document contains no root element.
    #[error("Document has no root element")]
    EmptyDocument,
    /// SEC-003: nesting depth exceeds the safety limit.
    #[error("XML nesting depth exceeds maximum of {0} levels")]
    TooDeep(usize),
    /// The root element is not the one the caller expected.
    #[error("Unexpected root element <{0}>")]
    UnexpectedRoot(String),
}
