//! Bidirectional feed connector.
//!
//! The inbound half polls an Atom or RSS 2.0 feed and emits one flat
//! [`Record`](record::Record) per entry. The outbound half takes records
//! and publishes them to an Atom Publishing Protocol endpoint as entry
//! creations, updates or deletions.
//!
//! - [`feed`] - fetching, parsing and polling feeds
//! - [`publish`] - sending records to an AtomPub endpoint
//! - [`record`] - the record type and the entry mapping in both directions
//! - [`atom`] - the Atom entry document model used for publishing
//! - [`config`] - host options and their validation

pub mod atom;
pub mod config;
pub mod feed;
pub mod publish;
pub mod record;
pub mod util;
