//! Inbound half: fetching feeds and turning their entries into records.
//!
//! - [`entry`] - feed kinds and the normalized per-entry field set
//! - [`parser`] - Atom (via `feed-rs`) and RSS 2.0 document parsing
//! - [`fetcher`] - bounded single-document HTTP retrieval
//! - [`poller`] - the periodic fetch, parse and deliver schedule
//!
//! # Example
//!
//! ```ignore
//! use feedlink::feed::Poller;
//!
//! let mut poller = Poller::new(&source_config, reqwest::Client::new());
//! let (tx, mut rx) = tokio::sync::mpsc::channel(64);
//! let handle = poller.start(source_config.interval(), tx);
//!
//! while let Some(record) = rx.recv().await {
//!     println!("{:?}", record);
//! }
//! ```

mod entry;
mod fetcher;
mod parser;
mod poller;

pub use entry::{FeedKind, NormalizedEntry, UnknownFeedKind, ATOM_KEYS, RSS_KEYS};
pub use fetcher::{fetch_document, FetchError};
pub(crate) use parser::format_date;
pub use parser::{parse_feed, FeedEntries, ParseError};
pub use poller::{PollHandle, PollState, Poller, TickError};
