//! Outbound half: publishing records to an Atom Publishing Protocol endpoint.
//!
//! - [`connection`] - endpoint settings, credentials and the HTTP client
//! - [`dispatcher`] - per-operation request sequences and status validation
//!
//! # Example
//!
//! ```ignore
//! use feedlink::publish::PublishDispatcher;
//!
//! let dispatcher = PublishDispatcher::new(&sink_config)?;
//! dispatcher.publish(&record).await?;
//! ```

mod connection;
mod dispatcher;

use std::fmt;
use std::str::FromStr;
use thiserror::Error;

use crate::atom::AtomError;

pub use connection::ConnectionManager;
pub use dispatcher::PublishDispatcher;

/// The kind of change a publisher applies for every record it receives.
///
/// Fixed when the publisher is configured; not chosen per record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FeedOperation {
    /// POST a new entry built from the record.
    Create,
    /// GET the endpoint's entry, apply the record, PUT it back.
    Update,
    /// DELETE the entry whose URL is the record's `id`.
    Delete,
}

#[derive(Debug, Error)]
#[error("unknown operation '{0}' (expected 'create', 'update' or 'delete')")]
pub struct UnknownOperation(pub String);

impl FromStr for FeedOperation {
    type Err = UnknownOperation;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "create" => Ok(FeedOperation::Create),
            "update" => Ok(FeedOperation::Update),
            "delete" => Ok(FeedOperation::Delete),
            _ => Err(UnknownOperation(s.to_string())),
        }
    }
}

impl fmt::Display for FeedOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            FeedOperation::Create => "create",
            FeedOperation::Update => "update",
            FeedOperation::Delete => "delete",
        })
    }
}

/// Errors from a single publish call.
///
/// Each error ends only the call that raised it; the dispatcher stays
/// usable for the next record. Nothing is retried.
#[derive(Debug, Error)]
pub enum PublishError {
    /// The endpoint did not accept the connection or answer within the
    /// configured timeout.
    #[error("Connection to {endpoint} failed: the host did not respond within the timeout of {timeout_ms}ms")]
    ConnectionTimeout {
        endpoint: String,
        timeout_ms: u64,
        #[source]
        source: Option<reqwest::Error>,
    },

    /// A response arrived, but its status is not the configured one.
    #[error("Response status conflicts for {endpoint}: response status code is {status}-{status_text} (expected {expected})")]
    UnexpectedStatus {
        endpoint: String,
        status: u16,
        status_text: String,
        expected: u16,
    },

    /// The transport produced no response document to work with.
    #[error("Response is null from {endpoint}")]
    NullResponse { endpoint: String },

    /// The entry fetched for `update` could not be read or re-encoded.
    #[error("Unusable Atom entry from {endpoint}: {source}")]
    MalformedEntry {
        endpoint: String,
        #[source]
        source: AtomError,
    },

    /// A `delete` record lacks an `id`, or its `id` is not a URL.
    #[error("Record 'id' must be the URL of the entry to delete. But found '{found}'")]
    MissingId { found: String },

    /// The publisher was destroyed.
    #[error("Publisher for {endpoint} has been shut down")]
    Closed { endpoint: String },

    /// The HTTP client could not be constructed.
    #[error("Failed to build HTTP client: {0}")]
    Client(#[source] reqwest::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_operation_parse() {
        assert_eq!("create".parse::<FeedOperation>().unwrap(), FeedOperation::Create);
        assert_eq!("Update".parse::<FeedOperation>().unwrap(), FeedOperation::Update);
        assert_eq!("DELETE".parse::<FeedOperation>().unwrap(), FeedOperation::Delete);
        assert!("error value".parse::<FeedOperation>().is_err());
    }

    #[test]
    fn test_status_error_message() {
        let err = PublishError::UnexpectedStatus {
            endpoint: "http://localhost/news".into(),
            status: 500,
            status_text: "Internal Server Error".into(),
            expected: 201,
        };
        let msg = err.to_string();
        assert!(msg.contains("500-Internal Server Error"));
        assert!(msg.contains("http://localhost/news"));
    }
}
