//! Utility functions shared by the inbound and outbound halves.
//!
//! - **URL validation**: syntactic validation of endpoint URLs, run eagerly at
//!   configuration time so that no connector starts with an unusable URL.
//!
//! # Examples
//!
//! ```
//! use feedlink::util::validate_url;
//!
//! let url = validate_url("https://example.com/feed.xml").unwrap();
//! assert_eq!(url.scheme(), "https");
//! ```

mod url_validator;

pub use url_validator::{validate_url, UrlValidationError};
