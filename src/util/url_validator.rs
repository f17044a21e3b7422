use thiserror::Error;
use url::Url;

/// Errors that can occur during endpoint URL validation.
#[derive(Error, Debug)]
pub enum UrlValidationError {
    /// The URL string could not be parsed.
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),
    /// The URL uses a scheme other than http or https.
    #[error("Unsupported scheme: {0} (only http/https allowed)")]
    UnsupportedScheme(String),
    /// The URL has no host component (e.g. `http:/feed`).
    #[error("URL has no host")]
    MissingHost,
}

/// Validates a URL string for use as a feed or publishing endpoint.
///
/// Validation is purely syntactic: the string must parse as an absolute
/// `http` or `https` URL with a host. No DNS lookup or connection attempt
/// is made, so this is safe to call during configuration before any network
/// activity. Loopback and private addresses are accepted, since connectors
/// commonly talk to services on the same host or network.
///
/// # Errors
///
/// Returns [`UrlValidationError`] if:
/// - The URL cannot be parsed ([`UrlValidationError::InvalidUrl`])
/// - The scheme is not `http` or `https` ([`UrlValidationError::UnsupportedScheme`])
/// - There is no host ([`UrlValidationError::MissingHost`])
///
/// # Examples
///
/// ```
/// use feedlink::util::validate_url;
///
/// let url = validate_url("https://example.com/feed.xml").unwrap();
/// assert_eq!(url.host_str(), Some("example.com"));
///
/// assert!(validate_url("localhost:8080/news").is_err());
/// assert!(validate_url("file:///etc/passwd").is_err());
/// ```
pub fn validate_url(url_str: &str) -> Result<Url, UrlValidationError> {
    let url = Url::parse(url_str.trim())?;

    match url.scheme() {
        "http" | "https" => {}
        scheme => return Err(UrlValidationError::UnsupportedScheme(scheme.to_owned())),
    }

    match url.host_str() {
        Some(host) if !host.is_empty() => Ok(url),
        _ => Err(UrlValidationError::MissingHost),
    }
}
