//! Connector configuration: TOML loading and eager validation.
//!
//! A config file has a `[source]` table for the poller and a `[sink]` table
//! for the publisher; either may be omitted when only one half is used.
//! Option values may be written as TOML strings or numbers. They are
//! collected as raw strings first and validated afterwards, so a value such
//! as `request_interval = "A"` is reported as a validation error naming the
//! option rather than as a TOML type error.
//!
//! Validation runs entirely before any network activity: a connector is
//! never constructed from an invalid configuration.
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Deserializer};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;
use url::Url;

use crate::feed::FeedKind;
use crate::publish::FeedOperation;
use crate::util::validate_url;

/// Poll interval used when `request_interval` is not set, in minutes.
pub const DEFAULT_REQUEST_INTERVAL_MINUTES: u64 = 20;
/// Expected publish status used when `http_response_code` is not set.
pub const DEFAULT_EXPECTED_STATUS: u16 = 201;
/// Publish timeout used when `timeout` is not set, in milliseconds.
pub const DEFAULT_TIMEOUT_MS: u64 = 1000;

// ============================================================================
// Error Types
// ============================================================================

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid TOML in config file: {0}")]
    Parse(#[from] toml::de::Error),

    /// SEC-014: Config file exceeds maximum allowed size.
    #[error("Config file too large: {0}")]
    TooLarge(String),

    /// A whole table (`[source]` / `[sink]`) is absent.
    #[error("Missing [{0}] section in config")]
    MissingSection(&'static str),

    /// A required option is absent.
    #[error("Missing required option '{option}'")]
    Missing { option: &'static str },

    /// An option is present but its value is unusable.
    #[error("Invalid value for '{option}': {expected}. But found '{found}'")]
    Invalid {
        option: &'static str,
        found: String,
        expected: String,
    },
}

impl ConfigError {
    fn invalid(option: &'static str, found: impl Into<String>, expected: impl Into<String>) -> Self {
        ConfigError::Invalid {
            option,
            found: found.into(),
            expected: expected.into(),
        }
    }
}

// ============================================================================
// Raw Options
// ============================================================================

/// Accepts any TOML scalar and keeps its textual form.
#[derive(Deserialize)]
#[serde(untagged)]
enum RawValue {
    Str(String),
    Int(i64),
    Float(f64),
    Bool(bool),
}

fn raw_string<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<String>, D::Error> {
    Ok(Option::<RawValue>::deserialize(deserializer)?.map(|value| match value {
        RawValue::Str(s) => s,
        RawValue::Int(i) => i.to_string(),
        RawValue::Float(f) => f.to_string(),
        RawValue::Bool(b) => b.to_string(),
    }))
}

/// Unvalidated `[source]` options, as supplied by the host.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct SourceOptions {
    #[serde(deserialize_with = "raw_string")]
    pub url: Option<String>,
    /// `atom` or `rss`, case-insensitive.
    #[serde(deserialize_with = "raw_string")]
    pub feed_type: Option<String>,
    /// Minutes between polls.
    #[serde(deserialize_with = "raw_string")]
    pub request_interval: Option<String>,
}

/// Unvalidated `[sink]` options, as supplied by the host.
///
/// SEC-015: Custom Debug impl masks `password`.
#[derive(Clone, Default, Deserialize)]
#[serde(default)]
pub struct SinkOptions {
    #[serde(deserialize_with = "raw_string")]
    pub url: Option<String>,
    /// `create`, `update` or `delete`, case-insensitive.
    #[serde(deserialize_with = "raw_string")]
    pub operation: Option<String>,
    /// Status a publish response must carry to count as success.
    #[serde(deserialize_with = "raw_string")]
    pub http_response_code: Option<String>,
    /// Milliseconds.
    #[serde(deserialize_with = "raw_string")]
    pub timeout: Option<String>,
    #[serde(deserialize_with = "raw_string")]
    pub username: Option<String>,
    #[serde(deserialize_with = "raw_string")]
    pub password: Option<String>,
}

impl std::fmt::Debug for SinkOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SinkOptions")
            .field("url", &self.url)
            .field("operation", &self.operation)
            .field("http_response_code", &self.http_response_code)
            .field("timeout", &self.timeout)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "[REDACTED]"))
            .finish()
    }
}

/// Top-level config file layout.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ConnectorConfig {
    pub source: Option<SourceOptions>,
    pub sink: Option<SinkOptions>,
}

impl ConnectorConfig {
    /// SEC-014: Maximum config file size (1 MB).
    const MAX_FILE_SIZE: u64 = 1_048_576;

    /// Load configuration from a TOML file.
    ///
    /// - Missing file → `Err(ConfigError::Io)`: a connector needs at least a URL
    /// - Empty file → `Ok(ConnectorConfig::default())`, which has no sections
    /// - Invalid TOML → `Err(ConfigError::Parse)` with line number info
    /// - Unknown keys → accepted, logged as warning
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        // SEC-014: Check file size before reading to prevent memory exhaustion
        let meta = std::fs::metadata(path)?;
        if meta.len() > Self::MAX_FILE_SIZE {
            return Err(ConfigError::TooLarge(format!(
                "Config file is {} bytes (max {} bytes)",
                meta.len(),
                Self::MAX_FILE_SIZE
            )));
        }

        let content = std::fs::read_to_string(path)?;
        if content.trim().is_empty() {
            tracing::debug!(path = %path.display(), "Config file is empty");
            return Ok(Self::default());
        }

        let config = Self::from_toml(&content)?;
        tracing::info!(
            path = %path.display(),
            source = config.source.is_some(),
            sink = config.sink.is_some(),
            "Loaded configuration"
        );
        Ok(config)
    }

    /// Parses configuration from TOML text.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        // Parse as a raw table first to detect unknown keys
        if let Ok(raw) = content.parse::<toml::Table>() {
            warn_unknown_keys(&raw, None, &["source", "sink"]);
            if let Some(toml::Value::Table(source)) = raw.get("source") {
                warn_unknown_keys(source, Some("source"), &["url", "feed_type", "request_interval"]);
            }
            if let Some(toml::Value::Table(sink)) = raw.get("sink") {
                warn_unknown_keys(
                    sink,
                    Some("sink"),
                    &[
                        "url",
                        "operation",
                        "http_response_code",
                        "timeout",
                        "username",
                        "password",
                    ],
                );
            }
        }

        Ok(toml::from_str(content)?)
    }

    pub fn source_config(&self) -> Result<SourceConfig, ConfigError> {
        self.source
            .as_ref()
            .ok_or(ConfigError::MissingSection("source"))?
            .validate()
    }

    pub fn sink_config(&self) -> Result<SinkConfig, ConfigError> {
        self.sink
            .as_ref()
            .ok_or(ConfigError::MissingSection("sink"))?
            .validate()
    }
}

fn warn_unknown_keys(table: &toml::Table, section: Option<&str>, known: &[&str]) {
    for key in table.keys() {
        if !known.contains(&key.as_str()) {
            tracing::warn!(section = section.unwrap_or("(root)"), key = %key, "Unknown key in config file, ignoring");
        }
    }
}

// ============================================================================
// Validated Configuration
// ============================================================================

/// Validated poller configuration.
#[derive(Debug, Clone)]
pub struct SourceConfig {
    url: Url,
    feed_kind: FeedKind,
    interval: Duration,
}

impl SourceConfig {
    pub fn new(url: &str, feed_kind: FeedKind, interval: Duration) -> Result<Self, ConfigError> {
        let url = parse_url(url)?;
        if interval.is_zero() {
            return Err(ConfigError::invalid(
                "request_interval",
                format!("{interval:?}"),
                "must be positive",
            ));
        }
        Ok(Self {
            url,
            feed_kind,
            interval,
        })
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    pub fn feed_kind(&self) -> FeedKind {
        self.feed_kind
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }
}

impl SourceOptions {
    pub fn validate(&self) -> Result<SourceConfig, ConfigError> {
        let url = self
            .url
            .as_deref()
            .ok_or(ConfigError::Missing { option: "url" })?;
        let feed_type = self
            .feed_type
            .as_deref()
            .ok_or(ConfigError::Missing { option: "feed_type" })?;
        let feed_kind: FeedKind = feed_type.parse().map_err(|_| {
            ConfigError::invalid("feed_type", feed_type, "accepted values are 'atom' and 'rss'")
        })?;
        let minutes = parse_positive(
            "request_interval",
            self.request_interval.as_deref(),
            DEFAULT_REQUEST_INTERVAL_MINUTES,
        )?;

        SourceConfig::new(url, feed_kind, Duration::from_secs(minutes.saturating_mul(60)))
    }
}

/// Basic-auth credentials for the publishing endpoint.
///
/// SEC-015: Debug output never shows the password.
pub struct Credentials {
    username: String,
    password: SecretString,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: SecretString::from(password.into()),
        }
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    pub fn password(&self) -> &str {
        self.password.expose_secret()
    }
}

impl Clone for Credentials {
    fn clone(&self) -> Self {
        Self::new(self.username.clone(), self.password.expose_secret())
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"[REDACTED]")
            .finish()
    }
}

/// Validated publisher (endpoint) configuration.
#[derive(Debug, Clone)]
pub struct SinkConfig {
    url: Url,
    operation: FeedOperation,
    expected_status: u16,
    timeout: Duration,
    credentials: Option<Credentials>,
}

impl SinkConfig {
    pub fn url(&self) -> &Url {
        &self.url
    }

    pub fn operation(&self) -> FeedOperation {
        self.operation
    }

    pub fn expected_status(&self) -> u16 {
        self.expected_status
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn credentials(&self) -> Option<&Credentials> {
        self.credentials.as_ref()
    }
}

impl SinkOptions {
    pub fn validate(&self) -> Result<SinkConfig, ConfigError> {
        let url = self
            .url
            .as_deref()
            .ok_or(ConfigError::Missing { option: "url" })?;
        let url = parse_url(url)?;

        let operation = match self.operation.as_deref() {
            None => FeedOperation::Create,
            Some(raw) => raw.parse().map_err(|_| {
                ConfigError::invalid(
                    "operation",
                    raw,
                    "accepted values are 'create', 'update' and 'delete'",
                )
            })?,
        };

        let expected_status = match self.http_response_code.as_deref() {
            None => DEFAULT_EXPECTED_STATUS,
            Some(raw) => raw
                .trim()
                .parse::<u16>()
                .ok()
                .filter(|code| (100..=999).contains(code))
                .ok_or_else(|| {
                    ConfigError::invalid("http_response_code", raw, "must be an HTTP status code")
                })?,
        };

        let timeout_ms = parse_positive("timeout", self.timeout.as_deref(), DEFAULT_TIMEOUT_MS)?;

        let username = self.username.as_deref().filter(|s| !s.is_empty());
        let password = self.password.as_deref().filter(|s| !s.is_empty());
        let credentials = match (username, password) {
            (Some(user), Some(pass)) => Some(Credentials::new(user, pass)),
            (None, None) => None,
            (Some(_), None) => {
                return Err(ConfigError::invalid(
                    "password",
                    "",
                    "must be set when 'username' is set",
                ))
            }
            (None, Some(_)) => {
                return Err(ConfigError::invalid(
                    "username",
                    "",
                    "must be set when 'password' is set",
                ))
            }
        };

        Ok(SinkConfig {
            url,
            operation,
            expected_status,
            timeout: Duration::from_millis(timeout_ms),
            credentials,
        })
    }
}

fn parse_url(raw: &str) -> Result<Url, ConfigError> {
    validate_url(raw).map_err(|e| ConfigError::invalid("url", raw, e.to_string()))
}

fn parse_positive(option: &'static str, raw: Option<&str>, default: u64) -> Result<u64, ConfigError> {
    let Some(raw) = raw else {
        return Ok(default);
    };
    match raw.trim().parse::<i64>() {
        Ok(value) if value > 0 => Ok(value as u64),
        _ => Err(ConfigError::invalid(
            option,
            raw,
            "accepts only positive integers",
        )),
    }
}

// ============================================================================
// Tests
// ============================================================================
