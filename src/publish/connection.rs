use reqwest::{Method, RequestBuilder, Response};
use std::time::Duration;
use url::Url;

use super::PublishError;
use crate::config::{Credentials, SinkConfig};

/// Owns the HTTP client and endpoint settings of one publisher.
///
/// Requests built here carry basic-auth credentials when they were
/// configured. [`destroy`](ConnectionManager::destroy) forgets the
/// credentials and drops the client; requests after that fail with
/// [`PublishError::Closed`].
#[derive(Debug)]
pub struct ConnectionManager {
    endpoint: Url,
    timeout: Duration,
    credentials: Option<Credentials>,
    client: Option<reqwest::Client>,
}

impl ConnectionManager {
    pub fn new(config: &SinkConfig) -> Result<Self, PublishError> {
        let client = reqwest::Client::builder()
            .connect_timeout(config.timeout())
            .timeout(config.timeout())
            .build()
            .map_err(PublishError::Client)?;

        if let Some(creds) = config.credentials() {
            tracing::debug!(endpoint = %config.url(), username = %creds.username(), "Basic authentication configured");
        }

        Ok(Self {
            endpoint: config.url().clone(),
            timeout: config.timeout(),
            credentials: config.credentials().cloned(),
            client: Some(client),
        })
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn has_credentials(&self) -> bool {
        self.credentials.is_some()
    }

    pub fn is_closed(&self) -> bool {
        self.client.is_none()
    }

    /// Starts a request to `target`, with credentials attached.
    pub fn request(&self, method: Method, target: &str) -> Result<RequestBuilder, PublishError> {
        let client = self.client.as_ref().ok_or_else(|| PublishError::Closed {
            endpoint: self.endpoint.to_string(),
        })?;

        let mut request = client.request(method, target);
        if let Some(creds) = &self.credentials {
            request = request.basic_auth(creds.username(), Some(creds.password()));
        }
        Ok(request)
    }

    /// Sends a request, mapping timeouts and connection failures to
    /// [`PublishError::ConnectionTimeout`].
    pub async fn send(&self, request: RequestBuilder, target: &str) -> Result<Response, PublishError> {
        match tokio::time::timeout(self.timeout, request.send()).await {
            Ok(Ok(response)) => Ok(response),
            Ok(Err(e)) => {
                tracing::debug!(target_url = %target, error = %e, "Publish request failed");
                Err(self.timeout_error(target, Some(e)))
            }
            Err(_) => Err(self.timeout_error(target, None)),
        }
    }

    /// Reads a response body under the same timeout as the request.
    pub async fn read_body(&self, response: Response, target: &str) -> Result<Vec<u8>, PublishError> {
        match tokio::time::timeout(self.timeout, response.bytes()).await {
            Ok(Ok(bytes)) => Ok(bytes.to_vec()),
            Ok(Err(e)) => Err(self.timeout_error(target, Some(e))),
            Err(_) => Err(self.timeout_error(target, None)),
        }
    }

    pub(crate) fn timeout_error(&self, target: &str, source: Option<reqwest::Error>) -> PublishError {
        PublishError::ConnectionTimeout {
            endpoint: target.to_string(),
            timeout_ms: self.timeout.as_millis() as u64,
            source,
        }
    }

    /// Clears credentials and releases the client. Idempotent.
    pub fn destroy(&mut self) {
        self.credentials = None;
        if self.client.take().is_some() {
            tracing::debug!(endpoint = %self.endpoint, "Publisher connection released");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SinkOptions;

    fn manager(username: Option<&str>, password: Option<&str>) -> ConnectionManager {
        let options = SinkOptions {
            url: Some("http://localhost:8080/news".into()),
            username: username.map(str::to_string),
            password: password.map(str::to_string),
            ..Default::default()
        };
        ConnectionManager::new(&options.validate().unwrap()).unwrap()
    }

    #[test]
    fn test_new_from_defaults() {
        let conn = manager(None, None);
        assert_eq!(conn.endpoint().as_str(), "http://localhost:8080/news");
        assert_eq!(conn.timeout(), Duration::from_millis(1000));
        assert!(!conn.has_credentials());
        assert!(!conn.is_closed());
    }

    #[test]
    fn test_destroy_idempotent() {
        let mut conn = manager(Some("admin"), Some("admin"));
        assert!(conn.has_credentials());
        conn.destroy();
        conn.destroy();
        assert!(!conn.has_credentials());
        assert!(conn.is_closed());
        assert!(matches!(
            conn.request(Method::GET, "http://localhost:8080/news"),
            Err(PublishError::Closed { .. })
        ));
    }

    #[test]
    fn test_debug_hides_password() {
        let conn = manager(Some("admin"), Some("s3cr3t-value"));
        let debug = format!("{:?}", conn);
        assert!(!debug.contains("s3cr3t-value"));
    }
}
