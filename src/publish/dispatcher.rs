use chrono::Utc;
use reqwest::header::CONTENT_TYPE;
use reqwest::{Method, Response};

use super::connection::ConnectionManager;
use super::{FeedOperation, PublishError};
use crate::atom::Entry;
use crate::config::SinkConfig;
use crate::record::{apply_record, Record};
use crate::util::validate_url;

/// Media type of a single Atom entry document.
pub const ATOM_ENTRY_CONTENT_TYPE: &str = "application/atom+xml;type=entry";

/// Publishes records to one Atom Publishing Protocol endpoint.
///
/// | Operation | Requests                                          |
/// |-----------|---------------------------------------------------|
/// | create    | `POST` a new entry to the endpoint                |
/// | update    | `GET` the endpoint's entry, then `PUT` it back    |
/// | delete    | `DELETE` the URL held in the record's `id` field  |
///
/// The status of the final response must equal the configured one.
/// Calls on one dispatcher may run concurrently; each call owns its
/// requests and responses.
#[derive(Debug)]
pub struct PublishDispatcher {
    connection: ConnectionManager,
    operation: FeedOperation,
    expected_status: u16,
}

impl PublishDispatcher {
    pub fn new(config: &SinkConfig) -> Result<Self, PublishError> {
        let connection = ConnectionManager::new(config)?;
        tracing::info!(
            endpoint = %config.url(),
            operation = %config.operation(),
            expected_status = config.expected_status(),
            "Publisher ready"
        );
        Ok(Self {
            connection,
            operation: config.operation(),
            expected_status: config.expected_status(),
        })
    }

    pub fn operation(&self) -> FeedOperation {
        self.operation
    }

    pub fn expected_status(&self) -> u16 {
        self.expected_status
    }

    pub fn connection(&self) -> &ConnectionManager {
        &self.connection
    }

    /// Publishes one record with the configured operation.
    pub async fn publish(&self, record: &Record) -> Result<(), PublishError> {
        let (target, response) = match self.operation {
            FeedOperation::Create => self.create(record).await?,
            FeedOperation::Update => self.update(record).await?,
            FeedOperation::Delete => self.delete(record).await?,
        };

        let Some(response) = response else {
            return Err(PublishError::NullResponse { endpoint: target });
        };
        self.check_status(response, &target)
    }

    /// Releases the connection and forgets credentials. Idempotent.
    pub fn destroy(&mut self) {
        self.connection.destroy();
    }

    async fn create(&self, record: &Record) -> Result<(String, Option<Response>), PublishError> {
        let target = self.connection.endpoint().to_string();

        let mut entry = Entry::new();
        entry.set_published(Utc::now());
        let entry = apply_record(record, entry);
        let body = self.encode(&entry, &target)?;

        tracing::debug!(target_url = %target, "POST new entry");
        let request = self
            .connection
            .request(Method::POST, &target)?
            .header(CONTENT_TYPE, ATOM_ENTRY_CONTENT_TYPE)
            .body(body);
        let response = self.connection.send(request, &target).await?;
        Ok((target, Some(response)))
    }

    async fn update(&self, record: &Record) -> Result<(String, Option<Response>), PublishError> {
        let target = self.connection.endpoint().to_string();

        tracing::debug!(target_url = %target, "GET entry for update");
        let request = self.connection.request(Method::GET, &target)?;
        let response = self.connection.send(request, &target).await?;
        let status = response.status();
        if !status.is_success() {
            return Err(PublishError::UnexpectedStatus {
                endpoint: target,
                status: status.as_u16(),
                status_text: status.canonical_reason().unwrap_or_default().to_string(),
                expected: self.expected_status,
            });
        }

        let bytes = self.connection.read_body(response, &target).await?;
        if bytes.iter().all(u8::is_ascii_whitespace) {
            return Ok((target, None));
        }

        let existing = Entry::parse(&bytes).map_err(|source| PublishError::MalformedEntry {
            endpoint: target.clone(),
            source,
        })?;
        let entry = apply_record(record, existing);
        let body = self.encode(&entry, &target)?;

        tracing::debug!(target_url = %target, "PUT updated entry");
        let request = self
            .connection
            .request(Method::PUT, &target)?
            .header(CONTENT_TYPE, ATOM_ENTRY_CONTENT_TYPE)
            .body(body);
        let response = self.connection.send(request, &target).await?;
        Ok((target, Some(response)))
    }

    async fn delete(&self, record: &Record) -> Result<(String, Option<Response>), PublishError> {
        let id = record.get("id").unwrap_or_default();
        let target = validate_url(id)
            .map_err(|_| PublishError::MissingId {
                found: id.to_string(),
            })?
            .to_string();

        tracing::debug!(target_url = %target, "DELETE entry");
        let request = self.connection.request(Method::DELETE, &target)?;
        let response = self.connection.send(request, &target).await?;
        Ok((target, Some(response)))
    }

    fn encode(&self, entry: &Entry, target: &str) -> Result<String, PublishError> {
        entry.to_xml().map_err(|source| PublishError::MalformedEntry {
            endpoint: target.to_string(),
            source,
        })
    }

    /// Compares the final status with the configured one. The response is
    /// consumed either way, returning its connection to the pool.
    fn check_status(&self, response: Response, target: &str) -> Result<(), PublishError> {
        let status = response.status();
        drop(response);

        if status.as_u16() != self.expected_status {
            tracing::warn!(
                target_url = %target,
                status = status.as_u16(),
                expected = self.expected_status,
                "Publish rejected"
            );
            return Err(PublishError::UnexpectedStatus {
                endpoint: target.to_string(),
                status: status.as_u16(),
                status_text: status.canonical_reason().unwrap_or_default().to_string(),
                expected: self.expected_status,
            });
        }

        tracing::debug!(target_url = %target, status = status.as_u16(), operation = %self.operation, "Record published");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SinkOptions;
    use wiremock::matchers::{body_string_contains, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn dispatcher(server: &MockServer, operation: &str, status: &str) -> PublishDispatcher {
        let options = SinkOptions {
            url: Some(format!("{}/news", server.uri())),
            operation: Some(operation.into()),
            http_response_code: Some(status.into()),
            ..Default::default()
        };
        PublishDispatcher::new(&options.validate().unwrap()).unwrap()
    }

    fn record(fields: &[(&str, &str)]) -> Record {
        fields.iter().copied().collect()
    }

    #[tokio::test]
    async fn test_create_posts_entry() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/news"))
            .and(header("content-type", ATOM_ENTRY_CONTENT_TYPE))
            .and(body_string_contains("Content1"))
            .and(body_string_contains("<published>"))
            .respond_with(ResponseTemplate::new(201))
            .expect(1)
            .mount(&server)
            .await;

        let dispatcher = dispatcher(&server, "create", "201");
        dispatcher
            .publish(&record(&[("title", "Title1"), ("content", "Content1")]))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_create_wrong_status() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let dispatcher = dispatcher(&server, "create", "201");
        let result = dispatcher.publish(&record(&[("title", "T")])).await;
        match result {
            Err(PublishError::UnexpectedStatus { status, status_text, expected, .. }) => {
                assert_eq!(status, 500);
                assert_eq!(status_text, "Internal Server Error");
                assert_eq!(expected, 201);
            }
            e => panic!("Expected UnexpectedStatus, got {:?}", e),
        }
    }

    #[tokio::test]
    async fn test_delete_targets_record_id() {
        let server = MockServer::start().await;
        Mock::given(method("DELETE"))
            .and(path("/news/entry-7"))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&server)
            .await;

        let dispatcher = dispatcher(&server, "delete", "204");
        let id = format!("{}/news/entry-7", server.uri());
        dispatcher.publish(&record(&[("id", &id)])).await.unwrap();
    }

    #[tokio::test]
    async fn test_delete_without_id() {
        let server = MockServer::start().await;
        Mock::given(method("DELETE"))
            .respond_with(ResponseTemplate::new(204))
            .expect(0)
            .mount(&server)
            .await;

        let dispatcher = dispatcher(&server, "delete", "204");
        match dispatcher.publish(&record(&[("title", "T")])).await {
            Err(PublishError::MissingId { found }) => assert_eq!(found, ""),
            e => panic!("Expected MissingId, got {:?}", e),
        }
        match dispatcher.publish(&record(&[("id", "urn:uuid:1")])).await {
            Err(PublishError::MissingId { found }) => assert_eq!(found, "urn:uuid:1"),
            e => panic!("Expected MissingId, got {:?}", e),
        }
    }

    #[tokio::test]
    async fn test_update_empty_body_is_null_response() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;
        Mock::given(method("PUT"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let dispatcher = dispatcher(&server, "update", "200");
        let result = dispatcher.publish(&record(&[("title", "T")])).await;
        assert!(matches!(result, Err(PublishError::NullResponse { .. })));
    }

    #[tokio::test]
    async fn test_update_not_an_entry() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<feed/>"))
            .mount(&server)
            .await;

        let dispatcher = dispatcher(&server, "update", "200");
        let result = dispatcher.publish(&record(&[("title", "T")])).await;
        assert!(matches!(result, Err(PublishError::MalformedEntry { .. })));
    }

    #[tokio::test]
    async fn test_update_get_failure_skips_put() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;
        Mock::given(method("PUT"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let dispatcher = dispatcher(&server, "update", "200");
        match dispatcher.publish(&record(&[("title", "T")])).await {
            Err(PublishError::UnexpectedStatus { status, .. }) => assert_eq!(status, 404),
            e => panic!("Expected UnexpectedStatus, got {:?}", e),
        }
    }

    #[tokio::test]
    async fn test_publish_after_destroy() {
        let server = MockServer::start().await;
        let mut dispatcher = dispatcher(&server, "create", "201");
        dispatcher.destroy();
        dispatcher.destroy();
        let result = dispatcher.publish(&record(&[("title", "T")])).await;
        assert!(matches!(result, Err(PublishError::Closed { .. })));
    }
}
