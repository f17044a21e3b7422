//! Integration tests for publishing records to an AtomPub endpoint.
//!
//! A wiremock server plays the collection; tests assert on both the
//! dispatcher's result and the requests the server received.

use std::time::Duration;

use feedlink::atom::Entry;
use feedlink::config::SinkOptions;
use feedlink::publish::{FeedOperation, PublishDispatcher, PublishError};
use feedlink::record::Record;
use pretty_assertions::assert_eq;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn options(server_uri: &str, operation: &str, status: &str) -> SinkOptions {
    SinkOptions {
        url: Some(format!("{server_uri}/news")),
        operation: Some(operation.into()),
        http_response_code: Some(status.into()),
        ..Default::default()
    }
}

fn dispatcher(options: SinkOptions) -> PublishDispatcher {
    PublishDispatcher::new(&options.validate().unwrap()).unwrap()
}

fn record(fields: &[(&str, &str)]) -> Record {
    fields.iter().copied().collect()
}

async fn received_entry(server: &MockServer, http_method: &str) -> Entry {
    let requests = server.received_requests().await.unwrap();
    let request = requests
        .iter()
        .find(|r| r.method.as_str() == http_method)
        .unwrap_or_else(|| panic!("no {http_method} request received"));
    Entry::parse(&request.body).unwrap()
}

// ============================================================================
// Create
// ============================================================================

#[tokio::test]
async fn test_create_sends_new_entry() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/news"))
        .and(header("content-type", "application/atom+xml;type=entry"))
        .respond_with(ResponseTemplate::new(201))
        .expect(1)
        .mount(&server)
        .await;

    let dispatcher = dispatcher(options(&server.uri(), "create", "201"));
    assert_eq!(dispatcher.operation(), FeedOperation::Create);

    let started = chrono::Utc::now();
    dispatcher
        .publish(&record(&[
            ("title", "Title1"),
            ("content", "Content1"),
            ("link", "http://example.com/1"),
            ("author", "David"),
        ]))
        .await
        .unwrap();

    let entry = received_entry(&server, "POST").await;
    assert_eq!(entry.title().as_deref(), Some("Title1"));
    assert_eq!(entry.content().as_deref(), Some("Content1"));
    assert_eq!(entry.links(), vec!["http://example.com/1".to_string()]);
    assert_eq!(entry.authors(), vec!["David".to_string()]);
    assert!(entry.published().unwrap() >= started);
    assert!(entry.updated().unwrap() >= started);
}

#[tokio::test]
async fn test_status_must_match_exactly() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;

    // 200 is a success status, but not the configured one
    let dispatcher = dispatcher(options(&server.uri(), "create", "201"));
    match dispatcher.publish(&record(&[("title", "T")])).await {
        Err(PublishError::UnexpectedStatus { status, status_text, expected, .. }) => {
            assert_eq!(status, 200);
            assert_eq!(status_text, "OK");
            assert_eq!(expected, 201);
        }
        e => panic!("Expected UnexpectedStatus, got {:?}", e),
    }
}

#[tokio::test]
async fn test_dispatcher_usable_after_failure() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(500))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(201))
        .mount(&server)
        .await;

    let dispatcher = dispatcher(options(&server.uri(), "create", "201"));
    assert!(dispatcher.publish(&record(&[("title", "first")])).await.is_err());
    dispatcher.publish(&record(&[("title", "second")])).await.unwrap();
}

// ============================================================================
// Update
// ============================================================================

const EXISTING_ENTRY: &str = r#"<?xml version="1.0" encoding="utf-8"?>
<entry xmlns="http://www.w3.org/2005/Atom" xmlns:ext="urn:example:ext">
  <id>urn:uuid:existing</id>
  <title>Old title</title>
  <category term="local-news"/>
  <ext:rating>5</ext:rating>
  <link href="http://example.com/old"/>
  <updated>2001-01-01T00:00:00Z</updated>
</entry>"#;

#[tokio::test]
async fn test_update_gets_then_puts_modified_entry() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/news"))
        .respond_with(ResponseTemplate::new(200).set_body_string(EXISTING_ENTRY))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("PUT"))
        .and(path("/news"))
        .and(header("content-type", "application/atom+xml;type=entry"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let dispatcher = dispatcher(options(&server.uri(), "update", "200"));
    let started = chrono::Utc::now();
    dispatcher
        .publish(&record(&[("title", "New title"), ("link", "http://example.com/new")]))
        .await
        .unwrap();

    let entry = received_entry(&server, "PUT").await;
    assert_eq!(entry.id().as_deref(), Some("urn:uuid:existing"));
    assert_eq!(entry.title().as_deref(), Some("New title"));
    assert_eq!(
        entry.links(),
        vec!["http://example.com/old".to_string(), "http://example.com/new".to_string()]
    );
    assert!(entry.updated().unwrap() >= started);

    // Children the mapping does not know about survive the round trip
    let root = entry.element();
    assert_eq!(root.child("category").and_then(|c| c.attribute("term")), Some("local-news"));
    assert_eq!(root.child("rating").map(|r| r.text()), Some("5".to_string()));
}

#[tokio::test]
async fn test_update_put_status_checked() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_string(EXISTING_ENTRY))
        .mount(&server)
        .await;
    Mock::given(method("PUT"))
        .respond_with(ResponseTemplate::new(409))
        .mount(&server)
        .await;

    let dispatcher = dispatcher(options(&server.uri(), "update", "200"));
    match dispatcher.publish(&record(&[("title", "T")])).await {
        Err(PublishError::UnexpectedStatus { status, status_text, .. }) => {
            assert_eq!(status, 409);
            assert_eq!(status_text, "Conflict");
        }
        e => panic!("Expected UnexpectedStatus, got {:?}", e),
    }
}

// ============================================================================
// Delete
// ============================================================================

#[tokio::test]
async fn test_delete_uses_record_id_as_target() {
    let server = MockServer::start().await;
    Mock::given(method("DELETE"))
        .and(path("/news/42"))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;

    let dispatcher = dispatcher(options(&server.uri(), "delete", "204"));
    let id = format!("{}/news/42", server.uri());
    dispatcher
        .publish(&record(&[("id", id.as_str()), ("title", "ignored")]))
        .await
        .unwrap();
}

// ============================================================================
// Connection handling
// ============================================================================

#[tokio::test]
async fn test_basic_auth_sent_when_configured() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(header("authorization", "Basic YWRtaW46c2VjcmV0"))
        .respond_with(ResponseTemplate::new(201))
        .expect(1)
        .mount(&server)
        .await;

    let mut opts = options(&server.uri(), "create", "201");
    opts.username = Some("admin".into());
    opts.password = Some("secret".into());
    let dispatcher = dispatcher(opts);
    dispatcher.publish(&record(&[("title", "T")])).await.unwrap();
}

#[tokio::test]
async fn test_no_auth_header_without_credentials() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(201))
        .mount(&server)
        .await;

    let dispatcher = dispatcher(options(&server.uri(), "create", "201"));
    dispatcher.publish(&record(&[("title", "T")])).await.unwrap();

    let requests = server.received_requests().await.unwrap();
    assert!(requests[0].headers.get("authorization").is_none());
}

#[tokio::test]
async fn test_slow_endpoint_times_out() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(201).set_delay(Duration::from_secs(3)))
        .mount(&server)
        .await;

    let mut opts = options(&server.uri(), "create", "201");
    opts.timeout = Some("200".into());
    let dispatcher = dispatcher(opts);

    match dispatcher.publish(&record(&[("title", "T")])).await {
        Err(PublishError::ConnectionTimeout { timeout_ms, .. }) => assert_eq!(timeout_ms, 200),
        e => panic!("Expected ConnectionTimeout, got {:?}", e),
    }
}

#[tokio::test]
async fn test_unreachable_endpoint_is_connection_error() {
    let uri = {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        format!("http://{}", listener.local_addr().unwrap())
    };

    let dispatcher = dispatcher(options(&uri, "create", "201"));
    match dispatcher.publish(&record(&[("title", "T")])).await {
        Err(PublishError::ConnectionTimeout { .. }) => {}
        e => panic!("Expected ConnectionTimeout, got {:?}", e),
    }
}
