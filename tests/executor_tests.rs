//! Outbound executor tests against wiremock servers.

use calltrace::{Error, Executor, Level, Method, RequestSpec, TraceContext, BROWSER_USER_AGENT};
use std::time::Duration;
use wiremock::matchers::{body_string, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

mod common;

use common::{recorded_instrumentation, TRACE_ID};

fn ctx() -> TraceContext {
    TraceContext::new(TRACE_ID, "orders")
}

#[tokio::test]
async fn test_get_success_carries_trace_header() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/ok"))
        .and(header("X-REQUEST-ID", TRACE_ID))
        .respond_with(ResponseTemplate::new(200).set_body_string("fine"))
        .expect(1)
        .mount(&mock_server)
        .await;

    let (instrumentation, sink) = recorded_instrumentation();
    let executor = Executor::new(instrumentation);

    let spec = RequestSpec::new(format!("{}/ok", mock_server.uri())).with_timeout(5);
    let envelope = executor.get(&ctx(), spec).await.unwrap();

    assert_eq!(envelope.status_code, 200);
    assert_eq!(envelope.text, "fine");
    assert!(envelope.error_code.is_success());
    assert!(envelope.response.is_some());
    // Only failures are logged by the executor.
    assert!(sink.entries().is_empty());
}

#[tokio::test]
async fn test_post_201_is_success_with_code_attached() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/orders"))
        .and(header("content-type", "application/json"))
        .and(body_string(r#"{"id":7}"#))
        .respond_with(ResponseTemplate::new(201).set_body_string(r#"{"created":true}"#))
        .expect(1)
        .mount(&mock_server)
        .await;

    let (instrumentation, _sink) = recorded_instrumentation();
    let executor = Executor::new(instrumentation);

    let spec = RequestSpec::new(format!("{}/orders", mock_server.uri()))
        .with_payload(r#"{"id":7}"#)
        .with_timeout(5);
    let envelope = executor.post(&ctx(), spec).await.unwrap();

    assert_eq!(envelope.status_code, 201);
    assert_eq!(envelope.error_code.code, 10000);
    assert_eq!(envelope.error_code.label, "success");
}

#[tokio::test]
async fn test_404_is_check_code() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/missing"))
        .respond_with(ResponseTemplate::new(404).set_body_string("Not found"))
        .mount(&mock_server)
        .await;

    let (instrumentation, _sink) = recorded_instrumentation();
    let executor = Executor::new(instrumentation);

    let spec = RequestSpec::new(format!("{}/missing", mock_server.uri())).with_timeout(5);
    let result = executor.get(&ctx(), spec).await;

    match result {
        Err(Error::Status { envelope }) => {
            assert_eq!(envelope.status_code, 404);
            assert_eq!(envelope.text, "Not found");
            assert_eq!(envelope.error_code.code, 10001);
            assert_eq!(envelope.error_code.label, "resource not found");
        }
        other => panic!("Expected Status error, got {:?}", other),
    }
}

#[tokio::test]
async fn test_429_is_limit_error() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .respond_with(
            ResponseTemplate::new(429)
                .insert_header("retry-after", "30")
                .insert_header("x-ratelimit-remaining", "0"),
        )
        .expect(1)
        .mount(&mock_server)
        .await;

    let (instrumentation, _sink) = recorded_instrumentation();
    let executor = Executor::new(instrumentation);

    let err = executor
        .get(&ctx(), RequestSpec::new(mock_server.uri()))
        .await
        .unwrap_err();

    assert_eq!(err.status(), Some(429));
    assert_eq!(err.to_string(), "limit exceeded");
    let envelope = err.envelope().unwrap();
    assert_eq!(envelope.error_code.code, 10002);
    assert_eq!(envelope.header("retry-after"), Some("30"));
    assert_eq!(envelope.header("x-ratelimit-remaining"), Some("0"));
}

#[tokio::test]
async fn test_other_statuses_are_status_errors() {
    for status in [202u16, 400, 500, 503] {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(status))
            .mount(&mock_server)
            .await;

        let (instrumentation, _sink) = recorded_instrumentation();
        let executor = Executor::new(instrumentation);
        let err = executor
            .get(&ctx(), RequestSpec::new(mock_server.uri()))
            .await
            .unwrap_err();

        assert_eq!(err.status(), Some(status));
        assert_eq!(err.error_code().unwrap().code, 10005, "status {status}");
        assert_eq!(err.to_string(), "non-standard status code");
    }
}

#[tokio::test]
async fn test_timeout_is_classified_and_logged() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(3)))
        .mount(&mock_server)
        .await;

    let (instrumentation, sink) = recorded_instrumentation();
    let executor = Executor::new(instrumentation);

    let err = executor
        .get(&ctx(), RequestSpec::new(mock_server.uri()).with_timeout(1))
        .await
        .unwrap_err();

    assert!(err.is_timeout());
    let envelope = err.envelope().unwrap();
    assert_eq!(envelope.status_code, 0);
    assert_eq!(envelope.error_code.code, 10003);
    assert_eq!(err.to_string(), "timeout");

    let entries = sink.entries();
    assert_eq!(entries.len(), 1);
    let record = &entries[0].record;
    assert!(!record.attr.monitor.is_final);
    assert_eq!(record.attr.monitor.code, 10003);
    assert_eq!(record.trace, TRACE_ID);
    assert_eq!(record.label, "orders");
    assert!(!record.traceback.is_empty());
    assert!(record.attr.monitor.process_duration >= 900);
}

#[tokio::test]
async fn test_executor_default_timeout_applies_when_zero() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(2)))
        .mount(&mock_server)
        .await;

    let (instrumentation, _sink) = recorded_instrumentation();
    let executor = Executor::builder(instrumentation)
        .default_timeout(Duration::from_millis(200))
        .build();

    let err = executor
        .get(&ctx(), RequestSpec::new(mock_server.uri()))
        .await
        .unwrap_err();
    assert_eq!(err.error_code().unwrap().code, 10003);
}

#[tokio::test]
async fn test_connection_failure_is_request_failed() {
    let (instrumentation, sink) = recorded_instrumentation();
    let executor = Executor::new(instrumentation);

    // Nothing listens on port 1.
    let err = executor
        .get(&ctx(), RequestSpec::new("http://127.0.0.1:1/").with_timeout(5))
        .await
        .unwrap_err();

    match &err {
        Error::Transport { envelope, .. } => {
            assert_eq!(envelope.error_code.code, 10009);
            assert_eq!(envelope.error_code.label, "request failed");
            assert_eq!(envelope.error_code.level, Level::Error);
        }
        other => panic!("Expected Transport error, got {:?}", other),
    }
    assert_eq!(err.to_string(), "request failed");

    let entries = sink.entries();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].level, Level::Error);
    assert_eq!(entries[0].record.text, "request failed");
}

#[tokio::test]
async fn test_invalid_link_never_dispatches() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&mock_server)
        .await;

    let (instrumentation, sink) = recorded_instrumentation();
    let executor = Executor::new(instrumentation);

    let err = executor
        .get(&ctx(), RequestSpec::new(""))
        .await
        .unwrap_err();
    match err {
        Error::Validation(message) => assert_eq!(message, "link is required"),
        other => panic!("Expected Validation error, got {:?}", other),
    }

    let err = executor
        .get(&ctx(), RequestSpec::new("no-scheme/path"))
        .await
        .unwrap_err();
    assert_eq!(err.to_string(), "link must be a well-formed URL");
    assert!(sink.entries().is_empty());
}

#[tokio::test]
async fn test_browser_headers() {
    let mock_server = MockServer::start().await;
    let host = mock_server.address().to_string();

    // The user agent contains commas, which header matchers split on.
    Mock::given(method("GET"))
        .and(header("referer", host.as_str()))
        .and(header("host", host.as_str()))
        .and(header("X-REQUEST-ID", TRACE_ID))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&mock_server)
        .await;

    let (instrumentation, _sink) = recorded_instrumentation();
    let executor = Executor::new(instrumentation);

    let spec = RequestSpec::new(mock_server.uri()).with_browser_headers(true);
    let envelope = executor.get(&ctx(), spec).await.unwrap();
    assert_eq!(envelope.status_code, 200);

    let requests = mock_server.received_requests().await.unwrap();
    assert_eq!(requests.len(), 1);
    assert_eq!(
        requests[0].headers.get("user-agent").unwrap(),
        BROWSER_USER_AGENT
    );
}

#[tokio::test]
async fn test_plain_requests_have_no_browser_headers() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&mock_server)
        .await;

    let (instrumentation, _sink) = recorded_instrumentation();
    let executor = Executor::new(instrumentation);
    executor
        .get(&ctx(), RequestSpec::new(mock_server.uri()))
        .await
        .unwrap();

    let requests = mock_server.received_requests().await.unwrap();
    assert!(requests[0].headers.get("referer").is_none());
    assert_ne!(
        requests[0]
            .headers
            .get("user-agent")
            .map(|value| value.as_bytes()),
        Some(BROWSER_USER_AGENT.as_bytes())
    );
}

#[tokio::test]
async fn test_empty_trace_id_never_dispatches() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&mock_server)
        .await;

    let (instrumentation, sink) = recorded_instrumentation();
    let executor = Executor::new(instrumentation);

    let err = executor
        .get(&TraceContext::new("", "orders"), RequestSpec::new(mock_server.uri()))
        .await
        .unwrap_err();
    match err {
        Error::Validation(message) => assert_eq!(message, "X-REQUEST-ID is required"),
        other => panic!("Expected Validation error, got {:?}", other),
    }
    assert!(sink.entries().is_empty());
}

#[tokio::test]
async fn test_request_through_proxy() {
    // wiremock accepts absolute-form request targets, so it can stand in
    // for a forward proxy.
    let proxy = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/orders"))
        .and(header("X-REQUEST-ID", TRACE_ID))
        .respond_with(ResponseTemplate::new(200).set_body_string("via proxy"))
        .expect(1)
        .mount(&proxy)
        .await;

    let (instrumentation, _sink) = recorded_instrumentation();
    let executor = Executor::new(instrumentation);

    let spec = RequestSpec::new("http://upstream.invalid/orders")
        .with_proxy(proxy.uri())
        .with_timeout(5);
    let envelope = executor.get(&ctx(), spec).await.unwrap();
    assert_eq!(envelope.text, "via proxy");

    let requests = proxy.received_requests().await.unwrap();
    assert_eq!(requests[0].url.host_str(), Some("upstream.invalid"));
}

#[tokio::test]
async fn test_short_proxy_is_ignored() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&mock_server)
        .await;

    let (instrumentation, _sink) = recorded_instrumentation();
    let executor = Executor::new(instrumentation);

    let spec = RequestSpec::new(mock_server.uri()).with_proxy("p:1");
    let envelope = executor.get(&ctx(), spec).await.unwrap();
    assert_eq!(envelope.status_code, 200);
}

#[tokio::test]
async fn test_skip_verify_still_sends_request() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/orders"))
        .and(header("X-REQUEST-ID", TRACE_ID))
        .respond_with(ResponseTemplate::new(201))
        .expect(1)
        .mount(&mock_server)
        .await;

    let (instrumentation, _sink) = recorded_instrumentation();
    let executor = Executor::new(instrumentation);

    let spec = RequestSpec::new(format!("{}/orders", mock_server.uri()))
        .skip_verify(true)
        .with_payload("{}");
    let envelope = executor.post(&ctx(), spec).await.unwrap();
    assert!(envelope.error_code.is_success());
}

#[tokio::test]
async fn test_default_headers() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(header("x-tenant", "acme"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&mock_server)
        .await;

    let (instrumentation, _sink) = recorded_instrumentation();
    let executor = Executor::builder(instrumentation)
        .default_header("x-tenant", "acme")
        .unwrap()
        .build();

    executor
        .get(&ctx(), RequestSpec::new(mock_server.uri()))
        .await
        .unwrap();
}

#[tokio::test]
async fn test_unknown_method_falls_back_to_get() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/fallback"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&mock_server)
        .await;

    let (instrumentation, _sink) = recorded_instrumentation();
    let executor = Executor::new(instrumentation);

    let raw = format!(r#"{{"link":"{}/fallback","method":"PATCH"}}"#, mock_server.uri());
    let spec: RequestSpec = serde_json::from_str(&raw).unwrap();
    assert_eq!(spec.method, Method::Get);

    executor.execute(&ctx(), spec).await.unwrap();
}

#[tokio::test]
async fn test_repeated_calls_are_independent() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_string("same"))
        .expect(2)
        .mount(&mock_server)
        .await;

    let (instrumentation, _sink) = recorded_instrumentation();
    let executor = Executor::new(instrumentation);
    let spec = RequestSpec::new(mock_server.uri()).with_timeout(5);

    let first = executor.get(&ctx(), spec.clone()).await.unwrap();
    let second = executor.get(&ctx(), spec).await.unwrap();

    assert_eq!(first.text, second.text);
    assert_eq!(first.error_code, second.error_code);
    assert_eq!(mock_server.received_requests().await.unwrap().len(), 2);
}

#[tokio::test]
async fn test_invalid_proxy_is_configuration_error() {
    let (instrumentation, _sink) = recorded_instrumentation();
    let executor = Executor::new(instrumentation);

    let spec = RequestSpec::new("https://example.com").with_proxy("::not a proxy::");
    let err = executor.get(&ctx(), spec).await.unwrap_err();
    assert!(matches!(err, Error::Configuration(_)), "got {:?}", err);
}
