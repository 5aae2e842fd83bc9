//! End-to-end tests for the HTTP transport, driven through the axum router.

use std::collections::HashSet;
use std::sync::Arc;

use axum::body::{Body, Bytes};
use axum::http::{header, Method, Request, Response, StatusCode};
use axum::Router;
use futures::StreamExt;
use serde_json::{json, Value};
use tower::ServiceExt;

use stratus_mcp::config::ServerConfig;
use stratus_mcp::protocol::ProtocolHandler;
use stratus_mcp::session::SessionRegistry;
use stratus_mcp::transport::{HttpTransport, API_KEY_HEADER, SESSION_HEADER};

// ─────────────────────── helpers ───────────────────────

fn transport() -> HttpTransport {
    HttpTransport::new(ProtocolHandler::new(Arc::new(SessionRegistry::new())))
}

fn transport_with(config: ServerConfig) -> HttpTransport {
    let sessions = Arc::new(SessionRegistry::with_queue_capacity(config.queue_capacity));
    HttpTransport::with_config(&config, ProtocolHandler::new(sessions))
}

fn post(session: Option<&str>, body: impl Into<Body>) -> Request<Body> {
    let mut builder = Request::builder()
        .method(Method::POST)
        .uri("/mcp")
        .header(header::CONTENT_TYPE, "application/json");
    if let Some(id) = session {
        builder = builder.header(SESSION_HEADER, id);
    }
    builder.body(body.into()).unwrap()
}

fn post_json(session: Option<&str>, msg: Value) -> Request<Body> {
    post(session, msg.to_string())
}

fn bare(method: Method, uri: &str, session: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(id) = session {
        builder = builder.header(SESSION_HEADER, id);
    }
    builder.body(Body::empty()).unwrap()
}

async fn body_json(response: Response<Body>) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

/// Run `initialize` and return the minted session id.
async fn initialize(router: &Router) -> String {
    let response = router
        .clone()
        .oneshot(post_json(
            None,
            json!({
                "jsonrpc": "2.0",
                "id": 0,
                "method": "initialize",
                "params": {
                    "protocolVersion": "2025-03-26",
                    "capabilities": {},
                    "clientInfo": { "name": "test-client", "version": "1.0" }
                }
            }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    response
        .headers()
        .get(SESSION_HEADER)
        .expect("session header")
        .to_str()
        .unwrap()
        .to_string()
}

fn frame_text(chunk: Bytes) -> String {
    String::from_utf8(chunk.to_vec()).unwrap()
}

// ─────────────────────── initialize ───────────────────────

#[tokio::test]
async fn initialize_returns_capabilities_and_session_header() {
    let router = transport().router();
    let response = router
        .clone()
        .oneshot(post_json(
            None,
            json!({ "jsonrpc": "2.0", "id": 1, "method": "initialize", "params": {} }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert!(response.headers().contains_key(SESSION_HEADER));
    let body = body_json(response).await;
    assert_eq!(body["id"], 1);
    assert_eq!(body["result"]["protocolVersion"], "2025-03-26");
    assert_eq!(body["result"]["serverInfo"]["name"], "stratus-mcp");
    assert_eq!(body["result"]["capabilities"]["tools"]["listChanged"], true);
}

#[tokio::test]
async fn concurrent_initializes_get_distinct_sessions() {
    let router = transport().router();
    let mut handles = Vec::new();
    for _ in 0..32 {
        let router = router.clone();
        handles.push(tokio::spawn(async move { initialize(&router).await }));
    }

    let mut ids = HashSet::new();
    for handle in handles {
        ids.insert(handle.await.unwrap());
    }
    assert_eq!(ids.len(), 32);
}

// ─────────────────────── dispatch ───────────────────────

#[tokio::test]
async fn unknown_method_gets_exact_error_envelope() {
    let router = transport().router();
    let session = initialize(&router).await;

    let response = router
        .clone()
        .oneshot(post_json(
            Some(&session),
            json!({ "jsonrpc": "2.0", "id": 7, "method": "foo/bar" }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        body_json(response).await,
        json!({
            "jsonrpc": "2.0",
            "id": 7,
            "error": { "code": -32601, "message": "Method not found: foo/bar" }
        })
    );
}

#[tokio::test]
async fn fractional_id_is_answered_not_swallowed() {
    let router = transport().router();
    let session = initialize(&router).await;

    let response = router
        .clone()
        .oneshot(post(
            Some(&session),
            r#"{"jsonrpc":"2.0","id":1.5,"method":"foo/bar"}"#,
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["id"], json!(1.5));
    assert_eq!(body["error"]["code"], -32601);
}

#[tokio::test]
async fn weather_tool_reports_the_location() {
    let router = transport().router();
    let session = initialize(&router).await;

    let response = router
        .clone()
        .oneshot(post_json(
            Some(&session),
            json!({
                "jsonrpc": "2.0",
                "id": 2,
                "method": "tools/call",
                "params": { "name": "get_weather", "arguments": { "location": "Boston" } }
            }),
        ))
        .await
        .unwrap();

    let body = body_json(response).await;
    assert_eq!(body["id"], 2);
    assert_eq!(body["result"]["isError"], false);
    let text = body["result"]["content"][0]["text"].as_str().unwrap();
    assert!(text.contains("Boston"));
    assert!(text.contains("72°F"));
}

#[tokio::test]
async fn tools_list_advertises_get_weather() {
    let router = transport().router();
    let session = initialize(&router).await;

    let response = router
        .clone()
        .oneshot(post_json(
            Some(&session),
            json!({ "jsonrpc": "2.0", "id": 3, "method": "tools/list" }),
        ))
        .await
        .unwrap();

    let body = body_json(response).await;
    let tools = body["result"]["tools"].as_array().unwrap();
    assert_eq!(tools.len(), 1);
    assert_eq!(tools[0]["name"], "get_weather");
    assert_eq!(tools[0]["inputSchema"]["required"], json!(["location"]));
}

#[tokio::test]
async fn unknown_tool_is_invalid_params() {
    let router = transport().router();
    let session = initialize(&router).await;

    let response = router
        .clone()
        .oneshot(post_json(
            Some(&session),
            json!({
                "jsonrpc": "2.0",
                "id": 4,
                "method": "tools/call",
                "params": { "name": "get_tides", "arguments": {} }
            }),
        ))
        .await
        .unwrap();

    let body = body_json(response).await;
    assert_eq!(body["error"]["code"], -32602);
    assert!(body["error"]["message"].as_str().unwrap().contains("get_tides"));
}

#[tokio::test]
async fn malformed_weather_arguments_are_a_tool_error() {
    let router = transport().router();
    let session = initialize(&router).await;

    let response = router
        .clone()
        .oneshot(post_json(
            Some(&session),
            json!({
                "jsonrpc": "2.0",
                "id": 5,
                "method": "tools/call",
                "params": { "name": "get_weather", "arguments": { "city": 3 } }
            }),
        ))
        .await
        .unwrap();

    let body = body_json(response).await;
    assert!(body.get("error").is_none());
    assert_eq!(body["result"]["isError"], true);
}

#[tokio::test]
async fn malformed_body_is_parse_error_without_id() {
    let router = transport().router();
    let response = router
        .clone()
        .oneshot(post(None, "{not json"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["error"]["code"], -32700);
    assert_eq!(body["error"]["message"], "Parse error");
    assert!(body.get("id").is_none());
}

#[tokio::test]
async fn cancel_for_unknown_request_is_accepted_silently() {
    let router = transport().router();
    let session = initialize(&router).await;

    let response = router
        .clone()
        .oneshot(post_json(
            Some(&session),
            json!({
                "jsonrpc": "2.0",
                "method": "notifications/cancelled",
                "params": { "requestId": 12345, "reason": "user abort" }
            }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::ACCEPTED);
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    assert!(bytes.is_empty());
}

// ─────────────────────── sessions ───────────────────────

#[tokio::test]
async fn requests_without_a_valid_session_are_not_found() {
    let router = transport().router();

    let missing = router
        .clone()
        .oneshot(post_json(
            None,
            json!({ "jsonrpc": "2.0", "id": 1, "method": "tools/list" }),
        ))
        .await
        .unwrap();
    assert_eq!(missing.status(), StatusCode::NOT_FOUND);

    let unknown = router
        .clone()
        .oneshot(post_json(
            Some("not-a-session"),
            json!({ "jsonrpc": "2.0", "id": 1, "method": "tools/list" }),
        ))
        .await
        .unwrap();
    assert_eq!(unknown.status(), StatusCode::NOT_FOUND);

    let stream = router
        .clone()
        .oneshot(bare(Method::GET, "/mcp", Some("not-a-session")))
        .await
        .unwrap();
    assert_eq!(stream.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn delete_is_idempotent_and_invalidates_the_session() {
    let transport = transport();
    let router = transport.router();
    let session = initialize(&router).await;

    for _ in 0..2 {
        let response = router
            .clone()
            .oneshot(bare(Method::DELETE, "/mcp", Some(&session)))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NO_CONTENT);
    }
    assert!(!transport.state().sessions().validate(&session));

    let response = router
        .clone()
        .oneshot(bare(Method::DELETE, "/mcp", None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NO_CONTENT);

    let after = router
        .clone()
        .oneshot(post_json(
            Some(&session),
            json!({ "jsonrpc": "2.0", "id": 1, "method": "ping" }),
        ))
        .await
        .unwrap();
    assert_eq!(after.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn unsupported_method_is_rejected() {
    let router = transport().router();
    let response = router
        .clone()
        .oneshot(bare(Method::PUT, "/mcp", None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
}

// ─────────────────────── streams ───────────────────────

#[tokio::test]
async fn unified_stream_starts_with_connected_event() {
    let router = transport().router();
    let session = initialize(&router).await;

    let response = router
        .clone()
        .oneshot(bare(Method::GET, "/mcp", Some(&session)))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers()[header::CONTENT_TYPE],
        "text/event-stream"
    );
    assert_eq!(response.headers()[header::CACHE_CONTROL], "no-cache");
    assert_eq!(response.headers()[header::CONNECTION], "keep-alive");

    let mut body = response.into_body().into_data_stream();
    let first = frame_text(body.next().await.unwrap().unwrap());
    assert_eq!(first, "event: connected\ndata: {\"status\":\"connected\"}\n\n");
}

#[tokio::test]
async fn progress_notifications_reach_the_session_stream() {
    let router = transport().router();
    let session = initialize(&router).await;

    let response = router
        .clone()
        .oneshot(bare(Method::GET, "/mcp", Some(&session)))
        .await
        .unwrap();
    let mut events = response.into_body().into_data_stream();
    events.next().await;

    let call = router
        .clone()
        .oneshot(post_json(
            Some(&session),
            json!({
                "jsonrpc": "2.0",
                "id": 9,
                "method": "tools/call",
                "params": {
                    "name": "get_weather",
                    "arguments": { "location": "Oslo" },
                    "_meta": { "progressToken": "tok-1" }
                }
            }),
        ))
        .await
        .unwrap();
    assert_eq!(call.status(), StatusCode::OK);

    let start = frame_text(events.next().await.unwrap().unwrap());
    assert!(start.starts_with("data: "));
    assert!(start.contains("notifications/progress"));
    assert!(start.contains("tok-1"));
    let done = frame_text(events.next().await.unwrap().unwrap());
    assert!(done.contains("\"progress\":1.0"));
}

#[tokio::test(start_paused = true)]
async fn idle_stream_gets_keepalive_after_thirty_seconds() {
    let router = transport().router();
    let session = initialize(&router).await;

    let response = router
        .clone()
        .oneshot(bare(Method::GET, "/mcp", Some(&session)))
        .await
        .unwrap();
    let mut events = response.into_body().into_data_stream();
    events.next().await;

    let started = tokio::time::Instant::now();
    let keepalive = frame_text(events.next().await.unwrap().unwrap());
    assert!(started.elapsed() >= std::time::Duration::from_secs(30));
    assert!(keepalive.starts_with(':'));
    assert!(keepalive.contains("keepalive"));
}

#[tokio::test]
async fn legacy_stream_announces_endpoint_and_cleans_up() {
    let transport = transport();
    let router = transport.router();

    let response = router
        .clone()
        .oneshot(bare(Method::GET, "/sse", None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(transport.state().sessions().len(), 1);

    let mut events = response.into_body().into_data_stream();
    let first = frame_text(events.next().await.unwrap().unwrap());
    assert_eq!(first, "event: endpoint\ndata: /mcp\n\n");

    drop(events);
    assert!(transport.state().sessions().is_empty());
}

// ─────────────────────── auth & origin ───────────────────────

#[tokio::test]
async fn api_key_is_enforced_when_configured() {
    let router = transport_with(ServerConfig {
        api_key: Some("s3cret".into()),
        ..Default::default()
    })
    .router();

    let denied = router
        .clone()
        .oneshot(post_json(
            None,
            json!({ "jsonrpc": "2.0", "id": 1, "method": "initialize" }),
        ))
        .await
        .unwrap();
    assert_eq!(denied.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(body_json(denied).await["error"]["code"], -32900);

    let mut request = post_json(
        None,
        json!({ "jsonrpc": "2.0", "id": 1, "method": "initialize" }),
    );
    request
        .headers_mut()
        .insert(API_KEY_HEADER, "s3cret".parse().unwrap());
    let allowed = router.clone().oneshot(request).await.unwrap();
    assert_eq!(allowed.status(), StatusCode::OK);

    let health = router
        .clone()
        .oneshot(bare(Method::GET, "/health", None))
        .await
        .unwrap();
    assert_eq!(health.status(), StatusCode::OK);
}

#[tokio::test]
async fn disallowed_origin_is_forbidden() {
    let router = transport_with(ServerConfig {
        allowed_origins: vec!["https://app.example".into()],
        ..Default::default()
    })
    .router();

    let mut request = bare(Method::DELETE, "/mcp", None);
    request
        .headers_mut()
        .insert(header::ORIGIN, "https://evil.example".parse().unwrap());
    let response = router.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    assert_eq!(body_json(response).await["error"]["code"], -32903);

    let mut request = bare(Method::DELETE, "/mcp", None);
    request
        .headers_mut()
        .insert(header::ORIGIN, "https://app.example".parse().unwrap());
    let response = router.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::NO_CONTENT);
}

#[tokio::test]
async fn health_reports_live_sessions() {
    let router = transport().router();
    initialize(&router).await;
    initialize(&router).await;

    let response = router
        .clone()
        .oneshot(bare(Method::GET, "/health", None))
        .await
        .unwrap();
    let body = body_json(response).await;
    assert_eq!(body["status"], "ok");
    assert_eq!(body["sessions"], 2);
}
