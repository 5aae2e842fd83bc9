//! HTTP transport: `/mcp` (POST/GET/DELETE), legacy `/sse`, and `/health`.

use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::Bytes,
    extract::State,
    http::{header, HeaderMap, HeaderName, HeaderValue, StatusCode},
    middleware,
    response::{sse::Sse, IntoResponse, Json as AxumJson, Response},
    routing::{get, post},
    Router,
};
use futures::{Stream, StreamExt};
use tower_http::cors::{Any, CorsLayer};

use crate::config::ServerConfig;
use crate::protocol::{method, ProtocolHandler};
use crate::session::SessionRegistry;
use crate::types::{McpError, McpResult};

use super::framing;
use super::origin::{AllowAnyOrigin, OriginPolicy};
use super::stream::{self, StreamEvent, DEFAULT_KEEPALIVE};

/// Header carrying the session id, both ways.
pub const SESSION_HEADER: &str = "mcp-session-id";
/// Header carrying the API key when one is configured.
pub const API_KEY_HEADER: &str = "x-api-key";
/// Path of the unified endpoint unless configured otherwise.
pub const DEFAULT_ENDPOINT_PATH: &str = "/mcp";
/// Path of the legacy event-stream endpoint.
pub const LEGACY_SSE_PATH: &str = "/sse";

/// Shared server state passed to all handlers via axum State.
pub struct ServerState {
    pub handler: ProtocolHandler,
    pub api_key: Option<String>,
    pub origin_policy: Box<dyn OriginPolicy>,
    pub keepalive: Duration,
    pub endpoint_path: String,
}

impl ServerState {
    pub fn sessions(&self) -> &Arc<SessionRegistry> {
        self.handler.sessions()
    }
}

/// Streamable HTTP transport for MCP clients.
pub struct HttpTransport {
    state: Arc<ServerState>,
}

impl HttpTransport {
    /// Transport with permissive defaults: no API key, any origin, 30 s keepalive.
    pub fn new(handler: ProtocolHandler) -> Self {
        Self {
            state: Arc::new(ServerState {
                handler,
                api_key: None,
                origin_policy: Box::new(AllowAnyOrigin),
                keepalive: DEFAULT_KEEPALIVE,
                endpoint_path: DEFAULT_ENDPOINT_PATH.to_string(),
            }),
        }
    }

    /// Transport built from a loaded configuration.
    pub fn with_config(config: &ServerConfig, handler: ProtocolHandler) -> Self {
        Self {
            state: Arc::new(ServerState {
                handler,
                api_key: config.api_key.clone(),
                origin_policy: config.origin_policy(),
                keepalive: config.keepalive(),
                endpoint_path: config.endpoint_path.clone(),
            }),
        }
    }

    pub fn state(&self) -> Arc<ServerState> {
        self.state.clone()
    }

    /// Build the axum router. `/health` bypasses the auth and origin layers.
    pub fn router(&self) -> Router {
        let state = self.state.clone();

        let cors = CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any)
            .expose_headers([HeaderName::from_static(SESSION_HEADER)]);

        Router::new()
            .route(
                &state.endpoint_path,
                post(handle_post).get(handle_stream).delete(handle_delete),
            )
            .route(LEGACY_SSE_PATH, get(handle_legacy_sse))
            .layer(middleware::from_fn_with_state(state.clone(), origin_layer))
            .layer(middleware::from_fn_with_state(state.clone(), auth_layer))
            .route("/health", get(handle_health))
            .layer(cors)
            .with_state(state)
    }

    /// Run the HTTP server on the given address until Ctrl-C.
    pub async fn run(&self, addr: &str) -> McpResult<()> {
        let listener = tokio::net::TcpListener::bind(addr)
            .await
            .map_err(McpError::Io)?;

        tracing::info!("HTTP transport listening on {addr}");

        let sessions = self.state.sessions().clone();
        axum::serve(listener, self.router())
            .with_graceful_shutdown(async move {
                match tokio::signal::ctrl_c().await {
                    Ok(()) => tracing::info!("Shutdown signal received"),
                    Err(e) => {
                        tracing::error!("Failed to listen for shutdown signal: {e}");
                        std::future::pending::<()>().await;
                    }
                }
                sessions.shutdown();
            })
            .await
            .map_err(|e| McpError::Transport(e.to_string()))?;

        Ok(())
    }
}

/// Transport-level rejection: an HTTP status plus a JSON-RPC error body
/// without an id.
fn reject(status: StatusCode, err: McpError) -> Response {
    (status, AxumJson(err.to_json_rpc_error(None))).into_response()
}

fn session_header(headers: &HeaderMap) -> Option<&str> {
    headers.get(SESSION_HEADER).and_then(|v| v.to_str().ok())
}

fn invalid_session(session_id: Option<&str>) -> Response {
    tracing::debug!(session_id = session_id.unwrap_or(""), "Invalid session");
    reject(
        StatusCode::NOT_FOUND,
        McpError::SessionNotFound(session_id.unwrap_or("").to_string()),
    )
}

/// Auth middleware: checks the API key if one is configured.
async fn auth_layer(
    State(state): State<Arc<ServerState>>,
    headers: HeaderMap,
    request: axum::extract::Request,
    next: middleware::Next,
) -> Response {
    if let Some(expected) = &state.api_key {
        let authorized = headers
            .get(API_KEY_HEADER)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|key| key == expected);

        if !authorized {
            tracing::warn!("Rejected request with missing or invalid API key");
            return reject(StatusCode::UNAUTHORIZED, McpError::Unauthorized);
        }
    }

    next.run(request).await
}

/// Origin middleware: runs before the method branch.
async fn origin_layer(
    State(state): State<Arc<ServerState>>,
    headers: HeaderMap,
    request: axum::extract::Request,
    next: middleware::Next,
) -> Response {
    let origin = headers.get(header::ORIGIN).and_then(|v| v.to_str().ok());
    if !state.origin_policy.allows(origin) {
        let origin = origin.unwrap_or("<none>").to_string();
        tracing::warn!(origin = %origin, "Rejected request origin");
        return reject(StatusCode::FORBIDDEN, McpError::OriginRejected(origin));
    }

    next.run(request).await
}

/// POST /mcp: one JSON-RPC message in, one envelope (or 202) out.
async fn handle_post(
    State(state): State<Arc<ServerState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let msg = match framing::parse_message(&body) {
        Ok(msg) => msg,
        Err(e) => {
            tracing::debug!("Undecodable request body: {e}");
            let id = match e {
                McpError::ParseError(_) => None,
                _ => framing::recover_id(&body),
            };
            return AxumJson(e.to_json_rpc_error(id)).into_response();
        }
    };

    // initialize ignores any session header and mints a new session.
    let session_id = if msg.method() == Some(method::INITIALIZE) {
        None
    } else {
        let session_id = session_header(&headers);
        if !state.sessions().validate(session_id.unwrap_or_default()) {
            return invalid_session(session_id);
        }
        session_id
    };

    let outcome = state.handler.handle_message(msg, session_id).await;

    match outcome.response {
        Some(body) => {
            let mut response = AxumJson(body).into_response();
            if let Some(id) = outcome.session_id {
                match HeaderValue::from_str(&id) {
                    Ok(value) => {
                        response.headers_mut().insert(SESSION_HEADER, value);
                    }
                    Err(e) => tracing::error!("Session id is not a valid header value: {e}"),
                }
            }
            response
        }
        None => StatusCode::ACCEPTED.into_response(),
    }
}

/// GET /mcp: attach an event stream to an existing session.
async fn handle_stream(State(state): State<Arc<ServerState>>, headers: HeaderMap) -> Response {
    let session_id = session_header(&headers);
    if !state.sessions().validate(session_id.unwrap_or_default()) {
        return invalid_session(session_id);
    }

    match stream::open_unified(
        state.sessions(),
        session_id.unwrap_or_default(),
        state.keepalive,
    ) {
        Some(events) => {
            tracing::info!(session_id = session_id.unwrap_or_default(), "Event stream opened");
            event_stream_response(events)
        }
        // Terminated between validation and attach.
        None => invalid_session(session_id),
    }
}

/// DELETE /mcp: terminate the session if it exists. Always 204.
async fn handle_delete(State(state): State<Arc<ServerState>>, headers: HeaderMap) -> StatusCode {
    if let Some(session_id) = session_header(&headers) {
        state.sessions().terminate(session_id);
    }
    StatusCode::NO_CONTENT
}

/// GET /sse: legacy transport with a private, connection-scoped session.
async fn handle_legacy_sse(State(state): State<Arc<ServerState>>) -> Response {
    match stream::open_legacy(state.sessions(), &state.endpoint_path, state.keepalive) {
        Some((session_id, events)) => {
            tracing::info!(session_id = %session_id, "Legacy event stream opened");
            event_stream_response(events)
        }
        None => reject(
            StatusCode::INTERNAL_SERVER_ERROR,
            McpError::Transport("Failed to open event stream".to_string()),
        ),
    }
}

fn event_stream_response(events: impl Stream<Item = StreamEvent> + Send + 'static) -> Response {
    let sse = Sse::new(events.map(|event| Ok::<_, Infallible>(event.into_sse())));
    ([(header::CONNECTION, "keep-alive")], sse).into_response()
}

/// Health check endpoint: no auth required.
async fn handle_health(State(state): State<Arc<ServerState>>) -> AxumJson<serde_json::Value> {
    AxumJson(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "sessions": state.sessions().len(),
    }))
}
