//! Main request dispatcher: receives JSON-RPC messages, routes to handlers.

use std::sync::Arc;

use serde_json::Value;

use crate::session::SessionRegistry;
use crate::tools::ToolRegistry;
use crate::types::*;

use super::cancellation::CancellationRegistry;
use super::method::McpMethod;
use super::negotiation::negotiate;
use super::validator::validate_envelope;

/// What the transport should send back for one inbound message.
#[derive(Debug, Default)]
pub struct DispatchOutcome {
    /// Response envelope. `None` for notifications and cancelled requests.
    pub response: Option<Value>,
    /// Id of a session created by `initialize`; surfaced as a header.
    pub session_id: Option<String>,
}

impl DispatchOutcome {
    fn respond(response: Value) -> Self {
        Self {
            response: Some(response),
            session_id: None,
        }
    }
}

/// The main protocol handler that dispatches incoming JSON-RPC messages.
pub struct ProtocolHandler {
    sessions: Arc<SessionRegistry>,
    tools: ToolRegistry,
    cancellations: Arc<CancellationRegistry>,
}

impl ProtocolHandler {
    pub fn new(sessions: Arc<SessionRegistry>) -> Self {
        Self::with_tools(sessions, ToolRegistry::with_defaults())
    }

    pub fn with_tools(sessions: Arc<SessionRegistry>, tools: ToolRegistry) -> Self {
        Self {
            sessions,
            tools,
            cancellations: Arc::new(CancellationRegistry::new()),
        }
    }

    pub fn sessions(&self) -> &Arc<SessionRegistry> {
        &self.sessions
    }

    pub fn cancellations(&self) -> &Arc<CancellationRegistry> {
        &self.cancellations
    }

    /// Dispatch one decoded message. `session_id` is the caller's validated
    /// session, absent only for `initialize`.
    pub async fn handle_message(
        &self,
        msg: JsonRpcMessage,
        session_id: Option<&str>,
    ) -> DispatchOutcome {
        match msg {
            JsonRpcMessage::Request(req) => self.handle_request(req, session_id).await,
            JsonRpcMessage::Notification(notif) => {
                self.handle_notification(notif, session_id);
                DispatchOutcome::default()
            }
            _ => {
                tracing::warn!("Received unexpected message type from client");
                DispatchOutcome::default()
            }
        }
    }

    async fn handle_request(
        &self,
        request: JsonRpcRequest,
        session_id: Option<&str>,
    ) -> DispatchOutcome {
        let id = request.id;
        if let Err(e) = validate_envelope(&request.jsonrpc, &request.method) {
            return DispatchOutcome::respond(error_value(&e, id));
        }

        let method = match McpMethod::parse(&request.method, request.params) {
            Ok(method) => method,
            Err(e) => return DispatchOutcome::respond(error_value(&e, id)),
        };

        let mut created = None;
        let result = match method {
            McpMethod::Initialize(params) => {
                let session = self.sessions.create();
                let result = negotiate(&params, &session);
                created = Some(session.id);
                to_result(result)
            }
            McpMethod::Ping => Ok(Value::Object(serde_json::Map::new())),
            McpMethod::ToolsList => self.handle_tools_list(),
            McpMethod::ToolsCall(params) => self.handle_tools_call(&id, params, session_id).await,
            // One-way messages never get an answer, even when sent with an id.
            McpMethod::Initialized => {
                tracing::debug!("MCP handshake complete");
                return DispatchOutcome::default();
            }
            McpMethod::Cancelled(params) => {
                self.handle_cancelled(params, session_id);
                return DispatchOutcome::default();
            }
            McpMethod::Unknown(name) => Err(McpError::MethodNotFound(name)),
        };

        match result {
            Ok(value) => DispatchOutcome {
                response: Some(
                    serde_json::to_value(JsonRpcResponse::new(id, value)).unwrap_or_default(),
                ),
                session_id: created,
            },
            Err(McpError::RequestCancelled) => {
                tracing::info!(request_id = %id, "Request cancelled, response suppressed");
                DispatchOutcome::default()
            }
            Err(e) => DispatchOutcome::respond(error_value(&e, id)),
        }
    }

    fn handle_notification(&self, notification: JsonRpcNotification, session_id: Option<&str>) {
        if let Err(e) = validate_envelope(&notification.jsonrpc, &notification.method) {
            tracing::debug!("Dropping invalid notification: {e}");
            return;
        }
        match McpMethod::parse(&notification.method, notification.params) {
            Ok(McpMethod::Initialized) => tracing::debug!("MCP handshake complete"),
            Ok(McpMethod::Cancelled(params)) => self.handle_cancelled(params, session_id),
            Ok(other) => tracing::debug!("Unknown notification: {}", other.name()),
            Err(e) => tracing::debug!("Ignoring notification {}: {e}", notification.method),
        }
    }

    /// Fire the handle for the referenced request in the caller's session.
    /// Unknown or finished ids, and ids in flight on other sessions, are
    /// not an error.
    fn handle_cancelled(&self, params: CancelledParams, session_id: Option<&str>) {
        if self
            .cancellations
            .cancel(session_id.unwrap_or_default(), &params.request_id)
        {
            tracing::info!(
                request_id = %params.request_id,
                reason = params.reason.as_deref().unwrap_or("unspecified"),
                "Cancelled in-flight request"
            );
        } else {
            tracing::debug!(
                request_id = %params.request_id,
                "Cancellation for unknown or finished request ignored"
            );
        }
    }

    fn handle_tools_list(&self) -> McpResult<Value> {
        to_result(ToolListResult {
            tools: self.tools.list_tools(),
            next_cursor: None,
        })
    }

    /// Run a tool under a cancellation handle keyed by session and request id.
    async fn handle_tools_call(
        &self,
        id: &RequestId,
        params: ToolCallParams,
        session_id: Option<&str>,
    ) -> McpResult<Value> {
        let tool = self.tools.get(&params.name)?;
        let progress = params.progress_token().cloned();
        let in_flight = (!id.is_null()).then(|| {
            self.cancellations
                .register(session_id.unwrap_or_default(), id.clone())
        });

        self.notify_progress(session_id, progress.as_ref(), 0.0);

        let arguments = params
            .arguments
            .unwrap_or(Value::Object(serde_json::Map::new()));
        let call = tool.call(arguments);
        let result = match &in_flight {
            Some(flight) => tokio::select! {
                biased;
                _ = flight.token().cancelled() => return Err(McpError::RequestCancelled),
                result = call => result,
            },
            None => call.await,
        };
        drop(in_flight);

        self.notify_progress(session_id, progress.as_ref(), 1.0);
        to_result(result)
    }

    fn notify_progress(&self, session_id: Option<&str>, token: Option<&ProgressToken>, progress: f64) {
        let (Some(session_id), Some(token)) = (session_id, token) else {
            return;
        };
        let params = ProgressParams {
            progress_token: token.clone(),
            progress,
            total: Some(1.0),
        };
        let notification = JsonRpcNotification::new(
            PROGRESS_NOTIFICATION,
            serde_json::to_value(params).ok(),
        );
        if let Ok(message) = serde_json::to_value(notification) {
            self.sessions.broadcast(session_id, &message);
        }
    }
}

fn to_result(value: impl serde::Serialize) -> McpResult<Value> {
    serde_json::to_value(value).map_err(|e| McpError::InternalError(e.to_string()))
}

fn error_value(e: &McpError, id: RequestId) -> Value {
    serde_json::to_value(e.to_json_rpc_error(Some(id))).unwrap_or_default()
}
