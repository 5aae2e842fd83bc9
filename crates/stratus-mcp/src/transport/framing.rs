//! Decoding of POSTed JSON-RPC bodies.

use serde_json::Value;

use crate::types::{JsonRpcMessage, McpError, McpResult, RequestId};

/// Parse a request body as a JSON-RPC message.
///
/// Bytes that are not JSON are a parse error; JSON that is not an
/// envelope is an invalid request.
pub fn parse_message(body: &[u8]) -> McpResult<JsonRpcMessage> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Err(McpError::ParseError("Empty message".to_string()));
    }

    let value: Value =
        serde_json::from_slice(body).map_err(|e| McpError::ParseError(e.to_string()))?;
    serde_json::from_value(value).map_err(|e| McpError::InvalidRequest(e.to_string()))
}

/// Best-effort recovery of the `id` of a body that failed to decode.
///
/// Returns `None` when the body is not JSON at all, in which case error
/// responses omit the id.
pub fn recover_id(body: &[u8]) -> Option<RequestId> {
    let value: Value = serde_json::from_slice(body).ok()?;
    let id = value.get("id")?.clone();
    serde_json::from_value(id).ok()
}
