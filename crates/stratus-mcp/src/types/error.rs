//! Error types and JSON-RPC error codes for the MCP server.

use serde_json::json;

use super::message::{JsonRpcError, RequestId};

/// Standard JSON-RPC 2.0 error codes.
pub mod error_codes {
    pub const PARSE_ERROR: i32 = -32700;
    pub const INVALID_REQUEST: i32 = -32600;
    pub const METHOD_NOT_FOUND: i32 = -32601;
    pub const INVALID_PARAMS: i32 = -32602;
    pub const INTERNAL_ERROR: i32 = -32603;
}

/// MCP-specific error codes.
pub mod mcp_error_codes {
    pub const REQUEST_CANCELLED: i32 = -32800;
    pub const SESSION_NOT_FOUND: i32 = -32851;

    /// Server: Unauthorized (missing or invalid API key).
    pub const UNAUTHORIZED: i32 = -32900;
    /// Server: Origin header rejected by the origin policy.
    pub const ORIGIN_REJECTED: i32 = -32903;
}

/// All errors that can occur in the MCP server.
#[derive(thiserror::Error, Debug)]
pub enum McpError {
    /// The body was not valid JSON. The detail goes into the error `data`.
    #[error("Parse error")]
    ParseError(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Method not found: {0}")]
    MethodNotFound(String),

    #[error("{0}")]
    InvalidParams(String),

    #[error("Internal error: {0}")]
    InternalError(String),

    #[error("Request cancelled")]
    RequestCancelled,

    #[error("Session not found: {0}")]
    SessionNotFound(String),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Config error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Unauthorized: missing or invalid API key.
    #[error("Unauthorized")]
    Unauthorized,

    #[error("Origin not allowed: {0}")]
    OriginRejected(String),
}

impl McpError {
    pub fn code(&self) -> i32 {
        use error_codes::*;
        use mcp_error_codes::*;
        match self {
            McpError::ParseError(_) => PARSE_ERROR,
            McpError::InvalidRequest(_) => INVALID_REQUEST,
            McpError::MethodNotFound(_) => METHOD_NOT_FOUND,
            McpError::InvalidParams(_) => INVALID_PARAMS,
            McpError::InternalError(_) => INTERNAL_ERROR,
            McpError::RequestCancelled => REQUEST_CANCELLED,
            McpError::SessionNotFound(_) => SESSION_NOT_FOUND,
            McpError::Transport(_) | McpError::Config(_) | McpError::Io(_) => INTERNAL_ERROR,
            McpError::Json(_) => PARSE_ERROR,
            McpError::Unauthorized => UNAUTHORIZED,
            McpError::OriginRejected(_) => ORIGIN_REJECTED,
        }
    }

    /// Structured detail attached to the wire error, if any.
    pub fn data(&self) -> Option<serde_json::Value> {
        match self {
            McpError::ParseError(detail) if !detail.is_empty() => Some(json!({ "detail": detail })),
            _ => None,
        }
    }

    pub fn to_json_rpc_error(&self, id: Option<RequestId>) -> JsonRpcError {
        let err = JsonRpcError::new(id, self.code(), self.to_string());
        match self.data() {
            Some(data) => err.with_data(data),
            None => err,
        }
    }
}

pub type McpResult<T> = Result<T, McpError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn method_not_found_names_the_method() {
        let err = McpError::MethodNotFound("foo/bar".into());
        let wire = serde_json::to_value(err.to_json_rpc_error(Some(RequestId::from(7)))).unwrap();
        assert_eq!(
            wire,
            json!({
                "jsonrpc": "2.0",
                "id": 7,
                "error": { "code": -32601, "message": "Method not found: foo/bar" }
            })
        );
    }

    #[test]
    fn parse_error_carries_detail_and_no_id() {
        let err = McpError::ParseError("EOF while parsing".into());
        let wire = serde_json::to_value(err.to_json_rpc_error(None)).unwrap();
        assert!(wire.get("id").is_none());
        assert_eq!(wire["error"]["code"], -32700);
        assert_eq!(wire["error"]["message"], "Parse error");
        assert_eq!(wire["error"]["data"]["detail"], "EOF while parsing");
    }
}
