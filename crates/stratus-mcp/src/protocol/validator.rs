//! JSON-RPC envelope validation.

use crate::types::{McpError, McpResult, JSONRPC_VERSION};

/// Validate the version tag and method name of a request or notification.
pub fn validate_envelope(jsonrpc: &str, method: &str) -> McpResult<()> {
    if jsonrpc != JSONRPC_VERSION {
        return Err(McpError::InvalidRequest(format!(
            "Expected jsonrpc version \"{JSONRPC_VERSION}\", got \"{jsonrpc}\""
        )));
    }

    if method.is_empty() {
        return Err(McpError::InvalidRequest(
            "Method name must not be empty".to_string(),
        ));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_wrong_version_and_empty_method() {
        assert!(validate_envelope("2.0", "ping").is_ok());
        assert_eq!(validate_envelope("1.0", "ping").unwrap_err().code(), -32600);
        assert_eq!(validate_envelope("2.0", "").unwrap_err().code(), -32600);
    }
}
