//! MCP capability negotiation during initialization.

use crate::session::Session;
use crate::types::{InitializeParams, InitializeResult, MCP_VERSION};

/// Build the `initialize` result for a freshly created session.
pub fn negotiate(params: &InitializeParams, session: &Session) -> InitializeResult {
    if let Some(requested) = params.protocol_version.as_deref() {
        if requested != MCP_VERSION {
            tracing::warn!(
                "Client requested protocol version {requested}, server supports {MCP_VERSION}. Proceeding with server version."
            );
        }
    }

    match &params.client_info {
        Some(client) => tracing::info!(
            session_id = %session.id,
            "Initialized with client: {} v{}",
            client.name,
            client.version
        ),
        None => tracing::info!(session_id = %session.id, "Initialized with anonymous client"),
    }

    InitializeResult::new(session.capabilities.clone())
}
