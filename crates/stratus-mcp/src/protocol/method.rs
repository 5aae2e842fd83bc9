//! Typed view of an inbound method name and its parameters.

use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::types::{CancelledParams, InitializeParams, McpError, McpResult, ToolCallParams};

pub const INITIALIZE: &str = "initialize";
pub const INITIALIZED: &str = "notifications/initialized";
pub const PING: &str = "ping";
pub const TOOLS_LIST: &str = "tools/list";
pub const TOOLS_CALL: &str = "tools/call";
pub const CANCELLED: &str = "notifications/cancelled";

/// Every method the server understands, plus a catch-all.
#[derive(Debug, Clone)]
pub enum McpMethod {
    Initialize(InitializeParams),
    Initialized,
    Ping,
    ToolsList,
    ToolsCall(ToolCallParams),
    Cancelled(CancelledParams),
    Unknown(String),
}

impl McpMethod {
    /// Resolve a method name and decode its parameters.
    ///
    /// Malformed `initialize` params are tolerated: the session is still
    /// created and the problem is logged.
    pub fn parse(method: &str, params: Option<Value>) -> McpResult<Self> {
        match method {
            INITIALIZE => {
                let params = match decode::<InitializeParams>(params) {
                    Ok(p) => p.unwrap_or_default(),
                    Err(e) => {
                        tracing::warn!("Ignoring malformed initialize params: {e}");
                        InitializeParams::default()
                    }
                };
                Ok(McpMethod::Initialize(params))
            }
            INITIALIZED => Ok(McpMethod::Initialized),
            PING => Ok(McpMethod::Ping),
            TOOLS_LIST => Ok(McpMethod::ToolsList),
            TOOLS_CALL => decode::<ToolCallParams>(params)
                .ok()
                .flatten()
                .map(McpMethod::ToolsCall)
                .ok_or_else(|| McpError::InvalidParams("Invalid tool call parameters".to_string())),
            CANCELLED => decode::<CancelledParams>(params)
                .map_err(|e| McpError::InvalidParams(e.to_string()))?
                .map(McpMethod::Cancelled)
                .ok_or_else(|| McpError::InvalidParams("Cancellation params required".to_string())),
            other => Ok(McpMethod::Unknown(other.to_string())),
        }
    }

    pub fn name(&self) -> &str {
        match self {
            McpMethod::Initialize(_) => INITIALIZE,
            McpMethod::Initialized => INITIALIZED,
            McpMethod::Ping => PING,
            McpMethod::ToolsList => TOOLS_LIST,
            McpMethod::ToolsCall(_) => TOOLS_CALL,
            McpMethod::Cancelled(_) => CANCELLED,
            McpMethod::Unknown(name) => name,
        }
    }
}

fn decode<T: DeserializeOwned>(params: Option<Value>) -> Result<Option<T>, serde_json::Error> {
    params
        .filter(|p| !p.is_null())
        .map(serde_json::from_value)
        .transpose()
}
