//! Tool contract, registration, and dispatch.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::types::{McpError, McpResult, ToolCallResult, ToolDefinition};

use super::get_weather::GetWeather;

/// A capability invocable through `tools/call`.
///
/// Failures the tool itself reports belong in a [`ToolCallResult`] flagged
/// as an error, not in a protocol error.
#[async_trait]
pub trait Tool: Send + Sync {
    /// Name, description, and input schema.
    fn definition(&self) -> ToolDefinition;
    /// Run the tool with the caller's arguments.
    async fn call(&self, arguments: Value) -> ToolCallResult;
}

/// A tool plus its name, captured once at registration.
#[derive(Clone)]
struct Entry {
    name: String,
    tool: Arc<dyn Tool>,
}

/// Static catalog of the tools this server exposes.
#[derive(Clone, Default)]
pub struct ToolRegistry {
    tools: Vec<Entry>,
}

impl ToolRegistry {
    /// Empty catalog.
    pub fn new() -> Self {
        Self::default()
    }

    /// Catalog with the built-in tools.
    pub fn with_defaults() -> Self {
        Self::new().register(GetWeather)
    }

    pub fn register(mut self, tool: impl Tool + 'static) -> Self {
        let name = tool.definition().name;
        self.tools.push(Entry {
            name,
            tool: Arc::new(tool),
        });
        self
    }

    pub fn list_tools(&self) -> Vec<ToolDefinition> {
        self.tools.iter().map(|e| e.tool.definition()).collect()
    }

    /// Look up a tool by name. Unknown names are an invalid-params error.
    pub fn get(&self, name: &str) -> McpResult<Arc<dyn Tool>> {
        self.tools
            .iter()
            .find(|e| e.name == name)
            .map(|e| Arc::clone(&e.tool))
            .ok_or_else(|| McpError::InvalidParams(format!("Unknown tool: {name}")))
    }
}
