//! `get_weather`: canned weather report for a location.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::types::{ToolCallResult, ToolDefinition};

use super::Tool;

#[derive(Debug, Deserialize)]
struct WeatherParams {
    location: String,
}

/// Stub weather lookup; no external API is contacted.
pub struct GetWeather;

#[async_trait]
impl Tool for GetWeather {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: "get_weather".to_string(),
            description: Some("Get current weather information for a location".to_string()),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "location": {
                        "type": "string",
                        "description": "City name or zip code"
                    }
                },
                "required": ["location"]
            }),
        }
    }

    async fn call(&self, arguments: Value) -> ToolCallResult {
        let params: WeatherParams = match serde_json::from_value(arguments) {
            Ok(p) => p,
            Err(e) => {
                tracing::debug!("get_weather: bad arguments: {e}");
                return ToolCallResult::error("Failed to parse weather arguments");
            }
        };

        ToolCallResult::text(format!(
            "Current weather in {}:\nTemperature: 72°F\nConditions: Partly cloudy",
            params.location
        ))
    }
}
