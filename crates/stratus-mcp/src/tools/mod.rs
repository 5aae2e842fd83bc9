//! MCP tool implementations.

pub mod get_weather;
pub mod registry;

pub use get_weather::GetWeather;
pub use registry::{Tool, ToolRegistry};
