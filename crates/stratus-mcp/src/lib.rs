//! Stratus MCP Server: session-oriented JSON-RPC over streamable HTTP.

pub mod config;
pub mod protocol;
pub mod session;
pub mod tools;
pub mod transport;
pub mod types;

pub use config::ServerConfig;
pub use protocol::ProtocolHandler;
pub use session::SessionRegistry;
pub use tools::{Tool, ToolRegistry};
pub use transport::HttpTransport;
