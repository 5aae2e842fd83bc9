//! MCP protocol handling: JSON-RPC dispatch.

pub mod cancellation;
pub mod handler;
pub mod method;
pub mod negotiation;
pub mod validator;

pub use cancellation::{CancellationRegistry, InFlight};
pub use handler::{DispatchOutcome, ProtocolHandler};
pub use method::McpMethod;
