//! Transport layer for MCP communication.

pub mod framing;
pub mod http;
pub mod origin;
pub mod stream;

pub use http::{HttpTransport, ServerState, API_KEY_HEADER, SESSION_HEADER};
pub use origin::{AllowAnyOrigin, AllowListOrigins, OriginPolicy};
