//! MCP (Model Context Protocol) support.
//!
//! The server exposes the agent's tools, `transcript://` resources and prompt
//! templates over JSON-RPC 2.0, on stdio or through the HTTP server's `/mcp`
//! route. The same protocol types back the client used to discover tools on a
//! remote server.

mod prompts;
pub mod protocol;
mod resources;
mod server;

pub use resources::{ResourceRead, TranscriptResources};
pub use server::{McpServer, INVALID_REQUEST};
