//! CLI command implementations.

mod ask;
mod chat;
mod config;
mod mcp;
mod serve;
mod status;
mod tools;
mod worker;

pub use ask::run_ask;
pub use chat::run_chat;
pub use config::run_config;
pub use mcp::run_mcp;
pub use serve::run_serve;
pub use status::run_status;
pub use tools::run_tools;
pub use worker::run_worker;
