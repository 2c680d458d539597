//! tubeagent - a conversational agent for questions about YouTube videos
//!
//! The agent lets a chat model request tools with `<tool_call>` tags, runs
//! them, and feeds the results back for a single answer pass. Heavy tools
//! (transcript download, Whisper transcription) run on a separate worker
//! process fed through a SQLite job queue, so a slow video never blocks a
//! chat turn for longer than its wait budget.
//!
//! # Architecture
//!
//! - `config` - Settings and prompt templates
//! - `conversation` - Message history with bounded retention
//! - `tools` - Tool catalog, prompt rendering, built-in and remote tools
//! - `agent` - Tool-call parser, executor and the turn loop
//! - `queue` - Persistent job queue, bounded waiting and the worker
//! - `youtube` - Transcript acquisition and the worker-side task handlers
//! - `mcp` - MCP server exposing the tools over JSON-RPC
//! - `orchestrator` - Wires the pieces together from settings
//!
//! # Example
//!
//! ```rust,no_run
//! use tubeagent::config::Settings;
//! use tubeagent::conversation::Conversation;
//! use tubeagent::orchestrator::Orchestrator;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let settings = Settings::load()?;
//!     let orchestrator = Orchestrator::new(settings)?;
//!     let agent = orchestrator.agent()?;
//!
//!     let mut conversation = Conversation::ephemeral(20);
//!     let response = agent
//!         .handle_turn(&mut conversation, "Summarize https://youtu.be/dQw4w9WgXcQ")
//!         .await;
//!     println!("{}", response.content);
//!
//!     Ok(())
//! }
//! ```

pub mod agent;
pub mod cli;
pub mod config;
pub mod conversation;
pub mod error;
pub mod mcp;
pub mod openai;
pub mod orchestrator;
pub mod queue;
pub mod tools;
pub mod youtube;

pub use error::{AgentError, Result};
