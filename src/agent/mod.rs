//! Conversational agent with tool calling.
//!
//! Each turn makes one tool-selection pass, executes the requested tools
//! (directly, through the job queue, or on a remote tool server), and makes
//! at most one answer pass over the results.

mod executor;
mod generation;
mod parser;
mod runner;

pub use executor::ToolExecutor;
pub use generation::{GenerationOptions, OpenAiGenerator, TextGenerator};
pub use parser::{parse_tool_calls, repair_json, strip_tool_calls};
pub use runner::{Agent, ToolCallRecord, TurnOutcome, TurnResponse};
