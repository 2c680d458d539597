//! Tool catalog: schemas the model may call, and where each call is routed.
//!
//! Tools are described by [`ToolSpec`]s. A [`ToolCatalog`] lists the specs offered
//! in a turn; the local [`ToolRegistry`] also records how each tool is executed
//! (directly in-process, or as a queued job for the worker).

mod builtin;
mod prompt;
mod registry;
mod remote;

pub use builtin::{JobStatusTool, WebSearchTool};
pub use prompt::{format_for_prompt, format_tool_results, TOOL_CALL_CLOSE, TOOL_CALL_OPEN};
pub use registry::{ToolRegistry, ToolRoute};
pub use remote::McpClient;

use crate::error::Result;
use crate::youtube::{SEARCH_TASK, TRANSCRIPT_TASK, VIDEO_INFO_TASK};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

/// Schema-described unit of functionality the model may invoke.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolSpec {
    pub name: String,
    pub description: String,
    pub parameter_schema: Value,
}

impl ToolSpec {
    pub fn new(name: &str, description: &str, parameter_schema: Value) -> Self {
        Self {
            name: name.to_string(),
            description: description.to_string(),
            parameter_schema,
        }
    }

    /// Render in the OpenAI function format the model was trained on.
    pub fn to_function_json(&self) -> Value {
        json!({
            "type": "function",
            "function": {
                "name": self.name,
                "description": self.description,
                "parameters": self.parameter_schema,
            }
        })
    }
}

/// A tool call extracted from model output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolInvocation {
    pub name: String,
    #[serde(default)]
    pub arguments: Map<String, Value>,
}

impl ToolInvocation {
    pub fn new(name: &str, arguments: Map<String, Value>) -> Self {
        Self {
            name: name.to_string(),
            arguments,
        }
    }

    /// Arguments as a JSON object value.
    pub fn arguments_value(&self) -> Value {
        Value::Object(self.arguments.clone())
    }
}

impl std::fmt::Display for ToolInvocation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}({})", self.name, Value::Object(self.arguments.clone()))
    }
}

/// Source of the tools offered to the model in a turn.
#[async_trait]
pub trait ToolCatalog: Send + Sync {
    /// List available tools. Failures degrade to an empty list.
    async fn list_tools(&self) -> Vec<ToolSpec>;
}

/// Code that executes a tool in-process and returns text.
#[async_trait]
pub trait ToolHandler: Send + Sync {
    async fn call(&self, tool: &str, arguments: &Map<String, Value>) -> Result<String>;
}

/// Tool specs for the YouTube tools served by the worker.
pub fn youtube_tool_specs() -> Vec<ToolSpec> {
    vec![
        ToolSpec::new(
            "get_video_transcript",
            "Get the FULL transcript of a YouTube video. Use this tool when the user wants to \
            explain or summarize a video, understand what it is about, or ask ANY question about \
            its content or topics. This is the primary tool for video analysis.",
            json!({
                "type": "object",
                "properties": {
                    "video_url": {
                        "type": "string",
                        "description": "The URL of the YouTube video (supports youtube.com/watch, /shorts, and youtu.be formats)"
                    }
                },
                "required": ["video_url"]
            }),
        ),
        ToolSpec::new(
            "get_video_info",
            "Get metadata about a YouTube video's transcript: word count, character count, \
            estimated tokens and reading time. Use this ONLY when the user asks about video \
            LENGTH or STATISTICS.",
            json!({
                "type": "object",
                "properties": {
                    "video_url": {
                        "type": "string",
                        "description": "The URL of the YouTube video"
                    }
                },
                "required": ["video_url"]
            }),
        ),
        ToolSpec::new(
            "search_transcript",
            "Search for exact keyword matches in a transcript and return only the matching \
            snippets. Do NOT use this to explain a video. Use it only when the user asks where \
            or when something is mentioned.",
            json!({
                "type": "object",
                "properties": {
                    "video_url": {
                        "type": "string",
                        "description": "The URL of the YouTube video"
                    },
                    "query": {
                        "type": "string",
                        "description": "The text to search for in the transcript"
                    },
                    "context_chars": {
                        "type": "integer",
                        "description": "Characters to include before/after each match (default: 200)",
                        "default": 200,
                        "minimum": 0,
                        "maximum": 5000
                    }
                },
                "required": ["video_url", "query"]
            }),
        ),
    ]
}

/// Register the YouTube tools as queued jobs.
pub fn register_youtube_tools(registry: &mut ToolRegistry) -> Result<()> {
    let tasks = [TRANSCRIPT_TASK, VIDEO_INFO_TASK, SEARCH_TASK];
    for (spec, task) in youtube_tool_specs().into_iter().zip(tasks) {
        registry.register(spec, ToolRoute::Queued { task: task.to_string() })?;
    }
    Ok(())
}
