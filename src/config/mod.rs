//! Configuration module for tubeagent.
//!
//! Handles loading and managing application settings and prompt templates.

mod prompts;
mod settings;

pub use prompts::{AgentPrompts, Prompts};
pub use settings::{
    AgentSettings, GeneralSettings, GenerationSettings, PromptSettings, QueueSettings,
    ServerSettings, Settings, ToolSettings, TranscriptionSettings,
};
