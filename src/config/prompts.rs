//! Prompt templates for tubeagent.
//!
//! The task prompt can be customized by placing an `agent.toml` file in the custom
//! prompts directory. The tool-call protocol blocks are fixed and live in
//! [`crate::tools::format_for_prompt`].

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;

/// Collection of all prompt templates.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Prompts {
    pub agent: AgentPrompts,
    /// Custom variables from config, available in all prompts.
    #[serde(skip)]
    pub variables: HashMap<String, String>,
}

/// Prompts for the tool-calling agent.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentPrompts {
    /// Operating instructions shown before the tool signatures.
    pub task: String,
    /// Instructions used when no tools are available this turn.
    pub no_tools: String,
    /// Header of the consolidated tool-result message.
    pub tool_results_header: String,
}

impl Default for AgentPrompts {
    fn default() -> Self {
        Self {
            task: r#"You are an AI assistant with direct access to YouTube video analysis tools.

### OPERATIONAL PROTOCOL (MANDATORY):

1. **TOOL USAGE IS REQUIRED:**
   - When you see a YouTube URL, you MUST use the available tools. You CAN access YouTube through them.
   - You do NOT have up-to-date internal knowledge. Use `web_search` for questions about people, news, facts or events.
   - Use `get_video_transcript` to explain, summarize or answer any question about a video's content.
   - Use `get_video_info` ONLY when the user asks about a video's length or statistics.
   - Use `search_transcript` ONLY when the user asks where or when something is mentioned.
   - Use `check_job_status` when the user asks about a job id you gave them earlier.

2. **DO NOT USE TOOLS** for greetings, small talk, or questions you can answer from the conversation so far.

3. **OVERRIDE DEFAULT BEHAVIOR:**
   - Do NOT say "I cannot provide information" or "I don't have access to the internet".
   - If you don't know the answer, call a tool to find it."#
                .to_string(),

            no_tools: r#"You are an AI assistant for questions about YouTube videos.
No tools are available right now. Answer directly from the conversation, and say so
honestly if you cannot answer without looking at the video."#
                .to_string(),

            tool_results_header: "TOOL RESULTS (use these to answer the user's question):"
                .to_string(),
        }
    }
}

impl Prompts {
    /// Load prompts from the default location, with optional custom directory and variables.
    pub fn load(
        custom_dir: Option<&str>,
        custom_variables: Option<&HashMap<String, String>>,
    ) -> crate::error::Result<Self> {
        let mut prompts = Prompts::default();

        if let Some(vars) = custom_variables {
            prompts.variables = vars.clone();
        }

        if let Some(dir) = custom_dir {
            let custom_path = PathBuf::from(shellexpand::tilde(dir).to_string());

            let agent_path = custom_path.join("agent.toml");
            if agent_path.exists() {
                let content = std::fs::read_to_string(&agent_path)?;
                prompts.agent = toml::from_str(&content)?;
            }
        }

        Ok(prompts)
    }

    /// Render a prompt template with the given variables.
    pub fn render(template: &str, vars: &HashMap<String, String>) -> String {
        let mut result = template.to_string();
        for (key, value) in vars {
            result = result.replace(&format!("{{{{{}}}}}", key), value);
        }
        result
    }

    /// Task prompt with custom config variables applied.
    pub fn task_prompt(&self) -> String {
        Self::render(&self.agent.task, &self.variables)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_prompts() {
        let prompts = Prompts::default();
        assert!(prompts.agent.task.contains("get_video_transcript"));
        assert!(!prompts.agent.tool_results_header.is_empty());
    }

    #[test]
    fn test_render_template() {
        let template = "Hello {{name}}, you have {{count}} messages.";
        let mut vars = HashMap::new();
        vars.insert("name".to_string(), "Alice".to_string());
        vars.insert("count".to_string(), "5".to_string());

        let result = Prompts::render(template, &vars);
        assert_eq!(result, "Hello Alice, you have 5 messages.");
    }

    #[test]
    fn test_custom_agent_prompt_file() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("agent.toml"),
            "task = \"You help {{team}} with videos.\"\n",
        )
        .unwrap();

        let mut vars = HashMap::new();
        vars.insert("team".to_string(), "support".to_string());

        let prompts = Prompts::load(dir.path().to_str(), Some(&vars)).unwrap();
        assert_eq!(prompts.task_prompt(), "You help support with videos.");
        // Unset fields keep their defaults
        assert!(!prompts.agent.no_tools.is_empty());
    }
}
