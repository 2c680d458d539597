//! Configuration settings for tubeagent.

use crate::agent::GenerationOptions;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Root configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Settings {
    pub general: GeneralSettings,
    pub generation: GenerationSettings,
    pub agent: AgentSettings,
    pub queue: QueueSettings,
    pub tools: ToolSettings,
    pub transcription: TranscriptionSettings,
    pub server: ServerSettings,
    pub prompts: PromptSettings,
}

/// General application settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralSettings {
    /// Directory for storing application data.
    pub data_dir: String,
    /// Directory for temporary files (downloaded audio, subtitles).
    pub temp_dir: String,
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,
}

impl Default for GeneralSettings {
    fn default() -> Self {
        Self {
            data_dir: "~/.tubeagent".to_string(),
            temp_dir: "/tmp/tubeagent".to_string(),
            log_level: "warn".to_string(),
        }
    }
}

/// Text generation endpoint settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerationSettings {
    /// Base URL of an OpenAI-compatible API (None = api.openai.com).
    pub base_url: Option<String>,
    /// Name of the environment variable holding the API key.
    pub api_key_env: String,
    /// Model identifier sent with each request.
    pub model: String,
    /// HTTP timeout for a single generation call.
    pub request_timeout_secs: u64,
    /// Options for the first pass, where the model decides on tool calls.
    pub tool_pass: GenerationOptions,
    /// Options for the second pass, which writes the final answer.
    pub answer_pass: GenerationOptions,
}

impl Default for GenerationSettings {
    fn default() -> Self {
        Self {
            base_url: Some("http://localhost:8000/v1".to_string()),
            api_key_env: "OPENAI_API_KEY".to_string(),
            model: "katanemo/Arch-Function-3B".to_string(),
            request_timeout_secs: 300,
            tool_pass: GenerationOptions::greedy(512),
            answer_pass: GenerationOptions::sampled(0.7, 0.9, 512),
        }
    }
}

/// Agent loop settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentSettings {
    /// How long a turn waits on a single queued tool before deferring it.
    pub wait_budget_secs: u64,
    /// Number of non-system messages retained per conversation (at least 1).
    pub max_retained_messages: usize,
    /// Keep the consolidated tool-result message in conversation history.
    pub persist_tool_results: bool,
}

impl Default for AgentSettings {
    fn default() -> Self {
        Self {
            wait_budget_secs: 30,
            max_retained_messages: 20,
            persist_tool_results: false,
        }
    }
}

impl AgentSettings {
    pub fn wait_budget(&self) -> Duration {
        Duration::from_secs(self.wait_budget_secs)
    }
}

/// Background job queue settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueSettings {
    /// SQLite database shared by the API process and the workers.
    pub database_path: String,
    /// How often a waiting caller re-reads job state.
    pub poll_interval_ms: u64,
    /// How often an idle worker looks for new jobs.
    pub worker_poll_interval_ms: u64,
    /// Retries after the first failed attempt.
    pub max_retries: u32,
    /// Delay before a failed job becomes available again.
    pub retry_delay_secs: u64,
    /// Lease on a running job; expired leases are re-queued.
    pub visibility_timeout_secs: u64,
    /// Finished jobs older than this are purged by the worker.
    pub result_ttl_hours: u64,
}

impl Default for QueueSettings {
    fn default() -> Self {
        Self {
            database_path: "~/.tubeagent/jobs.db".to_string(),
            poll_interval_ms: 100,
            worker_poll_interval_ms: 500,
            max_retries: 3,
            retry_delay_secs: 5,
            visibility_timeout_secs: 3600,
            result_ttl_hours: 24,
        }
    }
}

impl QueueSettings {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn worker_poll_interval(&self) -> Duration {
        Duration::from_millis(self.worker_poll_interval_ms)
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_secs(self.retry_delay_secs)
    }

    pub fn visibility_timeout(&self) -> Duration {
        Duration::from_secs(self.visibility_timeout_secs)
    }

    pub fn result_ttl(&self) -> Duration {
        Duration::from_secs(self.result_ttl_hours * 3600)
    }
}

/// Tool catalog settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolSettings {
    /// Remote MCP endpoint to discover tools from (None = local registry).
    pub discovery_url: Option<String>,
    /// Timeout for discovery and remote tool calls.
    pub discovery_timeout_secs: u64,
    /// Offer the `web_search` tool.
    pub web_search_enabled: bool,
    /// Instant-answer endpoint used by `web_search`.
    pub web_search_endpoint: String,
}

impl Default for ToolSettings {
    fn default() -> Self {
        Self {
            discovery_url: None,
            discovery_timeout_secs: 10,
            web_search_enabled: true,
            web_search_endpoint: "https://api.duckduckgo.com/".to_string(),
        }
    }
}

/// Transcript acquisition settings (worker side).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TranscriptionSettings {
    /// Whisper model used when no subtitles are available.
    pub model: String,
    /// Subtitle language to request from YouTube.
    pub subtitle_language: String,
}

impl Default for TranscriptionSettings {
    fn default() -> Self {
        Self {
            model: "whisper-1".to_string(),
            subtitle_language: "en".to_string(),
        }
    }
}

/// HTTP server settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
    /// Model name advertised on the Ollama-compatible endpoints.
    pub model_name: String,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8001,
            model_name: "youtube-agent:latest".to_string(),
        }
    }
}

/// Prompt customization settings.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct PromptSettings {
    /// Directory for custom prompts (overrides defaults).
    pub custom_dir: Option<String>,
    /// Custom variables available in all prompts as {{variable_name}}.
    pub variables: std::collections::HashMap<String, String>,
}

impl Settings {
    /// Load settings from the default configuration file.
    pub fn load() -> crate::error::Result<Self> {
        Self::load_from(None)
    }

    /// Load settings from a specific path, or default location if None.
    pub fn load_from(path: Option<&PathBuf>) -> crate::error::Result<Self> {
        let config_path = match path {
            Some(p) => p.clone(),
            None => Self::default_config_path(),
        };

        if config_path.exists() {
            let content = std::fs::read_to_string(&config_path)?;
            let settings: Settings = toml::from_str(&content)?;
            settings.validate()?;
            Ok(settings)
        } else {
            Ok(Settings::default())
        }
    }

    /// Reject values that would leave the agent unable to work.
    pub fn validate(&self) -> crate::error::Result<()> {
        // The current user message must survive trimming to reach the model
        if self.agent.max_retained_messages == 0 {
            return Err(crate::error::AgentError::Config(
                "agent.max_retained_messages must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// Save settings to a specific path.
    pub fn save_to(&self, path: &PathBuf) -> crate::error::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)
            .map_err(|e| crate::error::AgentError::Config(e.to_string()))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Get the default configuration file path.
    pub fn default_config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("tubeagent")
            .join("config.toml")
    }

    /// Expand shell variables in paths (e.g., ~).
    pub fn expand_path(path: &str) -> PathBuf {
        PathBuf::from(shellexpand::tilde(path).to_string())
    }

    /// Get the expanded data directory path.
    pub fn data_dir(&self) -> PathBuf {
        Self::expand_path(&self.general.data_dir)
    }

    /// Get the expanded temp directory path.
    pub fn temp_dir(&self) -> PathBuf {
        Self::expand_path(&self.general.temp_dir)
    }

    /// Get the expanded job database path.
    pub fn queue_db_path(&self) -> PathBuf {
        Self::expand_path(&self.queue.database_path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_config_uses_defaults() {
        let settings: Settings = toml::from_str(
            r#"
            [agent]
            wait_budget_secs = 45

            [queue]
            max_retries = 1
            "#,
        )
        .unwrap();

        assert_eq!(settings.agent.wait_budget(), Duration::from_secs(45));
        assert_eq!(settings.agent.max_retained_messages, 20);
        assert_eq!(settings.queue.max_retries, 1);
        assert_eq!(settings.queue.retry_delay(), Duration::from_secs(5));
        assert!(!settings.generation.tool_pass.do_sample);
    }

    #[test]
    fn test_zero_retention_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[agent]\nmax_retained_messages = 0\n").unwrap();

        let err = Settings::load_from(Some(&path)).unwrap_err();
        assert!(matches!(err, crate::error::AgentError::Config(msg) if msg.contains("max_retained_messages")));

        std::fs::write(&path, "[agent]\nmax_retained_messages = 1\n").unwrap();
        assert_eq!(Settings::load_from(Some(&path)).unwrap().agent.max_retained_messages, 1);
    }

    #[test]
    fn test_round_trip_through_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");

        let mut settings = Settings::default();
        settings.server.port = 9100;
        settings.save_to(&path).unwrap();

        let loaded = Settings::load_from(Some(&path)).unwrap();
        assert_eq!(loaded.server.port, 9100);
        assert_eq!(loaded.queue.max_retries, 3);
    }
}
