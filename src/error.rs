//! Error types for tubeagent.

use thiserror::Error;

/// Library-level error type for tubeagent operations.
#[derive(Error, Debug)]
pub enum AgentError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Generation failed: {0}")]
    Generation(String),

    #[error("Tool error: {0}")]
    Tool(String),

    #[error("Unknown tool: {0}")]
    UnknownTool(String),

    #[error("Duplicate tool registration: {0}")]
    DuplicateTool(String),

    #[error("Job queue error: {0}")]
    Queue(String),

    #[error("Job not found: {0}")]
    JobNotFound(String),

    #[error("No handler registered for task: {0}")]
    UnknownTask(String),

    #[error("Media source error: {0}")]
    VideoSource(String),

    #[error("Audio download failed: {0}")]
    AudioDownload(String),

    #[error("Transcription failed: {0}")]
    Transcription(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("OpenAI API error: {0}")]
    OpenAI(String),

    #[error("External tool not found: {0}. Please install it and ensure it's in your PATH.")]
    ToolNotFound(String),

    #[error("External tool failed: {0}")]
    ToolFailed(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

impl AgentError {
    /// Whether a background job that failed with this error should be retried.
    pub fn is_transient(&self) -> bool {
        !matches!(
            self,
            AgentError::InvalidInput(_)
                | AgentError::UnknownTask(_)
                | AgentError::UnknownTool(_)
                | AgentError::Config(_)
        )
    }
}

/// Result type alias for tubeagent operations.
pub type Result<T> = std::result::Result<T, AgentError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_classification() {
        assert!(AgentError::Transcription("network".into()).is_transient());
        assert!(AgentError::ToolFailed("yt-dlp exited 1".into()).is_transient());
        assert!(!AgentError::InvalidInput("bad url".into()).is_transient());
        assert!(!AgentError::UnknownTask("nope".into()).is_transient());
    }
}
