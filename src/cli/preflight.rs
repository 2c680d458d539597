//! Pre-flight checks before long-running operations.
//!
//! Validates that required tools and configuration are available
//! before starting processes that would otherwise fail midway.

use crate::config::Settings;
use crate::error::{AgentError, Result};
use std::process::Command;

/// Requirements for different operations.
#[derive(Debug, Clone, Copy)]
pub enum Operation {
    /// The worker downloads subtitles and audio and may call Whisper.
    Worker,
    /// Chat needs a generation endpoint, which may be local and keyless.
    Chat,
}

/// Run pre-flight checks for the given operation.
///
/// Returns Ok(()) if all checks pass, or an error describing what's missing.
pub fn check(operation: Operation, settings: &Settings) -> Result<()> {
    match operation {
        Operation::Worker => {
            check_tool("yt-dlp")?;
            check_tool("ffmpeg")?;
            check_api_key("OPENAI_API_KEY")?;
        }
        Operation::Chat => {
            // Local endpoints accept any key; only the hosted API needs one
            if settings.generation.base_url.is_none() {
                check_api_key(&settings.generation.api_key_env)?;
            }
        }
    }
    Ok(())
}

/// Check if an API key is configured in the given variable.
fn check_api_key(var: &str) -> Result<()> {
    match std::env::var(var) {
        Ok(key) if !key.is_empty() => Ok(()),
        Ok(_) => Err(AgentError::Config(format!(
            "{} is empty. Set it with: export {}='sk-...'",
            var, var
        ))),
        Err(_) => Err(AgentError::Config(format!(
            "{} not set. Set it with: export {}='sk-...'",
            var, var
        ))),
    }
}

/// Check if an external tool is available.
fn check_tool(name: &str) -> Result<()> {
    // ffmpeg uses -version (single dash), others use --version
    let version_arg = match name {
        "ffmpeg" => "-version",
        _ => "--version",
    };
    match Command::new(name).arg(version_arg).output() {
        Ok(output) if output.status.success() => Ok(()),
        Ok(_) => Err(AgentError::ToolNotFound(format!(
            "{} is installed but not working correctly",
            name
        ))),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            Err(AgentError::ToolNotFound(name.to_string()))
        }
        Err(e) => Err(AgentError::ToolNotFound(format!("{}: {}", name, e))),
    }
}
