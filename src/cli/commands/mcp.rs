//! MCP command implementation.

use crate::config::Settings;
use crate::orchestrator::Orchestrator;
use anyhow::Result;

/// Run the MCP server on stdio.
pub async fn run_mcp(settings: Settings) -> Result<()> {
    let orchestrator = Orchestrator::new(settings)?;
    orchestrator.mcp_server()?.run().await
}
