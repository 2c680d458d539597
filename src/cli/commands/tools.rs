//! Tools command implementation.

use crate::cli::Output;
use crate::config::Settings;
use crate::orchestrator::Orchestrator;
use crate::tools::ToolCatalog;
use anyhow::Result;

/// Print the tools the model is offered, including remote ones.
pub async fn run_tools(settings: Settings) -> Result<()> {
    let orchestrator = Orchestrator::new(settings)?;
    let tools = orchestrator.executor().list_tools().await;

    Output::header(&format!("Tools ({})", tools.len()));
    for tool in &tools {
        Output::list_item(&tool.name);
        println!("      {}", tool.description);
        if let Some(required) = tool.parameter_schema.get("required").and_then(|r| r.as_array()) {
            let names: Vec<&str> = required.iter().filter_map(|v| v.as_str()).collect();
            Output::kv("    required", &names.join(", "));
        }
    }

    if orchestrator.settings().tools.discovery_url.is_some()
        && tools.len() == orchestrator.executor().registry().len()
    {
        Output::warning("Remote tool server returned no additional tools.");
    }

    Ok(())
}
