//! Ask command implementation.

use crate::agent::TurnOutcome;
use crate::cli::preflight::{self, Operation};
use crate::cli::Output;
use crate::config::Settings;
use crate::conversation::Conversation;
use crate::orchestrator::Orchestrator;
use anyhow::Result;
use std::time::Duration;

/// Run the ask command.
pub async fn run_ask(
    question: &str,
    model: Option<String>,
    wait: Option<u64>,
    mut settings: Settings,
) -> Result<()> {
    if let Some(model) = model {
        settings.generation.model = model;
    }

    // Pre-flight checks
    if let Err(e) = preflight::check(Operation::Chat, &settings) {
        Output::error(&format!("{}", e));
        return Err(e.into());
    }

    let orchestrator = Orchestrator::new(settings)?;
    let mut agent = orchestrator.agent()?;
    if let Some(secs) = wait {
        agent = agent.with_wait_budget(Duration::from_secs(secs));
    }

    let mut conversation = Conversation::ephemeral(orchestrator.settings().agent.max_retained_messages);

    let spinner = Output::spinner("Thinking...");
    let response = agent.handle_turn(&mut conversation, question).await;
    spinner.finish_and_clear();

    if !response.tool_calls.is_empty() {
        Output::header("Tools");
        for record in &response.tool_calls {
            Output::tool_call(record);
        }
    }

    println!("\n{}\n", response.content);

    match response.outcome {
        TurnOutcome::Answered => Ok(()),
        TurnOutcome::Deferred { job_ids } => {
            for id in &job_ids {
                Output::info(&format!("Check progress with: tubeagent status {}", id));
            }
            Ok(())
        }
        TurnOutcome::Failed { diagnostic } => Err(anyhow::anyhow!(diagnostic)),
    }
}
