//! Interactive chat command.

use crate::cli::preflight::{self, Operation};
use crate::cli::Output;
use crate::config::Settings;
use crate::conversation::Conversation;
use crate::orchestrator::Orchestrator;
use anyhow::Result;
use console::style;
use std::io::{self, BufRead, Write};

/// Run the interactive chat command.
pub async fn run_chat(model: Option<String>, mut settings: Settings) -> Result<()> {
    if let Some(model) = model {
        settings.generation.model = model;
    }

    // Pre-flight checks
    if let Err(e) = preflight::check(Operation::Chat, &settings) {
        Output::error(&format!("{}", e));
        return Err(e.into());
    }

    let orchestrator = Orchestrator::new(settings)?;
    let agent = orchestrator.agent()?;
    let mut conversation = Conversation::ephemeral(orchestrator.settings().agent.max_retained_messages);

    println!("\n{}", style("tubeagent chat").bold().cyan());
    println!(
        "{}\n",
        style("Paste a YouTube link and ask away. Type 'exit' to quit, 'clear' to reset the conversation.").dim()
    );

    let stdin = io::stdin();
    let mut stdout = io::stdout();

    loop {
        print!("{} ", style("You:").green().bold());
        stdout.flush()?;

        let mut input = String::new();
        if stdin.lock().read_line(&mut input)? == 0 {
            break;
        }

        let input = input.trim();

        if input.is_empty() {
            continue;
        }

        if input.eq_ignore_ascii_case("exit") || input.eq_ignore_ascii_case("quit") {
            Output::info("Goodbye!");
            break;
        }

        if input.eq_ignore_ascii_case("clear") {
            conversation.clear();
            Output::info("Conversation history cleared.");
            continue;
        }

        let spinner = Output::spinner("Thinking...");
        let response = agent.handle_turn(&mut conversation, input).await;
        spinner.finish_and_clear();

        for record in &response.tool_calls {
            Output::tool_call(record);
        }
        println!("\n{} {}\n", style("Agent:").cyan().bold(), response.content);
    }

    Ok(())
}
