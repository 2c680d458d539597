//! CLI output formatting utilities.

use crate::agent::ToolCallRecord;
use crate::queue::{Job, JobState, Outcome};
use console::style;
use indicatif::{ProgressBar, ProgressStyle};

/// Output helper for CLI formatting.
pub struct Output;

impl Output {
    /// Print an info message.
    pub fn info(msg: &str) {
        println!("{} {}", style(">>").cyan().bold(), msg);
    }

    /// Print a success message.
    pub fn success(msg: &str) {
        println!("{} {}", style(">>").green().bold(), msg);
    }

    /// Print a warning message.
    pub fn warning(msg: &str) {
        eprintln!("{} {}", style(">>").yellow().bold(), msg);
    }

    /// Print an error message.
    pub fn error(msg: &str) {
        eprintln!("{} {}", style(">>").red().bold(), msg);
    }

    /// Print a header.
    pub fn header(msg: &str) {
        println!("\n{}", style(msg).bold().underlined());
    }

    /// Print a key-value pair.
    pub fn kv(key: &str, value: &str) {
        println!("  {}: {}", style(key).dim(), value);
    }

    /// Print a list item.
    pub fn list_item(msg: &str) {
        println!("  {} {}", style("*").cyan(), msg);
    }

    /// Print one tool call made during a turn.
    pub fn tool_call(record: &ToolCallRecord) {
        let mark = match &record.outcome {
            Outcome::Result(_) => style("ok").green(),
            Outcome::Deferred(_) => style("deferred").yellow(),
            Outcome::Failure(_) => style("failed").red(),
        };
        println!("  {} {}", style(format!("[{}]", preview(&record.to_string(), 80))).dim(), mark);
    }

    /// Print one job row.
    pub fn job(job: &Job) {
        let state = match job.state {
            JobState::Pending => style(job.state.as_str()).yellow(),
            JobState::Running => style(job.state.as_str()).cyan(),
            JobState::Succeeded => style(job.state.as_str()).green(),
            JobState::Failed => style(job.state.as_str()).red(),
        };
        println!(
            "  {} {} {} (attempts: {})",
            style("*").cyan(),
            style(&job.id).dim(),
            style(&job.task_name).bold(),
            job.attempts
        );
        println!("    {}", state);
    }

    /// Create a spinner.
    pub fn spinner(msg: &str) -> ProgressBar {
        let pb = ProgressBar::new_spinner();
        if let Ok(spinner_style) = ProgressStyle::default_spinner().template("{spinner:.green} {msg}") {
            pb.set_style(spinner_style);
        }
        pb.set_message(msg.to_string());
        pb.enable_steady_tick(std::time::Duration::from_millis(100));
        pb
    }
}

/// Truncate to `max_chars` characters with ellipsis.
fn preview(content: &str, max_chars: usize) -> String {
    let content = content.replace('\n', " ");
    if content.chars().count() <= max_chars {
        content
    } else {
        let cut: String = content.chars().take(max_chars).collect();
        format!("{}...", cut)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_preview_is_char_safe() {
        assert_eq!(preview("short", 10), "short");
        assert_eq!(preview("ééééé", 3), "ééé...");
        assert_eq!(preview("a\nb", 10), "a b");
    }
}
