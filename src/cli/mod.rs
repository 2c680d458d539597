//! CLI module for tubeagent.

pub mod commands;
mod output;
pub mod preflight;

pub use output::Output;

use clap::{Parser, Subcommand};

/// tubeagent - a conversational agent for questions about YouTube videos
///
/// The agent answers in chat and calls tools (transcripts, transcript search,
/// web search) that run on a background worker.
#[derive(Parser, Debug)]
#[command(name = "tubeagent")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Increase verbosity (-v for info, -vv for debug, -vvv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Path to configuration file
    #[arg(short, long, global = true, env = "TUBEAGENT_CONFIG")]
    pub config: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Start an interactive chat session
    Chat {
        /// Override the generation model
        #[arg(short, long)]
        model: Option<String>,
    },

    /// Ask a single question and print the answer
    Ask {
        /// The question to ask
        question: String,

        /// Override the generation model
        #[arg(short, long)]
        model: Option<String>,

        /// Seconds to wait on each tool before deferring it
        #[arg(short, long)]
        wait: Option<u64>,
    },

    /// Start the HTTP API server (Ollama-compatible chat plus MCP)
    Serve {
        /// Host to bind to
        #[arg(long)]
        host: Option<String>,

        /// Port to bind to
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Run the background worker that executes queued tool jobs
    Worker {
        /// Process jobs until the queue is empty, then exit
        #[arg(long)]
        drain: bool,
    },

    /// Show the status of a background job, or queue totals when no id is given
    Status {
        /// Job id returned by a deferred tool call
        job_id: Option<String>,

        /// Number of recent jobs to list
        #[arg(short, long, default_value = "10")]
        limit: usize,
    },

    /// List the tools offered to the model
    Tools,

    /// Start MCP server on stdio
    Mcp,

    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Show current configuration
    Show,

    /// Write the default configuration file if none exists
    Init,

    /// Open configuration file in editor
    Edit,

    /// Show configuration file path
    Path,
}
