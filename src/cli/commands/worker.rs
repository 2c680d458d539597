//! Worker command implementation.

use crate::cli::preflight::{self, Operation};
use crate::cli::Output;
use crate::config::Settings;
use crate::orchestrator::Orchestrator;
use anyhow::Result;
use tracing::warn;

/// Run the background worker.
pub async fn run_worker(drain: bool, settings: Settings) -> Result<()> {
    // Pre-flight checks
    if let Err(e) = preflight::check(Operation::Worker, &settings) {
        Output::error(&format!("{}", e));
        Output::info("The worker needs yt-dlp and ffmpeg on PATH and OPENAI_API_KEY for the Whisper fallback.");
        return Err(e.into());
    }

    let orchestrator = Orchestrator::new(settings)?;
    let worker = orchestrator.worker()?;

    Output::success(&format!(
        "Worker processing jobs from {}",
        orchestrator.settings().queue_db_path().display()
    ));

    if drain {
        let mut processed = 0usize;
        while worker.run_once().await? {
            processed += 1;
        }
        Output::info(&format!("Queue drained ({} jobs processed).", processed));
        return Ok(());
    }

    Output::info("Press Ctrl+C to stop after the current job.");
    worker
        .run(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!("Failed to listen for Ctrl+C: {}", e);
                std::future::pending::<()>().await;
            }
        })
        .await?;

    Output::info("Worker stopped.");
    Ok(())
}
