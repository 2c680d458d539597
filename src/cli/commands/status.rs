//! Job status command implementation.

use crate::cli::Output;
use crate::config::Settings;
use crate::queue::JobStore;
use anyhow::Result;

/// Show one job, or queue totals and the most recent jobs.
pub async fn run_status(job_id: Option<&str>, limit: usize, settings: Settings) -> Result<()> {
    let store = JobStore::open(&settings.queue_db_path())?;

    if let Some(id) = job_id {
        let Some(job) = store.get(id)? else {
            Output::error(&format!("Job not found: {}", id));
            return Err(anyhow::anyhow!("Job not found: {}", id));
        };

        Output::header(&format!("Job {}", job.id));
        Output::kv("Task", &job.task_name);
        Output::kv("Status", &job.status().to_string());
        Output::kv("Attempts", &format!("{} (max retries {})", job.attempts, job.max_retries));
        Output::kv("Arguments", &job.payload.to_string());
        Output::kv("Created", &job.created_at.to_rfc3339());
        Output::kv("Updated", &job.updated_at.to_rfc3339());
        return Ok(());
    }

    Output::header("Queue");
    let counts = store.counts()?;
    if counts.is_empty() {
        Output::info("No jobs yet.");
        return Ok(());
    }
    for (state, count) in counts {
        Output::kv(state.as_str(), &count.to_string());
    }

    Output::header("Recent jobs");
    for job in store.list_recent(limit)? {
        Output::job(&job);
    }

    Ok(())
}
