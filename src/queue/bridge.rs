//! Producer side of the queue: submit, wait within a budget, poll status.

use super::{Job, JobState, JobStatus, JobStore, Outcome};
use crate::config::QueueSettings;
use crate::error::{AgentError, Result};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, instrument, warn};

/// Producer-side queue settings.
#[derive(Debug, Clone)]
pub struct QueueOptions {
    pub poll_interval: Duration,
    pub max_retries: u32,
}

impl Default for QueueOptions {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(100),
            max_retries: 3,
        }
    }
}

impl From<&QueueSettings> for QueueOptions {
    fn from(settings: &QueueSettings) -> Self {
        Self {
            poll_interval: settings.poll_interval(),
            max_retries: settings.max_retries,
        }
    }
}

/// Submits jobs and waits on them for a bounded time.
pub struct JobQueue {
    store: Arc<JobStore>,
    options: QueueOptions,
}

/// Outcome of a job that reached a terminal state.
///
/// Failures carry the same `Tool error:` prefix as direct tools.
fn settled_outcome(job: Job) -> Outcome {
    match job.state {
        JobState::Succeeded => Outcome::Result(job.result.unwrap_or_default()),
        _ => Outcome::Failure(format!(
            "Tool error: {}",
            job.error.as_deref().unwrap_or("job failed")
        )),
    }
}

/// Serialize JSON with object keys sorted at every level.
fn canonical_json(value: &Value) -> String {
    match value {
        Value::Object(map) => {
            let mut entries: Vec<(&String, &Value)> = map.iter().collect();
            entries.sort_by(|a, b| a.0.cmp(b.0));
            let body = entries
                .into_iter()
                .map(|(k, v)| format!("{}:{}", Value::String(k.clone()), canonical_json(v)))
                .collect::<Vec<_>>()
                .join(",");
            format!("{{{}}}", body)
        }
        Value::Array(items) => {
            let body = items.iter().map(canonical_json).collect::<Vec<_>>().join(",");
            format!("[{}]", body)
        }
        other => other.to_string(),
    }
}

impl JobQueue {
    pub fn new(store: Arc<JobStore>, options: QueueOptions) -> Self {
        Self { store, options }
    }

    pub fn store(&self) -> &Arc<JobStore> {
        &self.store
    }

    /// Key that identifies equivalent submissions.
    pub fn idempotency_key(task_name: &str, arguments: &Value) -> String {
        format!("{}:{}", task_name, canonical_json(arguments))
    }

    /// Enqueue a job and return its id.
    ///
    /// An equivalent job that is pending, running or succeeded is reused instead.
    #[instrument(skip(self, arguments))]
    pub async fn submit(&self, task_name: &str, arguments: &Value) -> Result<String> {
        let key = Self::idempotency_key(task_name, arguments);
        let (job, reused) =
            self.store
                .insert_or_reuse(task_name, arguments, &key, self.options.max_retries)?;

        if reused {
            info!("Reusing existing job {} for {}", job.id, task_name);
        } else {
            info!("Submitted job {} for {}", job.id, task_name);
        }
        Ok(job.id)
    }

    /// Poll a job until it settles or `budget` elapses. The job is never cancelled.
    pub async fn wait(&self, job_id: &str, budget: Duration) -> Outcome {
        let deadline = Instant::now() + budget;

        loop {
            match self.store.get(job_id) {
                Ok(Some(job)) if job.state.is_terminal() => return settled_outcome(job),
                Ok(Some(_)) => {}
                Ok(None) => return Outcome::Failure(format!("Job {} not found", job_id)),
                // A locked database is transient; keep polling until the budget runs out
                Err(e) => warn!("Polling job {} failed: {}", job_id, e),
            }

            let now = Instant::now();
            if now >= deadline {
                debug!("Wait budget exhausted for job {}", job_id);
                return Outcome::Deferred(job_id.to_string());
            }
            tokio::time::sleep(self.options.poll_interval.min(deadline - now)).await;
        }
    }

    /// Submit a job and wait for it within `budget`.
    pub async fn run(&self, task_name: &str, arguments: &Value, budget: Duration) -> Outcome {
        match self.submit(task_name, arguments).await {
            Ok(job_id) => self.wait(&job_id, budget).await,
            Err(e) => Outcome::Failure(format!("Failed to submit {}: {}", task_name, e)),
        }
    }

    /// Current status of a job.
    pub async fn status(&self, job_id: &str) -> Result<JobStatus> {
        self.store
            .get(job_id)?
            .map(|job| job.status())
            .ok_or_else(|| AgentError::JobNotFound(job_id.to_string()))
    }
}
