//! Durable job queue shared by the agent process and the worker process.
//!
//! The agent submits jobs and polls them for a bounded time ([`JobQueue`]); a
//! separate [`Worker`] claims and runs them one at a time, retrying transient
//! failures. Both sides only share the SQLite database behind [`JobStore`].

mod bridge;
mod store;
mod worker;

pub use bridge::{JobQueue, QueueOptions};
pub use store::JobStore;
pub use worker::{TaskHandler, TaskRegistry, Worker, WorkerOptions};

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;

/// Characters of a successful result shown in a status line.
const PREVIEW_CHARS: usize = 100;

/// Lifecycle state of a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum JobState {
    Pending,
    Running,
    Succeeded,
    Failed,
}

impl JobState {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobState::Pending => "pending",
            JobState::Running => "running",
            JobState::Succeeded => "succeeded",
            JobState::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(JobState::Pending),
            "running" => Some(JobState::Running),
            "succeeded" => Some(JobState::Succeeded),
            "failed" => Some(JobState::Failed),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, JobState::Succeeded | JobState::Failed)
    }
}

/// A unit of background work.
#[derive(Debug, Clone, Serialize)]
pub struct Job {
    pub id: String,
    pub task_name: String,
    pub payload: Value,
    pub state: JobState,
    /// Number of times execution has started.
    pub attempts: u32,
    pub max_retries: u32,
    pub result: Option<String>,
    pub error: Option<String>,
    pub idempotency_key: String,
    pub available_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Job {
    pub fn status(&self) -> JobStatus {
        match self.state {
            JobState::Pending => JobStatus::Pending,
            JobState::Running => JobStatus::Running,
            JobState::Succeeded => JobStatus::Succeeded {
                preview: preview(self.result.as_deref().unwrap_or("")),
            },
            JobState::Failed => JobStatus::Failed {
                reason: self
                    .error
                    .clone()
                    .unwrap_or_else(|| "unknown error".to_string()),
            },
        }
    }
}

/// Externally visible job status.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "lowercase")]
pub enum JobStatus {
    Pending,
    Running,
    Succeeded { preview: String },
    Failed { reason: String },
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            JobStatus::Pending => write!(f, "pending"),
            JobStatus::Running => write!(f, "running"),
            JobStatus::Succeeded { preview } => write!(f, "succeeded: {}", preview),
            JobStatus::Failed { reason } => write!(f, "failed: {}", reason),
        }
    }
}

/// Result of running one tool invocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "value", rename_all = "lowercase")]
pub enum Outcome {
    /// Finished successfully within the wait budget.
    Result(String),
    /// Still running when the wait budget ran out.
    Deferred(String),
    Failure(String),
}

impl Outcome {
    pub fn is_deferred(&self) -> bool {
        matches!(self, Outcome::Deferred(_))
    }
}

fn preview(text: &str) -> String {
    let mut chars = text.chars();
    let head: String = chars.by_ref().take(PREVIEW_CHARS).collect();
    if chars.next().is_some() {
        format!("{}...", head)
    } else {
        head
    }
}
