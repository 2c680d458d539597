//! Consumer side of the queue.

use super::{Job, JobStore};
use crate::config::QueueSettings;
use crate::error::{AgentError, Result};
use async_trait::async_trait;
use futures::FutureExt;
use serde_json::Value;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, error, info, instrument, warn};

const PURGE_INTERVAL: Duration = Duration::from_secs(600);

/// Executes one kind of background task.
#[async_trait]
pub trait TaskHandler: Send + Sync {
    async fn handle(&self, payload: &Value) -> Result<String>;
}

/// Task handlers keyed by task name.
#[derive(Default, Clone)]
pub struct TaskRegistry {
    handlers: HashMap<String, Arc<dyn TaskHandler>>,
}

impl TaskRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, task_name: &str, handler: Arc<dyn TaskHandler>) {
        self.handlers.insert(task_name.to_string(), handler);
    }

    pub fn get(&self, task_name: &str) -> Option<Arc<dyn TaskHandler>> {
        self.handlers.get(task_name).cloned()
    }

    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.handlers.keys().map(String::as_str).collect();
        names.sort();
        names
    }
}

/// Worker-side queue settings.
#[derive(Debug, Clone)]
pub struct WorkerOptions {
    pub poll_interval: Duration,
    pub retry_delay: Duration,
    pub visibility_timeout: Duration,
    pub result_ttl: Duration,
}

impl Default for WorkerOptions {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(500),
            retry_delay: Duration::from_secs(5),
            visibility_timeout: Duration::from_secs(3600),
            result_ttl: Duration::from_secs(24 * 3600),
        }
    }
}

impl From<&QueueSettings> for WorkerOptions {
    fn from(settings: &QueueSettings) -> Self {
        Self {
            poll_interval: settings.worker_poll_interval(),
            retry_delay: settings.retry_delay(),
            visibility_timeout: settings.visibility_timeout(),
            result_ttl: settings.result_ttl(),
        }
    }
}

/// Runs queued jobs one at a time.
pub struct Worker {
    store: Arc<JobStore>,
    tasks: TaskRegistry,
    options: WorkerOptions,
}

impl Worker {
    pub fn new(store: Arc<JobStore>, tasks: TaskRegistry, options: WorkerOptions) -> Self {
        Self {
            store,
            tasks,
            options,
        }
    }

    /// Claim and execute at most one job. Returns whether a job was processed.
    pub async fn run_once(&self) -> Result<bool> {
        self.store.requeue_expired()?;

        let Some(job) = self.store.claim_next(self.options.visibility_timeout)? else {
            return Ok(false);
        };

        self.execute(job).await?;
        Ok(true)
    }

    #[instrument(skip(self, job), fields(job_id = %job.id, task = %job.task_name, attempt = job.attempts))]
    async fn execute(&self, job: Job) -> Result<()> {
        let Some(handler) = self.tasks.get(&job.task_name) else {
            let err = AgentError::UnknownTask(job.task_name.clone());
            error!("{}", err);
            return self.store.fail(&job.id, &err.to_string());
        };

        info!("Running job");
        let started = Instant::now();
        let payload = job.payload.clone();

        // Spawned so a panicking handler surfaces as a JoinError instead of taking the worker down
        let joined = tokio::spawn(async move { handler.handle(&payload).await }).await;

        match joined {
            Ok(Ok(result)) => {
                info!("Job succeeded in {:.1}s", started.elapsed().as_secs_f64());
                self.store.complete(&job.id, &result)
            }
            Ok(Err(e)) => self.settle_failure(&job, &e.to_string(), e.is_transient()),
            Err(join_error) => {
                let reason = if join_error.is_panic() {
                    "task panicked".to_string()
                } else {
                    format!("task aborted: {}", join_error)
                };
                self.settle_failure(&job, &reason, true)
            }
        }
    }

    fn settle_failure(&self, job: &Job, reason: &str, transient: bool) -> Result<()> {
        // attempts counts the run that just failed; the first run is not a retry
        let retries_used = job.attempts.saturating_sub(1);

        if transient && retries_used < job.max_retries {
            warn!(
                "Job failed (retry {}/{} in {:?}): {}",
                retries_used + 1,
                job.max_retries,
                self.options.retry_delay,
                reason
            );
            self.store.retry_later(&job.id, reason, self.options.retry_delay)
        } else {
            error!("Job failed permanently: {}", reason);
            self.store.fail(&job.id, reason)
        }
    }

    /// Process jobs until `shutdown` resolves. Shutdown is observed between jobs.
    pub async fn run<F>(&self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);
        info!("Worker started (tasks: {})", self.tasks.names().join(", "));

        let mut last_purge: Option<Instant> = None;

        loop {
            if last_purge.map_or(true, |t| t.elapsed() >= PURGE_INTERVAL) {
                if let Err(e) = self.store.purge_finished(self.options.result_ttl) {
                    warn!("Failed to purge finished jobs: {}", e);
                }
                last_purge = Some(Instant::now());
            }

            let processed = match self.run_once().await {
                Ok(processed) => processed,
                Err(e) => {
                    error!("Worker iteration failed: {}", e);
                    false
                }
            };

            if processed {
                if shutdown.as_mut().now_or_never().is_some() {
                    break;
                }
                continue;
            }

            debug!("Queue idle");
            tokio::select! {
                _ = &mut shutdown => break,
                _ = tokio::time::sleep(self.options.poll_interval) => {}
            }
        }

        info!("Worker stopped");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queue::{JobQueue, JobState, JobStatus, Outcome, QueueOptions};
    use serde_json::json;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct Echo;

    #[async_trait]
    impl TaskHandler for Echo {
        async fn handle(&self, payload: &Value) -> Result<String> {
            Ok(format!("echo {}", payload["text"].as_str().unwrap_or("")))
        }
    }

    /// Fails the first `failures` calls, then succeeds.
    struct Flaky {
        calls: AtomicU32,
        failures: u32,
        permanent: bool,
    }

    #[async_trait]
    impl TaskHandler for Flaky {
        async fn handle(&self, _payload: &Value) -> Result<String> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if call < self.failures {
                if self.permanent {
                    return Err(AgentError::InvalidInput("bad url".into()));
                }
                return Err(AgentError::Transcription(format!("network blip {}", call)));
            }
            Ok("recovered".to_string())
        }
    }

    struct Panics;

    #[async_trait]
    impl TaskHandler for Panics {
        async fn handle(&self, _payload: &Value) -> Result<String> {
            panic!("handler bug");
        }
    }

    fn options() -> WorkerOptions {
        WorkerOptions {
            poll_interval: Duration::from_millis(5),
            retry_delay: Duration::ZERO,
            visibility_timeout: Duration::from_secs(60),
            result_ttl: Duration::from_secs(3600),
        }
    }

    fn setup(task: &str, handler: Arc<dyn TaskHandler>) -> (JobQueue, Worker) {
        let store = Arc::new(JobStore::in_memory().unwrap());
        let mut tasks = TaskRegistry::new();
        tasks.register(task, handler);

        let queue = JobQueue::new(
            store.clone(),
            QueueOptions {
                poll_interval: Duration::from_millis(5),
                max_retries: 3,
            },
        );
        (queue, Worker::new(store, tasks, options()))
    }

    async fn drain(worker: &Worker) {
        while worker.run_once().await.unwrap() {}
    }

    #[tokio::test]
    async fn test_success() {
        let (queue, worker) = setup("echo", Arc::new(Echo));
        let job_id = queue.submit("echo", &json!({"text": "hi"})).await.unwrap();

        assert!(worker.run_once().await.unwrap());
        assert!(!worker.run_once().await.unwrap());

        assert_eq!(
            queue.wait(&job_id, Duration::ZERO).await,
            Outcome::Result("echo hi".to_string())
        );
        assert_eq!(
            queue.status(&job_id).await.unwrap(),
            JobStatus::Succeeded { preview: "echo hi".to_string() }
        );
    }

    #[tokio::test]
    async fn test_transient_failures_are_retried() {
        let flaky = Arc::new(Flaky { calls: AtomicU32::new(0), failures: 2, permanent: false });
        let (queue, worker) = setup("flaky", flaky.clone());
        let job_id = queue.submit("flaky", &json!({})).await.unwrap();

        drain(&worker).await;

        let job = queue.store().get(&job_id).unwrap().unwrap();
        assert_eq!(job.state, JobState::Succeeded);
        assert_eq!(job.attempts, 3);
        assert_eq!(flaky.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_retries_exhausted() {
        let flaky = Arc::new(Flaky { calls: AtomicU32::new(0), failures: u32::MAX, permanent: false });
        let (queue, worker) = setup("flaky", flaky.clone());
        let job_id = queue.submit("flaky", &json!({})).await.unwrap();

        drain(&worker).await;

        // One initial run plus three retries
        assert_eq!(flaky.calls.load(Ordering::SeqCst), 4);
        let status = queue.status(&job_id).await.unwrap();
        assert_eq!(
            status,
            JobStatus::Failed { reason: "Transcription failed: network blip 3".to_string() }
        );
        assert!(matches!(
            queue.wait(&job_id, Duration::ZERO).await,
            Outcome::Failure(reason) if reason.contains("network blip 3")
        ));
    }

    #[tokio::test]
    async fn test_invalid_input_is_not_retried() {
        let flaky = Arc::new(Flaky { calls: AtomicU32::new(0), failures: 1, permanent: true });
        let (queue, worker) = setup("flaky", flaky.clone());
        let job_id = queue.submit("flaky", &json!({})).await.unwrap();

        drain(&worker).await;

        assert_eq!(flaky.calls.load(Ordering::SeqCst), 1);
        assert!(matches!(queue.status(&job_id).await.unwrap(), JobStatus::Failed { .. }));
    }

    #[tokio::test]
    async fn test_panic_counts_as_failure() {
        let (queue, worker) = setup("panics", Arc::new(Panics));
        let job_id = queue.submit("panics", &json!({})).await.unwrap();

        drain(&worker).await;

        let job = queue.store().get(&job_id).unwrap().unwrap();
        assert_eq!(job.state, JobState::Failed);
        assert_eq!(job.attempts, 4);
        assert_eq!(job.error.as_deref(), Some("task panicked"));
    }

    #[tokio::test]
    async fn test_unknown_task_fails_immediately() {
        let (queue, worker) = setup("echo", Arc::new(Echo));
        let job_id = queue.submit("missing.task", &json!({})).await.unwrap();

        drain(&worker).await;

        let job = queue.store().get(&job_id).unwrap().unwrap();
        assert_eq!(job.state, JobState::Failed);
        assert_eq!(job.attempts, 1);
    }

    #[tokio::test]
    async fn test_run_until_shutdown() {
        let (queue, worker) = setup("echo", Arc::new(Echo));
        let (tx, rx) = tokio::sync::oneshot::channel::<()>();

        let handle = tokio::spawn(async move {
            worker
                .run(async {
                    let _ = rx.await;
                })
                .await
        });

        let outcome = queue
            .run("echo", &json!({"text": "bg"}), Duration::from_secs(5))
            .await;
        assert_eq!(outcome, Outcome::Result("echo bg".to_string()));

        tx.send(()).unwrap();
        handle.await.unwrap().unwrap();
    }
}
