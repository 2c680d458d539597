//! SQLite-backed job table.

use super::{Job, JobState};
use crate::error::{AgentError, Result};
use chrono::{DateTime, Utc};
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row, TransactionBehavior};
use serde_json::Value;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS jobs (
    id TEXT PRIMARY KEY,
    task_name TEXT NOT NULL,
    payload TEXT NOT NULL,
    state TEXT NOT NULL,
    attempts INTEGER NOT NULL DEFAULT 0,
    max_retries INTEGER NOT NULL,
    result TEXT,
    error TEXT,
    idempotency_key TEXT NOT NULL,
    available_at INTEGER NOT NULL,
    lease_until INTEGER,
    created_at INTEGER NOT NULL,
    updated_at INTEGER NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_jobs_claim ON jobs(state, available_at);
CREATE INDEX IF NOT EXISTS idx_jobs_idempotency ON jobs(idempotency_key);
"#;

const JOB_COLUMNS: &str = "id, task_name, payload, state, attempts, max_retries, result, error, \
                           idempotency_key, available_at, created_at, updated_at";

/// Durable job storage. Every state transition is a single SQL statement or transaction.
pub struct JobStore {
    conn: Mutex<Connection>,
}

fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}

fn millis(duration: Duration) -> i64 {
    i64::try_from(duration.as_millis()).unwrap_or(i64::MAX)
}

fn to_datetime(ms: i64) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(ms).unwrap_or_default()
}

fn job_from_row(row: &Row<'_>) -> rusqlite::Result<Job> {
    let payload: String = row.get(2)?;
    let state: String = row.get(3)?;

    Ok(Job {
        id: row.get(0)?,
        task_name: row.get(1)?,
        payload: serde_json::from_str::<Value>(&payload)
            .map_err(|e| rusqlite::Error::FromSqlConversionFailure(2, Type::Text, Box::new(e)))?,
        state: JobState::parse(&state).ok_or_else(|| {
            rusqlite::Error::InvalidColumnType(3, format!("state '{}'", state), Type::Text)
        })?,
        attempts: row.get(4)?,
        max_retries: row.get(5)?,
        result: row.get(6)?,
        error: row.get(7)?,
        idempotency_key: row.get(8)?,
        available_at: to_datetime(row.get(9)?),
        created_at: to_datetime(row.get(10)?),
        updated_at: to_datetime(row.get(11)?),
    })
}

impl JobStore {
    /// Open (or create) the job database at `path`.
    #[instrument(skip_all)]
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(path)?;
        // Producer and worker processes share this file
        conn.execute_batch("PRAGMA journal_mode=WAL;")?;
        conn.busy_timeout(Duration::from_secs(5))?;
        conn.execute_batch(SCHEMA)?;

        info!("Opened job store at {:?}", path);

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Create an in-memory job store (useful for testing).
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(SCHEMA)?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| AgentError::Queue(format!("Failed to acquire lock: {}", e)))
    }

    /// Insert a pending job, or return the live job with the same idempotency key.
    ///
    /// Returns the job and whether it already existed. Failed jobs are never reused.
    #[instrument(skip(self, payload))]
    pub fn insert_or_reuse(
        &self,
        task_name: &str,
        payload: &Value,
        idempotency_key: &str,
        max_retries: u32,
    ) -> Result<(Job, bool)> {
        let mut conn = self.lock()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let existing = tx
            .query_row(
                &format!(
                    "SELECT {} FROM jobs
                     WHERE idempotency_key = ?1 AND state != 'failed'
                     ORDER BY created_at DESC LIMIT 1",
                    JOB_COLUMNS
                ),
                params![idempotency_key],
                job_from_row,
            )
            .optional()?;

        if let Some(job) = existing {
            tx.commit()?;
            debug!("Reusing job {} ({})", job.id, job.state.as_str());
            return Ok((job, true));
        }

        let id = uuid::Uuid::new_v4().to_string();
        let now = now_millis();
        tx.execute(
            r#"
            INSERT INTO jobs
            (id, task_name, payload, state, attempts, max_retries, idempotency_key,
             available_at, created_at, updated_at)
            VALUES (?1, ?2, ?3, 'pending', 0, ?4, ?5, ?6, ?6, ?6)
            "#,
            params![
                id,
                task_name,
                payload.to_string(),
                max_retries,
                idempotency_key,
                now
            ],
        )?;
        tx.commit()?;

        debug!("Inserted job {} for task {}", id, task_name);

        Ok((
            Job {
                id,
                task_name: task_name.to_string(),
                payload: payload.clone(),
                state: JobState::Pending,
                attempts: 0,
                max_retries,
                result: None,
                error: None,
                idempotency_key: idempotency_key.to_string(),
                available_at: to_datetime(now),
                created_at: to_datetime(now),
                updated_at: to_datetime(now),
            },
            false,
        ))
    }

    pub fn get(&self, id: &str) -> Result<Option<Job>> {
        let conn = self.lock()?;
        let job = conn
            .query_row(
                &format!("SELECT {} FROM jobs WHERE id = ?1", JOB_COLUMNS),
                params![id],
                job_from_row,
            )
            .optional()?;
        Ok(job)
    }

    /// Atomically move the oldest available pending job to running.
    ///
    /// The claim holds a lease of `lease`; an expired lease makes the job claimable again.
    pub fn claim_next(&self, lease: Duration) -> Result<Option<Job>> {
        let mut conn = self.lock()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let now = now_millis();

        let id: Option<String> = tx
            .query_row(
                "SELECT id FROM jobs
                 WHERE state = 'pending' AND available_at <= ?1
                 ORDER BY available_at, created_at LIMIT 1",
                params![now],
                |row| row.get(0),
            )
            .optional()?;

        let Some(id) = id else {
            tx.commit()?;
            return Ok(None);
        };

        tx.execute(
            "UPDATE jobs
             SET state = 'running', attempts = attempts + 1, lease_until = ?2, updated_at = ?3
             WHERE id = ?1",
            params![id, now.saturating_add(millis(lease)), now],
        )?;

        let job = tx.query_row(
            &format!("SELECT {} FROM jobs WHERE id = ?1", JOB_COLUMNS),
            params![id],
            job_from_row,
        )?;
        tx.commit()?;

        debug!("Claimed job {} (attempt {})", job.id, job.attempts);
        Ok(Some(job))
    }

    pub fn complete(&self, id: &str, result: &str) -> Result<()> {
        let conn = self.lock()?;
        conn.execute(
            "UPDATE jobs
             SET state = 'succeeded', result = ?2, error = NULL, lease_until = NULL, updated_at = ?3
             WHERE id = ?1",
            params![id, result, now_millis()],
        )?;
        Ok(())
    }

    /// Put a failed attempt back in the queue after `delay`.
    pub fn retry_later(&self, id: &str, error: &str, delay: Duration) -> Result<()> {
        let conn = self.lock()?;
        let now = now_millis();
        conn.execute(
            "UPDATE jobs
             SET state = 'pending', error = ?2, available_at = ?3, lease_until = NULL, updated_at = ?4
             WHERE id = ?1",
            params![id, error, now.saturating_add(millis(delay)), now],
        )?;
        Ok(())
    }

    pub fn fail(&self, id: &str, error: &str) -> Result<()> {
        let conn = self.lock()?;
        conn.execute(
            "UPDATE jobs
             SET state = 'failed', error = ?2, lease_until = NULL, updated_at = ?3
             WHERE id = ?1",
            params![id, error, now_millis()],
        )?;
        Ok(())
    }

    /// Recover running jobs whose worker lease expired.
    ///
    /// Jobs with retries left go back to pending; the rest fail.
    pub fn requeue_expired(&self) -> Result<usize> {
        let conn = self.lock()?;
        let now = now_millis();

        let failed = conn.execute(
            "UPDATE jobs
             SET state = 'failed', error = 'worker lease expired', lease_until = NULL, updated_at = ?1
             WHERE state = 'running' AND lease_until < ?1 AND attempts > max_retries",
            params![now],
        )?;
        let requeued = conn.execute(
            "UPDATE jobs
             SET state = 'pending', available_at = ?1, lease_until = NULL, updated_at = ?1
             WHERE state = 'running' AND lease_until < ?1",
            params![now],
        )?;

        if failed + requeued > 0 {
            warn!(
                "Recovered {} expired jobs ({} requeued, {} failed)",
                failed + requeued,
                requeued,
                failed
            );
        }
        Ok(requeued + failed)
    }

    /// Delete terminal jobs last updated more than `older_than` ago.
    pub fn purge_finished(&self, older_than: Duration) -> Result<usize> {
        let conn = self.lock()?;
        let cutoff = now_millis().saturating_sub(millis(older_than));
        let deleted = conn.execute(
            "DELETE FROM jobs WHERE state IN ('succeeded', 'failed') AND updated_at < ?1",
            params![cutoff],
        )?;

        if deleted > 0 {
            info!("Purged {} finished jobs", deleted);
        }
        Ok(deleted)
    }

    /// Most recently created jobs first.
    pub fn list_recent(&self, limit: usize) -> Result<Vec<Job>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM jobs ORDER BY created_at DESC LIMIT ?1",
            JOB_COLUMNS
        ))?;

        let jobs = stmt
            .query_map(params![limit as i64], job_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(jobs)
    }

    /// Number of jobs in each state.
    pub fn counts(&self) -> Result<Vec<(JobState, usize)>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare("SELECT state, COUNT(*) FROM jobs GROUP BY state ORDER BY state")?;

        let rows = stmt.query_map([], |row| {
            let state: String = row.get(0)?;
            let count: i64 = row.get(1)?;
            Ok((state, count))
        })?;

        let mut counts = Vec::new();
        for row in rows {
            let (state, count) = row?;
            if let Some(state) = JobState::parse(&state) {
                counts.push((state, count as usize));
            }
        }
        Ok(counts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_insert_and_claim() {
        let store = JobStore::in_memory().unwrap();
        let (job, reused) = store
            .insert_or_reuse("transcript.fetch", &json!({"video_url": "a"}), "k1", 3)
            .unwrap();
        assert!(!reused);
        assert_eq!(job.state, JobState::Pending);

        let claimed = store.claim_next(Duration::from_secs(60)).unwrap().unwrap();
        assert_eq!(claimed.id, job.id);
        assert_eq!(claimed.state, JobState::Running);
        assert_eq!(claimed.attempts, 1);
        assert_eq!(claimed.payload["video_url"], "a");

        // Nothing else to claim
        assert!(store.claim_next(Duration::from_secs(60)).unwrap().is_none());

        store.complete(&job.id, "done").unwrap();
        let finished = store.get(&job.id).unwrap().unwrap();
        assert_eq!(finished.state, JobState::Succeeded);
        assert_eq!(finished.result.as_deref(), Some("done"));
    }

    #[test]
    fn test_reuse_skips_failed_jobs() {
        let store = JobStore::in_memory().unwrap();
        let (first, _) = store.insert_or_reuse("t", &json!({}), "same", 3).unwrap();
        let (again, reused) = store.insert_or_reuse("t", &json!({}), "same", 3).unwrap();
        assert!(reused);
        assert_eq!(first.id, again.id);

        store.fail(&first.id, "broken").unwrap();
        let (fresh, reused) = store.insert_or_reuse("t", &json!({}), "same", 3).unwrap();
        assert!(!reused);
        assert_ne!(fresh.id, first.id);
    }

    #[test]
    fn test_retry_later_delays_claim() {
        let store = JobStore::in_memory().unwrap();
        let (job, _) = store.insert_or_reuse("t", &json!({}), "k", 3).unwrap();
        store.claim_next(Duration::from_secs(60)).unwrap().unwrap();

        store.retry_later(&job.id, "flaky", Duration::from_secs(60)).unwrap();
        let pending = store.get(&job.id).unwrap().unwrap();
        assert_eq!(pending.state, JobState::Pending);
        assert_eq!(pending.error.as_deref(), Some("flaky"));
        assert!(store.claim_next(Duration::from_secs(60)).unwrap().is_none());

        store.retry_later(&job.id, "flaky", Duration::ZERO).unwrap();
        let again = store.claim_next(Duration::from_secs(60)).unwrap().unwrap();
        assert_eq!(again.attempts, 2);
    }

    #[test]
    fn test_requeue_expired_lease() {
        let store = JobStore::in_memory().unwrap();
        let (job, _) = store.insert_or_reuse("t", &json!({}), "k", 3).unwrap();
        store.claim_next(Duration::ZERO).unwrap().unwrap();
        std::thread::sleep(Duration::from_millis(5));

        assert_eq!(store.requeue_expired().unwrap(), 1);
        assert_eq!(store.get(&job.id).unwrap().unwrap().state, JobState::Pending);
    }

    #[test]
    fn test_expired_lease_without_retries_fails() {
        let store = JobStore::in_memory().unwrap();
        let (job, _) = store.insert_or_reuse("t", &json!({}), "k", 0).unwrap();
        store.claim_next(Duration::ZERO).unwrap().unwrap();
        std::thread::sleep(Duration::from_millis(5));

        store.requeue_expired().unwrap();
        let failed = store.get(&job.id).unwrap().unwrap();
        assert_eq!(failed.state, JobState::Failed);
        assert_eq!(failed.error.as_deref(), Some("worker lease expired"));
    }

    #[test]
    fn test_purge_and_counts() {
        let store = JobStore::in_memory().unwrap();
        let (done, _) = store.insert_or_reuse("t", &json!({"n": 1}), "a", 3).unwrap();
        store.insert_or_reuse("t", &json!({"n": 2}), "b", 3).unwrap();
        store.complete(&done.id, "ok").unwrap();
        std::thread::sleep(Duration::from_millis(5));

        assert_eq!(store.purge_finished(Duration::from_secs(3600)).unwrap(), 0);
        assert_eq!(store.purge_finished(Duration::ZERO).unwrap(), 1);
        assert!(store.get(&done.id).unwrap().is_none());

        assert_eq!(store.counts().unwrap(), vec![(JobState::Pending, 1)]);
        assert_eq!(store.list_recent(10).unwrap().len(), 1);
    }

    #[test]
    fn test_open_on_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("jobs.db");

        let id = {
            let store = JobStore::open(&path).unwrap();
            store.insert_or_reuse("t", &json!({}), "k", 3).unwrap().0.id
        };

        let reopened = JobStore::open(&path).unwrap();
        assert!(reopened.get(&id).unwrap().is_some());
    }
}
