//! Transcript cache keyed by video id.

use crate::error::{AgentError, Result};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;
use tracing::{debug, info, instrument};

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS transcripts (
    video_id TEXT PRIMARY KEY,
    source TEXT NOT NULL,
    transcript TEXT NOT NULL,
    fetched_at INTEGER NOT NULL
);
"#;

/// Summary of one cached transcript.
#[derive(Debug, Clone, PartialEq)]
pub struct CachedTranscript {
    pub video_id: String,
    pub source: String,
    pub char_count: usize,
    pub fetched_at: DateTime<Utc>,
}

/// SQLite table of fetched transcripts, so repeated tool calls skip the download.
pub struct TranscriptCache {
    conn: Mutex<Connection>,
}

impl TranscriptCache {
    #[instrument(skip_all)]
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA journal_mode=WAL;")?;
        conn.busy_timeout(Duration::from_secs(5))?;
        conn.execute_batch(SCHEMA)?;

        info!("Opened transcript cache at {:?}", path);
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

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
            .map_err(|e| AgentError::Transcription(format!("Failed to acquire lock: {}", e)))
    }

    pub fn get(&self, video_id: &str) -> Result<Option<String>> {
        let conn = self.lock()?;
        let transcript = conn
            .query_row(
                "SELECT transcript FROM transcripts WHERE video_id = ?1",
                params![video_id],
                |row| row.get(0),
            )
            .optional()?;
        Ok(transcript)
    }

    /// Cached transcripts, most recently fetched first.
    pub fn list(&self) -> Result<Vec<CachedTranscript>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT video_id, source, length(transcript), fetched_at
             FROM transcripts ORDER BY fetched_at DESC, video_id",
        )?;

        let rows = stmt.query_map([], |row| {
            let chars: i64 = row.get(2)?;
            let fetched_at: i64 = row.get(3)?;
            Ok(CachedTranscript {
                video_id: row.get(0)?,
                source: row.get(1)?,
                char_count: usize::try_from(chars).unwrap_or_default(),
                fetched_at: DateTime::from_timestamp_millis(fetched_at).unwrap_or_default(),
            })
        })?;

        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    /// Store a transcript; `source` records how it was obtained.
    pub fn put(&self, video_id: &str, source: &str, transcript: &str) -> Result<()> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT OR REPLACE INTO transcripts (video_id, source, transcript, fetched_at)
             VALUES (?1, ?2, ?3, ?4)",
            params![video_id, source, transcript, Utc::now().timestamp_millis()],
        )?;
        debug!("Cached transcript for {} ({} chars)", video_id, transcript.len());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_put_and_get() {
        let cache = TranscriptCache::in_memory().unwrap();
        assert_eq!(cache.get("abc").unwrap(), None);

        cache.put("abc", "subtitles", "hello world").unwrap();
        cache.put("abc", "whisper", "hello again").unwrap();
        assert_eq!(cache.get("abc").unwrap().as_deref(), Some("hello again"));
    }

    #[test]
    fn test_list_counts_characters() {
        let cache = TranscriptCache::in_memory().unwrap();
        assert!(cache.list().unwrap().is_empty());

        cache.put("abc", "subtitles", "héllo").unwrap();
        let listed = cache.list().unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].video_id, "abc");
        assert_eq!(listed[0].source, "subtitles");
        assert_eq!(listed[0].char_count, 5);
    }
}
