//! Worker task handlers behind the YouTube tools.

use super::{extract_video_id, normalize_video_url, TranscriptProvider};
use crate::error::{AgentError, Result};
use crate::queue::{TaskHandler, TaskRegistry};
use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use tracing::info;

pub const TRANSCRIPT_TASK: &str = "transcript.fetch";
pub const VIDEO_INFO_TASK: &str = "video.info";
pub const SEARCH_TASK: &str = "transcript.search";

const WORDS_PER_MINUTE: f64 = 200.0;
const DEFAULT_CONTEXT_CHARS: usize = 200;
const MAX_CONTEXT_CHARS: usize = 5_000;

fn required_str<'a>(payload: &'a Value, key: &str) -> Result<&'a str> {
    payload
        .get(key)
        .and_then(|v| v.as_str())
        .filter(|s| !s.trim().is_empty())
        .ok_or_else(|| AgentError::InvalidInput(format!("Missing '{}' argument", key)))
}

/// Register all YouTube task handlers against one transcript provider.
pub fn register_tasks(registry: &mut TaskRegistry, provider: Arc<dyn TranscriptProvider>) {
    registry.register(TRANSCRIPT_TASK, Arc::new(TranscriptTask::new(provider.clone())));
    registry.register(VIDEO_INFO_TASK, Arc::new(VideoInfoTask::new(provider.clone())));
    registry.register(SEARCH_TASK, Arc::new(TranscriptSearchTask::new(provider)));
}

/// Returns the full transcript.
pub struct TranscriptTask {
    provider: Arc<dyn TranscriptProvider>,
}

impl TranscriptTask {
    pub fn new(provider: Arc<dyn TranscriptProvider>) -> Self {
        Self { provider }
    }
}

#[async_trait]
impl TaskHandler for TranscriptTask {
    async fn handle(&self, payload: &Value) -> Result<String> {
        let url = normalize_video_url(required_str(payload, "video_url")?)?;
        self.provider.transcript(&url).await
    }
}

/// Transcript statistics.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VideoInfo {
    pub video_id: String,
    pub video_url: String,
    pub word_count: usize,
    pub char_count: usize,
    pub estimated_read_time_minutes: f64,
    pub estimated_tokens: usize,
}

impl VideoInfo {
    pub fn from_transcript(video_id: &str, video_url: &str, transcript: &str) -> Self {
        let words = transcript.split_whitespace().count();
        let chars = transcript.chars().count();

        Self {
            video_id: video_id.to_string(),
            video_url: video_url.to_string(),
            word_count: words,
            char_count: chars,
            estimated_read_time_minutes: (words as f64 / WORDS_PER_MINUTE * 10.0).round() / 10.0,
            // Rough approximation of four characters per token
            estimated_tokens: chars / 4,
        }
    }
}

/// Returns transcript statistics as JSON.
pub struct VideoInfoTask {
    provider: Arc<dyn TranscriptProvider>,
}

impl VideoInfoTask {
    pub fn new(provider: Arc<dyn TranscriptProvider>) -> Self {
        Self { provider }
    }
}

#[async_trait]
impl TaskHandler for VideoInfoTask {
    async fn handle(&self, payload: &Value) -> Result<String> {
        let url = normalize_video_url(required_str(payload, "video_url")?)?;
        let video_id = extract_video_id(&url).unwrap_or_default();

        let transcript = self.provider.transcript(&url).await?;
        let info = VideoInfo::from_transcript(&video_id, &url, &transcript);

        info!(
            "Video analysis complete: {} words, {} chars",
            info.word_count, info.char_count
        );
        Ok(serde_json::to_string(&info)?)
    }
}

/// One case-insensitive occurrence of the query.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchMatch {
    #[serde(rename = "match")]
    pub matched: String,
    pub context: String,
    /// Character offset of the match in the transcript.
    pub position: usize,
}

/// Find every (possibly overlapping) case-insensitive occurrence of `query`.
///
/// Positions and context windows are measured in characters.
pub fn search_transcript(transcript: &str, query: &str, context_chars: usize) -> Vec<SearchMatch> {
    let text: Vec<char> = transcript.chars().collect();
    let folded: Vec<char> = text.iter().map(|c| fold(*c)).collect();
    let needle: Vec<char> = query.chars().map(fold).collect();

    if needle.is_empty() || needle.len() > folded.len() {
        return Vec::new();
    }

    let mut matches = Vec::new();
    for pos in 0..=(folded.len() - needle.len()) {
        if folded[pos..pos + needle.len()] != needle[..] {
            continue;
        }
        let end = pos + needle.len();
        let context_start = pos.saturating_sub(context_chars);
        let context_end = end.saturating_add(context_chars).min(text.len());

        matches.push(SearchMatch {
            matched: text[pos..end].iter().collect(),
            context: text[context_start..context_end].iter().collect(),
            position: pos,
        });
    }
    matches
}

// Single-char lowercase keeps positions aligned with the original text
fn fold(c: char) -> char {
    let mut lower = c.to_lowercase();
    match (lower.next(), lower.next()) {
        (Some(l), None) => l,
        _ => c,
    }
}

fn context_chars(payload: &Value) -> Result<usize> {
    let Some(value) = payload.get("context_chars").filter(|v| !v.is_null()) else {
        return Ok(DEFAULT_CONTEXT_CHARS);
    };

    value
        .as_u64()
        .and_then(|n| usize::try_from(n).ok())
        .filter(|n| *n <= MAX_CONTEXT_CHARS)
        .ok_or_else(|| {
            AgentError::InvalidInput(format!(
                "'context_chars' must be an integer between 0 and {}",
                MAX_CONTEXT_CHARS
            ))
        })
}

/// Returns matching snippets as a JSON array.
pub struct TranscriptSearchTask {
    provider: Arc<dyn TranscriptProvider>,
}

impl TranscriptSearchTask {
    pub fn new(provider: Arc<dyn TranscriptProvider>) -> Self {
        Self { provider }
    }
}

#[async_trait]
impl TaskHandler for TranscriptSearchTask {
    async fn handle(&self, payload: &Value) -> Result<String> {
        let url = normalize_video_url(required_str(payload, "video_url")?)?;
        let query = required_str(payload, "query")?;
        let context_chars = context_chars(payload)?;

        let transcript = self.provider.transcript(&url).await?;
        let matches = search_transcript(&transcript, query, context_chars);

        info!("Found {} matches for '{}'", matches.len(), query);
        Ok(serde_json::to_string(&matches)?)
    }
}
