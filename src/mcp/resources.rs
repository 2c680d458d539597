//! Transcripts exposed as MCP resources under `transcript://<video_id>`.

use super::protocol::{Resource, ResourceContents, ResourceTemplate};
use crate::error::{AgentError, Result};
use crate::queue::{JobQueue, Outcome};
use crate::youtube::{extract_video_id, watch_url, TranscriptCache, TRANSCRIPT_TASK};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, instrument};

const SCHEME: &str = "transcript://";
const MIME_TYPE: &str = "text/markdown";

/// Result of reading a transcript resource.
#[derive(Debug)]
pub enum ResourceRead {
    Ready(ResourceContents),
    /// The transcript is still being fetched by this job.
    Pending(String),
}

/// Serves transcripts through the job queue, listing those already cached.
pub struct TranscriptResources {
    queue: Arc<JobQueue>,
    cache: Option<Arc<TranscriptCache>>,
}

impl TranscriptResources {
    pub fn new(queue: Arc<JobQueue>) -> Self {
        Self { queue, cache: None }
    }

    /// List cached transcripts in `resources/list`.
    pub fn with_cache(mut self, cache: Arc<TranscriptCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn templates(&self) -> Vec<ResourceTemplate> {
        vec![ResourceTemplate {
            uri_template: format!("{}{{video_id}}", SCHEME),
            name: "YouTube transcript".to_string(),
            description: Some(
                "Full transcript of a YouTube video with length and word count".to_string(),
            ),
            mime_type: Some(MIME_TYPE.to_string()),
        }]
    }

    pub fn list(&self) -> Result<Vec<Resource>> {
        let Some(cache) = &self.cache else {
            return Ok(Vec::new());
        };

        Ok(cache
            .list()?
            .into_iter()
            .map(|t| Resource {
                uri: resource_uri(&t.video_id),
                name: format!("Transcript {}", t.video_id),
                description: Some(format!(
                    "{} characters from {}, fetched {}",
                    t.char_count,
                    t.source,
                    t.fetched_at.to_rfc3339()
                )),
                mime_type: Some(MIME_TYPE.to_string()),
            })
            .collect())
    }

    /// Fetch the transcript behind `uri`, waiting at most `budget`.
    #[instrument(skip(self))]
    pub async fn read(&self, uri: &str, budget: Duration) -> Result<ResourceRead> {
        let video_id = parse_uri(uri)?;
        let url = watch_url(&video_id);

        match self
            .queue
            .run(TRANSCRIPT_TASK, &json!({ "video_url": url }), budget)
            .await
        {
            Outcome::Result(transcript) => {
                info!("Loaded transcript resource for {}", video_id);
                Ok(ResourceRead::Ready(ResourceContents {
                    uri: uri.to_string(),
                    mime_type: Some(MIME_TYPE.to_string()),
                    text: render(&video_id, &url, &transcript),
                }))
            }
            Outcome::Deferred(job_id) => Ok(ResourceRead::Pending(job_id)),
            Outcome::Failure(reason) => Err(AgentError::ToolFailed(reason)),
        }
    }
}

pub fn resource_uri(video_id: &str) -> String {
    format!("{}{}", SCHEME, video_id)
}

fn parse_uri(uri: &str) -> Result<String> {
    uri.strip_prefix(SCHEME)
        .filter(|id| extract_video_id(id).as_deref() == Some(*id))
        .map(str::to_string)
        .ok_or_else(|| AgentError::InvalidInput(format!("Unknown resource: {}", uri)))
}

fn render(video_id: &str, url: &str, transcript: &str) -> String {
    format!(
        "# YouTube Transcript: {}\n\nVideo URL: {}\nTranscript Length: {} characters\nWord Count: {} words\n\n---\n\n{}\n",
        video_id,
        url,
        transcript.chars().count(),
        transcript.split_whitespace().count(),
        transcript
    )
}
