//! YouTube transcript acquisition and the background tasks built on it.

mod cache;
mod tasks;
mod transcript;

pub use cache::{CachedTranscript, TranscriptCache};
pub use tasks::{
    register_tasks, search_transcript, SearchMatch, TranscriptSearchTask, TranscriptTask,
    VideoInfo, VideoInfoTask, SEARCH_TASK, TRANSCRIPT_TASK, VIDEO_INFO_TASK,
};
pub use transcript::{parse_vtt, TranscriptProvider, TranscriptService};

use crate::error::{AgentError, Result};
use regex::Regex;
use std::sync::OnceLock;

fn video_id_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"(?x)
            (?:
                # Full YouTube URLs
                (?:https?://)?
                (?:www\.|m\.)?
                (?:youtube\.com/watch\?(?:.*&)?v=|youtube\.com/shorts/|youtu\.be/|youtube\.com/embed/)
                ([a-zA-Z0-9_-]{11})
            )
            |
            # Bare video ID (11 characters)
            ^([a-zA-Z0-9_-]{11})$
        ",
        )
        .expect("Invalid regex")
    })
}

/// Extract the video id from a YouTube URL or bare id.
pub fn extract_video_id(input: &str) -> Option<String> {
    let caps = video_id_regex().captures(input.trim())?;

    caps.get(1)
        .or_else(|| caps.get(2))
        .map(|m| m.as_str().to_string())
}

/// Normalise any supported URL format to `https://www.youtube.com/watch?v=<id>`.
pub fn normalize_video_url(input: &str) -> Result<String> {
    let video_id = extract_video_id(input)
        .ok_or_else(|| AgentError::InvalidInput(format!("Invalid YouTube URL: {}", input)))?;
    Ok(watch_url(&video_id))
}

pub fn watch_url(video_id: &str) -> String {
    format!("https://www.youtube.com/watch?v={}", video_id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_video_id() {
        let cases = [
            "https://www.youtube.com/watch?v=dQw4w9WgXcQ",
            "https://youtube.com/watch?v=dQw4w9WgXcQ&t=42",
            "https://www.youtube.com/watch?feature=share&v=dQw4w9WgXcQ",
            "https://youtube.com/shorts/dQw4w9WgXcQ",
            "https://youtu.be/dQw4w9WgXcQ?si=abc",
            "https://www.youtube.com/embed/dQw4w9WgXcQ",
            "youtube.com/watch?v=dQw4w9WgXcQ",
            "dQw4w9WgXcQ",
        ];
        for case in cases {
            assert_eq!(extract_video_id(case).as_deref(), Some("dQw4w9WgXcQ"), "{}", case);
        }

        assert_eq!(extract_video_id("https://vimeo.com/12345"), None);
        assert_eq!(extract_video_id("not a url"), None);
    }

    #[test]
    fn test_normalize_video_url() {
        assert_eq!(
            normalize_video_url("https://youtu.be/dQw4w9WgXcQ").unwrap(),
            "https://www.youtube.com/watch?v=dQw4w9WgXcQ"
        );
        assert!(matches!(
            normalize_video_url("https://example.com"),
            Err(AgentError::InvalidInput(_))
        ));
    }
}
