//! Transcript acquisition: YouTube auto-subtitles first, Whisper on the audio as fallback.

use super::{extract_video_id, watch_url, TranscriptCache};
use crate::error::{AgentError, Result};
use crate::openai::create_client;
use async_openai::config::OpenAIConfig;
use async_openai::types::{AudioInput, AudioResponseFormat, CreateTranscriptionRequestArgs};
use async_openai::Client;
use async_trait::async_trait;
use regex::Regex;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::{Arc, OnceLock};
use tokio::process::Command;
use tracing::{debug, info, instrument, warn};

/// Anything that can produce the plain-text transcript of a video.
#[async_trait]
pub trait TranscriptProvider: Send + Sync {
    async fn transcript(&self, video_url: &str) -> Result<String>;
}

/// Fetches transcripts with `yt-dlp`, transcribing audio through Whisper when no subtitles exist.
pub struct TranscriptService {
    cache: Option<Arc<TranscriptCache>>,
    whisper: Option<Client<OpenAIConfig>>,
    whisper_model: String,
    language: String,
    temp_dir: PathBuf,
}

impl TranscriptService {
    pub fn new(language: &str, temp_dir: PathBuf) -> Self {
        Self {
            cache: None,
            whisper: None,
            whisper_model: "whisper-1".to_string(),
            language: language.to_string(),
            temp_dir,
        }
    }

    pub fn with_cache(mut self, cache: Arc<TranscriptCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Enable the Whisper fallback. Fails when no API key is configured.
    pub fn with_whisper(mut self, model: &str) -> Result<Self> {
        self.whisper = Some(create_client()?);
        self.whisper_model = model.to_string();
        Ok(self)
    }

    #[instrument(skip(self, work_dir))]
    async fn fetch_subtitles(&self, url: &str, work_dir: &Path) -> Result<Option<String>> {
        let template = work_dir.join("subtitles.%(ext)s");

        let result = Command::new("yt-dlp")
            .arg("--write-auto-subs")
            .arg("--write-subs")
            .arg("--sub-langs").arg(&self.language)
            .arg("--sub-format").arg("vtt")
            .arg("--skip-download")
            .arg("--no-playlist")
            .arg("--quiet")
            .arg("--no-warnings")
            .arg("--output").arg(&template)
            .arg(url)
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .output()
            .await;

        let output = match result {
            Ok(o) => o,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(AgentError::ToolNotFound("yt-dlp".into()));
            }
            Err(e) => {
                return Err(AgentError::VideoSource(format!("yt-dlp execution failed: {e}")));
            }
        };

        if !output.status.success() {
            // Missing subtitles are expected for many videos
            let stderr = String::from_utf8_lossy(&output.stderr);
            warn!("Subtitle download failed: {}", stderr.trim());
            return Ok(None);
        }

        let suffix = format!(".{}.vtt", self.language);
        let Some(path) = find_file(work_dir, |name| name.ends_with(&suffix))? else {
            debug!("No {} subtitles available", self.language);
            return Ok(None);
        };

        let raw = tokio::fs::read_to_string(&path).await?;
        let text = parse_vtt(&raw);
        Ok(if text.is_empty() { None } else { Some(text) })
    }

    #[instrument(skip(self, work_dir))]
    async fn transcribe_audio(&self, url: &str, work_dir: &Path) -> Result<String> {
        let client = self.whisper.as_ref().ok_or_else(|| {
            AgentError::Transcription("no subtitles found and Whisper fallback is disabled".into())
        })?;

        let audio_path = download_audio(url, work_dir).await?;
        info!("Transcribing {:?} with {}", audio_path, self.whisper_model);

        let file_bytes = tokio::fs::read(&audio_path).await?;
        let request = CreateTranscriptionRequestArgs::default()
            .file(AudioInput::from_vec_u8("audio.mp3".to_string(), file_bytes))
            .model(&self.whisper_model)
            .language(&self.language)
            .response_format(AudioResponseFormat::Json)
            .build()
            .map_err(|e| AgentError::Transcription(format!("Failed to build request: {}", e)))?;

        let response = client
            .audio()
            .transcribe(request)
            .await
            .map_err(|e| AgentError::OpenAI(format!("Whisper API error: {}", e)))?;

        Ok(response.text.trim().to_string())
    }
}

#[async_trait]
impl TranscriptProvider for TranscriptService {
    async fn transcript(&self, video_url: &str) -> Result<String> {
        let video_id = extract_video_id(video_url)
            .ok_or_else(|| AgentError::InvalidInput(format!("Invalid YouTube URL: {}", video_url)))?;

        if let Some(cache) = &self.cache {
            if let Some(text) = cache.get(&video_id)? {
                info!("Using cached transcript for {}", video_id);
                return Ok(text);
            }
        }

        std::fs::create_dir_all(&self.temp_dir)?;
        let work_dir = tempfile::tempdir_in(&self.temp_dir)?;
        let url = watch_url(&video_id);

        let (text, source) = match self.fetch_subtitles(&url, work_dir.path()).await? {
            Some(text) => (text, "subtitles"),
            None => {
                info!("No subtitles for {}, falling back to audio transcription", video_id);
                (self.transcribe_audio(&url, work_dir.path()).await?, "whisper")
            }
        };

        info!(
            "Transcript for {} ready from {} ({} chars)",
            video_id,
            source,
            text.chars().count()
        );

        if let Some(cache) = &self.cache {
            if let Err(e) = cache.put(&video_id, source, &text) {
                warn!("Failed to cache transcript for {}: {}", video_id, e);
            }
        }
        Ok(text)
    }
}

/// Download the audio track as MP3 into `work_dir`.
async fn download_audio(url: &str, work_dir: &Path) -> Result<PathBuf> {
    let template = work_dir.join("audio.%(ext)s");

    // Low bitrate keeps long videos under the Whisper upload limit
    let result = Command::new("yt-dlp")
        .arg("--format").arg("bestaudio/best")
        .arg("--extract-audio")
        .arg("--audio-format").arg("mp3")
        .arg("--audio-quality").arg("7")
        .arg("--output").arg(&template)
        .arg("--no-playlist")
        .arg("--quiet")
        .arg("--no-warnings")
        .arg(url)
        .stdout(Stdio::null())
        .stderr(Stdio::piped())
        .output()
        .await;

    let output = match result {
        Ok(o) => o,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(AgentError::ToolNotFound("yt-dlp".into()));
        }
        Err(e) => {
            return Err(AgentError::AudioDownload(format!("yt-dlp execution failed: {e}")));
        }
    };

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(AgentError::AudioDownload(format!("yt-dlp failed: {stderr}")));
    }

    find_file(work_dir, |name| name.ends_with(".mp3"))?
        .ok_or_else(|| AgentError::AudioDownload("MP3 audio file not found after download".into()))
}

fn find_file(dir: &Path, matches: impl Fn(&str) -> bool) -> Result<Option<PathBuf>> {
    for entry in std::fs::read_dir(dir)?.flatten() {
        if matches(&entry.file_name().to_string_lossy()) {
            return Ok(Some(entry.path()));
        }
    }
    Ok(None)
}

fn tag_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"<[^>]+>").expect("Invalid regex"))
}

/// Extract the spoken text from a WebVTT subtitle file.
///
/// Header, cue timing and numeric cue-id lines are dropped, inline tags are removed,
/// and consecutive repeats (auto-subtitles roll each line twice) are collapsed.
pub fn parse_vtt(raw: &str) -> String {
    let mut lines: Vec<String> = Vec::new();

    for line in raw.lines() {
        let line = line.trim();
        if line.is_empty()
            || line.starts_with("WEBVTT")
            || line.starts_with("Kind:")
            || line.starts_with("Language:")
            || line.starts_with("NOTE")
            || line.contains("-->")
            || line.chars().all(|c| c.is_ascii_digit())
        {
            continue;
        }

        let cleaned = tag_regex().replace_all(line, "");
        let cleaned = cleaned.trim();
        if cleaned.is_empty() || lines.last().map(String::as_str) == Some(cleaned) {
            continue;
        }
        lines.push(cleaned.to_string());
    }

    lines.join(" ")
}
