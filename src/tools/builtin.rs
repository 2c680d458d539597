//! In-process tools: web search and job status lookup.

use super::{ToolHandler, ToolSpec};
use crate::error::{AgentError, Result};
use crate::queue::JobQueue;
use async_trait::async_trait;
use serde::Serialize;
use serde_json::{json, Map, Value};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, instrument};

const MAX_SEARCH_RESULTS: usize = 5;

fn required_str<'a>(arguments: &'a Map<String, Value>, key: &str) -> Result<&'a str> {
    arguments
        .get(key)
        .and_then(|v| v.as_str())
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| AgentError::InvalidInput(format!("Missing '{}' argument", key)))
}

/// A single web search hit.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchHit {
    pub title: String,
    pub url: String,
    pub snippet: String,
}

/// Web search through the DuckDuckGo instant-answer API.
pub struct WebSearchTool {
    http: reqwest::Client,
    endpoint: String,
}

impl WebSearchTool {
    pub fn new(endpoint: &str) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(15))
            .build()
            .map_err(|e| AgentError::Config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            http,
            endpoint: endpoint.to_string(),
        })
    }

    pub fn spec() -> ToolSpec {
        ToolSpec::new(
            "web_search",
            "Search the web for current information about people, news, facts or events.",
            json!({
                "type": "object",
                "properties": {
                    "query": {
                        "type": "string",
                        "description": "The search query"
                    }
                },
                "required": ["query"]
            }),
        )
    }

    #[instrument(skip(self))]
    pub async fn search(&self, query: &str) -> Result<Vec<SearchHit>> {
        let url = url::Url::parse_with_params(
            &self.endpoint,
            &[
                ("q", query),
                ("format", "json"),
                ("no_html", "1"),
                ("skip_disambig", "1"),
            ],
        )
        .map_err(|e| AgentError::Config(format!("Invalid web search endpoint: {}", e)))?;

        let data: Value = self
            .http
            .get(url)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        let hits = parse_instant_answer(&data, MAX_SEARCH_RESULTS);
        debug!("Web search returned {} hits", hits.len());
        Ok(hits)
    }
}

/// Extract hits from an instant-answer response: the abstract first, then related topics.
fn parse_instant_answer(data: &Value, max_results: usize) -> Vec<SearchHit> {
    let str_field = |v: &Value, key: &str| v.get(key).and_then(|s| s.as_str()).unwrap_or("").to_string();
    let mut hits = Vec::new();

    let abstract_text = str_field(data, "AbstractText");
    if !abstract_text.is_empty() {
        let heading = str_field(data, "Heading");
        hits.push(SearchHit {
            title: if heading.is_empty() { "Result".to_string() } else { heading },
            url: str_field(data, "AbstractURL"),
            snippet: abstract_text,
        });
    }

    let answer = str_field(data, "Answer");
    if !answer.is_empty() {
        hits.push(SearchHit {
            title: "Answer".to_string(),
            url: String::new(),
            snippet: answer,
        });
    }

    // Related topics may be grouped one level deep under "Topics"
    let mut topics: Vec<&Value> = Vec::new();
    if let Some(related) = data.get("RelatedTopics").and_then(|r| r.as_array()) {
        for topic in related {
            match topic.get("Topics").and_then(|t| t.as_array()) {
                Some(nested) => topics.extend(nested.iter()),
                None => topics.push(topic),
            }
        }
    }

    for topic in topics {
        if hits.len() >= max_results {
            break;
        }
        let text = str_field(topic, "Text");
        if text.is_empty() {
            continue;
        }
        hits.push(SearchHit {
            title: text.chars().take(80).collect(),
            url: str_field(topic, "FirstURL"),
            snippet: text,
        });
    }

    hits.truncate(max_results);
    hits
}

#[async_trait]
impl ToolHandler for WebSearchTool {
    async fn call(&self, _tool: &str, arguments: &Map<String, Value>) -> Result<String> {
        let query = required_str(arguments, "query")?;
        let hits = self.search(query).await?;

        if hits.is_empty() {
            return Ok(format!("No web results found for '{}'.", query));
        }
        Ok(serde_json::to_string(&hits)?)
    }
}

/// Reports the status of a queued job by id.
pub struct JobStatusTool {
    queue: Arc<JobQueue>,
}

impl JobStatusTool {
    pub fn new(queue: Arc<JobQueue>) -> Self {
        Self { queue }
    }

    pub fn spec() -> ToolSpec {
        ToolSpec::new(
            "check_job_status",
            "Check the status of a background job started in an earlier turn. Returns pending, \
            running, succeeded with a result preview, or failed with the reason.",
            json!({
                "type": "object",
                "properties": {
                    "job_id": {
                        "type": "string",
                        "description": "The job id reported earlier"
                    }
                },
                "required": ["job_id"]
            }),
        )
    }
}

#[async_trait]
impl ToolHandler for JobStatusTool {
    async fn call(&self, _tool: &str, arguments: &Map<String, Value>) -> Result<String> {
        let job_id = required_str(arguments, "job_id")?;
        let status = self.queue.status(job_id).await?;
        Ok(format!("Job {}: {}", job_id, status))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queue::{JobQueue, JobStore, QueueOptions};

    #[test]
    fn test_parse_instant_answer() {
        let data = json!({
            "Heading": "Rust",
            "AbstractText": "Rust is a programming language.",
            "AbstractURL": "https://en.wikipedia.org/wiki/Rust",
            "Answer": "",
            "RelatedTopics": [
                {"Text": "Cargo - the Rust package manager", "FirstURL": "https://a"},
                {"Name": "Group", "Topics": [
                    {"Text": "rustc - the compiler", "FirstURL": "https://b"}
                ]},
                {"FirstURL": "https://no-text"}
            ]
        });

        let hits = parse_instant_answer(&data, 5);
        assert_eq!(hits.len(), 3);
        assert_eq!(hits[0].title, "Rust");
        assert_eq!(hits[1].url, "https://a");
        assert_eq!(hits[2].snippet, "rustc - the compiler");

        assert_eq!(parse_instant_answer(&data, 1).len(), 1);
        assert!(parse_instant_answer(&json!({}), 5).is_empty());
    }

    #[tokio::test]
    async fn test_web_search_requires_query() {
        let tool = WebSearchTool::new("https://api.duckduckgo.com/").unwrap();
        let err = tool.call("web_search", &Map::new()).await.unwrap_err();
        assert!(matches!(err, AgentError::InvalidInput(_)));
    }

    #[tokio::test]
    async fn test_job_status_tool() {
        let store = Arc::new(JobStore::in_memory().unwrap());
        let queue = Arc::new(JobQueue::new(store, QueueOptions::default()));
        let job_id = queue.submit("transcript.fetch", &json!({"video_url": "x"})).await.unwrap();

        let tool = JobStatusTool::new(queue);
        let mut args = Map::new();
        args.insert("job_id".to_string(), json!(job_id));
        let text = tool.call("check_job_status", &args).await.unwrap();
        assert_eq!(text, format!("Job {}: pending", job_id));

        args.insert("job_id".to_string(), json!("missing"));
        let err = tool.call("check_job_status", &args).await.unwrap_err();
        assert!(matches!(err, AgentError::JobNotFound(_)));
    }
}
