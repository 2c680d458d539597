//! Wiring for tubeagent.
//!
//! Builds the job queue, tool registry, executor, agent and worker from settings.
//! The agent side and the worker side share nothing but the SQLite job database.

use crate::agent::{Agent, OpenAiGenerator, ToolExecutor};
use crate::config::{Prompts, Settings};
use crate::conversation::ConversationStore;
use crate::mcp::{McpServer, TranscriptResources};
use crate::error::Result;
use crate::queue::{JobQueue, JobStore, QueueOptions, TaskRegistry, Worker, WorkerOptions};
use crate::tools::{
    register_youtube_tools, JobStatusTool, McpClient, ToolRegistry, ToolRoute, WebSearchTool,
};
use crate::youtube::{register_tasks, TranscriptCache, TranscriptService};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

/// Owns the shared components of one tubeagent process.
pub struct Orchestrator {
    settings: Settings,
    prompts: Prompts,
    store: Arc<JobStore>,
    queue: Arc<JobQueue>,
    executor: Arc<ToolExecutor>,
}

impl Orchestrator {
    /// Open the job database and build the tool catalog.
    pub fn new(settings: Settings) -> Result<Self> {
        let db_path = settings.queue_db_path();
        ensure_parent_dir(&db_path)?;
        let store = Arc::new(JobStore::open(&db_path)?);

        Self::with_store(settings, store)
    }

    /// Build on an already opened job store.
    pub fn with_store(settings: Settings, store: Arc<JobStore>) -> Result<Self> {
        let prompts = Prompts::load(
            settings.prompts.custom_dir.as_deref(),
            Some(&settings.prompts.variables),
        )?;

        let queue = Arc::new(JobQueue::new(store.clone(), QueueOptions::from(&settings.queue)));
        let registry = build_registry(&settings, queue.clone())?;
        info!("Registered {} local tools: {}", registry.len(), registry.names().join(", "));

        let mut executor = ToolExecutor::new(Arc::new(registry)).with_queue(queue.clone());
        if let Some(url) = settings.tools.discovery_url.as_deref().filter(|u| !u.is_empty()) {
            let timeout = Duration::from_secs(settings.tools.discovery_timeout_secs);
            let client = McpClient::new(url, timeout)?;
            info!("Using remote tool server at {}", client.url());
            executor = executor.with_remote(Arc::new(client));
        }

        Ok(Self {
            settings,
            prompts,
            store,
            queue,
            executor: Arc::new(executor),
        })
    }

    /// Create the agent backed by the configured generation endpoint.
    pub fn agent(&self) -> Result<Agent> {
        let generator = OpenAiGenerator::new(&self.settings.generation)?;
        info!("Generation model: {}", generator.model());

        Ok(Agent::new(Arc::new(generator), self.executor.clone(), self.prompts.clone())
            .configure(&self.settings))
    }

    /// Create the worker with every YouTube task registered.
    pub fn worker(&self) -> Result<Worker> {
        let temp_dir = self.settings.temp_dir();
        std::fs::create_dir_all(&temp_dir)?;

        let cache = self.transcript_cache()?;
        let transcripts = TranscriptService::new(&self.settings.transcription.subtitle_language, temp_dir)
            .with_cache(cache)
            .with_whisper(&self.settings.transcription.model)?;

        let mut tasks = TaskRegistry::new();
        register_tasks(&mut tasks, Arc::new(transcripts));

        Ok(Worker::new(
            self.store.clone(),
            tasks,
            WorkerOptions::from(&self.settings.queue),
        ))
    }

    /// MCP server over the executor's tools, with transcripts as resources.
    pub fn mcp_server(&self) -> Result<McpServer> {
        let resources = TranscriptResources::new(self.queue.clone()).with_cache(self.transcript_cache()?);
        Ok(McpServer::new(self.executor.clone(), self.settings.agent.wait_budget()).with_resources(resources))
    }

    // The cache lives in the job database so every process sees the same transcripts
    fn transcript_cache(&self) -> Result<Arc<TranscriptCache>> {
        Ok(Arc::new(TranscriptCache::open(&self.settings.queue_db_path())?))
    }

    /// Fresh conversation store sized from settings.
    pub fn conversations(&self) -> ConversationStore {
        ConversationStore::new(self.settings.agent.max_retained_messages)
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn queue(&self) -> &Arc<JobQueue> {
        &self.queue
    }

    pub fn executor(&self) -> &Arc<ToolExecutor> {
        &self.executor
    }
}

fn build_registry(settings: &Settings, queue: Arc<JobQueue>) -> Result<ToolRegistry> {
    let mut registry = ToolRegistry::new();
    register_youtube_tools(&mut registry)?;

    if settings.tools.web_search_enabled {
        let search = WebSearchTool::new(&settings.tools.web_search_endpoint)?;
        registry.register(WebSearchTool::spec(), ToolRoute::Direct(Arc::new(search)))?;
    }

    registry.register(
        JobStatusTool::spec(),
        ToolRoute::Direct(Arc::new(JobStatusTool::new(queue))),
    )?;

    Ok(registry)
}

fn ensure_parent_dir(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::ToolCatalog;

    #[tokio::test]
    async fn test_catalog_from_settings() {
        let settings = Settings::default();
        let store = Arc::new(JobStore::in_memory().unwrap());
        let orchestrator = Orchestrator::with_store(settings.clone(), store.clone()).unwrap();

        let names: Vec<String> = orchestrator
            .executor()
            .list_tools()
            .await
            .into_iter()
            .map(|t| t.name)
            .collect();
        assert_eq!(
            names,
            vec![
                "get_video_transcript",
                "get_video_info",
                "search_transcript",
                "web_search",
                "check_job_status"
            ]
        );

        let mut no_search = settings;
        no_search.tools.web_search_enabled = false;
        let orchestrator = Orchestrator::with_store(no_search, store).unwrap();
        assert!(!orchestrator.executor().registry().contains("web_search"));
    }

    #[test]
    fn test_database_directory_is_created() {
        let dir = tempfile::tempdir().unwrap();
        let mut settings = Settings::default();
        settings.queue.database_path = dir.path().join("nested/jobs.db").to_string_lossy().to_string();

        let orchestrator = Orchestrator::new(settings).unwrap();
        assert!(dir.path().join("nested/jobs.db").exists());
        assert_eq!(orchestrator.conversations().list().len(), 0);
        assert!(orchestrator.mcp_server().is_ok());
    }
}
