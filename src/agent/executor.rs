//! Routes parsed tool invocations to their implementation.

use crate::error::AgentError;
use crate::queue::{JobQueue, Outcome};
use crate::tools::{McpClient, ToolCatalog, ToolHandler, ToolInvocation, ToolRegistry, ToolRoute, ToolSpec};
use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, instrument, warn};

/// Executes invocations against the local registry, the job queue, and optionally a remote tool server.
pub struct ToolExecutor {
    registry: Arc<ToolRegistry>,
    queue: Option<Arc<JobQueue>>,
    remote: Option<Arc<McpClient>>,
}

impl ToolExecutor {
    pub fn new(registry: Arc<ToolRegistry>) -> Self {
        Self {
            registry,
            queue: None,
            remote: None,
        }
    }

    /// Queue used for tools routed as background jobs.
    pub fn with_queue(mut self, queue: Arc<JobQueue>) -> Self {
        self.queue = Some(queue);
        self
    }

    /// Remote server consulted for tools not registered locally.
    pub fn with_remote(mut self, remote: Arc<McpClient>) -> Self {
        self.remote = Some(remote);
        self
    }

    pub fn registry(&self) -> &ToolRegistry {
        &self.registry
    }

    /// Run one invocation. Errors become [`Outcome::Failure`]; only queued jobs can be deferred.
    #[instrument(skip(self, invocation), fields(tool = %invocation.name))]
    pub async fn execute(&self, invocation: &ToolInvocation, wait_budget: Duration) -> Outcome {
        info!("Executing tool call {}", invocation);

        match self.registry.route(&invocation.name) {
            Some(ToolRoute::Direct(handler)) => {
                Self::call_handler(handler.as_ref(), invocation).await
            }
            Some(ToolRoute::Queued { task }) => match &self.queue {
                Some(queue) => {
                    queue
                        .run(task, &invocation.arguments_value(), wait_budget)
                        .await
                }
                None => Outcome::Failure(format!(
                    "Tool '{}' needs the job queue, which is not configured",
                    invocation.name
                )),
            },
            None => match &self.remote {
                Some(remote) => Self::call_handler(remote.as_ref(), invocation).await,
                None => Outcome::Failure(AgentError::UnknownTool(invocation.name.clone()).to_string()),
            },
        }
    }

    async fn call_handler(handler: &dyn ToolHandler, invocation: &ToolInvocation) -> Outcome {
        match handler.call(&invocation.name, &invocation.arguments).await {
            Ok(text) => Outcome::Result(text),
            Err(e) => {
                warn!("Tool {} failed: {}", invocation.name, e);
                Outcome::Failure(format!("Tool error: {}", e))
            }
        }
    }
}

#[async_trait]
impl ToolCatalog for ToolExecutor {
    /// Local tools first, then remote tools whose names are not already taken.
    async fn list_tools(&self) -> Vec<ToolSpec> {
        let mut tools = self.registry.list_tools().await;

        if let Some(remote) = &self.remote {
            let taken: HashSet<String> = tools.iter().map(|t| t.name.clone()).collect();
            tools.extend(
                remote
                    .list_tools()
                    .await
                    .into_iter()
                    .filter(|t| !taken.contains(&t.name)),
            );
        }
        tools
    }
}
