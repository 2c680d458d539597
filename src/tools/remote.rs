//! Client for a remote MCP tool server over HTTP.

use super::{ToolCatalog, ToolHandler, ToolSpec};
use crate::error::{AgentError, Result};
use crate::mcp::protocol::{Content, JsonRpcRequest, JsonRpcResponse, ToolCallResult, ToolsListResult};
use async_trait::async_trait;
use serde_json::{json, Map, Value};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Discovers and calls tools exposed by an MCP JSON-RPC endpoint.
pub struct McpClient {
    http: reqwest::Client,
    url: String,
    next_id: AtomicU64,
}

impl McpClient {
    pub fn new(url: &str, timeout: Duration) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| AgentError::Config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            http,
            url: url.to_string(),
            next_id: AtomicU64::new(1),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    async fn rpc(&self, method: &str, params: Value) -> Result<Value> {
        let request = JsonRpcRequest {
            jsonrpc: "2.0".to_string(),
            id: Some(json!(self.next_id.fetch_add(1, Ordering::Relaxed))),
            method: method.to_string(),
            params: Some(params),
        };

        debug!("MCP {} -> {}", method, self.url);
        let response: JsonRpcResponse = self
            .http
            .post(&self.url)
            .json(&request)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        if let Some(error) = response.error {
            return Err(AgentError::Tool(format!(
                "{} failed ({}): {}",
                method, error.code, error.message
            )));
        }

        response
            .result
            .ok_or_else(|| AgentError::Tool(format!("{} returned no result", method)))
    }

    /// Fetch the remote tool list, propagating failures.
    pub async fn try_list_tools(&self) -> Result<Vec<ToolSpec>> {
        let result = self.rpc("tools/list", json!({})).await?;
        let list: ToolsListResult = serde_json::from_value(result)?;

        Ok(list
            .tools
            .into_iter()
            .map(|t| ToolSpec {
                name: t.name,
                description: t.description,
                parameter_schema: t.input_schema,
            })
            .collect())
    }
}

#[async_trait]
impl ToolCatalog for McpClient {
    async fn list_tools(&self) -> Vec<ToolSpec> {
        match self.try_list_tools().await {
            Ok(tools) => {
                info!("Discovered {} tools from {}", tools.len(), self.url);
                tools
            }
            Err(e) => {
                warn!("Tool discovery at {} failed: {}", self.url, e);
                Vec::new()
            }
        }
    }
}

#[async_trait]
impl ToolHandler for McpClient {
    async fn call(&self, tool: &str, arguments: &Map<String, Value>) -> Result<String> {
        let result = self
            .rpc(
                "tools/call",
                json!({ "name": tool, "arguments": Value::Object(arguments.clone()) }),
            )
            .await?;
        let result: ToolCallResult = serde_json::from_value(result)?;

        let text = result
            .content
            .into_iter()
            .map(|c| match c {
                Content::Text { text } => text,
            })
            .collect::<Vec<_>>()
            .join("\n");

        if result.is_error.unwrap_or(false) {
            Err(AgentError::ToolFailed(text))
        } else {
            Ok(text)
        }
    }
}
