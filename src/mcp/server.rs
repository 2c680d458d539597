//! MCP server implementation.

use super::prompts;
use super::protocol::*;
use super::resources::{ResourceRead, TranscriptResources};
use crate::agent::ToolExecutor;
use crate::error::AgentError;
use crate::queue::Outcome;
use crate::tools::{ToolCatalog, ToolInvocation};
use serde::de::DeserializeOwned;
use serde_json::{json, Map, Value};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing::{debug, info, warn};

const PROTOCOL_VERSION: &str = "2024-11-05";
const SERVER_NAME: &str = "tubeagent";
const SERVER_VERSION: &str = env!("CARGO_PKG_VERSION");

pub const PARSE_ERROR: i32 = -32700;
pub const INVALID_REQUEST: i32 = -32600;
pub const METHOD_NOT_FOUND: i32 = -32601;
pub const INVALID_PARAMS: i32 = -32602;
pub const INTERNAL_ERROR: i32 = -32603;
/// The resource exists but its transcript is still being fetched.
pub const RESOURCE_PENDING: i32 = -32001;
pub const RESOURCE_NOT_FOUND: i32 = -32002;

/// Serves the executor's tools, transcript resources and prompt templates over MCP.
pub struct McpServer {
    executor: Arc<ToolExecutor>,
    resources: Option<TranscriptResources>,
    wait_budget: Duration,
}

impl McpServer {
    pub fn new(executor: Arc<ToolExecutor>, wait_budget: Duration) -> Self {
        Self {
            executor,
            resources: None,
            wait_budget,
        }
    }

    /// Serve `transcript://` resources.
    pub fn with_resources(mut self, resources: TranscriptResources) -> Self {
        self.resources = Some(resources);
        self
    }

    /// Run the MCP server (reads from stdin, writes to stdout).
    pub async fn run(&self) -> anyhow::Result<()> {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        let mut stdout = tokio::io::stdout();

        info!("MCP server starting on stdio");

        while let Some(line) = lines.next_line().await? {
            if line.trim().is_empty() {
                continue;
            }

            let response = match serde_json::from_str::<JsonRpcRequest>(&line) {
                Ok(request) => self.handle_request(request).await,
                Err(e) => {
                    warn!("Failed to parse request: {}", e);
                    Some(JsonRpcResponse::error(None, PARSE_ERROR, "Parse error"))
                }
            };
            let Some(response) = response else {
                continue;
            };

            let mut out = serde_json::to_string(&response)?;
            out.push('\n');
            stdout.write_all(out.as_bytes()).await?;
            stdout.flush().await?;
        }

        info!("MCP server stdin closed");
        Ok(())
    }

    /// Handle a single JSON-RPC message.
    ///
    /// Notifications (messages without an id) never get a response.
    pub async fn handle_request(&self, request: JsonRpcRequest) -> Option<JsonRpcResponse> {
        if request.id.is_none() {
            debug!("Notification: {}", request.method);
            return None;
        }

        let id = request.id;
        let response = match request.method.as_str() {
            "initialize" => self.handle_initialize(id),
            "ping" => JsonRpcResponse::success(id, json!({})),
            "tools/list" => self.handle_tools_list(id).await,
            "tools/call" => self.handle_tools_call(id, request.params).await,
            "resources/list" => self.handle_resources_list(id),
            "resources/templates/list" => self.handle_resource_templates(id),
            "resources/read" => self.handle_resources_read(id, request.params).await,
            "prompts/list" => to_response(id, &PromptsListResult { prompts: prompts::catalog() }),
            "prompts/get" => self.handle_prompts_get(id, request.params),
            _ => JsonRpcResponse::error(
                id,
                METHOD_NOT_FOUND,
                &format!("Method not found: {}", request.method),
            ),
        };
        Some(response)
    }

    fn handle_initialize(&self, id: Option<Value>) -> JsonRpcResponse {
        let result = InitializeResult {
            protocol_version: PROTOCOL_VERSION.to_string(),
            capabilities: ServerCapabilities {
                tools: ToolsCapability { list_changed: false },
                resources: ResourcesCapability {
                    subscribe: false,
                    list_changed: false,
                },
                prompts: PromptsCapability { list_changed: false },
            },
            server_info: ServerInfo {
                name: SERVER_NAME.to_string(),
                version: SERVER_VERSION.to_string(),
            },
        };

        to_response(id, &result)
    }

    async fn handle_tools_list(&self, id: Option<Value>) -> JsonRpcResponse {
        let tools = self
            .executor
            .list_tools()
            .await
            .into_iter()
            .map(|spec| Tool {
                name: spec.name,
                description: spec.description,
                input_schema: spec.parameter_schema,
            })
            .collect();

        to_response(id, &ToolsListResult { tools })
    }

    async fn handle_tools_call(&self, id: Option<Value>, params: Option<Value>) -> JsonRpcResponse {
        let params: ToolCallParams = match parse_params(params) {
            Ok(params) => params,
            Err(message) => return JsonRpcResponse::error(id, INVALID_PARAMS, &message),
        };

        let arguments = match params.arguments {
            Some(Value::Object(map)) => map,
            None | Some(Value::Null) => Map::new(),
            Some(_) => {
                return to_response(id, &ToolCallResult::error("Arguments must be an object".to_string()))
            }
        };

        let invocation = ToolInvocation::new(&params.name, arguments);
        let result = match self.executor.execute(&invocation, self.wait_budget).await {
            Outcome::Result(text) => ToolCallResult::text(text),
            Outcome::Failure(reason) => ToolCallResult::error(reason),
            Outcome::Deferred(job_id) => ToolCallResult::text(format!(
                "Still running as background job {}. Check it later with check_job_status.",
                job_id
            )),
        };

        to_response(id, &result)
    }

    fn handle_resources_list(&self, id: Option<Value>) -> JsonRpcResponse {
        let resources = match &self.resources {
            Some(resources) => match resources.list() {
                Ok(list) => list,
                Err(e) => return JsonRpcResponse::error(id, INTERNAL_ERROR, &e.to_string()),
            },
            None => Vec::new(),
        };
        to_response(id, &ResourcesListResult { resources })
    }

    fn handle_resource_templates(&self, id: Option<Value>) -> JsonRpcResponse {
        let resource_templates = self
            .resources
            .as_ref()
            .map(TranscriptResources::templates)
            .unwrap_or_default();
        to_response(id, &ResourceTemplatesListResult { resource_templates })
    }

    async fn handle_resources_read(&self, id: Option<Value>, params: Option<Value>) -> JsonRpcResponse {
        let params: ReadResourceParams = match parse_params(params) {
            Ok(params) => params,
            Err(message) => return JsonRpcResponse::error(id, INVALID_PARAMS, &message),
        };
        let Some(resources) = &self.resources else {
            return JsonRpcResponse::error(
                id,
                RESOURCE_NOT_FOUND,
                &format!("Unknown resource: {}", params.uri),
            );
        };

        match resources.read(&params.uri, self.wait_budget).await {
            Ok(ResourceRead::Ready(contents)) => to_response(id, &ReadResourceResult { contents: vec![contents] }),
            Ok(ResourceRead::Pending(job_id)) => JsonRpcResponse::error_with_data(
                id,
                RESOURCE_PENDING,
                "Transcript is still being fetched; read the resource again later",
                Some(json!({ "job_id": job_id })),
            ),
            Err(AgentError::InvalidInput(message)) => {
                JsonRpcResponse::error(id, RESOURCE_NOT_FOUND, &message)
            }
            Err(e) => JsonRpcResponse::error(id, INTERNAL_ERROR, &e.to_string()),
        }
    }

    fn handle_prompts_get(&self, id: Option<Value>, params: Option<Value>) -> JsonRpcResponse {
        let params: GetPromptParams = match parse_params(params) {
            Ok(params) => params,
            Err(message) => return JsonRpcResponse::error(id, INVALID_PARAMS, &message),
        };

        match prompts::render(&params.name, &params.arguments.unwrap_or_default()) {
            Ok(result) => to_response(id, &result),
            Err(e) => JsonRpcResponse::error(id, INVALID_PARAMS, &e.to_string()),
        }
    }
}

fn parse_params<T: DeserializeOwned>(params: Option<Value>) -> Result<T, String> {
    let params = params.ok_or_else(|| "Missing params".to_string())?;
    serde_json::from_value(params).map_err(|e| format!("Invalid params: {}", e))
}

fn to_response<T: serde::Serialize>(id: Option<Value>, result: &T) -> JsonRpcResponse {
    match serde_json::to_value(result) {
        Ok(value) => JsonRpcResponse::success(id, value),
        Err(e) => JsonRpcResponse::error(id, INTERNAL_ERROR, &format!("Internal error: {}", e)),
    }
}
