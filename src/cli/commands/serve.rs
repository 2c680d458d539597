//! HTTP API server.
//!
//! Speaks enough of the Ollama API for chat front-ends (OpenWebUI and friends)
//! and adds job, tool and MCP endpoints.

use crate::agent::{Agent, ToolCallRecord, ToolExecutor, TurnOutcome};
use crate::cli::Output;
use crate::config::Settings;
use crate::conversation::{Conversation, ConversationStore, Message, Role};
use crate::error::{AgentError, Result};
use crate::mcp::protocol::{JsonRpcRequest, JsonRpcResponse};
use crate::mcp::{McpServer, INVALID_REQUEST};
use crate::orchestrator::Orchestrator;
use crate::queue::{JobQueue, JobStatus};
use crate::tools::ToolCatalog;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{delete, get, post},
    Json, Router,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tracing::{error, info};

/// Shared application state.
struct AppState {
    agent: Agent,
    executor: Arc<ToolExecutor>,
    queue: Arc<JobQueue>,
    conversations: ConversationStore,
    mcp: McpServer,
    model_name: String,
    max_retained: usize,
}

/// Run the HTTP API server.
pub async fn run_serve(host: Option<String>, port: Option<u16>, settings: Settings) -> anyhow::Result<()> {
    let host = host.unwrap_or_else(|| settings.server.host.clone());
    let port = port.unwrap_or(settings.server.port);

    let orchestrator = Orchestrator::new(settings)?;
    let state = Arc::new(AppState {
        agent: orchestrator.agent()?,
        executor: orchestrator.executor().clone(),
        queue: orchestrator.queue().clone(),
        conversations: orchestrator.conversations(),
        mcp: orchestrator.mcp_server()?,
        model_name: orchestrator.settings().server.model_name.clone(),
        max_retained: orchestrator.settings().agent.max_retained_messages,
    });

    let addr = format!("{}:{}", host, port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    Output::header("tubeagent API Server");
    println!();
    Output::success(&format!("Listening on http://{}", addr));
    println!();
    println!("Endpoints:");
    Output::kv("Chat", "POST   /api/chat");
    Output::kv("Models", "GET    /api/tags, /api/ps");
    Output::kv("Health", "GET    /api/health");
    Output::kv("Job status", "GET    /api/jobs/{id}");
    Output::kv("Tools", "GET    /api/tools");
    Output::kv("Forget", "DELETE /api/conversations/{id}");
    Output::kv("MCP", "POST   /mcp");
    println!();
    Output::info("Remember to run `tubeagent worker` for the video tools.");
    Output::info("Press Ctrl+C to stop the server.");

    axum::serve(listener, router(state)).await?;

    Ok(())
}

fn router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/api/version", get(version))
        .route("/api/tags", get(tags))
        .route("/api/ps", get(running_models))
        .route("/api/health", get(health))
        .route("/api/chat", post(chat))
        .route("/api/jobs/{id}", get(job_status))
        .route("/api/tools", get(list_tools))
        .route("/api/conversations/{id}", delete(forget_conversation))
        .route("/mcp", post(mcp))
        .layer(cors)
        .with_state(state)
}

// === Request/Response Types ===

#[derive(Debug, Clone, Serialize, Deserialize)]
struct ChatMessage {
    role: String,
    content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    tool_name: Option<String>,
}

#[derive(Deserialize)]
struct ChatRequest {
    #[serde(default)]
    model: Option<String>,
    messages: Vec<ChatMessage>,
    /// Accepted for compatibility; responses are never streamed.
    #[serde(default)]
    #[allow(dead_code)]
    stream: bool,
    /// Keep history on the server under this id instead of trusting the request.
    #[serde(default)]
    conversation_id: Option<String>,
}

#[derive(Serialize)]
struct ChatResponse {
    model: String,
    created_at: String,
    message: ChatMessage,
    done: bool,
    done_reason: &'static str,
    outcome: TurnOutcome,
    tool_calls: Vec<ToolCallRecord>,
    #[serde(skip_serializing_if = "Option::is_none")]
    conversation_id: Option<String>,
}

#[derive(Serialize)]
struct JobResponse {
    job_id: String,
    task: String,
    attempts: u32,
    summary: String,
    #[serde(flatten)]
    status: JobStatus,
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

fn error_response(status: StatusCode, message: impl Into<String>) -> Response {
    (status, Json(ErrorResponse { error: message.into() })).into_response()
}

/// Model entry advertised to Ollama clients.
fn model_entry(name: &str) -> Value {
    json!({
        "name": name,
        "model": name,
        "modified_at": Utc::now().to_rfc3339(),
        "size": 0,
        "digest": format!("sha256:{}", name.replace(':', "-")),
        "details": {
            "parent_model": "",
            "format": "gguf",
            "family": "tubeagent",
            "families": ["tubeagent"],
            "parameter_size": "",
            "quantization_level": ""
        }
    })
}

/// Build a one-off conversation from client-supplied history.
fn ephemeral_conversation(messages: &[ChatMessage], max_retained: usize) -> Result<Conversation> {
    let mut conversation = Conversation::ephemeral(max_retained);

    for message in messages {
        let role: Role = message.role.parse()?;
        let tool_name = match role {
            Role::Tool => Some(message.tool_name.clone().unwrap_or_else(|| "tool".to_string())),
            _ => None,
        };
        conversation.add_message(Message::from_parts(role, message.content.clone(), tool_name, None)?);
    }

    match conversation.history().last().map(|m| m.role()) {
        Some(Role::User) => Ok(conversation),
        _ => Err(AgentError::InvalidInput(
            "The last message must come from the user".to_string(),
        )),
    }
}

// === Handlers ===

async fn version() -> impl IntoResponse {
    Json(json!({ "version": env!("CARGO_PKG_VERSION") }))
}

async fn tags(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(json!({ "models": [model_entry(&state.model_name)] }))
}

async fn running_models(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let mut entry = model_entry(&state.model_name);
    entry["expires_at"] = json!("0001-01-01T00:00:00Z");
    entry["size_vram"] = json!(0);
    Json(json!({ "models": [entry] }))
}

async fn health() -> impl IntoResponse {
    Json(json!({ "status": "ok", "timestamp": Utc::now().to_rfc3339() }))
}

async fn chat(State(state): State<Arc<AppState>>, Json(req): Json<ChatRequest>) -> Response {
    let model = req.model.clone().unwrap_or_else(|| state.model_name.clone());

    let response = match &req.conversation_id {
        Some(id) => {
            let Some(last) = req.messages.iter().rev().find(|m| m.role.eq_ignore_ascii_case("user")) else {
                return error_response(StatusCode::BAD_REQUEST, "No user message in request");
            };
            let handle = state.conversations.get_or_create(id);
            // Held for the whole turn so turns on one conversation never interleave
            let mut conversation = handle.lock().await;
            state.agent.handle_turn(&mut conversation, &last.content).await
        }
        None => {
            let mut conversation = match ephemeral_conversation(&req.messages, state.max_retained) {
                Ok(conversation) => conversation,
                Err(e) => return error_response(StatusCode::BAD_REQUEST, e.to_string()),
            };
            state.agent.respond(&mut conversation).await
        }
    };

    if let TurnOutcome::Failed { diagnostic } = &response.outcome {
        error!("Chat turn failed: {}", diagnostic);
    } else {
        info!("Chat turn finished with {} tool call(s)", response.tool_calls.len());
    }

    Json(ChatResponse {
        model,
        created_at: Utc::now().to_rfc3339(),
        message: ChatMessage {
            role: Role::Assistant.to_string(),
            content: response.content,
            tool_name: None,
        },
        done: true,
        done_reason: "stop",
        outcome: response.outcome,
        tool_calls: response.tool_calls,
        conversation_id: req.conversation_id,
    })
    .into_response()
}

async fn job_status(State(state): State<Arc<AppState>>, Path(id): Path<String>) -> Response {
    match state.queue.store().get(&id) {
        Ok(Some(job)) => {
            let status = job.status();
            Json(JobResponse {
                job_id: job.id,
                task: job.task_name,
                attempts: job.attempts,
                summary: status.to_string(),
                status,
            })
            .into_response()
        }
        Ok(None) => error_response(StatusCode::NOT_FOUND, format!("Job not found: {}", id)),
        Err(e) => error_response(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
    }
}

async fn list_tools(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let tools: Vec<Value> = state
        .executor
        .list_tools()
        .await
        .iter()
        .map(|t| t.to_function_json())
        .collect();
    Json(json!({ "tools": tools }))
}

async fn forget_conversation(State(state): State<Arc<AppState>>, Path(id): Path<String>) -> Response {
    if state.conversations.delete(&id) {
        StatusCode::NO_CONTENT.into_response()
    } else {
        error_response(StatusCode::NOT_FOUND, format!("Conversation not found: {}", id))
    }
}

async fn mcp(State(state): State<Arc<AppState>>, Json(body): Json<Value>) -> Response {
    let response = match serde_json::from_value::<JsonRpcRequest>(body) {
        Ok(request) => state.mcp.handle_request(request).await,
        Err(e) => Some(JsonRpcResponse::error(
            None,
            INVALID_REQUEST,
            &format!("Invalid Request: {}", e),
        )),
    };

    match response {
        Some(response) => Json(response).into_response(),
        // Notifications are acknowledged without a body
        None => StatusCode::ACCEPTED.into_response(),
    }
}
