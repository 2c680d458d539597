//! Agent loop: one tool-selection pass, tool execution, one answer pass.

use super::executor::ToolExecutor;
use super::generation::{GenerationOptions, TextGenerator};
use super::parser::{parse_tool_calls, strip_tool_calls};
use crate::config::{Prompts, Settings};
use crate::conversation::{Conversation, Message};
use crate::error::AgentError;
use crate::queue::Outcome;
use crate::tools::{format_for_prompt, format_tool_results, ToolCatalog, ToolInvocation};
use serde::Serialize;
use serde_json::{json, Value};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, instrument};

const EMPTY_ANSWER: &str = "I ran the requested tools but could not produce an answer from their results.";

/// Agent that lets the model pick tools, runs them, and folds the results back in.
pub struct Agent {
    generator: Arc<dyn TextGenerator>,
    executor: Arc<ToolExecutor>,
    prompts: Prompts,
    tool_pass: GenerationOptions,
    answer_pass: GenerationOptions,
    wait_budget: Duration,
    persist_tool_results: bool,
}

impl Agent {
    /// Create an agent with default decoding options and a 30 second wait budget.
    pub fn new(generator: Arc<dyn TextGenerator>, executor: Arc<ToolExecutor>, prompts: Prompts) -> Self {
        Self {
            generator,
            executor,
            prompts,
            tool_pass: GenerationOptions::greedy(512),
            answer_pass: GenerationOptions::sampled(0.7, 0.9, 512),
            wait_budget: Duration::from_secs(30),
            persist_tool_results: false,
        }
    }

    /// Apply generation and agent settings.
    pub fn configure(mut self, settings: &Settings) -> Self {
        self.tool_pass = settings.generation.tool_pass.clone();
        self.answer_pass = settings.generation.answer_pass.clone();
        self.wait_budget = settings.agent.wait_budget();
        self.persist_tool_results = settings.agent.persist_tool_results;
        self
    }

    /// Maximum time to wait on a single tool before deferring it.
    pub fn with_wait_budget(mut self, budget: Duration) -> Self {
        self.wait_budget = budget;
        self
    }

    /// Keep the consolidated tool-result message in the conversation history.
    pub fn with_persist_tool_results(mut self, persist: bool) -> Self {
        self.persist_tool_results = persist;
        self
    }

    pub fn executor(&self) -> &Arc<ToolExecutor> {
        &self.executor
    }

    /// Append a user message and respond to it.
    pub async fn handle_turn(&self, conversation: &mut Conversation, user_message: &str) -> TurnResponse {
        conversation.add_message(Message::user(user_message));
        self.respond(conversation).await
    }

    /// Produce the assistant reply for the conversation as it stands.
    ///
    /// Never fails: generation errors come back as [`TurnOutcome::Failed`] with a
    /// diagnostic as the content. The reply is appended to the conversation unless
    /// the turn failed.
    #[instrument(skip_all, fields(conversation = %conversation.id()))]
    pub async fn respond(&self, conversation: &mut Conversation) -> TurnResponse {
        let tools = self.executor.list_tools().await;
        let offered: HashSet<&str> = tools.iter().map(|t| t.name.as_str()).collect();

        let mut messages = Vec::with_capacity(conversation.len() + 2);
        messages.push(Message::system(format_for_prompt(&tools, &self.prompts)));
        messages.extend(conversation.history().iter().cloned());

        debug!("Tool-selection pass with {} messages and {} tools", messages.len(), tools.len());
        let first = match self.generator.generate(&messages, &self.tool_pass).await {
            Ok(text) => text,
            Err(e) => return TurnResponse::failed(&e.to_string(), Vec::new()),
        };

        let calls = parse_tool_calls(&first);
        if calls.is_empty() {
            info!("Model answered without tools");
            conversation.add_message(Message::assistant(first.clone()));
            return TurnResponse {
                content: first,
                outcome: TurnOutcome::Answered,
                tool_calls: Vec::new(),
            };
        }

        info!("Model requested {} tool call(s)", calls.len());
        let mut records = Vec::with_capacity(calls.len());
        for call in &calls {
            let outcome = if offered.contains(call.name.as_str()) {
                self.executor.execute(call, self.wait_budget).await
            } else {
                Outcome::Failure(AgentError::UnknownTool(call.name.clone()).to_string())
            };
            records.push(ToolCallRecord::new(call, outcome));
        }

        let tool_message = self.tool_result_message(&records);
        if self.persist_tool_results {
            conversation.add_message(tool_message.clone());
        }

        let job_ids: Vec<String> = records
            .iter()
            .filter_map(|r| match &r.outcome {
                Outcome::Deferred(id) => Some(id.clone()),
                _ => None,
            })
            .collect();

        if records.iter().all(|r| r.outcome.is_deferred()) {
            info!("All tool calls deferred; skipping the answer pass");
            let notice = deferred_notice(&job_ids);
            conversation.add_message(Message::assistant(notice.clone()));
            return TurnResponse {
                content: notice,
                outcome: TurnOutcome::Deferred { job_ids },
                tool_calls: records,
            };
        }

        messages.push(tool_message);
        debug!("Answer pass with {} messages", messages.len());
        let second = match self.generator.generate(&messages, &self.answer_pass).await {
            Ok(text) => text,
            Err(e) => return TurnResponse::failed(&e.to_string(), records),
        };

        let mut content = strip_tool_calls(&second);
        if content.is_empty() {
            content = EMPTY_ANSWER.to_string();
        }

        let outcome = if job_ids.is_empty() {
            TurnOutcome::Answered
        } else {
            content = format!("{}\n\n{}", content, deferred_notice(&job_ids));
            TurnOutcome::Deferred { job_ids }
        };

        conversation.add_message(Message::assistant(content.clone()));
        TurnResponse {
            content,
            outcome,
            tool_calls: records,
        }
    }

    fn tool_result_message(&self, records: &[ToolCallRecord]) -> Message {
        let responses: Vec<Value> = records.iter().map(ToolCallRecord::response_json).collect();
        let names: Vec<&str> = records.iter().map(|r| r.name.as_str()).collect();
        let ids: Vec<&str> = records.iter().map(|r| r.id.as_str()).collect();

        let content = format_tool_results(&self.prompts.agent.tool_results_header, &responses);
        Message::tool(names.join(","), content).with_tool_call_id(ids.join(","))
    }
}

fn deferred_notice(job_ids: &[String]) -> String {
    let (noun, verb) = if job_ids.len() == 1 { ("request is", "job id") } else { ("requests are", "job ids") };
    format!(
        "This is taking longer than expected. The {} still running in the background ({}: {}). \
         Ask me to check on it in a little while.",
        noun,
        verb,
        job_ids.join(", ")
    )
}

/// How a turn ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum TurnOutcome {
    Answered,
    /// At least one tool was still running when its wait budget ran out.
    Deferred { job_ids: Vec<String> },
    Failed { diagnostic: String },
}

/// Response to one user turn.
#[derive(Debug, Clone, Serialize)]
pub struct TurnResponse {
    /// Text shown to the user.
    pub content: String,
    pub outcome: TurnOutcome,
    /// Tool calls made during the turn, in execution order.
    pub tool_calls: Vec<ToolCallRecord>,
}

impl TurnResponse {
    fn failed(diagnostic: &str, tool_calls: Vec<ToolCallRecord>) -> Self {
        error!("Turn failed: {}", diagnostic);
        Self {
            content: format!("Sorry, I could not generate a response: {}", diagnostic),
            outcome: TurnOutcome::Failed {
                diagnostic: diagnostic.to_string(),
            },
            tool_calls,
        }
    }
}

/// Record of a tool call made during a turn.
#[derive(Debug, Clone, Serialize)]
pub struct ToolCallRecord {
    /// Links the call to the tool message that carries its result.
    pub id: String,
    /// Name of the tool called.
    pub name: String,
    /// JSON arguments passed to the tool.
    pub arguments: String,
    pub outcome: Outcome,
}

impl ToolCallRecord {
    fn new(call: &ToolInvocation, outcome: Outcome) -> Self {
        Self {
            id: format!("call_{}", uuid::Uuid::new_v4().simple()),
            name: call.name.clone(),
            arguments: call.arguments_value().to_string(),
            outcome,
        }
    }

    /// The `<tool_response>` payload for this call.
    fn response_json(&self) -> Value {
        match &self.outcome {
            // Structured results go in as JSON rather than as an escaped string
            Outcome::Result(text) => match serde_json::from_str::<Value>(text) {
                Ok(value @ (Value::Object(_) | Value::Array(_))) => {
                    json!({ "name": self.name, "results": value })
                }
                _ => json!({ "name": self.name, "results": text }),
            },
            Outcome::Failure(reason) => json!({ "name": self.name, "results": reason, "error": true }),
            Outcome::Deferred(job_id) => json!({
                "name": self.name,
                "results": "Still running in the background.",
                "status": "pending",
                "job_id": job_id,
            }),
        }
    }
}

impl std::fmt::Display for ToolCallRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}({})", self.name, self.arguments)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conversation::Role;
    use crate::error::{AgentError, Result};
    use crate::queue::{JobQueue, JobStatus, JobStore, QueueOptions, TaskHandler, TaskRegistry, Worker, WorkerOptions};
    use crate::tools::{ToolHandler, ToolRegistry, ToolRoute, ToolSpec};
    use async_trait::async_trait;
    use serde_json::Map;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    /// Replays canned completions and records what it was asked.
    struct ScriptedGenerator {
        replies: Mutex<VecDeque<Result<String>>>,
        seen: Mutex<Vec<(Vec<Message>, GenerationOptions)>>,
    }

    impl ScriptedGenerator {
        fn new(replies: Vec<Result<String>>) -> Arc<Self> {
            Arc::new(Self {
                replies: Mutex::new(replies.into()),
                seen: Mutex::new(Vec::new()),
            })
        }

        fn calls(&self) -> usize {
            self.seen.lock().unwrap().len()
        }

        fn request(&self, index: usize) -> (Vec<Message>, GenerationOptions) {
            self.seen.lock().unwrap()[index].clone()
        }
    }

    #[async_trait]
    impl TextGenerator for ScriptedGenerator {
        async fn generate(&self, messages: &[Message], options: &GenerationOptions) -> Result<String> {
            self.seen.lock().unwrap().push((messages.to_vec(), options.clone()));
            self.replies
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Err(AgentError::Generation("script exhausted".into())))
        }
    }

    struct Transcript {
        delay: Duration,
    }

    #[async_trait]
    impl TaskHandler for Transcript {
        async fn handle(&self, payload: &Value) -> Result<String> {
            tokio::time::sleep(self.delay).await;
            Ok(format!("transcript of {}", payload["video_url"].as_str().unwrap_or("?")))
        }
    }

    struct Echo;

    #[async_trait]
    impl ToolHandler for Echo {
        async fn call(&self, _tool: &str, arguments: &Map<String, Value>) -> Result<String> {
            Ok(format!("echo {}", Value::Object(arguments.clone())))
        }
    }

    struct Harness {
        agent: Agent,
        generator: Arc<ScriptedGenerator>,
        queue: Arc<JobQueue>,
        worker: tokio::task::JoinHandle<Result<()>>,
    }

    impl Drop for Harness {
        fn drop(&mut self) {
            self.worker.abort();
        }
    }

    fn spec(name: &str) -> ToolSpec {
        ToolSpec::new(name, "test tool", json!({"type": "object", "properties": {}}))
    }

    fn harness(replies: Vec<Result<String>>, task_delay: Duration, budget: Duration) -> Harness {
        let store = Arc::new(JobStore::in_memory().unwrap());
        let queue = Arc::new(JobQueue::new(
            store.clone(),
            QueueOptions { poll_interval: Duration::from_millis(5), max_retries: 3 },
        ));

        let mut tasks = TaskRegistry::new();
        tasks.register("transcript.fetch", Arc::new(Transcript { delay: task_delay }));
        let worker = Worker::new(
            store,
            tasks,
            WorkerOptions {
                poll_interval: Duration::from_millis(5),
                retry_delay: Duration::from_millis(5),
                ..WorkerOptions::default()
            },
        );
        let worker = tokio::spawn(async move { worker.run(std::future::pending::<()>()).await });

        let mut registry = ToolRegistry::new();
        registry
            .register(spec("get_video_transcript"), ToolRoute::Queued { task: "transcript.fetch".into() })
            .unwrap();
        registry.register(spec("echo"), ToolRoute::Direct(Arc::new(Echo))).unwrap();

        let executor = Arc::new(ToolExecutor::new(Arc::new(registry)).with_queue(queue.clone()));
        let generator = ScriptedGenerator::new(replies);
        let agent = Agent::new(generator.clone(), executor, Prompts::default()).with_wait_budget(budget);

        Harness { agent, generator, queue, worker }
    }

    fn transcript_call(url: &str) -> String {
        format!(
            "<tool_call>\n{{\"name\": \"get_video_transcript\", \"arguments\": {{\"video_url\": \"{}\"}}}}\n</tool_call>",
            url
        )
    }

    #[tokio::test]
    async fn test_plain_answer_without_tools() {
        let h = harness(vec![Ok("Hello! How can I help?".into())], Duration::ZERO, Duration::from_secs(1));
        let mut conv = Conversation::new("c", 20);

        let response = h.agent.handle_turn(&mut conv, "hi").await;

        assert_eq!(response.content, "Hello! How can I help?");
        assert_eq!(response.outcome, TurnOutcome::Answered);
        assert!(response.tool_calls.is_empty());
        assert_eq!(h.generator.calls(), 1);

        let (messages, options) = h.generator.request(0);
        assert_eq!(messages[0].role(), Role::System);
        assert!(messages[0].content().contains("<tools>"));
        assert!(messages[0].content().contains("\"get_video_transcript\""));
        assert_eq!(messages.last().unwrap().content(), "hi");
        assert!(!options.do_sample);

        let roles: Vec<Role> = conv.history().iter().map(|m| m.role()).collect();
        assert_eq!(roles, vec![Role::User, Role::Assistant]);
    }

    #[tokio::test]
    async fn test_tool_result_within_budget() {
        let first = format!("Let me fetch it.\n{}", transcript_call("https://youtu.be/dQw4w9WgXcQ"));
        let h = harness(
            vec![
                Ok(first),
                Ok("The video is about music. <tool_call>{\"name\": \"echo\"}</tool_call>".into()),
            ],
            Duration::from_millis(10),
            Duration::from_secs(5),
        );
        let mut conv = Conversation::new("c", 20);

        let response = h.agent.handle_turn(&mut conv, "Summarize https://youtu.be/dQw4w9WgXcQ").await;

        assert_eq!(response.outcome, TurnOutcome::Answered);
        // Residual calls in the answer are stripped, not executed
        assert_eq!(response.content, "The video is about music.");
        assert_eq!(response.tool_calls.len(), 1);
        assert_eq!(
            response.tool_calls[0].outcome,
            Outcome::Result("transcript of https://youtu.be/dQw4w9WgXcQ".into())
        );
        assert_eq!(h.generator.calls(), 2);

        let (messages, options) = h.generator.request(1);
        assert!(options.do_sample);
        let tool_message = messages.last().unwrap();
        assert_eq!(tool_message.role(), Role::Tool);
        assert_eq!(tool_message.tool_name(), Some("get_video_transcript"));
        assert!(tool_message
            .content()
            .starts_with("TOOL RESULTS (use these to answer the user's question):\n\n<tool_response>\n"));
        assert!(tool_message.content().contains("transcript of https://youtu.be/dQw4w9WgXcQ"));

        // Tool results are not persisted by default
        let roles: Vec<Role> = conv.history().iter().map(|m| m.role()).collect();
        assert_eq!(roles, vec![Role::User, Role::Assistant]);
    }

    #[tokio::test]
    async fn test_slow_job_is_deferred_and_finishes_later() {
        let h = harness(
            vec![Ok(transcript_call("https://youtu.be/dQw4w9WgXcQ"))],
            Duration::from_millis(300),
            Duration::from_millis(20),
        );
        let mut conv = Conversation::new("c", 20);

        let response = h.agent.handle_turn(&mut conv, "Summarize this video").await;

        let TurnOutcome::Deferred { job_ids } = &response.outcome else {
            panic!("expected deferred outcome, got {:?}", response.outcome);
        };
        assert_eq!(job_ids.len(), 1);
        assert!(response.content.contains(&job_ids[0]));
        // No answer pass when nothing finished
        assert_eq!(h.generator.calls(), 1);

        let mut status = h.queue.status(&job_ids[0]).await.unwrap();
        for _ in 0..200 {
            if matches!(status, JobStatus::Succeeded { .. }) {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
            status = h.queue.status(&job_ids[0]).await.unwrap();
        }
        assert_eq!(
            status,
            JobStatus::Succeeded { preview: "transcript of https://youtu.be/dQw4w9WgXcQ".into() }
        );
    }

    #[tokio::test]
    async fn test_unknown_tool_reported_to_model() {
        let h = harness(
            vec![
                Ok("<tool_call>{\"name\": \"launch_rocket\", \"arguments\": {}}</tool_call>".into()),
                Ok("I can't do that.".into()),
            ],
            Duration::ZERO,
            Duration::from_secs(1),
        );
        let mut conv = Conversation::new("c", 20);

        let response = h.agent.handle_turn(&mut conv, "launch").await;

        assert_eq!(response.content, "I can't do that.");
        assert_eq!(
            response.tool_calls[0].outcome,
            Outcome::Failure("Unknown tool: launch_rocket".into())
        );

        let (messages, _) = h.generator.request(1);
        let content = messages.last().unwrap().content().to_string();
        let start = content.find("<tool_response>\n").unwrap() + "<tool_response>\n".len();
        let end = content.find("\n</tool_response>").unwrap();
        let payload: Value = serde_json::from_str(&content[start..end]).unwrap();
        assert_eq!(
            payload,
            json!({"name": "launch_rocket", "results": "Unknown tool: launch_rocket", "error": true})
        );
    }

    #[tokio::test]
    async fn test_mixed_outcomes_and_persisted_results() {
        let first = format!(
            "{}\n<tool_call>{{\"name\": \"echo\", \"arguments\": {{\"x\": 1}}}}</tool_call>",
            transcript_call("https://youtu.be/dQw4w9WgXcQ")
        );
        let h = harness(
            vec![Ok(first), Ok("Echo worked; the transcript is on its way.".into())],
            Duration::from_millis(300),
            Duration::from_millis(20),
        );
        let agent = Agent::new(h.generator.clone(), h.agent.executor().clone(), Prompts::default())
            .with_wait_budget(Duration::from_millis(20))
            .with_persist_tool_results(true);
        let mut conv = Conversation::new("c", 20);

        let response = agent.handle_turn(&mut conv, "do both").await;

        let TurnOutcome::Deferred { job_ids } = &response.outcome else {
            panic!("expected deferred outcome");
        };
        assert!(response.content.starts_with("Echo worked; the transcript is on its way.\n\n"));
        assert!(response.content.contains(&job_ids[0]));
        assert_eq!(response.tool_calls[1].outcome, Outcome::Result(r#"echo {"x":1}"#.into()));

        let roles: Vec<Role> = conv.history().iter().map(|m| m.role()).collect();
        assert_eq!(roles, vec![Role::User, Role::Tool, Role::Assistant]);
        assert_eq!(conv.history()[1].tool_name(), Some("get_video_transcript,echo"));
        let expected_ids = format!("{},{}", response.tool_calls[0].id, response.tool_calls[1].id);
        assert_eq!(conv.history()[1].tool_call_id(), Some(expected_ids.as_str()));
        assert_ne!(response.tool_calls[0].id, response.tool_calls[1].id);
        assert!(conv.history()[1].content().contains("\"status\":\"pending\""));
    }

    #[tokio::test]
    async fn test_generation_failure_is_reported() {
        let h = harness(
            vec![Err(AgentError::Generation("connection refused".into()))],
            Duration::ZERO,
            Duration::from_secs(1),
        );
        let mut conv = Conversation::new("c", 20);

        let response = h.agent.handle_turn(&mut conv, "hi").await;

        assert_eq!(
            response.outcome,
            TurnOutcome::Failed { diagnostic: "Generation failed: connection refused".into() }
        );
        assert!(response.content.contains("connection refused"));
        assert_eq!(conv.len(), 1);
    }

    #[test]
    fn test_structured_results_are_embedded() {
        let call = ToolInvocation::new("get_video_info", Map::new());
        let record = ToolCallRecord::new(&call, Outcome::Result(r#"{"word_count": 3}"#.into()));
        assert_eq!(
            record.response_json(),
            json!({"name": "get_video_info", "results": {"word_count": 3}})
        );

        let plain = ToolCallRecord::new(&call, Outcome::Result("42".into()));
        assert_eq!(plain.response_json(), json!({"name": "get_video_info", "results": "42"}));
        assert_eq!(plain.to_string(), "get_video_info({})");
    }
}
