//! Text generation through an OpenAI-compatible chat endpoint.

use crate::config::GenerationSettings;
use crate::conversation::{Message, Role};
use crate::error::{AgentError, Result};
use crate::openai::create_generation_client;
use async_openai::config::OpenAIConfig;
use async_openai::types::{
    ChatCompletionRequestAssistantMessageArgs, ChatCompletionRequestMessage,
    ChatCompletionRequestSystemMessageArgs, ChatCompletionRequestUserMessageArgs,
    CreateChatCompletionRequestArgs,
};
use async_openai::Client;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

/// Decoding options for one generation call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationOptions {
    pub do_sample: bool,
    pub temperature: f32,
    pub top_p: f32,
    pub max_new_tokens: u32,
}

impl GenerationOptions {
    /// Deterministic decoding.
    pub fn greedy(max_new_tokens: u32) -> Self {
        Self {
            do_sample: false,
            temperature: 0.0,
            top_p: 1.0,
            max_new_tokens,
        }
    }

    pub fn sampled(temperature: f32, top_p: f32, max_new_tokens: u32) -> Self {
        Self {
            do_sample: true,
            temperature,
            top_p,
            max_new_tokens,
        }
    }

    /// Temperature and top-p as sent over the wire.
    fn sampling_params(&self) -> (f32, f32) {
        if self.do_sample {
            (self.temperature, self.top_p)
        } else {
            (0.0, 1.0)
        }
    }
}

/// Produces a completion for a message sequence.
#[async_trait]
pub trait TextGenerator: Send + Sync {
    async fn generate(&self, messages: &[Message], options: &GenerationOptions) -> Result<String>;
}

/// Generator backed by any OpenAI-compatible chat-completions server (vLLM, Ollama, OpenAI).
pub struct OpenAiGenerator {
    client: Client<OpenAIConfig>,
    model: String,
}

impl OpenAiGenerator {
    pub fn new(settings: &GenerationSettings) -> Result<Self> {
        Ok(Self {
            client: create_generation_client(settings)?,
            model: settings.model.clone(),
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }
}

/// Convert history to chat messages. Tool results go in as user turns.
fn to_request_messages(messages: &[Message]) -> Result<Vec<ChatCompletionRequestMessage>> {
    messages
        .iter()
        .map(|m| -> Result<ChatCompletionRequestMessage> {
            let content = m.content().to_string();
            let message = match m.role() {
                Role::System => ChatCompletionRequestSystemMessageArgs::default()
                    .content(content)
                    .build()
                    .map_err(|e| AgentError::Generation(e.to_string()))?
                    .into(),
                Role::User | Role::Tool => ChatCompletionRequestUserMessageArgs::default()
                    .content(content)
                    .build()
                    .map_err(|e| AgentError::Generation(e.to_string()))?
                    .into(),
                Role::Assistant => ChatCompletionRequestAssistantMessageArgs::default()
                    .content(content)
                    .build()
                    .map_err(|e| AgentError::Generation(e.to_string()))?
                    .into(),
            };
            Ok(message)
        })
        .collect()
}

#[async_trait]
impl TextGenerator for OpenAiGenerator {
    #[instrument(skip(self, messages), fields(model = %self.model, messages = messages.len()))]
    async fn generate(&self, messages: &[Message], options: &GenerationOptions) -> Result<String> {
        let (temperature, top_p) = options.sampling_params();

        #[allow(deprecated)]
        let request = CreateChatCompletionRequestArgs::default()
            .model(&self.model)
            .messages(to_request_messages(messages)?)
            .temperature(temperature)
            .top_p(top_p)
            .max_tokens(options.max_new_tokens)
            .build()
            .map_err(|e| AgentError::Generation(e.to_string()))?;

        let response = self
            .client
            .chat()
            .create(request)
            .await
            .map_err(|e| AgentError::OpenAI(format!("Chat completion error: {}", e)))?;

        let content = response
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| AgentError::Generation("No response from model".to_string()))?
            .message
            .content
            .unwrap_or_default();

        debug!("Generated {} chars", content.len());
        Ok(content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_greedy_sends_deterministic_params() {
        let greedy = GenerationOptions::greedy(512);
        assert!(!greedy.do_sample);
        assert_eq!(greedy.sampling_params(), (0.0, 1.0));

        let mut forced = GenerationOptions::sampled(0.7, 0.9, 512);
        assert_eq!(forced.sampling_params(), (0.7, 0.9));
        forced.do_sample = false;
        assert_eq!(forced.sampling_params(), (0.0, 1.0));
    }

    #[test]
    fn test_tool_messages_become_user_turns() {
        let history = vec![
            Message::system("sys"),
            Message::user("hi"),
            Message::assistant("calling"),
            Message::tool("web_search", "results"),
        ];
        let converted = to_request_messages(&history).unwrap();

        assert_eq!(converted.len(), 4);
        assert!(matches!(converted[0], ChatCompletionRequestMessage::System(_)));
        assert!(matches!(converted[2], ChatCompletionRequestMessage::Assistant(_)));
        assert!(matches!(converted[3], ChatCompletionRequestMessage::User(_)));
    }
}
