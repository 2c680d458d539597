//! Conversation state: role-tagged message history with bounded retention.

mod store;

pub use store::{ConversationHandle, ConversationStore};

use crate::error::{AgentError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Author of a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
            Role::Tool => "tool",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Role {
    type Err = AgentError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "system" => Ok(Role::System),
            "user" => Ok(Role::User),
            "assistant" => Ok(Role::Assistant),
            "tool" => Ok(Role::Tool),
            _ => Err(AgentError::InvalidInput(format!("Unknown message role: {}", s))),
        }
    }
}

/// A single immutable message.
///
/// Tool messages always carry the name of the tool that produced them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    role: Role,
    content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    tool_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    tool_call_id: Option<String>,
    timestamp: DateTime<Utc>,
}

impl Message {
    /// Build a message from loose parts, validating the tool-name invariant.
    pub fn from_parts(
        role: Role,
        content: impl Into<String>,
        tool_name: Option<String>,
        tool_call_id: Option<String>,
    ) -> Result<Self> {
        if role == Role::Tool && tool_name.as_deref().map_or(true, str::is_empty) {
            return Err(AgentError::InvalidInput(
                "tool messages must carry a tool name".to_string(),
            ));
        }

        Ok(Self {
            role,
            content: content.into(),
            tool_name,
            tool_call_id,
            timestamp: Utc::now(),
        })
    }

    fn plain(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            tool_name: None,
            tool_call_id: None,
            timestamp: Utc::now(),
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::plain(Role::System, content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::plain(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::plain(Role::Assistant, content)
    }

    pub fn tool(tool_name: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            tool_name: Some(tool_name.into()),
            ..Self::plain(Role::Tool, content)
        }
    }

    /// Attach a tool call id (consumes and returns the message before it is stored).
    pub fn with_tool_call_id(mut self, id: impl Into<String>) -> Self {
        self.tool_call_id = Some(id.into());
        self
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn content(&self) -> &str {
        &self.content
    }

    pub fn tool_name(&self) -> Option<&str> {
        self.tool_name.as_deref()
    }

    pub fn tool_call_id(&self) -> Option<&str> {
        self.tool_call_id.as_deref()
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }
}

/// Ordered message history for one conversation.
#[derive(Debug, Clone, Serialize)]
pub struct Conversation {
    id: String,
    messages: Vec<Message>,
    max_retained: usize,
}

impl Conversation {
    pub fn new(id: impl Into<String>, max_retained: usize) -> Self {
        Self {
            id: id.into(),
            messages: Vec::new(),
            max_retained,
        }
    }

    /// Create a conversation with a fresh random id.
    pub fn ephemeral(max_retained: usize) -> Self {
        Self::new(uuid::Uuid::new_v4().to_string(), max_retained)
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Append a message and trim the history.
    pub fn add_message(&mut self, message: Message) {
        self.messages.push(message);
        self.trim();
    }

    /// Append a message built from a role and content.
    ///
    /// Fails for `Role::Tool`, which needs a tool name; use [`Message::tool`].
    pub fn add(&mut self, role: Role, content: impl Into<String>) -> Result<()> {
        let message = Message::from_parts(role, content, None, None)?;
        self.add_message(message);
        Ok(())
    }

    /// Messages in order.
    pub fn history(&self) -> &[Message] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Drop everything except system messages.
    pub fn clear(&mut self) {
        self.messages.retain(|m| m.role == Role::System);
    }

    /// Evict the oldest non-system messages until at most `max_retained` remain.
    fn trim(&mut self) {
        let non_system = self
            .messages
            .iter()
            .filter(|m| m.role != Role::System)
            .count();

        if non_system <= self.max_retained {
            return;
        }

        let mut to_evict = non_system - self.max_retained;
        self.messages.retain(|m| {
            if to_evict > 0 && m.role != Role::System {
                to_evict -= 1;
                false
            } else {
                true
            }
        });
    }
}
