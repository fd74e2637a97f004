//! Conversation messages and bounded history.

use serde::{Deserialize, Serialize};

/// Who produced a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// System prompt. Never evicted from history.
    System,
    /// End user (transcribed speech or injected text).
    User,
    /// The agent's own responses.
    Assistant,
    /// Tool output attached to the conversation.
    Tool,
}

/// A structured attachment on a message (tool payloads, citations).
/// Opaque to the orchestrator; passed through to the LLM as-is.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessagePart {
    pub kind: String,
    pub content: String,
}

/// A single conversation message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub parts: Vec<MessagePart>,
}

impl Message {
    fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            parts: Vec::new(),
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Role::System, content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }

    pub fn tool(content: impl Into<String>) -> Self {
        Self::new(Role::Tool, content)
    }

    pub fn with_parts(mut self, parts: Vec<MessagePart>) -> Self {
        self.parts = parts;
        self
    }
}

/// Append a message, evicting the oldest non-system entries once the history
/// exceeds `max_messages`.
pub(crate) fn push_bounded(messages: &mut Vec<Message>, message: Message, max_messages: usize) {
    messages.push(message);
    while messages.len() > max_messages {
        let Some(pos) = messages.iter().position(|m| m.role != Role::System) else {
            // Nothing but system prompts; keep them all.
            break;
        };
        messages.remove(pos);
    }
}
