//! Message types for completion requests.

use serde::{Deserialize, Serialize};

/// Role of a message in a completion request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// User message (human input, or a results follow-up we author).
    User,
    /// Assistant message (model output).
    Assistant,
}

impl Role {
    /// Returns the role as a string for API requests.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Assistant => "assistant",
        }
    }
}

/// A single message in a completion request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }
}

/// A complete request to the completion service.
///
/// The system prompt is kept separate from the turn list because the
/// hosted API takes it as a distinct parameter.
#[derive(Debug, Clone, PartialEq)]
pub struct CompletionRequest {
    /// System prompt (schema context, output-format instructions).
    pub system: String,
    /// Conversation turns, oldest first, ending with the current user turn.
    pub messages: Vec<ChatMessage>,
    /// Generation budget for the completion.
    pub max_tokens: u32,
}

impl CompletionRequest {
    pub fn new(system: impl Into<String>, messages: Vec<ChatMessage>, max_tokens: u32) -> Self {
        Self {
            system: system.into(),
            messages,
            max_tokens,
        }
    }

    /// Returns the content of the last user message, if any.
    pub fn last_user_content(&self) -> Option<&str> {
        self.messages
            .iter()
            .rev()
            .find(|m| m.role == Role::User)
            .map(|m| m.content.as_str())
    }
}
