use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    User,
    Assistant,
    System,
}

/// A single chat turn as exchanged with the UI.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: String,
    /// Opaque payload, carried through untouched.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<Value>,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::User,
            content: content.into(),
            context: None,
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::Assistant,
            content: content.into(),
            context: None,
        }
    }

    /// Assistant reply whose context carries the model's separate reasoning
    /// output, empty when the model gave none.
    pub fn assistant_with_reasoning(content: impl Into<String>, reasoning: Option<String>) -> Self {
        Self {
            context: Some(reasoning_context(reasoning)),
            ..Self::assistant(content)
        }
    }
}

pub fn reasoning_context(reasoning: Option<String>) -> Value {
    json!({ "reasoning": reasoning.unwrap_or_default() })
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatCompletionRequest {
    #[serde(default)]
    pub messages: Vec<ChatMessage>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_state: Option<Value>,
}

impl ChatCompletionRequest {
    /// A request is usable when it has at least one message and the last one
    /// carries content.
    pub fn is_valid(&self) -> bool {
        self.messages
            .last()
            .map(|message| !message.content.is_empty())
            .unwrap_or(false)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatCompletion {
    pub message: ChatMessage,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_state: Option<Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChatMessageDelta {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<ChatRole>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<Value>,
}

/// One line of an NDJSON completion stream.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChatCompletionDelta {
    pub delta: ChatMessageDelta,
}

impl ChatCompletionDelta {
    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            delta: ChatMessageDelta {
                content: Some(content.into()),
                role: Some(ChatRole::Assistant),
                context: None,
            },
        }
    }

    pub fn with_reasoning(mut self, reasoning: Option<String>) -> Self {
        self.delta.context = Some(reasoning_context(reasoning));
        self
    }
}
