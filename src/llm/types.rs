//! LLM types for chat-style inference requests
//!
//! This module defines the message types for LLM requests and responses.

use serde::{Deserialize, Serialize};

/// Role in a conversation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// A message in the conversation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    /// Create a system message
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    /// Create a user message
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    /// Create an assistant message
    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// Request to the LLM for completion
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CompletionRequest {
    pub system: String,
    pub messages: Vec<Message>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    /// Constrain the reply to a single JSON value
    #[serde(default)]
    pub json_output: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
}

impl CompletionRequest {
    /// Create a new completion request with a system prompt
    pub fn new(system: impl Into<String>) -> Self {
        Self {
            system: system.into(),
            ..Default::default()
        }
    }

    /// Add a message to the request
    pub fn with_message(mut self, message: Message) -> Self {
        self.messages.push(message);
        self
    }

    /// Add a user message
    pub fn with_user_message(self, content: impl Into<String>) -> Self {
        self.with_message(Message::user(content))
    }

    /// Set sampling temperature
    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    /// Require a JSON reply
    pub fn with_json_output(mut self) -> Self {
        self.json_output = true;
        self
    }

    /// Flatten system prompt and messages into one text blob (for logging and mocks)
    pub fn transcript(&self) -> String {
        let mut out = self.system.clone();
        for message in &self.messages {
            out.push('\n');
            out.push_str(&message.content);
        }
        out
    }
}

/// Response from the LLM
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CompletionResponse {
    pub content: String,
    pub usage: Usage,
}

impl CompletionResponse {
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            usage: Usage::default(),
        }
    }
}

/// Token usage statistics
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    pub input_tokens: u64,
    pub output_tokens: u64,
}

impl Usage {
    /// Create new usage stats
    pub fn new(input_tokens: u64, output_tokens: u64) -> Self {
        Self {
            input_tokens,
            output_tokens,
        }
    }

    /// Calculate total tokens
    pub fn total(&self) -> u64 {
        self.input_tokens + self.output_tokens
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_serialization() {
        assert_eq!(serde_json::to_string(&Role::System).unwrap(), "\"system\"");
        assert_eq!(serde_json::to_string(&Role::User).unwrap(), "\"user\"");
        assert_eq!(serde_json::to_string(&Role::Assistant).unwrap(), "\"assistant\"");
    }

    #[test]
    fn test_message_constructors() {
        assert_eq!(Message::user("Hello").role, Role::User);
        assert_eq!(Message::assistant("Hi").role, Role::Assistant);
        assert_eq!(Message::system("Be brief").content, "Be brief");
    }

    #[test]
    fn test_completion_request_builder() {
        let req = CompletionRequest::new("You are a router")
            .with_user_message("check disk")
            .with_temperature(0.0)
            .with_json_output();

        assert_eq!(req.system, "You are a router");
        assert_eq!(req.messages.len(), 1);
        assert_eq!(req.temperature, Some(0.0));
        assert!(req.json_output);
    }

    #[test]
    fn test_transcript_includes_everything() {
        let req = CompletionRequest::new("system text")
            .with_message(Message::assistant("earlier"))
            .with_user_message("now");
        let transcript = req.transcript();
        assert!(transcript.contains("system text"));
        assert!(transcript.contains("earlier"));
        assert!(transcript.contains("now"));
    }

    #[test]
    fn test_usage_total() {
        assert_eq!(Usage::new(100, 50).total(), 150);
    }
}
