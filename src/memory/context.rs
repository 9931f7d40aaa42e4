//! Bounded conversation context handed to the router

use crate::llm::{Message, Role};

/// Recent messages plus an optional running summary of older ones
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConversationContext {
    pub summary: Option<String>,
    /// Oldest first; user and assistant messages only
    pub turns: Vec<Message>,
}

impl ConversationContext {
    pub fn new(summary: Option<String>, turns: Vec<Message>) -> Self {
        Self { summary, turns }
    }

    /// Number of messages, not counting the summary
    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.summary.is_none() && self.turns.is_empty()
    }

    /// Render as plain text for a prompt
    pub fn render(&self) -> String {
        let mut out = String::new();
        if let Some(summary) = &self.summary {
            out.push_str("Previous conversation summary:\n");
            out.push_str(summary.trim());
            out.push_str("\n\n");
        }
        if !self.turns.is_empty() {
            out.push_str("Recent messages:\n");
            for message in &self.turns {
                let speaker = match message.role {
                    Role::User => "USER",
                    Role::Assistant => "ASSISTANT",
                    Role::System => "SYSTEM",
                };
                out.push_str(&format!("{}: {}\n", speaker, message.content));
            }
        }
        out
    }
}
