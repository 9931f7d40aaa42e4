//! Intent router: user text + context -> one structured tool decision

use std::sync::Arc;

use crate::error::{OpsError, Result};
use crate::llm::{CompletionRequest, LlmClient, Message};
use crate::memory::ConversationContext;
use crate::policy::ToolInvocation;
use crate::tools::ToolCatalog;

use super::decision::parse_decision;

/// Question asked when the model's decision cannot be used
pub const MALFORMED_CLARIFICATION: &str = "I didn't understand that. Could you rephrase?";

const ROUTER_RULES: &str = r#"You are an action router for a safe Ops Assistant. The user is non-technical.
You MUST output ONLY one JSON object and nothing else. No explanation, no markdown, no text before or after.
The object has exactly two fields: "tool" (one of the tool names below) and "args" (an object, may be empty).

Rules:
- Never output Linux commands.
- If the user asks for "nginx log" without saying error or access: ask_clarification.
- File paths are relative to the workspace. Choose a safe filename from context.
- If content for a new file is missing: ask_clarification asking what to write inside.
- If the user asks to delete, remove, stop, restart, kill, format or clean up anything: refuse.
- Never use paths outside the workspace. Never touch secrets, SSH keys or .env files.

Examples:
{"tool": "get_disk_free", "args": {}}
{"tool": "tail_nginx_access", "args": {"lines": 80}}
{"tool": "create_text_file", "args": {"path": "note.txt", "content": "hello world"}}
{"tool": "ask_clarification", "args": {"question": "Do you want the nginx error log or the access log?"}}
{"tool": "refuse", "args": {"reason": "Destructive actions are disabled for safety."}}"#;

/// Default router temperature
pub const ROUTER_TEMPERATURE: f32 = 0.0;

pub struct IntentRouter {
    llm: Arc<dyn LlmClient>,
    catalog: Arc<ToolCatalog>,
    temperature: f32,
}

impl IntentRouter {
    pub fn new(llm: Arc<dyn LlmClient>, catalog: Arc<ToolCatalog>) -> Self {
        Self {
            llm,
            catalog,
            temperature: ROUTER_TEMPERATURE,
        }
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    /// Build the single inference request for a turn
    pub fn build_request(&self, user_text: &str, context: &ConversationContext) -> CompletionRequest {
        let mut system = format!("{}\n\nTools:\n{}", ROUTER_RULES, self.catalog.describe_for_prompt());
        if let Some(summary) = &context.summary {
            system.push_str(&format!("\nPrevious conversation summary:\n{}\n", summary.trim()));
        }

        let mut request = CompletionRequest::new(system)
            .with_temperature(self.temperature)
            .with_json_output();
        for message in &context.turns {
            request = request.with_message(message.clone());
        }
        request.with_message(Message::user(user_text))
    }

    /// Route a user message to exactly one invocation
    ///
    /// Unusable replies become the clarification sentinel. Only an
    /// unreachable inference backend is an error.
    pub async fn route(&self, user_text: &str, context: &ConversationContext) -> Result<ToolInvocation> {
        let request = self.build_request(user_text, context);
        let response = match self.llm.complete(request).await {
            Ok(response) => response,
            Err(e) if e.is_unreachable() => {
                log::warn!("Router inference failed: {}", e);
                return Err(OpsError::InferenceUnreachable(e.to_string()));
            }
            Err(e) => {
                log::warn!("Router reply unusable: {}; asking for clarification", e);
                return Ok(ToolInvocation::clarification(MALFORMED_CLARIFICATION));
            }
        };

        match parse_decision(&response.content, &self.catalog) {
            Ok(invocation) => {
                log::debug!("Routed to {}", invocation.tool);
                Ok(invocation)
            }
            Err(e) => {
                log::info!("{}; asking for clarification", e);
                Ok(ToolInvocation::clarification(MALFORMED_CLARIFICATION))
            }
        }
    }
}
