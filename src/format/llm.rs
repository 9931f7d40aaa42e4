//! Inference-backed formatter

use std::sync::Arc;

use async_trait::async_trait;

use crate::executor::ExecutionResult;
use crate::llm::{CompletionRequest, LlmClient};

use super::replies::{ASSISTANT_UNAVAILABLE, CHECK_FAILED, Replies, raw_result};
use super::{ResponseFormatter, TurnOutcome};

const FORMATTER_PROMPT: &str = "You are a friendly Ops Assistant helping a non-technical user.
You are given raw output from a server tool. Your job is to:
1. Explain results in plain English, short and clear.
2. Show key numbers with proper units (GB, MB, %, etc.).
3. For nginx logs: briefly summarize what you see, highlight the last 3-5 relevant lines.
4. Never dump raw command output without explanation.
5. Be warm and helpful. Use bullet points or bold for clarity.
6. If there's an error or permission issue, explain it simply and suggest a fix.
7. Keep answers concise, no more than 150 words unless log analysis requires more.";

/// Default formatter temperature
pub const FORMAT_TEMPERATURE: f32 = 0.3;

/// Explains tool output through the inference backend
pub struct LlmFormatter {
    llm: Arc<dyn LlmClient>,
    replies: Replies,
    temperature: f32,
}

impl LlmFormatter {
    pub fn new(llm: Arc<dyn LlmClient>, replies: Replies) -> Self {
        Self {
            llm,
            replies,
            temperature: FORMAT_TEMPERATURE,
        }
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    async fn explain(&self, result: &ExecutionResult, user_text: &str) -> String {
        let mut output = result.combined_output();
        if let Some(code) = result.status.exit_code().filter(|code| *code != 0) {
            output.push_str(&format!("\n(exit code {})", code));
        }
        let request = CompletionRequest::new(FORMATTER_PROMPT)
            .with_user_message(format!(
                "The user asked: \"{}\"\n\nTool used: {}\nRaw output:\n{}\n\n\
                 Please write a friendly, clear response for this non-technical user.",
                user_text, result.tool, output
            ))
            .with_temperature(self.temperature);

        match self.llm.complete(request).await {
            Ok(response) if !response.content.trim().is_empty() => response.content.trim().to_string(),
            Ok(_) => raw_result(result),
            Err(e) => {
                log::warn!("Formatter inference failed, returning raw output: {}", e);
                raw_result(result)
            }
        }
    }
}

#[async_trait]
impl ResponseFormatter for LlmFormatter {
    async fn format(&self, outcome: &TurnOutcome, user_text: &str) -> String {
        match outcome {
            TurnOutcome::Clarification(question) => question.clone(),
            TurnOutcome::Denied(reason) => self.replies.denial(reason),
            TurnOutcome::Unavailable => ASSISTANT_UNAVAILABLE.to_string(),
            TurnOutcome::Executed(result) if result.status.is_failure() => CHECK_FAILED.to_string(),
            TurnOutcome::Executed(result) => match self.replies.nginx_permission(result) {
                Some(advice) => advice,
                None => self.explain(result, user_text).await,
            },
        }
    }
}
