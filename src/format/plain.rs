//! Deterministic formatter, no inference

use async_trait::async_trait;

use super::replies::{ASSISTANT_UNAVAILABLE, CHECK_FAILED, Replies};
use super::{ResponseFormatter, TurnOutcome};

pub struct PlainFormatter {
    replies: Replies,
}

impl PlainFormatter {
    pub fn new(replies: Replies) -> Self {
        Self { replies }
    }
}

#[async_trait]
impl ResponseFormatter for PlainFormatter {
    async fn format(&self, outcome: &TurnOutcome, _user_text: &str) -> String {
        match outcome {
            TurnOutcome::Clarification(question) => question.clone(),
            TurnOutcome::Denied(reason) => self.replies.denial(reason),
            TurnOutcome::Unavailable => ASSISTANT_UNAVAILABLE.to_string(),
            TurnOutcome::Executed(result) if result.status.is_failure() => CHECK_FAILED.to_string(),
            TurnOutcome::Executed(result) => {
                if let Some(advice) = self.replies.nginx_permission(result) {
                    return advice;
                }
                match result.status.exit_code() {
                    Some(0) => result.combined_output(),
                    Some(code) => format!(
                        "The check finished with exit code {}:\n\n```\n{}\n```",
                        code,
                        result.combined_output()
                    ),
                    None => CHECK_FAILED.to_string(),
                }
            }
        }
    }
}
