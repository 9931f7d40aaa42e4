//! Response formatting - turns a turn's outcome into user-facing text
//!
//! Formatting never fails: every formatter has a deterministic fallback.

mod llm;
mod plain;
mod replies;

use async_trait::async_trait;

use crate::executor::ExecutionResult;
use crate::policy::DenialReason;

pub use llm::{FORMAT_TEMPERATURE, LlmFormatter};
pub use plain::PlainFormatter;
pub use replies::{ASSISTANT_UNAVAILABLE, CHECK_FAILED, Replies, raw_result};

/// Terminal outcome of a turn, ready for formatting
#[derive(Debug, Clone)]
pub enum TurnOutcome {
    Executed(ExecutionResult),
    Denied(DenialReason),
    Clarification(String),
    /// Inference backend unreachable or the turn deadline passed
    Unavailable,
}

#[async_trait]
pub trait ResponseFormatter: Send + Sync {
    async fn format(&self, outcome: &TurnOutcome, user_text: &str) -> String;
}
