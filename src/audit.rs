//! Turn audit records
//!
//! One `TurnAudit` is persisted per turn, whatever its outcome. Failure
//! details for timeouts and transport errors are kept here and nowhere
//! user-facing.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::executor::{ExecutionResult, ExecutionStatus, truncate_chars};
use crate::id::ConversationId;
use crate::policy::{PolicyVerdict, ToolInvocation};
use crate::tools::{ArgValue, ToolName};

/// Largest raw output kept in an audit record, in characters
pub const AUDIT_OUTPUT_CHARS: usize = 5000;

/// Turn state machine positions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TurnState {
    Received,
    Routed,
    PolicyChecked,
    Executed,
    Denied,
    Clarify,
    Formatted,
    Persisted,
}

impl fmt::Display for TurnState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Received => "RECEIVED",
            Self::Routed => "ROUTED",
            Self::PolicyChecked => "POLICY_CHECKED",
            Self::Executed => "EXECUTED",
            Self::Denied => "DENIED",
            Self::Clarify => "CLARIFY",
            Self::Formatted => "FORMATTED",
            Self::Persisted => "PERSISTED",
        };
        f.write_str(name)
    }
}

/// What the policy engine decided
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "kebab-case")]
pub enum VerdictRecord {
    Approved { args: BTreeMap<String, Value> },
    Denied { code: String, reason: String },
    NeedsClarification { question: String },
}

impl From<&PolicyVerdict> for VerdictRecord {
    fn from(verdict: &PolicyVerdict) -> Self {
        match verdict {
            PolicyVerdict::Approved(approved) => Self::Approved {
                args: approved
                    .args()
                    .iter()
                    .map(|(name, value)| {
                        let value = match value {
                            ArgValue::Integer(n) => Value::from(*n),
                            ArgValue::Path(s) | ArgValue::Text(s) => Value::from(s.as_str()),
                        };
                        (name.clone(), value)
                    })
                    .collect(),
            },
            PolicyVerdict::Denied(reason) => Self::Denied {
                code: reason.code().to_string(),
                reason: reason.to_string(),
            },
            PolicyVerdict::NeedsClarification { question } => Self::NeedsClarification {
                question: question.clone(),
            },
        }
    }
}

/// Summary of an execution result
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionRecord {
    pub tool: ToolName,
    pub status: ExecutionStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exit_code: Option<i32>,
    pub duration_ms: u64,
    pub attempts: u32,
    pub truncated: bool,
    /// Combined stdout/stderr, cut to `AUDIT_OUTPUT_CHARS`
    pub output: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl From<&ExecutionResult> for ExecutionRecord {
    fn from(result: &ExecutionResult) -> Self {
        Self {
            tool: result.tool,
            status: result.status,
            exit_code: result.status.exit_code(),
            duration_ms: result.duration_ms,
            attempts: result.attempts,
            truncated: result.truncated,
            output: truncate_chars(&result.combined_output(), AUDIT_OUTPUT_CHARS),
            detail: result.detail.clone(),
        }
    }
}

/// Complete record of one turn
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TurnAudit {
    pub turn_id: String,
    pub conversation_id: ConversationId,
    pub user_text: String,
    /// States visited, in order
    pub states: Vec<TurnState>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub invocation: Option<ToolInvocation>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub verdict: Option<VerdictRecord>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub execution: Option<ExecutionRecord>,
    /// Turn-level failure (inference unreachable, turn deadline)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub started_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
}

impl TurnAudit {
    /// Start a record in the `RECEIVED` state
    pub fn begin(turn_id: impl Into<String>, conversation_id: ConversationId, user_text: impl Into<String>) -> Self {
        Self {
            turn_id: turn_id.into(),
            conversation_id,
            user_text: user_text.into(),
            states: vec![TurnState::Received],
            invocation: None,
            verdict: None,
            execution: None,
            error: None,
            started_at: Utc::now(),
            finished_at: None,
        }
    }

    pub fn enter(&mut self, state: TurnState) {
        self.states.push(state);
    }

    pub fn state(&self) -> TurnState {
        self.states.last().copied().unwrap_or(TurnState::Received)
    }

    pub fn record_invocation(&mut self, invocation: &ToolInvocation) {
        self.invocation = Some(invocation.clone());
    }

    pub fn record_verdict(&mut self, verdict: &PolicyVerdict) {
        self.verdict = Some(VerdictRecord::from(verdict));
    }

    pub fn record_execution(&mut self, result: &ExecutionResult) {
        self.execution = Some(ExecutionRecord::from(result));
    }

    pub fn record_error(&mut self, error: impl Into<String>) {
        self.error = Some(error.into());
    }

    pub fn finish(&mut self) {
        self.finished_at = Some(Utc::now());
    }
}
