//! Invocation and verdict types
//!
//! `ApprovedInvocation` can only be constructed inside the policy module, so
//! anything the executor receives has been through `PolicyEngine::evaluate`.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::Result;
use crate::tools::{ArgValue, CommandTemplate, RemoteCommand, RiskTier, ToolName};

/// A proposed tool call, as produced by the router
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolInvocation {
    pub tool: ToolName,
    #[serde(default)]
    pub args: Map<String, Value>,
}

impl ToolInvocation {
    pub fn new(tool: ToolName) -> Self {
        Self { tool, args: Map::new() }
    }

    /// Add an argument
    pub fn with_arg(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.args.insert(name.into(), value.into());
        self
    }

    /// The clarification sentinel with a question for the user
    pub fn clarification(question: impl Into<String>) -> Self {
        Self::new(ToolName::AskClarification).with_arg("question", question.into())
    }

    /// The refusal sentinel with a reason
    pub fn refusal(reason: impl Into<String>) -> Self {
        Self::new(ToolName::Refuse).with_arg("reason", reason.into())
    }

    /// String value of an argument, if present and textual
    pub fn text_arg(&self, name: &str) -> Option<&str> {
        self.args.get(name).and_then(Value::as_str)
    }
}

/// Why an invocation was denied
///
/// `Display` renders the stable, user-facing reason string.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DenialReason {
    UnknownTool { tool: String },
    RefusedTool { tool: ToolName },
    InvalidArgument { field: String, problem: String },
    PathEscapesWorkspace { field: String },
    ForbiddenPath { field: String },
    DestructiveIntent { term: String },
    /// The router chose the refusal sentinel
    Refused { reason: String },
}

impl DenialReason {
    /// Short machine-readable code
    pub fn code(&self) -> &'static str {
        match self {
            Self::UnknownTool { .. } => "unknown-tool",
            Self::RefusedTool { .. } => "refused-tool",
            Self::InvalidArgument { .. } => "invalid-argument",
            Self::PathEscapesWorkspace { .. } => "path-escapes-workspace",
            Self::ForbiddenPath { .. } => "forbidden-path",
            Self::DestructiveIntent { .. } => "destructive-intent",
            Self::Refused { .. } => "refused",
        }
    }
}

impl fmt::Display for DenialReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnknownTool { tool } => {
                write!(f, "Tool '{}' is not available. I can only use approved tools.", tool)
            }
            Self::RefusedTool { tool } => write!(f, "Tool '{}' is not permitted on this server.", tool),
            Self::InvalidArgument { field, problem } => write!(f, "Invalid argument '{}': {}.", field, problem),
            Self::PathEscapesWorkspace { field } => {
                write!(f, "The '{}' path must stay inside the workspace root.", field)
            }
            Self::ForbiddenPath { .. } => f.write_str("Access to that path is not allowed for security reasons."),
            Self::DestructiveIntent { term } => write!(
                f,
                "Destructive actions ('{}') are disabled for safety.",
                term
            ),
            Self::Refused { reason } => f.write_str(reason),
        }
    }
}

/// An invocation that passed every policy check, with sanitized arguments
#[derive(Debug, Clone)]
pub struct ApprovedInvocation {
    tool: ToolName,
    risk: RiskTier,
    args: BTreeMap<String, ArgValue>,
    template: CommandTemplate,
    workspace_root: String,
    timeout_ms: Option<u64>,
}

impl ApprovedInvocation {
    pub(super) fn new(
        tool: ToolName,
        risk: RiskTier,
        args: BTreeMap<String, ArgValue>,
        template: CommandTemplate,
        workspace_root: String,
        timeout_ms: Option<u64>,
    ) -> Self {
        Self {
            tool,
            risk,
            args,
            template,
            workspace_root,
            timeout_ms,
        }
    }

    pub fn tool(&self) -> ToolName {
        self.tool
    }

    pub fn risk(&self) -> RiskTier {
        self.risk
    }

    /// Sanitized argument values
    pub fn args(&self) -> &BTreeMap<String, ArgValue> {
        &self.args
    }

    pub fn arg(&self, name: &str) -> Option<&ArgValue> {
        self.args.get(name)
    }

    /// Per-tool timeout override
    pub fn timeout_ms(&self) -> Option<u64> {
        self.timeout_ms
    }

    /// Render the command from the sanitized values only
    pub fn render(&self) -> Result<RemoteCommand> {
        self.template.render(&self.args, &self.workspace_root)
    }
}

/// Outcome of policy evaluation
#[derive(Debug, Clone)]
pub enum PolicyVerdict {
    Approved(ApprovedInvocation),
    Denied(DenialReason),
    NeedsClarification { question: String },
}

impl PolicyVerdict {
    pub fn is_approved(&self) -> bool {
        matches!(self, Self::Approved(_))
    }

    pub fn is_denied(&self) -> bool {
        matches!(self, Self::Denied(_))
    }

    pub fn denial(&self) -> Option<&DenialReason> {
        match self {
            Self::Denied(reason) => Some(reason),
            _ => None,
        }
    }

    pub fn approved(&self) -> Option<&ApprovedInvocation> {
        match self {
            Self::Approved(approved) => Some(approved),
            _ => None,
        }
    }

    /// Outcome label: `approved`, `denied`, or `needs-clarification`
    pub fn label(&self) -> &'static str {
        match self {
            Self::Approved(_) => "approved",
            Self::Denied(_) => "denied",
            Self::NeedsClarification { .. } => "needs-clarification",
        }
    }
}
