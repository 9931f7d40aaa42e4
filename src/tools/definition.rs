//! Tool definitions, argument schemas, and risk tiers
//!
//! A definition is pure data: what the router may propose and what the
//! policy engine validates against.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use super::template::CommandTemplate;

/// The closed set of tool names, including the two non-executing sentinels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolName {
    GetDiskFree,
    GetRamUsage,
    GetCpuUsage,
    GetUptime,
    TailNginxError,
    TailNginxAccess,
    ListWorkspaceFiles,
    ReadTextFile,
    CreateTextFile,
    RestartNginx,
    AskClarification,
    Refuse,
}

impl ToolName {
    pub const ALL: [ToolName; 12] = [
        ToolName::GetDiskFree,
        ToolName::GetRamUsage,
        ToolName::GetCpuUsage,
        ToolName::GetUptime,
        ToolName::TailNginxError,
        ToolName::TailNginxAccess,
        ToolName::ListWorkspaceFiles,
        ToolName::ReadTextFile,
        ToolName::CreateTextFile,
        ToolName::RestartNginx,
        ToolName::AskClarification,
        ToolName::Refuse,
    ];

    /// Wire name used in prompts and decisions
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::GetDiskFree => "get_disk_free",
            Self::GetRamUsage => "get_ram_usage",
            Self::GetCpuUsage => "get_cpu_usage",
            Self::GetUptime => "get_uptime",
            Self::TailNginxError => "tail_nginx_error",
            Self::TailNginxAccess => "tail_nginx_access",
            Self::ListWorkspaceFiles => "list_workspace_files",
            Self::ReadTextFile => "read_text_file",
            Self::CreateTextFile => "create_text_file",
            Self::RestartNginx => "restart_nginx",
            Self::AskClarification => "ask_clarification",
            Self::Refuse => "refuse",
        }
    }

    /// Parse a wire name; exact match only
    pub fn from_name(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|t| t.as_str() == s)
    }

    /// Sentinels represent "no action" decisions and never execute
    pub fn is_sentinel(&self) -> bool {
        matches!(self, Self::AskClarification | Self::Refuse)
    }
}

impl fmt::Display for ToolName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Risk classification of a tool
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RiskTier {
    /// Read-only diagnostics
    SafeRead,
    /// Writes inside the workspace only
    Write,
    /// Never approved, whatever the arguments
    Refused,
}

impl RiskTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SafeRead => "safe-read",
            Self::Write => "write",
            Self::Refused => "refused",
        }
    }
}

/// Declared type of one argument
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ArgType {
    /// Free text, optionally length-limited (bytes)
    Text { max_len: Option<usize> },
    /// Relative path resolved under the workspace root
    WorkspacePath,
    /// Whole number; out-of-range values are clamped into `min..=max`
    Integer { min: i64, max: i64, default: Option<i64> },
    /// One of a fixed set of strings
    Enum { values: Vec<String> },
}

impl ArgType {
    fn json_type(&self) -> &'static str {
        match self {
            Self::Integer { .. } => "integer",
            _ => "string",
        }
    }
}

/// Schema entry for one argument
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArgSpec {
    pub name: String,
    pub arg_type: ArgType,
    pub required: bool,
    pub description: String,
}

impl ArgSpec {
    pub fn text(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            arg_type: ArgType::Text { max_len: None },
            required: true,
            description: description.into(),
        }
    }

    pub fn path(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            arg_type: ArgType::WorkspacePath,
            required: true,
            description: description.into(),
        }
    }

    pub fn integer(name: impl Into<String>, description: impl Into<String>, min: i64, max: i64) -> Self {
        Self {
            name: name.into(),
            arg_type: ArgType::Integer { min, max, default: None },
            required: true,
            description: description.into(),
        }
    }

    pub fn one_of(name: impl Into<String>, description: impl Into<String>, values: &[&str]) -> Self {
        Self {
            name: name.into(),
            arg_type: ArgType::Enum {
                values: values.iter().map(|v| v.to_string()).collect(),
            },
            required: true,
            description: description.into(),
        }
    }

    /// Mark optional; integers with a default are filled in when absent
    pub fn optional(mut self) -> Self {
        self.required = false;
        self
    }

    /// Set the integer default (no effect on other types)
    pub fn with_default(mut self, value: i64) -> Self {
        if let ArgType::Integer { default, .. } = &mut self.arg_type {
            *default = Some(value);
        }
        self
    }

    /// Limit text length in bytes (no effect on other types)
    pub fn with_max_len(mut self, limit: usize) -> Self {
        if let ArgType::Text { max_len } = &mut self.arg_type {
            *max_len = Some(limit);
        }
        self
    }

    pub fn is_path(&self) -> bool {
        self.arg_type == ArgType::WorkspacePath
    }
}

/// A tool definition with execution metadata
#[derive(Debug, Clone)]
pub struct ToolDefinition {
    pub name: ToolName,
    /// Human-readable description for the router prompt
    pub description: String,
    pub args: Vec<ArgSpec>,
    pub risk: RiskTier,
    /// Remote command; `None` only for sentinels
    pub template: Option<CommandTemplate>,
    /// Per-tool timeout, overriding the executor default
    pub timeout_ms: Option<u64>,
}

impl ToolDefinition {
    /// Create a new read-only tool definition with no arguments
    pub fn new(name: ToolName, description: impl Into<String>) -> Self {
        Self {
            name,
            description: description.into(),
            args: Vec::new(),
            risk: RiskTier::SafeRead,
            template: None,
            timeout_ms: None,
        }
    }

    /// Add an argument
    pub fn with_arg(mut self, arg: ArgSpec) -> Self {
        self.args.push(arg);
        self
    }

    /// Set risk tier
    pub fn with_risk(mut self, risk: RiskTier) -> Self {
        self.risk = risk;
        self
    }

    /// Set the remote command template
    pub fn with_template(mut self, template: CommandTemplate) -> Self {
        self.template = Some(template);
        self
    }

    /// Set timeout
    pub fn with_timeout(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = Some(timeout_ms);
        self
    }

    /// Look up an argument spec by name
    pub fn arg(&self, name: &str) -> Option<&ArgSpec> {
        self.args.iter().find(|a| a.name == name)
    }

    /// Effective timeout given the executor default
    pub fn effective_timeout_ms(&self, default_ms: u64) -> u64 {
        self.timeout_ms.unwrap_or(default_ms)
    }

    /// JSON schema of the arguments, as shown to the router
    pub fn input_schema(&self) -> Value {
        let mut properties = serde_json::Map::new();
        for arg in &self.args {
            let mut prop = serde_json::Map::new();
            prop.insert("type".to_string(), json!(arg.arg_type.json_type()));
            prop.insert("description".to_string(), json!(arg.description));
            match &arg.arg_type {
                ArgType::Integer { min, max, default } => {
                    prop.insert("minimum".to_string(), json!(min));
                    prop.insert("maximum".to_string(), json!(max));
                    if let Some(d) = default {
                        prop.insert("default".to_string(), json!(d));
                    }
                }
                ArgType::Enum { values } => {
                    prop.insert("enum".to_string(), json!(values));
                }
                ArgType::Text { .. } | ArgType::WorkspacePath => {}
            }
            properties.insert(arg.name.clone(), Value::Object(prop));
        }

        let required: Vec<&str> = self.args.iter().filter(|a| a.required).map(|a| a.name.as_str()).collect();

        json!({
            "type": "object",
            "properties": properties,
            "required": required
        })
    }
}
