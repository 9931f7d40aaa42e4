//! Fixed replies shared by every formatter

use crate::executor::ExecutionResult;
use crate::policy::DenialReason;
use crate::tools::{ToolCatalog, ToolName};

/// Shown for timeouts and transport failures; details stay in the audit log
pub const CHECK_FAILED: &str = "Sorry, I couldn't complete that check right now. Please try again in a moment.";

/// Shown when the inference backend cannot be reached or the turn runs out of time
pub const ASSISTANT_UNAVAILABLE: &str =
    "Sorry, I can't process requests right now because the assistant backend is unavailable. Please try again later.";

/// User-facing phrasing that does not depend on inference
#[derive(Debug, Clone)]
pub struct Replies {
    capabilities: Vec<String>,
    remote_user: String,
}

impl Replies {
    pub fn new(catalog: &ToolCatalog, remote_user: impl Into<String>) -> Self {
        Self {
            capabilities: catalog
                .capabilities()
                .into_iter()
                .map(|tool| tool.description.clone())
                .collect(),
            remote_user: remote_user.into(),
        }
    }

    pub fn denial(&self, reason: &DenialReason) -> String {
        let mut out = format!("I'm sorry, I can't do that. {}", reason);
        if !self.capabilities.is_empty() {
            out.push_str("\n\nI can help you with:");
            for capability in &self.capabilities {
                out.push_str("\n- ");
                out.push_str(capability);
            }
        }
        out
    }

    /// A nginx log that exists but is unreadable by the remote account
    pub fn nginx_permission(&self, result: &ExecutionResult) -> Option<String> {
        let which = match result.tool {
            ToolName::TailNginxError => "error",
            ToolName::TailNginxAccess => "access",
            _ => return None,
        };
        if !result.stderr.contains("Permission denied") && !result.stdout.contains("Permission denied") {
            return None;
        }
        Some(format!(
            "I can't read the nginx {} log due to file permissions.\n\
             To fix this, the server admin can run:\n\n    sudo usermod -aG adm {}\n\n\
             Then log out and back in.",
            which, self.remote_user
        ))
    }
}

/// Raw tool output in a code block
pub fn raw_result(result: &ExecutionResult) -> String {
    format!("Here's the raw result:\n\n```\n{}\n```", result.combined_output())
}
