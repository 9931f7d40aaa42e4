//! Strict parsing of the router's structured decision

use serde::Deserialize;
use serde_json::{Map, Value};

use crate::error::{OpsError, Result};
use crate::policy::ToolInvocation;
use crate::tools::{ToolCatalog, ToolName};

/// Wire shape: `{"tool": "<name>", "args": {...}}`
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawDecision {
    tool: String,
    #[serde(default)]
    args: Option<Map<String, Value>>,
}

/// Parse a model reply into an invocation of a catalog tool
///
/// A single surrounding markdown fence is tolerated; nothing is extracted
/// from surrounding prose.
pub fn parse_decision(raw: &str, catalog: &ToolCatalog) -> Result<ToolInvocation> {
    let body = strip_fence(raw)?;
    let decision: RawDecision =
        serde_json::from_str(body).map_err(|e| OpsError::MalformedDecision(e.to_string()))?;

    let tool = ToolName::from_name(&decision.tool)
        .filter(|name| catalog.contains(*name))
        .ok_or_else(|| OpsError::MalformedDecision(format!("unknown tool '{}'", decision.tool)))?;

    Ok(ToolInvocation {
        tool,
        args: decision.args.unwrap_or_default(),
    })
}

fn strip_fence(raw: &str) -> Result<&str> {
    let trimmed = raw.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return Ok(trimmed);
    };

    // Drop the info string (```json) up to the first newline
    let after_info = rest.find('\n').map(|idx| &rest[idx + 1..]).unwrap_or("");
    after_info
        .trim_end()
        .strip_suffix("```")
        .map(str::trim)
        .ok_or_else(|| OpsError::MalformedDecision("unterminated code fence".to_string()))
}
