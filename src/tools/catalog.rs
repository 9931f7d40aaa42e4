//! Built-in tool catalog
//!
//! The catalog is the single source of truth for both the router prompt and
//! policy validation. It is built once at startup and never mutated.

use std::collections::BTreeMap;
use std::fmt::Write as _;

use crate::error::{OpsError, Result};

use super::definition::{ArgSpec, ArgType, RiskTier, ToolDefinition, ToolName};
use super::template::CommandTemplate;

/// Upper bound on `create_text_file` content
pub const MAX_FILE_CONTENT_BYTES: usize = 64 * 1024;

const NGINX_ERROR_LOG: &str = "/var/log/nginx/error.log";
const NGINX_ACCESS_LOG: &str = "/var/log/nginx/access.log";

/// Catalog of tool definitions
#[derive(Debug, Clone)]
pub struct ToolCatalog {
    tools: BTreeMap<ToolName, ToolDefinition>,
}

impl ToolCatalog {
    /// Create an empty catalog
    pub fn new() -> Self {
        Self { tools: BTreeMap::new() }
    }

    /// The standard catalog
    pub fn builtin() -> Self {
        let lines = || ArgSpec::integer("lines", "Number of log lines to show", 1, 200).optional().with_default(50);

        let mut catalog = Self::new();
        catalog.add(
            ToolDefinition::new(ToolName::GetDiskFree, "Show disk space usage of the root filesystem")
                .with_template(CommandTemplate::program("df").literal("-h").literal("/")),
        );
        catalog.add(
            ToolDefinition::new(ToolName::GetRamUsage, "Show memory (RAM and swap) usage")
                .with_template(CommandTemplate::program("free").literal("-h")),
        );
        catalog.add(
            ToolDefinition::new(ToolName::GetCpuUsage, "Show CPU load averages")
                .with_template(CommandTemplate::program("cat").literal("/proc/loadavg")),
        );
        catalog.add(
            ToolDefinition::new(ToolName::GetUptime, "Show how long the server has been running")
                .with_template(CommandTemplate::program("uptime")),
        );
        catalog.add(
            ToolDefinition::new(ToolName::TailNginxError, "Show the last lines of the nginx error log")
                .with_arg(lines())
                .with_template(
                    CommandTemplate::program("tail")
                        .literal("-n")
                        .arg("lines")
                        .literal(NGINX_ERROR_LOG),
                ),
        );
        catalog.add(
            ToolDefinition::new(ToolName::TailNginxAccess, "Show the last lines of the nginx access log")
                .with_arg(lines())
                .with_template(
                    CommandTemplate::program("tail")
                        .literal("-n")
                        .arg("lines")
                        .literal(NGINX_ACCESS_LOG),
                ),
        );
        catalog.add(
            ToolDefinition::new(ToolName::ListWorkspaceFiles, "List files in the ops workspace")
                .with_template(CommandTemplate::program("ls").literal("-lh").literal("--").workspace_root()),
        );
        catalog.add(
            ToolDefinition::new(ToolName::ReadTextFile, "Read a text file from the ops workspace")
                .with_arg(ArgSpec::path("path", "File path relative to the workspace"))
                .with_template(CommandTemplate::program("cat").literal("--").arg("path")),
        );
        catalog.add(
            ToolDefinition::new(ToolName::CreateTextFile, "Create or overwrite a text file in the ops workspace")
                .with_arg(ArgSpec::path("path", "File path relative to the workspace"))
                .with_arg(ArgSpec::text("content", "Text to write").with_max_len(MAX_FILE_CONTENT_BYTES))
                .with_risk(RiskTier::Write)
                .with_template(
                    CommandTemplate::program("tee")
                        .literal("--")
                        .arg("path")
                        .stdin_from("content"),
                ),
        );
        catalog.add(
            ToolDefinition::new(ToolName::RestartNginx, "Restart the nginx service")
                .with_risk(RiskTier::Refused)
                .with_template(CommandTemplate::program("systemctl").literal("restart").literal("nginx")),
        );
        catalog.add(
            ToolDefinition::new(
                ToolName::AskClarification,
                "Ask the user a question when the request is unclear",
            )
            .with_arg(ArgSpec::text("question", "The question to ask").with_max_len(1000).optional()),
        );
        catalog.add(
            ToolDefinition::new(
                ToolName::Refuse,
                "Decline requests that are unsafe or outside the available tools",
            )
            .with_arg(ArgSpec::text("reason", "Why the request is declined").with_max_len(1000).optional()),
        );
        catalog
    }

    /// Force the named tools into the refused tier
    pub fn with_disabled(mut self, names: &[String]) -> Result<Self> {
        for raw in names {
            let name = ToolName::from_name(raw)
                .ok_or_else(|| OpsError::Config(format!("disabled_tools names an unknown tool: {}", raw)))?;
            if name.is_sentinel() {
                return Err(OpsError::Config(format!("sentinel tool cannot be disabled: {}", raw)));
            }
            if let Some(tool) = self.tools.get_mut(&name) {
                log::info!("Tool {} disabled by configuration", name);
                tool.risk = RiskTier::Refused;
            }
        }
        Ok(self)
    }

    /// Add a tool to the catalog (construction time only)
    pub fn add(&mut self, tool: ToolDefinition) {
        self.tools.insert(tool.name, tool);
    }

    /// Get a tool by name
    pub fn lookup(&self, name: ToolName) -> Option<&ToolDefinition> {
        self.tools.get(&name)
    }

    /// Get a tool by its wire name
    pub fn lookup_str(&self, name: &str) -> Option<&ToolDefinition> {
        ToolName::from_name(name).and_then(|n| self.lookup(n))
    }

    /// All tools, in stable order
    pub fn list(&self) -> Vec<&ToolDefinition> {
        self.tools.values().collect()
    }

    pub fn contains(&self, name: ToolName) -> bool {
        self.tools.contains_key(&name)
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Names of tools that may actually run, for user-facing capability lists
    pub fn capabilities(&self) -> Vec<&ToolDefinition> {
        self.tools
            .values()
            .filter(|t| !t.name.is_sentinel() && t.risk != RiskTier::Refused)
            .collect()
    }

    /// Decision-space description for the router prompt
    pub fn describe_for_prompt(&self) -> String {
        let mut out = String::new();
        for tool in self.tools.values() {
            let _ = write!(out, "- {}: {}", tool.name, tool.description);
            if tool.risk == RiskTier::Refused {
                out.push_str(" (not permitted; choose refuse instead)");
            }
            if tool.args.is_empty() {
                out.push_str(". args: none");
            } else {
                let args: Vec<String> = tool.args.iter().map(describe_arg).collect();
                let _ = write!(out, ". args: {}", args.join(", "));
            }
            out.push('\n');
        }
        out
    }
}

impl Default for ToolCatalog {
    fn default() -> Self {
        Self::builtin()
    }
}

fn describe_arg(arg: &ArgSpec) -> String {
    let kind = match &arg.arg_type {
        ArgType::Text { .. } => "string".to_string(),
        ArgType::WorkspacePath => "relative path inside the workspace".to_string(),
        ArgType::Integer { min, max, default } => match default {
            Some(d) => format!("integer {}-{}, default {}", min, max, d),
            None => format!("integer {}-{}", min, max),
        },
        ArgType::Enum { values } => format!("one of {}", values.join("|")),
    };
    let required = if arg.required { "required" } else { "optional" };
    format!("\"{}\" ({}, {})", arg.name, kind, required)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::template::Slot;

    #[test]
    fn test_builtin_has_every_tool() {
        let catalog = ToolCatalog::builtin();
        assert_eq!(catalog.len(), ToolName::ALL.len());
        for name in ToolName::ALL {
            assert!(catalog.contains(name), "missing {}", name);
        }
    }

    #[test]
    fn test_only_sentinels_lack_templates() {
        let catalog = ToolCatalog::builtin();
        for tool in catalog.list() {
            assert_eq!(tool.template.is_none(), tool.name.is_sentinel(), "{}", tool.name);
        }
    }

    #[test]
    fn test_template_args_are_declared() {
        let catalog = ToolCatalog::builtin();
        for tool in catalog.list() {
            if let Some(template) = &tool.template {
                for name in template.arg_names() {
                    assert!(tool.arg(name).is_some(), "{} uses undeclared {}", tool.name, name);
                }
            }
        }
    }

    #[test]
    fn test_risk_tiers() {
        let catalog = ToolCatalog::builtin();
        assert_eq!(catalog.lookup(ToolName::GetDiskFree).unwrap().risk, RiskTier::SafeRead);
        assert_eq!(catalog.lookup(ToolName::CreateTextFile).unwrap().risk, RiskTier::Write);
        assert_eq!(catalog.lookup(ToolName::RestartNginx).unwrap().risk, RiskTier::Refused);
    }

    #[test]
    fn test_lookup_str() {
        let catalog = ToolCatalog::builtin();
        assert_eq!(catalog.lookup_str("get_uptime").unwrap().name, ToolName::GetUptime);
        assert!(catalog.lookup_str("rm_rf").is_none());
    }

    #[test]
    fn test_with_disabled() {
        let catalog = ToolCatalog::builtin()
            .with_disabled(&["create_text_file".to_string()])
            .unwrap();
        assert_eq!(catalog.lookup(ToolName::CreateTextFile).unwrap().risk, RiskTier::Refused);
        assert!(
            !catalog
                .capabilities()
                .iter()
                .any(|t| t.name == ToolName::CreateTextFile)
        );
    }

    #[test]
    fn test_with_disabled_rejects_unknown_and_sentinels() {
        assert!(ToolCatalog::builtin().with_disabled(&["bash".to_string()]).is_err());
        assert!(ToolCatalog::builtin().with_disabled(&["refuse".to_string()]).is_err());
    }

    #[test]
    fn test_describe_for_prompt() {
        let text = ToolCatalog::builtin().describe_for_prompt();
        assert!(text.contains("- get_disk_free: "));
        assert!(text.contains("\"lines\" (integer 1-200, default 50, optional)"));
        assert!(text.contains("\"path\" (relative path inside the workspace, required)"));
        assert!(text.contains("restart_nginx"));
        assert!(text.contains("not permitted"));
        assert!(text.contains("ask_clarification"));
    }

    #[test]
    fn test_list_workspace_uses_root_slot() {
        let catalog = ToolCatalog::builtin();
        let template = catalog
            .lookup(ToolName::ListWorkspaceFiles)
            .unwrap()
            .template
            .as_ref()
            .unwrap();
        assert_eq!(template.slots().last(), Some(&Slot::WorkspaceRoot));
    }
}
