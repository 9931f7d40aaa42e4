//! The policy engine: the single safety chokepoint between router and executor
//!
//! `evaluate` is a pure function of the invocation and static configuration.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde_json::Value;

use crate::config::PolicyConfig;
use crate::error::Result;
use crate::tools::{ArgSpec, ArgType, ArgValue, RiskTier, ToolCatalog, ToolDefinition, ToolName};

use super::path::{ForbiddenPattern, PathRejection, WorkspaceRoot};
use super::verdict::{ApprovedInvocation, DenialReason, PolicyVerdict, ToolInvocation};

/// Shell metacharacters that never belong in an argument
const SHELL_METACHARACTERS: &[char] = &['|', ';', '&', '$', '>', '<', '`'];

const DEFAULT_QUESTION: &str = "Could you clarify what you would like me to check?";
const DEFAULT_REFUSAL: &str = "I can't help with that request using the tools available.";

/// Validates proposed invocations against the catalog and global rules
#[derive(Debug, Clone)]
pub struct PolicyEngine {
    catalog: Arc<ToolCatalog>,
    workspace: WorkspaceRoot,
    forbidden: Vec<ForbiddenPattern>,
    destructive_terms: Vec<String>,
}

impl PolicyEngine {
    pub fn new(catalog: Arc<ToolCatalog>, workspace_root: &str, config: &PolicyConfig) -> Result<Self> {
        Ok(Self {
            catalog,
            workspace: WorkspaceRoot::new(workspace_root)?,
            forbidden: config
                .forbidden_paths
                .iter()
                .filter_map(|p| ForbiddenPattern::parse(p))
                .collect(),
            destructive_terms: config
                .destructive_terms
                .iter()
                .map(|t| t.trim().to_ascii_lowercase())
                .filter(|t| !t.is_empty())
                .collect(),
        })
    }

    pub fn catalog(&self) -> &ToolCatalog {
        &self.catalog
    }

    pub fn workspace_root(&self) -> &str {
        self.workspace.as_str()
    }

    /// Evaluate a proposed invocation
    pub fn evaluate(&self, invocation: &ToolInvocation) -> PolicyVerdict {
        let verdict = self.decide(invocation);
        match &verdict {
            PolicyVerdict::Denied(reason) => {
                log::info!("Policy denied {}: [{}] {}", invocation.tool, reason.code(), reason);
            }
            PolicyVerdict::NeedsClarification { .. } => {
                log::debug!("Policy passed clarification through");
            }
            PolicyVerdict::Approved(approved) => {
                log::debug!("Policy approved {} ({})", approved.tool(), approved.risk().as_str());
            }
        }
        verdict
    }

    /// Evaluate a tool given by wire name (unknown names are denied)
    pub fn evaluate_named(&self, tool: &str, args: serde_json::Map<String, Value>) -> PolicyVerdict {
        match ToolName::from_name(tool) {
            Some(name) => self.evaluate(&ToolInvocation { tool: name, args }),
            None => {
                let reason = DenialReason::UnknownTool { tool: tool.to_string() };
                log::info!("Policy denied {}: [{}] {}", tool, reason.code(), reason);
                PolicyVerdict::Denied(reason)
            }
        }
    }

    fn decide(&self, invocation: &ToolInvocation) -> PolicyVerdict {
        // Resolve the definition
        let Some(tool) = self.catalog.lookup(invocation.tool) else {
            return PolicyVerdict::Denied(DenialReason::UnknownTool {
                tool: invocation.tool.to_string(),
            });
        };

        // Refused tier never passes
        if tool.risk == RiskTier::Refused {
            return PolicyVerdict::Denied(DenialReason::RefusedTool { tool: tool.name });
        }

        // Argument shape
        let mut args = match self.check_shape(tool, invocation) {
            Ok(args) => args,
            Err(reason) => return PolicyVerdict::Denied(reason),
        };

        // Sentinels never execute; their text skips the path and intent scans
        match tool.name {
            ToolName::AskClarification => {
                let question = text_or(&args, "question", DEFAULT_QUESTION);
                return PolicyVerdict::NeedsClarification { question };
            }
            ToolName::Refuse => {
                let reason = text_or(&args, "reason", DEFAULT_REFUSAL);
                return PolicyVerdict::Denied(DenialReason::Refused { reason });
            }
            _ => {}
        }

        // Scanned as supplied; sanitized paths carry the workspace root
        let supplied: Vec<String> = args.values().filter_map(ArgValue::as_text).map(str::to_string).collect();

        // Path containment and forbidden segments
        for spec in tool.args.iter().filter(|a| a.is_path()) {
            let Some(ArgValue::Path(raw)) = args.get(&spec.name) else {
                continue;
            };
            match self.check_path(&spec.name, raw) {
                Ok(absolute) => {
                    args.insert(spec.name.clone(), ArgValue::Path(absolute));
                }
                Err(reason) => return PolicyVerdict::Denied(reason),
            }
        }

        // Destructive intent, independent of the tool chosen
        if let Some(term) = supplied.iter().find_map(|t| self.find_destructive(t)) {
            return PolicyVerdict::Denied(DenialReason::DestructiveIntent { term });
        }

        // Approve with sanitized values
        let Some(template) = tool.template.clone() else {
            return PolicyVerdict::Denied(DenialReason::RefusedTool { tool: tool.name });
        };
        PolicyVerdict::Approved(ApprovedInvocation::new(
            tool.name,
            tool.risk,
            args,
            template,
            self.workspace.as_str().to_string(),
            tool.timeout_ms,
        ))
    }

    /// Type-check every argument; fills integer defaults and clamps ranges
    fn check_shape(
        &self,
        tool: &ToolDefinition,
        invocation: &ToolInvocation,
    ) -> std::result::Result<BTreeMap<String, ArgValue>, DenialReason> {
        let mut out = BTreeMap::new();

        for spec in &tool.args {
            let value = invocation.args.get(&spec.name).filter(|v| !v.is_null());
            match value {
                Some(value) => {
                    out.insert(spec.name.clone(), check_value(spec, value)?);
                }
                None if spec.required => {
                    return Err(invalid(&spec.name, "is required"));
                }
                None => {
                    if let ArgType::Integer { default: Some(d), .. } = spec.arg_type {
                        out.insert(spec.name.clone(), ArgValue::Integer(d));
                    }
                }
            }
        }

        if let Some(unknown) = invocation.args.keys().find(|k| tool.arg(k).is_none()) {
            return Err(invalid(unknown, "is not an argument of this tool"));
        }

        Ok(out)
    }

    fn check_path(&self, field: &str, raw: &str) -> std::result::Result<String, DenialReason> {
        let resolved = self.workspace.resolve(raw).map_err(|rejection| match rejection {
            PathRejection::Empty => invalid(field, "path is empty"),
            PathRejection::ControlCharacter => invalid(field, "path contains control characters"),
            PathRejection::Absolute | PathRejection::Escapes => DenialReason::PathEscapesWorkspace {
                field: field.to_string(),
            },
        })?;

        if self.forbidden.iter().any(|p| p.matches(&resolved.segments)) {
            return Err(DenialReason::ForbiddenPath {
                field: field.to_string(),
            });
        }

        Ok(resolved.absolute)
    }

    /// First destructive term or metacharacter found in `text`
    fn find_destructive(&self, text: &str) -> Option<String> {
        if let Some(c) = text.chars().find(|c| SHELL_METACHARACTERS.contains(c)) {
            return Some(c.to_string());
        }

        let lowered = text.to_lowercase();
        lowered
            .split(|c: char| !c.is_alphanumeric())
            .filter(|word| !word.is_empty())
            .find(|word| self.destructive_terms.iter().any(|t| t == word))
            .map(String::from)
    }
}

fn invalid(field: &str, problem: &str) -> DenialReason {
    DenialReason::InvalidArgument {
        field: field.to_string(),
        problem: problem.to_string(),
    }
}

fn text_or(args: &BTreeMap<String, ArgValue>, name: &str, fallback: &str) -> String {
    args.get(name)
        .and_then(ArgValue::as_text)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .unwrap_or(fallback)
        .to_string()
}

fn check_value(spec: &ArgSpec, value: &Value) -> std::result::Result<ArgValue, DenialReason> {
    match &spec.arg_type {
        ArgType::Text { max_len } => {
            let text = value.as_str().ok_or_else(|| invalid(&spec.name, "must be a string"))?;
            if text.contains('\0') {
                return Err(invalid(&spec.name, "contains a null byte"));
            }
            if let Some(limit) = max_len.filter(|limit| text.len() > *limit) {
                return Err(invalid(&spec.name, &format!("exceeds {} bytes", limit)));
            }
            Ok(ArgValue::Text(text.to_string()))
        }
        ArgType::WorkspacePath => {
            let text = value.as_str().ok_or_else(|| invalid(&spec.name, "must be a string"))?;
            Ok(ArgValue::Path(text.to_string()))
        }
        ArgType::Integer { min, max, .. } => {
            let n = value.as_i64().ok_or_else(|| invalid(&spec.name, "must be an integer"))?;
            Ok(ArgValue::Integer(n.clamp(*min, *max)))
        }
        ArgType::Enum { values } => {
            let text = value.as_str().ok_or_else(|| invalid(&spec.name, "must be a string"))?;
            if values.iter().any(|v| v == text) {
                Ok(ArgValue::Text(text.to_string()))
            } else {
                Err(invalid(&spec.name, &format!("must be one of {}", values.join(", "))))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::{CommandTemplate, ToolDefinition};
    use serde_json::json;

    const ROOT: &str = "/home/server/ops_workspace";

    fn engine() -> PolicyEngine {
        PolicyEngine::new(Arc::new(ToolCatalog::builtin()), ROOT, &PolicyConfig::default()).unwrap()
    }

    fn read(path: &str) -> ToolInvocation {
        ToolInvocation::new(ToolName::ReadTextFile).with_arg("path", path)
    }

    fn denial(verdict: PolicyVerdict) -> DenialReason {
        match verdict {
            PolicyVerdict::Denied(reason) => reason,
            other => panic!("expected denial, got {}", other.label()),
        }
    }

    #[test]
    fn test_approves_safe_read() {
        let verdict = engine().evaluate(&ToolInvocation::new(ToolName::GetDiskFree));
        let approved = verdict.approved().unwrap();
        assert_eq!(approved.tool(), ToolName::GetDiskFree);
        assert_eq!(approved.render().unwrap().argv(), ["df", "-h", "/"]);
    }

    #[test]
    fn test_create_file_sanitizes_path() {
        let inv = ToolInvocation::new(ToolName::CreateTextFile)
            .with_arg("path", "notes.txt")
            .with_arg("content", "hello");
        let verdict = engine().evaluate(&inv);
        let approved = verdict.approved().unwrap();
        assert_eq!(
            approved.arg("path"),
            Some(&ArgValue::Path("/home/server/ops_workspace/notes.txt".to_string()))
        );
        let cmd = approved.render().unwrap();
        assert_eq!(cmd.argv(), ["tee", "--", "/home/server/ops_workspace/notes.txt"]);
        assert_eq!(cmd.stdin(), Some("hello"));
    }

    #[test]
    fn test_traversal_is_denied() {
        let reason = denial(engine().evaluate(&read("../../../etc/passwd")));
        assert_eq!(reason.code(), "path-escapes-workspace");
        assert!(reason.to_string().contains("workspace root"));
    }

    #[test]
    fn test_adversarial_paths_are_denied() {
        let engine = engine();
        for raw in ["/etc/shadow", "~/.ssh/id_rsa", "a/../../b", "notes\0.txt", "", ".", "x/.."] {
            assert!(engine.evaluate(&read(raw)).is_denied(), "{:?} was not denied", raw);
        }
    }

    #[test]
    fn test_forbidden_segments_are_denied() {
        let engine = engine();
        for raw in [".ssh/config", "backup/.env", "keys/id_ed25519.pub", "x/authorized_keys"] {
            let reason = denial(engine.evaluate(&read(raw)));
            assert_eq!(reason.code(), "forbidden-path", "{}", raw);
        }
    }

    #[test]
    fn test_approved_paths_always_contained() {
        let engine = engine();
        for raw in ["a.txt", "dir/b.txt", "dir/../c.txt", "./d/e/f.log", "g//h.md"] {
            let verdict = engine.evaluate(&read(raw));
            let approved = verdict.approved().unwrap();
            let Some(ArgValue::Path(path)) = approved.arg("path") else {
                panic!("no sanitized path for {}", raw);
            };
            assert!(path.starts_with("/home/server/ops_workspace/"), "{}", path);
            assert!(!path.contains("/../") && !path.contains("/./"));
        }
    }

    #[test]
    fn test_refused_tier_always_denied() {
        let engine = engine();
        let argsets = [json!({}), json!({"force": true}), json!({"path": "ok.txt"})];
        for args in argsets {
            let inv = ToolInvocation {
                tool: ToolName::RestartNginx,
                args: args.as_object().unwrap().clone(),
            };
            assert_eq!(denial(engine.evaluate(&inv)).code(), "refused-tool");
        }
    }

    #[test]
    fn test_disabled_tool_is_refused() {
        let catalog = ToolCatalog::builtin().with_disabled(&["get_uptime".to_string()]).unwrap();
        let engine = PolicyEngine::new(Arc::new(catalog), ROOT, &PolicyConfig::default()).unwrap();
        let reason = denial(engine.evaluate(&ToolInvocation::new(ToolName::GetUptime)));
        assert_eq!(reason.code(), "refused-tool");
    }

    #[test]
    fn test_workspace_root_words_are_not_scanned() {
        let engine = PolicyEngine::new(Arc::new(ToolCatalog::builtin()), "/srv/drop/ops", &PolicyConfig::default()).unwrap();

        let verdict = engine.evaluate(&read("notes.txt"));
        let approved = verdict.approved().unwrap();
        assert_eq!(approved.arg("path"), Some(&ArgValue::Path("/srv/drop/ops/notes.txt".to_string())));

        let write = ToolInvocation::new(ToolName::CreateTextFile)
            .with_arg("path", "notes.txt")
            .with_arg("content", "hello");
        assert!(engine.evaluate(&write).approved().is_some());

        // Caller text is still scanned
        let reason = denial(engine.evaluate(&read("drop/notes.txt")));
        assert_eq!(reason.code(), "destructive-intent");
    }

    #[test]
    fn test_unknown_tool_by_name() {
        let reason = denial(engine().evaluate_named("bash", Default::default()));
        assert_eq!(reason.code(), "unknown-tool");
        assert!(reason.to_string().contains("'bash'"));
    }

    #[test]
    fn test_tool_missing_from_catalog() {
        let mut catalog = ToolCatalog::new();
        catalog.add(
            ToolDefinition::new(ToolName::GetUptime, "uptime").with_template(CommandTemplate::program("uptime")),
        );
        let engine = PolicyEngine::new(Arc::new(catalog), ROOT, &PolicyConfig::default()).unwrap();
        let reason = denial(engine.evaluate(&ToolInvocation::new(ToolName::GetDiskFree)));
        assert_eq!(reason.code(), "unknown-tool");
    }

    #[test]
    fn test_shape_errors_cite_field() {
        let engine = engine();

        let missing = denial(engine.evaluate(&ToolInvocation::new(ToolName::ReadTextFile)));
        assert_eq!(
            missing,
            DenialReason::InvalidArgument {
                field: "path".into(),
                problem: "is required".into()
            }
        );

        let wrong_type = denial(engine.evaluate(&ToolInvocation::new(ToolName::ReadTextFile).with_arg("path", 7)));
        assert!(matches!(wrong_type, DenialReason::InvalidArgument { ref field, .. } if field == "path"));

        let extra = denial(engine.evaluate(&ToolInvocation::new(ToolName::GetUptime).with_arg("verbose", true)));
        assert!(matches!(extra, DenialReason::InvalidArgument { ref field, .. } if field == "verbose"));

        let lines = denial(engine.evaluate(&ToolInvocation::new(ToolName::TailNginxError).with_arg("lines", "ten")));
        assert!(matches!(lines, DenialReason::InvalidArgument { ref field, .. } if field == "lines"));
    }

    #[test]
    fn test_content_size_limit() {
        let inv = ToolInvocation::new(ToolName::CreateTextFile)
            .with_arg("path", "big.txt")
            .with_arg("content", "a".repeat(crate::tools::MAX_FILE_CONTENT_BYTES + 1));
        let reason = denial(engine().evaluate(&inv));
        assert!(matches!(reason, DenialReason::InvalidArgument { ref field, .. } if field == "content"));
    }

    #[test]
    fn test_lines_default_and_clamp() {
        let engine = engine();

        let default = engine.evaluate(&ToolInvocation::new(ToolName::TailNginxError));
        assert_eq!(default.approved().unwrap().arg("lines"), Some(&ArgValue::Integer(50)));

        let high = engine.evaluate(&ToolInvocation::new(ToolName::TailNginxAccess).with_arg("lines", 5000));
        assert_eq!(high.approved().unwrap().arg("lines"), Some(&ArgValue::Integer(200)));

        let low = engine.evaluate(&ToolInvocation::new(ToolName::TailNginxAccess).with_arg("lines", -3));
        assert_eq!(low.approved().unwrap().arg("lines"), Some(&ArgValue::Integer(1)));
    }

    #[test]
    fn test_destructive_terms_in_arguments() {
        let engine = engine();
        let inv = ToolInvocation::new(ToolName::CreateTextFile)
            .with_arg("path", "todo.txt")
            .with_arg("content", "please delete the old backups");
        assert_eq!(
            denial(engine.evaluate(&inv)),
            DenialReason::DestructiveIntent { term: "delete".into() }
        );

        let sneaky_path = read("rm");
        assert_eq!(denial(engine.evaluate(&sneaky_path)).code(), "destructive-intent");
    }

    #[test]
    fn test_destructive_scan_uses_word_boundaries() {
        let inv = ToolInvocation::new(ToolName::CreateTextFile)
            .with_arg("path", "info.txt")
            .with_arg("content", "information about formats and firmware");
        assert!(engine().evaluate(&inv).is_approved());
    }

    #[test]
    fn test_shell_metacharacters_denied() {
        let engine = engine();
        for content in ["a | b", "x; y", "$(id)", "`id`", "out > file", "a && b"] {
            let inv = ToolInvocation::new(ToolName::CreateTextFile)
                .with_arg("path", "m.txt")
                .with_arg("content", content);
            assert_eq!(denial(engine.evaluate(&inv)).code(), "destructive-intent", "{}", content);
        }
    }

    #[test]
    fn test_sentinels_pass_through() {
        let engine = engine();

        let ask = engine.evaluate(&ToolInvocation::clarification("Which log, error or access?"));
        assert!(matches!(ask, PolicyVerdict::NeedsClarification { ref question } if question == "Which log, error or access?"));

        // Sentinel text is not scanned for destructive terms
        let refuse = engine.evaluate(&ToolInvocation::refusal("I won't delete files | sorry"));
        assert_eq!(
            denial(refuse),
            DenialReason::Refused {
                reason: "I won't delete files | sorry".into()
            }
        );

        let bare = engine.evaluate(&ToolInvocation::new(ToolName::AskClarification));
        assert!(matches!(bare, PolicyVerdict::NeedsClarification { ref question } if question == DEFAULT_QUESTION));
    }

    #[test]
    fn test_evaluate_is_deterministic() {
        let engine = engine();
        let cases = [
            read("notes.txt"),
            read("../x"),
            ToolInvocation::new(ToolName::RestartNginx),
            ToolInvocation::new(ToolName::TailNginxError).with_arg("lines", 999),
        ];
        for inv in cases {
            let first = engine.evaluate(&inv);
            for _ in 0..5 {
                let again = engine.evaluate(&inv);
                assert_eq!(first.label(), again.label());
                assert_eq!(first.denial(), again.denial());
                assert_eq!(first.approved().map(|a| a.args().clone()), again.approved().map(|a| a.args().clone()));
            }
        }
    }
}
