//! Remote command templates
//!
//! A template is an ordered list of typed slots. Rendering substitutes each
//! declared slot with exactly one argv token; argument values never pass
//! through a shell-string formatting step. The only place tokens become a
//! command line is `RemoteCommand::command_line`, which quotes every token.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::error::{OpsError, Result};

/// A sanitized argument value, as produced by the policy engine
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum ArgValue {
    Integer(i64),
    /// Absolute path contained in the workspace root
    Path(String),
    Text(String),
}

impl ArgValue {
    /// The single argv token for this value
    pub fn as_token(&self) -> String {
        match self {
            Self::Integer(n) => n.to_string(),
            Self::Path(p) | Self::Text(p) => p.clone(),
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Path(p) | Self::Text(p) => Some(p),
            Self::Integer(_) => None,
        }
    }
}

/// One position in a rendered argv
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Slot {
    /// Fixed token
    Literal(String),
    /// Value of a declared argument
    Arg(String),
    /// The configured workspace root
    WorkspaceRoot,
}

/// Builder over discrete argv slots
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandTemplate {
    slots: Vec<Slot>,
    stdin_arg: Option<String>,
}

impl CommandTemplate {
    /// Start a template with the program name
    pub fn program(name: impl Into<String>) -> Self {
        Self {
            slots: vec![Slot::Literal(name.into())],
            stdin_arg: None,
        }
    }

    /// Append a fixed token
    pub fn literal(mut self, token: impl Into<String>) -> Self {
        self.slots.push(Slot::Literal(token.into()));
        self
    }

    /// Append the value of a declared argument
    pub fn arg(mut self, name: impl Into<String>) -> Self {
        self.slots.push(Slot::Arg(name.into()));
        self
    }

    /// Append the workspace root
    pub fn workspace_root(mut self) -> Self {
        self.slots.push(Slot::WorkspaceRoot);
        self
    }

    /// Feed a declared argument to the command on stdin
    pub fn stdin_from(mut self, name: impl Into<String>) -> Self {
        self.stdin_arg = Some(name.into());
        self
    }

    pub fn slots(&self) -> &[Slot] {
        &self.slots
    }

    /// Names of every argument the template consumes
    pub fn arg_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self
            .slots
            .iter()
            .filter_map(|s| match s {
                Slot::Arg(name) => Some(name.as_str()),
                _ => None,
            })
            .collect();
        if let Some(name) = &self.stdin_arg {
            names.push(name);
        }
        names
    }

    /// Substitute sanitized values into the slots
    pub(crate) fn render(&self, args: &BTreeMap<String, ArgValue>, workspace_root: &str) -> Result<RemoteCommand> {
        let lookup = |name: &str| {
            args.get(name)
                .ok_or_else(|| OpsError::PolicyDenied(format!("template argument '{}' was not supplied", name)))
        };

        let mut argv = Vec::with_capacity(self.slots.len());
        for slot in &self.slots {
            let token = match slot {
                Slot::Literal(token) => token.clone(),
                Slot::Arg(name) => lookup(name)?.as_token(),
                Slot::WorkspaceRoot => workspace_root.to_string(),
            };
            argv.push(token);
        }

        let stdin = match &self.stdin_arg {
            Some(name) => Some(lookup(name)?.as_token()),
            None => None,
        };

        Ok(RemoteCommand { argv, stdin })
    }
}

/// A rendered command: discrete argv tokens plus optional stdin payload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteCommand {
    argv: Vec<String>,
    stdin: Option<String>,
}

impl RemoteCommand {
    pub fn argv(&self) -> &[String] {
        &self.argv
    }

    pub fn program(&self) -> &str {
        self.argv.first().map(String::as_str).unwrap_or_default()
    }

    pub fn stdin(&self) -> Option<&str> {
        self.stdin.as_deref()
    }

    /// Join the argv into one remote command line, quoting every token
    pub fn command_line(&self) -> Result<String> {
        shlex::try_join(self.argv.iter().map(String::as_str))
            .map_err(|e| OpsError::PolicyDenied(format!("argument cannot be quoted: {}", e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(pairs: &[(&str, ArgValue)]) -> BTreeMap<String, ArgValue> {
        pairs.iter().map(|(k, v)| (k.to_string(), v.clone())).collect()
    }

    #[test]
    fn test_render_literals_only() {
        let template = CommandTemplate::program("df").literal("-h").literal("/");
        let cmd = template.render(&BTreeMap::new(), "/ws").unwrap();
        assert_eq!(cmd.argv(), ["df", "-h", "/"]);
        assert_eq!(cmd.program(), "df");
        assert!(cmd.stdin().is_none());
        assert_eq!(shlex::split(&cmd.command_line().unwrap()).unwrap(), vec!["df", "-h", "/"]);
    }

    #[test]
    fn test_render_arg_and_root() {
        let tail = CommandTemplate::program("tail").literal("-n").arg("lines").literal("/var/log/nginx/error.log");
        let cmd = tail.render(&args(&[("lines", ArgValue::Integer(50))]), "/ws").unwrap();
        assert_eq!(cmd.argv(), ["tail", "-n", "50", "/var/log/nginx/error.log"]);

        let ls = CommandTemplate::program("ls").literal("-lh").literal("--").workspace_root();
        let cmd = ls.render(&BTreeMap::new(), "/home/server/ops_workspace").unwrap();
        assert_eq!(cmd.argv().last().unwrap(), "/home/server/ops_workspace");
    }

    #[test]
    fn test_hostile_value_stays_one_token() {
        let template = CommandTemplate::program("cat").literal("--").arg("path");
        let hostile = "/ws/a b; rm -rf / $(reboot) `id` | tee x";
        let cmd = template
            .render(&args(&[("path", ArgValue::Path(hostile.to_string()))]), "/ws")
            .unwrap();

        assert_eq!(cmd.argv().len(), 3);
        let line = cmd.command_line().unwrap();
        let reparsed = shlex::split(&line).unwrap();
        assert_eq!(reparsed, vec!["cat", "--", hostile]);
    }

    #[test]
    fn test_stdin_payload() {
        let template = CommandTemplate::program("tee").literal("--").arg("path").stdin_from("content");
        let cmd = template
            .render(
                &args(&[
                    ("path", ArgValue::Path("/ws/notes.txt".to_string())),
                    ("content", ArgValue::Text("hello\nworld".to_string())),
                ]),
                "/ws",
            )
            .unwrap();
        assert_eq!(cmd.argv(), ["tee", "--", "/ws/notes.txt"]);
        assert_eq!(cmd.stdin(), Some("hello\nworld"));
        assert_eq!(template.arg_names(), vec!["path", "content"]);
    }

    #[test]
    fn test_missing_argument_is_error() {
        let template = CommandTemplate::program("cat").arg("path");
        assert!(template.render(&BTreeMap::new(), "/ws").is_err());
    }

    #[test]
    fn test_nul_byte_cannot_be_quoted() {
        let template = CommandTemplate::program("cat").arg("path");
        let cmd = template
            .render(&args(&[("path", ArgValue::Path("/ws/a\0b".to_string()))]), "/ws")
            .unwrap();
        assert!(cmd.command_line().is_err());
    }
}
