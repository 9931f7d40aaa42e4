//! Structured execution results

use serde::{Deserialize, Serialize};

use crate::tools::ToolName;

/// Marker appended to output cut at the byte ceiling
pub const TRUNCATION_MARKER: &str = "\n... [output truncated]";

/// How a remote command ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum ExecutionStatus {
    Ok,
    #[serde(rename = "nonzero")]
    NonZero { exit_code: i32 },
    Timeout,
    TransportError,
}

impl ExecutionStatus {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Ok => "ok",
            Self::NonZero { .. } => "nonzero",
            Self::Timeout => "timeout",
            Self::TransportError => "transport-error",
        }
    }

    /// Timeout and transport failures end the turn without an answer
    pub fn is_failure(&self) -> bool {
        matches!(self, Self::Timeout | Self::TransportError)
    }

    pub fn exit_code(&self) -> Option<i32> {
        match self {
            Self::Ok => Some(0),
            Self::NonZero { exit_code } => Some(*exit_code),
            Self::Timeout | Self::TransportError => None,
        }
    }
}

/// Result of running one approved invocation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionResult {
    pub tool: ToolName,
    pub status: ExecutionStatus,
    /// Empty for timeout and transport failures
    pub stdout: String,
    pub stderr: String,
    pub truncated: bool,
    pub duration_ms: u64,
    /// Session attempts made (1, or 2 after a transport retry)
    pub attempts: u32,
    /// Failure reason, kept for the audit record only
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl ExecutionResult {
    pub fn completed(tool: ToolName, exit_code: i32, stdout: String, stderr: String) -> Self {
        let status = if exit_code == 0 {
            ExecutionStatus::Ok
        } else {
            ExecutionStatus::NonZero { exit_code }
        };
        Self {
            tool,
            status,
            stdout,
            stderr,
            truncated: false,
            duration_ms: 0,
            attempts: 1,
            detail: None,
        }
    }

    pub fn failed(tool: ToolName, status: ExecutionStatus, detail: impl Into<String>) -> Self {
        Self {
            tool,
            status,
            stdout: String::new(),
            stderr: String::new(),
            truncated: false,
            duration_ms: 0,
            attempts: 1,
            detail: Some(detail.into()),
        }
    }

    pub fn with_duration(mut self, duration_ms: u64) -> Self {
        self.duration_ms = duration_ms;
        self
    }

    pub fn with_attempts(mut self, attempts: u32) -> Self {
        self.attempts = attempts;
        self
    }

    pub fn is_ok(&self) -> bool {
        self.status == ExecutionStatus::Ok
    }

    /// Stdout followed by stderr, as shown to the formatter
    pub fn combined_output(&self) -> String {
        let mut output = self.stdout.trim_end().to_string();
        let stderr = self.stderr.trim_end();
        if !stderr.is_empty() {
            if !output.is_empty() {
                output.push_str("\n--- stderr ---\n");
            }
            output.push_str(stderr);
        }
        output
    }

    /// Cut both streams to `max_bytes` each
    pub fn truncate_to(&mut self, max_bytes: usize) {
        let out = truncate_output(&mut self.stdout, max_bytes);
        let err = truncate_output(&mut self.stderr, max_bytes);
        self.truncated |= out || err;
    }
}

/// Truncate on a char boundary at or below `max_bytes`, appending the marker
pub fn truncate_output(output: &mut String, max_bytes: usize) -> bool {
    if output.len() <= max_bytes {
        return false;
    }
    let mut cut = max_bytes;
    while !output.is_char_boundary(cut) {
        cut -= 1;
    }
    output.truncate(cut);
    output.push_str(TRUNCATION_MARKER);
    true
}

/// Keep at most `max_chars` characters, appending the marker when cut
pub fn truncate_chars(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => format!("{}{}", &text[..idx], TRUNCATION_MARKER),
        None => text.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_completed_classification() {
        let ok = ExecutionResult::completed(ToolName::GetUptime, 0, "up 3 days".into(), String::new());
        assert_eq!(ok.status, ExecutionStatus::Ok);
        assert!(ok.is_ok());

        let nz = ExecutionResult::completed(ToolName::ReadTextFile, 1, String::new(), "No such file".into());
        assert_eq!(nz.status, ExecutionStatus::NonZero { exit_code: 1 });
        assert_eq!(nz.status.label(), "nonzero");
        assert!(!nz.status.is_failure());
    }

    #[test]
    fn test_failed_has_no_output() {
        let failed = ExecutionResult::failed(ToolName::GetDiskFree, ExecutionStatus::Timeout, "timed out after 30000ms");
        assert!(failed.stdout.is_empty());
        assert!(failed.status.is_failure());
        assert_eq!(failed.status.exit_code(), None);
        assert_eq!(failed.detail.as_deref(), Some("timed out after 30000ms"));
    }

    #[test]
    fn test_status_serialization() {
        let json = serde_json::to_value(ExecutionStatus::NonZero { exit_code: 2 }).unwrap();
        assert_eq!(json, serde_json::json!({"kind": "nonzero", "exit_code": 2}));
        let json = serde_json::to_value(ExecutionStatus::TransportError).unwrap();
        assert_eq!(json, serde_json::json!({"kind": "transport-error"}));
    }

    #[test]
    fn test_truncate_output() {
        let mut small = "hello".to_string();
        assert!(!truncate_output(&mut small, 10));
        assert_eq!(small, "hello");

        let mut big = "abcdefghij".to_string();
        assert!(truncate_output(&mut big, 4));
        assert_eq!(big, format!("abcd{}", TRUNCATION_MARKER));
    }

    #[test]
    fn test_truncate_output_respects_char_boundaries() {
        let mut text = "ééé".to_string(); // 2 bytes each
        assert!(truncate_output(&mut text, 3));
        assert!(text.starts_with('é'));
        assert!(!text.starts_with("éé"));
    }

    #[test]
    fn test_truncate_chars() {
        assert_eq!(truncate_chars("short", 10), "short");
        assert_eq!(truncate_chars("abcdef", 3), format!("abc{}", TRUNCATION_MARKER));
    }

    #[test]
    fn test_combined_output() {
        let mut result = ExecutionResult::completed(ToolName::TailNginxError, 1, "line\n".into(), "Permission denied\n".into());
        assert_eq!(result.combined_output(), "line\n--- stderr ---\nPermission denied");
        result.stdout.clear();
        assert_eq!(result.combined_output(), "Permission denied");
    }

    #[test]
    fn test_truncate_to_sets_flag() {
        let mut result = ExecutionResult::completed(ToolName::GetDiskFree, 0, "x".repeat(100), String::new());
        result.truncate_to(10);
        assert!(result.truncated);
        assert!(result.stdout.ends_with(TRUNCATION_MARKER));
    }
}
