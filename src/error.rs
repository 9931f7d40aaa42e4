//! Error types for opsgate
//!
//! Centralized error handling using thiserror.

use thiserror::Error;

/// All error types that can occur in opsgate
#[derive(Debug, Error)]
pub enum OpsError {
    /// Router output could not be parsed into a decision
    #[error("Malformed decision: {0}")]
    MalformedDecision(String),

    /// Policy engine refused an invocation
    #[error("Policy denied: {0}")]
    PolicyDenied(String),

    /// Remote session could not be established or broke mid-command
    #[error("Transport error: {0}")]
    Transport(String),

    /// Remote command exceeded its deadline
    #[error("Execution timed out after {timeout_ms}ms")]
    ExecutionTimeout { timeout_ms: u64 },

    /// Inference backend could not be reached
    #[error("Inference unreachable: {0}")]
    InferenceUnreachable(String),

    /// Storage/persistence error
    #[error("Storage error: {0}")]
    Storage(String),

    /// Invalid or incomplete configuration
    #[error("Config error: {0}")]
    Config(String),

    /// Conversation id failed validation
    #[error("Invalid conversation id: {0}")]
    InvalidConversation(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl OpsError {
    /// Errors that end a turn without a usable answer
    pub fn is_fatal_for_turn(&self) -> bool {
        matches!(
            self,
            Self::Transport(_) | Self::ExecutionTimeout { .. } | Self::InferenceUnreachable(_)
        )
    }
}

/// Result type alias for opsgate operations
pub type Result<T> = std::result::Result<T, OpsError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_malformed_decision_error() {
        let err = OpsError::MalformedDecision("missing tool".to_string());
        assert_eq!(err.to_string(), "Malformed decision: missing tool");
    }

    #[test]
    fn test_policy_denied_error() {
        let err = OpsError::PolicyDenied("unknown tool".to_string());
        assert_eq!(err.to_string(), "Policy denied: unknown tool");
    }

    #[test]
    fn test_timeout_error() {
        let err = OpsError::ExecutionTimeout { timeout_ms: 30_000 };
        assert_eq!(err.to_string(), "Execution timed out after 30000ms");
    }

    #[test]
    fn test_fatal_classification() {
        assert!(OpsError::Transport("refused".into()).is_fatal_for_turn());
        assert!(OpsError::ExecutionTimeout { timeout_ms: 1 }.is_fatal_for_turn());
        assert!(OpsError::InferenceUnreachable("down".into()).is_fatal_for_turn());
        assert!(!OpsError::PolicyDenied("no".into()).is_fatal_for_turn());
        assert!(!OpsError::Storage("locked".into()).is_fatal_for_turn());
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: OpsError = io_err.into();
        assert!(matches!(err, OpsError::Io(_)));
        assert!(err.to_string().contains("file not found"));
    }

    #[test]
    fn test_json_error_conversion() {
        let json_err = serde_json::from_str::<serde_json::Value>("invalid").unwrap_err();
        let err: OpsError = json_err.into();
        assert!(matches!(err, OpsError::Json(_)));
    }
}
