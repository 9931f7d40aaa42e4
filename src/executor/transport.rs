//! Remote transport traits
//!
//! A transport opens authenticated sessions to the single configured host; a
//! session runs one rendered command at a time.

use std::time::Duration;

use async_trait::async_trait;

use crate::error::OpsError;
use crate::tools::RemoteCommand;

/// Errors raised by the remote transport
#[derive(Debug, Clone, thiserror::Error)]
pub enum TransportError {
    #[error("Could not connect to {target}: {message}")]
    Connect { target: String, message: String },

    #[error("Authentication to {target} failed: {message}")]
    Auth { target: String, message: String },

    #[error("Session channel failed: {0}")]
    Channel(String),

    #[error("Failed to spawn ssh client: {0}")]
    Spawn(String),

    #[error("No remote session available after {timeout_ms}ms")]
    PoolExhausted { timeout_ms: u64 },
}

impl From<TransportError> for OpsError {
    fn from(e: TransportError) -> Self {
        OpsError::Transport(e.to_string())
    }
}

/// Output of a command that ran to completion
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawOutput {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
}

impl RawOutput {
    pub fn new(exit_code: i32, stdout: impl Into<String>, stderr: impl Into<String>) -> Self {
        Self {
            exit_code,
            stdout: stdout.into(),
            stderr: stderr.into(),
        }
    }
}

/// What happened to one command
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    Completed(RawOutput),
    /// Deadline passed; the command was terminated
    TimedOut,
}

/// Opens sessions to the remote host
#[async_trait]
pub trait RemoteTransport: Send + Sync {
    /// Establish a freshly authenticated session
    async fn connect(&self) -> Result<Box<dyn RemoteSession>, TransportError>;

    /// Human-readable target (`user@host:port`)
    fn target(&self) -> String;
}

/// One authenticated session
#[async_trait]
pub trait RemoteSession: Send + Sync {
    fn id(&self) -> &str;

    /// Run a command with a deadline
    ///
    /// At most `output_limit + 1` bytes of each stream are kept; the rest is
    /// read and dropped so the command never stalls on a full pipe.
    async fn run(
        &self,
        command: &RemoteCommand,
        timeout: Duration,
        output_limit: usize,
    ) -> Result<RunOutcome, TransportError>;

    /// Whether the session may be reused
    fn is_healthy(&self) -> bool;

    /// Tear the session down
    async fn close(&self);
}
