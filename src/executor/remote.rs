//! Remote tool executor
//!
//! Runs approved invocations only. A transport failure is retried once on a
//! freshly authenticated session; timeouts and nonzero exits are never retried.

use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::config::RemoteConfig;
use crate::policy::ApprovedInvocation;
use crate::tools::{ArgValue, RemoteCommand, ToolName};

use super::pool::SessionPool;
use super::result::{ExecutionResult, ExecutionStatus};
use super::transport::{RemoteTransport, RunOutcome, TransportError};

/// Executor settings
#[derive(Debug, Clone)]
pub struct ExecutorConfig {
    pub command_timeout: Duration,
    pub max_output_bytes: usize,
    pub pool_size: usize,
    pub acquire_timeout: Duration,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self::from(&RemoteConfig::default())
    }
}

impl From<&RemoteConfig> for ExecutorConfig {
    fn from(config: &RemoteConfig) -> Self {
        Self {
            command_timeout: Duration::from_millis(config.command_timeout_ms),
            max_output_bytes: config.max_output_bytes,
            pool_size: config.pool_size,
            acquire_timeout: Duration::from_millis(config.acquire_timeout_ms),
        }
    }
}

enum Attempt {
    Finished(RunOutcome),
    Failed(TransportError),
}

/// Executes approved invocations over a pooled remote transport
pub struct RemoteExecutor {
    pool: SessionPool,
    config: ExecutorConfig,
}

impl RemoteExecutor {
    pub fn new(transport: Arc<dyn RemoteTransport>, config: ExecutorConfig) -> Self {
        Self {
            pool: SessionPool::new(transport, config.pool_size, config.acquire_timeout),
            config,
        }
    }

    pub fn pool(&self) -> &SessionPool {
        &self.pool
    }

    /// Run an approved invocation and classify the outcome
    pub async fn execute(&self, approved: &ApprovedInvocation) -> ExecutionResult {
        let tool = approved.tool();
        let start = Instant::now();
        let timeout = approved
            .timeout_ms()
            .map(Duration::from_millis)
            .unwrap_or(self.config.command_timeout);

        let command = match approved.render() {
            Ok(command) => command,
            Err(e) => {
                return ExecutionResult::failed(tool, ExecutionStatus::TransportError, e.to_string())
                    .with_attempts(0);
            }
        };

        let mut attempts = 1;
        let mut outcome = self.attempt(&command, timeout, false).await;

        if let Attempt::Failed(error) = &outcome {
            tracing::warn!(
                tool = %tool,
                target = %self.pool.target(),
                error = %error,
                "Transport error, retrying once with a fresh session"
            );
            attempts = 2;
            outcome = self.attempt(&command, timeout, true).await;
        }

        let elapsed = start.elapsed().as_millis() as u64;
        let result = match outcome {
            Attempt::Finished(RunOutcome::Completed(raw)) => {
                let mut result = ExecutionResult::completed(tool, raw.exit_code, raw.stdout, raw.stderr);
                if result.is_ok() {
                    result.stdout = summarize_stdout(approved, result.stdout);
                }
                result.truncate_to(self.config.max_output_bytes);
                result
            }
            Attempt::Finished(RunOutcome::TimedOut) => ExecutionResult::failed(
                tool,
                ExecutionStatus::Timeout,
                format!("Command timed out after {}ms", timeout.as_millis()),
            ),
            Attempt::Failed(error) => {
                tracing::warn!(tool = %tool, attempts, error = %error, "Transport error after retry, giving up");
                ExecutionResult::failed(tool, ExecutionStatus::TransportError, error.to_string())
            }
        };

        log::info!(
            "Executed {} -> {} in {}ms (attempts: {})",
            tool,
            result.status.label(),
            elapsed,
            attempts
        );
        result.with_duration(elapsed).with_attempts(attempts)
    }

    async fn attempt(&self, command: &RemoteCommand, timeout: Duration, fresh: bool) -> Attempt {
        let acquired = if fresh {
            self.pool.acquire_fresh().await
        } else {
            self.pool.acquire().await
        };
        let mut pooled = match acquired {
            Ok(pooled) => pooled,
            Err(e) => return Attempt::Failed(e),
        };

        let Some(session) = pooled.session() else {
            return Attempt::Failed(TransportError::Channel("session already released".to_string()));
        };

        let run = session.run(command, timeout, self.config.max_output_bytes).await;
        match run {
            Ok(RunOutcome::TimedOut) => {
                // The master may be wedged behind the killed client
                pooled.discard();
                Attempt::Finished(RunOutcome::TimedOut)
            }
            Ok(outcome) => Attempt::Finished(outcome),
            Err(e) => {
                pooled.discard();
                Attempt::Failed(e)
            }
        }
    }

    /// Close idle sessions
    pub async fn shutdown(&self) {
        self.pool.shutdown().await;
    }
}

/// Replace output that carries no information with a short description
fn summarize_stdout(approved: &ApprovedInvocation, stdout: String) -> String {
    match approved.tool() {
        // `tee` echoes the content back
        ToolName::CreateTextFile => {
            let path = approved.arg("path").map(ArgValue::as_token).unwrap_or_default();
            let bytes = approved
                .arg("content")
                .and_then(ArgValue::as_text)
                .map(str::len)
                .unwrap_or(0);
            format!("File '{}' written ({} bytes).", path, bytes)
        }
        ToolName::ListWorkspaceFiles if stdout.trim().is_empty() => "Workspace is empty.".to_string(),
        ToolName::TailNginxError if stdout.trim().is_empty() => "Nginx error log is empty.".to_string(),
        ToolName::TailNginxAccess if stdout.trim().is_empty() => "Nginx access log is empty.".to_string(),
        _ => stdout,
    }
}
