//! Scripted transport for tests
//!
//! Outcomes are served per command run in push order; once the script is
//! empty the default step (exit 0, no output) answers.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use crate::tools::RemoteCommand;

use super::transport::{RawOutput, RemoteSession, RemoteTransport, RunOutcome, TransportError};

/// One scripted outcome
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MockStep {
    Output(RawOutput),
    Timeout,
    /// The session breaks mid-command
    TransportFailure(String),
}

impl MockStep {
    /// Exit 0 with the given stdout
    pub fn ok(stdout: impl Into<String>) -> Self {
        Self::Output(RawOutput::new(0, stdout, ""))
    }

    /// Arbitrary exit code and streams
    pub fn exit(code: i32, stdout: impl Into<String>, stderr: impl Into<String>) -> Self {
        Self::Output(RawOutput::new(code, stdout, stderr))
    }
}

#[derive(Debug)]
struct MockState {
    steps: VecDeque<MockStep>,
    default: MockStep,
    connect_failures: usize,
    connects: usize,
    commands: Vec<RemoteCommand>,
    run_delay: Option<Duration>,
}

/// Transport double that never touches the network
#[derive(Debug, Clone)]
pub struct MockTransport {
    state: Arc<Mutex<MockState>>,
}

impl Default for MockTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl MockTransport {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(MockState {
                steps: VecDeque::new(),
                default: MockStep::ok(""),
                connect_failures: 0,
                connects: 0,
                commands: Vec::new(),
                run_delay: None,
            })),
        }
    }

    /// Create a transport serving the given steps in order
    pub fn with_steps(steps: impl IntoIterator<Item = MockStep>) -> Self {
        let mock = Self::new();
        for step in steps {
            mock.push(step);
        }
        mock
    }

    /// A host that never accepts a connection
    pub fn unreachable() -> Self {
        let mock = Self::new();
        mock.fail_connects(usize::MAX);
        mock
    }

    /// Queue an outcome for the next command
    pub fn push(&self, step: MockStep) {
        if let Ok(mut state) = self.state.lock() {
            state.steps.push_back(step);
        }
    }

    /// Outcome once the script runs out
    pub fn set_default(&self, step: MockStep) {
        if let Ok(mut state) = self.state.lock() {
            state.default = step;
        }
    }

    /// Fail the next `n` connection attempts (`usize::MAX` fails forever)
    pub fn fail_connects(&self, n: usize) {
        if let Ok(mut state) = self.state.lock() {
            state.connect_failures = n;
        }
    }

    /// Delay every command by `delay`
    pub fn set_run_delay(&self, delay: Duration) {
        if let Ok(mut state) = self.state.lock() {
            state.run_delay = Some(delay);
        }
    }

    /// Connection attempts so far, failed ones included
    pub fn connect_count(&self) -> usize {
        self.state.lock().map(|s| s.connects).unwrap_or(0)
    }

    /// Commands run so far
    pub fn commands(&self) -> Vec<RemoteCommand> {
        self.state.lock().map(|s| s.commands.clone()).unwrap_or_default()
    }

    pub fn run_count(&self) -> usize {
        self.state.lock().map(|s| s.commands.len()).unwrap_or(0)
    }
}

#[async_trait]
impl RemoteTransport for MockTransport {
    async fn connect(&self) -> Result<Box<dyn RemoteSession>, TransportError> {
        let mut state = self
            .state
            .lock()
            .map_err(|_| TransportError::Spawn("mock state poisoned".to_string()))?;
        state.connects += 1;

        if state.connect_failures > 0 {
            if state.connect_failures != usize::MAX {
                state.connect_failures -= 1;
            }
            return Err(TransportError::Connect {
                target: self.target(),
                message: "Connection timed out".to_string(),
            });
        }

        Ok(Box::new(MockSession {
            id: format!("mock-{}", state.connects),
            state: self.state.clone(),
            healthy: AtomicBool::new(true),
        }))
    }

    fn target(&self) -> String {
        "mock@localhost:22".to_string()
    }
}

#[derive(Debug)]
struct MockSession {
    id: String,
    state: Arc<Mutex<MockState>>,
    healthy: AtomicBool,
}

#[async_trait]
impl RemoteSession for MockSession {
    fn id(&self) -> &str {
        &self.id
    }

    async fn run(
        &self,
        command: &RemoteCommand,
        _timeout: Duration,
        _output_limit: usize,
    ) -> Result<RunOutcome, TransportError> {
        let (step, delay) = {
            let mut state = self
                .state
                .lock()
                .map_err(|_| TransportError::Channel("mock state poisoned".to_string()))?;
            state.commands.push(command.clone());
            let next = state.steps.pop_front();
            let step = next.unwrap_or_else(|| state.default.clone());
            (step, state.run_delay)
        };

        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        match step {
            MockStep::Output(output) => Ok(RunOutcome::Completed(output)),
            MockStep::Timeout => Ok(RunOutcome::TimedOut),
            MockStep::TransportFailure(message) => {
                self.healthy.store(false, Ordering::SeqCst);
                Err(TransportError::Channel(message))
            }
        }
    }

    fn is_healthy(&self) -> bool {
        self.healthy.load(Ordering::SeqCst)
    }

    async fn close(&self) {
        self.healthy.store(false, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::CommandTemplate;
    use std::collections::BTreeMap;

    fn uptime() -> RemoteCommand {
        CommandTemplate::program("uptime").render(&BTreeMap::new(), "/ws").unwrap()
    }

    #[tokio::test]
    async fn test_steps_in_order_then_default() {
        let mock = MockTransport::with_steps([MockStep::ok("first"), MockStep::Timeout]);
        let session = mock.connect().await.unwrap();
        let timeout = Duration::from_secs(1);

        let first = session.run(&uptime(), timeout, 1024).await.unwrap();
        assert_eq!(first, RunOutcome::Completed(RawOutput::new(0, "first", "")));
        assert_eq!(session.run(&uptime(), timeout, 1024).await.unwrap(), RunOutcome::TimedOut);
        assert_eq!(
            session.run(&uptime(), timeout, 1024).await.unwrap(),
            RunOutcome::Completed(RawOutput::default())
        );
        assert_eq!(mock.run_count(), 3);
        assert_eq!(mock.commands()[0].argv(), ["uptime"]);
    }

    #[tokio::test]
    async fn test_scripted_connect_failures() {
        let mock = MockTransport::new();
        mock.fail_connects(2);
        assert!(mock.connect().await.is_err());
        assert!(mock.connect().await.is_err());
        assert!(mock.connect().await.is_ok());
        assert_eq!(mock.connect_count(), 3);
    }

    #[tokio::test]
    async fn test_unreachable_never_connects() {
        let mock = MockTransport::unreachable();
        for _ in 0..5 {
            assert!(mock.connect().await.is_err());
        }
    }

    #[tokio::test]
    async fn test_transport_failure_marks_unhealthy() {
        let mock = MockTransport::with_steps([MockStep::TransportFailure("broken pipe".into())]);
        let session = mock.connect().await.unwrap();
        assert!(session.is_healthy());
        assert!(session.run(&uptime(), Duration::from_secs(1), 1024).await.is_err());
        assert!(!session.is_healthy());
    }
}
