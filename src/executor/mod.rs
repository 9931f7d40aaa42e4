//! Remote Tool Executor - runs approved invocations on the remote host
//!
//! This module provides:
//! - RemoteTransport / RemoteSession traits
//! - SshTransport over the system OpenSSH client
//! - SessionPool, a bounded pool of reusable sessions
//! - RemoteExecutor with timeouts, truncation, and a single transport retry
//! - MockTransport for tests

pub mod mock;
mod pool;
mod remote;
mod result;
mod ssh;
mod transport;

pub use mock::{MockStep, MockTransport};
pub use pool::{PooledSession, SessionPool};
pub use remote::{ExecutorConfig, RemoteExecutor};
pub use result::{ExecutionResult, ExecutionStatus, TRUNCATION_MARKER, truncate_chars, truncate_output};
pub use ssh::{SshConfig, SshSession, SshTransport};
pub use transport::{RawOutput, RemoteSession, RemoteTransport, RunOutcome, TransportError};
