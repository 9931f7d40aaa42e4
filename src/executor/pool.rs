//! Bounded pool of remote sessions
//!
//! A semaphore bounds how many sessions are in use at once; callers block
//! (up to the acquire timeout) when the pool is exhausted. Idle sessions are
//! reused until they report unhealthy.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::{OwnedSemaphorePermit, Semaphore};

use super::transport::{RemoteSession, RemoteTransport, TransportError};

type IdleList = Arc<Mutex<Vec<Box<dyn RemoteSession>>>>;

/// Pool of authenticated sessions to one host
pub struct SessionPool {
    transport: Arc<dyn RemoteTransport>,
    permits: Arc<Semaphore>,
    idle: IdleList,
    max_size: usize,
    acquire_timeout: Duration,
}

impl SessionPool {
    pub fn new(transport: Arc<dyn RemoteTransport>, max_size: usize, acquire_timeout: Duration) -> Self {
        let max_size = max_size.max(1);
        Self {
            transport,
            permits: Arc::new(Semaphore::new(max_size)),
            idle: Arc::new(Mutex::new(Vec::new())),
            max_size,
            acquire_timeout,
        }
    }

    pub fn target(&self) -> String {
        self.transport.target()
    }

    /// Sessions currently parked for reuse
    pub fn idle_count(&self) -> usize {
        self.idle.lock().map(|idle| idle.len()).unwrap_or(0)
    }

    /// Permits not currently held by callers
    pub fn available(&self) -> usize {
        self.permits.available_permits()
    }

    /// Reuse an idle healthy session, or open a new one
    pub async fn acquire(&self) -> Result<PooledSession, TransportError> {
        let permit = self.permit().await?;

        while let Some(session) = self.pop_idle() {
            if session.is_healthy() {
                log::debug!("Reusing remote session {}", session.id());
                return Ok(self.wrap(session, permit));
            }
            log::debug!("Discarding stale remote session {}", session.id());
            session.close().await;
        }

        let session = self.transport.connect().await?;
        Ok(self.wrap(session, permit))
    }

    /// Open a freshly authenticated session, bypassing idle ones
    pub async fn acquire_fresh(&self) -> Result<PooledSession, TransportError> {
        let permit = self.permit().await?;
        let session = self.transport.connect().await?;
        Ok(self.wrap(session, permit))
    }

    /// Close every idle session
    pub async fn shutdown(&self) {
        while let Some(session) = self.pop_idle() {
            session.close().await;
        }
    }

    async fn permit(&self) -> Result<OwnedSemaphorePermit, TransportError> {
        let exhausted = || TransportError::PoolExhausted {
            timeout_ms: self.acquire_timeout.as_millis() as u64,
        };
        match tokio::time::timeout(self.acquire_timeout, self.permits.clone().acquire_owned()).await {
            Ok(Ok(permit)) => Ok(permit),
            Ok(Err(_)) | Err(_) => Err(exhausted()),
        }
    }

    fn pop_idle(&self) -> Option<Box<dyn RemoteSession>> {
        self.idle.lock().ok().and_then(|mut idle| idle.pop())
    }

    fn wrap(&self, session: Box<dyn RemoteSession>, permit: OwnedSemaphorePermit) -> PooledSession {
        PooledSession {
            session: Some(session),
            idle: self.idle.clone(),
            max_idle: self.max_size,
            discard: false,
            _permit: permit,
        }
    }
}

/// A checked-out session; returns to the pool on drop unless discarded
pub struct PooledSession {
    session: Option<Box<dyn RemoteSession>>,
    idle: IdleList,
    max_idle: usize,
    discard: bool,
    _permit: OwnedSemaphorePermit,
}

impl PooledSession {
    pub fn session(&self) -> Option<&dyn RemoteSession> {
        self.session.as_deref()
    }

    /// Do not return this session to the pool
    pub fn discard(&mut self) {
        self.discard = true;
    }
}

impl Drop for PooledSession {
    fn drop(&mut self) {
        let Some(session) = self.session.take() else {
            return;
        };

        if !self.discard && session.is_healthy() {
            if let Ok(mut idle) = self.idle.lock() {
                if idle.len() < self.max_idle {
                    idle.push(session);
                    return;
                }
            }
        }

        // Close asynchronously when a runtime is available
        if let Ok(handle) = tokio::runtime::Handle::try_current() {
            handle.spawn(async move {
                session.close().await;
            });
        }
    }
}
