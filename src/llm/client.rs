//! Core LLM client trait, error type, and a scripted mock

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use super::types::{CompletionRequest, CompletionResponse};

/// Stateless LLM client - each call is independent (fresh context)
#[async_trait]
pub trait LlmClient: Send + Sync {
    /// Single completion request (blocking until complete)
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, LlmError>;

    /// Model identifier used for requests
    fn model(&self) -> &str;
}

/// Errors that can occur during LLM operations
#[derive(Debug, Clone, thiserror::Error)]
pub enum LlmError {
    #[error("Inference backend unreachable: {0}")]
    Unreachable(String),

    #[error("Inference request timed out after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    #[error("API error {status}: {message}")]
    ApiError { status: u16, message: String },

    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

impl LlmError {
    /// Whether the backend could not be reached at all (as opposed to answering badly)
    pub fn is_unreachable(&self) -> bool {
        match self {
            LlmError::Unreachable(_) => true,
            LlmError::Timeout { .. } => true,
            LlmError::ApiError { status, .. } => *status >= 500,
            LlmError::InvalidResponse(_) => false,
        }
    }
}

type Responder = dyn Fn(&CompletionRequest) -> Result<String, LlmError> + Send + Sync;

/// Scripted LLM client for tests
///
/// Replies are served from the queue first; once it is empty the responder
/// (if any) answers, otherwise the call fails as unreachable.
#[derive(Clone, Default)]
pub struct MockLlmClient {
    replies: Arc<Mutex<VecDeque<Result<String, LlmError>>>>,
    responder: Option<Arc<Responder>>,
    requests: Arc<Mutex<Vec<CompletionRequest>>>,
}

impl MockLlmClient {
    /// Create a mock with no scripted replies
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a mock that serves the given replies in order
    pub fn with_replies<I, S>(replies: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mock = Self::new();
        for reply in replies {
            mock.push_reply(reply);
        }
        mock
    }

    /// Create a mock that answers every request with a function of it
    pub fn with_responder<F>(responder: F) -> Self
    where
        F: Fn(&CompletionRequest) -> Result<String, LlmError> + Send + Sync + 'static,
    {
        Self {
            responder: Some(Arc::new(responder)),
            ..Self::default()
        }
    }

    /// Queue a successful reply
    pub fn push_reply(&self, reply: impl Into<String>) {
        if let Ok(mut replies) = self.replies.lock() {
            replies.push_back(Ok(reply.into()));
        }
    }

    /// Queue a failure
    pub fn push_error(&self, error: LlmError) {
        if let Ok(mut replies) = self.replies.lock() {
            replies.push_back(Err(error));
        }
    }

    /// Requests received so far
    pub fn requests(&self) -> Vec<CompletionRequest> {
        self.requests.lock().map(|r| r.clone()).unwrap_or_default()
    }

    /// Number of requests received so far
    pub fn call_count(&self) -> usize {
        self.requests.lock().map(|r| r.len()).unwrap_or(0)
    }
}

#[async_trait]
impl LlmClient for MockLlmClient {
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, LlmError> {
        if let Ok(mut requests) = self.requests.lock() {
            requests.push(request.clone());
        }

        let scripted = self.replies.lock().ok().and_then(|mut r| r.pop_front());
        let reply = match scripted {
            Some(reply) => reply,
            None => match &self.responder {
                Some(responder) => responder(&request),
                None => Err(LlmError::Unreachable("no scripted reply".to_string())),
            },
        };

        reply.map(CompletionResponse::text)
    }

    fn model(&self) -> &str {
        "mock-model"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_llm_error_is_unreachable() {
        assert!(LlmError::Unreachable("refused".into()).is_unreachable());
        assert!(LlmError::Timeout { timeout_ms: 10 }.is_unreachable());
        assert!(
            LlmError::ApiError {
                status: 503,
                message: "loading".into()
            }
            .is_unreachable()
        );
        assert!(
            !LlmError::ApiError {
                status: 404,
                message: "model not found".into()
            }
            .is_unreachable()
        );
        assert!(!LlmError::InvalidResponse("bad".into()).is_unreachable());
    }

    #[tokio::test]
    async fn test_mock_serves_replies_in_order() {
        let mock = MockLlmClient::with_replies(["one", "two"]);
        let first = mock.complete(CompletionRequest::new("s")).await.unwrap();
        let second = mock.complete(CompletionRequest::new("s")).await.unwrap();
        assert_eq!(first.content, "one");
        assert_eq!(second.content, "two");
        assert_eq!(mock.call_count(), 2);
    }

    #[tokio::test]
    async fn test_mock_without_script_is_unreachable() {
        let mock = MockLlmClient::new();
        let err = mock.complete(CompletionRequest::new("s")).await.unwrap_err();
        assert!(err.is_unreachable());
    }

    #[tokio::test]
    async fn test_mock_scripted_error() {
        let mock = MockLlmClient::new();
        mock.push_error(LlmError::Timeout { timeout_ms: 5 });
        let err = mock.complete(CompletionRequest::new("s")).await.unwrap_err();
        assert!(matches!(err, LlmError::Timeout { .. }));
    }

    #[tokio::test]
    async fn test_mock_responder_sees_request() {
        let mock = MockLlmClient::with_responder(|req| Ok(format!("echo: {}", req.system)));
        let reply = mock.complete(CompletionRequest::new("hello")).await.unwrap();
        assert_eq!(reply.content, "echo: hello");
        assert_eq!(mock.requests()[0].system, "hello");
    }
}
