//! LLM Client Layer - the narrow "prompt in, text out" inference contract
//!
//! This module provides:
//! - Message types for LLM communication
//! - LlmClient trait for API abstraction, plus a scripted mock
//! - OllamaClient implementation

pub mod client;
pub mod ollama;
pub mod types;

pub use client::{LlmClient, LlmError, MockLlmClient};
pub use ollama::{OllamaClient, OllamaConfig};
pub use types::{CompletionRequest, CompletionResponse, Message, Role, Usage};
