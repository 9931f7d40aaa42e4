//! Ollama chat API client implementation
//!
//! This module implements the LlmClient trait for a local or LAN Ollama server.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde_json::{Value, json};

use crate::config::LlmConfig;
use crate::llm::client::{LlmClient, LlmError};
use crate::llm::types::{CompletionRequest, CompletionResponse, Role, Usage};

/// Chat endpoint path, appended to the base URL
const CHAT_PATH: &str = "/api/chat";

/// Configuration for the Ollama client
#[derive(Debug, Clone)]
pub struct OllamaConfig {
    pub base_url: String,
    pub model: String,
    pub timeout: Duration,
}

impl Default for OllamaConfig {
    fn default() -> Self {
        let llm = LlmConfig::default();
        Self::from(&llm)
    }
}

impl From<&LlmConfig> for OllamaConfig {
    fn from(config: &LlmConfig) -> Self {
        Self {
            base_url: config.base_url.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            timeout: Duration::from_millis(config.timeout_ms),
        }
    }
}

/// Ollama API client
pub struct OllamaClient {
    client: Client,
    config: OllamaConfig,
}

impl OllamaClient {
    /// Create a new Ollama client
    pub fn new(config: OllamaConfig) -> Result<Self, LlmError> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| LlmError::Unreachable(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self { client, config })
    }

    /// Build the request body for the chat endpoint
    fn build_request(&self, request: &CompletionRequest) -> Value {
        let model = request.model.as_ref().unwrap_or(&self.config.model).clone();

        let mut messages: Vec<Value> = Vec::with_capacity(request.messages.len() + 1);
        if !request.system.is_empty() {
            messages.push(json!({"role": "system", "content": request.system}));
        }
        for m in &request.messages {
            messages.push(json!({
                "role": match m.role {
                    Role::System => "system",
                    Role::User => "user",
                    Role::Assistant => "assistant",
                },
                "content": m.content
            }));
        }

        let mut body = json!({
            "model": model,
            "messages": messages,
            "stream": false
        });

        if let Some(temperature) = request.temperature {
            body["options"] = json!({ "temperature": temperature });
        }

        if request.json_output {
            body["format"] = json!("json");
        }

        body
    }

    /// Parse the API response into a CompletionResponse
    fn parse_response(&self, body: Value) -> Result<CompletionResponse, LlmError> {
        let content = body["message"]["content"]
            .as_str()
            .ok_or_else(|| LlmError::InvalidResponse("missing message.content".to_string()))?
            .to_string();

        let usage = Usage::new(
            body["prompt_eval_count"].as_u64().unwrap_or(0),
            body["eval_count"].as_u64().unwrap_or(0),
        );

        Ok(CompletionResponse { content, usage })
    }

    /// Send a request to the chat endpoint
    async fn send_request(&self, body: Value) -> Result<Value, LlmError> {
        let url = format!("{}{}", self.config.base_url, CHAT_PATH);
        let response = self.client.post(&url).json(&body).send().await.map_err(|e| {
            if e.is_timeout() {
                LlmError::Timeout {
                    timeout_ms: self.config.timeout.as_millis() as u64,
                }
            } else {
                LlmError::Unreachable(format!("{} ({})", e, self.config.base_url))
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            let error_body = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(LlmError::ApiError {
                status: status.as_u16(),
                message: error_body,
            });
        }

        response
            .json()
            .await
            .map_err(|e| LlmError::InvalidResponse(format!("Failed to parse response: {}", e)))
    }
}

#[async_trait]
impl LlmClient for OllamaClient {
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, LlmError> {
        let body = self.build_request(&request);
        log::debug!(
            "ollama request: model={} messages={} json={}",
            body["model"],
            request.messages.len(),
            request.json_output
        );
        let response = self.send_request(body).await?;
        self.parse_response(response)
    }

    fn model(&self) -> &str {
        &self.config.model
    }
}

impl std::fmt::Debug for OllamaClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OllamaClient")
            .field("base_url", &self.config.base_url)
            .field("model", &self.config.model)
            .finish()
    }
}
