//! Text generation through an Ollama chat model.

use std::time::Duration;

use async_trait::async_trait;
use finrag::{RagError, Result};
use serde::{Deserialize, Serialize};
use tracing::{debug, error};

const PROVIDER: &str = "Ollama";

/// One generation call: a system prompt describing the agent and a user prompt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerationRequest {
    pub system: String,
    pub prompt: String,
}

/// A text-generation backend.
#[async_trait]
pub trait TextGenerator: Send + Sync {
    /// Generate a completion for `request`.
    ///
    /// Failures are reported as [`RagError::GenerationError`].
    async fn generate(&self, request: &GenerationRequest) -> Result<String>;

    /// The model name, for logs.
    fn name(&self) -> &str;
}

/// Settings for [`OllamaChatGenerator`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OllamaChatConfig {
    pub base_url: String,
    pub model: String,
    pub temperature: f32,
    /// Deadline for one chat completion.
    pub timeout: Duration,
}

impl Default for OllamaChatConfig {
    fn default() -> Self {
        Self {
            base_url: finrag::ollama::DEFAULT_BASE_URL.to_string(),
            model: "llama3".to_string(),
            temperature: 0.0,
            timeout: Duration::from_secs(300),
        }
    }
}

/// A [`TextGenerator`] calling Ollama's non-streaming `/api/chat` endpoint.
pub struct OllamaChatGenerator {
    client: reqwest::Client,
    endpoint: String,
    config: OllamaChatConfig,
}

impl OllamaChatGenerator {
    pub fn new(config: OllamaChatConfig) -> Result<Self> {
        let client = reqwest::Client::builder().timeout(config.timeout).build().map_err(|e| {
            RagError::InvalidConfiguration(format!("failed to build HTTP client: {e}"))
        })?;
        let endpoint = format!("{}/api/chat", config.base_url.trim_end_matches('/'));
        Ok(Self { client, endpoint, config })
    }
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: [ChatMessage<'a>; 2],
    stream: bool,
    options: ChatOptions,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Serialize)]
struct ChatOptions {
    temperature: f32,
}

#[derive(Deserialize)]
struct ChatResponse {
    message: ResponseMessage,
}

#[derive(Deserialize)]
struct ResponseMessage {
    content: String,
}

fn generation_error(message: String) -> RagError {
    error!(provider = PROVIDER, %message, "chat request failed");
    RagError::GenerationError(message)
}

#[async_trait]
impl TextGenerator for OllamaChatGenerator {
    async fn generate(&self, request: &GenerationRequest) -> Result<String> {
        debug!(
            provider = PROVIDER,
            model = %self.config.model,
            prompt_len = request.prompt.len(),
            "generating"
        );

        let body = ChatRequest {
            model: &self.config.model,
            messages: [
                ChatMessage { role: "system", content: &request.system },
                ChatMessage { role: "user", content: &request.prompt },
            ],
            stream: false,
            options: ChatOptions { temperature: self.config.temperature },
        };

        let response = self
            .client
            .post(&self.endpoint)
            .json(&body)
            .send()
            .await
            .map_err(|e| generation_error(format!("request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(generation_error(format!("API returned {status}: {detail}")));
        }

        let parsed: ChatResponse = response
            .json()
            .await
            .map_err(|e| generation_error(format!("failed to parse response: {e}")))?;

        Ok(parsed.message.content)
    }

    fn name(&self) -> &str {
        &self.config.model
    }
}
