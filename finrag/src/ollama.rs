//! Ollama embedding provider using the `/api/embeddings` endpoint.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, warn};

use crate::embedding::{EmbeddingProvider, validate_embedding};
use crate::error::{RagError, Result};

/// The default Ollama server address.
pub const DEFAULT_BASE_URL: &str = "http://localhost:11434";

/// The default embedding model.
pub const DEFAULT_EMBEDDING_MODEL: &str = "nomic-embed-text";

const PROVIDER: &str = "Ollama";

/// Connection and retry settings for [`OllamaEmbeddingProvider`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OllamaEmbeddingConfig {
    /// Base URL of the Ollama server, without a trailing path.
    pub base_url: String,
    /// Embedding model identifier sent with every request.
    pub model: String,
    /// Deadline for a single embedding call.
    pub timeout: Duration,
    /// Extra attempts after a transient failure.
    pub max_retries: u32,
    /// Delay before the first retry; doubled for each further retry.
    pub retry_backoff: Duration,
}

impl Default for OllamaEmbeddingConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            model: DEFAULT_EMBEDDING_MODEL.to_string(),
            timeout: Duration::from_secs(30),
            max_retries: 2,
            retry_backoff: Duration::from_millis(200),
        }
    }
}

/// An [`EmbeddingProvider`] backed by a local or remote Ollama server.
///
/// Sends `{"model", "prompt"}` to `{base_url}/api/embeddings` and reads the
/// `embedding` array from the response. Timeouts, connection failures and
/// `5xx`/`429` answers are retried with exponential backoff up to
/// `max_retries` times; other failures are returned immediately.
///
/// # Example
///
/// ```rust,ignore
/// use finrag::ollama::{OllamaEmbeddingConfig, OllamaEmbeddingProvider};
///
/// let provider = OllamaEmbeddingProvider::new(OllamaEmbeddingConfig::default())?;
/// let embedding = provider.embed("operating margin").await?;
/// ```
pub struct OllamaEmbeddingProvider {
    client: reqwest::Client,
    endpoint: String,
    config: OllamaEmbeddingConfig,
}

impl OllamaEmbeddingProvider {
    /// Create a new provider from the given settings.
    pub fn new(config: OllamaEmbeddingConfig) -> Result<Self> {
        if config.model.is_empty() {
            return Err(RagError::InvalidConfiguration(
                "embedding model must not be empty".to_string(),
            ));
        }

        let client = reqwest::Client::builder().timeout(config.timeout).build().map_err(|e| {
            RagError::InvalidConfiguration(format!("failed to build HTTP client: {e}"))
        })?;
        let endpoint = format!("{}/api/embeddings", config.base_url.trim_end_matches('/'));

        Ok(Self { client, endpoint, config })
    }

    /// Return the provider settings.
    pub fn config(&self) -> &OllamaEmbeddingConfig {
        &self.config
    }

    async fn embed_once(&self, text: &str) -> std::result::Result<Vec<f32>, Attempt> {
        let request_body = EmbeddingRequest { model: &self.config.model, prompt: text };

        let response =
            self.client.post(&self.endpoint).json(&request_body).send().await.map_err(|e| {
                if e.is_timeout() {
                    Attempt::Transient(RagError::EmbeddingServiceTimeout {
                        provider: PROVIDER.into(),
                        timeout: self.config.timeout,
                    })
                } else {
                    Attempt::Transient(service_error(format!("request failed: {e}")))
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let detail =
                serde_json::from_str::<ErrorResponse>(&body).map(|e| e.error).unwrap_or(body);
            let error = service_error(format!("API returned {status}: {detail}"));
            return Err(if status.is_server_error() || status.as_u16() == 429 {
                Attempt::Transient(error)
            } else {
                Attempt::Fatal(error)
            });
        }

        let parsed: EmbeddingResponse = response.json().await.map_err(|e| {
            if e.is_timeout() {
                Attempt::Transient(RagError::EmbeddingServiceTimeout {
                    provider: PROVIDER.into(),
                    timeout: self.config.timeout,
                })
            } else {
                Attempt::Fatal(service_error(format!("failed to parse response: {e}")))
            }
        })?;

        let embedding = parsed
            .embedding
            .ok_or_else(|| Attempt::Fatal(service_error("response has no embedding field")))?;
        validate_embedding(PROVIDER, &embedding).map_err(Attempt::Fatal)?;
        Ok(embedding)
    }
}

/// Outcome of a failed attempt, split by whether retrying can help.
enum Attempt {
    Transient(RagError),
    Fatal(RagError),
}

fn service_error(message: impl Into<String>) -> RagError {
    RagError::EmbeddingServiceError { provider: PROVIDER.into(), message: message.into() }
}

// ── Ollama API request/response types ──────────────────────────────

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    prompt: &'a str,
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    embedding: Option<Vec<f32>>,
}

#[derive(Deserialize)]
struct ErrorResponse {
    error: String,
}

// ── EmbeddingProvider implementation ───────────────────────────────

#[async_trait]
impl EmbeddingProvider for OllamaEmbeddingProvider {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        debug!(
            provider = PROVIDER,
            model = %self.config.model,
            text_len = text.len(),
            "embedding text"
        );

        let mut attempt = 0;
        loop {
            match self.embed_once(text).await {
                Ok(embedding) => return Ok(embedding),
                Err(Attempt::Transient(e)) if attempt < self.config.max_retries => {
                    let delay =
                        self.config.retry_backoff.saturating_mul(2u32.saturating_pow(attempt));
                    warn!(
                        provider = PROVIDER,
                        attempt,
                        ?delay,
                        error = %e,
                        "retrying embedding request"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(Attempt::Transient(e)) | Err(Attempt::Fatal(e)) => {
                    error!(provider = PROVIDER, attempt, error = %e, "embedding request failed");
                    return Err(e);
                }
            }
        }
    }

    fn name(&self) -> &str {
        PROVIDER
    }
}
