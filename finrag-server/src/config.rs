//! Service configuration, read from the environment.

use std::str::FromStr;
use std::time::Duration;

use finrag::{
    DEFAULT_ENRICHMENT_QUERY, OllamaEmbeddingConfig, RetrievalConfig, SerperConfig,
};

use crate::error::{Result, ServerError};
use crate::generation::OllamaChatConfig;

/// The query used when an upload does not supply one.
pub const DEFAULT_QUERY: &str = "Provide a comprehensive financial analysis.";

/// Everything needed to build and serve the analysis service.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Deadline for one `/analyze` request, extraction through generation.
    pub request_timeout: Duration,
    /// Largest accepted request body in bytes.
    pub max_upload_bytes: usize,
    pub default_query: String,
    pub enrichment_query: String,
    pub retrieval: RetrievalConfig,
    pub embedding: OllamaEmbeddingConfig,
    pub chat: OllamaChatConfig,
    /// Web-search settings; `None` disables augmentation.
    pub serper: Option<SerperConfig>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8000,
            request_timeout: Duration::from_secs(600),
            max_upload_bytes: 25 * 1024 * 1024,
            default_query: DEFAULT_QUERY.to_string(),
            enrichment_query: DEFAULT_ENRICHMENT_QUERY.to_string(),
            retrieval: RetrievalConfig::default(),
            embedding: OllamaEmbeddingConfig::default(),
            chat: OllamaChatConfig::default(),
            serper: None,
        }
    }
}

impl ServerConfig {
    /// Build a configuration from the process environment.
    ///
    /// Unset variables keep their defaults; set but unparsable ones are errors.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build a configuration from an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();
        let get = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        if let Some(host) = get("FINRAG_HOST") {
            config.host = host;
        }
        if let Some(port) = parse(&get, "FINRAG_PORT")? {
            config.port = port;
        }
        if let Some(secs) = parse(&get, "FINRAG_REQUEST_TIMEOUT_SECS")? {
            config.request_timeout = Duration::from_secs(secs);
        }
        if let Some(bytes) = parse(&get, "FINRAG_MAX_UPLOAD_BYTES")? {
            config.max_upload_bytes = bytes;
        }
        if let Some(query) = get("FINRAG_DEFAULT_QUERY") {
            config.default_query = query;
        }
        if let Some(query) = get("FINRAG_ENRICHMENT_QUERY") {
            config.enrichment_query = query;
        }

        if let Some(size) = parse(&get, "FINRAG_CHUNK_SIZE")? {
            config.retrieval.chunk_size = size;
        }
        if let Some(overlap) = parse(&get, "FINRAG_CHUNK_OVERLAP")? {
            config.retrieval.chunk_overlap = overlap;
        }
        if let Some(top_k) = parse(&get, "FINRAG_TOP_K")? {
            config.retrieval.top_k = top_k;
        }
        if let Some(concurrency) = parse(&get, "FINRAG_EMBED_CONCURRENCY")? {
            config.retrieval.embed_concurrency = concurrency;
        }
        config.retrieval.validate()?;

        if let Some(base_url) = get("OLLAMA_BASE_URL") {
            config.embedding.base_url = base_url.clone();
            config.chat.base_url = base_url;
        }
        if let Some(model) = get("OLLAMA_EMBED_MODEL") {
            config.embedding.model = model;
        }
        if let Some(model) = get("OLLAMA_CHAT_MODEL") {
            config.chat.model = model;
        }
        if let Some(secs) = parse(&get, "OLLAMA_EMBED_TIMEOUT_SECS")? {
            config.embedding.timeout = Duration::from_secs(secs);
        }
        if let Some(retries) = parse(&get, "OLLAMA_EMBED_MAX_RETRIES")? {
            config.embedding.max_retries = retries;
        }

        config.serper = get("SERPER_API_KEY").map(SerperConfig::new);

        Ok(config)
    }
}

fn parse<T, G>(get: &G, name: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::fmt::Display,
    G: Fn(&str) -> Option<String>,
{
    get(name)
        .map(|raw| {
            raw.trim()
                .parse::<T>()
                .map_err(|e| ServerError::Config(format!("{name}={raw:?} is invalid: {e}")))
        })
        .transpose()
}
