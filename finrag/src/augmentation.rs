//! Best-effort web-search augmentation.
//!
//! A query mentioning market or industry context (see [`AUGMENTATION_KEYWORDS`])
//! triggers one call to a [`SearchProvider`]. The provider's answer becomes the
//! external context handed to the generation stage next to the document context.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{RagError, Result};

/// Terms that mark a query as needing external market context.
pub const AUGMENTATION_KEYWORDS: [&str; 9] = [
    "domain",
    "industry",
    "market",
    "competitor",
    "sector",
    "macro",
    "trend",
    "compare",
    "performance",
];

/// The enrichment query sent to the search provider when augmentation triggers.
pub const DEFAULT_ENRICHMENT_QUERY: &str =
    "Tesla Q2 2025 financial performance comparison with BYD and Rivian current EV industry trends";

/// Whether `query` contains any of [`AUGMENTATION_KEYWORDS`], ignoring case.
pub fn needs_augmentation(query: &str) -> bool {
    let query = query.to_lowercase();
    AUGMENTATION_KEYWORDS.iter().any(|keyword| query.contains(keyword))
}

/// A web-search backend returning a free-text summary.
///
/// Implementations report every backend failure as
/// [`RagError::AugmentationUnavailable`]; callers treat that kind as
/// "no external data" and propagate anything else.
#[async_trait]
pub trait SearchProvider: Send + Sync {
    /// Search for `query` and summarize the results as plain text.
    async fn search(&self, query: &str) -> Result<String>;
}

/// The Serper search endpoint.
pub const SERPER_SEARCH_URL: &str = "https://google.serper.dev/search";

const PROVIDER: &str = "Serper";

/// Settings for [`SerperSearchProvider`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SerperConfig {
    /// Serper API key sent in the `X-API-KEY` header.
    pub api_key: String,
    /// Search endpoint; overridable for self-hosted proxies and tests.
    pub endpoint: String,
    /// Number of organic results to request.
    pub num_results: usize,
    /// Deadline for one search call.
    pub timeout: Duration,
}

impl SerperConfig {
    /// Settings with the given key and default endpoint, result count and timeout.
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            endpoint: SERPER_SEARCH_URL.to_string(),
            num_results: 5,
            timeout: Duration::from_secs(15),
        }
    }
}

/// A [`SearchProvider`] backed by the Serper Google Search API.
pub struct SerperSearchProvider {
    client: reqwest::Client,
    config: SerperConfig,
}

impl SerperSearchProvider {
    /// Create a new provider.
    pub fn new(config: SerperConfig) -> Result<Self> {
        if config.api_key.is_empty() {
            return Err(RagError::InvalidConfiguration(
                "Serper API key must not be empty".to_string(),
            ));
        }
        let client = reqwest::Client::builder().timeout(config.timeout).build().map_err(|e| {
            RagError::InvalidConfiguration(format!("failed to build HTTP client: {e}"))
        })?;
        Ok(Self { client, config })
    }
}

// ── Serper API request/response types ──────────────────────────────

#[derive(Serialize)]
struct SearchRequest<'a> {
    q: &'a str,
    num: usize,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SearchResponse {
    #[serde(default)]
    answer_box: Option<AnswerBox>,
    #[serde(default)]
    knowledge_graph: Option<KnowledgeGraph>,
    #[serde(default)]
    organic: Vec<OrganicResult>,
}

#[derive(Debug, Deserialize)]
struct AnswerBox {
    answer: Option<String>,
    snippet: Option<String>,
}

#[derive(Debug, Deserialize)]
struct KnowledgeGraph {
    description: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OrganicResult {
    title: String,
    link: String,
    #[serde(default)]
    snippet: Option<String>,
}

/// Render a Serper response as plain text, one block per result.
fn summarize(response: &SearchResponse) -> String {
    let mut blocks = Vec::new();

    if let Some(answer) =
        response.answer_box.as_ref().and_then(|a| a.answer.as_ref().or(a.snippet.as_ref()))
    {
        blocks.push(format!("Answer: {answer}"));
    }
    if let Some(description) =
        response.knowledge_graph.as_ref().and_then(|k| k.description.as_ref())
    {
        blocks.push(format!("Summary: {description}"));
    }
    for result in &response.organic {
        let mut block = format!("Title: {}\nLink: {}", result.title, result.link);
        if let Some(snippet) = &result.snippet {
            block.push_str("\nSnippet: ");
            block.push_str(snippet);
        }
        blocks.push(block);
    }

    blocks.join("\n---\n")
}

fn unavailable(message: String) -> RagError {
    debug!(provider = PROVIDER, %message, "search request failed");
    RagError::AugmentationUnavailable(message)
}

#[async_trait]
impl SearchProvider for SerperSearchProvider {
    async fn search(&self, query: &str) -> Result<String> {
        debug!(provider = PROVIDER, query, "searching");

        let response = self
            .client
            .post(&self.config.endpoint)
            .header("X-API-KEY", &self.config.api_key)
            .json(&SearchRequest { q: query, num: self.config.num_results })
            .send()
            .await
            .map_err(|e| unavailable(format!("request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(unavailable(format!("API returned {status}: {body}")));
        }

        let parsed: SearchResponse = response
            .json()
            .await
            .map_err(|e| unavailable(format!("failed to parse response: {e}")))?;

        Ok(summarize(&parsed))
    }
}
