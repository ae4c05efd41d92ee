//! Retrieval orchestrator.
//!
//! The [`Retriever`] turns a document and a query into the two strings the
//! generation stage consumes: the document context (chunk → embed → rank →
//! join) and the optional external context from web search.
//!
//! # Example
//!
//! ```rust,ignore
//! use finrag::{Retriever, RetrievalConfig};
//!
//! let retriever = Retriever::builder()
//!     .config(RetrievalConfig::default())
//!     .embedding_provider(Arc::new(embedder))
//!     .search_provider(Arc::new(search))  // optional
//!     .build()?;
//!
//! let context = retriever.retrieve_context(&document_text, "summarize liquidity").await?;
//! let external = retriever.external_context("compare market performance").await?;
//! ```

use std::sync::Arc;

use tracing::{debug, error, info, warn};

use crate::augmentation::{DEFAULT_ENRICHMENT_QUERY, SearchProvider, needs_augmentation};
use crate::chunking::FixedSizeChunker;
use crate::config::RetrievalConfig;
use crate::embedding::{EmbeddingProvider, embed_all};
use crate::error::{RagError, Result};
use crate::ranking::{RankedChunk, rank};

/// Separator placed between selected chunks in the document context.
pub const CONTEXT_SEPARATOR: &str = "\n\n";

/// The retrieval orchestrator.
///
/// Holds no per-request state; one instance serves every request. Construct
/// one via [`Retriever::builder()`].
pub struct Retriever {
    config: RetrievalConfig,
    embedding_provider: Arc<dyn EmbeddingProvider>,
    search_provider: Option<Arc<dyn SearchProvider>>,
    enrichment_query: String,
}

impl Retriever {
    /// Create a new [`RetrieverBuilder`].
    pub fn builder() -> RetrieverBuilder {
        RetrieverBuilder::default()
    }

    /// Return a reference to the retrieval configuration.
    pub fn config(&self) -> &RetrievalConfig {
        &self.config
    }

    /// Return the query sent to the search provider when augmentation triggers.
    pub fn enrichment_query(&self) -> &str {
        &self.enrichment_query
    }

    /// Build the document context for `query` using the configured parameters.
    ///
    /// # Errors
    ///
    /// See [`Retriever::retrieve_context_with`].
    pub async fn retrieve_context(&self, document_text: &str, query: &str) -> Result<String> {
        self.retrieve_context_with(document_text, query, &self.config).await
    }

    /// Build the document context for `query` with per-call parameters.
    ///
    /// The selected chunks are joined with [`CONTEXT_SEPARATOR`], most relevant
    /// first. Empty document text yields an empty context without any
    /// embedding call.
    ///
    /// # Errors
    ///
    /// - [`RagError::InvalidConfiguration`] if `config` is invalid; checked
    ///   before any work begins.
    /// - [`RagError::EmbeddingServiceError`] / [`RagError::EmbeddingServiceTimeout`]
    ///   if any chunk or the query fails to embed. No partial context is returned.
    /// - [`RagError::DimensionMismatch`] if the provider returns vectors of
    ///   differing dimensions.
    pub async fn retrieve_context_with(
        &self,
        document_text: &str,
        query: &str,
        config: &RetrievalConfig,
    ) -> Result<String> {
        let ranked = self.rank_chunks(document_text, query, config).await?;
        Ok(ranked.iter().map(|r| r.text.as_str()).collect::<Vec<_>>().join(CONTEXT_SEPARATOR))
    }

    /// Chunk, embed and rank the document, returning the selected chunks with
    /// their scores.
    pub async fn rank_chunks(
        &self,
        document_text: &str,
        query: &str,
        config: &RetrievalConfig,
    ) -> Result<Vec<RankedChunk>> {
        config.validate()?;
        let chunker = FixedSizeChunker::new(config.chunk_size, config.chunk_overlap)?;

        // 1. Chunk the document
        let chunks = chunker.chunk(document_text);
        if chunks.is_empty() {
            info!(chunk_count = 0, "retrieved context (empty document)");
            return Ok(Vec::new());
        }

        // 2. Embed chunks and the query concurrently
        let texts: Vec<&str> = chunks.iter().map(|c| c.text.as_str()).collect();
        let provider = self.embedding_provider.as_ref();
        let (chunk_vectors, query_vector) = tokio::try_join!(
            embed_all(provider, &texts, config.embed_concurrency),
            provider.embed(query),
        )
        .map_err(|e| {
            error!(chunk_count = chunks.len(), error = %e, "embedding failed during retrieval");
            e
        })?;

        // 3. Rank
        let ranked = rank(&texts, &chunk_vectors, &query_vector, config.top_k)?;

        info!(
            chunk_count = chunks.len(),
            selected = ranked.len(),
            top_score = ?ranked.first().map(|r| r.score),
            "retrieved context"
        );
        debug!(indices = ?ranked.iter().map(|r| r.index).collect::<Vec<_>>(), "selected chunks");

        Ok(ranked)
    }

    /// Fetch external market context for `query`, if the query asks for it.
    ///
    /// Returns an empty string when the query matches no augmentation keyword,
    /// when no search provider is configured, or when the provider reports
    /// [`RagError::AugmentationUnavailable`].
    ///
    /// # Errors
    ///
    /// Any other error kind from the provider is propagated.
    pub async fn external_context(&self, query: &str) -> Result<String> {
        if !needs_augmentation(query) {
            return Ok(String::new());
        }
        let Some(search) = &self.search_provider else {
            debug!("augmentation requested but no search provider is configured");
            return Ok(String::new());
        };

        match search.search(&self.enrichment_query).await {
            Ok(summary) => {
                info!(summary_len = summary.len(), "external context retrieved");
                Ok(summary)
            }
            Err(RagError::AugmentationUnavailable(reason)) => {
                warn!(%reason, "external context unavailable, continuing without it");
                Ok(String::new())
            }
            Err(e) => Err(e),
        }
    }
}

/// Builder for constructing a [`Retriever`].
///
/// `embedding_provider` is required; `config` defaults to
/// [`RetrievalConfig::default()`], the search provider is optional and the
/// enrichment query defaults to [`DEFAULT_ENRICHMENT_QUERY`].
#[derive(Default)]
pub struct RetrieverBuilder {
    config: Option<RetrievalConfig>,
    embedding_provider: Option<Arc<dyn EmbeddingProvider>>,
    search_provider: Option<Arc<dyn SearchProvider>>,
    enrichment_query: Option<String>,
}

impl RetrieverBuilder {
    /// Set the retrieval configuration.
    pub fn config(mut self, config: RetrievalConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Set the embedding provider.
    pub fn embedding_provider(mut self, provider: Arc<dyn EmbeddingProvider>) -> Self {
        self.embedding_provider = Some(provider);
        self
    }

    /// Set the web-search provider used for augmentation.
    pub fn search_provider(mut self, provider: Arc<dyn SearchProvider>) -> Self {
        self.search_provider = Some(provider);
        self
    }

    /// Override the query sent to the search provider.
    pub fn enrichment_query(mut self, query: impl Into<String>) -> Self {
        self.enrichment_query = Some(query.into());
        self
    }

    /// Build the [`Retriever`].
    ///
    /// # Errors
    ///
    /// Returns [`RagError::InvalidConfiguration`] if the embedding provider is
    /// missing or the configuration is invalid.
    pub fn build(self) -> Result<Retriever> {
        let config = self.config.unwrap_or_default();
        config.validate()?;
        let embedding_provider = self.embedding_provider.ok_or_else(|| {
            RagError::InvalidConfiguration("embedding_provider is required".to_string())
        })?;

        Ok(Retriever {
            config,
            embedding_provider,
            search_provider: self.search_provider,
            enrichment_query: self
                .enrichment_query
                .unwrap_or_else(|| DEFAULT_ENRICHMENT_QUERY.to_string()),
        })
    }
}
