//! Configuration for context retrieval.

use serde::{Deserialize, Serialize};

use crate::chunking::validate_window;
use crate::error::{RagError, Result};

/// Parameters for one retrieval: windowing, selection and embedding fan-out.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RetrievalConfig {
    /// Maximum chunk size in characters.
    pub chunk_size: usize,
    /// Number of overlapping characters between consecutive chunks.
    pub chunk_overlap: usize,
    /// Number of chunks kept in the context.
    pub top_k: usize,
    /// Maximum number of embedding requests in flight.
    pub embed_concurrency: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self { chunk_size: 1200, chunk_overlap: 100, top_k: 5, embed_concurrency: 4 }
    }
}

impl RetrievalConfig {
    /// Create a new builder for constructing a [`RetrievalConfig`].
    pub fn builder() -> RetrievalConfigBuilder {
        RetrievalConfigBuilder::default()
    }

    /// Check that the parameters are consistent.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::InvalidConfiguration`] if:
    /// - `chunk_size == 0` or `chunk_overlap >= chunk_size`
    /// - `top_k == 0`
    /// - `embed_concurrency == 0`
    pub fn validate(&self) -> Result<()> {
        validate_window(self.chunk_size, self.chunk_overlap)?;
        if self.top_k == 0 {
            return Err(RagError::InvalidConfiguration(
                "top_k must be greater than zero".to_string(),
            ));
        }
        if self.embed_concurrency == 0 {
            return Err(RagError::InvalidConfiguration(
                "embed_concurrency must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

/// Builder for constructing a validated [`RetrievalConfig`].
#[derive(Debug, Clone, Default)]
pub struct RetrievalConfigBuilder {
    config: RetrievalConfig,
}

impl RetrievalConfigBuilder {
    /// Set the maximum chunk size in characters.
    pub fn chunk_size(mut self, size: usize) -> Self {
        self.config.chunk_size = size;
        self
    }

    /// Set the overlap between consecutive chunks in characters.
    pub fn chunk_overlap(mut self, overlap: usize) -> Self {
        self.config.chunk_overlap = overlap;
        self
    }

    /// Set the number of chunks kept in the context.
    pub fn top_k(mut self, k: usize) -> Self {
        self.config.top_k = k;
        self
    }

    /// Set the maximum number of concurrent embedding requests.
    pub fn embed_concurrency(mut self, concurrency: usize) -> Self {
        self.config.embed_concurrency = concurrency;
        self
    }

    /// Build the [`RetrievalConfig`], validating that parameters are consistent.
    ///
    /// # Errors
    ///
    /// See [`RetrievalConfig::validate`].
    pub fn build(self) -> Result<RetrievalConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}
