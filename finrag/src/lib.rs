//! Retrieval core for the financial document analyzer.
//!
//! This crate provides:
//! - [`FixedSizeChunker`]: overlapping fixed-size character windows
//! - [`EmbeddingProvider`] and the Ollama-backed [`OllamaEmbeddingProvider`]
//! - [`rank`]: cosine-similarity top-k selection
//! - [`Retriever`]: document text + query → context string, plus keyword-gated
//!   web-search augmentation through a [`SearchProvider`]

pub mod augmentation;
pub mod chunking;
pub mod config;
pub mod embedding;
pub mod error;
pub mod ollama;
pub mod ranking;
pub mod retriever;

pub use augmentation::{
    AUGMENTATION_KEYWORDS, DEFAULT_ENRICHMENT_QUERY, SearchProvider, SerperConfig,
    SerperSearchProvider, needs_augmentation,
};
pub use chunking::{Chunk, FixedSizeChunker, chunk};
pub use config::{RetrievalConfig, RetrievalConfigBuilder};
pub use embedding::{EmbeddingProvider, embed_all, validate_embedding};
pub use error::{RagError, Result};
pub use ollama::{OllamaEmbeddingConfig, OllamaEmbeddingProvider};
pub use ranking::{RankedChunk, cosine_similarity, rank};
pub use retriever::{CONTEXT_SEPARATOR, Retriever, RetrieverBuilder};
