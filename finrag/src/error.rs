//! Error types for the `finrag` crate.

use std::time::Duration;

use thiserror::Error;

/// Errors that can occur while retrieving context for an analysis request.
#[derive(Debug, Error)]
pub enum RagError {
    /// Chunking or ranking parameters are inconsistent.
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// The uploaded document could not be turned into text.
    #[error("Extraction error: {0}")]
    ExtractionError(String),

    /// The embedding service answered with an error or an unusable payload.
    #[error("Embedding service error ({provider}): {message}")]
    EmbeddingServiceError {
        /// The embedding provider that produced the error.
        provider: String,
        /// A description of the failure.
        message: String,
    },

    /// The embedding service did not answer within the configured deadline.
    #[error("Embedding service timeout ({provider}) after {timeout:?}")]
    EmbeddingServiceTimeout {
        /// The embedding provider that timed out.
        provider: String,
        /// The deadline that elapsed.
        timeout: Duration,
    },

    /// Vectors compared in one ranking do not line up.
    #[error("Dimension mismatch in {context}: expected {expected}, got {actual}")]
    DimensionMismatch {
        /// What was being compared (e.g. `chunk 3`, `chunk count`).
        context: String,
        /// The expected length.
        expected: usize,
        /// The observed length.
        actual: usize,
    },

    /// The web-search augmentation service is unavailable. Never fatal.
    #[error("Augmentation unavailable: {0}")]
    AugmentationUnavailable(String),

    /// The text-generation service failed.
    #[error("Generation error: {0}")]
    GenerationError(String),
}

/// A convenience result type for retrieval operations.
pub type Result<T> = std::result::Result<T, RagError>;
