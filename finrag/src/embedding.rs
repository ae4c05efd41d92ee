//! Embedding provider trait and bounded concurrent fan-out.

use async_trait::async_trait;
use futures::{StreamExt, TryStreamExt, stream};
use tracing::debug;

use crate::error::{RagError, Result};

/// A provider that generates vector embeddings from text input.
///
/// Implementations wrap a remote embedding backend. Each call to
/// [`embed`](EmbeddingProvider::embed) is one independent request; callers
/// wanting throughput fan out with [`embed_all`].
///
/// # Example
///
/// ```rust,ignore
/// use finrag::EmbeddingProvider;
///
/// let provider = OllamaEmbeddingProvider::new(OllamaConfig::default())?;
/// let embedding = provider.embed("net revenue grew 12%").await?;
/// ```
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Generate an embedding vector for a single text input.
    ///
    /// Implementations must return a non-empty vector of finite values or an
    /// [`RagError::EmbeddingServiceError`] / [`RagError::EmbeddingServiceTimeout`].
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// Short provider name used in logs and errors.
    fn name(&self) -> &str;
}

/// Embed every text with at most `concurrency` requests in flight.
///
/// Results come back in the order of `texts`. The first failure aborts the
/// whole batch: the remaining in-flight requests are dropped and no partial
/// result is returned.
pub async fn embed_all(
    provider: &dyn EmbeddingProvider,
    texts: &[&str],
    concurrency: usize,
) -> Result<Vec<Vec<f32>>> {
    if texts.is_empty() {
        return Ok(Vec::new());
    }

    debug!(provider = provider.name(), count = texts.len(), concurrency, "embedding batch");

    let tagged: Vec<(usize, Vec<f32>)> = stream::iter(texts.iter().enumerate())
        .map(|(index, text)| async move { provider.embed(text).await.map(|v| (index, v)) })
        .buffer_unordered(concurrency.max(1))
        // Boxed as `Send` so callers can prove `Send` for the returned future
        // despite the higher-ranked lifetimes in the closure above.
        .boxed()
        .try_collect()
        .await?;

    let mut ordered: Vec<Option<Vec<f32>>> = vec![None; texts.len()];
    for (index, vector) in tagged {
        ordered[index] = Some(vector);
    }

    ordered
        .into_iter()
        .enumerate()
        .map(|(index, vector)| {
            vector.ok_or_else(|| RagError::EmbeddingServiceError {
                provider: provider.name().to_string(),
                message: format!("missing embedding for chunk {index}"),
            })
        })
        .collect()
}

/// Check that an embedding returned by a provider is usable for ranking.
pub fn validate_embedding(provider: &str, embedding: &[f32]) -> Result<()> {
    if embedding.is_empty() {
        return Err(RagError::EmbeddingServiceError {
            provider: provider.to_string(),
            message: "service returned an empty embedding".to_string(),
        });
    }
    if let Some(position) = embedding.iter().position(|x| !x.is_finite()) {
        return Err(RagError::EmbeddingServiceError {
            provider: provider.to_string(),
            message: format!("embedding component {position} is not a finite number"),
        });
    }
    Ok(())
}
