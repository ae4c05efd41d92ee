//! Cosine-similarity ranking of chunks against a query embedding.

use serde::{Deserialize, Serialize};

use crate::error::{RagError, Result};

/// A chunk text paired with its similarity to the query.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RankedChunk {
    /// Position of the chunk in the input sequence.
    pub index: usize,
    /// The chunk text.
    pub text: String,
    /// Cosine similarity to the query (higher is more relevant).
    pub score: f32,
}

/// Compute cosine similarity between two vectors of equal length.
///
/// Sums are accumulated in `f64`, so any finite `f32` components give a finite
/// result. Returns 0.0 if either vector has zero magnitude.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let dot: f64 = a.iter().zip(b.iter()).map(|(&x, &y)| f64::from(x) * f64::from(y)).sum();
    let norm_a = a.iter().map(|&x| f64::from(x).powi(2)).sum::<f64>().sqrt();
    let norm_b = b.iter().map(|&x| f64::from(x).powi(2)).sum::<f64>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    let similarity = (dot / (norm_a * norm_b)).clamp(-1.0, 1.0) as f32;
    if similarity.is_finite() { similarity } else { 0.0 }
}

/// Rank `chunks` by the similarity of their vectors to `query_vector`.
///
/// Returns at most `top_k` entries ordered by descending score. Equal scores
/// keep the input order, so the result is deterministic.
///
/// # Errors
///
/// - [`RagError::InvalidConfiguration`] if `top_k == 0`.
/// - [`RagError::DimensionMismatch`] if `chunks` and `chunk_vectors` differ in
///   length or any vector's dimension differs from `query_vector`'s.
pub fn rank<S: AsRef<str>>(
    chunks: &[S],
    chunk_vectors: &[Vec<f32>],
    query_vector: &[f32],
    top_k: usize,
) -> Result<Vec<RankedChunk>> {
    if top_k == 0 {
        return Err(RagError::InvalidConfiguration("top_k must be greater than zero".to_string()));
    }
    if chunks.len() != chunk_vectors.len() {
        return Err(RagError::DimensionMismatch {
            context: "chunk count".to_string(),
            expected: chunks.len(),
            actual: chunk_vectors.len(),
        });
    }
    if let Some((index, vector)) =
        chunk_vectors.iter().enumerate().find(|(_, v)| v.len() != query_vector.len())
    {
        return Err(RagError::DimensionMismatch {
            context: format!("chunk {index}"),
            expected: query_vector.len(),
            actual: vector.len(),
        });
    }

    let mut scored: Vec<RankedChunk> = chunks
        .iter()
        .zip(chunk_vectors)
        .enumerate()
        .map(|(index, (text, vector))| RankedChunk {
            index,
            text: text.as_ref().to_string(),
            score: cosine_similarity(vector, query_vector),
        })
        .collect();

    // `sort_by` is stable: ties stay in input order.
    scored.sort_by(|a, b| b.score.total_cmp(&a.score));
    scored.truncate(top_k);
    Ok(scored)
}
