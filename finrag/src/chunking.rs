//! Fixed-size overlapping chunking.
//!
//! [`FixedSizeChunker`] splits document text into windows of `chunk_size`
//! characters, each window starting `chunk_size - chunk_overlap` characters
//! after the previous one. Windows are measured in Unicode scalar values so a
//! chunk never ends inside a multi-byte character.

use serde::{Deserialize, Serialize};

use crate::error::{RagError, Result};

/// A contiguous window of a document's text.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Chunk {
    /// Position of the chunk in the chunk sequence.
    pub index: usize,
    /// Start offset of the chunk in the document, in characters.
    pub offset: usize,
    /// The text content of the chunk.
    pub text: String,
}

/// Splits text into fixed-size chunks by character count with overlap.
///
/// Concatenating the first [`step`](FixedSizeChunker::step) characters of every
/// chunk (all of the last one) reproduces the input text exactly.
///
/// # Example
///
/// ```rust
/// use finrag::FixedSizeChunker;
///
/// let chunker = FixedSizeChunker::new(4, 1).unwrap();
/// let texts: Vec<String> = chunker.chunk("abcdefghij").into_iter().map(|c| c.text).collect();
/// assert_eq!(texts, ["abcd", "defg", "ghij", "j"]);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FixedSizeChunker {
    chunk_size: usize,
    chunk_overlap: usize,
}

impl FixedSizeChunker {
    /// Create a new `FixedSizeChunker`.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::InvalidConfiguration`] if `chunk_size == 0` or
    /// `chunk_overlap >= chunk_size`, since the window would never advance.
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> Result<Self> {
        validate_window(chunk_size, chunk_overlap)?;
        Ok(Self { chunk_size, chunk_overlap })
    }

    /// Maximum number of characters per chunk.
    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    /// Number of characters shared by consecutive chunks.
    pub fn chunk_overlap(&self) -> usize {
        self.chunk_overlap
    }

    /// Distance in characters between the starts of consecutive chunks.
    pub fn step(&self) -> usize {
        self.chunk_size - self.chunk_overlap
    }

    /// Split `text` into chunks. Empty text yields no chunks.
    pub fn chunk(&self, text: &str) -> Vec<Chunk> {
        if text.is_empty() {
            return Vec::new();
        }

        // Byte offset of every character boundary, including the end of the text.
        let boundaries: Vec<usize> =
            text.char_indices().map(|(i, _)| i).chain(std::iter::once(text.len())).collect();
        let char_len = boundaries.len() - 1;

        let step = self.step();
        let mut chunks = Vec::with_capacity(char_len.div_ceil(step));
        let mut start = 0;

        while start < char_len {
            let end = (start + self.chunk_size).min(char_len);
            chunks.push(Chunk {
                index: chunks.len(),
                offset: start,
                text: text[boundaries[start]..boundaries[end]].to_string(),
            });
            start += step;
        }

        chunks
    }
}

/// Split `text` into overlapping windows.
///
/// Convenience wrapper around [`FixedSizeChunker`] returning only the chunk texts.
///
/// # Errors
///
/// Returns [`RagError::InvalidConfiguration`] for an invalid window.
pub fn chunk(text: &str, chunk_size: usize, chunk_overlap: usize) -> Result<Vec<String>> {
    let chunker = FixedSizeChunker::new(chunk_size, chunk_overlap)?;
    Ok(chunker.chunk(text).into_iter().map(|c| c.text).collect())
}

pub(crate) fn validate_window(chunk_size: usize, chunk_overlap: usize) -> Result<()> {
    if chunk_size == 0 {
        return Err(RagError::InvalidConfiguration(
            "chunk_size must be greater than zero".to_string(),
        ));
    }
    if chunk_overlap >= chunk_size {
        return Err(RagError::InvalidConfiguration(format!(
            "chunk_overlap ({chunk_overlap}) must be less than chunk_size ({chunk_size})"
        )));
    }
    Ok(())
}
