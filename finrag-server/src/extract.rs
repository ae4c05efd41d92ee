//! Turning uploaded bytes into document text.

use finrag::{RagError, Result};
use tracing::debug;

/// PDF page separator emitted by `pdf-extract`.
const PAGE_BREAK: char = '\u{c}';
const PDF_MAGIC: &[u8] = b"%PDF-";
const UTF8_BOM: &str = "\u{feff}";

/// Extracts plain text from an uploaded document.
///
/// Extraction is synchronous and CPU-bound; callers on the async runtime
/// should run it on the blocking pool.
pub trait TextExtractor: Send + Sync {
    fn extract(&self, bytes: &[u8]) -> Result<String>;
}

/// Extracts the text layer of a PDF, one line-terminated block per page.
#[derive(Debug, Default, Clone, Copy)]
pub struct PdfTextExtractor;

impl TextExtractor for PdfTextExtractor {
    fn extract(&self, bytes: &[u8]) -> Result<String> {
        let raw = pdf_extract::extract_text_from_mem(bytes)
            .map_err(|e| RagError::ExtractionError(format!("failed to read PDF: {e}")))?;
        let text = normalize_pages(raw.split(PAGE_BREAK));
        debug!(bytes = bytes.len(), chars = text.chars().count(), "extracted PDF text");
        Ok(text)
    }
}

/// Reads UTF-8 text uploads as-is, minus a leading byte-order mark.
#[derive(Debug, Default, Clone, Copy)]
pub struct PlainTextExtractor;

impl TextExtractor for PlainTextExtractor {
    fn extract(&self, bytes: &[u8]) -> Result<String> {
        let text = std::str::from_utf8(bytes)
            .map_err(|e| RagError::ExtractionError(format!("upload is not UTF-8 text: {e}")))?;
        Ok(text.strip_prefix(UTF8_BOM).unwrap_or(text).to_string())
    }
}

/// Picks [`PdfTextExtractor`] for PDF uploads and [`PlainTextExtractor`]
/// otherwise. Empty uploads are rejected.
#[derive(Debug, Default, Clone, Copy)]
pub struct AutoExtractor {
    pdf: PdfTextExtractor,
    plain: PlainTextExtractor,
}

impl TextExtractor for AutoExtractor {
    fn extract(&self, bytes: &[u8]) -> Result<String> {
        if bytes.is_empty() {
            return Err(RagError::ExtractionError("uploaded file is empty".to_string()));
        }
        if bytes.starts_with(PDF_MAGIC) {
            self.pdf.extract(bytes)
        } else {
            self.plain.extract(bytes)
        }
    }
}

/// Trim each page, drop the blank ones and terminate the rest with `\n`.
pub fn normalize_pages<'a>(pages: impl IntoIterator<Item = &'a str>) -> String {
    pages
        .into_iter()
        .map(str::trim)
        .filter(|page| !page.is_empty())
        .fold(String::new(), |mut text, page| {
            text.push_str(page);
            text.push('\n');
            text
        })
}
