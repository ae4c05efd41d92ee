//! `finrag-server` serves the financial document analyzer over HTTP.
//! An upload is reduced to text, narrowed to its most relevant chunks, and run
//! through a three-stage analyst pipeline backed by an Ollama chat model.

pub mod analysis;
pub mod config;
pub mod error;
pub mod extract;
pub mod generation;
pub mod server;

pub use analysis::{AnalysisInput, AnalysisPipeline, AnalysisReport};
pub use config::ServerConfig;
pub use error::{Result, ServerError};
pub use extract::{AutoExtractor, PdfTextExtractor, PlainTextExtractor, TextExtractor};
pub use generation::{GenerationRequest, OllamaChatConfig, OllamaChatGenerator, TextGenerator};
pub use server::{AnalyzeResponse, AppState, app_router, run_server};
