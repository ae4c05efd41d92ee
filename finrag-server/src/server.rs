use std::{net::SocketAddr, sync::Arc, time::Duration};

use anyhow::Context;
use axum::{
    Json, Router,
    body::Bytes,
    extract::{DefaultBodyLimit, Multipart, State, multipart::MultipartError},
    response::IntoResponse,
    routing::{get, post},
};
use finrag::{OllamaEmbeddingProvider, Retriever, SearchProvider, SerperSearchProvider};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::{Instrument, info, info_span};
use uuid::Uuid;

use crate::{
    analysis::{AnalysisInput, AnalysisPipeline, AnalysisReport},
    config::ServerConfig,
    error::{Result, ServerError},
    extract::{AutoExtractor, TextExtractor},
    generation::OllamaChatGenerator,
};

#[derive(Clone)]
pub struct AppState {
    pub retriever: Arc<Retriever>,
    pub pipeline: Arc<AnalysisPipeline>,
    pub extractor: Arc<dyn TextExtractor>,
    pub request_timeout: Duration,
    pub default_query: String,
    pub max_upload_bytes: usize,
}

impl AppState {
    /// Wire the Ollama, Serper and PDF backends described by `config`.
    pub fn from_config(config: &ServerConfig) -> Result<Self> {
        let embedder = OllamaEmbeddingProvider::new(config.embedding.clone())?;
        let mut retriever = Retriever::builder()
            .config(config.retrieval.clone())
            .embedding_provider(Arc::new(embedder))
            .enrichment_query(config.enrichment_query.clone());
        if let Some(serper) = &config.serper {
            let search: Arc<dyn SearchProvider> =
                Arc::new(SerperSearchProvider::new(serper.clone())?);
            retriever = retriever.search_provider(search);
        }

        let generator = OllamaChatGenerator::new(config.chat.clone())?;

        Ok(Self {
            retriever: Arc::new(retriever.build()?),
            pipeline: Arc::new(AnalysisPipeline::new(Arc::new(generator))),
            extractor: Arc::new(AutoExtractor::default()),
            request_timeout: config.request_timeout,
            default_query: config.default_query.clone(),
            max_upload_bytes: config.max_upload_bytes,
        })
    }
}

/// Successful `/analyze` body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalyzeResponse {
    pub status: String,
    pub request_id: String,
    pub filename: String,
    /// The final recommendation.
    pub analysis: String,
    pub report: AnalysisReport,
}

pub fn app_router(state: AppState) -> Router {
    let cors = CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any);
    let body_limit = DefaultBodyLimit::max(state.max_upload_bytes);

    Router::new()
        .route("/", get(index))
        .route("/health", get(health))
        .route("/analyze", post(analyze))
        .with_state(state)
        .layer(body_limit)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}

pub async fn run_server(config: ServerConfig) -> anyhow::Result<()> {
    let state = AppState::from_config(&config).context("failed to build analysis backends")?;
    let app = app_router(state);
    let addr: SocketAddr = format!("{}:{}", config.host, config.port)
        .parse()
        .with_context(|| "invalid host/port for finrag-server")?;

    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("finrag-server listening on http://{}", addr);
    axum::serve(listener, app).await?;
    Ok(())
}

async fn index() -> impl IntoResponse {
    Json(json!({"message": "Financial Document Analyzer API is running"}))
}

async fn health() -> impl IntoResponse {
    Json(json!({"status": "ok", "service": "finrag-server"}))
}

struct Upload {
    filename: String,
    bytes: Bytes,
    query: String,
}

async fn read_upload(mut multipart: Multipart, default_query: &str) -> Result<Upload> {
    let mut file = None;
    let mut query = None;

    let bad_request = |e: MultipartError| ServerError::BadRequest(e.body_text());

    while let Some(field) = multipart.next_field().await.map_err(bad_request)? {
        let name = field.name().map(str::to_owned);
        match name.as_deref() {
            Some("file") => {
                let filename = field.file_name().unwrap_or("upload").to_string();
                let bytes = field.bytes().await.map_err(bad_request)?;
                file = Some((filename, bytes));
            }
            Some("query") => {
                query = Some(field.text().await.map_err(bad_request)?);
            }
            _ => {}
        }
    }

    let (filename, bytes) =
        file.ok_or_else(|| ServerError::BadRequest("missing `file` field".to_string()))?;
    let query = query
        .map(|q| q.trim().to_string())
        .filter(|q| !q.is_empty())
        .unwrap_or_else(|| default_query.to_string());

    Ok(Upload { filename, bytes, query })
}

async fn analyze(
    State(state): State<AppState>,
    multipart: Multipart,
) -> Result<Json<AnalyzeResponse>> {
    let upload = read_upload(multipart, &state.default_query).await?;
    let request_id = Uuid::new_v4().to_string();
    let span = info_span!(
        "analyze",
        %request_id,
        filename = %upload.filename,
        bytes = upload.bytes.len()
    );

    let deadline = state.request_timeout;
    let report = tokio::time::timeout(deadline, run_analysis(&state, &upload).instrument(span))
        .await
        .map_err(|_| ServerError::Timeout(deadline))??;

    info!(%request_id, filename = %upload.filename, "analysis completed");
    Ok(Json(AnalyzeResponse {
        status: "success".to_string(),
        request_id,
        filename: upload.filename,
        analysis: report.recommendation.clone(),
        report,
    }))
}

async fn run_analysis(state: &AppState, upload: &Upload) -> Result<AnalysisReport> {
    let extractor = state.extractor.clone();
    let bytes = upload.bytes.clone();
    let document_text = tokio::task::spawn_blocking(move || extractor.extract(&bytes))
        .await
        .map_err(|e| ServerError::Internal(format!("extraction task failed: {e}")))??;
    info!(chars = document_text.chars().count(), "document text extracted");

    let (document_context, external_context) = tokio::try_join!(
        state.retriever.retrieve_context(&document_text, &upload.query),
        state.retriever.external_context(&upload.query),
    )?;

    let input = AnalysisInput { query: upload.query.clone(), document_context, external_context };
    state.pipeline.run(&input).await.map_err(ServerError::from)
}
