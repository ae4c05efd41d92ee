//! Ollama and Serper clients against in-process fake services.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use axum::{Json, Router, extract::State, http::StatusCode, response::IntoResponse, routing::post};
use finrag::{
    EmbeddingProvider, OllamaEmbeddingConfig, OllamaEmbeddingProvider, RagError, SearchProvider,
    SerperConfig, SerperSearchProvider,
};
use serde_json::{Value, json};

/// Scripted answers returned in order; the last one repeats.
#[derive(Clone)]
struct Script {
    replies: Arc<Vec<(StatusCode, Value)>>,
    delay: Duration,
    calls: Arc<AtomicUsize>,
    last_body: Arc<tokio::sync::Mutex<Option<Value>>>,
}

impl Script {
    fn new(replies: Vec<(StatusCode, Value)>) -> Self {
        Self {
            replies: Arc::new(replies),
            delay: Duration::ZERO,
            calls: Arc::new(AtomicUsize::new(0)),
            last_body: Arc::new(tokio::sync::Mutex::new(None)),
        }
    }

    fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

async fn scripted(State(script): State<Script>, Json(body): Json<Value>) -> impl IntoResponse {
    let call = script.calls.fetch_add(1, Ordering::SeqCst);
    *script.last_body.lock().await = Some(body);
    tokio::time::sleep(script.delay).await;
    let (status, reply) = script.replies[call.min(script.replies.len() - 1)].clone();
    (status, Json(reply))
}

async fn spawn_fake(path: &str, script: Script) -> (String, tokio::task::JoinHandle<()>) {
    let app = Router::new().route(path, post(scripted)).with_state(script);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.expect("bind test listener");
    let addr = listener.local_addr().expect("listener addr");

    let handle = tokio::spawn(async move {
        axum::serve(listener, app).await.expect("server run");
    });

    (format!("http://{addr}"), handle)
}

fn ollama(base_url: String) -> OllamaEmbeddingProvider {
    OllamaEmbeddingProvider::new(OllamaEmbeddingConfig {
        base_url,
        timeout: Duration::from_millis(500),
        max_retries: 2,
        retry_backoff: Duration::from_millis(10),
        ..OllamaEmbeddingConfig::default()
    })
    .expect("provider")
}

#[tokio::test]
async fn ollama_sends_model_and_prompt_and_reads_embedding() {
    let script = Script::new(vec![(StatusCode::OK, json!({"embedding": [0.1, 0.2, 0.3]}))]);
    let (base, handle) = spawn_fake("/api/embeddings", script.clone()).await;

    let embedding = ollama(base).embed("gross margin").await.unwrap();

    assert_eq!(embedding, vec![0.1, 0.2, 0.3]);
    assert_eq!(
        script.last_body.lock().await.clone(),
        Some(json!({"model": "nomic-embed-text", "prompt": "gross margin"}))
    );
    handle.abort();
}

#[tokio::test]
async fn ollama_missing_embedding_field_is_a_service_error() {
    let script = Script::new(vec![(StatusCode::OK, json!({"vector": [1.0]}))]);
    let (base, handle) = spawn_fake("/api/embeddings", script.clone()).await;

    let err = ollama(base).embed("text").await.unwrap_err();

    assert!(matches!(err, RagError::EmbeddingServiceError { .. }), "unexpected: {err}");
    assert_eq!(script.calls(), 1, "malformed payloads are not retried");
    handle.abort();
}

#[tokio::test]
async fn ollama_empty_embedding_is_a_service_error() {
    let script = Script::new(vec![(StatusCode::OK, json!({"embedding": []}))]);
    let (base, handle) = spawn_fake("/api/embeddings", script).await;

    let err = ollama(base).embed("text").await.unwrap_err();

    assert!(matches!(err, RagError::EmbeddingServiceError { .. }));
    handle.abort();
}

#[tokio::test]
async fn ollama_retries_server_errors_then_succeeds() {
    let script = Script::new(vec![
        (StatusCode::SERVICE_UNAVAILABLE, json!({"error": "model loading"})),
        (StatusCode::INTERNAL_SERVER_ERROR, json!({"error": "busy"})),
        (StatusCode::OK, json!({"embedding": [1.0, 0.0]})),
    ]);
    let (base, handle) = spawn_fake("/api/embeddings", script.clone()).await;

    let embedding = ollama(base).embed("text").await.unwrap();

    assert_eq!(embedding, vec![1.0, 0.0]);
    assert_eq!(script.calls(), 3);
    handle.abort();
}

#[tokio::test]
async fn ollama_gives_up_after_bounded_retries() {
    let script =
        Script::new(vec![(StatusCode::INTERNAL_SERVER_ERROR, json!({"error": "out of memory"}))]);
    let (base, handle) = spawn_fake("/api/embeddings", script.clone()).await;

    let err = ollama(base).embed("text").await.unwrap_err();

    match err {
        RagError::EmbeddingServiceError { message, .. } => assert!(message.contains("out of memory")),
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(script.calls(), 3, "one attempt plus two retries");
    handle.abort();
}

#[tokio::test]
async fn ollama_client_errors_are_not_retried() {
    let script = Script::new(vec![(StatusCode::NOT_FOUND, json!({"error": "model not found"}))]);
    let (base, handle) = spawn_fake("/api/embeddings", script.clone()).await;

    let err = ollama(base).embed("text").await.unwrap_err();

    assert!(matches!(err, RagError::EmbeddingServiceError { .. }));
    assert_eq!(script.calls(), 1);
    handle.abort();
}

#[tokio::test]
async fn ollama_slow_responses_time_out() {
    let script = Script::new(vec![(StatusCode::OK, json!({"embedding": [1.0]}))])
        .with_delay(Duration::from_secs(2));
    let (base, handle) = spawn_fake("/api/embeddings", script).await;

    let provider = OllamaEmbeddingProvider::new(OllamaEmbeddingConfig {
        base_url: base,
        timeout: Duration::from_millis(100),
        max_retries: 0,
        ..OllamaEmbeddingConfig::default()
    })
    .unwrap();
    let err = provider.embed("text").await.unwrap_err();

    assert!(matches!(err, RagError::EmbeddingServiceTimeout { .. }), "unexpected: {err}");
    handle.abort();
}

#[tokio::test]
async fn serper_results_are_summarized() {
    let script = Script::new(vec![(
        StatusCode::OK,
        json!({
            "organic": [
                { "title": "EV price war", "link": "https://example.com/a", "snippet": "Margins shrink" }
            ]
        }),
    )]);
    let (base, handle) = spawn_fake("/search", script.clone()).await;

    let provider = SerperSearchProvider::new(SerperConfig {
        endpoint: format!("{base}/search"),
        ..SerperConfig::new("test-key")
    })
    .unwrap();
    let summary = provider.search("EV industry trends").await.unwrap();

    assert_eq!(summary, "Title: EV price war\nLink: https://example.com/a\nSnippet: Margins shrink");
    assert_eq!(script.last_body.lock().await.clone(), Some(json!({"q": "EV industry trends", "num": 5})));
    handle.abort();
}

#[tokio::test]
async fn serper_failures_are_augmentation_unavailable() {
    let script = Script::new(vec![(StatusCode::FORBIDDEN, json!({"message": "invalid key"}))]);
    let (base, handle) = spawn_fake("/search", script).await;

    let provider = SerperSearchProvider::new(SerperConfig {
        endpoint: format!("{base}/search"),
        ..SerperConfig::new("bad-key")
    })
    .unwrap();
    let err = provider.search("market").await.unwrap_err();

    assert!(matches!(err, RagError::AugmentationUnavailable(_)));
    handle.abort();
}
