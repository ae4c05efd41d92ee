//! Retrieval orchestration with in-process embedding and search doubles.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use finrag::{
    DEFAULT_ENRICHMENT_QUERY, EmbeddingProvider, RagError, RetrievalConfig, Retriever,
    SearchProvider,
};
use tokio::sync::Mutex;

/// Embeds text as keyword counts: `[revenue, debt, staff]`.
///
/// Queries mentioning revenue point along the first axis, so chunks about
/// revenue score highest. Text with none of the words embeds as the zero vector.
#[derive(Default)]
struct KeywordEmbedder {
    calls: AtomicUsize,
}

#[async_trait]
impl EmbeddingProvider for KeywordEmbedder {
    async fn embed(&self, text: &str) -> finrag::Result<Vec<f32>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let text = text.to_lowercase();
        Ok(vec![
            text.matches("revenue").count() as f32,
            text.matches("debt").count() as f32,
            text.matches("staff").count() as f32,
        ])
    }

    fn name(&self) -> &str {
        "keyword"
    }
}

/// Fails for any text containing `marker`.
struct FailingEmbedder {
    marker: &'static str,
}

#[async_trait]
impl EmbeddingProvider for FailingEmbedder {
    async fn embed(&self, text: &str) -> finrag::Result<Vec<f32>> {
        if text.contains(self.marker) {
            return Err(RagError::EmbeddingServiceError {
                provider: "failing".into(),
                message: "simulated outage".into(),
            });
        }
        Ok(vec![1.0, 0.0])
    }

    fn name(&self) -> &str {
        "failing"
    }
}

/// Returns vectors whose length depends on the text.
struct RaggedEmbedder;

#[async_trait]
impl EmbeddingProvider for RaggedEmbedder {
    async fn embed(&self, text: &str) -> finrag::Result<Vec<f32>> {
        Ok(vec![1.0; 1 + text.len() % 3])
    }

    fn name(&self) -> &str {
        "ragged"
    }
}

enum SearchBehavior {
    Answer(&'static str),
    Unavailable,
    Broken,
}

struct RecordingSearch {
    behavior: SearchBehavior,
    queries: Mutex<Vec<String>>,
}

impl RecordingSearch {
    fn new(behavior: SearchBehavior) -> Arc<Self> {
        Arc::new(Self { behavior, queries: Mutex::new(Vec::new()) })
    }
}

#[async_trait]
impl SearchProvider for RecordingSearch {
    async fn search(&self, query: &str) -> finrag::Result<String> {
        self.queries.lock().await.push(query.to_string());
        match self.behavior {
            SearchBehavior::Answer(text) => Ok(text.to_string()),
            SearchBehavior::Unavailable => {
                Err(RagError::AugmentationUnavailable("quota exceeded".into()))
            }
            SearchBehavior::Broken => Err(RagError::InvalidConfiguration("bad endpoint".into())),
        }
    }
}

fn small_config(top_k: usize) -> RetrievalConfig {
    RetrievalConfig::builder()
        .chunk_size(20)
        .chunk_overlap(0)
        .top_k(top_k)
        .embed_concurrency(3)
        .build()
        .unwrap()
}

fn retriever(embedder: Arc<dyn EmbeddingProvider>, top_k: usize) -> Retriever {
    Retriever::builder().config(small_config(top_k)).embedding_provider(embedder).build().unwrap()
}

// Four 20-character chunks.
const DOCUMENT: &str = "staff costs rose 3%.revenue up; revenue debt was cut sharplyrevenue flat in Q4. ";

#[tokio::test]
async fn empty_document_yields_empty_context_without_embedding() {
    let embedder = Arc::new(KeywordEmbedder::default());
    let retriever = retriever(embedder.clone(), 3);

    let context = retriever.retrieve_context("", "any query").await.unwrap();

    assert_eq!(context, "");
    assert_eq!(embedder.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn context_joins_most_relevant_chunks_first() {
    let embedder = Arc::new(KeywordEmbedder::default());
    let retriever = retriever(embedder.clone(), 2);

    let context = retriever.retrieve_context(DOCUMENT, "revenue trend").await.unwrap();

    // Chunk 1 mentions revenue twice but cosine ignores magnitude, so chunks 1
    // and 3 tie on direction; the tie keeps document order.
    assert_eq!(context, "revenue up; revenue \n\nrevenue flat in Q4. ");
    // Four chunks plus the query.
    assert_eq!(embedder.calls.load(Ordering::SeqCst), 5);
}

#[tokio::test]
async fn ranked_chunks_expose_scores() {
    let retriever = retriever(Arc::new(KeywordEmbedder::default()), 10);

    let ranked = retriever.rank_chunks(DOCUMENT, "debt", retriever.config()).await.unwrap();

    assert_eq!(ranked.len(), 4);
    assert_eq!(ranked[0].text, "debt was cut sharply");
    assert!(ranked.windows(2).all(|w| w[0].score >= w[1].score));
}

#[tokio::test]
async fn embedding_failure_aborts_retrieval() {
    let retriever = retriever(Arc::new(FailingEmbedder { marker: "debt" }), 3);

    let err = retriever.retrieve_context(DOCUMENT, "revenue").await.unwrap_err();

    assert!(matches!(err, RagError::EmbeddingServiceError { .. }), "unexpected error: {err}");
}

#[tokio::test]
async fn query_embedding_failure_aborts_retrieval() {
    let retriever = retriever(Arc::new(FailingEmbedder { marker: "QUERY" }), 3);

    let err = retriever.retrieve_context("plain text", "QUERY").await.unwrap_err();

    assert!(matches!(err, RagError::EmbeddingServiceError { .. }));
}

#[tokio::test]
async fn ragged_embeddings_are_a_dimension_mismatch() {
    let retriever = retriever(Arc::new(RaggedEmbedder), 3);

    let err = retriever.retrieve_context("ab cd ef gh ij kl mn op qr st uv wx yz", "q").await;

    assert!(matches!(err, Err(RagError::DimensionMismatch { .. })));
}

#[tokio::test]
async fn invalid_parameters_are_rejected_before_embedding() {
    let embedder = Arc::new(KeywordEmbedder::default());
    let retriever = retriever(embedder.clone(), 3);
    let bad = RetrievalConfig { chunk_size: 10, chunk_overlap: 10, ..RetrievalConfig::default() };

    let err = retriever.retrieve_context_with(DOCUMENT, "revenue", &bad).await.unwrap_err();

    assert!(matches!(err, RagError::InvalidConfiguration(_)));
    assert_eq!(embedder.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn builder_requires_an_embedding_provider() {
    assert!(matches!(Retriever::builder().build(), Err(RagError::InvalidConfiguration(_))));
}

#[tokio::test]
async fn market_query_triggers_augmentation_with_enrichment_query() {
    let search = RecordingSearch::new(SearchBehavior::Answer("BYD outsold Tesla"));
    let retriever = Retriever::builder()
        .embedding_provider(Arc::new(KeywordEmbedder::default()))
        .search_provider(search.clone())
        .build()
        .unwrap();

    let external = retriever.external_context("compare market performance").await.unwrap();

    assert_eq!(external, "BYD outsold Tesla");
    assert_eq!(*search.queries.lock().await, [DEFAULT_ENRICHMENT_QUERY]);
}

#[tokio::test]
async fn plain_query_skips_augmentation() {
    let search = RecordingSearch::new(SearchBehavior::Answer("unused"));
    let retriever = Retriever::builder()
        .embedding_provider(Arc::new(KeywordEmbedder::default()))
        .search_provider(search.clone())
        .build()
        .unwrap();

    let external = retriever.external_context("what is the revenue").await.unwrap();

    assert_eq!(external, "");
    assert!(search.queries.lock().await.is_empty());
}

#[tokio::test]
async fn unavailable_search_degrades_to_empty_context() {
    let search = RecordingSearch::new(SearchBehavior::Unavailable);
    let retriever = Retriever::builder()
        .embedding_provider(Arc::new(KeywordEmbedder::default()))
        .search_provider(search.clone())
        .enrichment_query("EV sector outlook")
        .build()
        .unwrap();

    let external = retriever.external_context("sector outlook").await.unwrap();

    assert_eq!(external, "");
    assert_eq!(*search.queries.lock().await, ["EV sector outlook"]);
}

#[tokio::test]
async fn unrelated_search_errors_are_not_masked() {
    let search = RecordingSearch::new(SearchBehavior::Broken);
    let retriever = Retriever::builder()
        .embedding_provider(Arc::new(KeywordEmbedder::default()))
        .search_provider(search)
        .build()
        .unwrap();

    let err = retriever.external_context("industry trend").await.unwrap_err();

    assert!(matches!(err, RagError::InvalidConfiguration(_)));
}

#[tokio::test]
async fn missing_search_provider_means_no_external_context() {
    let retriever = Retriever::builder()
        .embedding_provider(Arc::new(KeywordEmbedder::default()))
        .build()
        .unwrap();

    assert_eq!(retriever.external_context("market trend").await.unwrap(), "");
}
