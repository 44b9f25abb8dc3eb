//! End-to-end library tests: SQLite store, a deterministic in-test
//! embedding provider, an echoing generator and the in-memory cache.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use serde_json::json;
use tempfile::TempDir;

use hybrid_rag::cache::{ChatMessage, InMemoryCache};
use hybrid_rag::config::{parse_config, Config};
use hybrid_rag::generation::Generator;
use hybrid_rag::pipeline::{PipelineState, RetrievalPipeline};
use hybrid_rag::services::Services;
use hybrid_rag::{db, migrate};
use hybrid_rag_core::embedding::EmbeddingProvider;
use hybrid_rag_core::models::RetrievalSource;
use hybrid_rag_core::store::{ChunkStore, DocumentStore};

const DIMS: usize = 16;

/// Bag-of-words embedding: each token adds 1 to a bucket chosen by its
/// byte sum.
struct HashingEmbedder {
    calls: AtomicUsize,
}

fn embed(text: &str) -> Vec<f32> {
    let mut v = vec![0.0f32; DIMS];
    for token in text.to_lowercase().split_whitespace() {
        let bucket = token.bytes().map(|b| b as usize).sum::<usize>() % DIMS;
        v[bucket] += 1.0;
    }
    v
}

#[async_trait]
impl EmbeddingProvider for HashingEmbedder {
    fn model_name(&self) -> &str {
        "hashing"
    }
    fn dims(&self) -> usize {
        DIMS
    }
    async fn embed_texts(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(texts.iter().map(|t| embed(t)).collect())
    }
}

/// Answers with the first line of the context it received.
struct EchoGenerator;

#[async_trait]
impl Generator for EchoGenerator {
    fn model_name(&self) -> &str {
        "echo"
    }
    async fn generate(
        &self,
        _prompt: &str,
        context: Option<&str>,
        history: &[ChatMessage],
    ) -> Result<String> {
        let first = context
            .and_then(|c| c.lines().nth(1))
            .unwrap_or("no context");
        Ok(format!("{} (history {})", first, history.len()))
    }
}

struct Harness {
    _tmp: TempDir,
    embedder: Arc<HashingEmbedder>,
    services: Services,
}

async fn harness() -> Harness {
    let tmp = TempDir::new().unwrap();
    let db_path = tmp.path().join("rag.sqlite");
    let config: Config = parse_config(&format!(
        "[db]\npath = {:?}\n[chunking]\nchunk_size = 120\nchunk_overlap = 20\n[retrieval]\ntop_k = 3\n",
        db_path.display().to_string()
    ))
    .unwrap();

    let pool = db::connect(&config).await.unwrap();
    migrate::apply_schema(&pool).await.unwrap();

    let embedder = Arc::new(HashingEmbedder {
        calls: AtomicUsize::new(0),
    });
    let services = Services::with_providers(
        &config,
        pool,
        embedder.clone(),
        Arc::new(EchoGenerator),
        Arc::new(InMemoryCache::new(Duration::from_secs(600), 100)),
    )
    .unwrap();

    Harness {
        _tmp: tmp,
        embedder,
        services,
    }
}

fn faq_items() -> Vec<serde_json::Value> {
    vec![
        json!({"title": "Refunds", "content": "Refunds are issued within fourteen days of purchase."}),
        json!({"title": "Shipping", "content": "Orders ship from the Rotterdam warehouse every weekday."}),
    ]
}

fn recipe_items() -> Vec<serde_json::Value> {
    vec![
        json!({"text": "Boil the pasta in salted water for nine minutes."}),
        json!({"text": "Stir the tomato sauce slowly over low heat."}),
    ]
}

#[tokio::test]
async fn test_ingest_then_search_ranks_matching_chunk_first() {
    let h = harness().await;
    h.services.ingest_items("faq.json", &faq_items()).await.unwrap();
    h.services
        .ingest_items("recipes.json", &recipe_items())
        .await
        .unwrap();

    let results = h.services.pipeline.retrieve("rotterdam warehouse", 3).await.unwrap();
    assert!(!results.is_empty());
    assert!(results.len() <= 3);
    assert!(results[0].chunk.content.contains("Rotterdam"));
    assert!(results.iter().all(|r| r.source == RetrievalSource::Hybrid));
    for pair in results.windows(2) {
        assert!(pair[0].score >= pair[1].score);
    }
}

#[tokio::test]
async fn test_reingest_is_idempotent() {
    let h = harness().await;
    let first = h.services.ingest_items("faq.json", &faq_items()).await.unwrap();
    assert!(first.new_chunks > 0);
    let calls = h.embedder.calls.load(Ordering::SeqCst);

    let second = h
        .services
        .ingest_items("faq-copy.json", &faq_items())
        .await
        .unwrap();
    assert!(second.duplicate);
    assert_eq!(second.new_chunks, 0);
    assert_eq!(second.chunk_count, first.chunk_count);
    assert_eq!(second.document.id, first.document.id);
    assert_eq!(second.document.filename, "faq.json");
    assert_eq!(h.embedder.calls.load(Ordering::SeqCst), calls);

    let docs = h.services.list_documents(10, 0).await.unwrap();
    assert_eq!(docs.len(), 1);
    assert_eq!(docs[0].0.id, first.document.id);
    assert_eq!(docs[0].1, first.chunk_count);
}

#[tokio::test]
async fn test_stored_chunks_carry_embeddings_and_metadata() {
    let h = harness().await;
    let outcome = h.services.ingest_items("faq.json", &faq_items()).await.unwrap();

    let chunks = h
        .services
        .store
        .get_by_document(&outcome.document.id)
        .await
        .unwrap();
    assert_eq!(chunks.len(), outcome.chunk_count);
    for chunk in &chunks {
        assert_eq!(chunk.embedding.as_deref(), Some(embed(&chunk.content).as_slice()));
        assert_eq!(chunk.metadata["document_filename"], json!("faq.json"));
        assert_eq!(chunk.metadata["chunk_index"], json!(chunk.chunk_index));
        assert!(chunk.content.chars().count() <= 120);
    }
    assert_eq!(outcome.document.metadata["item_count"], json!(2));
}

#[tokio::test]
async fn test_ingest_resets_pipeline_snapshot() {
    let h = harness().await;
    h.services.ingest_items("faq.json", &faq_items()).await.unwrap();
    h.services.pipeline.initialize().await.unwrap();
    assert_eq!(h.services.pipeline.state(), PipelineState::Ready);

    h.services
        .ingest_items("recipes.json", &recipe_items())
        .await
        .unwrap();
    assert_eq!(h.services.pipeline.state(), PipelineState::Uninitialized);

    let results = h.services.pipeline.retrieve("pasta", 3).await.unwrap();
    assert!(results[0].chunk.content.contains("pasta"));
}

#[tokio::test]
async fn test_delete_removes_chunks_from_retrieval() {
    let h = harness().await;
    let outcome = h
        .services
        .ingest_items("recipes.json", &recipe_items())
        .await
        .unwrap();

    assert!(h.services.delete_document(&outcome.document.id).await.unwrap());
    assert!(h.services.store.get(&outcome.document.id).await.unwrap().is_none());
    assert_eq!(h.services.store.get_all(100).await.unwrap().len(), 0);
    assert!(h.services.pipeline.retrieve("pasta", 3).await.unwrap().is_empty());
    assert!(!h.services.delete_document(&outcome.document.id).await.unwrap());
}

#[tokio::test]
async fn test_chat_answers_from_context_and_caches() {
    let h = harness().await;
    h.services.ingest_items("faq.json", &faq_items()).await.unwrap();

    let reply = h
        .services
        .chat
        .ask("rotterdam warehouse", None)
        .await
        .unwrap();
    assert!(!reply.cached);
    assert!(reply.answer.contains("Rotterdam"));
    assert!(reply.answer.ends_with("(history 0)"));
    assert!(!reply.sources.is_empty());
    assert!(reply.sources.iter().all(|s| s.starts_with("Chunk ")));

    let again = h
        .services
        .chat
        .ask("Rotterdam Warehouse", Some(reply.session_id.clone()))
        .await
        .unwrap();
    assert!(again.cached);
    assert_eq!(again.answer, reply.answer);

    let history = h.services.chat.history(&reply.session_id).await.unwrap();
    assert_eq!(history.len(), 4);
}

#[test]
fn test_context_format() {
    assert_eq!(RetrievalPipeline::build_context(&[]), None);
}
