//! The retrieval capability and its three implementations.
//!
//! | Type | Signal |
//! |------|--------|
//! | [`LexicalRetriever`] | BM25 over a [`LexicalIndex`] snapshot |
//! | [`SemanticRetriever`] | query embedding + store nearest neighbours |
//! | [`HybridRetriever`] | both of the above, merged with [`fusion::fuse`] |

use std::sync::Arc;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use tracing::{debug, warn};

use crate::embedding::EmbeddingProvider;
use crate::fusion::{self, DEFAULT_RRF_K};
use crate::lexical::LexicalIndex;
use crate::models::{RetrievalResult, RetrievalSource};
use crate::store::ChunkStore;

/// Anything that can rank chunks for a query.
#[async_trait]
pub trait Retriever: Send + Sync {
    /// Return at most `k` results, best first.
    async fn retrieve(&self, query: &str, k: usize) -> Result<Vec<RetrievalResult>>;
}

/// Lexical retrieval over an immutable index snapshot.
pub struct LexicalRetriever {
    index: Arc<LexicalIndex>,
}

impl LexicalRetriever {
    pub fn new(index: Arc<LexicalIndex>) -> Self {
        Self { index }
    }
}

#[async_trait]
impl Retriever for LexicalRetriever {
    async fn retrieve(&self, query: &str, k: usize) -> Result<Vec<RetrievalResult>> {
        Ok(self.index.query(query, k))
    }
}

/// Embedding-similarity retrieval delegated to a [`ChunkStore`].
pub struct SemanticRetriever {
    store: Arc<dyn ChunkStore>,
    embedder: Arc<dyn EmbeddingProvider>,
}

impl SemanticRetriever {
    pub fn new(store: Arc<dyn ChunkStore>, embedder: Arc<dyn EmbeddingProvider>) -> Self {
        Self { store, embedder }
    }

    async fn embed(&self, query: &str) -> Result<Vec<f32>> {
        if self.embedder.supports_query_embedding() {
            return self.embedder.embed_query(query).await;
        }
        self.embedder
            .embed_texts(&[query.to_string()])
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| anyhow!("Empty embedding response"))
    }
}

#[async_trait]
impl Retriever for SemanticRetriever {
    async fn retrieve(&self, query: &str, k: usize) -> Result<Vec<RetrievalResult>> {
        if k == 0 {
            return Ok(Vec::new());
        }
        let vector = self.embed(query).await?;
        let hits = self.store.search_by_embedding(&vector, k).await?;
        Ok(hits
            .into_iter()
            .take(k)
            .map(|(chunk, score)| {
                RetrievalResult::new(chunk, score.clamp(0.0, 1.0), RetrievalSource::Semantic)
            })
            .collect())
    }
}

/// Runs a lexical and a semantic retriever concurrently and fuses their
/// rankings.
///
/// Each branch is asked for `2 × k` candidates so fusion has material to
/// re-rank. A failing semantic branch degrades to an empty list; a failing
/// lexical branch fails the call.
pub struct HybridRetriever {
    lexical: Arc<dyn Retriever>,
    semantic: Arc<dyn Retriever>,
    rrf_k: u32,
}

impl HybridRetriever {
    pub fn new(lexical: Arc<dyn Retriever>, semantic: Arc<dyn Retriever>) -> Self {
        Self::with_rrf_k(lexical, semantic, DEFAULT_RRF_K)
    }

    pub fn with_rrf_k(
        lexical: Arc<dyn Retriever>,
        semantic: Arc<dyn Retriever>,
        rrf_k: u32,
    ) -> Self {
        Self {
            lexical,
            semantic,
            rrf_k,
        }
    }
}

#[async_trait]
impl Retriever for HybridRetriever {
    async fn retrieve(&self, query: &str, k: usize) -> Result<Vec<RetrievalResult>> {
        let fetch_k = k.saturating_mul(2);
        let (lexical, semantic) = futures::join!(
            self.lexical.retrieve(query, fetch_k),
            self.semantic.retrieve(query, fetch_k)
        );
        let lexical = lexical?;
        let semantic = semantic.unwrap_or_else(|e| {
            warn!(error = %e, "semantic retrieval failed, using lexical results only");
            Vec::new()
        });
        debug!(
            lexical = lexical.len(),
            semantic = semantic.len(),
            "fusing candidates"
        );
        Ok(fusion::fuse(&lexical, &semantic, k, self.rrf_k))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Chunk;
    use crate::store::memory::InMemoryStore;
    use anyhow::bail;
    use chrono::Utc;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn chunk(id: &str, content: &str, emb: Vec<f32>) -> Chunk {
        Chunk {
            id: id.to_string(),
            document_id: "d1".to_string(),
            content: content.to_string(),
            chunk_index: 0,
            content_hash: crate::chunk::content_hash(content),
            embedding: Some(emb),
            metadata: json!({}),
            created_at: Utc::now(),
        }
    }

    /// Embeds every text as a fixed vector and counts which entry point
    /// was used.
    struct FixedProvider {
        vector: Vec<f32>,
        asymmetric: bool,
        query_calls: AtomicUsize,
        batch_calls: AtomicUsize,
    }

    impl FixedProvider {
        fn new(vector: Vec<f32>, asymmetric: bool) -> Self {
            Self {
                vector,
                asymmetric,
                query_calls: AtomicUsize::new(0),
                batch_calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl EmbeddingProvider for FixedProvider {
        fn model_name(&self) -> &str {
            "fixed"
        }
        fn dims(&self) -> usize {
            self.vector.len()
        }
        async fn embed_texts(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
            self.batch_calls.fetch_add(1, Ordering::SeqCst);
            Ok(texts.iter().map(|_| self.vector.clone()).collect())
        }
        fn supports_query_embedding(&self) -> bool {
            self.asymmetric
        }
        async fn embed_query(&self, _query: &str) -> Result<Vec<f32>> {
            self.query_calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.vector.clone())
        }
    }

    struct FailingRetriever;

    #[async_trait]
    impl Retriever for FailingRetriever {
        async fn retrieve(&self, _query: &str, _k: usize) -> Result<Vec<RetrievalResult>> {
            bail!("provider unreachable")
        }
    }

    async fn seeded_store() -> Arc<InMemoryStore> {
        let store = Arc::new(InMemoryStore::new());
        store
            .save_many(&[
                chunk("A", "rust borrow checker", vec![0.6, 0.8]),
                chunk("B", "python interpreter", vec![0.0, 1.0]),
                chunk("C", "cooking pasta", vec![1.0, 0.0]),
            ])
            .await
            .unwrap();
        store
    }

    #[tokio::test]
    async fn test_semantic_prefers_query_embedding_when_supported() {
        let store = seeded_store().await;
        let provider = Arc::new(FixedProvider::new(vec![0.0, 1.0], true));
        let retriever = SemanticRetriever::new(store, provider.clone());

        let results = retriever.retrieve("anything", 2).await.unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].chunk.id, "B");
        assert_eq!(results[1].chunk.id, "A");
        assert!(results
            .iter()
            .all(|r| r.source == RetrievalSource::Semantic && (0.0..=1.0).contains(&r.score)));
        assert_eq!(provider.query_calls.load(Ordering::SeqCst), 1);
        assert_eq!(provider.batch_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_semantic_falls_back_to_batch_embedding() {
        let store = seeded_store().await;
        let provider = Arc::new(FixedProvider::new(vec![0.0, 1.0], false));
        let retriever = SemanticRetriever::new(store, provider.clone());

        retriever.retrieve("anything", 1).await.unwrap();
        assert_eq!(provider.query_calls.load(Ordering::SeqCst), 0);
        assert_eq!(provider.batch_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_hybrid_fuses_both_signals() {
        let store = seeded_store().await;
        let index = Arc::new(LexicalIndex::build(store.get_all(100).await.unwrap()));
        let lexical = Arc::new(LexicalRetriever::new(index));
        let semantic = Arc::new(SemanticRetriever::new(
            store,
            Arc::new(FixedProvider::new(vec![0.0, 1.0], false)),
        ));
        let hybrid = HybridRetriever::new(lexical, semantic);

        // "rust": lexical rank 1 for A; semantic order B, A, C.
        let results = hybrid.retrieve("rust", 2).await.unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].chunk.id, "A");
        assert_eq!(results[1].chunk.id, "B");
        assert!(results.iter().all(|r| r.source == RetrievalSource::Hybrid));
        let expected = 1.0 / 61.0 + 1.0 / 62.0;
        assert!((results[0].score - expected).abs() < 1e-12);
    }

    #[tokio::test]
    async fn test_hybrid_degrades_when_semantic_fails() {
        let store = seeded_store().await;
        let index = Arc::new(LexicalIndex::build(store.get_all(100).await.unwrap()));
        let hybrid = HybridRetriever::new(
            Arc::new(LexicalRetriever::new(index)),
            Arc::new(FailingRetriever),
        );
        let results = hybrid.retrieve("python", 3).await.unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].chunk.id, "B");
        assert!((results[0].score - 1.0 / 61.0).abs() < 1e-12);
    }

    #[tokio::test]
    async fn test_hybrid_fails_when_lexical_fails() {
        let store = seeded_store().await;
        let semantic = Arc::new(SemanticRetriever::new(
            store,
            Arc::new(FixedProvider::new(vec![0.0, 1.0], false)),
        ));
        let hybrid = HybridRetriever::new(Arc::new(FailingRetriever), semantic);
        assert!(hybrid.retrieve("rust", 3).await.is_err());
    }
}
