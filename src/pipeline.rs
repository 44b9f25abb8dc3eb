//! Retrieval pipeline: lazily builds the hybrid retriever and feeds its
//! results to a [`Generator`].
//!
//! The lexical index is a snapshot of the chunk store taken on first use.
//! Concurrent first callers share one build; a failed build is retried by
//! the next caller. Chunks ingested afterwards stay invisible to lexical
//! search until [`RetrievalPipeline::reset`] is called.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};

use anyhow::Result;
use tokio::sync::OnceCell;
use tracing::info;

use hybrid_rag_core::embedding::EmbeddingProvider;
use hybrid_rag_core::lexical::LexicalIndex;
use hybrid_rag_core::models::RetrievalResult;
use hybrid_rag_core::retriever::{HybridRetriever, LexicalRetriever, Retriever, SemanticRetriever};
use hybrid_rag_core::store::ChunkStore;

use crate::cache::ChatMessage;
use crate::generation::Generator;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    Uninitialized,
    Initializing,
    Ready,
}

pub struct RetrievalPipeline {
    chunks: Arc<dyn ChunkStore>,
    embedder: Arc<dyn EmbeddingProvider>,
    generator: Arc<dyn Generator>,
    rrf_k: u32,
    corpus_limit: usize,
    retriever: RwLock<Arc<OnceCell<Arc<HybridRetriever>>>>,
    initializing: AtomicBool,
}

impl RetrievalPipeline {
    pub fn new(
        chunks: Arc<dyn ChunkStore>,
        embedder: Arc<dyn EmbeddingProvider>,
        generator: Arc<dyn Generator>,
        rrf_k: u32,
        corpus_limit: usize,
    ) -> Self {
        Self {
            chunks,
            embedder,
            generator,
            rrf_k,
            corpus_limit,
            retriever: RwLock::new(Arc::new(OnceCell::new())),
            initializing: AtomicBool::new(false),
        }
    }

    fn cell(&self) -> Arc<OnceCell<Arc<HybridRetriever>>> {
        let guard = self.retriever.read().unwrap_or_else(|e| e.into_inner());
        Arc::clone(&*guard)
    }

    pub fn state(&self) -> PipelineState {
        if self.cell().initialized() {
            PipelineState::Ready
        } else if self.initializing.load(Ordering::SeqCst) {
            PipelineState::Initializing
        } else {
            PipelineState::Uninitialized
        }
    }

    /// Build the retriever if it is not built yet.
    pub async fn initialize(&self) -> Result<()> {
        self.hybrid().await.map(|_| ())
    }

    /// Drop the built retriever; the next call rebuilds from the store.
    pub fn reset(&self) {
        let mut guard = self.retriever.write().unwrap_or_else(|e| e.into_inner());
        *guard = Arc::new(OnceCell::new());
    }

    async fn hybrid(&self) -> Result<Arc<HybridRetriever>> {
        let cell = self.cell();
        let retriever = cell
            .get_or_try_init(|| async {
                self.initializing.store(true, Ordering::SeqCst);
                let built = self.build().await;
                self.initializing.store(false, Ordering::SeqCst);
                built
            })
            .await?;
        Ok(Arc::clone(retriever))
    }

    async fn build(&self) -> Result<Arc<HybridRetriever>> {
        let corpus = self.chunks.get_all(self.corpus_limit).await?;
        let index = Arc::new(LexicalIndex::build(corpus));
        info!(chunks = index.len(), "lexical index built");

        let lexical = Arc::new(LexicalRetriever::new(index));
        let semantic = Arc::new(SemanticRetriever::new(
            Arc::clone(&self.chunks),
            Arc::clone(&self.embedder),
        ));
        Ok(Arc::new(HybridRetriever::with_rrf_k(
            lexical, semantic, self.rrf_k,
        )))
    }

    /// Hybrid retrieval of at most `top_k` chunks.
    pub async fn retrieve(&self, query: &str, top_k: usize) -> Result<Vec<RetrievalResult>> {
        let hybrid = self.hybrid().await?;
        hybrid.retrieve(query, top_k).await
    }

    /// Format results as numbered sources for the generator.
    ///
    /// `None` when there is nothing to cite.
    pub fn build_context(results: &[RetrievalResult]) -> Option<String> {
        if results.is_empty() {
            return None;
        }
        let parts: Vec<String> = results
            .iter()
            .enumerate()
            .map(|(i, r)| format!("[Source {}]\n{}", i + 1, r.chunk.content))
            .collect();
        Some(parts.join("\n\n---\n\n"))
    }

    /// Retrieve, build context and ask the generator.
    pub async fn generate(
        &self,
        query: &str,
        top_k: usize,
        history: &[ChatMessage],
    ) -> Result<(String, Vec<RetrievalResult>)> {
        let results = self.retrieve(query, top_k).await?;
        let context = Self::build_context(&results);
        let answer = self
            .generator
            .generate(query, context.as_deref(), history)
            .await?;
        Ok((answer, results))
    }
}
