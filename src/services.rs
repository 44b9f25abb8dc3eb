//! Wiring of stores, providers and pipelines shared by the CLI and the
//! HTTP server.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use serde_json::Value;
use sqlx::SqlitePool;
use tracing::info;

use hybrid_rag_core::chunk::RecursiveSplitter;
use hybrid_rag_core::embedding::EmbeddingProvider;
use hybrid_rag_core::ingest::{IngestOutcome, IngestPipeline};
use hybrid_rag_core::models::Document;
use hybrid_rag_core::store::DocumentStore;

use crate::cache::{CacheService, InMemoryCache};
use crate::chat::ChatService;
use crate::config::Config;
use crate::embedding::create_provider;
use crate::generation::{create_generator, Generator};
use crate::pipeline::RetrievalPipeline;
use crate::sqlite_store::SqliteStore;
use crate::{db, migrate};

pub struct Services {
    pub config: Arc<Config>,
    pub store: Arc<SqliteStore>,
    pub ingest: IngestPipeline,
    pub pipeline: Arc<RetrievalPipeline>,
    pub chat: ChatService,
}

impl Services {
    /// Connect to the configured database (applying the schema) and build
    /// the providers named in the config.
    pub async fn open(config: &Config) -> Result<Self> {
        let pool = db::connect(config).await?;
        migrate::apply_schema(&pool).await?;
        let embedder = create_provider(&config.embedding)?;
        let generator = create_generator(&config.generation)?;
        let cache = Arc::new(InMemoryCache::new(
            Duration::from_secs(config.cache.history_ttl_secs),
            config.cache.max_entries,
        ));
        Self::with_providers(config, pool, embedder, generator, cache)
    }

    /// Build from an open pool and explicit providers.
    pub fn with_providers(
        config: &Config,
        pool: SqlitePool,
        embedder: Arc<dyn EmbeddingProvider>,
        generator: Arc<dyn Generator>,
        cache: Arc<dyn CacheService>,
    ) -> Result<Self> {
        let store = Arc::new(SqliteStore::new(pool));
        let splitter =
            RecursiveSplitter::new(config.chunking.chunk_size, config.chunking.chunk_overlap)?;
        let ingest = IngestPipeline::new(
            store.clone(),
            store.clone(),
            Arc::clone(&embedder),
            splitter,
        );
        let pipeline = Arc::new(RetrievalPipeline::new(
            store.clone(),
            embedder,
            generator,
            config.retrieval.rrf_k,
            config.retrieval.corpus_limit,
        ));
        let chat = ChatService::new(
            Arc::clone(&pipeline),
            cache,
            config.retrieval.top_k,
            &config.cache,
        );

        Ok(Self {
            config: Arc::new(config.clone()),
            store,
            ingest,
            pipeline,
            chat,
        })
    }

    /// Ingest items and make any new chunks visible to retrieval.
    pub async fn ingest_items(&self, filename: &str, items: &[Value]) -> Result<IngestOutcome> {
        let outcome = self.ingest.ingest_detailed(filename, items).await?;
        if outcome.new_chunks > 0 {
            info!(document_id = %outcome.document.id, "re-initializing retrieval pipeline");
            self.pipeline.reset();
        }
        Ok(outcome)
    }

    /// Delete a document and its chunks. Returns `false` when it did not
    /// exist.
    pub async fn delete_document(&self, id: &str) -> Result<bool> {
        let deleted = self.store.delete(id).await?;
        if deleted {
            self.pipeline.reset();
        }
        Ok(deleted)
    }

    /// Documents newest first, each with its chunk count.
    pub async fn list_documents(
        &self,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<(Document, usize)>> {
        self.store.list_with_chunk_counts(limit, offset).await
    }

    pub async fn close(&self) {
        self.store.pool().close().await;
    }
}
