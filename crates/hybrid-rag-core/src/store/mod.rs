//! Storage abstraction for Hybrid RAG.
//!
//! [`ChunkStore`] and [`DocumentStore`] define everything the ingestion
//! and retrieval pipelines need from persistence, enabling pluggable
//! backends (SQLite in the app crate, [`memory::InMemoryStore`] here).
//!
//! Both stores are append-only from the pipelines' point of view: there is
//! no update path for a chunk or its embedding. Deleting a document removes
//! its chunks with it.
//!
//! Implementations must be `Send + Sync` to work with async runtimes.

pub mod memory;

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;

use crate::models::{Chunk, Document};

/// Chunk persistence and nearest-neighbour search.
///
/// | Method | Purpose |
/// |--------|---------|
/// | [`get_all`](ChunkStore::get_all) | Snapshot of the corpus for the lexical index |
/// | [`search_by_embedding`](ChunkStore::search_by_embedding) | Cosine nearest neighbours |
/// | [`get_by_hash`](ChunkStore::get_by_hash) | Content-hash dedup lookup |
/// | [`save_many`](ChunkStore::save_many) | Bulk insert of new chunks |
/// | [`count_by_document`](ChunkStore::count_by_document) | Chunk count for one document |
/// | [`get_by_document`](ChunkStore::get_by_document) | Chunks of one document, by index |
#[async_trait]
pub trait ChunkStore: Send + Sync {
    /// Return up to `limit` chunks in insertion order.
    async fn get_all(&self, limit: usize) -> Result<Vec<Arc<Chunk>>>;

    /// Return the `k` embedded chunks closest to `vector`, best first, each
    /// with a similarity in `[0, 1]` (`1 − cosine_distance`).
    async fn search_by_embedding(&self, vector: &[f32], k: usize)
        -> Result<Vec<(Arc<Chunk>, f64)>>;

    /// Look up a chunk by its content hash.
    async fn get_by_hash(&self, content_hash: &str) -> Result<Option<Arc<Chunk>>>;

    /// Insert new chunks. Callers never pass chunks whose hash is already
    /// stored.
    async fn save_many(&self, chunks: &[Chunk]) -> Result<()>;

    /// Number of chunks owned by `document_id`.
    async fn count_by_document(&self, document_id: &str) -> Result<usize>;

    /// Chunks owned by `document_id`, ordered by `chunk_index`.
    async fn get_by_document(&self, document_id: &str) -> Result<Vec<Arc<Chunk>>>;
}

/// Document persistence.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Look up a document by the hash of its extracted text.
    async fn get_by_hash(&self, content_hash: &str) -> Result<Option<Document>>;

    /// Insert a new document.
    async fn save(&self, doc: &Document) -> Result<()>;

    /// Retrieve a document by ID.
    async fn get(&self, id: &str) -> Result<Option<Document>>;

    /// List documents, newest first.
    async fn list(&self, limit: usize, offset: usize) -> Result<Vec<Document>>;

    /// Delete a document and all of its chunks. Returns `false` when no
    /// document has that ID.
    async fn delete(&self, id: &str) -> Result<bool>;
}
