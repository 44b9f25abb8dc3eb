//! In-memory store implementing both [`ChunkStore`] and [`DocumentStore`].
//!
//! Uses `Vec`s behind `std::sync::RwLock` for thread safety. Nearest-
//! neighbour search is brute-force cosine similarity over every embedded
//! chunk. Used by tests and by callers that do not need persistence.

use std::sync::{Arc, RwLock};

use anyhow::{anyhow, Result};
use async_trait::async_trait;

use crate::embedding::similarity_score;
use crate::models::{Chunk, Document};

use super::{ChunkStore, DocumentStore};

/// In-memory store for tests and ephemeral corpora.
#[derive(Default)]
pub struct InMemoryStore {
    docs: RwLock<Vec<Document>>,
    chunks: RwLock<Vec<Arc<Chunk>>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn poisoned<T>(_: T) -> anyhow::Error {
    anyhow!("in-memory store lock poisoned")
}

#[async_trait]
impl ChunkStore for InMemoryStore {
    async fn get_all(&self, limit: usize) -> Result<Vec<Arc<Chunk>>> {
        let chunks = self.chunks.read().map_err(poisoned)?;
        Ok(chunks.iter().take(limit).cloned().collect())
    }

    async fn search_by_embedding(
        &self,
        vector: &[f32],
        k: usize,
    ) -> Result<Vec<(Arc<Chunk>, f64)>> {
        let chunks = self.chunks.read().map_err(poisoned)?;
        let mut scored: Vec<(Arc<Chunk>, f64)> = chunks
            .iter()
            .filter_map(|c| {
                c.embedding
                    .as_deref()
                    .map(|e| (Arc::clone(c), similarity_score(vector, e)))
            })
            .collect();
        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(k);
        Ok(scored)
    }

    async fn get_by_hash(&self, content_hash: &str) -> Result<Option<Arc<Chunk>>> {
        let chunks = self.chunks.read().map_err(poisoned)?;
        Ok(chunks
            .iter()
            .find(|c| c.content_hash == content_hash)
            .cloned())
    }

    async fn save_many(&self, new_chunks: &[Chunk]) -> Result<()> {
        let mut chunks = self.chunks.write().map_err(poisoned)?;
        for c in new_chunks {
            if chunks.iter().any(|existing| existing.content_hash == c.content_hash) {
                return Err(anyhow!(
                    "duplicate chunk content_hash: {}",
                    c.content_hash
                ));
            }
        }
        chunks.extend(new_chunks.iter().cloned().map(Arc::new));
        Ok(())
    }

    async fn count_by_document(&self, document_id: &str) -> Result<usize> {
        let chunks = self.chunks.read().map_err(poisoned)?;
        Ok(chunks.iter().filter(|c| c.document_id == document_id).count())
    }

    async fn get_by_document(&self, document_id: &str) -> Result<Vec<Arc<Chunk>>> {
        let chunks = self.chunks.read().map_err(poisoned)?;
        let mut owned: Vec<Arc<Chunk>> = chunks
            .iter()
            .filter(|c| c.document_id == document_id)
            .cloned()
            .collect();
        owned.sort_by_key(|c| c.chunk_index);
        Ok(owned)
    }
}

#[async_trait]
impl DocumentStore for InMemoryStore {
    async fn get_by_hash(&self, content_hash: &str) -> Result<Option<Document>> {
        let docs = self.docs.read().map_err(poisoned)?;
        Ok(docs.iter().find(|d| d.content_hash == content_hash).cloned())
    }

    async fn save(&self, doc: &Document) -> Result<()> {
        let mut docs = self.docs.write().map_err(poisoned)?;
        if docs.iter().any(|d| d.content_hash == doc.content_hash) {
            return Err(anyhow!("duplicate document content_hash: {}", doc.content_hash));
        }
        docs.push(doc.clone());
        Ok(())
    }

    async fn get(&self, id: &str) -> Result<Option<Document>> {
        let docs = self.docs.read().map_err(poisoned)?;
        Ok(docs.iter().find(|d| d.id == id).cloned())
    }

    async fn list(&self, limit: usize, offset: usize) -> Result<Vec<Document>> {
        let docs = self.docs.read().map_err(poisoned)?;
        let mut listed: Vec<Document> = docs.iter().rev().cloned().collect();
        listed.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(listed.into_iter().skip(offset).take(limit).collect())
    }

    async fn delete(&self, id: &str) -> Result<bool> {
        let mut docs = self.docs.write().map_err(poisoned)?;
        let before = docs.len();
        docs.retain(|d| d.id != id);
        if docs.len() == before {
            return Ok(false);
        }
        let mut chunks = self.chunks.write().map_err(poisoned)?;
        chunks.retain(|c| c.document_id != id);
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use serde_json::json;

    fn chunk(id: &str, doc: &str, index: i64, content: &str, emb: Option<Vec<f32>>) -> Chunk {
        Chunk {
            id: id.to_string(),
            document_id: doc.to_string(),
            content: content.to_string(),
            chunk_index: index,
            content_hash: crate::chunk::content_hash(content),
            embedding: emb,
            metadata: json!({}),
            created_at: Utc::now(),
        }
    }

    fn document(id: &str, hash: &str) -> Document {
        Document {
            id: id.to_string(),
            filename: format!("{}.json", id),
            content_hash: hash.to_string(),
            metadata: json!({}),
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_search_skips_unembedded_and_orders_by_similarity() {
        let store = InMemoryStore::new();
        store
            .save_many(&[
                chunk("c1", "d1", 0, "one", Some(vec![1.0, 0.0])),
                chunk("c2", "d1", 1, "two", None),
                chunk("c3", "d1", 2, "three", Some(vec![0.6, 0.8])),
            ])
            .await
            .unwrap();

        let hits = store.search_by_embedding(&[0.0, 1.0], 5).await.unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].0.id, "c3");
        assert_eq!(hits[1].0.id, "c1");
        for (_, s) in &hits {
            assert!((0.0..=1.0).contains(s));
        }

        let top1 = store.search_by_embedding(&[0.0, 1.0], 1).await.unwrap();
        assert_eq!(top1.len(), 1);
    }

    #[tokio::test]
    async fn test_hash_lookup_and_duplicate_rejection() {
        let store = InMemoryStore::new();
        store
            .save_many(&[chunk("c1", "d1", 0, "same text", None)])
            .await
            .unwrap();
        let found = ChunkStore::get_by_hash(&store, &crate::chunk::content_hash("same text"))
            .await
            .unwrap();
        assert_eq!(found.unwrap().id, "c1");

        let dup = store
            .save_many(&[chunk("c2", "d2", 0, "same text", None)])
            .await;
        assert!(dup.is_err());
    }

    #[tokio::test]
    async fn test_delete_cascades_chunks() {
        let store = InMemoryStore::new();
        store.save(&document("d1", "h1")).await.unwrap();
        store.save(&document("d2", "h2")).await.unwrap();
        store
            .save_many(&[
                chunk("c1", "d1", 0, "alpha", None),
                chunk("c2", "d2", 0, "beta", None),
            ])
            .await
            .unwrap();

        assert!(store.delete("d1").await.unwrap());
        assert!(!store.delete("d1").await.unwrap());
        assert_eq!(store.count_by_document("d1").await.unwrap(), 0);
        assert_eq!(store.count_by_document("d2").await.unwrap(), 1);
        assert_eq!(store.get_all(100).await.unwrap().len(), 1);
        assert!(store.get("d1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_get_all_respects_limit() {
        let store = InMemoryStore::new();
        store
            .save_many(&[
                chunk("c1", "d1", 0, "a1", None),
                chunk("c2", "d1", 1, "a2", None),
                chunk("c3", "d1", 2, "a3", None),
            ])
            .await
            .unwrap();
        let two = store.get_all(2).await.unwrap();
        assert_eq!(two.len(), 2);
        assert_eq!(two[0].id, "c1");
    }
}
