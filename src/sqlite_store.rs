//! SQLite-backed [`ChunkStore`] and [`DocumentStore`].
//!
//! Embeddings are stored as little-endian `f32` BLOBs next to the chunk
//! text. Nearest-neighbour search is brute force: every embedded chunk is
//! loaded and scored with cosine similarity.

use std::sync::Arc;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};

use hybrid_rag_core::embedding::{blob_to_vec, similarity_score, vec_to_blob};
use hybrid_rag_core::models::{Chunk, Document};
use hybrid_rag_core::store::{ChunkStore, DocumentStore};

const CHUNK_COLUMNS: &str =
    "id, document_id, chunk_index, content, content_hash, embedding, metadata_json, created_at";

const DOCUMENT_COLUMNS: &str = "id, filename, content_hash, metadata_json, created_at";

pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// [`DocumentStore::list`] with each document's chunk count, in one
    /// query.
    pub async fn list_with_chunk_counts(
        &self,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<(Document, usize)>> {
        let rows = sqlx::query(
            r#"
            SELECT d.id AS id, d.filename AS filename, d.content_hash AS content_hash,
                   d.metadata_json AS metadata_json, d.created_at AS created_at,
                   COUNT(c.id) AS chunk_count
            FROM documents d
            LEFT JOIN chunks c ON c.document_id = d.id
            GROUP BY d.id
            ORDER BY d.created_at DESC, d.rowid DESC
            LIMIT ? OFFSET ?
            "#,
        )
        .bind(limit as i64)
        .bind(offset as i64)
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| {
                let count: i64 = row.get("chunk_count");
                Ok((row_to_document(row)?, count as usize))
            })
            .collect()
    }
}

fn to_millis(ts: &DateTime<Utc>) -> i64 {
    ts.timestamp_millis()
}

fn from_millis(ms: i64) -> Result<DateTime<Utc>> {
    DateTime::from_timestamp_millis(ms).ok_or_else(|| anyhow!("invalid timestamp: {}", ms))
}

fn row_to_chunk(row: &SqliteRow) -> Result<Chunk> {
    let embedding: Option<Vec<u8>> = row.get("embedding");
    let metadata: String = row.get("metadata_json");
    Ok(Chunk {
        id: row.get("id"),
        document_id: row.get("document_id"),
        chunk_index: row.get("chunk_index"),
        content: row.get("content"),
        content_hash: row.get("content_hash"),
        embedding: embedding.map(|b| blob_to_vec(&b)),
        metadata: serde_json::from_str(&metadata)?,
        created_at: from_millis(row.get("created_at"))?,
    })
}

fn row_to_document(row: &SqliteRow) -> Result<Document> {
    let metadata: String = row.get("metadata_json");
    Ok(Document {
        id: row.get("id"),
        filename: row.get("filename"),
        content_hash: row.get("content_hash"),
        metadata: serde_json::from_str(&metadata)?,
        created_at: from_millis(row.get("created_at"))?,
    })
}

#[async_trait]
impl ChunkStore for SqliteStore {
    async fn get_all(&self, limit: usize) -> Result<Vec<Arc<Chunk>>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM chunks ORDER BY rowid LIMIT ?",
            CHUNK_COLUMNS
        ))
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|r| row_to_chunk(r).map(Arc::new))
            .collect()
    }

    async fn search_by_embedding(
        &self,
        vector: &[f32],
        k: usize,
    ) -> Result<Vec<(Arc<Chunk>, f64)>> {
        if k == 0 {
            return Ok(Vec::new());
        }

        let rows = sqlx::query(&format!(
            "SELECT {} FROM chunks WHERE embedding IS NOT NULL ORDER BY rowid",
            CHUNK_COLUMNS
        ))
        .fetch_all(&self.pool)
        .await?;

        let mut scored = Vec::with_capacity(rows.len());
        for row in &rows {
            let chunk = row_to_chunk(row)?;
            let score = match chunk.embedding.as_deref() {
                Some(e) if !e.is_empty() => similarity_score(vector, e),
                _ => continue,
            };
            scored.push((Arc::new(chunk), score));
        }

        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(k);
        Ok(scored)
    }

    async fn get_by_hash(&self, content_hash: &str) -> Result<Option<Arc<Chunk>>> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM chunks WHERE content_hash = ?",
            CHUNK_COLUMNS
        ))
        .bind(content_hash)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref()
            .map(|r| row_to_chunk(r).map(Arc::new))
            .transpose()
    }

    async fn save_many(&self, chunks: &[Chunk]) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        for chunk in chunks {
            let blob = chunk.embedding.as_deref().map(vec_to_blob);
            sqlx::query(
                r#"
                INSERT INTO chunks (id, document_id, chunk_index, content, content_hash,
                                    embedding, metadata_json, created_at)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(&chunk.id)
            .bind(&chunk.document_id)
            .bind(chunk.chunk_index)
            .bind(&chunk.content)
            .bind(&chunk.content_hash)
            .bind(blob)
            .bind(chunk.metadata.to_string())
            .bind(to_millis(&chunk.created_at))
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn count_by_document(&self, document_id: &str) -> Result<usize> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM chunks WHERE document_id = ?")
            .bind(document_id)
            .fetch_one(&self.pool)
            .await?;
        Ok(count as usize)
    }

    async fn get_by_document(&self, document_id: &str) -> Result<Vec<Arc<Chunk>>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM chunks WHERE document_id = ? ORDER BY chunk_index",
            CHUNK_COLUMNS
        ))
        .bind(document_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|r| row_to_chunk(r).map(Arc::new))
            .collect()
    }
}

#[async_trait]
impl DocumentStore for SqliteStore {
    async fn get_by_hash(&self, content_hash: &str) -> Result<Option<Document>> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM documents WHERE content_hash = ?",
            DOCUMENT_COLUMNS
        ))
        .bind(content_hash)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(row_to_document).transpose()
    }

    async fn save(&self, doc: &Document) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO documents (id, filename, content_hash, metadata_json, created_at)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(&doc.id)
        .bind(&doc.filename)
        .bind(&doc.content_hash)
        .bind(doc.metadata.to_string())
        .bind(to_millis(&doc.created_at))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get(&self, id: &str) -> Result<Option<Document>> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM documents WHERE id = ?",
            DOCUMENT_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(row_to_document).transpose()
    }

    async fn list(&self, limit: usize, offset: usize) -> Result<Vec<Document>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM documents ORDER BY created_at DESC, rowid DESC LIMIT ? OFFSET ?",
            DOCUMENT_COLUMNS
        ))
        .bind(limit as i64)
        .bind(offset as i64)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_document).collect()
    }

    async fn delete(&self, id: &str) -> Result<bool> {
        let mut tx = self.pool.begin().await?;

        // Explicit so the cascade holds even on connections opened without
        // foreign key enforcement.
        sqlx::query("DELETE FROM chunks WHERE document_id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;

        let deleted = sqlx::query("DELETE FROM documents WHERE id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?
            .rows_affected();

        tx.commit().await?;
        Ok(deleted > 0)
    }
}
