//! Content-addressed ingestion pipeline.
//!
//! Turns a list of structured items (arbitrary JSON values) into one
//! [`Document`] and a set of embedded [`Chunk`]s:
//!
//! 1. Extract text from each item ([`extract_item_text`]) and join items
//!    with a blank line.
//! 2. Hash the combined text. An existing document with the same hash is
//!    returned unchanged together with its current chunk count.
//! 3. Split into overlapping windows ([`RecursiveSplitter`]).
//! 4. Drop windows whose hash is already stored anywhere in the corpus, or
//!    that repeat an earlier window of the same document. Surviving
//!    windows keep the index of their position in the full sequence.
//! 5. Embed every surviving window in a single provider call.
//! 6. Save the document, then the new chunks.
//!
//! An embedding failure aborts before anything is written. A failed chunk
//! write removes the document again, so the same content can be retried.

use std::collections::HashSet;
use std::sync::Arc;

use anyhow::{bail, Result};
use chrono::Utc;
use serde_json::{json, Value};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::chunk::{content_hash, RecursiveSplitter};
use crate::embedding::EmbeddingProvider;
use crate::models::{Chunk, Document};
use crate::store::{ChunkStore, DocumentStore};

/// Candidate text fields, in priority order.
pub const TEXT_FIELDS: [&str; 5] = ["content", "text", "body", "description", "title"];

/// Outcome of one [`IngestPipeline::ingest`] call.
#[derive(Debug, Clone)]
pub struct IngestOutcome {
    pub document: Document,
    /// Chunks owned by the document. For a new document this equals
    /// `new_chunks`; for a duplicate it is the count already stored.
    pub chunk_count: usize,
    /// Chunks created by this call. Always 0 for a duplicate.
    pub new_chunks: usize,
    /// Windows skipped because identical text was already stored.
    pub skipped_windows: usize,
    /// `true` when the document already existed and nothing was written.
    pub duplicate: bool,
}

/// Extract the text of one item.
///
/// Every candidate field in [`TEXT_FIELDS`] holding a non-empty string is
/// collected, in that order, and joined with a space. Items without any
/// such field are serialized as JSON so they still contribute text.
pub fn extract_item_text(item: &Value) -> String {
    if let Some(obj) = item.as_object() {
        let parts: Vec<&str> = TEXT_FIELDS
            .iter()
            .filter_map(|f| obj.get(*f).and_then(Value::as_str))
            .filter(|s| !s.is_empty())
            .collect();
        if !parts.is_empty() {
            return parts.join(" ");
        }
    }
    item.to_string()
}

/// Join item texts into the document text that is hashed and split.
pub fn combine_items(items: &[Value]) -> String {
    items
        .iter()
        .map(extract_item_text)
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// Ingestion over a document store, a chunk store and an embedding
/// provider.
pub struct IngestPipeline {
    documents: Arc<dyn DocumentStore>,
    chunks: Arc<dyn ChunkStore>,
    embedder: Arc<dyn EmbeddingProvider>,
    splitter: RecursiveSplitter,
}

impl IngestPipeline {
    pub fn new(
        documents: Arc<dyn DocumentStore>,
        chunks: Arc<dyn ChunkStore>,
        embedder: Arc<dyn EmbeddingProvider>,
        splitter: RecursiveSplitter,
    ) -> Self {
        Self {
            documents,
            chunks,
            embedder,
            splitter,
        }
    }

    /// Ingest `items` under `filename`.
    ///
    /// Returns the document (new or pre-existing) and the number of chunks
    /// created by this call, which is 0 when the document already existed.
    /// [`ingest_detailed`](Self::ingest_detailed) also reports the chunks
    /// the document owns.
    pub async fn ingest(&self, filename: &str, items: &[Value]) -> Result<(Document, usize)> {
        let outcome = self.ingest_detailed(filename, items).await?;
        Ok((outcome.document, outcome.new_chunks))
    }

    /// Like [`ingest`](Self::ingest), with skip and duplicate details.
    pub async fn ingest_detailed(&self, filename: &str, items: &[Value]) -> Result<IngestOutcome> {
        let text = combine_items(items);
        let doc_hash = content_hash(&text);

        if let Some(existing) = self.documents.get_by_hash(&doc_hash).await? {
            let chunk_count = self.chunks.count_by_document(&existing.id).await?;
            info!(
                document_id = %existing.id,
                filename,
                "document already ingested, skipping"
            );
            return Ok(IngestOutcome {
                document: existing,
                chunk_count,
                new_chunks: 0,
                skipped_windows: 0,
                duplicate: true,
            });
        }

        let document = Document {
            id: Uuid::new_v4().to_string(),
            filename: filename.to_string(),
            content_hash: doc_hash,
            metadata: json!({ "source": filename, "item_count": items.len() }),
            created_at: Utc::now(),
        };

        let windows = self.splitter.split_text(&text);
        let total_windows = windows.len();

        let mut seen: HashSet<String> = HashSet::new();
        let mut fresh: Vec<(i64, String, String)> = Vec::new();
        for (idx, window) in windows.into_iter().enumerate() {
            let hash = content_hash(&window);
            if seen.contains(&hash) || self.chunks.get_by_hash(&hash).await?.is_some() {
                debug!(chunk_index = idx, "window already stored, skipping");
                continue;
            }
            seen.insert(hash.clone());
            fresh.push((idx as i64, window, hash));
        }

        let embeddings = if fresh.is_empty() {
            Vec::new()
        } else {
            let texts: Vec<String> = fresh.iter().map(|(_, w, _)| w.clone()).collect();
            self.embedder.embed_texts(&texts).await?
        };
        if embeddings.len() != fresh.len() {
            bail!(
                "Embedding provider returned {} vectors for {} texts",
                embeddings.len(),
                fresh.len()
            );
        }

        let now = Utc::now();
        let new_chunks: Vec<Chunk> = fresh
            .into_iter()
            .zip(embeddings)
            .map(|((idx, content, hash), embedding)| Chunk {
                id: Uuid::new_v4().to_string(),
                document_id: document.id.clone(),
                content,
                chunk_index: idx,
                content_hash: hash,
                embedding: Some(embedding),
                metadata: json!({ "document_filename": filename, "chunk_index": idx }),
                created_at: now,
            })
            .collect();

        self.documents.save(&document).await?;
        if !new_chunks.is_empty() {
            if let Err(e) = self.chunks.save_many(&new_chunks).await {
                // A document without its chunks would shadow this content
                // as a duplicate forever.
                if let Err(rollback) = self.documents.delete(&document.id).await {
                    warn!(
                        document_id = %document.id,
                        error = %rollback,
                        "failed to remove document after chunk write failure"
                    );
                }
                return Err(e);
            }
        }

        let skipped_windows = total_windows - new_chunks.len();
        info!(
            document_id = %document.id,
            filename,
            new_chunks = new_chunks.len(),
            skipped_windows,
            "document ingested"
        );

        Ok(IngestOutcome {
            document,
            chunk_count: new_chunks.len(),
            new_chunks: new_chunks.len(),
            skipped_windows,
            duplicate: false,
        })
    }
}
