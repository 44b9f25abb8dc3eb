//! Core data models shared by the ingestion and retrieval pipelines.
//!
//! [`Document`] and [`Chunk`] are persisted by a store and are append-only.
//! [`RetrievalResult`] is transient: it lives for one retrieval call and
//! shares its chunk through an [`Arc`] rather than copying it.

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// An ingested document. One per distinct extracted text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    /// UUID v4.
    pub id: String,
    /// Name supplied by the caller at ingestion time.
    pub filename: String,
    /// SHA-256 of the combined extracted text. Unique across the corpus.
    pub content_hash: String,
    /// Free-form JSON object.
    pub metadata: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

/// A text window cut from a document; the unit of retrieval.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    /// UUID v4.
    pub id: String,
    /// Owning [`Document::id`].
    pub document_id: String,
    pub content: String,
    /// Position of the window in the owning document's window sequence.
    ///
    /// Not necessarily contiguous: windows already present in the corpus
    /// are skipped but still consume an index.
    pub chunk_index: i64,
    /// SHA-256 of `content`. Unique across the corpus.
    pub content_hash: String,
    /// Embedding vector; never modified once set.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub embedding: Option<Vec<f32>>,
    pub metadata: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

impl Chunk {
    pub fn has_embedding(&self) -> bool {
        self.embedding.as_ref().is_some_and(|e| !e.is_empty())
    }
}

/// Which retrieval signal produced a [`RetrievalResult`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RetrievalSource {
    Lexical,
    Semantic,
    Hybrid,
}

impl fmt::Display for RetrievalSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RetrievalSource::Lexical => "lexical",
            RetrievalSource::Semantic => "semantic",
            RetrievalSource::Hybrid => "hybrid",
        };
        f.write_str(s)
    }
}

/// A scored reference to a chunk.
#[derive(Debug, Clone, Serialize)]
pub struct RetrievalResult {
    pub chunk: Arc<Chunk>,
    pub score: f64,
    pub source: RetrievalSource,
}

impl RetrievalResult {
    pub fn new(chunk: Arc<Chunk>, score: f64, source: RetrievalSource) -> Self {
        Self {
            chunk,
            score,
            source,
        }
    }
}
