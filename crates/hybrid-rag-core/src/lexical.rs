//! In-memory BM25 lexical index.
//!
//! Built once from a full snapshot of the corpus and never updated in
//! place; the retrieval pipeline rebuilds it when it is re-initialized.
//!
//! # Scoring
//!
//! For a query with tokens `q₁…qₙ` (duplicates counted) and a chunk with
//! length `dl`:
//!
//! ```text
//! score = Σ idf(qᵢ) · tf(qᵢ)·(k1 + 1) / (tf(qᵢ) + k1·(1 − b + b·dl/avgdl))
//! idf(t) = ln(1 + (N − n(t) + 0.5) / (n(t) + 0.5))
//! ```
//!
//! Chunks scoring `<= 0` share no lexical signal with the query and are
//! not returned.

use std::collections::HashMap;
use std::sync::Arc;

use crate::models::{Chunk, RetrievalResult, RetrievalSource};

/// BM25 tuning parameters.
#[derive(Debug, Clone, Copy)]
pub struct Bm25Params {
    /// Term-frequency saturation.
    pub k1: f64,
    /// Length normalization strength.
    pub b: f64,
}

impl Default for Bm25Params {
    fn default() -> Self {
        Self { k1: 1.5, b: 0.75 }
    }
}

/// Lowercase, split on whitespace, drop single-character tokens.
///
/// Used identically for indexing and querying.
pub fn tokenize(text: &str) -> Vec<String> {
    text.to_lowercase()
        .split_whitespace()
        .filter(|t| t.chars().count() > 1)
        .map(str::to_string)
        .collect()
}

/// Term statistics for one indexed chunk.
struct IndexedDoc {
    term_freqs: HashMap<String, u32>,
    len: usize,
}

/// BM25 index over a fixed set of chunks.
pub struct LexicalIndex {
    chunks: Vec<Arc<Chunk>>,
    docs: Vec<IndexedDoc>,
    idf: HashMap<String, f64>,
    avg_len: f64,
    params: Bm25Params,
}

impl LexicalIndex {
    /// Build an index with the default [`Bm25Params`].
    pub fn build(chunks: Vec<Arc<Chunk>>) -> Self {
        Self::with_params(chunks, Bm25Params::default())
    }

    pub fn with_params(chunks: Vec<Arc<Chunk>>, params: Bm25Params) -> Self {
        let docs: Vec<IndexedDoc> = chunks
            .iter()
            .map(|c| {
                let tokens = tokenize(&c.content);
                let mut term_freqs: HashMap<String, u32> = HashMap::new();
                for t in &tokens {
                    *term_freqs.entry(t.clone()).or_insert(0) += 1;
                }
                IndexedDoc {
                    term_freqs,
                    len: tokens.len(),
                }
            })
            .collect();

        let mut doc_freqs: HashMap<String, usize> = HashMap::new();
        for d in &docs {
            for term in d.term_freqs.keys() {
                *doc_freqs.entry(term.clone()).or_insert(0) += 1;
            }
        }

        let n = docs.len() as f64;
        let idf = doc_freqs
            .into_iter()
            .map(|(term, df)| {
                let df = df as f64;
                (term, (1.0 + (n - df + 0.5) / (df + 0.5)).ln())
            })
            .collect();

        let total_len: usize = docs.iter().map(|d| d.len).sum();
        let avg_len = if docs.is_empty() {
            0.0
        } else {
            total_len as f64 / docs.len() as f64
        };

        Self {
            chunks,
            docs,
            idf,
            avg_len,
            params,
        }
    }

    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    /// BM25 score of every indexed chunk for the given query tokens, in
    /// corpus order.
    fn scores(&self, query_tokens: &[String]) -> Vec<f64> {
        let Bm25Params { k1, b } = self.params;
        self.docs
            .iter()
            .map(|d| {
                let norm = if self.avg_len > 0.0 {
                    1.0 - b + b * d.len as f64 / self.avg_len
                } else {
                    1.0
                };
                query_tokens
                    .iter()
                    .map(|q| {
                        let tf = d.term_freqs.get(q).copied().unwrap_or(0) as f64;
                        if tf == 0.0 {
                            return 0.0;
                        }
                        let idf = self.idf.get(q).copied().unwrap_or(0.0);
                        idf * tf * (k1 + 1.0) / (tf + k1 * norm)
                    })
                    .sum()
            })
            .collect()
    }

    /// Return the top `k` chunks with a positive score, best first.
    ///
    /// Equal scores keep corpus order.
    pub fn query(&self, text: &str, k: usize) -> Vec<RetrievalResult> {
        if self.is_empty() || k == 0 {
            return Vec::new();
        }
        let tokens = tokenize(text);
        if tokens.is_empty() {
            return Vec::new();
        }

        let mut scored: Vec<(usize, f64)> = self
            .scores(&tokens)
            .into_iter()
            .enumerate()
            .filter(|(_, s)| *s > 0.0)
            .collect();
        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(k);

        scored
            .into_iter()
            .map(|(i, score)| {
                RetrievalResult::new(Arc::clone(&self.chunks[i]), score, RetrievalSource::Lexical)
            })
            .collect()
    }
}
