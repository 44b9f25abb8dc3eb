//! Reciprocal Rank Fusion (RRF).
//!
//! Merges two rank-ordered result lists without normalizing their scores.
//! A result at 1-based rank `r` contributes `1 / (rrf_k + r)`; contributions
//! are summed per chunk ID, so a chunk ranked by both signals outscores one
//! ranked equally well by only one of them.
//!
//! Lexical (BM25) and semantic (cosine) scores live on incomparable scales,
//! which is why ranks rather than scores are fused.

use std::collections::HashMap;

use crate::models::{RetrievalResult, RetrievalSource};

/// Default RRF smoothing constant.
pub const DEFAULT_RRF_K: u32 = 60;

/// Contribution of a result at 1-based `rank`.
pub fn rrf_contribution(rrf_k: u32, rank: usize) -> f64 {
    1.0 / (rrf_k as f64 + rank as f64)
}

/// Fuse two ranked lists into the top `k` results, tagged
/// [`RetrievalSource::Hybrid`].
///
/// Chunks are keyed by ID; the chunk reference kept is the first one seen
/// (lexical list first). Equal fused scores keep first-seen order.
pub fn fuse(
    lexical: &[RetrievalResult],
    semantic: &[RetrievalResult],
    k: usize,
    rrf_k: u32,
) -> Vec<RetrievalResult> {
    let mut fused: Vec<RetrievalResult> = Vec::new();
    let mut positions: HashMap<String, usize> = HashMap::new();

    for list in [lexical, semantic] {
        for (i, result) in list.iter().enumerate() {
            let contribution = rrf_contribution(rrf_k, i + 1);
            match positions.get(&result.chunk.id) {
                Some(&pos) => fused[pos].score += contribution,
                None => {
                    positions.insert(result.chunk.id.clone(), fused.len());
                    fused.push(RetrievalResult::new(
                        result.chunk.clone(),
                        contribution,
                        RetrievalSource::Hybrid,
                    ));
                }
            }
        }
    }

    fused.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    fused.truncate(k);
    fused
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Chunk;
    use chrono::Utc;
    use serde_json::json;
    use std::sync::Arc;

    fn result(id: &str, score: f64, source: RetrievalSource) -> RetrievalResult {
        RetrievalResult::new(
            Arc::new(Chunk {
                id: id.to_string(),
                document_id: "d1".to_string(),
                content: format!("content of {}", id),
                chunk_index: 0,
                content_hash: crate::chunk::content_hash(id),
                embedding: None,
                metadata: json!({}),
                created_at: Utc::now(),
            }),
            score,
            source,
        )
    }

    fn lex(ids: &[&str]) -> Vec<RetrievalResult> {
        ids.iter()
            .map(|id| result(id, 10.0, RetrievalSource::Lexical))
            .collect()
    }

    fn sem(ids: &[&str]) -> Vec<RetrievalResult> {
        ids.iter()
            .map(|id| result(id, 0.9, RetrievalSource::Semantic))
            .collect()
    }

    fn score_of(results: &[RetrievalResult], id: &str) -> f64 {
        results.iter().find(|r| r.chunk.id == id).unwrap().score
    }

    #[test]
    fn test_agreement_outranks_single_signal() {
        // A: lexical rank 1, semantic rank 2. B: semantic rank 1 only.
        let fused = fuse(&lex(&["A"]), &sem(&["B", "A"]), 10, 60);
        assert_eq!(fused[0].chunk.id, "A");
        assert_eq!(fused[1].chunk.id, "B");
        assert!((fused[0].score - (1.0 / 61.0 + 1.0 / 62.0)).abs() < 1e-12);
        assert!((fused[1].score - 1.0 / 61.0).abs() < 1e-12);
        assert!((fused[0].score - 0.0325).abs() < 1e-4);
    }

    #[test]
    fn test_single_list_contribution_is_exact() {
        let fused = fuse(&lex(&["A", "B", "C"]), &[], 10, 60);
        assert!((score_of(&fused, "C") - 1.0 / 63.0).abs() < 1e-12);
    }

    #[test]
    fn test_all_results_tagged_hybrid() {
        let fused = fuse(&lex(&["A", "B"]), &sem(&["C"]), 10, 60);
        assert_eq!(fused.len(), 3);
        assert!(fused.iter().all(|r| r.source == RetrievalSource::Hybrid));
    }

    #[test]
    fn test_symmetric_in_inputs() {
        let a = lex(&["A", "B", "C"]);
        let b = sem(&["C", "D", "A"]);
        let one = fuse(&a, &b, 10, 60);
        let two = fuse(&b, &a, 10, 60);
        for id in ["A", "B", "C", "D"] {
            assert!((score_of(&one, id) - score_of(&two, id)).abs() < 1e-12);
        }
    }

    #[test]
    fn test_truncates_to_k_and_deduplicates() {
        let fused = fuse(&lex(&["A", "B", "C"]), &sem(&["A", "B", "C"]), 2, 60);
        assert_eq!(fused.len(), 2);
        assert_eq!(fused[0].chunk.id, "A");
        assert_eq!(fused[1].chunk.id, "B");
    }

    #[test]
    fn test_empty_inputs() {
        assert!(fuse(&[], &[], 5, 60).is_empty());
    }

    #[test]
    fn test_custom_rrf_k() {
        let fused = fuse(&lex(&["A"]), &[], 1, 1);
        assert!((fused[0].score - 0.5).abs() < 1e-12);
    }
}
