//! Vector similarity and rank fusion utilities.
//!
//! Pure-Rust implementations of:
//! - Cosine similarity
//! - Nearest-neighbor ranking over chunk embeddings
//! - Reciprocal Rank Fusion (RRF) for merging ranked result lists

use std::collections::HashMap;

use ragstream_core::chunk::ChunkId;
use ragstream_core::retrieval::SearchHit;

/// Compute cosine similarity between two vectors.
///
/// Returns a value in [-1, 1] where 1 = identical, 0 = orthogonal, -1 = opposite.
/// Returns 0.0 if either vector is zero-length or empty.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut dot = 0.0f64;
    let mut norm_a = 0.0f64;
    let mut norm_b = 0.0f64;

    for (x, y) in a.iter().zip(b.iter()) {
        let x = *x as f64;
        let y = *y as f64;
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom < 1e-10 {
        return 0.0;
    }

    (dot / denom) as f32
}

/// Rank embedded chunks by cosine similarity to a query embedding.
///
/// Returns at most `limit` hits, most similar first.
pub fn vector_search<'a>(
    embeddings: impl IntoIterator<Item = (&'a ChunkId, &'a [f32])>,
    query_embedding: &[f32],
    limit: usize,
) -> Vec<SearchHit> {
    let mut hits: Vec<SearchHit> = embeddings
        .into_iter()
        .map(|(id, emb)| SearchHit {
            chunk_id: id.clone(),
            score: cosine_similarity(emb, query_embedding),
        })
        .collect();

    hits.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
    hits.truncate(limit);
    hits
}

/// Reciprocal Rank Fusion: merge any number of ranked id lists.
///
/// Each id scores `1/(k + rank)` per list, with 0-based ranks. An id missing
/// from a list gets the list's length as its rank. Ties keep first-seen
/// order. `k` must be positive.
pub fn reciprocal_rank_fusion(rankings: &[Vec<ChunkId>], k: u32) -> Vec<SearchHit> {
    let k = k as f32;

    let mut order: Vec<&ChunkId> = Vec::new();
    let mut seen: HashMap<&ChunkId, usize> = HashMap::new();
    for id in rankings.iter().flatten() {
        if !seen.contains_key(id) {
            seen.insert(id, order.len());
            order.push(id);
        }
    }

    let mut scores = vec![0.0f32; order.len()];
    for ranking in rankings {
        let positions: HashMap<&ChunkId, usize> =
            ranking.iter().enumerate().rev().map(|(i, id)| (id, i)).collect();
        for (slot, id) in order.iter().enumerate() {
            let rank = positions.get(id).copied().unwrap_or(ranking.len());
            scores[slot] += 1.0 / (k + rank as f32);
        }
    }

    let mut hits: Vec<SearchHit> = order
        .into_iter()
        .zip(scores)
        .map(|(id, score)| SearchHit {
            chunk_id: id.clone(),
            score,
        })
        .collect();

    hits.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
    hits
}
