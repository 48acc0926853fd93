//! Grouping of retrieved chunks into ranked contiguous spans.

use std::collections::HashMap;

use ragstream_core::chunk::{Chunk, ChunkSpan};

/// Group `ranked` chunks and their `neighbors` into contiguous spans.
///
/// The i-th ranked chunk contributes `1/(i+1)` to the score of the span
/// containing it; neighbors contribute nothing. Spans are returned best
/// first. Duplicates are merged by chunk id.
pub fn group_into_spans(ranked: Vec<Chunk>, neighbors: Vec<Chunk>) -> Vec<ChunkSpan> {
    let mut score: HashMap<String, f64> = HashMap::new();
    for (i, chunk) in ranked.iter().enumerate() {
        score.entry(chunk.id.clone()).or_insert(1.0 / (i as f64 + 1.0));
    }

    let mut unique: HashMap<String, Chunk> = HashMap::new();
    for chunk in ranked.into_iter().chain(neighbors) {
        unique.entry(chunk.id.clone()).or_insert(chunk);
    }
    let mut chunks: Vec<Chunk> = unique.into_values().collect();
    chunks.sort_by(|a, b| {
        (a.document.id.as_str(), a.index, a.id.as_str())
            .cmp(&(b.document.id.as_str(), b.index, b.id.as_str()))
    });

    let mut spans: Vec<ChunkSpan> = Vec::new();
    let mut run: Vec<Chunk> = Vec::new();
    for chunk in chunks {
        let contiguous = run.last().is_some_and(|prev| {
            prev.document.id == chunk.document.id && chunk.index == prev.index + 1
        });
        if !run.is_empty() && !contiguous {
            spans.push(ChunkSpan::new(std::mem::take(&mut run)));
        }
        run.push(chunk);
    }
    if !run.is_empty() {
        spans.push(ChunkSpan::new(run));
    }

    let span_score =
        |span: &ChunkSpan| -> f64 { span.chunks.iter().filter_map(|c| score.get(&c.id)).sum() };
    spans.sort_by(|a, b| {
        span_score(b)
            .partial_cmp(&span_score(a))
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    spans
}
