//! BM25 keyword index over chunk text.

use std::collections::HashMap;

use ragstream_core::chunk::ChunkId;
use ragstream_core::retrieval::SearchHit;

const K1: f32 = 1.2;
const B: f32 = 0.75;

/// Lowercased terms with punctuation treated as whitespace.
pub fn tokenize(text: &str) -> Vec<String> {
    text.chars()
        .map(|c| if c.is_ascii_punctuation() { ' ' } else { c })
        .collect::<String>()
        .to_lowercase()
        .split_whitespace()
        .map(str::to_string)
        .collect()
}

struct IndexedChunk {
    id: ChunkId,
    term_freq: HashMap<String, u32>,
    len: usize,
}

/// An append-only BM25 index.
#[derive(Default)]
pub struct KeywordIndex {
    entries: Vec<IndexedChunk>,
    doc_freq: HashMap<String, u32>,
    total_len: usize,
}

impl KeywordIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn insert(&mut self, id: ChunkId, text: &str) {
        let terms = tokenize(text);
        let mut term_freq: HashMap<String, u32> = HashMap::new();
        for term in &terms {
            *term_freq.entry(term.clone()).or_default() += 1;
        }
        for term in term_freq.keys() {
            *self.doc_freq.entry(term.clone()).or_default() += 1;
        }
        self.total_len += terms.len();
        self.entries.push(IndexedChunk {
            id,
            term_freq,
            len: terms.len(),
        });
    }

    /// Up to `limit` chunks sharing at least one term with `query`, best first.
    pub fn search(&self, query: &str, limit: usize) -> Vec<SearchHit> {
        if self.entries.is_empty() || limit == 0 {
            return Vec::new();
        }

        let mut terms = tokenize(query);
        terms.sort();
        terms.dedup();

        let n = self.entries.len() as f32;
        let avg_len = (self.total_len as f32 / n).max(1.0);

        let mut hits: Vec<SearchHit> = self
            .entries
            .iter()
            .filter_map(|entry| {
                let score: f32 = terms
                    .iter()
                    .filter_map(|term| {
                        let tf = *entry.term_freq.get(term)? as f32;
                        let df = self.doc_freq.get(term).copied().unwrap_or(0) as f32;
                        let idf = ((n - df + 0.5) / (df + 0.5) + 1.0).ln();
                        let norm = K1 * (1.0 - B + B * entry.len as f32 / avg_len);
                        Some(idf * tf * (K1 + 1.0) / (tf + norm))
                    })
                    .sum();
                (score > 0.0).then(|| SearchHit {
                    chunk_id: entry.id.clone(),
                    score,
                })
            })
            .collect();

        hits.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        hits.truncate(limit);
        hits
    }
}
