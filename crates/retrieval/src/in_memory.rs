//! In-memory knowledge base, useful for testing and ephemeral sessions.
//!
//! Markdown documents are split into paragraph chunks that remember the
//! headings in effect. Search is BM25 keyword search, fused with cosine
//! vector search via RRF when an [`Embedder`] is attached.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use ragstream_config::RetrievalConfig;
use ragstream_core::chunk::{Chunk, ChunkId, Document};
use ragstream_core::error::RetrievalError;
use ragstream_core::retrieval::{ChunkStore, Embedder, SearchBackend, SearchHit};
use tracing::debug;
use uuid::Uuid;

use crate::keyword::KeywordIndex;
use crate::vector::{reciprocal_rank_fusion, vector_search};

#[derive(Default)]
struct Inner {
    chunks: Vec<Chunk>,
    by_id: HashMap<ChunkId, usize>,
    by_position: HashMap<(String, i64), usize>,
    keyword: KeywordIndex,
    embeddings: HashMap<ChunkId, Vec<f32>>,
}

/// A knowledge base that keeps every chunk in memory.
pub struct InMemoryKnowledgeBase {
    inner: RwLock<Inner>,
    embedder: Option<Arc<dyn Embedder>>,
    oversample: usize,
    rrf_k: u32,
}

impl InMemoryKnowledgeBase {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(Inner::default()),
            embedder: None,
            oversample: 4,
            rrf_k: 60,
        }
    }

    /// A knowledge base using the configured fusion settings.
    pub fn from_config(config: &RetrievalConfig) -> Self {
        Self::new().with_fusion(config.search_oversample, config.rrf_k)
    }

    /// Enable hybrid search. Chunks are embedded as they are inserted.
    pub fn with_embedder(mut self, embedder: Arc<dyn Embedder>) -> Self {
        self.embedder = Some(embedder);
        self
    }

    /// Candidate multiplier and RRF constant for hybrid search.
    pub fn with_fusion(mut self, oversample: usize, rrf_k: u32) -> Self {
        self.oversample = oversample.max(1);
        self.rrf_k = rrf_k;
        self
    }

    /// Split a markdown document into chunks and index them.
    ///
    /// An empty document id is replaced with a fresh UUID. Returns the ids
    /// of the new chunks in document order.
    pub fn insert_document(
        &self,
        mut document: Document,
        markdown: &str,
    ) -> Result<Vec<ChunkId>, RetrievalError> {
        if document.id.is_empty() {
            document.id = Uuid::new_v4().to_string();
        }
        let chunks: Vec<Chunk> = split_markdown(markdown)
            .into_iter()
            .enumerate()
            .map(|(index, (headings, body))| Chunk {
                id: format!("{}-{index}", document.id),
                document: document.clone(),
                index: index as i64,
                headings,
                body,
            })
            .collect();
        self.insert_chunks(chunks)
    }

    /// Index pre-split chunks. Chunks with an empty id get a fresh UUID.
    pub fn insert_chunks(&self, mut chunks: Vec<Chunk>) -> Result<Vec<ChunkId>, RetrievalError> {
        for chunk in &mut chunks {
            if chunk.id.is_empty() {
                chunk.id = Uuid::new_v4().to_string();
            }
        }

        let embeddings = match &self.embedder {
            Some(embedder) if !chunks.is_empty() => {
                let texts: Vec<String> = chunks.iter().map(Chunk::text).collect();
                let vectors = embedder.embed(&texts)?;
                if vectors.len() != chunks.len() {
                    return Err(RetrievalError::EmbeddingFailed(format!(
                        "expected {} embeddings, got {}",
                        chunks.len(),
                        vectors.len()
                    )));
                }
                vectors
            }
            _ => Vec::new(),
        };

        let mut inner = self.write()?;
        let mut batch: HashSet<&str> = HashSet::with_capacity(chunks.len());
        for chunk in &chunks {
            if inner.by_id.contains_key(&chunk.id) || !batch.insert(chunk.id.as_str()) {
                return Err(RetrievalError::Storage(format!(
                    "duplicate chunk id '{}'",
                    chunk.id
                )));
            }
        }

        let mut ids = Vec::with_capacity(chunks.len());
        for (i, chunk) in chunks.into_iter().enumerate() {
            let slot = inner.chunks.len();
            inner.keyword.insert(chunk.id.clone(), &chunk.text());
            if let Some(vector) = embeddings.get(i) {
                inner.embeddings.insert(chunk.id.clone(), vector.clone());
            }
            inner.by_id.insert(chunk.id.clone(), slot);
            inner
                .by_position
                .insert((chunk.document.id.clone(), chunk.index), slot);
            ids.push(chunk.id.clone());
            inner.chunks.push(chunk);
        }

        debug!(count = ids.len(), total = inner.chunks.len(), "Indexed chunks");
        Ok(ids)
    }

    pub fn len(&self) -> usize {
        self.read().map(|inner| inner.chunks.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, Inner>, RetrievalError> {
        self.inner
            .read()
            .map_err(|_| RetrievalError::Storage("knowledge base lock poisoned".into()))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, Inner>, RetrievalError> {
        self.inner
            .write()
            .map_err(|_| RetrievalError::Storage("knowledge base lock poisoned".into()))
    }
}

impl Default for InMemoryKnowledgeBase {
    fn default() -> Self {
        Self::new()
    }
}

impl SearchBackend for InMemoryKnowledgeBase {
    fn name(&self) -> &str {
        "in_memory"
    }

    fn search(&self, query: &str, num_results: usize) -> Result<Vec<SearchHit>, RetrievalError> {
        let Some(embedder) = &self.embedder else {
            return Ok(self.read()?.keyword.search(query, num_results));
        };

        let query_embedding = embedder
            .embed(&[query.to_string()])?
            .into_iter()
            .next()
            .ok_or_else(|| RetrievalError::EmbeddingFailed("no embedding for query".into()))?;

        let candidates = self.oversample * num_results;
        let inner = self.read()?;
        let keyword: Vec<ChunkId> = inner
            .keyword
            .search(query, candidates)
            .into_iter()
            .map(|hit| hit.chunk_id)
            .collect();
        let semantic: Vec<ChunkId> = vector_search(
            inner.embeddings.iter().map(|(id, v)| (id, v.as_slice())),
            &query_embedding,
            candidates,
        )
        .into_iter()
        .map(|hit| hit.chunk_id)
        .collect();

        let mut hits = reciprocal_rank_fusion(&[semantic, keyword], self.rrf_k);
        hits.truncate(num_results);
        Ok(hits)
    }
}

impl ChunkStore for InMemoryKnowledgeBase {
    fn chunks(&self, ids: &[ChunkId]) -> Result<Vec<Chunk>, RetrievalError> {
        let inner = self.read()?;
        Ok(ids
            .iter()
            .filter_map(|id| inner.by_id.get(id).map(|&slot| inner.chunks[slot].clone()))
            .collect())
    }

    fn neighbors(&self, chunks: &[Chunk], offsets: &[i64]) -> Result<Vec<Chunk>, RetrievalError> {
        let inner = self.read()?;
        let mut found = Vec::new();
        for chunk in chunks {
            for offset in offsets {
                let key = (chunk.document.id.clone(), chunk.index + offset);
                if let Some(&slot) = inner.by_position.get(&key) {
                    found.push(inner.chunks[slot].clone());
                }
            }
        }
        Ok(found)
    }
}

/// Split markdown into `(headings, body)` paragraphs.
///
/// A heading line closes the current paragraph and replaces every heading
/// at its level or deeper.
fn split_markdown(markdown: &str) -> Vec<(String, String)> {
    let mut out: Vec<(String, String)> = Vec::new();
    let mut stack: Vec<(usize, String)> = Vec::new();
    let mut paragraph: Vec<&str> = Vec::new();

    for line in markdown.lines() {
        let trimmed = line.trim_end();
        if let Some(level) = heading_level(trimmed) {
            flush(&mut paragraph, &stack, &mut out);
            stack.retain(|(l, _)| *l < level);
            stack.push((level, trimmed.to_string()));
        } else if trimmed.trim().is_empty() {
            flush(&mut paragraph, &stack, &mut out);
        } else {
            paragraph.push(trimmed);
        }
    }
    flush(&mut paragraph, &stack, &mut out);
    out
}

fn flush(paragraph: &mut Vec<&str>, stack: &[(usize, String)], out: &mut Vec<(String, String)>) {
    if paragraph.is_empty() {
        return;
    }
    let headings: String = stack.iter().map(|(_, h)| format!("{h}\n")).collect();
    out.push((headings, format!("{}\n", paragraph.join("\n"))));
    paragraph.clear();
}

fn heading_level(line: &str) -> Option<usize> {
    let level = line.chars().take_while(|c| *c == '#').count();
    let rest = &line[level..];
    ((1..=6).contains(&level) && (rest.is_empty() || rest.starts_with(' '))).then_some(level)
}
