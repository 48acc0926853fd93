//! Retrieval pipeline: search, optional rerank, neighbor expansion,
//! span grouping.

use std::collections::HashMap;
use std::sync::Arc;

use ragstream_core::chunk::{Chunk, ChunkSpan};
use ragstream_core::error::RetrievalError;
use ragstream_core::retrieval::{ChunkStore, Reranker, RetrievalQuery, SearchBackend};
use tracing::debug;

use crate::spans::group_into_spans;

/// Extra candidates fetched per requested chunk when a reranker is set.
const RERANK_OVERFETCH: usize = 3;

/// Turns a query into ranked chunk spans.
#[derive(Clone)]
pub struct RetrievalPipeline {
    search: Arc<dyn SearchBackend>,
    store: Arc<dyn ChunkStore>,
    reranker: Option<Arc<dyn Reranker>>,
}

impl RetrievalPipeline {
    pub fn new(search: Arc<dyn SearchBackend>, store: Arc<dyn ChunkStore>) -> Self {
        Self {
            search,
            store,
            reranker: None,
        }
    }

    /// A pipeline over a single knowledge base that both searches and stores.
    pub fn from_knowledge_base<K>(kb: Arc<K>) -> Self
    where
        K: SearchBackend + ChunkStore + 'static,
    {
        Self::new(kb.clone(), kb)
    }

    pub fn with_reranker(mut self, reranker: Arc<dyn Reranker>) -> Self {
        self.reranker = Some(reranker);
        self
    }

    /// Retrieve the spans most relevant to `query`, best first.
    pub fn retrieve(&self, query: &RetrievalQuery) -> Result<Vec<ChunkSpan>, RetrievalError> {
        query.validate()?;

        let extra = if self.reranker.is_some() {
            RERANK_OVERFETCH * query.num_chunks
        } else {
            0
        };
        let hits = self.search.search(&query.query, query.num_chunks + extra)?;
        let ids: Vec<_> = hits.into_iter().map(|hit| hit.chunk_id).collect();
        let mut chunks = self.store.chunks(&ids)?;

        if let Some(reranker) = &self.reranker
            && !chunks.is_empty()
        {
            let order = reranker.rerank(&query.query, &chunks)?;
            chunks = reorder(chunks, &order);
        }
        chunks.truncate(query.num_chunks);

        let offsets = query.neighbor_offsets();
        let neighbors = if offsets.is_empty() || chunks.is_empty() {
            Vec::new()
        } else {
            self.store.neighbors(&chunks, &offsets)?
        };

        let spans = group_into_spans(chunks, neighbors);
        debug!(
            backend = self.search.name(),
            num_chunks = query.num_chunks,
            spans = spans.len(),
            "Retrieved context"
        );
        Ok(spans)
    }
}

/// Put `chunks` in reranker order. Chunks the reranker left out keep their
/// relative order after the ranked ones.
fn reorder(chunks: Vec<Chunk>, order: &[String]) -> Vec<Chunk> {
    let mut by_id: HashMap<String, Chunk> = HashMap::new();
    let mut original = Vec::with_capacity(chunks.len());
    for chunk in chunks {
        original.push(chunk.id.clone());
        by_id.insert(chunk.id.clone(), chunk);
    }

    let mut out: Vec<Chunk> = order.iter().filter_map(|id| by_id.remove(id)).collect();
    out.extend(original.iter().filter_map(|id| by_id.remove(id)));
    out
}
