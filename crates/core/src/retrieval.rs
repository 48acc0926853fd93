//! Retrieval traits: the knowledge base as seen by the orchestrator.
//!
//! The knowledge base is split into narrow collaborators:
//! - [`SearchBackend`]: ranked chunk ids for a query (keyword, vector, hybrid)
//! - [`Reranker`]: reorders candidate chunks by relevance to a query
//! - [`ChunkStore`]: resolves ids to chunks and fetches neighboring chunks
//! - [`Embedder`]: turns text into vectors for semantic search
//!
//! These calls are blocking. Tool execution runs them inline in both the
//! blocking and the cooperative turn drivers.

use serde::{Deserialize, Serialize};

use crate::chunk::{Chunk, ChunkId};
use crate::error::RetrievalError;

/// A search request issued by the search tool or by the caller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrievalQuery {
    /// The query text
    pub query: String,

    /// How many chunks to keep after (re)ranking
    #[serde(default = "default_num_chunks")]
    pub num_chunks: usize,

    /// Relative chunk offsets used to expand each hit with its neighbors
    #[serde(default = "default_chunk_neighbors")]
    pub chunk_neighbors: Option<Vec<i64>>,
}

fn default_num_chunks() -> usize {
    5
}

fn default_chunk_neighbors() -> Option<Vec<i64>> {
    Some(vec![-1, 1])
}

impl RetrievalQuery {
    /// A query with default chunk count and neighbor offsets.
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            num_chunks: default_num_chunks(),
            chunk_neighbors: default_chunk_neighbors(),
        }
    }

    pub fn with_num_chunks(mut self, num_chunks: usize) -> Self {
        self.num_chunks = num_chunks;
        self
    }

    pub fn with_neighbors(mut self, neighbors: Option<Vec<i64>>) -> Self {
        self.chunk_neighbors = neighbors;
        self
    }

    /// Neighbor offsets, deduplicated and sorted, with `0` removed.
    pub fn neighbor_offsets(&self) -> Vec<i64> {
        let mut offsets: Vec<i64> = self
            .chunk_neighbors
            .iter()
            .flatten()
            .copied()
            .filter(|offset| *offset != 0)
            .collect();
        offsets.sort_unstable();
        offsets.dedup();
        offsets
    }

    /// Reject queries the pipeline cannot serve.
    pub fn validate(&self) -> Result<(), RetrievalError> {
        if self.num_chunks == 0 {
            return Err(RetrievalError::InvalidQuery(
                "num_chunks must be greater than 0".into(),
            ));
        }
        if self.query.trim().is_empty() {
            return Err(RetrievalError::InvalidQuery("query is empty".into()));
        }
        Ok(())
    }
}

/// A single ranked search result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchHit {
    pub chunk_id: ChunkId,
    pub score: f32,
}

/// Ranked chunk search (keyword, semantic, or both).
pub trait SearchBackend: Send + Sync {
    /// The backend name (e.g., "in_memory").
    fn name(&self) -> &str;

    /// Up to `num_results` hits, most relevant first.
    fn search(&self, query: &str, num_results: usize) -> Result<Vec<SearchHit>, RetrievalError>;
}

/// Reorders chunks by relevance to a query.
pub trait Reranker: Send + Sync {
    /// Chunk ids of `chunks`, most relevant first.
    fn rerank(&self, query: &str, chunks: &[Chunk]) -> Result<Vec<ChunkId>, RetrievalError>;
}

/// Chunk storage: id resolution and neighbor lookup.
pub trait ChunkStore: Send + Sync {
    /// Resolve ids to chunks, preserving the order of `ids`. Unknown ids
    /// are skipped.
    fn chunks(&self, ids: &[ChunkId]) -> Result<Vec<Chunk>, RetrievalError>;

    /// Chunks of the same documents at `chunk.index + offset` for every
    /// chunk and offset. Positions past either end of a document are
    /// skipped; duplicates are allowed.
    fn neighbors(&self, chunks: &[Chunk], offsets: &[i64]) -> Result<Vec<Chunk>, RetrievalError>;
}

/// Text embedding model.
pub trait Embedder: Send + Sync {
    /// One vector per input text.
    fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, RetrievalError>;
}
