//! Knowledge base retrieval for ragstream.
//!
//! - [`RetrievalPipeline`]: search, rerank, neighbor expansion, span grouping
//! - [`InMemoryKnowledgeBase`]: markdown chunking with BM25 and hybrid search
//! - [`vector`]: cosine similarity and reciprocal rank fusion

pub mod in_memory;
pub mod keyword;
pub mod pipeline;
pub mod spans;
pub mod vector;

pub use in_memory::InMemoryKnowledgeBase;
pub use keyword::KeywordIndex;
pub use pipeline::RetrievalPipeline;
pub use spans::group_into_spans;
pub use vector::{cosine_similarity, reciprocal_rank_fusion, vector_search};
