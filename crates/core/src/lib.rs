//! # ragstream Core
//!
//! Domain types, traits, and error definitions for the ragstream
//! retrieval-augmented chat orchestrator. This crate has **no transport or
//! storage dependencies**: it defines the model every other crate
//! implements against.
//!
//! ## Design Philosophy
//!
//! Every external collaborator is a trait here:
//! - [`Provider`] streams completions (cooperatively or blocking)
//! - [`SearchBackend`], [`Reranker`], [`ChunkStore`] and [`Embedder`]
//!   make up the knowledge base
//!
//! Implementations live in their respective crates, so tests can swap in
//! scripted providers and in-memory stores.

pub mod chunk;
pub mod error;
pub mod message;
pub mod provider;
pub mod retrieval;

// Re-export key types at crate root for ergonomics
pub use chunk::{Chunk, ChunkId, ChunkSpan, Document};
pub use error::{Error, Phase, ProviderError, Result, RetrievalError};
pub use message::{Message, Role, ToolCall};
pub use provider::{
    BlockingChunks, ChunkReceiver, CompletionRequest, ModelCapabilities, Provider, StreamChunk,
    ToolCallDelta, ToolChoice, ToolDefinition,
};
pub use retrieval::{ChunkStore, Embedder, Reranker, RetrievalQuery, SearchBackend, SearchHit};
