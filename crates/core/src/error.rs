//! Error types for the ragstream domain.
//!
//! Uses `thiserror` for ergonomic error definitions.
//! Each bounded context (provider, retrieval) has its own error enum;
//! the top-level [`Error`] wraps them with enough context (which phase,
//! which tool call) to diagnose a failed turn.

use thiserror::Error;

/// Which completion phase of a turn an error happened in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// First completion: the model may answer or request a search.
    ToolDecision,
    /// Second completion: the model answers from the tool results.
    Answer,
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ToolDecision => write!(f, "tool decision"),
            Self::Answer => write!(f, "answer"),
        }
    }
}

/// The top-level error type for all ragstream operations.
#[derive(Debug, Error)]
pub enum Error {
    // --- Configuration errors ---
    #[error("Configuration error: {message}")]
    Configuration { message: String },

    // --- Tool protocol errors ---
    #[error("Unsupported tool `{name}` requested (call {call_id})")]
    UnsupportedTool { name: String, call_id: String },

    #[error("Invalid arguments for tool call {call_id}: {reason}")]
    InvalidToolArguments { call_id: String, reason: String },

    // --- Retrieval errors ---
    #[error("Retrieval failed in tool call {call_id}: {source}")]
    ToolRetrieval {
        call_id: String,
        #[source]
        source: RetrievalError,
    },

    #[error("Retrieval error: {0}")]
    Retrieval(#[from] RetrievalError),

    // --- Provider errors ---
    #[error("Provider error during {phase} phase: {source}")]
    Provider {
        phase: Phase,
        #[source]
        source: ProviderError,
    },
}

impl Error {
    /// Build a configuration error from any message.
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Wrap a provider error with the phase it happened in.
    pub fn provider(phase: Phase, source: ProviderError) -> Self {
        Self::Provider { phase, source }
    }
}

/// Result type alias using our Error.
pub type Result<T> = std::result::Result<T, Error>;

// --- Bounded context errors ---

#[derive(Debug, Clone, Error)]
pub enum ProviderError {
    #[error("API request failed: {message} (status: {status_code})")]
    ApiError { status_code: u16, message: String },

    #[error("Rate limited by provider, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("Stream interrupted: {0}")]
    StreamInterrupted(String),

    #[error("Provider not configured: {0}")]
    NotConfigured(String),

    #[error("Network error: {0}")]
    Network(String),
}

#[derive(Debug, Clone, Error)]
pub enum RetrievalError {
    #[error("Search failed: {0}")]
    SearchFailed(String),

    #[error("Reranking failed: {0}")]
    RerankFailed(String),

    #[error("Chunk storage error: {0}")]
    Storage(String),

    #[error("Embedding generation failed: {0}")]
    EmbeddingFailed(String),

    #[error("Invalid retrieval query: {0}")]
    InvalidQuery(String),
}
