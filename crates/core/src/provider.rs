//! Provider trait: the abstraction over completion backends.
//!
//! A Provider knows how to send a conversation to an LLM and stream the
//! response back as incremental chunks. Two transports are required:
//! a cooperative one (`stream`, driven by an async runtime) and a blocking
//! one (`stream_blocking`, driven by a pulling iterator).

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::ProviderError;
use crate::message::Message;

/// A streamed completion request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompletionRequest {
    /// The model to use (e.g., "gpt-4o-mini", "llama-3.1-8b-instruct")
    pub model: String,

    /// The (already clipped) conversation messages
    pub messages: Vec<Message>,

    /// Tools the model may call
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tools: Vec<ToolDefinition>,

    /// How the model should pick among `tools`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_choice: Option<ToolChoice>,
}

/// A tool definition sent to the LLM so it knows what it can call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDefinition {
    /// The function name
    pub name: String,

    /// Description of what the function does
    pub description: String,

    /// JSON Schema describing the function's parameters
    pub parameters: serde_json::Value,
}

impl ToolDefinition {
    /// The OpenAI-style `{"type": "function", "function": {...}}` envelope.
    pub fn to_function_value(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "function",
            "function": {
                "name": self.name,
                "description": self.description,
                "parameters": self.parameters,
            }
        })
    }
}

/// Tool selection mode for a request that offers tools.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolChoice {
    /// The model decides whether to call a tool.
    Auto,
    /// The model must call the named function.
    Function(String),
}

impl ToolChoice {
    /// Wire representation: `"auto"` or `{"type":"function","function":{"name":..}}`.
    pub fn to_value(&self) -> serde_json::Value {
        match self {
            Self::Auto => serde_json::json!("auto"),
            Self::Function(name) => serde_json::json!({
                "type": "function",
                "function": { "name": name }
            }),
        }
    }
}

/// An incremental tool call fragment. Fragments with the same `index`
/// belong to the same call; `arguments` pieces are concatenated in order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolCallDelta {
    pub index: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub arguments: Option<String>,
}

/// A single chunk in a streaming response.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StreamChunk {
    /// Partial content delta
    #[serde(default)]
    pub content: Option<String>,

    /// Partial tool call deltas
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCallDelta>,
}

impl StreamChunk {
    /// A chunk carrying only a text token.
    pub fn text(token: impl Into<String>) -> Self {
        Self {
            content: Some(token.into()),
            tool_calls: Vec::new(),
        }
    }
}

/// What a backend can do with a given model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelCapabilities {
    /// The model accepts tool definitions and emits tool calls.
    pub function_calling: bool,

    /// The backend can stream while tool use is left to the model
    /// (`tool_choice = "auto"`). When false, tool use must be forced.
    pub optional_tool_streaming: bool,

    /// The model's context window in tokens, if the backend knows it.
    pub context_size: Option<usize>,
}

impl Default for ModelCapabilities {
    fn default() -> Self {
        Self {
            function_calling: true,
            optional_tool_streaming: true,
            context_size: None,
        }
    }
}

/// Receiving end of a cooperative completion stream.
pub type ChunkReceiver =
    tokio::sync::mpsc::Receiver<std::result::Result<StreamChunk, ProviderError>>;

/// A blocking completion stream; each `next()` waits for the transport.
pub type BlockingChunks =
    Box<dyn Iterator<Item = std::result::Result<StreamChunk, ProviderError>> + Send>;

/// The core Provider trait.
///
/// The orchestrator calls `stream()` or `stream_blocking()` without
/// knowing which backend is being used.
#[async_trait]
pub trait Provider: Send + Sync {
    /// A human-readable name for this provider (e.g., "openai", "llamacpp").
    fn name(&self) -> &str;

    /// Capability flags for `model` on this backend.
    fn capabilities(&self, model: &str) -> ModelCapabilities;

    /// Send a request and receive its chunks cooperatively.
    async fn stream(&self, request: CompletionRequest)
    -> std::result::Result<ChunkReceiver, ProviderError>;

    /// Send a request and receive its chunks by blocking the caller.
    fn stream_blocking(
        &self,
        request: CompletionRequest,
    ) -> std::result::Result<BlockingChunks, ProviderError>;
}
