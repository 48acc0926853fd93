//! OpenAI-compatible provider implementation.
//!
//! Works with: OpenAI, OpenRouter, Ollama, vLLM, llama.cpp server,
//! Together AI, and any endpoint exposing `/v1/chat/completions`.
//!
//! Supports:
//! - Streaming chat completions over SSE, async and blocking
//! - Tool use / function calling with `tool_choice`

use async_trait::async_trait;
use futures::StreamExt;
use ragstream_core::error::ProviderError;
use ragstream_core::message::{Message, Role};
use ragstream_core::provider::*;
use serde::Serialize;
use std::io::{BufRead, BufReader, Lines};
use tracing::{debug, warn};

use crate::sse::{LineBuffer, SseEvent, decode_line};

const REQUEST_TIMEOUT_SECS: u64 = 120;

/// An OpenAI-compatible LLM provider.
///
/// This handles the vast majority of LLM backends since most expose
/// an OpenAI-compatible `/v1/chat/completions` endpoint.
pub struct OpenAiCompatProvider {
    name: String,
    base_url: String,
    api_key: String,
    capabilities: ModelCapabilities,
    client: reqwest::Client,
}

impl OpenAiCompatProvider {
    /// Create a new OpenAI-compatible provider.
    pub fn new(
        name: impl Into<String>,
        base_url: impl Into<String>,
        api_key: impl Into<String>,
    ) -> Self {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .unwrap_or_default();

        Self {
            name: name.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            capabilities: ModelCapabilities::default(),
            client,
        }
    }

    /// Create an OpenAI provider (convenience constructor).
    pub fn openai(api_key: impl Into<String>) -> Self {
        Self::new("openai", "https://api.openai.com/v1", api_key)
    }

    /// Create a llama.cpp server provider (convenience constructor).
    ///
    /// llama.cpp cannot stream while tool use is optional, so tool use is
    /// forced for this backend.
    pub fn llamacpp(base_url: Option<&str>) -> Self {
        Self::new(
            "llamacpp",
            base_url.unwrap_or("http://localhost:8080/v1"),
            "llamacpp", // llama.cpp doesn't need a real key
        )
        .with_capabilities(ModelCapabilities {
            optional_tool_streaming: false,
            ..ModelCapabilities::default()
        })
    }

    /// Set the capability flags reported for every model.
    pub fn with_capabilities(mut self, capabilities: ModelCapabilities) -> Self {
        self.capabilities = capabilities;
        self
    }

    fn url(&self) -> String {
        format!("{}/chat/completions", self.base_url)
    }

    /// Convert our Message types to OpenAI API format.
    fn to_api_messages(messages: &[Message]) -> Vec<ApiMessage> {
        messages
            .iter()
            .map(|m| ApiMessage {
                role: match m.role {
                    Role::User => "user",
                    Role::Assistant => "assistant",
                    Role::System => "system",
                    Role::Tool => "tool",
                },
                content: m.content.clone(),
                tool_calls: if m.tool_calls.is_empty() {
                    None
                } else {
                    Some(
                        m.tool_calls
                            .iter()
                            .map(|tc| ApiToolCall {
                                id: tc.id.clone(),
                                r#type: "function",
                                function: ApiFunction {
                                    name: tc.name.clone(),
                                    arguments: tc.arguments.clone(),
                                },
                            })
                            .collect(),
                    )
                },
                tool_call_id: m.tool_call_id.clone(),
            })
            .collect()
    }

    /// Build the JSON body of a streaming chat completion request.
    fn request_body(request: &CompletionRequest) -> serde_json::Value {
        let mut body = serde_json::json!({
            "model": request.model,
            "messages": Self::to_api_messages(&request.messages),
            "stream": true,
        });

        if !request.tools.is_empty() {
            body["tools"] = request
                .tools
                .iter()
                .map(ToolDefinition::to_function_value)
                .collect();
        }

        if let Some(choice) = &request.tool_choice {
            body["tool_choice"] = choice.to_value();
        }

        body
    }
}

/// Map a non-success HTTP status to a provider error.
fn status_error(status: u16, body: String) -> ProviderError {
    match status {
        429 => ProviderError::RateLimited {
            retry_after_secs: 5,
        },
        401 | 403 => ProviderError::AuthenticationFailed(
            "Invalid API key or insufficient permissions".into(),
        ),
        _ => ProviderError::ApiError {
            status_code: status,
            message: body,
        },
    }
}

#[async_trait]
impl ragstream_core::Provider for OpenAiCompatProvider {
    fn name(&self) -> &str {
        &self.name
    }

    fn capabilities(&self, _model: &str) -> ModelCapabilities {
        self.capabilities
    }

    async fn stream(
        &self,
        request: CompletionRequest,
    ) -> std::result::Result<ChunkReceiver, ProviderError> {
        let body = Self::request_body(&request);

        debug!(
            provider = %self.name,
            model = %request.model,
            tools = request.tools.len(),
            "Sending streaming request"
        );

        let response = self
            .client
            .post(self.url())
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Accept", "text/event-stream")
            .json(&body)
            .send()
            .await
            .map_err(|e| ProviderError::Network(e.to_string()))?;

        let status = response.status().as_u16();
        if status != 200 {
            let error_body = response.text().await.unwrap_or_default();
            warn!(status, body = %error_body, "Provider streaming error");
            return Err(status_error(status, error_body));
        }

        let (tx, rx) = tokio::sync::mpsc::channel(64);

        // Spawn task to read the SSE byte stream and forward chunks
        tokio::spawn(async move {
            let mut byte_stream = response.bytes_stream();
            let mut lines = LineBuffer::default();

            while let Some(chunk_result) = byte_stream.next().await {
                let bytes = match chunk_result {
                    Ok(b) => b,
                    Err(e) => {
                        let _ = tx
                            .send(Err(ProviderError::StreamInterrupted(e.to_string())))
                            .await;
                        return;
                    }
                };

                for line in lines.push(&bytes) {
                    match decode_line(&line) {
                        SseEvent::Chunk(chunk) => {
                            if tx.send(Ok(chunk)).await.is_err() {
                                return; // receiver dropped
                            }
                        }
                        SseEvent::Done => return,
                        SseEvent::Skip => {}
                    }
                }
            }

            // Stream ended without [DONE]; flush a trailing unterminated line
            if let Some(line) = lines.finish()
                && let SseEvent::Chunk(chunk) = decode_line(&line)
            {
                let _ = tx.send(Ok(chunk)).await;
            }
        });

        Ok(rx)
    }

    // reqwest's blocking client runs its own runtime; call this from
    // plain threads, not from inside a tokio runtime.
    fn stream_blocking(
        &self,
        request: CompletionRequest,
    ) -> std::result::Result<BlockingChunks, ProviderError> {
        let body = Self::request_body(&request);

        debug!(
            provider = %self.name,
            model = %request.model,
            tools = request.tools.len(),
            "Sending blocking streaming request"
        );

        let client = reqwest::blocking::Client::builder()
            .timeout(std::time::Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .map_err(|e| ProviderError::Network(e.to_string()))?;

        let response = client
            .post(self.url())
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Accept", "text/event-stream")
            .json(&body)
            .send()
            .map_err(|e| ProviderError::Network(e.to_string()))?;

        let status = response.status().as_u16();
        if status != 200 {
            let error_body = response.text().unwrap_or_default();
            warn!(status, body = %error_body, "Provider streaming error");
            return Err(status_error(status, error_body));
        }

        Ok(Box::new(BlockingSseChunks {
            lines: BufReader::new(response).lines(),
            finished: false,
        }))
    }
}

/// Pulls SSE lines from a blocking response body on demand.
struct BlockingSseChunks {
    lines: Lines<BufReader<reqwest::blocking::Response>>,
    finished: bool,
}

impl Iterator for BlockingSseChunks {
    type Item = std::result::Result<StreamChunk, ProviderError>;

    fn next(&mut self) -> Option<Self::Item> {
        while !self.finished {
            match self.lines.next() {
                Some(Ok(line)) => match decode_line(&line) {
                    SseEvent::Chunk(chunk) => return Some(Ok(chunk)),
                    SseEvent::Done => self.finished = true,
                    SseEvent::Skip => {}
                },
                Some(Err(e)) => {
                    self.finished = true;
                    return Some(Err(ProviderError::StreamInterrupted(e.to_string())));
                }
                None => self.finished = true,
            }
        }
        None
    }
}

// --- OpenAI API types (internal) ---

#[derive(Debug, Serialize)]
struct ApiMessage {
    role: &'static str,
    content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_calls: Option<Vec<ApiToolCall>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_call_id: Option<String>,
}

#[derive(Debug, Serialize)]
struct ApiToolCall {
    id: String,
    r#type: &'static str,
    function: ApiFunction,
}

#[derive(Debug, Serialize)]
struct ApiFunction {
    name: String,
    arguments: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use ragstream_core::Provider;
    use ragstream_core::message::ToolCall;

    #[test]
    fn openai_constructor() {
        let p = OpenAiCompatProvider::openai("sk-test");
        assert_eq!(p.name(), "openai");
        assert_eq!(p.url(), "https://api.openai.com/v1/chat/completions");
    }

    #[test]
    fn llamacpp_forces_tool_use() {
        let p = OpenAiCompatProvider::llamacpp(None);
        let caps = p.capabilities("qwen2.5-7b-instruct");
        assert!(caps.function_calling);
        assert!(!caps.optional_tool_streaming);
    }

    #[test]
    fn trailing_slash_trimmed() {
        let p = OpenAiCompatProvider::new("vllm", "http://localhost:8000/v1/", "");
        assert_eq!(p.url(), "http://localhost:8000/v1/chat/completions");
    }

    #[test]
    fn message_conversion_with_tool_calls() {
        let msgs = vec![
            Message::user("What is the capital of France?"),
            Message::tool_calls(vec![ToolCall {
                id: "call_1".into(),
                name: "search_knowledge_base".into(),
                arguments: r#"{"query":"capital of France"}"#.into(),
            }]),
            Message::tool_result("call_1", "{}"),
        ];
        let api = OpenAiCompatProvider::to_api_messages(&msgs);
        assert_eq!(api[0].role, "user");
        assert!(api[1].content.is_none());
        assert_eq!(api[1].tool_calls.as_ref().unwrap()[0].function.name, "search_knowledge_base");
        assert_eq!(api[2].role, "tool");
        assert_eq!(api[2].tool_call_id.as_deref(), Some("call_1"));
    }

    #[test]
    fn request_body_with_forced_tool() {
        let request = CompletionRequest {
            model: "gpt-4o-mini".into(),
            messages: vec![Message::user("hi")],
            tools: vec![ToolDefinition {
                name: "search_knowledge_base".into(),
                description: "Search the knowledge base.".into(),
                parameters: serde_json::json!({"type": "object"}),
            }],
            tool_choice: Some(ToolChoice::Function("search_knowledge_base".into())),
        };
        let body = OpenAiCompatProvider::request_body(&request);
        assert_eq!(body["stream"], true);
        assert_eq!(body["tools"][0]["type"], "function");
        assert_eq!(body["tools"][0]["function"]["name"], "search_knowledge_base");
        assert_eq!(body["tool_choice"]["function"]["name"], "search_knowledge_base");
    }

    #[test]
    fn request_body_without_tools() {
        let request = CompletionRequest {
            model: "gpt-4o-mini".into(),
            messages: vec![Message::user("hi")],
            tools: vec![],
            tool_choice: None,
        };
        let body = OpenAiCompatProvider::request_body(&request);
        assert!(body.get("tools").is_none());
        assert!(body.get("tool_choice").is_none());
        assert_eq!(body["messages"][0]["content"], "hi");
    }

    #[test]
    fn status_mapping() {
        assert!(matches!(status_error(429, String::new()), ProviderError::RateLimited { .. }));
        assert!(matches!(
            status_error(401, String::new()),
            ProviderError::AuthenticationFailed(_)
        ));
        assert!(matches!(
            status_error(500, "boom".into()),
            ProviderError::ApiError { status_code: 500, .. }
        ));
    }
}
