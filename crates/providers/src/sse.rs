//! Server-sent event decoding for OpenAI-style streaming completions.
//!
//! Shared by the async and the blocking transports: both split the body
//! into lines and feed each one to [`decode_line`].

use ragstream_core::provider::{StreamChunk, ToolCallDelta};
use serde::Deserialize;
use tracing::trace;

/// What a single SSE line means for the chunk stream.
#[derive(Debug, PartialEq)]
pub(crate) enum SseEvent {
    /// A content and/or tool call delta.
    Chunk(StreamChunk),
    /// `data: [DONE]`, the end of the stream.
    Done,
    /// Comments, blank lines, finish markers, usage-only frames.
    Skip,
}

/// Decode one line (without its trailing newline).
pub(crate) fn decode_line(line: &str) -> SseEvent {
    let line = line.trim_end_matches('\r');

    // Skip empty lines and SSE comments
    if line.is_empty() || line.starts_with(':') {
        return SseEvent::Skip;
    }

    let Some(data) = line.strip_prefix("data:") else {
        return SseEvent::Skip;
    };
    let data = data.trim();

    if data == "[DONE]" {
        return SseEvent::Done;
    }

    match serde_json::from_str::<StreamResponse>(data) {
        Ok(resp) => {
            let Some(choice) = resp.choices.into_iter().next() else {
                return SseEvent::Skip;
            };
            let content = choice.delta.content.filter(|c| !c.is_empty());
            let tool_calls: Vec<ToolCallDelta> = choice
                .delta
                .tool_calls
                .unwrap_or_default()
                .into_iter()
                .map(|tc| {
                    let (name, arguments) = match tc.function {
                        Some(f) => (f.name, f.arguments),
                        None => (None, None),
                    };
                    ToolCallDelta {
                        index: tc.index,
                        id: tc.id,
                        name,
                        arguments,
                    }
                })
                .collect();

            if content.is_none() && tool_calls.is_empty() {
                SseEvent::Skip
            } else {
                SseEvent::Chunk(StreamChunk {
                    content,
                    tool_calls,
                })
            }
        }
        Err(e) => {
            trace!(data = %data, error = %e, "Ignoring unparseable SSE chunk");
            SseEvent::Skip
        }
    }
}

/// Accumulates raw bytes and yields complete lines.
///
/// Lines are decoded only once complete, so a multibyte character split
/// across network chunks survives intact.
#[derive(Default)]
pub(crate) struct LineBuffer {
    buffer: Vec<u8>,
}

impl LineBuffer {
    /// Append bytes and drain every complete line.
    pub(crate) fn push(&mut self, bytes: &[u8]) -> Vec<String> {
        self.buffer.extend_from_slice(bytes);
        let mut lines = Vec::new();
        while let Some(line_end) = self.buffer.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=line_end).collect();
            lines.push(String::from_utf8_lossy(&line[..line_end]).into_owned());
        }
        lines
    }

    /// Whatever is left after the body ended without a newline.
    pub(crate) fn finish(self) -> Option<String> {
        (!self.buffer.is_empty()).then(|| String::from_utf8_lossy(&self.buffer).into_owned())
    }
}

// --- Streaming SSE types ---

/// A single SSE `data: {...}` chunk from a streaming response.
#[derive(Debug, Deserialize)]
struct StreamResponse {
    #[serde(default)]
    choices: Vec<StreamChoice>,
}

#[derive(Debug, Deserialize)]
struct StreamChoice {
    delta: StreamDelta,
}

#[derive(Debug, Deserialize)]
struct StreamDelta {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    tool_calls: Option<Vec<StreamToolCallDelta>>,
}

/// A tool call delta, arriving incrementally across chunks.
#[derive(Debug, Deserialize)]
struct StreamToolCallDelta {
    index: u32,
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    function: Option<StreamFunctionDelta>,
}

#[derive(Debug, Deserialize)]
struct StreamFunctionDelta {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    arguments: Option<String>,
}
