//! Reassembles a streamed completion into a single assistant message.

use std::collections::BTreeMap;

use ragstream_core::message::{Message, Role, ToolCall};
use ragstream_core::provider::StreamChunk;

#[derive(Debug, Default)]
struct PartialCall {
    id: String,
    name: String,
    arguments: String,
}

/// Accumulates content and tool call deltas, keyed by call index.
#[derive(Debug, Default)]
pub struct ResponseBuilder {
    content: String,
    calls: BTreeMap<u32, PartialCall>,
}

impl ResponseBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a chunk. Returns its text token, if it carries one.
    ///
    /// Empty content deltas produce no token, so neither driver yields `""`.
    pub fn push(&mut self, chunk: StreamChunk) -> Option<String> {
        for delta in chunk.tool_calls {
            let call = self.calls.entry(delta.index).or_default();
            if let Some(id) = delta.id.filter(|id| !id.is_empty()) {
                call.id = id;
            }
            if let Some(name) = delta.name.filter(|name| !name.is_empty()) {
                call.name = name;
            }
            if let Some(arguments) = delta.arguments {
                call.arguments.push_str(&arguments);
            }
        }

        let token = chunk.content.filter(|c| !c.is_empty())?;
        self.content.push_str(&token);
        Some(token)
    }

    /// The complete assistant message. Tool calls come out in index order;
    /// a call whose id never arrived is named after its index.
    pub fn finish(self) -> Message {
        let tool_calls: Vec<ToolCall> = self
            .calls
            .into_iter()
            .map(|(index, call)| ToolCall {
                id: if call.id.is_empty() {
                    format!("call_{index}")
                } else {
                    call.id
                },
                name: call.name,
                arguments: call.arguments,
            })
            .collect();

        let content = if tool_calls.is_empty() || !self.content.is_empty() {
            Some(self.content)
        } else {
            None
        };

        Message {
            role: Role::Assistant,
            content,
            tool_calls,
            tool_call_id: None,
        }
    }
}
