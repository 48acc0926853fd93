//! Shared test helpers: a scripted provider and a small knowledge base.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use ragstream_core::chunk::Document;
use ragstream_core::error::ProviderError;
use ragstream_core::provider::{
    BlockingChunks, ChunkReceiver, CompletionRequest, ModelCapabilities, Provider, StreamChunk,
    ToolCallDelta,
};
use ragstream_retrieval::{InMemoryKnowledgeBase, RetrievalPipeline};

use crate::tools::SEARCH_TOOL_NAME;

pub type Script = Vec<Result<StreamChunk, ProviderError>>;

/// A mock provider that replays one scripted stream per request.
///
/// Both transports share the queue and record every request they receive.
pub struct ScriptedProvider {
    scripts: Mutex<VecDeque<Script>>,
    requests: Mutex<Vec<CompletionRequest>>,
    capabilities: ModelCapabilities,
}

impl ScriptedProvider {
    pub fn new(scripts: Vec<Script>) -> Self {
        Self {
            scripts: Mutex::new(scripts.into()),
            requests: Mutex::new(Vec::new()),
            capabilities: ModelCapabilities::default(),
        }
    }

    pub fn with_capabilities(mut self, capabilities: ModelCapabilities) -> Self {
        self.capabilities = capabilities;
        self
    }

    /// Every request received so far, in order.
    pub fn requests(&self) -> Vec<CompletionRequest> {
        self.requests.lock().unwrap().clone()
    }

    fn next_script(&self, request: CompletionRequest) -> Result<Script, ProviderError> {
        self.requests.lock().unwrap().push(request);
        self.scripts
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| ProviderError::NotConfigured("no scripted response left".into()))
    }
}

#[async_trait::async_trait]
impl Provider for ScriptedProvider {
    fn name(&self) -> &str {
        "scripted"
    }

    fn capabilities(&self, _model: &str) -> ModelCapabilities {
        self.capabilities
    }

    async fn stream(&self, request: CompletionRequest) -> Result<ChunkReceiver, ProviderError> {
        let script = self.next_script(request)?;
        let (tx, rx) = tokio::sync::mpsc::channel(script.len().max(1));
        for item in script {
            // Capacity covers the whole script
            let _ = tx.try_send(item);
        }
        Ok(rx)
    }

    fn stream_blocking(&self, request: CompletionRequest) -> Result<BlockingChunks, ProviderError> {
        let script = self.next_script(request)?;
        Ok(Box::new(script.into_iter()))
    }
}

/// A stream of text tokens.
pub fn text_script(tokens: &[&str]) -> Script {
    tokens.iter().map(|t| Ok(StreamChunk::text(*t))).collect()
}

/// A stream requesting one search call, with arguments split in two.
pub fn tool_call_script(id: &str, arguments: &str) -> Script {
    let (head, tail) = arguments.split_at(arguments.len() / 2);
    vec![
        Ok(StreamChunk {
            content: None,
            tool_calls: vec![ToolCallDelta {
                index: 0,
                id: Some(id.into()),
                name: Some(SEARCH_TOOL_NAME.into()),
                arguments: Some(head.into()),
            }],
        }),
        Ok(StreamChunk {
            content: None,
            tool_calls: vec![ToolCallDelta {
                index: 0,
                arguments: Some(tail.into()),
                ..Default::default()
            }],
        }),
    ]
}

/// A stream requesting arbitrary `(id, name, arguments)` calls.
pub fn tool_calls_script(calls: &[(&str, &str, &str)]) -> Script {
    calls
        .iter()
        .enumerate()
        .map(|(index, (id, name, arguments))| {
            Ok(StreamChunk {
                content: None,
                tool_calls: vec![ToolCallDelta {
                    index: index as u32,
                    id: Some(id.to_string()),
                    name: Some(name.to_string()),
                    arguments: Some(arguments.to_string()),
                }],
            })
        })
        .collect()
}

const FRANCE: &str = "\
# France

France is a country in Western Europe.

## Capital

Paris is the capital of France and its largest city.

## Cuisine

French cuisine is known for bread, cheese and wine.
";

/// A retrieval pipeline over a one-document knowledge base about France.
pub fn france_pipeline() -> RetrievalPipeline {
    let kb = InMemoryKnowledgeBase::new();
    kb.insert_document(
        Document {
            id: "france".into(),
            filename: "france.md".into(),
            url: None,
        },
        FRANCE,
    )
    .unwrap();
    RetrievalPipeline::from_knowledge_base(Arc::new(kb))
}
