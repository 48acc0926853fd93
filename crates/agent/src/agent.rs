//! The RAG agent: configuration plus the two turn drivers.

use std::sync::Arc;

use async_stream::try_stream;
use futures::Stream;
use ragstream_config::{RagConfig, RetrievalConfig};
use ragstream_core::chunk::ChunkSpan;
use ragstream_core::error::{Error, Result};
use ragstream_core::message::Message;
use ragstream_core::provider::Provider;
use ragstream_retrieval::RetrievalPipeline;
use tracing::debug;

use crate::blocking::BlockingTurn;
use crate::context::{CharHeuristic, TokenCounter};
use crate::prompt;
use crate::turn::{Step, TurnMachine};

/// Streams grounded answers over a caller-owned message history.
pub struct RagAgent {
    pub(crate) provider: Arc<dyn Provider>,
    pub(crate) pipeline: RetrievalPipeline,
    pub(crate) model: String,
    pub(crate) context_size_fallback: usize,
    pub(crate) template: String,
    pub(crate) retrieval: RetrievalConfig,
    pub(crate) counter: Arc<dyn TokenCounter>,
}

impl RagAgent {
    /// Create an agent for the model and retrieval settings in `config`.
    pub fn new(
        provider: Arc<dyn Provider>,
        pipeline: RetrievalPipeline,
        config: &RagConfig,
    ) -> Self {
        Self {
            provider,
            pipeline,
            model: config.model.clone(),
            context_size_fallback: config.context_size_fallback,
            template: config.rag_instruction_template.clone(),
            retrieval: config.retrieval.clone(),
            counter: Arc::new(CharHeuristic),
        }
    }

    /// Replace the default character heuristic with another token counter.
    pub fn with_token_counter(mut self, counter: Arc<dyn TokenCounter>) -> Self {
        self.counter = counter;
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// Run one turn cooperatively, yielding answer tokens as they arrive.
    ///
    /// On success `messages` gains either one assistant message, or a
    /// tool-call message, its tool results, and the final assistant message.
    /// Dropping the stream early keeps whatever was already appended.
    pub fn stream<'a>(
        &'a self,
        messages: &'a mut Vec<Message>,
    ) -> impl Stream<Item = Result<String>> + Send + 'a {
        try_stream! {
            let mut turn = TurnMachine::begin(self, messages)?;
            loop {
                let phase = turn.phase();
                let request = turn.request(messages);
                let mut chunks = self
                    .provider
                    .stream(request)
                    .await
                    .map_err(|e| Error::provider(phase, e))?;

                while let Some(chunk) = chunks.recv().await {
                    let chunk = chunk.map_err(|e| Error::provider(phase, e))?;
                    if let Some(token) = turn.accept(chunk) {
                        yield token;
                    }
                }

                if turn.finish(messages)? == Step::Done {
                    break;
                }
            }
        }
    }

    /// Run one turn by pulling tokens from an iterator.
    ///
    /// Nothing happens until the first `next()`; configuration errors are
    /// reported there. Same history semantics as [`RagAgent::stream`].
    pub fn iter_blocking<'a>(&'a self, messages: &'a mut Vec<Message>) -> BlockingTurn<'a> {
        BlockingTurn::new(self, messages)
    }

    /// Retrieve context spans for `query` with the configured settings.
    pub fn retrieve_context(&self, query: &str) -> Result<Vec<ChunkSpan>> {
        let spans = self.pipeline.retrieve(&self.retrieval.query(query))?;
        debug!(query = %query, spans = spans.len(), "Retrieved context");
        Ok(spans)
    }

    /// A user message embedding `context` with the configured template.
    pub fn rag_instruction(&self, user_prompt: &str, context: &[ChunkSpan]) -> Message {
        prompt::rag_instruction(user_prompt, context, &self.template)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::{
        ScriptedProvider, france_pipeline, text_script, tool_call_script, tool_calls_script,
    };
    use crate::tools::SEARCH_TOOL_NAME;
    use futures::StreamExt;
    use ragstream_core::error::{Phase, ProviderError};
    use ragstream_core::message::Role;
    use ragstream_core::provider::{ModelCapabilities, StreamChunk, ToolChoice};

    const QUESTION: &str = "What is the capital of France?";

    fn agent(provider: Arc<ScriptedProvider>) -> RagAgent {
        RagAgent::new(provider, france_pipeline(), &RagConfig::default())
    }

    fn forced_capabilities() -> ModelCapabilities {
        ModelCapabilities {
            function_calling: true,
            optional_tool_streaming: false,
            context_size: Some(4096),
        }
    }

    async fn collect(agent: &RagAgent, messages: &mut Vec<Message>) -> Result<Vec<String>> {
        let stream = agent.stream(messages);
        futures::pin_mut!(stream);
        let mut tokens = Vec::new();
        while let Some(token) = stream.next().await {
            tokens.push(token?);
        }
        Ok(tokens)
    }

    fn france_scripts() -> Vec<Vec<std::result::Result<StreamChunk, ProviderError>>> {
        vec![
            tool_call_script("call_1", r#"{"query":"capital of France"}"#),
            text_script(&["The capital ", "of France ", "is Paris."]),
        ]
    }

    #[tokio::test]
    async fn direct_answer_appends_one_message() {
        let provider = Arc::new(ScriptedProvider::new(vec![text_script(&["Hello", " there"])]));
        let agent = agent(provider.clone());
        let mut messages = vec![Message::user("Hi!")];

        let tokens = collect(&agent, &mut messages).await.unwrap();

        assert_eq!(tokens, vec!["Hello", " there"]);
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[1], Message::assistant("Hello there"));
        let requests = provider.requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].tool_choice, Some(ToolChoice::Auto));
        assert_eq!(requests[0].tools.len(), 1);
    }

    #[tokio::test]
    async fn france_scenario_searches_then_answers() {
        let provider = Arc::new(ScriptedProvider::new(france_scripts()));
        let agent = agent(provider.clone());
        let mut messages = vec![Message::user(QUESTION)];

        let tokens = collect(&agent, &mut messages).await.unwrap();

        assert_eq!(tokens.concat(), "The capital of France is Paris.");
        assert_eq!(messages.len(), 4);
        assert!(messages[1].has_tool_calls());
        assert_eq!(messages[2].role, Role::Tool);
        assert_eq!(messages[2].tool_call_id.as_deref(), Some("call_1"));
        let result: serde_json::Value = serde_json::from_str(messages[2].text()).unwrap();
        assert!(!result["documents"].as_array().unwrap().is_empty());
        assert_eq!(messages[3], Message::assistant("The capital of France is Paris."));

        let requests = provider.requests();
        assert_eq!(requests.len(), 2);
        assert!(requests[1].tools.is_empty());
        assert!(requests[1].tool_choice.is_none());
        assert_eq!(requests[1].messages.len(), 3);
    }

    #[tokio::test]
    async fn forced_skip_gives_empty_tool_result() {
        let provider = Arc::new(
            ScriptedProvider::new(vec![
                tool_call_script("call_1", r#"{"skip":true,"query":null}"#),
                text_script(&["Bonjour!"]),
            ])
            .with_capabilities(forced_capabilities()),
        );
        let agent = agent(provider.clone());
        let mut messages = vec![Message::user(QUESTION)];

        collect(&agent, &mut messages).await.unwrap();

        assert_eq!(messages[2].text(), "{}");
        let first = &provider.requests()[0];
        assert_eq!(
            first.tool_choice,
            Some(ToolChoice::Function("search_knowledge_base".into()))
        );
        assert!(first.tools[0].parameters["properties"].get("skip").is_some());
    }

    #[tokio::test]
    async fn forced_directive_stays_out_of_history() {
        let provider = Arc::new(
            ScriptedProvider::new(vec![text_script(&["Paris."])])
                .with_capabilities(forced_capabilities()),
        );
        let agent = agent(provider.clone());
        let mut messages = vec![Message::user(QUESTION)];

        collect(&agent, &mut messages).await.unwrap();

        let sent = provider.requests()[0].messages[0].text().to_string();
        assert!(sent.starts_with(QUESTION));
        assert!(sent.contains("Decide whether to use or skip these tools in your response:"));
        assert_eq!(messages[0], Message::user(QUESTION));
    }

    #[tokio::test]
    async fn unknown_tool_keeps_only_tool_call_message() {
        let provider = Arc::new(ScriptedProvider::new(vec![tool_calls_script(&[(
            "call_x",
            "delete_database",
            "{}",
        )])]));
        let agent = agent(provider.clone());
        let mut messages = vec![Message::user(QUESTION)];

        let err = collect(&agent, &mut messages).await.unwrap_err();

        assert!(matches!(
            err,
            Error::UnsupportedTool { ref name, .. } if name == "delete_database"
        ));
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[1].tool_calls[0].name, "delete_database");
        assert_eq!(provider.requests().len(), 1);
    }

    #[tokio::test]
    async fn embedded_context_skips_tools() {
        let provider = Arc::new(
            ScriptedProvider::new(vec![text_script(&["Paris."])]).with_capabilities(
                ModelCapabilities {
                    function_calling: false,
                    ..forced_capabilities()
                },
            ),
        );
        let agent = agent(provider.clone());
        let spans = agent.retrieve_context("capital of France").unwrap();
        let mut messages = vec![agent.rag_instruction(QUESTION, &spans)];

        collect(&agent, &mut messages).await.unwrap();

        let request = &provider.requests()[0];
        assert!(request.tools.is_empty());
        assert!(request.tool_choice.is_none());
        assert_eq!(messages.len(), 2);
    }

    #[tokio::test]
    async fn missing_function_calling_is_configuration_error() {
        let provider = Arc::new(ScriptedProvider::new(vec![]).with_capabilities(ModelCapabilities {
            function_calling: false,
            ..ModelCapabilities::default()
        }));
        let agent = agent(provider.clone());
        let mut messages = vec![Message::user(QUESTION)];

        let err = collect(&agent, &mut messages).await.unwrap_err();

        assert!(matches!(err, Error::Configuration { .. }));
        assert_eq!(messages.len(), 1);
        assert!(provider.requests().is_empty());
    }

    #[tokio::test]
    async fn unknown_context_size_without_fallback_is_configuration_error() {
        let provider = Arc::new(ScriptedProvider::new(vec![text_script(&["x"])]));
        let config = RagConfig {
            context_size_fallback: 0,
            ..RagConfig::default()
        };
        let agent = RagAgent::new(provider, france_pipeline(), &config);
        let mut messages = vec![Message::user("hi")];

        let err = collect(&agent, &mut messages).await.unwrap_err();
        assert!(matches!(err, Error::Configuration { .. }));
    }

    #[tokio::test]
    async fn history_is_clipped_to_context_size() {
        let provider = Arc::new(
            ScriptedProvider::new(vec![text_script(&["ok"])]).with_capabilities(ModelCapabilities {
                context_size: Some(10),
                ..ModelCapabilities::default()
            }),
        );
        let agent = agent(provider.clone());
        let mut messages = vec![
            Message::user("x".repeat(300)),
            Message::assistant("y".repeat(300)),
            Message::user("short question"),
        ];

        collect(&agent, &mut messages).await.unwrap();

        let sent = &provider.requests()[0].messages;
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].text(), "short question");
        assert_eq!(messages.len(), 4);
    }

    #[tokio::test]
    async fn provider_error_names_phase() {
        let provider = Arc::new(ScriptedProvider::new(vec![
            tool_call_script("call_1", r#"{"query":"capital of France"}"#),
            vec![
                Ok(StreamChunk::text("The")),
                Err(ProviderError::StreamInterrupted("connection reset".into())),
            ],
        ]));
        let agent = agent(provider);
        let mut messages = vec![Message::user(QUESTION)];

        let err = collect(&agent, &mut messages).await.unwrap_err();

        assert!(matches!(err, Error::Provider { phase: Phase::Answer, .. }));
        // Tool-call message and its result, no final answer
        assert_eq!(messages.len(), 3);
    }

    #[tokio::test]
    async fn blocking_and_cooperative_agree() {
        let cooperative = Arc::new(ScriptedProvider::new(france_scripts()));
        let blocking = Arc::new(ScriptedProvider::new(france_scripts()));
        let mut async_history = vec![Message::user(QUESTION)];
        let mut sync_history = async_history.clone();

        let async_tokens = collect(&agent(cooperative.clone()), &mut async_history)
            .await
            .unwrap();
        let sync_agent = agent(blocking.clone());
        let sync_tokens: Vec<String> = sync_agent
            .iter_blocking(&mut sync_history)
            .collect::<Result<_>>()
            .unwrap();

        assert_eq!(async_tokens, sync_tokens);
        assert_eq!(async_history, sync_history);
        assert_eq!(cooperative.requests(), blocking.requests());
    }

    fn two_call_scripts() -> Vec<Vec<std::result::Result<StreamChunk, ProviderError>>> {
        vec![
            tool_calls_script(&[
                ("c_a", SEARCH_TOOL_NAME, r#"{"query":"capital of France"}"#),
                ("c_b", SEARCH_TOOL_NAME, r#"{"skip":true,"query":null}"#),
            ]),
            text_script(&["Paris."]),
        ]
    }

    fn assert_two_call_history(messages: &[Message]) {
        assert_eq!(messages.len(), 5);
        let calls: Vec<&str> = messages[1]
            .tool_calls
            .iter()
            .map(|call| call.id.as_str())
            .collect();
        assert_eq!(calls, vec!["c_a", "c_b"]);

        assert_eq!(messages[2].role, Role::Tool);
        assert_eq!(messages[2].tool_call_id.as_deref(), Some("c_a"));
        let found: serde_json::Value = serde_json::from_str(messages[2].text()).unwrap();
        assert!(!found["documents"].as_array().unwrap().is_empty());

        assert_eq!(messages[3].role, Role::Tool);
        assert_eq!(messages[3].tool_call_id.as_deref(), Some("c_b"));
        assert_eq!(messages[3].text(), "{}");

        assert_eq!(messages[4], Message::assistant("Paris."));
    }

    #[tokio::test]
    async fn several_tool_calls_answered_in_call_order() {
        let provider = Arc::new(
            ScriptedProvider::new(two_call_scripts()).with_capabilities(forced_capabilities()),
        );
        let mut messages = vec![Message::user(QUESTION)];

        let tokens = collect(&agent(provider.clone()), &mut messages).await.unwrap();

        assert_eq!(tokens, vec!["Paris."]);
        assert_two_call_history(&messages);
        let requests = provider.requests();
        assert_eq!(requests.len(), 2);
        assert_eq!(requests[1].messages.len(), 4);
    }

    #[test]
    fn several_tool_calls_answered_in_call_order_blocking() {
        let provider = Arc::new(
            ScriptedProvider::new(two_call_scripts()).with_capabilities(forced_capabilities()),
        );
        let agent = agent(provider.clone());
        let mut messages = vec![Message::user(QUESTION)];

        let tokens: Vec<String> = agent
            .iter_blocking(&mut messages)
            .collect::<Result<_>>()
            .unwrap();

        assert_eq!(tokens, vec!["Paris."]);
        assert_two_call_history(&messages);
        assert_eq!(provider.requests().len(), 2);
    }

    #[test]
    fn rag_instruction_uses_configured_template() {
        let config = RagConfig {
            rag_instruction_template: "CONTEXT:{context}\nQ:{user_prompt}".into(),
            ..RagConfig::default()
        };
        let provider = Arc::new(ScriptedProvider::new(vec![]));
        let agent = RagAgent::new(provider, france_pipeline(), &config);

        let msg = agent.rag_instruction(" Where? ", &[]);
        assert_eq!(msg.text(), "CONTEXT:\nQ:Where?");
    }
}
