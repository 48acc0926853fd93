//! The knowledge base search tool: availability, schema, and execution.

use ragstream_config::RetrievalConfig;
use ragstream_core::error::{Error, Result};
use ragstream_core::message::{Message, ToolCall};
use ragstream_core::provider::{ModelCapabilities, ToolChoice, ToolDefinition};
use ragstream_retrieval::RetrievalPipeline;
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, info};

/// The only tool the model is offered.
pub const SEARCH_TOOL_NAME: &str = "search_knowledge_base";

/// Substrings that mark a message as already carrying retrieved context.
const CONTEXT_MARKERS: [&str; 2] = ["</document>", "from_chunk_id"];

/// Whether the last message already embeds retrieved context.
pub fn contains_rag_context(messages: &[Message]) -> bool {
    messages
        .last()
        .is_some_and(|m| CONTEXT_MARKERS.iter().any(|marker| m.text().contains(marker)))
}

/// How the search tool is offered in the first completion of a turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToolPolicy {
    /// The history already has context; no tools.
    None,
    /// The model decides whether to search.
    Auto,
    /// The model must call the tool but may set `skip`.
    ForcedWithSkip,
}

impl ToolPolicy {
    /// Pick the policy for `messages` on a model with `capabilities`.
    pub fn select(messages: &[Message], capabilities: &ModelCapabilities) -> Result<Self> {
        if contains_rag_context(messages) {
            return Ok(Self::None);
        }
        if !capabilities.function_calling {
            return Err(Error::configuration(
                "You must either explicitly provide RAG context in the last message, \
                 or use an LLM that supports function calling.",
            ));
        }
        if capabilities.optional_tool_streaming {
            Ok(Self::Auto)
        } else {
            Ok(Self::ForcedWithSkip)
        }
    }

    pub fn tools(&self) -> Vec<ToolDefinition> {
        match self {
            Self::None => Vec::new(),
            Self::Auto => vec![search_tool(false)],
            Self::ForcedWithSkip => vec![search_tool(true)],
        }
    }

    pub fn tool_choice(&self) -> Option<ToolChoice> {
        match self {
            Self::None => None,
            Self::Auto => Some(ToolChoice::Auto),
            Self::ForcedWithSkip => Some(ToolChoice::Function(SEARCH_TOOL_NAME.into())),
        }
    }

    /// Text appended to the last request message so a forced model can
    /// plan its tool call. Only the forced policy has one.
    pub fn directive(&self) -> Option<String> {
        if *self != Self::ForcedWithSkip {
            return None;
        }
        let tools: Vec<serde_json::Value> =
            self.tools().iter().map(ToolDefinition::to_function_value).collect();
        Some(format!(
            "\n\nDecide whether to use or skip these tools in your response:\n{}",
            serde_json::Value::Array(tools)
        ))
    }
}

/// The `search_knowledge_base` definition, with a required `skip` flag
/// when `with_skip` is set.
pub fn search_tool(with_skip: bool) -> ToolDefinition {
    let query_description = [
        "The query string to search the knowledge base with.",
        "The query string MUST satisfy ALL of the following criteria:",
        "- The query string MUST be a precise question in the user's language.",
        "- The query string MUST resolve all pronouns to explicit nouns from the conversation history.",
        "- The query string MUST be `null` if `skip` is `true`.",
    ]
    .join("\n");

    let mut properties = serde_json::Map::new();
    let mut required = Vec::new();
    if with_skip {
        properties.insert(
            "skip".into(),
            json!({
                "type": "boolean",
                "description": "True if a satisfactory answer can be provided without the knowledge base, false otherwise.",
            }),
        );
        required.push("skip");
    }
    properties.insert(
        "query".into(),
        json!({
            "type": ["string", "null"],
            "description": query_description,
        }),
    );
    required.push("query");

    ToolDefinition {
        name: SEARCH_TOOL_NAME.into(),
        description: "Search the knowledge base. Note: only use this tool if not enough \
                      information is available to provide an answer."
            .into(),
        parameters: json!({
            "type": "object",
            "properties": properties,
            "required": required,
            "additionalProperties": false,
        }),
    }
}

#[derive(Debug, Default, Deserialize)]
struct SearchArgs {
    #[serde(default)]
    query: Option<String>,
    #[serde(default)]
    skip: Option<bool>,
}

/// Execute every tool call in order and return one tool message per call.
///
/// Nothing is returned unless every call succeeds.
pub fn run_tools(
    tool_calls: &[ToolCall],
    pipeline: &RetrievalPipeline,
    retrieval: &RetrievalConfig,
) -> Result<Vec<Message>> {
    let mut results = Vec::with_capacity(tool_calls.len());
    for call in tool_calls {
        if call.name != SEARCH_TOOL_NAME {
            return Err(Error::UnsupportedTool {
                name: call.name.clone(),
                call_id: call.id.clone(),
            });
        }
        let content = search(call, pipeline, retrieval)?;
        results.push(Message::tool_result(&call.id, content));
    }
    Ok(results)
}

fn search(
    call: &ToolCall,
    pipeline: &RetrievalPipeline,
    retrieval: &RetrievalConfig,
) -> Result<String> {
    let args: SearchArgs = if call.arguments.trim().is_empty() {
        SearchArgs::default()
    } else {
        serde_json::from_str(&call.arguments).map_err(|e| Error::InvalidToolArguments {
            call_id: call.id.clone(),
            reason: e.to_string(),
        })?
    };

    let query = args.query.as_deref().map(str::trim).unwrap_or_default();
    if args.skip.unwrap_or(false) || query.is_empty() {
        debug!(call_id = %call.id, "Search skipped");
        return Ok("{}".to_string());
    }

    let spans = pipeline
        .retrieve(&retrieval.query(query))
        .map_err(|source| Error::ToolRetrieval {
            call_id: call.id.clone(),
            source,
        })?;
    info!(call_id = %call.id, query = %query, spans = spans.len(), "Searched knowledge base");

    let documents = spans
        .iter()
        .enumerate()
        .map(|(i, span)| span.to_json(i + 1))
        .collect::<Vec<_>>()
        .join(",");
    Ok(format!(r#"{{"documents":[{documents}]}}"#))
}
