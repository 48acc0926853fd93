//! The turn state machine shared by the blocking and cooperative drivers.
//!
//! A turn runs at most two streamed completions:
//!
//! 1. **Tool decision**: the clipped history is sent with the search tool
//!    (per [`ToolPolicy`]). Tokens are passed through as they arrive.
//! 2. **Answer**: only when the first response requested tool calls. The
//!    tool-call message and one result per call are appended to the
//!    history, which is clipped again and sent without tools.
//!
//! The machine does no I/O. A driver asks it for the next request, feeds
//! it the chunks of that request's stream, and calls [`TurnMachine::finish`]
//! when the stream ends.

use ragstream_core::error::{Error, Phase, Result};
use ragstream_core::message::Message;
use ragstream_core::provider::{CompletionRequest, StreamChunk};
use tracing::{debug, info};

use crate::agent::RagAgent;
use crate::builder::ResponseBuilder;
use crate::context::{clip, estimate_messages_tokens};
use crate::tools::{ToolPolicy, run_tools};

/// What the driver does after a completion stream ends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Step {
    /// Issue the next request.
    Continue,
    /// The turn is over.
    Done,
}

pub(crate) struct TurnMachine<'a> {
    agent: &'a RagAgent,
    max_tokens: usize,
    policy: ToolPolicy,
    phase: Phase,
    builder: ResponseBuilder,
}

impl<'a> TurnMachine<'a> {
    /// Resolve the token budget and tool policy for a new turn.
    pub(crate) fn begin(agent: &'a RagAgent, messages: &[Message]) -> Result<Self> {
        let capabilities = agent.provider.capabilities(&agent.model);
        let max_tokens = match capabilities.context_size {
            Some(size) => size,
            None if agent.context_size_fallback > 0 => agent.context_size_fallback,
            None => {
                return Err(Error::configuration(format!(
                    "context size of model `{}` is unknown and no fallback is configured",
                    agent.model
                )));
            }
        };
        let policy = ToolPolicy::select(messages, &capabilities)?;

        info!(
            provider = agent.provider.name(),
            model = %agent.model,
            max_tokens,
            policy = ?policy,
            "Starting turn"
        );

        Ok(Self {
            agent,
            max_tokens,
            policy,
            phase: Phase::ToolDecision,
            builder: ResponseBuilder::new(),
        })
    }

    pub(crate) fn phase(&self) -> Phase {
        self.phase
    }

    /// The request for the current phase, built from a clipped copy of
    /// `messages`. The forced-tool directive only ever lands in the copy.
    pub(crate) fn request(&self, messages: &[Message]) -> CompletionRequest {
        let mut clipped = clip(messages, self.max_tokens, self.agent.counter.as_ref());

        let (tools, tool_choice) = match self.phase {
            Phase::ToolDecision => {
                if let Some(directive) = self.policy.directive()
                    && let Some(last) = clipped.last_mut()
                {
                    last.content = Some(format!("{}{directive}", last.text()));
                }
                (self.policy.tools(), self.policy.tool_choice())
            }
            Phase::Answer => (Vec::new(), None),
        };

        debug!(
            phase = %self.phase,
            messages = clipped.len(),
            dropped = messages.len() - clipped.len(),
            tokens = estimate_messages_tokens(self.agent.counter.as_ref(), &clipped),
            tools = tools.len(),
            "Requesting completion"
        );

        CompletionRequest {
            model: self.agent.model.clone(),
            messages: clipped,
            tools,
            tool_choice,
        }
    }

    /// Record a chunk of the current stream; returns its text token.
    pub(crate) fn accept(&mut self, chunk: StreamChunk) -> Option<String> {
        self.builder.push(chunk)
    }

    /// Close the current stream and apply its outcome to `messages`.
    ///
    /// When the tool decision asked for tools, the tool-call message is
    /// appended before the tools run, so a failing tool leaves it in the
    /// history without any results.
    pub(crate) fn finish(&mut self, messages: &mut Vec<Message>) -> Result<Step> {
        let response = std::mem::take(&mut self.builder).finish();

        if self.phase == Phase::ToolDecision && response.has_tool_calls() {
            let calls = response.tool_calls.clone();
            info!(count = calls.len(), "Model requested tool calls");
            messages.push(response);

            let results = run_tools(&calls, &self.agent.pipeline, &self.agent.retrieval)?;
            messages.extend(results);
            self.phase = Phase::Answer;
            return Ok(Step::Continue);
        }

        debug!(phase = %self.phase, chars = response.text().len(), "Turn complete");
        messages.push(response);
        Ok(Step::Done)
    }
}
