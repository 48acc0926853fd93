//! Retrieval-augmented turn orchestration.
//!
//! A turn follows a **decide → search → answer** protocol:
//!
//! 1. **Clip** the history to the model's context window
//! 2. **Offer** the `search_knowledge_base` tool (unless the last message
//!    already embeds retrieved context) and stream the first completion
//! 3. **If tool calls**: run the searches, append the tool-call message and
//!    one result per call, then stream a second completion without tools
//! 4. **Append** the final assistant message to the history
//!
//! The same turn machine backs both entry points:
//! [`RagAgent::stream`] (cooperative, a `futures::Stream`) and
//! [`RagAgent::iter_blocking`] (blocking, an `Iterator`).

pub mod agent;
pub mod blocking;
pub mod builder;
pub mod context;
pub mod prompt;
pub mod tools;
mod turn;

#[cfg(test)]
mod test_helpers;

pub use agent::RagAgent;
pub use blocking::BlockingTurn;
pub use builder::ResponseBuilder;
pub use context::{CharHeuristic, TokenCounter, clip};
pub use prompt::rag_instruction;
pub use tools::{SEARCH_TOOL_NAME, ToolPolicy, contains_rag_context, run_tools, search_tool};
