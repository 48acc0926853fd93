//! Context-window management.
//!
//! Every request of a turn is built from a clipped copy of the caller's
//! history: the longest suffix that fits the model's context window under
//! the configured [`TokenCounter`].

pub mod clip;
pub mod token;

pub use clip::clip;
pub use token::{CharHeuristic, TokenCounter, estimate_messages_tokens};
