//! Token estimation utilities.
//!
//! The default counter is a character heuristic: ~3 characters per token.
//! It errs on the high side for BPE tokenizers on English text, which
//! keeps clipped requests under the real context window. Plug in an exact
//! tokenizer through [`TokenCounter`] when one is available.

use ragstream_core::message::Message;

/// Counts tokens the way the target model would.
pub trait TokenCounter: Send + Sync {
    /// Estimated tokens in `text`.
    fn count(&self, text: &str) -> usize;

    /// Estimated tokens for a message. Messages without content cost 0.
    fn message_tokens(&self, message: &Message) -> usize {
        self.count(message.text())
    }
}

/// 1 token ≈ 3 characters, rounded down.
#[derive(Debug, Clone, Copy, Default)]
pub struct CharHeuristic;

impl TokenCounter for CharHeuristic {
    fn count(&self, text: &str) -> usize {
        text.chars().count() / 3
    }
}

/// Estimate tokens for a slice of messages.
pub fn estimate_messages_tokens(counter: &dyn TokenCounter, messages: &[Message]) -> usize {
    messages.iter().map(|m| counter.message_tokens(m)).sum()
}
