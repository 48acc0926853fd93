//! History clipping to a token ceiling.

use ragstream_core::message::Message;

use super::token::TokenCounter;

/// The longest suffix of `messages` whose total cost fits in `max_tokens`.
///
/// The last message is always kept, even when it alone is over budget, so
/// a non-empty history never clips to nothing. `messages` is not modified.
pub fn clip(messages: &[Message], max_tokens: usize, counter: &dyn TokenCounter) -> Vec<Message> {
    let mut total = 0usize;
    let mut start = messages.len();
    for (i, message) in messages.iter().enumerate().rev() {
        total = total.saturating_add(counter.message_tokens(message));
        if total > max_tokens && start < messages.len() {
            break;
        }
        start = i;
    }
    messages[start..].to_vec()
}
