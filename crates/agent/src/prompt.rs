//! RAG instruction rendering.

use ragstream_core::chunk::ChunkSpan;
use ragstream_core::message::Message;

/// Build the user message that embeds `context` ahead of `user_prompt`.
///
/// Spans are rendered as `<document>` tags numbered from 1 and joined by
/// newlines. Substitution is a single pass over `template`, so text in the
/// context or the prompt that looks like a placeholder stays as it is.
pub fn rag_instruction(user_prompt: &str, context: &[ChunkSpan], template: &str) -> Message {
    let context = context
        .iter()
        .enumerate()
        .map(|(i, span)| span.to_xml(i + 1))
        .collect::<Vec<_>>()
        .join("\n");
    Message::user(render(template, &context, user_prompt.trim()))
}

fn render(template: &str, context: &str, user_prompt: &str) -> String {
    let mut out = String::with_capacity(template.len() + context.len() + user_prompt.len());
    let mut rest = template;
    while let Some(start) = rest.find('{') {
        out.push_str(&rest[..start]);
        let tail = &rest[start..];
        if let Some(after) = tail.strip_prefix("{context}") {
            out.push_str(context);
            rest = after;
        } else if let Some(after) = tail.strip_prefix("{user_prompt}") {
            out.push_str(user_prompt);
            rest = after;
        } else {
            out.push('{');
            rest = &tail[1..];
        }
    }
    out.push_str(rest);
    out
}
