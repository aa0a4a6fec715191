//! Token estimation utilities.
//!
//! Uses a character-based heuristic: ~4 characters per token. Good enough
//! for pruning decisions when the caller has no real tokenizer to inject.

use std::sync::Arc;
use turngraph_core::message::Message;

use crate::context::TokenCounter;

/// Per-message overhead for role name and wire-format delimiters.
const MESSAGE_OVERHEAD: usize = 4;

/// Estimate the token count for a string. Rounds up.
pub fn estimate_tokens(text: &str) -> usize {
    text.len().div_ceil(4)
}

/// Estimate tokens for a single message including overhead and any tool calls.
pub fn estimate_message_tokens(message: &Message) -> usize {
    let calls: usize = message
        .tool_calls
        .iter()
        .map(|tc| {
            estimate_tokens(&tc.name)
                + estimate_tokens(&serde_json::Value::Object(tc.args.clone()).to_string())
        })
        .sum();
    MESSAGE_OVERHEAD + estimate_tokens(&message.content) + calls
}

/// Estimate tokens for a slice of messages.
pub fn estimate_messages_tokens(messages: &[Message]) -> usize {
    messages.iter().map(estimate_message_tokens).sum()
}

/// The heuristic as an injectable counter.
pub fn heuristic_counter() -> TokenCounter {
    Arc::new(estimate_message_tokens)
}
