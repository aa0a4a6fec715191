//! Echo client: a deterministic, offline model.
//!
//! Useful for smoke tests, demos, and exercising isolation boundaries
//! without network access. Behaviour by last message:
//!
//! - a user message `/tool <name> <json-args>` requests that tool call
//! - a tool message is answered with `tool <id> returned: <content>`
//! - anything else is echoed back as `echo: <content>`
//!
//! Replies are streamed one word at a time. Usage is estimated at four
//! characters per token.

use async_trait::async_trait;
use turngraph_core::error::ModelError;
use turngraph_core::message::{Message, Role};
use turngraph_core::model::{
    ModelClient, ModelRequest, ModelResponse, StreamChunk, StreamSink, TokenUsage,
};
use turngraph_core::tool::{ToolArgs, ToolCall};

/// A model client that replies from the conversation alone.
#[derive(Debug, Default)]
pub struct EchoClient;

impl EchoClient {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl ModelClient for EchoClient {
    fn name(&self) -> &str {
        "echo"
    }

    async fn invoke(
        &self,
        request: ModelRequest,
        stream: &dyn StreamSink,
    ) -> Result<ModelResponse, ModelError> {
        let last = request
            .messages
            .last()
            .ok_or_else(|| ModelError::InvalidResponse("empty conversation".into()))?;

        let (content, tool_calls) = match last.role {
            Role::User => match last.content.strip_prefix("/tool ") {
                Some(command) => (
                    String::new(),
                    vec![parse_tool_command(command, request.messages.len())?],
                ),
                None => (format!("echo: {}", last.content), Vec::new()),
            },
            Role::Tool => (
                format!(
                    "tool {} returned: {}",
                    last.tool_call_id.as_deref().unwrap_or("?"),
                    last.content
                ),
                Vec::new(),
            ),
            _ => (format!("echo: {}", last.content), Vec::new()),
        };

        for (i, word) in content.split(' ').enumerate() {
            let delta = if i == 0 {
                word.to_string()
            } else {
                format!(" {word}")
            };
            if !delta.is_empty() {
                stream.on_chunk(StreamChunk::text(delta)).await;
            }
        }
        stream
            .on_chunk(StreamChunk {
                content: None,
                done: true,
            })
            .await;

        let prompt_chars: usize = request.messages.iter().map(|m| m.content.len()).sum();
        let usage = TokenUsage::new(
            prompt_chars.div_ceil(4) as u64,
            content.len().div_ceil(4) as u64,
        );

        Ok(ModelResponse {
            message: Message::assistant(content).with_tool_calls(tool_calls.clone()),
            tool_calls,
            usage,
        })
    }
}

/// Parse `<name> [json-args]` into a tool call with a position-derived id.
fn parse_tool_command(command: &str, position: usize) -> Result<ToolCall, ModelError> {
    let command = command.trim();
    let (name, raw_args) = command
        .split_once(char::is_whitespace)
        .unwrap_or((command, ""));

    if name.is_empty() {
        return Err(ModelError::InvalidResponse("/tool needs a tool name".into()));
    }

    let args = if raw_args.trim().is_empty() {
        ToolArgs::new()
    } else {
        serde_json::from_str::<ToolArgs>(raw_args.trim())
            .map_err(|e| ModelError::InvalidResponse(format!("/tool arguments: {e}")))?
    };

    Ok(ToolCall::new(format!("call_{position}"), name, args))
}
