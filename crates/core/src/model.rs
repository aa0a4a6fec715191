//! Model client trait: the abstraction over language-model backends.
//!
//! The engine treats a model as one opaque `invoke` call: messages and
//! instructions go in, one assistant message (plus any requested tool calls
//! and token usage) comes out. Streaming chunks are pushed to a
//! [`StreamSink`] while the call is in flight.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::ModelError;
use crate::message::Message;
use crate::tool::{ToolCall, ToolDefinition};

/// Which backend to talk to and how. Serializable so it can cross an
/// isolation boundary; secrets are never part of it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelConfig {
    /// Provider kind: "openai", "openrouter", "ollama", "custom", "echo"
    #[serde(default = "default_provider")]
    pub provider: String,

    /// Model identifier passed to the provider
    #[serde(default = "default_model")]
    pub model: String,

    /// Base URL override for OpenAI-compatible endpoints
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_url: Option<String>,

    /// Sampling temperature
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,

    /// Maximum tokens to generate per call
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
}

fn default_provider() -> String {
    "openai".into()
}
fn default_model() -> String {
    "gpt-4o-mini".into()
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: default_model(),
            api_url: None,
            temperature: None,
            max_tokens: None,
        }
    }
}

/// One model invocation.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ModelRequest {
    /// The (possibly pruned) conversation
    pub messages: Vec<Message>,

    /// Primary instructions
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instructions: Option<String>,

    /// Instructions appended after the primary ones
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub additional_instructions: Option<String>,

    /// Tools the model may call
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tools: Vec<ToolDefinition>,
}

/// Token usage totals.
///
/// `total_tokens` is maintained as the sum of the other two by every
/// constructor and by [`TokenUsage::add`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    #[serde(default)]
    pub total_tokens: u64,
}

impl TokenUsage {
    pub fn new(prompt_tokens: u64, completion_tokens: u64) -> Self {
        Self {
            prompt_tokens,
            completion_tokens,
            total_tokens: prompt_tokens + completion_tokens,
        }
    }

    /// Accumulate another call's usage; the total is recomputed, not summed.
    pub fn add(&mut self, other: &TokenUsage) {
        self.prompt_tokens += other.prompt_tokens;
        self.completion_tokens += other.completion_tokens;
        self.total_tokens = self.prompt_tokens + self.completion_tokens;
    }
}

/// A complete response from a model client.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelResponse {
    /// The generated message
    pub message: Message,

    /// Tool calls requested by the model, in issue order
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCall>,

    /// Token usage for this call
    #[serde(default)]
    pub usage: TokenUsage,
}

/// A single streaming fragment.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StreamChunk {
    /// Partial content delta
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,

    /// Whether this is the final chunk
    #[serde(default)]
    pub done: bool,
}

impl StreamChunk {
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: Some(content.into()),
            done: false,
        }
    }
}

/// Receives streaming chunks while a model call is in flight.
#[async_trait]
pub trait StreamSink: Send + Sync {
    async fn on_chunk(&self, chunk: StreamChunk);
}

/// A sink that drops every chunk.
pub struct NoopSink;

#[async_trait]
impl StreamSink for NoopSink {
    async fn on_chunk(&self, _chunk: StreamChunk) {}
}

/// The core ModelClient trait.
///
/// Every backend (OpenAI-compatible HTTP, deterministic echo, test scripts)
/// implements this. Clients that cannot stream simply never touch the sink.
#[async_trait]
pub trait ModelClient: Send + Sync {
    /// A human-readable name for this client (e.g., "openai", "echo").
    fn name(&self) -> &str;

    /// Run one model turn.
    async fn invoke(
        &self,
        request: ModelRequest,
        stream: &dyn StreamSink,
    ) -> std::result::Result<ModelResponse, ModelError>;
}
