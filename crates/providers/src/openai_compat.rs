//! OpenAI-compatible model client.
//!
//! Works with: OpenAI, OpenRouter, Ollama, vLLM, and any endpoint exposing
//! `/v1/chat/completions` with SSE streaming.
//!
//! Every call streams. Content deltas are forwarded to the caller's
//! [`StreamSink`] as they arrive and accumulated into the final message;
//! tool-call deltas are assembled by index and returned in issue order.

use async_trait::async_trait;
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{debug, trace, warn};
use turngraph_core::error::ModelError;
use turngraph_core::message::{Message, Role};
use turngraph_core::model::{
    ModelClient, ModelRequest, ModelResponse, StreamChunk, StreamSink, TokenUsage,
};
use turngraph_core::tool::{ToolArgs, ToolCall, ToolDefinition};

/// An OpenAI-compatible model client.
pub struct OpenAiCompatClient {
    name: String,
    base_url: String,
    api_key: String,
    model: String,
    temperature: Option<f32>,
    max_tokens: Option<u32>,
    client: reqwest::Client,
}

impl OpenAiCompatClient {
    /// Create a new OpenAI-compatible client.
    pub fn new(
        name: impl Into<String>,
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        model: impl Into<String>,
    ) -> Result<Self, ModelError> {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(120))
            .build()
            .map_err(|e| ModelError::NotConfigured(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self {
            name: name.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            model: model.into(),
            temperature: None,
            max_tokens: None,
            client,
        })
    }

    /// Set the sampling temperature.
    pub fn with_temperature(mut self, temperature: Option<f32>) -> Self {
        self.temperature = temperature;
        self
    }

    /// Set the per-call generation limit.
    pub fn with_max_tokens(mut self, max_tokens: Option<u32>) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    /// Build the request body for a streaming chat completion.
    fn request_body(&self, request: &ModelRequest) -> serde_json::Value {
        let mut body = serde_json::json!({
            "model": self.model,
            "messages": to_api_messages(request),
            "stream": true,
            "stream_options": { "include_usage": true },
        });

        if let Some(temperature) = self.temperature {
            body["temperature"] = serde_json::json!(temperature);
        }

        if let Some(max_tokens) = self.max_tokens {
            body["max_tokens"] = serde_json::json!(max_tokens);
        }

        if !request.tools.is_empty() {
            body["tools"] = serde_json::json!(to_api_tools(&request.tools));
        }

        body
    }
}

#[async_trait]
impl ModelClient for OpenAiCompatClient {
    fn name(&self) -> &str {
        &self.name
    }

    async fn invoke(
        &self,
        request: ModelRequest,
        stream: &dyn StreamSink,
    ) -> Result<ModelResponse, ModelError> {
        let url = format!("{}/chat/completions", self.base_url);
        let body = self.request_body(&request);

        debug!(client = %self.name, model = %self.model, messages = request.messages.len(), "Sending streaming request");

        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .header("Accept", "text/event-stream")
            .json(&body)
            .send()
            .await
            .map_err(|e| ModelError::Network(e.to_string()))?;

        let status = response.status().as_u16();

        if status == 429 {
            return Err(ModelError::RateLimited {
                retry_after_secs: 5,
            });
        }

        if status == 401 || status == 403 {
            return Err(ModelError::AuthenticationFailed(
                "Invalid API key or insufficient permissions".into(),
            ));
        }

        if status != 200 {
            let error_body = response.text().await.unwrap_or_default();
            warn!(status, body = %error_body, "Model endpoint returned error");
            return Err(ModelError::ApiError {
                status_code: status,
                message: error_body,
            });
        }

        let mut byte_stream = response.bytes_stream();
        let mut lines = LineBuffer::default();
        let mut acc = SseAccumulator::default();

        'read: while let Some(chunk_result) = byte_stream.next().await {
            let bytes = chunk_result.map_err(|e| ModelError::StreamInterrupted(e.to_string()))?;
            lines.extend(&bytes);

            while let Some(line) = lines.next_line()? {
                match acc.push_line(&line) {
                    SseStep::Delta(chunk) => stream.on_chunk(chunk).await,
                    SseStep::Done => break 'read,
                    SseStep::Skip => {}
                }
            }
        }

        stream
            .on_chunk(StreamChunk {
                content: None,
                done: true,
            })
            .await;

        acc.finish()
    }
}

/// Splits a byte stream into lines. Bytes are only decoded once a full
/// line is buffered, so multi-byte characters may straddle chunks.
#[derive(Default)]
struct LineBuffer {
    bytes: Vec<u8>,
}

impl LineBuffer {
    fn extend(&mut self, chunk: &[u8]) {
        self.bytes.extend_from_slice(chunk);
    }

    /// Next complete line without its terminator, or `None` until more
    /// bytes arrive.
    fn next_line(&mut self) -> Result<Option<String>, ModelError> {
        let Some(end) = self.bytes.iter().position(|&b| b == b'\n') else {
            return Ok(None);
        };
        let mut line: Vec<u8> = self.bytes.drain(..=end).collect();
        line.pop();
        if line.last() == Some(&b'\r') {
            line.pop();
        }
        String::from_utf8(line)
            .map(Some)
            .map_err(|e| ModelError::InvalidResponse(format!("SSE line is not UTF-8: {e}")))
    }
}

/// What one SSE line contributed.
#[derive(Debug, PartialEq)]
enum SseStep {
    /// A content fragment to forward
    Delta(StreamChunk),
    /// `[DONE]` sentinel
    Done,
    /// Nothing to forward
    Skip,
}

/// Folds SSE `data:` lines into a complete response.
#[derive(Default)]
struct SseAccumulator {
    content: String,
    tool_calls: BTreeMap<u32, ToolCallAccumulator>,
    usage: Option<TokenUsage>,
}

impl SseAccumulator {
    fn push_line(&mut self, line: &str) -> SseStep {
        // Skip empty lines and SSE comments
        if line.is_empty() || line.starts_with(':') {
            return SseStep::Skip;
        }

        let Some(data) = line.strip_prefix("data:") else {
            return SseStep::Skip;
        };
        let data = data.trim();

        if data == "[DONE]" {
            return SseStep::Done;
        }

        let parsed: StreamResponse = match serde_json::from_str(data) {
            Ok(p) => p,
            Err(e) => {
                trace!(data = %data, error = %e, "Ignoring unparseable SSE chunk");
                return SseStep::Skip;
            }
        };

        if let Some(usage) = parsed.usage {
            self.usage = Some(TokenUsage::new(usage.prompt_tokens, usage.completion_tokens));
        }

        let Some(choice) = parsed.choices.into_iter().next() else {
            return SseStep::Skip;
        };

        for tc_delta in choice.delta.tool_calls.unwrap_or_default() {
            let acc = self.tool_calls.entry(tc_delta.index).or_default();
            if let Some(id) = tc_delta.id {
                acc.id = id;
            }
            if let Some(func) = tc_delta.function {
                if let Some(name) = func.name {
                    acc.name = name;
                }
                if let Some(args) = func.arguments {
                    acc.arguments.push_str(&args);
                }
            }
        }

        match choice.delta.content {
            Some(content) if !content.is_empty() => {
                self.content.push_str(&content);
                SseStep::Delta(StreamChunk::text(content))
            }
            _ => SseStep::Skip,
        }
    }

    fn finish(self) -> Result<ModelResponse, ModelError> {
        let tool_calls = self
            .tool_calls
            .into_values()
            .map(ToolCallAccumulator::into_tool_call)
            .collect::<Result<Vec<_>, _>>()?;

        let message = Message::assistant(self.content).with_tool_calls(tool_calls.clone());

        Ok(ModelResponse {
            message,
            tool_calls,
            usage: self.usage.unwrap_or_default(),
        })
    }
}

/// Convert a request to OpenAI API messages, instructions first.
fn to_api_messages(request: &ModelRequest) -> Vec<ApiMessage> {
    let instructions = [&request.instructions, &request.additional_instructions]
        .into_iter()
        .flatten()
        .map(|text| ApiMessage {
            role: "system".into(),
            content: Some(text.clone()),
            tool_calls: None,
            tool_call_id: None,
        });

    let conversation = request.messages.iter().map(|m| ApiMessage {
        role: match m.role {
            Role::User => "user".into(),
            Role::Assistant => "assistant".into(),
            Role::System => "system".into(),
            Role::Tool => "tool".into(),
        },
        content: Some(m.content.clone()),
        tool_calls: if m.tool_calls.is_empty() {
            None
        } else {
            Some(
                m.tool_calls
                    .iter()
                    .map(|tc| ApiToolCall {
                        id: tc.id.clone(),
                        r#type: "function".into(),
                        function: ApiFunction {
                            name: tc.name.clone(),
                            arguments: serde_json::Value::Object(tc.args.clone()).to_string(),
                        },
                    })
                    .collect(),
            )
        },
        tool_call_id: m.tool_call_id.clone(),
    });

    instructions.chain(conversation).collect()
}

/// Convert tool definitions to OpenAI API format.
fn to_api_tools(tools: &[ToolDefinition]) -> Vec<ApiToolDefinition> {
    tools
        .iter()
        .map(|t| ApiToolDefinition {
            r#type: "function".into(),
            function: ApiToolFunction {
                name: t.name.clone(),
                description: t.description.clone(),
                parameters: t.parameters.clone(),
            },
        })
        .collect()
}

// --- OpenAI API types (internal) ---

#[derive(Debug, Serialize, Deserialize)]
struct ApiMessage {
    role: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_calls: Option<Vec<ApiToolCall>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_call_id: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
struct ApiToolCall {
    id: String,
    r#type: String,
    function: ApiFunction,
}

#[derive(Debug, Serialize, Deserialize)]
struct ApiFunction {
    name: String,
    arguments: String,
}

#[derive(Debug, Serialize, Deserialize)]
struct ApiToolDefinition {
    r#type: String,
    function: ApiToolFunction,
}

#[derive(Debug, Serialize, Deserialize)]
struct ApiToolFunction {
    name: String,
    description: String,
    parameters: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct ApiUsage {
    prompt_tokens: u64,
    completion_tokens: u64,
}

// --- Streaming SSE types ---

/// A single SSE `data: {...}` chunk from a streaming response.
#[derive(Debug, Deserialize)]
struct StreamResponse {
    #[serde(default)]
    choices: Vec<StreamChoice>,
    #[serde(default)]
    usage: Option<ApiUsage>,
}

#[derive(Debug, Deserialize)]
struct StreamChoice {
    delta: StreamDelta,
}

#[derive(Debug, Deserialize)]
struct StreamDelta {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    tool_calls: Option<Vec<StreamToolCallDelta>>,
}

/// A tool call delta: arrives incrementally across chunks.
#[derive(Debug, Deserialize)]
struct StreamToolCallDelta {
    index: u32,
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    function: Option<StreamFunctionDelta>,
}

#[derive(Debug, Deserialize)]
struct StreamFunctionDelta {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    arguments: Option<String>,
}

/// Accumulates incremental tool call deltas into a complete tool call.
#[derive(Default)]
struct ToolCallAccumulator {
    id: String,
    name: String,
    arguments: String,
}

impl ToolCallAccumulator {
    fn into_tool_call(self) -> Result<ToolCall, ModelError> {
        let args = if self.arguments.trim().is_empty() {
            ToolArgs::new()
        } else {
            serde_json::from_str::<ToolArgs>(&self.arguments).map_err(|e| {
                ModelError::InvalidResponse(format!(
                    "tool call {} has non-object arguments: {e}",
                    self.id
                ))
            })?
        };
        Ok(ToolCall::new(self.id, self.name, args))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn constructor_trims_base_url() {
        let client = OpenAiCompatClient::new("ollama", "http://localhost:11434/v1/", "x", "llama3")
            .unwrap();
        assert_eq!(client.base_url, "http://localhost:11434/v1");
        assert_eq!(client.name(), "ollama");
    }

    #[test]
    fn instructions_lead_the_conversation() {
        let request = ModelRequest {
            messages: vec![Message::user("hi")],
            instructions: Some("Be brief.".into()),
            additional_instructions: Some("Use metric units.".into()),
            tools: vec![],
        };
        let api = to_api_messages(&request);
        assert_eq!(api.len(), 3);
        assert_eq!(api[0].role, "system");
        assert_eq!(api[0].content.as_deref(), Some("Be brief."));
        assert_eq!(api[1].content.as_deref(), Some("Use metric units."));
        assert_eq!(api[2].role, "user");
    }

    #[test]
    fn tool_call_args_serialize_as_string() {
        let mut args = ToolArgs::new();
        args.insert("expr".into(), serde_json::json!("2+2"));
        let msg = Message::assistant("").with_tool_calls(vec![ToolCall::new("t1", "calc", args)]);
        let request = ModelRequest {
            messages: vec![msg, Message::tool_result("t1", "4")],
            ..Default::default()
        };
        let api = to_api_messages(&request);
        let calls = api[0].tool_calls.as_ref().unwrap();
        assert_eq!(calls[0].function.arguments, r#"{"expr":"2+2"}"#);
        assert_eq!(api[1].tool_call_id.as_deref(), Some("t1"));
    }

    #[test]
    fn body_includes_tools_and_limits() {
        let client = OpenAiCompatClient::new("openai", "https://api.openai.com/v1", "k", "gpt")
            .unwrap()
            .with_temperature(Some(0.2))
            .with_max_tokens(Some(64));
        let request = ModelRequest {
            messages: vec![Message::user("hi")],
            tools: vec![ToolDefinition {
                name: "calc".into(),
                description: "math".into(),
                parameters: serde_json::json!({"type": "object"}),
            }],
            ..Default::default()
        };
        let body = client.request_body(&request);
        assert_eq!(body["stream"], true);
        assert_eq!(body["max_tokens"], 64);
        assert_eq!(body["tools"][0]["function"]["name"], "calc");
    }

    #[test]
    fn sse_content_deltas_accumulate() {
        let mut acc = SseAccumulator::default();
        assert_eq!(
            acc.push_line(r#"data: {"choices":[{"delta":{"content":"Hel"}}]}"#),
            SseStep::Delta(StreamChunk::text("Hel"))
        );
        assert_eq!(
            acc.push_line(r#"data: {"choices":[{"delta":{"content":"lo"}}]}"#),
            SseStep::Delta(StreamChunk::text("lo"))
        );
        assert_eq!(acc.push_line(": keep-alive"), SseStep::Skip);
        assert_eq!(
            acc.push_line(r#"data: {"choices":[],"usage":{"prompt_tokens":10,"completion_tokens":2,"total_tokens":12}}"#),
            SseStep::Skip
        );
        assert_eq!(acc.push_line("data: [DONE]"), SseStep::Done);

        let response = acc.finish().unwrap();
        assert_eq!(response.message.content, "Hello");
        assert!(response.tool_calls.is_empty());
        assert_eq!(response.usage, TokenUsage::new(10, 2));
    }

    #[test]
    fn sse_tool_calls_assemble_in_index_order() {
        let mut acc = SseAccumulator::default();
        acc.push_line(r#"data: {"choices":[{"delta":{"tool_calls":[{"index":1,"id":"b","function":{"name":"clock","arguments":""}}]}}]}"#);
        acc.push_line(r#"data: {"choices":[{"delta":{"tool_calls":[{"index":0,"id":"a","function":{"name":"calc","arguments":"{\"expr\":"}}]}}]}"#);
        acc.push_line(r#"data: {"choices":[{"delta":{"tool_calls":[{"index":0,"function":{"arguments":"\"2+2\"}"}}]}}]}"#);

        let response = acc.finish().unwrap();
        assert_eq!(response.tool_calls.len(), 2);
        assert_eq!(response.tool_calls[0].id, "a");
        assert_eq!(response.tool_calls[0].args["expr"], "2+2");
        assert_eq!(response.tool_calls[1].name, "clock");
        assert!(response.tool_calls[1].args.is_empty());
        assert_eq!(response.message.tool_calls, response.tool_calls);
    }

    #[test]
    fn sse_rejects_non_object_arguments() {
        let mut acc = SseAccumulator::default();
        acc.push_line(r#"data: {"choices":[{"delta":{"tool_calls":[{"index":0,"id":"a","function":{"name":"calc","arguments":"[1,2]"}}]}}]}"#);
        assert!(matches!(acc.finish(), Err(ModelError::InvalidResponse(_))));
    }

    #[test]
    fn line_buffer_joins_characters_split_across_chunks() {
        let mut lines = LineBuffer::default();
        lines.extend(b"data: {\"choices\":[{\"delta\":{\"content\":\"h\xC3");
        assert_eq!(lines.next_line().unwrap(), None);
        lines.extend(b"\xA9llo\"}}]}\r\ndata: [DONE]\n");

        let mut acc = SseAccumulator::default();
        let first = lines.next_line().unwrap().unwrap();
        assert_eq!(
            acc.push_line(&first),
            SseStep::Delta(StreamChunk::text("h\u{e9}llo"))
        );
        let second = lines.next_line().unwrap().unwrap();
        assert_eq!(acc.push_line(&second), SseStep::Done);
        assert_eq!(lines.next_line().unwrap(), None);
        assert_eq!(acc.finish().unwrap().message.content, "h\u{e9}llo");
    }

    #[test]
    fn line_buffer_rejects_invalid_utf8() {
        let mut lines = LineBuffer::default();
        lines.extend(b"data: \xFF\xFE\n");
        assert!(matches!(
            lines.next_line(),
            Err(ModelError::InvalidResponse(_))
        ));
    }

    #[test]
    fn sse_ignores_garbage() {
        let mut acc = SseAccumulator::default();
        assert_eq!(acc.push_line("data: {not json"), SseStep::Skip);
        assert_eq!(acc.push_line("event: ping"), SseStep::Skip);
        assert_eq!(acc.finish().unwrap().message.content, "");
    }
}
