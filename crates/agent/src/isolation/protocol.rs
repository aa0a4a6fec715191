//! Wire protocol for isolated runs.
//!
//! Every exchange is one [`ProcessMessage`] per line of JSON. The caller
//! sends a `command` carrying an [`IsolatedRequest`]; the worker answers
//! with `result` (the final [`ExecutionState`]) or `error` (a message).

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use turngraph_core::error::{BoundaryKind, IsolationError, Result};
use turngraph_core::message::Message;

use crate::context::{ExecutionConfig, RunConfig, RunOptions, TokenCounter};
use crate::state::{ContentPart, ExecutionState};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageType {
    State,
    Command,
    Result,
    Error,
}

/// The only unit that crosses an isolation boundary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessMessage {
    #[serde(rename = "type")]
    pub kind: MessageType,
    pub run_id: String,
    #[serde(default)]
    pub data: serde_json::Value,
}

impl ProcessMessage {
    pub fn new(kind: MessageType, run_id: impl Into<String>, data: serde_json::Value) -> Self {
        Self {
            kind,
            run_id: run_id.into(),
            data,
        }
    }

    pub fn command(request: &IsolatedRequest) -> Result<Self> {
        Ok(Self::new(
            MessageType::Command,
            &request.config.run_id,
            serde_json::to_value(request)?,
        ))
    }

    pub fn result(run_id: impl Into<String>, state: &ExecutionState) -> Result<Self> {
        Ok(Self::new(
            MessageType::Result,
            run_id,
            serde_json::to_value(state)?,
        ))
    }

    pub fn error(run_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(
            MessageType::Error,
            run_id,
            serde_json::json!({ "message": message.into() }),
        )
    }

    /// One line of JSON, without the trailing newline.
    pub fn encode(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn decode(line: &str, boundary: BoundaryKind) -> Result<Self> {
        serde_json::from_str(line).map_err(|e| {
            IsolationError::Channel {
                boundary,
                message: format!("malformed envelope: {e}"),
            }
            .into()
        })
    }

    /// Interpret a reply: `result` yields the final state, `error` a failed
    /// run, anything else is a protocol violation.
    pub fn into_outcome(self, boundary: BoundaryKind) -> Result<ExecutionState> {
        match self.kind {
            MessageType::Result => serde_json::from_value(self.data).map_err(|e| {
                IsolationError::Channel {
                    boundary,
                    message: format!("undecodable result: {e}"),
                }
                .into()
            }),
            MessageType::Error => Err(IsolationError::RunFailed {
                boundary,
                message: self
                    .data
                    .get("message")
                    .and_then(|m| m.as_str())
                    .unwrap_or("unknown error")
                    .to_string(),
            }
            .into()),
            other => Err(IsolationError::Channel {
                boundary,
                message: format!("unexpected {other:?} envelope in reply"),
            }
            .into()),
        }
    }
}

/// Options that survive serialization. Callbacks and the token counter do
/// not cross; the far side supplies its own counter.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PortableOptions {
    #[serde(default)]
    pub keep_content: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_context_tokens: Option<usize>,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub index_token_count_map: HashMap<usize, usize>,
}

impl PortableOptions {
    pub fn into_run_options(self, token_counter: Option<TokenCounter>) -> RunOptions {
        RunOptions {
            keep_content: self.keep_content,
            token_counter,
            max_context_tokens: self.max_context_tokens,
            index_token_count_map: self.index_token_count_map,
            ..RunOptions::default()
        }
    }
}

impl From<&RunOptions> for PortableOptions {
    fn from(options: &RunOptions) -> Self {
        Self {
            keep_content: options.keep_content,
            max_context_tokens: options.max_context_tokens,
            index_token_count_map: options.index_token_count_map.clone(),
        }
    }
}

/// Everything an isolated run needs, by value.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IsolatedRequest {
    pub config: RunConfig,
    #[serde(default)]
    pub exec: ExecutionConfig,
    #[serde(default)]
    pub options: PortableOptions,
    pub inputs: Vec<Message>,
    /// Streaming content to carry in when `options.keep_content` is set
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub content_data: Vec<ContentPart>,
}

impl IsolatedRequest {
    pub fn new(config: RunConfig, inputs: Vec<Message>) -> Self {
        Self {
            config,
            exec: ExecutionConfig::default(),
            options: PortableOptions::default(),
            inputs,
            content_data: Vec::new(),
        }
    }

    pub fn with_exec(mut self, exec: ExecutionConfig) -> Self {
        self.exec = exec;
        self
    }

    pub fn with_options(mut self, options: PortableOptions) -> Self {
        self.options = options;
        self
    }

    pub fn with_content_data(mut self, content_data: Vec<ContentPart>) -> Self {
        self.content_data = content_data;
        self
    }
}
