//! Execution state: the record a run threads through its nodes.
//!
//! Nodes never mutate state directly. Each returns a [`StateUpdate`] that the
//! engine merges with [`ExecutionState::apply`]; messages and content
//! fragments are appended, usage is accumulated, and the tool-call and
//! tool-result markers are set or cleared explicitly.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use turngraph_core::message::Message;
use turngraph_core::model::TokenUsage;
use turngraph_core::tool::{ToolCall, ToolResult};

/// Which stage of the loop the state currently reflects.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    /// Waiting on (or just answered by) the model
    #[default]
    Model,
    /// Tool calls are pending
    Tools,
    /// The turn is complete
    Done,
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Model => "model",
            Self::Tools => "tools",
            Self::Done => "done",
        })
    }
}

/// One streaming-content fragment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContentPart {
    /// Fragment kind, e.g. "text"
    pub kind: String,

    /// The fragment itself
    pub data: serde_json::Value,
}

impl ContentPart {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            kind: "text".into(),
            data: serde_json::Value::String(text.into()),
        }
    }
}

/// The full state of one run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExecutionState {
    /// Conversation so far, append-only within a run
    pub messages: Vec<Message>,

    /// Calls requested by the last model step, awaiting dispatch
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<ToolCall>>,

    /// Outcomes of the last tools step, awaiting the model
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_results: Option<Vec<ToolResult>>,

    pub phase: Phase,

    /// Number of counted node executions
    pub recursion_count: u32,

    /// Running token totals
    pub usage: TokenUsage,

    /// Streaming fragments, carried between runs when `keep_content` is set
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub content_data: Vec<ContentPart>,

    /// Open-ended values the engine carries forward but never reads
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub metadata: BTreeMap<String, serde_json::Value>,
}

impl ExecutionState {
    /// Seed a run from a message list.
    pub fn new(messages: Vec<Message>) -> Self {
        Self {
            messages,
            ..Default::default()
        }
    }

    /// Start with previously buffered streaming content.
    pub fn with_content_data(mut self, content_data: Vec<ContentPart>) -> Self {
        self.content_data = content_data;
        self
    }

    pub fn has_tool_calls(&self) -> bool {
        self.tool_calls.as_ref().is_some_and(|c| !c.is_empty())
    }

    pub fn has_tool_results(&self) -> bool {
        self.tool_results.as_ref().is_some_and(|r| !r.is_empty())
    }

    /// Merge a node's update into this state.
    pub fn apply(&mut self, update: StateUpdate) {
        self.messages.extend(update.messages);
        update.tool_calls.apply_to(&mut self.tool_calls);
        update.tool_results.apply_to(&mut self.tool_results);
        if let Some(phase) = update.phase {
            self.phase = phase;
        }
        if let Some(usage) = update.usage {
            self.usage.add(&usage);
        }
        self.content_data.extend(update.content_data);
        self.metadata.extend(update.metadata);
    }
}

/// How an update treats an optional marker field.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum Patch<T> {
    /// Leave the field as it is
    #[default]
    Keep,
    /// Replace the field
    Set(T),
    /// Reset the field to `None`
    Clear,
}

impl<T> Patch<T> {
    fn apply_to(self, slot: &mut Option<T>) {
        match self {
            Self::Keep => {}
            Self::Set(value) => *slot = Some(value),
            Self::Clear => *slot = None,
        }
    }
}

/// The partial state a node returns.
#[derive(Debug, Clone, Default)]
pub struct StateUpdate {
    /// Messages to append
    pub messages: Vec<Message>,
    pub tool_calls: Patch<Vec<ToolCall>>,
    pub tool_results: Patch<Vec<ToolResult>>,
    pub phase: Option<Phase>,
    /// Usage to add to the running totals
    pub usage: Option<TokenUsage>,
    /// Content fragments to append
    pub content_data: Vec<ContentPart>,
    /// Entries to insert into the metadata map
    pub metadata: BTreeMap<String, serde_json::Value>,
}

impl StateUpdate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_message(mut self, message: Message) -> Self {
        self.messages.push(message);
        self
    }

    pub fn with_messages(mut self, messages: impl IntoIterator<Item = Message>) -> Self {
        self.messages.extend(messages);
        self
    }

    pub fn with_phase(mut self, phase: Phase) -> Self {
        self.phase = Some(phase);
        self
    }

    pub fn with_tool_calls(mut self, tool_calls: Patch<Vec<ToolCall>>) -> Self {
        self.tool_calls = tool_calls;
        self
    }

    pub fn with_tool_results(mut self, tool_results: Patch<Vec<ToolResult>>) -> Self {
        self.tool_results = tool_results;
        self
    }

    pub fn with_usage(mut self, usage: TokenUsage) -> Self {
        self.usage = Some(usage);
        self
    }

    pub fn with_content(mut self, parts: Vec<ContentPart>) -> Self {
        self.content_data.extend(parts);
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }
}
