//! Lifecycle events published by graph nodes.
//!
//! Nodes emit a fixed set of named events; observers attach an
//! [`EventHandler`] per name. [`EventBus`] is a handler that fans events out
//! to any number of broadcast subscribers.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::broadcast;

use crate::message::Message;
use crate::model::{StreamChunk, TokenUsage};
use crate::tool::ToolCall;

/// The event names nodes publish.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum GraphEvent {
    #[serde(rename = "on_chat_model_start")]
    ModelStart,
    #[serde(rename = "on_chat_model_stream")]
    ModelStream,
    #[serde(rename = "on_chat_model_end")]
    ModelEnd,
    #[serde(rename = "on_tool_start")]
    ToolStart,
    #[serde(rename = "on_tool_end")]
    ToolEnd,
}

impl GraphEvent {
    pub const ALL: [GraphEvent; 5] = [
        Self::ModelStart,
        Self::ModelStream,
        Self::ModelEnd,
        Self::ToolStart,
        Self::ToolEnd,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ModelStart => "on_chat_model_start",
            Self::ModelStream => "on_chat_model_stream",
            Self::ModelEnd => "on_chat_model_end",
            Self::ToolStart => "on_tool_start",
            Self::ToolEnd => "on_tool_end",
        }
    }

    pub fn parse(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|e| e.as_str() == name)
    }
}

impl AsRef<str> for GraphEvent {
    fn as_ref(&self) -> &str {
        self.as_str()
    }
}

impl std::fmt::Display for GraphEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Payload carried by each event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EventData {
    /// Outbound messages, before pruning.
    ModelStart { messages: Vec<Message> },

    /// One streaming fragment.
    ModelStream { delta: StreamChunk },

    /// Either final run usage (from the done node) or the model failure.
    ModelEnd {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        usage: Option<TokenUsage>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },

    ToolStart { tool_call: ToolCall },

    ToolEnd {
        tool_call: ToolCall,
        result: serde_json::Value,
    },
}

/// Error type handlers may return. It is logged by the emitter and dropped.
pub type HandlerError = Box<dyn std::error::Error + Send + Sync>;

/// Observer for one event name.
#[async_trait]
pub trait EventHandler: Send + Sync {
    async fn handle(
        &self,
        event: &str,
        data: &EventData,
        metadata: Option<&serde_json::Value>,
    ) -> std::result::Result<(), HandlerError>;
}

/// An event as delivered to [`EventBus`] subscribers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunEvent {
    pub event: String,
    pub data: EventData,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Value>,
    pub timestamp: DateTime<Utc>,
}

/// A broadcast-based fan-out for run events.
///
/// Uses `tokio::sync::broadcast` for multi-consumer pub/sub. Register one
/// bus under several event names to give many observers the same feed.
pub struct EventBus {
    sender: broadcast::Sender<Arc<RunEvent>>,
}

impl EventBus {
    /// Create a new event bus with the given capacity.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publish an event to all subscribers.
    pub fn publish(&self, event: RunEvent) {
        // No subscribers is fine.
        let _ = self.sender.send(Arc::new(event));
    }

    /// Subscribe to receive events.
    pub fn subscribe(&self) -> broadcast::Receiver<Arc<RunEvent>> {
        self.sender.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}

#[async_trait]
impl EventHandler for EventBus {
    async fn handle(
        &self,
        event: &str,
        data: &EventData,
        metadata: Option<&serde_json::Value>,
    ) -> std::result::Result<(), HandlerError> {
        self.publish(RunEvent {
            event: event.to_string(),
            data: data.clone(),
            metadata: metadata.cloned(),
            timestamp: Utc::now(),
        });
        Ok(())
    }
}
