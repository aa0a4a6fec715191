//! Execution context: everything a node may read during a run.
//!
//! Built once per run and shared by reference with every node. The model
//! client and tool registry are owned for the run's lifetime and never
//! mutated; only the per-run options and the cancellation token are supplied
//! by the caller at construction.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use turngraph_config::AppConfig;
use turngraph_core::error::Error;
use turngraph_core::event::{EventData, GraphEvent};
use turngraph_core::message::Message;
use turngraph_core::model::{ModelClient, ModelConfig};
use turngraph_core::tool::{InvocationContext, ToolRegistry};

use crate::events::EventRegistry;
use crate::state::ExecutionState;

/// Computes the token cost of one message.
pub type TokenCounter = Arc<dyn Fn(&Message) -> usize + Send + Sync>;

/// Called with the error, the failing node's name and the state at failure.
pub type ErrorCallback = Arc<dyn Fn(&Error, &str, &ExecutionState) + Send + Sync>;

/// Called with the run configuration, the error and the failing call id.
pub type ToolErrorCallback = Arc<dyn Fn(&RunConfig, &Error, &str) + Send + Sync>;

/// Serializable configuration for one run.
///
/// Everything here may cross an isolation boundary, so it holds no secrets
/// and no live handles.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunConfig {
    /// Correlates events, logs and isolation envelopes
    pub run_id: String,

    /// Which model client to build on the far side of a boundary
    #[serde(default)]
    pub model: ModelConfig,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instructions: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub additional_instructions: Option<String>,

    /// Whether `process_stream` returns the final message list
    #[serde(default = "default_true")]
    pub return_content: bool,

    /// Ceiling on counted node executions
    #[serde(default = "default_recursion_limit")]
    pub recursion_limit: u32,
}

fn default_true() -> bool {
    true
}
fn default_recursion_limit() -> u32 {
    10
}

impl RunConfig {
    /// A run configuration with a fresh run id and default limits.
    pub fn new(model: ModelConfig) -> Self {
        Self {
            run_id: uuid::Uuid::new_v4().to_string(),
            model,
            instructions: None,
            additional_instructions: None,
            return_content: true,
            recursion_limit: default_recursion_limit(),
        }
    }

    /// Derive a run configuration from application settings.
    pub fn from_app_config(config: &AppConfig) -> Self {
        Self {
            instructions: config.instructions.clone(),
            additional_instructions: config.additional_instructions.clone(),
            return_content: config.agent.return_content,
            recursion_limit: config.agent.recursion_limit,
            ..Self::new(config.model.clone())
        }
    }

    pub fn with_run_id(mut self, run_id: impl Into<String>) -> Self {
        self.run_id = run_id.into();
        self
    }

    pub fn with_instructions(mut self, instructions: impl Into<String>) -> Self {
        self.instructions = Some(instructions.into());
        self
    }

    pub fn with_additional_instructions(mut self, instructions: impl Into<String>) -> Self {
        self.additional_instructions = Some(instructions.into());
        self
    }

    pub fn with_recursion_limit(mut self, limit: u32) -> Self {
        self.recursion_limit = limit;
        self
    }

    pub fn with_return_content(mut self, return_content: bool) -> Self {
        self.return_content = return_content;
        self
    }
}

impl Default for RunConfig {
    fn default() -> Self {
        Self::new(ModelConfig::default())
    }
}

/// Per-call execution settings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExecutionConfig {
    /// Human-readable label for logs and event metadata
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub run_name: Option<String>,

    /// Values forwarded to every tool invocation context
    #[serde(default, skip_serializing_if = "serde_json::Map::is_empty")]
    pub configurable: serde_json::Map<String, serde_json::Value>,

    /// Overrides [`RunConfig::recursion_limit`] for this call
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recursion_limit: Option<u32>,
}

impl ExecutionConfig {
    pub fn with_run_name(mut self, name: impl Into<String>) -> Self {
        self.run_name = Some(name.into());
        self
    }

    pub fn with_configurable(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.configurable.insert(key.into(), value);
        self
    }

    pub fn with_recursion_limit(mut self, limit: u32) -> Self {
        self.recursion_limit = Some(limit);
        self
    }
}

/// Synchronous notification hooks. The engine never retries after them.
#[derive(Clone, Default)]
pub struct Callbacks {
    pub error: Option<ErrorCallback>,
    pub tool_error: Option<ToolErrorCallback>,
}

/// Caller options for one run.
#[derive(Clone, Default)]
pub struct RunOptions {
    /// Seed the run with the previous run's streaming content
    pub keep_content: bool,

    /// Message cost function for pruning
    pub token_counter: Option<TokenCounter>,

    /// Pruning budget; no pruning when unset
    pub max_context_tokens: Option<usize>,

    /// Precomputed costs by message index, preferred over the counter
    pub index_token_count_map: HashMap<usize, usize>,

    pub callbacks: Callbacks,
}

impl RunOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed options from the `[agent]` settings.
    pub fn from_app_config(config: &AppConfig) -> Self {
        Self {
            keep_content: config.agent.keep_content,
            max_context_tokens: config.agent.max_context_tokens,
            ..Self::default()
        }
    }

    pub fn with_keep_content(mut self, keep: bool) -> Self {
        self.keep_content = keep;
        self
    }

    pub fn with_token_counter(mut self, counter: TokenCounter) -> Self {
        self.token_counter = Some(counter);
        self
    }

    pub fn with_max_context_tokens(mut self, max: usize) -> Self {
        self.max_context_tokens = Some(max);
        self
    }

    pub fn with_index_token_counts(mut self, counts: HashMap<usize, usize>) -> Self {
        self.index_token_count_map = counts;
        self
    }

    pub fn on_error(mut self, callback: ErrorCallback) -> Self {
        self.callbacks.error = Some(callback);
        self
    }

    pub fn on_tool_error(mut self, callback: ToolErrorCallback) -> Self {
        self.callbacks.tool_error = Some(callback);
        self
    }
}

impl std::fmt::Debug for RunOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RunOptions")
            .field("keep_content", &self.keep_content)
            .field("token_counter", &self.token_counter.is_some())
            .field("max_context_tokens", &self.max_context_tokens)
            .field("index_token_count_map", &self.index_token_count_map.len())
            .field("error_callback", &self.callbacks.error.is_some())
            .field("tool_error_callback", &self.callbacks.tool_error.is_some())
            .finish()
    }
}

/// The bundle threaded through every node invocation.
pub struct ExecutionContext {
    pub model: Arc<dyn ModelClient>,
    pub tools: Arc<ToolRegistry>,
    pub events: Arc<EventRegistry>,
    pub config: RunConfig,
    pub exec: ExecutionConfig,
    pub options: RunOptions,
    pub cancel: CancellationToken,
}

impl ExecutionContext {
    pub fn new(
        model: Arc<dyn ModelClient>,
        tools: Arc<ToolRegistry>,
        events: Arc<EventRegistry>,
        config: RunConfig,
    ) -> Self {
        Self {
            model,
            tools,
            events,
            config,
            exec: ExecutionConfig::default(),
            options: RunOptions::default(),
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_exec(mut self, exec: ExecutionConfig) -> Self {
        self.exec = exec;
        self
    }

    pub fn with_options(mut self, options: RunOptions) -> Self {
        self.options = options;
        self
    }

    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// The context handed to tools that accept one.
    pub fn invocation_context(&self) -> InvocationContext {
        InvocationContext {
            run_id: self.config.run_id.clone(),
            configurable: self.exec.configurable.clone(),
            cancel: self.cancel.clone(),
        }
    }

    /// Publish a lifecycle event tagged with this run's identity.
    pub async fn emit(&self, event: GraphEvent, data: EventData) {
        if !self.events.has(event) {
            return;
        }
        let mut metadata = serde_json::json!({ "run_id": self.config.run_id });
        if let Some(name) = &self.exec.run_name {
            metadata["run_name"] = serde_json::json!(name);
        }
        self.events.emit(event, &data, Some(&metadata)).await;
    }

    pub(crate) fn report_error(&self, error: &Error, node: &str, state: &ExecutionState) {
        if let Some(callback) = &self.options.callbacks.error {
            callback(error, node, state);
        }
    }

    pub(crate) fn report_tool_error(&self, error: &Error, tool_call_id: &str) {
        if let Some(callback) = &self.options.callbacks.tool_error {
            callback(&self.config, error, tool_call_id);
        }
    }
}

impl std::fmt::Debug for ExecutionContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecutionContext")
            .field("model", &self.model.name())
            .field("tools", &self.tools.len())
            .field("events", &self.events)
            .field("config", &self.config)
            .field("exec", &self.exec)
            .field("options", &self.options)
            .field("cancelled", &self.cancel.is_cancelled())
            .finish()
    }
}
