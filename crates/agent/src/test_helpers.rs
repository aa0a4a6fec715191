//! Shared test doubles: a scripted model, recording tools and handlers.

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use turngraph_core::error::{ModelError, ToolError};
use turngraph_core::event::{EventData, EventHandler, HandlerError};
use turngraph_core::message::Message;
use turngraph_core::model::{
    ModelClient, ModelRequest, ModelResponse, StreamChunk, StreamSink, TokenUsage,
};
use turngraph_core::tool::{InvocationContext, Tool, ToolArgs, ToolCall, ToolRegistry};

use crate::context::{ExecutionContext, RunConfig};
use crate::events::EventRegistry;

/// A model that replays scripted outcomes in order.
///
/// Each reply's content is streamed as a single chunk before returning.
/// Running out of script is reported as an invalid response.
pub struct ScriptedModel {
    script: Mutex<VecDeque<Result<ModelResponse, ModelError>>>,
    requests: Mutex<Vec<ModelRequest>>,
}

impl ScriptedModel {
    pub fn new(responses: Vec<ModelResponse>) -> Self {
        Self::with_outcomes(responses.into_iter().map(Ok).collect())
    }

    pub fn with_outcomes(outcomes: Vec<Result<ModelResponse, ModelError>>) -> Self {
        Self {
            script: Mutex::new(outcomes.into()),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn failing(error: ModelError) -> Self {
        Self::with_outcomes(vec![Err(error)])
    }

    pub fn requests(&self) -> Vec<ModelRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn calls(&self) -> usize {
        self.requests.lock().unwrap().len()
    }
}

#[async_trait]
impl ModelClient for ScriptedModel {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn invoke(
        &self,
        request: ModelRequest,
        stream: &dyn StreamSink,
    ) -> Result<ModelResponse, ModelError> {
        self.requests.lock().unwrap().push(request);
        let next = self.script.lock().unwrap().pop_front();
        let response = next.unwrap_or_else(|| {
            Err(ModelError::InvalidResponse("script exhausted".into()))
        })?;
        if !response.message.content.is_empty() {
            stream
                .on_chunk(StreamChunk::text(response.message.content.clone()))
                .await;
        }
        Ok(response)
    }
}

pub fn text_response(text: &str, prompt: u64, completion: u64) -> ModelResponse {
    ModelResponse {
        message: Message::assistant(text),
        tool_calls: vec![],
        usage: TokenUsage::new(prompt, completion),
    }
}

pub fn tool_response(calls: Vec<ToolCall>) -> ModelResponse {
    ModelResponse {
        message: Message::assistant("").with_tool_calls(calls.clone()),
        tool_calls: calls,
        usage: TokenUsage::new(10, 5),
    }
}

pub fn tool_call(id: &str, name: &str, args: serde_json::Value) -> ToolCall {
    let args = match args {
        serde_json::Value::Object(map) => map,
        _ => ToolArgs::new(),
    };
    ToolCall::new(id, name, args)
}

/// One observed tool invocation.
#[derive(Debug, Clone)]
pub struct CallRecord {
    pub tool: String,
    pub args: ToolArgs,
    pub context: Option<InvocationContext>,
}

/// Invocation log shareable between several tools.
#[derive(Debug, Clone, Default)]
pub struct CallLog(Arc<Mutex<Vec<CallRecord>>>);

impl CallLog {
    pub fn records(&self) -> Vec<CallRecord> {
        self.0.lock().unwrap().clone()
    }

    pub fn tools(&self) -> Vec<String> {
        self.records().into_iter().map(|r| r.tool).collect()
    }
}

/// A tool that records each invocation and replies with a fixed value.
pub struct RecordingTool {
    name: String,
    reply: Option<serde_json::Value>,
    accepts_context: bool,
    log: CallLog,
}

impl RecordingTool {
    pub fn new(name: &str, reply: serde_json::Value) -> Self {
        Self {
            name: name.into(),
            reply: Some(reply),
            accepts_context: true,
            log: CallLog::default(),
        }
    }

    /// A tool whose every invocation fails.
    pub fn failing(name: &str) -> Self {
        Self {
            reply: None,
            ..Self::new(name, serde_json::Value::Null)
        }
    }

    pub fn without_context(mut self) -> Self {
        self.accepts_context = false;
        self
    }

    pub fn with_log(mut self, log: CallLog) -> Self {
        self.log = log;
        self
    }
}

#[async_trait]
impl Tool for RecordingTool {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        "records invocations"
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({"type": "object"})
    }

    fn accepts_context(&self) -> bool {
        self.accepts_context
    }

    async fn invoke(
        &self,
        args: &ToolArgs,
        context: Option<&InvocationContext>,
    ) -> Result<serde_json::Value, ToolError> {
        self.log.0.lock().unwrap().push(CallRecord {
            tool: self.name.clone(),
            args: args.clone(),
            context: context.cloned(),
        });
        self.reply.clone().ok_or_else(|| ToolError::ExecutionFailed {
            tool_name: self.name.clone(),
            reason: "scripted failure".into(),
        })
    }
}

/// Records every event it handles.
#[derive(Default)]
pub struct RecordingHandler {
    seen: Mutex<Vec<(String, EventData, Option<serde_json::Value>)>>,
}

impl RecordingHandler {
    pub fn events(&self) -> Vec<(String, EventData)> {
        self.seen
            .lock()
            .unwrap()
            .iter()
            .map(|(name, data, _)| (name.clone(), data.clone()))
            .collect()
    }

    pub fn metadata(&self) -> Vec<Option<serde_json::Value>> {
        self.seen
            .lock()
            .unwrap()
            .iter()
            .map(|(_, _, metadata)| metadata.clone())
            .collect()
    }
}

#[async_trait]
impl EventHandler for RecordingHandler {
    async fn handle(
        &self,
        event: &str,
        data: &EventData,
        metadata: Option<&serde_json::Value>,
    ) -> Result<(), HandlerError> {
        self.seen
            .lock()
            .unwrap()
            .push((event.to_string(), data.clone(), metadata.cloned()));
        Ok(())
    }
}

/// Always returns an error.
pub struct FailingHandler;

#[async_trait]
impl EventHandler for FailingHandler {
    async fn handle(
        &self,
        _event: &str,
        _data: &EventData,
        _metadata: Option<&serde_json::Value>,
    ) -> Result<(), HandlerError> {
        Err("observer exploded".into())
    }
}

/// Panics on every event.
pub struct PanickingHandler;

#[async_trait]
impl EventHandler for PanickingHandler {
    async fn handle(
        &self,
        _event: &str,
        _data: &EventData,
        _metadata: Option<&serde_json::Value>,
    ) -> Result<(), HandlerError> {
        panic!("observer panicked")
    }
}

/// A context over `model` and `tools` with an empty event registry.
pub fn context(model: Arc<ScriptedModel>, tools: ToolRegistry) -> ExecutionContext {
    ExecutionContext::new(
        model,
        Arc::new(tools),
        Arc::new(EventRegistry::new()),
        RunConfig::default(),
    )
}
