//! Isolated execution: run a turn on a worker thread or in a child process.
//!
//! The caller and the worker share nothing but [`ProcessMessage`] lines:
//! a `command` goes in, one `result` or `error` comes back. Live objects
//! (model client, tools, handlers, token counter) never cross; the worker
//! rebuilds them from the run configuration through a [`RunFactory`].
//!
//! Cancellation tokens and callbacks stay on the caller's side.

mod process;
mod protocol;
mod thread;

pub use process::{ProcessBoundary, serve_stdio};
pub use protocol::{IsolatedRequest, MessageType, PortableOptions, ProcessMessage};
pub use thread::ThreadBoundary;

use async_trait::async_trait;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info, warn};
use turngraph_config::{IsolationSettings, WorkerType};
use turngraph_core::error::{BoundaryKind, IsolationError, Result};
use turngraph_core::event::EventHandler;
use turngraph_core::model::ModelClient;
use turngraph_core::tool::ToolRegistry;

use crate::context::{RunConfig, TokenCounter};
use crate::runtime::AgentRuntime;
use crate::state::ExecutionState;

// --- Worker side ---

/// The live collaborators of one run.
pub struct RunParts {
    pub model: Arc<dyn ModelClient>,
    pub tools: Arc<ToolRegistry>,
    pub handlers: Vec<(String, Arc<dyn EventHandler>)>,
    pub token_counter: Option<TokenCounter>,
}

impl RunParts {
    pub fn new(model: Arc<dyn ModelClient>, tools: Arc<ToolRegistry>) -> Self {
        Self {
            model,
            tools,
            handlers: Vec::new(),
            token_counter: None,
        }
    }

    pub fn with_handler(mut self, event: impl Into<String>, handler: Arc<dyn EventHandler>) -> Self {
        self.handlers.push((event.into(), handler));
        self
    }

    pub fn with_token_counter(mut self, counter: TokenCounter) -> Self {
        self.token_counter = Some(counter);
        self
    }
}

/// Rebuilds a run's collaborators wherever the run executes.
pub trait RunFactory: Send + Sync + 'static {
    fn build(&self, config: &RunConfig) -> Result<RunParts>;
}

/// Execute a request in the current task.
pub async fn run_request(factory: &dyn RunFactory, request: IsolatedRequest) -> Result<ExecutionState> {
    let parts = factory.build(&request.config)?;
    let keep_content = request.options.keep_content;

    let mut runtime =
        AgentRuntime::create(request.config, parts.model, parts.tools, parts.handlers);
    if keep_content {
        runtime.sync_state(
            ExecutionState::default().with_content_data(request.content_data),
            0,
        );
    }

    runtime
        .run(
            request.inputs,
            request.exec,
            request.options.into_run_options(parts.token_counter),
        )
        .await
}

/// Answer one encoded envelope. Always yields a reply: malformed input and
/// failed runs come back as `error` envelopes.
pub async fn handle_envelope(factory: &dyn RunFactory, line: &str) -> ProcessMessage {
    let message: ProcessMessage = match serde_json::from_str(line) {
        Ok(message) => message,
        Err(e) => return ProcessMessage::error("", format!("malformed envelope: {e}")),
    };

    if message.kind != MessageType::Command {
        return ProcessMessage::error(
            message.run_id,
            format!("expected a command envelope, got {:?}", message.kind),
        );
    }

    let run_id = message.run_id;
    let request: IsolatedRequest = match serde_json::from_value(message.data) {
        Ok(request) => request,
        Err(e) => return ProcessMessage::error(run_id, format!("malformed command: {e}")),
    };

    debug!(run_id = %run_id, inputs = request.inputs.len(), "Worker received command");

    match run_request(factory, request).await {
        Ok(state) => ProcessMessage::result(&run_id, &state)
            .unwrap_or_else(|e| ProcessMessage::error(&run_id, e.to_string())),
        Err(e) => {
            warn!(run_id = %run_id, error = %e, "Isolated run failed");
            ProcessMessage::error(run_id, e.to_string())
        }
    }
}

// --- Caller side ---

/// One end of a message channel to a worker.
#[async_trait]
pub trait Boundary: Send {
    fn kind(&self) -> BoundaryKind;

    async fn send(&mut self, message: &ProcessMessage) -> Result<()>;

    async fn receive(&mut self) -> Result<ProcessMessage>;

    /// Close the channel and reap the worker.
    async fn shutdown(&mut self) -> Result<()>;
}

/// Send one command across `boundary` and decode the reply.
pub async fn exchange(boundary: &mut dyn Boundary, request: IsolatedRequest) -> Result<ExecutionState> {
    let kind = boundary.kind();
    let run_id = request.config.run_id.clone();

    boundary.send(&ProcessMessage::command(&request)?).await?;
    let reply = boundary.receive().await;
    let closed = boundary.shutdown().await;
    let reply = reply?;
    closed?;

    if reply.run_id != run_id {
        return Err(IsolationError::Channel {
            boundary: kind,
            message: format!("reply for run {} while waiting on {run_id}", reply.run_id),
        }
        .into());
    }

    reply.into_outcome(kind)
}

/// Runs turns either in place or behind a thread or process boundary.
#[derive(Clone)]
pub struct IsolatedRuntime {
    enabled: bool,
    worker_type: WorkerType,
    factory: Arc<dyn RunFactory>,
    program: Option<PathBuf>,
    args: Vec<String>,
}

impl IsolatedRuntime {
    /// In-place execution until isolation is enabled.
    pub fn new(factory: Arc<dyn RunFactory>) -> Self {
        Self {
            enabled: false,
            worker_type: WorkerType::Thread,
            factory,
            program: None,
            args: vec!["worker".into()],
        }
    }

    pub fn from_settings(settings: &IsolationSettings, factory: Arc<dyn RunFactory>) -> Self {
        Self::new(factory)
            .with_enabled(settings.enabled)
            .with_worker_type(settings.worker_type)
    }

    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    pub fn with_worker_type(mut self, worker_type: WorkerType) -> Self {
        self.worker_type = worker_type;
        self
    }

    /// Worker executable for process isolation. Defaults to the current
    /// executable with a `worker` argument.
    pub fn with_program(mut self, program: impl Into<PathBuf>, args: Vec<String>) -> Self {
        self.program = Some(program.into());
        self.args = args;
        self
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn worker_type(&self) -> WorkerType {
        self.worker_type
    }

    pub async fn execute(&self, request: IsolatedRequest) -> Result<ExecutionState> {
        if !self.enabled {
            debug!(run_id = %request.config.run_id, "Running in place");
            return run_request(self.factory.as_ref(), request).await;
        }

        info!(
            run_id = %request.config.run_id,
            worker_type = ?self.worker_type,
            "Running isolated"
        );
        let mut boundary = self.open()?;
        exchange(boundary.as_mut(), request).await
    }

    fn open(&self) -> Result<Box<dyn Boundary>> {
        match self.worker_type {
            WorkerType::Thread => Ok(Box::new(ThreadBoundary::spawn(self.factory.clone())?)),
            WorkerType::Process => {
                let program = match &self.program {
                    Some(program) => program.clone(),
                    None => std::env::current_exe().map_err(|e| IsolationError::Channel {
                        boundary: BoundaryKind::Process,
                        message: format!("cannot locate worker executable: {e}"),
                    })?,
                };
                Ok(Box::new(ProcessBoundary::spawn(&program, &self.args)?))
            }
        }
    }
}

impl std::fmt::Debug for IsolatedRuntime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IsolatedRuntime")
            .field("enabled", &self.enabled)
            .field("worker_type", &self.worker_type)
            .field("program", &self.program)
            .field("args", &self.args)
            .finish()
    }
}
