//! Agent runtime: the run lifecycle callers interact with.
//!
//! `create` wires a model client, tools and event handlers to a run
//! configuration; `process_stream` seeds a fresh execution state and walks
//! the standard graph from the `model` node; `cleanup` drops buffered
//! content and every registered handler.

use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use turngraph_core::error::Result;
use turngraph_core::event::EventHandler;
use turngraph_core::message::Message;
use turngraph_core::model::ModelClient;
use turngraph_core::tool::ToolRegistry;

use crate::context::{ExecutionConfig, ExecutionContext, RunConfig, RunOptions};
use crate::events::EventRegistry;
use crate::facade::RunView;
use crate::graph::GraphEngine;
use crate::node;
use crate::state::ExecutionState;

pub struct AgentRuntime {
    config: RunConfig,
    model: Arc<dyn ModelClient>,
    tools: Arc<ToolRegistry>,
    events: Arc<EventRegistry>,
    cancel: CancellationToken,
    /// State of the latest run, or whatever was synced in
    state: ExecutionState,
    /// Where the latest run's own messages begin
    start_index: usize,
}

impl AgentRuntime {
    /// Build a runtime. `handlers` are registered by event name.
    pub fn create(
        config: RunConfig,
        model: Arc<dyn ModelClient>,
        tools: Arc<ToolRegistry>,
        handlers: impl IntoIterator<Item = (String, Arc<dyn EventHandler>)>,
    ) -> Self {
        let events = Arc::new(EventRegistry::new());
        for (event, handler) in handlers {
            events.register(event, handler);
        }

        Self {
            config,
            model,
            tools,
            events,
            cancel: CancellationToken::new(),
            state: ExecutionState::default(),
            start_index: 0,
        }
    }

    pub fn config(&self) -> &RunConfig {
        &self.config
    }

    pub fn events(&self) -> &Arc<EventRegistry> {
        &self.events
    }

    /// Token that cancels the current and future runs until the next
    /// [`reset_values`](Self::reset_values).
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Run one turn and return the final message list when the run
    /// configuration asks for it.
    pub async fn process_stream(
        &mut self,
        inputs: Vec<Message>,
        exec: ExecutionConfig,
        options: RunOptions,
    ) -> Result<Option<Vec<Message>>> {
        let state = self.run(inputs, exec, options).await?;
        Ok(self.config.return_content.then_some(state.messages))
    }

    /// Run one turn and return the complete final state.
    pub async fn run(
        &mut self,
        inputs: Vec<Message>,
        exec: ExecutionConfig,
        options: RunOptions,
    ) -> Result<ExecutionState> {
        let carried = if options.keep_content {
            std::mem::take(&mut self.state.content_data)
        } else {
            Vec::new()
        };
        let limit = exec.recursion_limit.unwrap_or(self.config.recursion_limit);

        info!(
            run_id = %self.config.run_id,
            run_name = exec.run_name.as_deref().unwrap_or(""),
            messages = inputs.len(),
            recursion_limit = limit,
            "Starting run"
        );

        self.start_index = inputs.len();
        let ctx = ExecutionContext::new(
            self.model.clone(),
            self.tools.clone(),
            self.events.clone(),
            self.config.clone(),
        )
        .with_exec(exec)
        .with_options(options)
        .with_cancel(self.cancel.clone());

        let mut engine = GraphEngine::standard(
            ExecutionState::new(inputs).with_content_data(carried),
            limit,
        );

        match engine.execute(node::MODEL, &ctx).await {
            Ok(state) => {
                info!(
                    run_id = %self.config.run_id,
                    phase = %state.phase,
                    steps = state.recursion_count,
                    total_tokens = state.usage.total_tokens,
                    "Run finished"
                );
                self.state = state.clone();
                Ok(state)
            }
            Err(e) => {
                warn!(run_id = %self.config.run_id, error = %e, "Run failed");
                self.state = engine.into_state();
                Err(e)
            }
        }
    }

    /// Derived accessors over the latest state.
    pub fn view(&self) -> RunView<'_> {
        RunView::new(&self.state, &self.config, self.start_index)
    }

    /// Adopt a state produced elsewhere, e.g. by an isolated run.
    pub fn sync_state(&mut self, state: ExecutionState, start_index: usize) {
        self.start_index = start_index.min(state.messages.len());
        self.state = state;
    }

    /// Forget the latest run and issue a fresh cancellation token.
    pub fn reset_values(&mut self) {
        self.state = ExecutionState::default();
        self.start_index = 0;
        self.cancel = CancellationToken::new();
    }

    /// Release buffered content and every registered handler.
    pub fn cleanup(&mut self) {
        self.reset_values();
        self.events.clear();
    }
}

impl std::fmt::Debug for AgentRuntime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AgentRuntime")
            .field("config", &self.config)
            .field("model", &self.model.name())
            .field("tools", &self.tools.len())
            .field("events", &self.events)
            .field("phase", &self.state.phase)
            .finish()
    }
}
