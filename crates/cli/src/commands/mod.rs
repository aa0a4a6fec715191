pub mod config_cmd;
pub mod run;
pub mod worker;

use std::sync::Arc;
use async_trait::async_trait;
use tracing::{debug, trace};
use turngraph_agent::{RunConfig, RunFactory, RunParts, token};
use turngraph_core::error::Result;
use turngraph_core::event::{EventData, EventHandler, GraphEvent, HandlerError};

/// Builds the model client and built-in tools for a run, in whichever
/// process the run ends up executing.
pub struct CliFactory {
    api_key: Option<String>,
}

impl CliFactory {
    pub fn new(api_key: Option<String>) -> Self {
        Self { api_key }
    }
}

impl RunFactory for CliFactory {
    fn build(&self, config: &RunConfig) -> Result<RunParts> {
        let model = turngraph_providers::build_client(&config.model, self.api_key.as_deref())?;
        let logger: Arc<dyn EventHandler> = Arc::new(LogHandler);

        let mut parts = RunParts::new(model, Arc::new(turngraph_tools::default_registry()))
            .with_token_counter(token::heuristic_counter());
        for event in GraphEvent::ALL {
            parts = parts.with_handler(event.as_str(), logger.clone());
        }
        Ok(parts)
    }
}

/// Mirrors run events into the log.
struct LogHandler;

#[async_trait]
impl EventHandler for LogHandler {
    async fn handle(
        &self,
        event: &str,
        data: &EventData,
        metadata: Option<&serde_json::Value>,
    ) -> std::result::Result<(), HandlerError> {
        let run_id = metadata
            .and_then(|m| m.get("run_id"))
            .and_then(|v| v.as_str())
            .unwrap_or("");

        match data {
            EventData::ModelStream { delta } => {
                trace!(run_id, event, delta = delta.content.as_deref().unwrap_or(""), "Stream");
            }
            EventData::ModelStart { messages } => {
                debug!(run_id, event, messages = messages.len(), "Model call");
            }
            EventData::ModelEnd { usage, error } => {
                debug!(
                    run_id,
                    event,
                    total_tokens = usage.map(|u| u.total_tokens).unwrap_or(0),
                    error = error.as_deref().unwrap_or(""),
                    "Model end"
                );
            }
            EventData::ToolStart { tool_call } => {
                debug!(run_id, event, tool = %tool_call.name, call_id = %tool_call.id, "Tool call");
            }
            EventData::ToolEnd { tool_call, result } => {
                debug!(run_id, event, tool = %tool_call.name, result = %result, "Tool result");
            }
        }
        Ok(())
    }
}
