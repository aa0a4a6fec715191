//! Tools node: dispatches pending tool calls one at a time.
//!
//! Any failure (unknown tool or failed invocation) aborts the run after the
//! tool-error callback has seen it. Results only reach history once every
//! call in the batch has succeeded.

use async_trait::async_trait;
use tracing::{debug, warn};
use turngraph_core::error::{Error, Result, ToolError};
use turngraph_core::event::{EventData, GraphEvent};
use turngraph_core::message::Message;
use turngraph_core::tool::ToolResult;

use crate::context::ExecutionContext;
use crate::node::{self, Next, Node};
use crate::state::{ExecutionState, Patch, Phase, StateUpdate};

pub struct ToolsNode;

#[async_trait]
impl Node for ToolsNode {
    fn name(&self) -> &str {
        node::TOOLS
    }

    async fn execute(&self, state: &ExecutionState, ctx: &ExecutionContext) -> Result<StateUpdate> {
        let calls = state.tool_calls.as_deref().unwrap_or_default();
        let invocation = ctx.invocation_context();
        let mut results = Vec::with_capacity(calls.len());

        for call in calls {
            let Some(tool) = ctx.tools.get(&call.name) else {
                let err = Error::from(ToolError::NotFound(call.name.clone()));
                warn!(run_id = %ctx.config.run_id, tool = %call.name, "Unknown tool requested");
                ctx.report_tool_error(&err, &call.id);
                return Err(err);
            };

            ctx.emit(
                GraphEvent::ToolStart,
                EventData::ToolStart {
                    tool_call: call.clone(),
                },
            )
            .await;

            let context = tool.accepts_context().then_some(&invocation);
            let value = match tool.invoke(&call.args, context).await {
                Ok(value) => value,
                Err(e) => {
                    let err = Error::from(e);
                    warn!(run_id = %ctx.config.run_id, tool = %call.name, error = %err, "Tool failed");
                    ctx.report_tool_error(&err, &call.id);
                    return Err(err);
                }
            };

            debug!(run_id = %ctx.config.run_id, tool = %call.name, call_id = %call.id, "Tool finished");

            ctx.emit(
                GraphEvent::ToolEnd,
                EventData::ToolEnd {
                    tool_call: call.clone(),
                    result: value.clone(),
                },
            )
            .await;

            results.push(ToolResult {
                tool_call_id: call.id.clone(),
                result: value,
                error: None,
            });
        }

        let messages: Vec<Message> = results
            .iter()
            .map(|r| Message::tool_result(&r.tool_call_id, r.content()))
            .collect();

        Ok(StateUpdate::new()
            .with_messages(messages)
            .with_tool_calls(Patch::Clear)
            .with_tool_results(Patch::Set(results))
            .with_phase(Phase::Model))
    }

    fn next(&self, _state: &ExecutionState) -> Next {
        Next::to(node::MODEL)
    }
}
