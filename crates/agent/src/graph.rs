//! Graph engine: walks named nodes over one execution state.
//!
//! Each counted step runs one node, merges its update and bumps
//! `recursion_count`. The walk ends when routing yields no next node, when
//! cancellation has fired, or with an error when a counted step is still
//! pending after the ceiling has been reached. Terminal nodes run for free.

use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info};
use turngraph_core::error::{GraphError, Result};

use crate::context::ExecutionContext;
use crate::node::{self, Next, Node};
use crate::nodes::standard_nodes;
use crate::state::{ExecutionState, Phase, StateUpdate};

pub struct GraphEngine {
    nodes: HashMap<String, Arc<dyn Node>>,
    state: ExecutionState,
    recursion_limit: u32,
}

impl GraphEngine {
    pub fn new(
        nodes: impl IntoIterator<Item = Arc<dyn Node>>,
        initial_state: ExecutionState,
        recursion_limit: u32,
    ) -> Self {
        Self {
            nodes: nodes
                .into_iter()
                .map(|n| (n.name().to_string(), n))
                .collect(),
            state: initial_state,
            recursion_limit,
        }
    }

    /// An engine over the `model`, `tools` and `done` nodes.
    pub fn standard(initial_state: ExecutionState, recursion_limit: u32) -> Self {
        Self::new(standard_nodes(), initial_state, recursion_limit)
    }

    pub fn recursion_limit(&self) -> u32 {
        self.recursion_limit
    }

    pub fn get_state(&self) -> &ExecutionState {
        &self.state
    }

    /// Merge an update from outside the walk, e.g. to inject messages
    /// between runs. Does not count as a step.
    pub fn update_state(&mut self, update: StateUpdate) {
        self.state.apply(update);
    }

    pub fn into_state(self) -> ExecutionState {
        self.state
    }

    /// Walk from `entry` until the run terminates.
    ///
    /// On error the engine keeps the state as it stood when the failing
    /// node was entered; [`get_state`](Self::get_state) still reads it.
    pub async fn execute(&mut self, entry: &str, ctx: &ExecutionContext) -> Result<ExecutionState> {
        let run_id = ctx.config.run_id.as_str();
        let mut current = Some(entry.to_string());

        while let Some(name) = current.take() {
            if ctx.cancel.is_cancelled() {
                info!(run_id, node = %name, step = self.state.recursion_count, "Run cancelled");
                break;
            }

            let node = self
                .nodes
                .get(&name)
                .cloned()
                .ok_or_else(|| GraphError::UnknownNode(name.clone()))?;

            if !node.should_execute(&self.state) {
                debug!(run_id, node = %name, "Node skipped");
                current = match node.next(&self.state) {
                    Next::To(next) => Some(next),
                    Next::Default | Next::End => None,
                };
                continue;
            }

            let counted = !node.is_terminal();
            if counted && self.state.recursion_count >= self.recursion_limit {
                return Err(GraphError::RecursionLimit {
                    limit: self.recursion_limit,
                }
                .into());
            }

            debug!(run_id, node = %name, step = self.state.recursion_count, "Executing node");

            let update = match node.execute(&self.state, ctx).await {
                Ok(update) => update,
                Err(e) => {
                    ctx.report_error(&e, &name, &self.state);
                    return Err(e);
                }
            };

            self.state.apply(update);
            if counted {
                self.state.recursion_count += 1;
            }

            current = match node.next(&self.state) {
                Next::To(next) => Some(next),
                Next::End => None,
                Next::Default => default_route(&self.state),
            };
        }

        Ok(self.state.clone())
    }
}

/// Routing for nodes without an explicit rule.
fn default_route(state: &ExecutionState) -> Option<String> {
    if state.phase == Phase::Done {
        None
    } else if state.has_tool_calls() {
        Some(node::TOOLS.into())
    } else if state.has_tool_results() {
        Some(node::MODEL.into())
    } else {
        Some(node::DONE.into())
    }
}

impl std::fmt::Debug for GraphEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut nodes: Vec<&str> = self.nodes.keys().map(String::as_str).collect();
        nodes.sort_unstable();
        f.debug_struct("GraphEngine")
            .field("nodes", &nodes)
            .field("recursion_limit", &self.recursion_limit)
            .field("phase", &self.state.phase)
            .field("recursion_count", &self.state.recursion_count)
            .finish()
    }
}
