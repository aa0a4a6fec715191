//! The agent turn graph for TurnGraph.
//!
//! A run walks a small directed graph of nodes over one shared
//! [`ExecutionState`]:
//!
//! 1. **model** asks the model client for the next reply
//! 2. **tools** dispatches any tool calls in that reply, then loops back
//! 3. **done** closes the run and reports the accumulated usage
//!
//! Every counted node execution consumes one step of the recursion
//! ceiling. Observers subscribe through the [`EventRegistry`]; runs can be
//! relocated to a worker thread or child process with [`IsolatedRuntime`].

pub mod context;
pub mod events;
pub mod facade;
pub mod graph;
pub mod isolation;
pub mod node;
pub mod nodes;
pub mod prune;
pub mod runtime;
pub mod state;
pub mod token;

#[cfg(test)]
pub(crate) mod test_helpers;

pub use context::{
    Callbacks, ErrorCallback, ExecutionConfig, ExecutionContext, RunConfig, RunOptions,
    TokenCounter, ToolErrorCallback,
};
pub use events::EventRegistry;
pub use facade::RunView;
pub use graph::GraphEngine;
pub use isolation::{
    Boundary, IsolatedRequest, IsolatedRuntime, MessageType, PortableOptions, ProcessMessage,
    RunFactory, RunParts, serve_stdio,
};
pub use node::{Next, Node};
pub use nodes::{DoneNode, ModelNode, ToolsNode};
pub use runtime::AgentRuntime;
pub use state::{ContentPart, ExecutionState, Patch, Phase, StateUpdate};
