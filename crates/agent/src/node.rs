//! The node contract.
//!
//! A node is a named, stateless unit: it reads the state and context and
//! returns a partial update. Routing is either explicit (`next`) or left to
//! the engine's default policy.

use async_trait::async_trait;
use turngraph_core::error::Result;

use crate::context::ExecutionContext;
use crate::state::{ExecutionState, StateUpdate};

/// Name of the model-call node, the default entry point.
pub const MODEL: &str = "model";
/// Name of the tool-dispatch node.
pub const TOOLS: &str = "tools";
/// Name of the completion node.
pub const DONE: &str = "done";

/// Where to go after a node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Next {
    /// No explicit rule; the engine's default routing decides
    Default,
    /// Continue with the named node
    To(String),
    /// Stop the walk
    End,
}

impl Next {
    pub fn to(name: impl Into<String>) -> Self {
        Self::To(name.into())
    }
}

#[async_trait]
pub trait Node: Send + Sync {
    fn name(&self) -> &str;

    async fn execute(&self, state: &ExecutionState, ctx: &ExecutionContext) -> Result<StateUpdate>;

    /// Skip gate. A skipped node neither runs nor consumes a recursion slot.
    fn should_execute(&self, _state: &ExecutionState) -> bool {
        true
    }

    fn next(&self, _state: &ExecutionState) -> Next {
        Next::Default
    }

    /// Terminal nodes do housekeeping only and are not counted against the
    /// recursion ceiling.
    fn is_terminal(&self) -> bool {
        false
    }
}
