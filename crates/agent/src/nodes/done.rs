//! Done node: terminal housekeeping.

use async_trait::async_trait;
use turngraph_core::error::Result;
use turngraph_core::event::{EventData, GraphEvent};

use crate::context::ExecutionContext;
use crate::node::{self, Next, Node};
use crate::state::{ExecutionState, Phase, StateUpdate};

pub struct DoneNode;

#[async_trait]
impl Node for DoneNode {
    fn name(&self) -> &str {
        node::DONE
    }

    async fn execute(&self, state: &ExecutionState, ctx: &ExecutionContext) -> Result<StateUpdate> {
        ctx.emit(
            GraphEvent::ModelEnd,
            EventData::ModelEnd {
                usage: Some(state.usage),
                error: None,
            },
        )
        .await;

        Ok(StateUpdate::new().with_phase(Phase::Done))
    }

    fn next(&self, _state: &ExecutionState) -> Next {
        Next::End
    }

    fn is_terminal(&self) -> bool {
        true
    }
}
