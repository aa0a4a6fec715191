//! Read-only view over a run's state under the accessor names older
//! callers expect. Nothing is mirrored: every accessor derives from the
//! current [`ExecutionState`].

use turngraph_core::message::Message;
use turngraph_core::model::TokenUsage;

use crate::context::RunConfig;
use crate::state::{ContentPart, ExecutionState, Phase};

#[derive(Debug, Clone, Copy)]
pub struct RunView<'a> {
    state: &'a ExecutionState,
    config: &'a RunConfig,
    start_index: usize,
}

impl<'a> RunView<'a> {
    pub fn new(state: &'a ExecutionState, config: &'a RunConfig, start_index: usize) -> Self {
        Self {
            state,
            config,
            start_index: start_index.min(state.messages.len()),
        }
    }

    /// Messages produced by the run itself, excluding its inputs.
    pub fn get_run_messages(&self) -> &'a [Message] {
        &self.state.messages[self.start_index..]
    }

    /// The whole conversation, inputs included.
    pub fn messages(&self) -> &'a [Message] {
        &self.state.messages
    }

    pub fn content_data(&self) -> &'a [ContentPart] {
        &self.state.content_data
    }

    pub fn current_usage(&self) -> TokenUsage {
        self.state.usage
    }

    pub fn run_id(&self) -> &'a str {
        &self.config.run_id
    }

    pub fn provider(&self) -> &'a str {
        &self.config.model.provider
    }

    pub fn phase(&self) -> Phase {
        self.state.phase
    }

    pub fn recursion_count(&self) -> u32 {
        self.state.recursion_count
    }

    /// The final assistant reply, if the run produced one.
    pub fn final_text(&self) -> Option<&'a str> {
        self.get_run_messages()
            .iter()
            .rev()
            .find(|m| m.role == turngraph_core::message::Role::Assistant && !m.content.is_empty())
            .map(|m| m.content.as_str())
    }
}
