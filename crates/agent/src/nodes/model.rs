//! Model node: turns the conversation into one more model turn.

use async_trait::async_trait;
use std::sync::Mutex;
use tracing::{debug, trace};
use turngraph_core::error::Result;
use turngraph_core::event::{EventData, GraphEvent};
use turngraph_core::model::{ModelRequest, StreamChunk, StreamSink};

use crate::context::ExecutionContext;
use crate::node::{self, Next, Node};
use crate::prune::prune_for_run;
use crate::state::{ContentPart, ExecutionState, Patch, Phase, StateUpdate};

pub struct ModelNode;

/// Forwards every chunk as a model-stream event and buffers its text.
struct EventSink<'a> {
    ctx: &'a ExecutionContext,
    buffered: Mutex<Vec<ContentPart>>,
}

impl EventSink<'_> {
    fn take(self) -> Vec<ContentPart> {
        self.buffered
            .into_inner()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl StreamSink for EventSink<'_> {
    async fn on_chunk(&self, chunk: StreamChunk) {
        if let Some(text) = chunk.content.as_deref().filter(|t| !t.is_empty()) {
            trace!(run_id = %self.ctx.config.run_id, len = text.len(), "Stream chunk");
            self.buffered
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner())
                .push(ContentPart::text(text));
        }
        self.ctx
            .emit(GraphEvent::ModelStream, EventData::ModelStream { delta: chunk })
            .await;
    }
}

#[async_trait]
impl Node for ModelNode {
    fn name(&self) -> &str {
        node::MODEL
    }

    async fn execute(&self, state: &ExecutionState, ctx: &ExecutionContext) -> Result<StateUpdate> {
        ctx.emit(
            GraphEvent::ModelStart,
            EventData::ModelStart {
                messages: state.messages.clone(),
            },
        )
        .await;

        let messages = prune_for_run(&state.messages, &ctx.options);
        if messages.len() != state.messages.len() {
            debug!(
                run_id = %ctx.config.run_id,
                before = state.messages.len(),
                after = messages.len(),
                "Pruned conversation to fit token budget"
            );
        }

        let request = ModelRequest {
            messages,
            instructions: ctx.config.instructions.clone(),
            additional_instructions: ctx.config.additional_instructions.clone(),
            tools: ctx.tools.definitions(),
        };

        let sink = EventSink {
            ctx,
            buffered: Mutex::new(Vec::new()),
        };

        let response = match ctx.model.invoke(request, &sink).await {
            Ok(response) => response,
            Err(e) => {
                ctx.emit(
                    GraphEvent::ModelEnd,
                    EventData::ModelEnd {
                        usage: None,
                        error: Some(e.to_string()),
                    },
                )
                .await;
                return Err(e.into());
            }
        };

        let mut message = response.message;
        let tool_calls = if response.tool_calls.is_empty() {
            message.tool_calls.clone()
        } else {
            response.tool_calls
        };
        if message.tool_calls.is_empty() {
            message.tool_calls = tool_calls.clone();
        }

        debug!(
            run_id = %ctx.config.run_id,
            client = ctx.model.name(),
            tool_calls = tool_calls.len(),
            total_tokens = response.usage.total_tokens,
            "Model turn complete"
        );

        let (phase, calls) = if tool_calls.is_empty() {
            (Phase::Done, Patch::Clear)
        } else {
            (Phase::Tools, Patch::Set(tool_calls))
        };

        Ok(StateUpdate::new()
            .with_message(message)
            .with_tool_calls(calls)
            .with_tool_results(Patch::Clear)
            .with_phase(phase)
            .with_usage(response.usage)
            .with_content(sink.take()))
    }

    fn next(&self, state: &ExecutionState) -> Next {
        if state.has_tool_calls() {
            Next::to(node::TOOLS)
        } else {
            Next::to(node::DONE)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::RunOptions;
    use crate::test_helpers::{
        RecordingHandler, RecordingTool, ScriptedModel, context, text_response, tool_call,
        tool_response,
    };
    use std::sync::Arc;
    use turngraph_core::error::{Error, ModelError};
    use turngraph_core::message::Message;
    use turngraph_core::model::TokenUsage;
    use turngraph_core::tool::ToolRegistry;

    #[tokio::test]
    async fn text_reply_finishes_the_turn() {
        let model = Arc::new(ScriptedModel::new(vec![text_response("4", 12, 1)]));
        let ctx = context(model.clone(), ToolRegistry::new());
        let recorder = Arc::new(RecordingHandler::default());
        for event in [GraphEvent::ModelStart, GraphEvent::ModelStream] {
            ctx.events.register(event, recorder.clone());
        }

        let mut state = ExecutionState::new(vec![Message::user("2+2?")]);
        let update = ModelNode.execute(&state, &ctx).await.unwrap();
        state.apply(update);

        assert_eq!(state.messages.len(), 2);
        assert_eq!(state.messages[1].content, "4");
        assert_eq!(state.phase, Phase::Done);
        assert!(state.tool_calls.is_none());
        assert_eq!(state.usage, TokenUsage::new(12, 1));
        assert_eq!(state.content_data, vec![ContentPart::text("4")]);
        assert_eq!(ModelNode.next(&state), Next::to(node::DONE));

        let events = recorder.events();
        assert_eq!(events[0].0, "on_chat_model_start");
        assert!(matches!(&events[0].1, EventData::ModelStart { messages } if messages.len() == 1));
        assert_eq!(events[1].0, "on_chat_model_stream");
    }

    #[tokio::test]
    async fn tool_request_routes_to_tools() {
        let call = tool_call("t1", "calc", serde_json::json!({"expr": "2+2"}));
        let model = Arc::new(ScriptedModel::new(vec![tool_response(vec![call.clone()])]));
        let ctx = context(model, ToolRegistry::new());

        let mut state = ExecutionState::new(vec![Message::user("2+2?")]);
        state.apply(ModelNode.execute(&state, &ctx).await.unwrap());

        assert_eq!(state.phase, Phase::Tools);
        assert_eq!(state.tool_calls, Some(vec![call.clone()]));
        assert_eq!(state.messages[1].tool_calls, vec![call]);
        assert_eq!(ModelNode.next(&state), Next::to(node::TOOLS));
    }

    #[tokio::test]
    async fn request_carries_instructions_and_tools() {
        let model = Arc::new(ScriptedModel::new(vec![text_response("ok", 1, 1)]));
        let mut tools = ToolRegistry::new();
        tools.register(Box::new(RecordingTool::new("calc", serde_json::json!(4))));
        let mut ctx = context(model.clone(), tools);
        ctx.config.instructions = Some("Be brief.".into());
        ctx.config.additional_instructions = Some("Use digits.".into());

        let state = ExecutionState::new(vec![Message::user("hi")]);
        ModelNode.execute(&state, &ctx).await.unwrap();

        let request = &model.requests()[0];
        assert_eq!(request.instructions.as_deref(), Some("Be brief."));
        assert_eq!(request.additional_instructions.as_deref(), Some("Use digits."));
        assert_eq!(request.tools[0].name, "calc");
    }

    #[tokio::test]
    async fn outbound_messages_are_pruned() {
        let model = Arc::new(ScriptedModel::new(vec![text_response("ok", 1, 1)]));
        let recorder = Arc::new(RecordingHandler::default());
        let ctx = context(model.clone(), ToolRegistry::new()).with_options(
            RunOptions::new()
                .with_max_context_tokens(25)
                .with_token_counter(Arc::new(|_: &Message| 10)),
        );
        ctx.events.register(GraphEvent::ModelStart, recorder.clone());

        let state = ExecutionState::new(vec![
            Message::system("sys"),
            Message::user("a"),
            Message::user("b"),
            Message::user("c"),
        ]);
        let update = ModelNode.execute(&state, &ctx).await.unwrap();

        let sent: Vec<String> = model.requests()[0]
            .messages
            .iter()
            .map(|m| m.content.clone())
            .collect();
        assert_eq!(sent, ["sys", "c"]);
        // Observers and history still see everything.
        assert!(matches!(&recorder.events()[0].1, EventData::ModelStart { messages } if messages.len() == 4));
        assert_eq!(update.messages.len(), 1);
    }

    #[tokio::test]
    async fn failure_emits_model_end_then_propagates() {
        let model = Arc::new(ScriptedModel::failing(ModelError::Network("down".into())));
        let ctx = context(model, ToolRegistry::new());
        let recorder = Arc::new(RecordingHandler::default());
        ctx.events.register(GraphEvent::ModelEnd, recorder.clone());

        let state = ExecutionState::new(vec![Message::user("hi")]);
        let err = ModelNode.execute(&state, &ctx).await.unwrap_err();
        assert!(matches!(err, Error::Model(ModelError::Network(_))));

        let events = recorder.events();
        assert_eq!(events.len(), 1);
        match &events[0].1 {
            EventData::ModelEnd { usage, error } => {
                assert!(usage.is_none());
                assert!(error.as_deref().unwrap().contains("down"));
            }
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[tokio::test]
    async fn model_turn_clears_tool_results() {
        let model = Arc::new(ScriptedModel::new(vec![text_response("done", 1, 1)]));
        let ctx = context(model, ToolRegistry::new());
        let mut state = ExecutionState::new(vec![Message::user("hi")]);
        state.tool_results = Some(vec![]);

        state.apply(ModelNode.execute(&state, &ctx).await.unwrap());
        assert!(state.tool_results.is_none());
    }
}
