//! # TurnGraph Core
//!
//! Domain types, traits, and error definitions for the TurnGraph agent-turn
//! engine. This crate has **no engine logic**; it defines the boundary that
//! model clients, tools, and event observers implement against.
//!
//! ## Design Philosophy
//!
//! Every collaborator of the engine is a trait here. Implementations live in
//! their respective crates. This enables:
//! - Swapping model clients via configuration
//! - Easy testing with scripted/mock implementations
//! - Clean dependency graph (all crates depend inward on core)

pub mod error;
pub mod event;
pub mod message;
pub mod model;
pub mod tool;

// Re-export key types at crate root for ergonomics
pub use error::{BoundaryKind, Error, GraphError, IsolationError, ModelError, Result, ToolError};
pub use event::{EventBus, EventData, EventHandler, GraphEvent, HandlerError, RunEvent};
pub use message::{Message, Role};
pub use model::{
    ModelClient, ModelConfig, ModelRequest, ModelResponse, NoopSink, StreamChunk, StreamSink,
    TokenUsage,
};
pub use tool::{
    InvocationContext, Tool, ToolArgs, ToolCall, ToolDefinition, ToolRegistry, ToolResult,
};
