//! Error types for the TurnGraph domain.
//!
//! Uses `thiserror` for ergonomic error definitions.
//! Each bounded context has its own error variant.

use thiserror::Error;

/// The top-level error type for all TurnGraph operations.
#[derive(Debug, Error)]
pub enum Error {
    // --- Model errors ---
    #[error("Model error: {0}")]
    Model(#[from] ModelError),

    // --- Tool errors ---
    #[error("Tool error: {0}")]
    Tool(#[from] ToolError),

    // --- Graph errors ---
    #[error("Graph error: {0}")]
    Graph(#[from] GraphError),

    // --- Isolation errors ---
    #[error("Isolation error: {0}")]
    Isolation(#[from] IsolationError),

    // --- Configuration errors ---
    #[error("Configuration error: {message}")]
    Config { message: String },

    // --- Serialization ---
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    // --- Generic ---
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type alias using our Error.
pub type Result<T> = std::result::Result<T, Error>;

// --- Bounded context errors ---

#[derive(Debug, Clone, Error)]
pub enum ModelError {
    #[error("API request failed: {message} (status: {status_code})")]
    ApiError { status_code: u16, message: String },

    #[error("Rate limited by provider, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("Stream interrupted: {0}")]
    StreamInterrupted(String),

    #[error("Model client not configured: {0}")]
    NotConfigured(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

#[derive(Debug, Clone, Error)]
pub enum ToolError {
    #[error("Tool not found: {0}")]
    NotFound(String),

    #[error("Tool execution failed: {tool_name}: {reason}")]
    ExecutionFailed { tool_name: String, reason: String },

    #[error("Invalid tool arguments: {0}")]
    InvalidArguments(String),

    #[error("Tool call cancelled: {0}")]
    Cancelled(String),
}

/// Failures of the graph walk itself, independent of any collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GraphError {
    #[error("Node {0} not found")]
    UnknownNode(String),

    #[error("Recursion limit ({limit}) exceeded")]
    RecursionLimit { limit: u32 },
}

/// Which side of an isolation boundary failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BoundaryKind {
    Worker,
    Process,
}

impl std::fmt::Display for BoundaryKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Worker => write!(f, "worker"),
            Self::Process => write!(f, "process"),
        }
    }
}

#[derive(Debug, Clone, Error)]
pub enum IsolationError {
    /// The worker or process stopped abnormally.
    #[error("{boundary} stopped with exit code {}: {message}", exit_code.map_or_else(|| "unknown".to_string(), |c| c.to_string()))]
    Exited {
        boundary: BoundaryKind,
        exit_code: Option<i32>,
        message: String,
    },

    /// The isolated run itself failed and reported an error message back.
    #[error("{boundary} run failed: {message}")]
    RunFailed {
        boundary: BoundaryKind,
        message: String,
    },

    /// The channel to the isolated run broke or carried garbage.
    #[error("{boundary} channel error: {message}")]
    Channel {
        boundary: BoundaryKind,
        message: String,
    },
}

impl IsolationError {
    /// The boundary this failure is attributed to.
    pub fn boundary(&self) -> BoundaryKind {
        match self {
            Self::Exited { boundary, .. }
            | Self::RunFailed { boundary, .. }
            | Self::Channel { boundary, .. } => *boundary,
        }
    }
}
