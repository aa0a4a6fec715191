//! Model client implementations for TurnGraph.
//!
//! All clients implement the `turngraph_core::ModelClient` trait.
//! [`build_client`] selects the correct one based on configuration.

pub mod echo;
pub mod openai_compat;
pub mod router;

pub use echo::EchoClient;
pub use openai_compat::OpenAiCompatClient;
pub use router::build_client;
