//! The three canonical nodes: `model`, `tools` and `done`.

mod done;
mod model;
mod tools;

use std::sync::Arc;

pub use done::DoneNode;
pub use model::ModelNode;
pub use tools::ToolsNode;

use crate::node::Node;

/// The fixed node set every run walks.
pub fn standard_nodes() -> Vec<Arc<dyn Node>> {
    vec![Arc::new(ModelNode), Arc::new(ToolsNode), Arc::new(DoneNode)]
}
