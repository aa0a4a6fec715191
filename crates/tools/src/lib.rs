//! Built-in tool implementations for TurnGraph.
//!
//! Small, side-effect free tools that make a run observable end to end
//! without network or filesystem access.

pub mod calculator;
pub mod clock;

use turngraph_core::tool::ToolRegistry;

pub use calculator::CalculatorTool;
pub use clock::ClockTool;

/// Create a tool registry with every built-in tool.
pub fn default_registry() -> ToolRegistry {
    let mut registry = ToolRegistry::new();
    registry.register(Box::new(CalculatorTool));
    registry.register(Box::new(ClockTool));
    registry
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_registry_lists_builtins() {
        let registry = default_registry();
        assert_eq!(registry.len(), 2);
        let names: Vec<String> = registry.definitions().into_iter().map(|d| d.name).collect();
        assert_eq!(names, ["calculator", "clock"]);
    }
}
