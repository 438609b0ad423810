//! Droneflow Nodes
//!
//! Built-in node handlers for the droneflow workflow engine.
//! Each node is an atomic mission step that reaches the drone host through
//! the engine's `CommandDispatcher`.
//!
//! # Categories
//!
//! - **Control**: start and end markers
//! - **Logic**: branching, variables and timing
//! - **Movement**: flight commands
//! - **AI**: inference-backed perception and chat
//! - **Challenge**: competition tasks such as QR scanning
//!
//! Every node submits a `NodeRegistration` through `inventory`, so
//! `NodeRegistry::with_builtins()` sees all of them once this crate is linked.

pub mod ai;
pub mod challenge;
pub mod control;
pub mod logic;
pub mod movement;

// Re-export all nodes for convenience
pub use ai::*;
pub use challenge::*;
pub use control::*;
pub use logic::*;
pub use movement::*;

use droneflow_engine::{EngineError, NodeInvocation, NodeRegistry, Result};

/// Numeric parameter checked against an inclusive range
pub(crate) fn bounded_param(
    invocation: &NodeInvocation<'_>,
    name: &str,
    default: f64,
    min: f64,
    max: f64,
) -> Result<f64> {
    let value = invocation.param_f64(name, default)?;
    if value < min || value > max {
        return Err(EngineError::invalid_parameter(
            invocation.node_id,
            name,
            format!("{} is outside {}..={}", value, min, max),
        ));
    }
    Ok(value)
}

/// Registry holding every built-in node
///
/// Calling this from a host also guarantees the crate is linked, so the
/// `inventory` submissions are present.
pub fn builtin_registry() -> NodeRegistry {
    NodeRegistry::with_builtins()
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_inventory_collects_all_builtins() {
        let registry = builtin_registry();
        let all = registry.all_metadata();
        assert_eq!(all.len(), 16, "Expected 16 built-in nodes");

        // Spot-check known kinds
        for kind in [
            "start",
            "end",
            "condition_branch",
            "set_variable",
            "wait",
            "takeoff",
            "land",
            "move",
            "rotate",
            "hover",
            "capture_image",
            "chat",
            "vision_analysis",
            "object_detection",
            "unipixel_segmentation",
            "qr_scan",
        ] {
            assert!(registry.has_node_type(kind), "missing {}", kind);
            assert!(registry.handler(kind).is_some(), "no handler for {}", kind);
        }

        let branching: Vec<_> = all.iter().filter(|m| m.branching).map(|m| m.kind.as_str()).collect();
        assert_eq!(branching, vec!["condition_branch"]);
    }
}
