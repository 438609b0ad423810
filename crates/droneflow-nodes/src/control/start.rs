//! Start Node
//!
//! Entry point of every workflow.

use async_trait::async_trait;
use droneflow_engine::{
    NodeCategory, NodeDescriptor, NodeHandler, NodeInvocation, NodeMetadata, NodeOutput, NodeRegistration, Result,
};

/// Start Node
///
/// Marks where the sequential walk begins. Records the time the mission
/// started under `mission_started_at`.
#[derive(Clone, Default)]
pub struct StartNode;

impl NodeDescriptor for StartNode {
    fn descriptor() -> NodeMetadata {
        NodeMetadata::new("start", NodeCategory::Control, "Start")
            .with_description("Entry point of the workflow")
            .writes("mission_started_at")
    }
}

inventory::submit!(NodeRegistration::of::<StartNode>());

#[async_trait]
impl NodeHandler for StartNode {
    async fn run(&self, invocation: &NodeInvocation<'_>) -> Result<NodeOutput> {
        log::debug!("StartNode {}: mission starting", invocation.node_id);
        let started_at = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or_default();

        Ok(NodeOutput::new(serde_json::json!({"status": "started"}))
            .with_variable("mission_started_at", serde_json::json!(started_at)))
    }
}
