//! End Node

use async_trait::async_trait;
use droneflow_engine::{
    NodeCategory, NodeDescriptor, NodeHandler, NodeInvocation, NodeMetadata, NodeOutput, NodeRegistration, Result,
};

/// End Node
///
/// Terminal marker. Its result summarizes how many variables the mission
/// produced.
#[derive(Clone, Default)]
pub struct EndNode;

impl NodeDescriptor for EndNode {
    fn descriptor() -> NodeMetadata {
        NodeMetadata::new("end", NodeCategory::Control, "End").with_description("Terminal node of the workflow")
    }
}

inventory::submit!(NodeRegistration::of::<EndNode>());

#[async_trait]
impl NodeHandler for EndNode {
    async fn run(&self, invocation: &NodeInvocation<'_>) -> Result<NodeOutput> {
        log::debug!("EndNode {}: mission finished", invocation.node_id);
        Ok(NodeOutput::new(serde_json::json!({
            "status": "finished",
            "variables": invocation.variables.len(),
        })))
    }
}
