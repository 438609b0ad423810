//! Land Node

use async_trait::async_trait;
use droneflow_engine::{
    commands, NodeCategory, NodeDescriptor, NodeHandler, NodeInvocation, NodeMetadata, NodeOutput,
    NodeRegistration, Result,
};

/// Land Node
///
/// Descends and lands in place, clearing `airborne`.
#[derive(Clone, Default)]
pub struct LandNode;

impl NodeDescriptor for LandNode {
    fn descriptor() -> NodeMetadata {
        NodeMetadata::new("land", NodeCategory::Movement, "Land")
            .with_description("Lands the drone")
            .writes("airborne")
    }
}

inventory::submit!(NodeRegistration::of::<LandNode>());

#[async_trait]
impl NodeHandler for LandNode {
    async fn run(&self, invocation: &NodeInvocation<'_>) -> Result<NodeOutput> {
        let response = invocation.dispatch(commands::LAND, None).await?;
        Ok(NodeOutput::new(response).with_variable("airborne", serde_json::json!(false)))
    }
}
