//! Capture Image Node

use async_trait::async_trait;
use droneflow_engine::{
    commands, NodeCategory, NodeDescriptor, NodeHandler, NodeInvocation, NodeMetadata, NodeOutput,
    NodeRegistration, Result,
};

use super::LAST_IMAGE;

/// Capture Image Node
///
/// Grabs a frame from the onboard camera. Each capture gets a fresh id so
/// later nodes can tell frames apart.
///
/// # Variables written
/// - `last_image`: the host's response (typically a path or base64 frame)
#[derive(Clone, Default)]
pub struct CaptureImageNode;

impl NodeDescriptor for CaptureImageNode {
    fn descriptor() -> NodeMetadata {
        NodeMetadata::new("capture_image", NodeCategory::Ai, "Capture Image")
            .with_description("Captures a frame from the drone camera")
            .writes(LAST_IMAGE)
    }
}

inventory::submit!(NodeRegistration::of::<CaptureImageNode>());

#[async_trait]
impl NodeHandler for CaptureImageNode {
    async fn run(&self, invocation: &NodeInvocation<'_>) -> Result<NodeOutput> {
        let capture_id = uuid::Uuid::new_v4().to_string();
        let image = invocation
            .dispatch(commands::CAPTURE_IMAGE, Some(serde_json::json!({"capture_id": capture_id})))
            .await?;

        log::debug!("CaptureImageNode {}: captured {}", invocation.node_id, capture_id);
        Ok(NodeOutput::new(serde_json::json!({
            "capture_id": capture_id,
            "image": image,
        }))
        .with_variable(LAST_IMAGE, image))
    }
}
