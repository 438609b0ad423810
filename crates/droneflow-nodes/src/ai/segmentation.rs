//! UniPixel Segmentation Node

use async_trait::async_trait;
use droneflow_engine::{
    commands, NodeCategory, NodeDescriptor, NodeHandler, NodeInvocation, NodeMetadata, NodeOutput,
    NodeRegistration, ParameterKind, ParameterSpec, Result,
};

use super::LAST_IMAGE;

/// UniPixel Segmentation Node
///
/// Segments whatever `prompt` describes ("the landing pad") in the latest
/// frame. The mask summary lands in `segmentation`.
#[derive(Clone, Default)]
pub struct SegmentationNode;

impl SegmentationNode {
    /// Parameter name for the object description
    pub const PARAM_PROMPT: &'static str = "prompt";
}

impl NodeDescriptor for SegmentationNode {
    fn descriptor() -> NodeMetadata {
        NodeMetadata::new("unipixel_segmentation", NodeCategory::Ai, "UniPixel Segmentation")
            .with_description("Segments a described object in the camera view")
            .with_parameter(ParameterSpec::required(Self::PARAM_PROMPT, "Prompt", ParameterKind::String))
            .writes("segmentation")
    }
}

inventory::submit!(NodeRegistration::of::<SegmentationNode>());

#[async_trait]
impl NodeHandler for SegmentationNode {
    async fn run(&self, invocation: &NodeInvocation<'_>) -> Result<NodeOutput> {
        let prompt = invocation.require_str(Self::PARAM_PROMPT)?;
        let mut payload = serde_json::json!({"prompt": prompt});
        if let Some(image) = invocation.variable(LAST_IMAGE) {
            payload["image"] = image.clone();
        }

        let segmentation = invocation.dispatch(commands::SEGMENT, Some(payload)).await?;
        Ok(NodeOutput::new(segmentation.clone()).with_variable("segmentation", segmentation))
    }
}
