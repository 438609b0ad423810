//! Vision Analysis Node

use async_trait::async_trait;
use droneflow_engine::{
    commands, NodeCategory, NodeDescriptor, NodeHandler, NodeInvocation, NodeMetadata, NodeOutput,
    NodeRegistration, ParameterKind, ParameterSpec, Result,
};

use super::LAST_IMAGE;

/// Vision Analysis Node
///
/// Describes the scene with a vision-language model. Uses `last_image`
/// when an earlier capture stored one; otherwise the host captures a frame.
#[derive(Clone, Default)]
pub struct VisionAnalysisNode;

impl VisionAnalysisNode {
    /// Parameter name for the question asked about the frame
    pub const PARAM_PROMPT: &'static str = "prompt";
    const DEFAULT_PROMPT: &'static str = "Describe the scene";
}

impl NodeDescriptor for VisionAnalysisNode {
    fn descriptor() -> NodeMetadata {
        NodeMetadata::new("vision_analysis", NodeCategory::Ai, "Vision Analysis")
            .with_description("Analyzes the camera view with a vision model")
            .with_parameter(
                ParameterSpec::optional(Self::PARAM_PROMPT, "Prompt", ParameterKind::String)
                    .with_default(serde_json::json!(Self::DEFAULT_PROMPT)),
            )
            .writes("last_vision")
    }
}

inventory::submit!(NodeRegistration::of::<VisionAnalysisNode>());

#[async_trait]
impl NodeHandler for VisionAnalysisNode {
    async fn run(&self, invocation: &NodeInvocation<'_>) -> Result<NodeOutput> {
        let prompt = invocation.param_str(Self::PARAM_PROMPT, Self::DEFAULT_PROMPT);
        let mut payload = serde_json::json!({"prompt": prompt});
        if let Some(image) = invocation.variable(LAST_IMAGE) {
            payload["image"] = image.clone();
        }

        let analysis = invocation.dispatch(commands::VISION, Some(payload)).await?;
        Ok(NodeOutput::new(analysis.clone()).with_variable("last_vision", analysis))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::invoke;
    use droneflow_engine::RecordingDispatcher;
    use serde_json::json;
    use std::collections::HashMap;

    #[tokio::test]
    async fn test_attaches_last_image() {
        let dispatcher = RecordingDispatcher::new().respond("vision", json!({"description": "a red gate"}));
        let variables = HashMap::from([("last_image".to_string(), json!({"path": "/tmp/a.jpg"}))]);

        let output = invoke(&VisionAnalysisNode, "vision_analysis", json!({}), variables, &dispatcher)
            .await
            .unwrap();

        assert_eq!(
            dispatcher.calls()[0].payload,
            Some(json!({"prompt": "Describe the scene", "image": {"path": "/tmp/a.jpg"}}))
        );
        assert_eq!(output.result["description"], "a red gate");
    }
}
