//! Rotate Node

use async_trait::async_trait;
use droneflow_engine::{
    commands, NodeCategory, NodeDescriptor, NodeHandler, NodeInvocation, NodeMetadata, NodeOutput,
    NodeRegistration, ParameterKind, ParameterSpec, Result,
};

use crate::bounded_param;

/// Rotate Node
///
/// Yaws by `degrees`; positive turns clockwise.
#[derive(Clone, Default)]
pub struct RotateNode;

impl RotateNode {
    /// Parameter name for the rotation angle
    pub const PARAM_DEGREES: &'static str = "degrees";
}

impl NodeDescriptor for RotateNode {
    fn descriptor() -> NodeMetadata {
        NodeMetadata::new("rotate", NodeCategory::Movement, "Rotate")
            .with_description("Rotates in place")
            .with_parameter(ParameterSpec::required(
                Self::PARAM_DEGREES,
                "Degrees",
                ParameterKind::number_range(-360.0, 360.0),
            ))
    }
}

inventory::submit!(NodeRegistration::of::<RotateNode>());

#[async_trait]
impl NodeHandler for RotateNode {
    async fn run(&self, invocation: &NodeInvocation<'_>) -> Result<NodeOutput> {
        let degrees = bounded_param(invocation, Self::PARAM_DEGREES, 0.0, -360.0, 360.0)?;
        let response = invocation
            .dispatch(commands::ROTATE, Some(serde_json::json!({"degrees": degrees})))
            .await?;
        Ok(NodeOutput::new(response))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::invoke;
    use droneflow_engine::RecordingDispatcher;
    use serde_json::json;

    #[tokio::test]
    async fn test_dispatches_rotate() {
        let dispatcher = RecordingDispatcher::new();
        invoke(&RotateNode, "rotate", json!({"degrees": -90}), Default::default(), &dispatcher)
            .await
            .unwrap();
        assert_eq!(dispatcher.calls()[0].payload, Some(json!({"degrees": -90.0})));
    }
}
