//! Takeoff Node

use async_trait::async_trait;
use droneflow_engine::{
    commands, NodeCategory, NodeDescriptor, NodeHandler, NodeInvocation, NodeMetadata, NodeOutput,
    NodeRegistration, ParameterKind, ParameterSpec, Result,
};

use crate::bounded_param;

/// Takeoff Node
///
/// Lifts off to `height` meters (0.2 to 3.0, default 1.0).
///
/// # Variables written
/// - `airborne`: `true` once the host acknowledges
#[derive(Clone, Default)]
pub struct TakeoffNode;

impl TakeoffNode {
    /// Parameter name for the target height
    pub const PARAM_HEIGHT: &'static str = "height";
    const DEFAULT_HEIGHT: f64 = 1.0;
}

impl NodeDescriptor for TakeoffNode {
    fn descriptor() -> NodeMetadata {
        NodeMetadata::new("takeoff", NodeCategory::Movement, "Takeoff")
            .with_description("Takes off and climbs to the given height")
            .with_parameter(
                ParameterSpec::optional(Self::PARAM_HEIGHT, "Height (m)", ParameterKind::number_range(0.2, 3.0))
                    .with_default(serde_json::json!(Self::DEFAULT_HEIGHT)),
            )
            .writes("airborne")
    }
}

inventory::submit!(NodeRegistration::of::<TakeoffNode>());

#[async_trait]
impl NodeHandler for TakeoffNode {
    async fn run(&self, invocation: &NodeInvocation<'_>) -> Result<NodeOutput> {
        let height = bounded_param(invocation, Self::PARAM_HEIGHT, Self::DEFAULT_HEIGHT, 0.2, 3.0)?;
        let response = invocation
            .dispatch(commands::TAKEOFF, Some(serde_json::json!({"height": height})))
            .await?;

        Ok(NodeOutput::new(response).with_variable("airborne", serde_json::json!(true)))
    }
}
