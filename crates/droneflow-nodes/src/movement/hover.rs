//! Hover Node

use std::time::Duration;

use async_trait::async_trait;
use droneflow_engine::{
    commands, EngineError, NodeCategory, NodeDescriptor, NodeHandler, NodeInvocation, NodeMetadata, NodeOutput,
    NodeRegistration, ParameterKind, ParameterSpec, Result,
};

use crate::bounded_param;

/// Hover Node
///
/// Tells the host to hold position, then waits `duration` seconds. The wait
/// ends early with `Cancelled` when the run is stopped.
#[derive(Clone, Default)]
pub struct HoverNode;

impl HoverNode {
    /// Parameter name for the hover time
    pub const PARAM_DURATION: &'static str = "duration";
    const DEFAULT_DURATION: f64 = 2.0;
}

impl NodeDescriptor for HoverNode {
    fn descriptor() -> NodeMetadata {
        NodeMetadata::new("hover", NodeCategory::Movement, "Hover")
            .with_description("Holds position for a while")
            .with_parameter(
                ParameterSpec::optional(Self::PARAM_DURATION, "Duration (s)", ParameterKind::number_range(0.0, 600.0))
                    .with_default(serde_json::json!(Self::DEFAULT_DURATION)),
            )
    }
}

inventory::submit!(NodeRegistration::of::<HoverNode>());

#[async_trait]
impl NodeHandler for HoverNode {
    async fn run(&self, invocation: &NodeInvocation<'_>) -> Result<NodeOutput> {
        let duration = bounded_param(invocation, Self::PARAM_DURATION, Self::DEFAULT_DURATION, 0.0, 600.0)?;
        let response = invocation
            .dispatch(commands::HOVER, Some(serde_json::json!({"duration": duration})))
            .await?;

        tokio::select! {
            _ = tokio::time::sleep(Duration::from_secs_f64(duration)) => {}
            _ = invocation.cancel.cancelled() => return Err(EngineError::Cancelled),
        }

        Ok(NodeOutput::new(response))
    }
}
