//! Wait Node

use std::time::Duration;

use async_trait::async_trait;
use droneflow_engine::{
    EngineError, NodeCategory, NodeDescriptor, NodeHandler, NodeInvocation, NodeMetadata, NodeOutput,
    NodeRegistration, ParameterKind, ParameterSpec, Result,
};

/// Wait Node
///
/// Pauses the mission for `seconds` without commanding the drone. Returns
/// `Cancelled` as soon as the run is stopped.
#[derive(Clone, Default)]
pub struct WaitNode;

impl WaitNode {
    /// Parameter name for the wait time
    pub const PARAM_SECONDS: &'static str = "seconds";
    const DEFAULT_SECONDS: f64 = 1.0;
}

impl NodeDescriptor for WaitNode {
    fn descriptor() -> NodeMetadata {
        NodeMetadata::new("wait", NodeCategory::Logic, "Wait")
            .with_description("Pauses the workflow")
            .with_parameter(
                ParameterSpec::optional(Self::PARAM_SECONDS, "Seconds", ParameterKind::number_range(0.0, 3600.0))
                    .with_default(serde_json::json!(Self::DEFAULT_SECONDS)),
            )
    }
}

inventory::submit!(NodeRegistration::of::<WaitNode>());

#[async_trait]
impl NodeHandler for WaitNode {
    async fn run(&self, invocation: &NodeInvocation<'_>) -> Result<NodeOutput> {
        let seconds = invocation.param_f64(Self::PARAM_SECONDS, Self::DEFAULT_SECONDS)?;
        if !(0.0..=3600.0).contains(&seconds) {
            return Err(EngineError::invalid_parameter(
                invocation.node_id,
                Self::PARAM_SECONDS,
                "must be between 0 and 3600",
            ));
        }

        log::debug!("WaitNode {}: waiting {}s", invocation.node_id, seconds);
        tokio::select! {
            _ = tokio::time::sleep(Duration::from_secs_f64(seconds)) => {}
            _ = invocation.cancel.cancelled() => return Err(EngineError::Cancelled),
        }

        Ok(NodeOutput::new(serde_json::json!({"waited": seconds})))
    }
}
