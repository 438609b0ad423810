//! Move Node

use async_trait::async_trait;
use droneflow_engine::{
    commands, EngineError, NodeCategory, NodeDescriptor, NodeHandler, NodeInvocation, NodeMetadata, NodeOutput,
    NodeRegistration, ParameterKind, ParameterSpec, Result,
};
use serde::{Deserialize, Serialize};

use crate::bounded_param;

/// Direction of a relative move
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MoveDirection {
    Forward,
    Back,
    Left,
    Right,
    Up,
    Down,
}

impl MoveDirection {
    const NAMES: [&'static str; 6] = ["forward", "back", "left", "right", "up", "down"];
}

/// Move Node
///
/// Flies `distance` meters in `direction` relative to the current heading.
///
/// # Parameters
/// - `direction` (required): forward, back, left, right, up or down
/// - `distance`: meters, 0.2 to 5.0 (default 0.5)
/// - `speed`: m/s, 0.1 to 2.0; the host picks one when absent
#[derive(Clone, Default)]
pub struct MoveNode;

impl MoveNode {
    /// Parameter name for the move direction
    pub const PARAM_DIRECTION: &'static str = "direction";
    /// Parameter name for the distance in meters
    pub const PARAM_DISTANCE: &'static str = "distance";
    /// Parameter name for the optional speed
    pub const PARAM_SPEED: &'static str = "speed";
    const DEFAULT_DISTANCE: f64 = 0.5;
}

impl NodeDescriptor for MoveNode {
    fn descriptor() -> NodeMetadata {
        NodeMetadata::new("move", NodeCategory::Movement, "Move")
            .with_description("Moves relative to the current position")
            .with_parameter(ParameterSpec::required(
                Self::PARAM_DIRECTION,
                "Direction",
                ParameterKind::one_of(MoveDirection::NAMES),
            ))
            .with_parameter(
                ParameterSpec::optional(Self::PARAM_DISTANCE, "Distance (m)", ParameterKind::number_range(0.2, 5.0))
                    .with_default(serde_json::json!(Self::DEFAULT_DISTANCE)),
            )
            .with_parameter(ParameterSpec::optional(
                Self::PARAM_SPEED,
                "Speed (m/s)",
                ParameterKind::number_range(0.1, 2.0),
            ))
    }
}

inventory::submit!(NodeRegistration::of::<MoveNode>());

#[async_trait]
impl NodeHandler for MoveNode {
    async fn run(&self, invocation: &NodeInvocation<'_>) -> Result<NodeOutput> {
        let raw = invocation.require_str(Self::PARAM_DIRECTION)?;
        let direction: MoveDirection = serde_json::from_value(serde_json::Value::String(raw.to_string()))
            .map_err(|_| {
                EngineError::invalid_parameter(
                    invocation.node_id,
                    Self::PARAM_DIRECTION,
                    format!("unknown direction '{}'", raw),
                )
            })?;
        let distance = bounded_param(invocation, Self::PARAM_DISTANCE, Self::DEFAULT_DISTANCE, 0.2, 5.0)?;

        let mut payload = serde_json::json!({"direction": direction, "distance": distance});
        if invocation.param(Self::PARAM_SPEED).is_some_and(|v| !v.is_null()) {
            payload["speed"] = serde_json::json!(bounded_param(invocation, Self::PARAM_SPEED, 0.0, 0.1, 2.0)?);
        }

        let response = invocation.dispatch(commands::MOVE, Some(payload)).await?;
        Ok(NodeOutput::new(response))
    }
}
