//! Object Detection Node

use async_trait::async_trait;
use droneflow_engine::{
    commands, NodeCategory, NodeDescriptor, NodeHandler, NodeInvocation, NodeMetadata, NodeOutput,
    NodeRegistration, ParameterKind, ParameterSpec, Result,
};

/// Object Detection Node
///
/// Runs the host's detector on the current frame.
///
/// # Parameters
/// - `target`: class to look for; every class when absent
/// - `confidence`: minimum score, 0 to 1 (default 0.5)
///
/// # Variables written
/// - `detections`: detections at or above `confidence`
/// - `detected`: whether any detection survived the filter
#[derive(Clone, Default)]
pub struct ObjectDetectionNode;

impl ObjectDetectionNode {
    /// Parameter name for the class filter
    pub const PARAM_TARGET: &'static str = "target";
    /// Parameter name for the minimum score
    pub const PARAM_CONFIDENCE: &'static str = "confidence";
    const DEFAULT_CONFIDENCE: f64 = 0.5;
}

impl NodeDescriptor for ObjectDetectionNode {
    fn descriptor() -> NodeMetadata {
        NodeMetadata::new("object_detection", NodeCategory::Ai, "Object Detection")
            .with_description("Detects objects in the camera view")
            .with_parameter(ParameterSpec::optional(Self::PARAM_TARGET, "Target", ParameterKind::String))
            .with_parameter(
                ParameterSpec::optional(Self::PARAM_CONFIDENCE, "Confidence", ParameterKind::number_range(0.0, 1.0))
                    .with_default(serde_json::json!(Self::DEFAULT_CONFIDENCE)),
            )
            .writes("detections")
            .writes("detected")
    }
}

inventory::submit!(NodeRegistration::of::<ObjectDetectionNode>());

#[async_trait]
impl NodeHandler for ObjectDetectionNode {
    async fn run(&self, invocation: &NodeInvocation<'_>) -> Result<NodeOutput> {
        let confidence = crate::bounded_param(
            invocation,
            Self::PARAM_CONFIDENCE,
            Self::DEFAULT_CONFIDENCE,
            0.0,
            1.0,
        )?;
        let target = invocation
            .param(Self::PARAM_TARGET)
            .and_then(|v| v.as_str())
            .filter(|s| !s.trim().is_empty());

        let response = invocation
            .dispatch(
                commands::DETECT_OBJECTS,
                Some(serde_json::json!({"target": target, "confidence": confidence})),
            )
            .await?;

        // Hosts may answer with a bare array or {"detections": [...]}
        let raw = match &response {
            serde_json::Value::Array(items) => items.clone(),
            other => other
                .get("detections")
                .and_then(|d| d.as_array())
                .cloned()
                .unwrap_or_default(),
        };
        let detections: Vec<serde_json::Value> = raw
            .into_iter()
            .filter(|d| {
                let score_ok = d
                    .get("confidence")
                    .and_then(|c| c.as_f64())
                    .map_or(true, |c| c >= confidence);
                let label_ok = target.map_or(true, |t| {
                    d.get("label").and_then(|l| l.as_str()).is_some_and(|l| l.eq_ignore_ascii_case(t))
                });
                score_ok && label_ok
            })
            .collect();
        let detected = !detections.is_empty();

        log::debug!(
            "ObjectDetectionNode {}: {} detection(s)",
            invocation.node_id,
            detections.len()
        );
        Ok(NodeOutput::new(serde_json::json!({
            "detected": detected,
            "count": detections.len(),
            "detections": detections,
        }))
        .with_variable("detections", serde_json::Value::Array(detections))
        .with_variable("detected", serde_json::json!(detected)))
    }
}
