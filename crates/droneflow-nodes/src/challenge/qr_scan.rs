//! QR Scan Node
//!
//! Reads a QR code in view. Competition courses place codes at gates, and
//! the decoded text usually drives a `condition_branch` downstream.

use async_trait::async_trait;
use droneflow_engine::{
    commands, NodeCategory, NodeDescriptor, NodeHandler, NodeInvocation, NodeMetadata, NodeOutput,
    NodeRegistration, ParameterKind, ParameterSpec, Result,
};

/// QR Scan Node
///
/// # Parameters
/// - `expected`: content to compare against; `matched` is `null` when absent
///
/// # Variables written
/// - `qr_content`: decoded text, or `null` when nothing was read
#[derive(Clone, Default)]
pub struct QrScanNode;

impl QrScanNode {
    /// Parameter name for the expected QR content
    pub const PARAM_EXPECTED: &'static str = "expected";
}

impl NodeDescriptor for QrScanNode {
    fn descriptor() -> NodeMetadata {
        NodeMetadata::new("qr_scan", NodeCategory::Challenge, "Scan QR Code")
            .with_description("Decodes a QR code in the camera view")
            .with_parameter(ParameterSpec::optional(Self::PARAM_EXPECTED, "Expected", ParameterKind::String))
            .writes("qr_content")
    }
}

inventory::submit!(NodeRegistration::of::<QrScanNode>());

#[async_trait]
impl NodeHandler for QrScanNode {
    async fn run(&self, invocation: &NodeInvocation<'_>) -> Result<NodeOutput> {
        let response = invocation.dispatch(commands::SCAN_QR, None).await?;
        let content = match &response {
            serde_json::Value::String(s) => Some(s.clone()),
            other => other.get("content").and_then(|c| c.as_str()).map(str::to_string),
        };

        let matched = invocation
            .param(Self::PARAM_EXPECTED)
            .and_then(|v| v.as_str())
            .map(|expected| content.as_deref() == Some(expected.trim()));

        log::debug!("QrScanNode {}: read {:?}", invocation.node_id, content);
        Ok(NodeOutput::new(serde_json::json!({"content": content, "matched": matched}))
            .with_variable("qr_content", serde_json::json!(content)))
    }
}
