//! Set Variable Node

use async_trait::async_trait;
use droneflow_engine::{
    NodeCategory, NodeDescriptor, NodeHandler, NodeInvocation, NodeMetadata, NodeOutput, NodeRegistration,
    ParameterKind, ParameterSpec, Result,
};

/// Set Variable Node
///
/// Writes `value` into the context under `name`. String values holding JSON
/// are parsed so `"3"` stores the number 3 and `"{\"a\":1}"` an object.
#[derive(Clone, Default)]
pub struct SetVariableNode;

impl SetVariableNode {
    /// Parameter name for the variable to write
    pub const PARAM_NAME: &'static str = "name";
    /// Parameter name for the value to store
    pub const PARAM_VALUE: &'static str = "value";
}

impl NodeDescriptor for SetVariableNode {
    fn descriptor() -> NodeMetadata {
        NodeMetadata::new("set_variable", NodeCategory::Logic, "Set Variable")
            .with_description("Stores a value in the workflow context")
            .with_parameter(ParameterSpec::required(Self::PARAM_NAME, "Name", ParameterKind::String))
            .with_parameter(ParameterSpec::required(Self::PARAM_VALUE, "Value", ParameterKind::Json))
            .writes("*")
    }
}

inventory::submit!(NodeRegistration::of::<SetVariableNode>());

#[async_trait]
impl NodeHandler for SetVariableNode {
    async fn run(&self, invocation: &NodeInvocation<'_>) -> Result<NodeOutput> {
        let name = invocation.require_str(Self::PARAM_NAME)?;
        let value = match invocation.param(Self::PARAM_VALUE) {
            Some(serde_json::Value::String(s)) => {
                serde_json::from_str(s).unwrap_or_else(|_| serde_json::Value::String(s.clone()))
            }
            Some(other) => other.clone(),
            None => serde_json::Value::Null,
        };

        log::debug!("SetVariableNode {}: {} = {}", invocation.node_id, name, value);
        Ok(NodeOutput::new(serde_json::json!({"name": name, "value": value})).with_variable(name, value))
    }
}
