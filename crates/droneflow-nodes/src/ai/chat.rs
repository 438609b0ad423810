//! Chat Node

use async_trait::async_trait;
use droneflow_engine::{
    commands, NodeCategory, NodeDescriptor, NodeHandler, NodeInvocation, NodeMetadata, NodeOutput,
    NodeRegistration, ParameterKind, ParameterSpec, Result,
};

/// Chat Node
///
/// Sends `prompt` to the host's language model and stores the reply in
/// `last_response`. `{name}` placeholders in the prompt are filled from
/// string or number context variables.
#[derive(Clone, Default)]
pub struct ChatNode;

impl ChatNode {
    /// Parameter name for the prompt template
    pub const PARAM_PROMPT: &'static str = "prompt";
    /// Parameter name for the model override
    pub const PARAM_MODEL: &'static str = "model";
}

impl NodeDescriptor for ChatNode {
    fn descriptor() -> NodeMetadata {
        NodeMetadata::new("chat", NodeCategory::Ai, "Chat")
            .with_description("Asks a language model a question")
            .with_parameter(ParameterSpec::required(Self::PARAM_PROMPT, "Prompt", ParameterKind::String))
            .with_parameter(ParameterSpec::optional(Self::PARAM_MODEL, "Model", ParameterKind::String))
            .writes("last_response")
    }
}

inventory::submit!(NodeRegistration::of::<ChatNode>());

fn render_prompt(template: &str, invocation: &NodeInvocation<'_>) -> String {
    let mut prompt = template.to_string();
    for (key, value) in invocation.variables {
        let placeholder = format!("{{{}}}", key);
        if !prompt.contains(&placeholder) {
            continue;
        }
        let text = match value {
            serde_json::Value::String(s) => s.clone(),
            serde_json::Value::Number(n) => n.to_string(),
            serde_json::Value::Bool(b) => b.to_string(),
            _ => continue,
        };
        prompt = prompt.replace(&placeholder, &text);
    }
    prompt
}

#[async_trait]
impl NodeHandler for ChatNode {
    async fn run(&self, invocation: &NodeInvocation<'_>) -> Result<NodeOutput> {
        let prompt = render_prompt(invocation.require_str(Self::PARAM_PROMPT)?, invocation);

        let mut payload = serde_json::json!({"prompt": prompt});
        if let Some(model) = invocation.param(Self::PARAM_MODEL).and_then(|v| v.as_str()) {
            payload["model"] = serde_json::json!(model);
        }

        let response = invocation.dispatch(commands::CHAT, Some(payload)).await?;
        let text = response
            .get("response")
            .cloned()
            .unwrap_or_else(|| response.clone());

        Ok(NodeOutput::new(response).with_variable("last_response", text))
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
    async fn test_renders_prompt_and_stores_response() {
        let dispatcher = RecordingDispatcher::new().respond("chat", json!({"response": "Go left"}));
        let variables = HashMap::from([("qr_content".to_string(), json!("GATE-3"))]);

        let output = invoke(
            &ChatNode,
            "chat",
            json!({"prompt": "Where is {qr_content}?", "model": "small"}),
            variables,
            &dispatcher,
        )
        .await
        .unwrap();

        assert_eq!(
            dispatcher.calls()[0].payload,
            Some(json!({"prompt": "Where is GATE-3?", "model": "small"}))
        );
        assert_eq!(output.variables, vec![("last_response".to_string(), json!("Go left"))]);
    }
}
