//! Condition Branch Node
//!
//! Compares a context variable against a value and reports the outcome as
//! `condition`. The engine follows the `true` or `false` edge from it.

use async_trait::async_trait;
use droneflow_engine::{
    EngineError, NodeCategory, NodeDescriptor, NodeHandler, NodeInvocation, NodeMetadata, NodeOutput,
    NodeRegistration, ParameterKind, ParameterSpec, Result,
};
use serde::{Deserialize, Serialize};

/// Comparison applied by [`ConditionBranchNode`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConditionOperator {
    #[default]
    Equals,
    NotEquals,
    GreaterThan,
    LessThan,
    Exists,
    Truthy,
}

impl ConditionOperator {
    const NAMES: [&'static str; 6] = ["equals", "not_equals", "greater_than", "less_than", "exists", "truthy"];

    /// Evaluate against the current variable value
    pub fn evaluate(self, actual: Option<&serde_json::Value>, expected: &serde_json::Value) -> bool {
        match self {
            Self::Equals => actual.is_some_and(|a| loosely_equal(a, expected)),
            Self::NotEquals => !actual.is_some_and(|a| loosely_equal(a, expected)),
            Self::GreaterThan => compare(actual, expected).is_some_and(|(a, b)| a > b),
            Self::LessThan => compare(actual, expected).is_some_and(|(a, b)| a < b),
            Self::Exists => actual.is_some_and(|a| !a.is_null()),
            Self::Truthy => actual.is_some_and(is_truthy),
        }
    }
}

fn as_number(value: &serde_json::Value) -> Option<f64> {
    match value {
        serde_json::Value::Number(n) => n.as_f64(),
        serde_json::Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn compare(actual: Option<&serde_json::Value>, expected: &serde_json::Value) -> Option<(f64, f64)> {
    Some((as_number(actual?)?, as_number(expected)?))
}

// Numbers compare by value so "2" from a text field equals 2.0
fn loosely_equal(actual: &serde_json::Value, expected: &serde_json::Value) -> bool {
    match (as_number(actual), as_number(expected)) {
        (Some(a), Some(b)) => a == b,
        _ => actual == expected,
    }
}

fn is_truthy(value: &serde_json::Value) -> bool {
    match value {
        serde_json::Value::Null => false,
        serde_json::Value::Bool(b) => *b,
        serde_json::Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        serde_json::Value::String(s) => !s.is_empty(),
        serde_json::Value::Array(a) => !a.is_empty(),
        serde_json::Value::Object(_) => true,
    }
}

/// Condition Branch Node
///
/// # Parameters
/// - `variable` (required): context variable to inspect
/// - `operator`: one of `equals`, `not_equals`, `greater_than`, `less_than`,
///   `exists`, `truthy` (default `equals`)
/// - `value`: value to compare against
///
/// # Result
/// `{"condition": bool, "variable": .., "actual": ..}`
#[derive(Clone, Default)]
pub struct ConditionBranchNode;

impl ConditionBranchNode {
    /// Parameter name for the variable under test
    pub const PARAM_VARIABLE: &'static str = "variable";
    /// Parameter name for the comparison operator
    pub const PARAM_OPERATOR: &'static str = "operator";
    /// Parameter name for the comparison operand
    pub const PARAM_VALUE: &'static str = "value";
}

impl NodeDescriptor for ConditionBranchNode {
    fn descriptor() -> NodeMetadata {
        NodeMetadata::new("condition_branch", NodeCategory::Logic, "Condition")
            .with_description("Follows the true or false edge depending on a context variable")
            .with_parameter(ParameterSpec::required(
                Self::PARAM_VARIABLE,
                "Variable",
                ParameterKind::String,
            ))
            .with_parameter(
                ParameterSpec::optional(
                    Self::PARAM_OPERATOR,
                    "Operator",
                    ParameterKind::one_of(ConditionOperator::NAMES),
                )
                .with_default(serde_json::json!("equals")),
            )
            .with_parameter(ParameterSpec::optional(Self::PARAM_VALUE, "Value", ParameterKind::Json))
            .branching()
    }
}

inventory::submit!(NodeRegistration::of::<ConditionBranchNode>());

#[async_trait]
impl NodeHandler for ConditionBranchNode {
    async fn run(&self, invocation: &NodeInvocation<'_>) -> Result<NodeOutput> {
        let variable = invocation.require_str(Self::PARAM_VARIABLE)?;
        let operator = match invocation.param(Self::PARAM_OPERATOR) {
            None | Some(serde_json::Value::Null) => ConditionOperator::default(),
            Some(raw) => serde_json::from_value(raw.clone()).map_err(|_| {
                EngineError::invalid_parameter(
                    invocation.node_id,
                    Self::PARAM_OPERATOR,
                    format!("unknown operator {}", raw),
                )
            })?,
        };
        let expected = invocation
            .param(Self::PARAM_VALUE)
            .cloned()
            .unwrap_or(serde_json::Value::Null);

        let actual = invocation.variable(variable);
        let condition = operator.evaluate(actual, &expected);
        log::debug!(
            "ConditionBranchNode {}: {} {:?} {} => {}",
            invocation.node_id,
            variable,
            operator,
            expected,
            condition
        );

        Ok(NodeOutput::new(serde_json::json!({
            "condition": condition,
            "variable": variable,
            "actual": actual.cloned().unwrap_or(serde_json::Value::Null),
        })))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::invoke;
    use droneflow_engine::RecordingDispatcher;
    use serde_json::json;
    use std::collections::HashMap;

    #[test]
    fn test_descriptor_is_branching() {
        let meta = ConditionBranchNode::descriptor();
        assert_eq!(meta.kind, "condition_branch");
        assert!(meta.branching);
        assert!(meta.parameters.iter().any(|p| p.name == "variable" && p.required));
    }

    #[test]
    fn test_operators() {
        let two = json!(2);
        assert!(ConditionOperator::Equals.evaluate(Some(&json!("2")), &two));
        assert!(ConditionOperator::NotEquals.evaluate(None, &two));
        assert!(ConditionOperator::GreaterThan.evaluate(Some(&json!(3.5)), &two));
        assert!(!ConditionOperator::LessThan.evaluate(Some(&json!("abc")), &two));
        assert!(ConditionOperator::Exists.evaluate(Some(&json!(false)), &json!(null)));
        assert!(!ConditionOperator::Exists.evaluate(Some(&json!(null)), &json!(null)));
        assert!(ConditionOperator::Truthy.evaluate(Some(&json!("A7")), &json!(null)));
        assert!(!ConditionOperator::Truthy.evaluate(Some(&json!(0)), &json!(null)));
    }

    #[tokio::test]
    async fn test_reports_condition_from_variables() {
        let dispatcher = RecordingDispatcher::new();
        let variables = HashMap::from([("detected".to_string(), json!(true))]);

        let output = invoke(
            &ConditionBranchNode,
            "condition_branch",
            json!({"variable": "detected", "operator": "equals", "value": true}),
            variables.clone(),
            &dispatcher,
        )
        .await
        .unwrap();
        assert_eq!(output.result["condition"], true);

        let output = invoke(
            &ConditionBranchNode,
            "condition_branch",
            json!({"variable": "detected", "operator": "not_equals", "value": true}),
            variables,
            &dispatcher,
        )
        .await
        .unwrap();
        assert_eq!(output.result["condition"], false);
        assert!(dispatcher.calls().is_empty());
    }

    #[tokio::test]
    async fn test_rejects_unknown_operator() {
        let dispatcher = RecordingDispatcher::new();
        let err = invoke(
            &ConditionBranchNode,
            "condition_branch",
            json!({"variable": "x", "operator": "roughly"}),
            HashMap::new(),
            &dispatcher,
        )
        .await
        .unwrap_err();
        assert!(matches!(err, EngineError::InvalidParameter { .. }));
    }
}
