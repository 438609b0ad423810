//! Static workflow validation
//!
//! `validate` runs every check over the graph and reports all problems at
//! once; no check short-circuits another. Errors make a graph invalid,
//! warnings and suggestions never do. `can_execute` is the narrower question
//! the engine asks before a run: only a missing start, a missing end or a
//! cycle blocks execution.

use std::collections::{HashMap, HashSet, VecDeque};

use serde::{Deserialize, Serialize};

use crate::dependency::DependencyGraph;
use crate::descriptor::{ParameterKind, ParameterSpec, SchemaSource};
use crate::types::{kinds, EdgeId, GraphEdge, GraphNode, NodeId, WorkflowGraph};

/// Kinds of blocking or structural problems
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidationErrorKind {
    MissingStart,
    MissingEnd,
    Cycle,
    MissingParameter,
    InvalidParameter,
    InvalidConnection,
    DuplicateId,
}

impl ValidationErrorKind {
    /// Whether this kind prevents a run
    pub fn blocks_execution(self) -> bool {
        matches!(self, Self::MissingStart | Self::MissingEnd | Self::Cycle)
    }
}

/// Kinds of advisory findings
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidationWarningKind {
    MultipleStart,
    DisconnectedNode,
    UnreachableNode,
}

/// Kinds of proposed fixes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SuggestionKind {
    AddStart,
    AddEnd,
    FixParameter,
    BreakCycle,
    ConnectNode,
}

/// A validation error with location context
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationError {
    pub kind: ValidationErrorKind,
    pub message: String,
    /// Nodes involved, in order (cycle members, the offending node...)
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub node_ids: Vec<NodeId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub edge_id: Option<EdgeId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parameter: Option<String>,
    #[serde(default, skip_serializing_if = "serde_json::Value::is_null")]
    pub details: serde_json::Value,
}

impl ValidationError {
    fn new(kind: ValidationErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            node_ids: Vec::new(),
            edge_id: None,
            parameter: None,
            details: serde_json::Value::Null,
        }
    }

    fn with_nodes(mut self, node_ids: Vec<NodeId>) -> Self {
        self.node_ids = node_ids;
        self
    }

    fn with_edge(mut self, edge_id: &str) -> Self {
        self.edge_id = Some(edge_id.to_string());
        self
    }

    fn with_parameter(mut self, parameter: &str) -> Self {
        self.parameter = Some(parameter.to_string());
        self
    }

    fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = details;
        self
    }
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for ValidationError {}

/// An advisory finding
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationWarning {
    pub kind: ValidationWarningKind,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub node_id: Option<NodeId>,
    #[serde(default, skip_serializing_if = "serde_json::Value::is_null")]
    pub details: serde_json::Value,
}

/// A proposed fix
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Suggestion {
    pub kind: SuggestionKind,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub node_id: Option<NodeId>,
    /// Whether an editor could apply the fix without asking
    pub auto_fixable: bool,
    #[serde(default, skip_serializing_if = "serde_json::Value::is_null")]
    pub details: serde_json::Value,
}

/// Outcome of `validate`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationResult {
    pub valid: bool,
    pub errors: Vec<ValidationError>,
    pub warnings: Vec<ValidationWarning>,
    pub suggestions: Vec<Suggestion>,
}

impl ValidationResult {
    /// Errors of one kind
    pub fn errors_of(&self, kind: ValidationErrorKind) -> impl Iterator<Item = &ValidationError> {
        self.errors.iter().filter(move |e| e.kind == kind)
    }

    /// Whether any error of `kind` was reported
    pub fn has_error(&self, kind: ValidationErrorKind) -> bool {
        self.errors_of(kind).next().is_some()
    }

    /// Whether any warning of `kind` was reported
    pub fn has_warning(&self, kind: ValidationWarningKind) -> bool {
        self.warnings.iter().any(|w| w.kind == kind)
    }
}

/// Outcome of `can_execute`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionCheck {
    pub can_execute: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// Validate a workflow document
pub fn validate_workflow(graph: &WorkflowGraph, schemas: &dyn SchemaSource) -> ValidationResult {
    validate(&graph.nodes, &graph.edges, schemas)
}

/// Validate nodes and edges
///
/// Returns all findings, not just the first.
pub fn validate(nodes: &[GraphNode], edges: &[GraphEdge], schemas: &dyn SchemaSource) -> ValidationResult {
    let mut errors = Vec::new();
    let mut warnings = Vec::new();

    check_completeness(nodes, &mut errors, &mut warnings);
    check_cycles(nodes, edges, &mut errors);
    check_parameters(nodes, schemas, &mut errors);
    check_connections(nodes, edges, &mut errors);
    check_disconnected(nodes, edges, &mut warnings);
    check_reachability(nodes, edges, &mut warnings);
    check_duplicate_ids(nodes, &mut errors);
    let suggestions = suggest(&errors, &warnings);

    ValidationResult {
        valid: errors.is_empty(),
        errors,
        warnings,
        suggestions,
    }
}

/// Whether the graph can be run at all
///
/// Only missing start/end nodes and cycles block; parameter and connection
/// problems may still fail at runtime.
pub fn can_execute(nodes: &[GraphNode], edges: &[GraphEdge]) -> ExecutionCheck {
    let mut errors = Vec::new();
    let mut warnings = Vec::new();
    check_completeness(nodes, &mut errors, &mut warnings);
    check_cycles(nodes, edges, &mut errors);

    match errors.iter().find(|e| e.kind.blocks_execution()) {
        Some(blocking) => ExecutionCheck {
            can_execute: false,
            reason: Some(blocking.message.clone()),
        },
        None => ExecutionCheck {
            can_execute: true,
            reason: None,
        },
    }
}

fn check_completeness(
    nodes: &[GraphNode],
    errors: &mut Vec<ValidationError>,
    warnings: &mut Vec<ValidationWarning>,
) {
    let starts: Vec<&GraphNode> = nodes.iter().filter(|n| n.is_start()).collect();
    let has_end = nodes.iter().any(|n| n.is_end());

    if starts.is_empty() {
        errors.push(ValidationError::new(
            ValidationErrorKind::MissingStart,
            "Workflow has no start node",
        ));
    } else if starts.len() > 1 {
        warnings.push(ValidationWarning {
            kind: ValidationWarningKind::MultipleStart,
            message: format!(
                "Workflow has {} start nodes; only '{}' will run",
                starts.len(),
                starts[0].id
            ),
            node_id: Some(starts[0].id.clone()),
            details: serde_json::json!({
                "startNodes": starts.iter().map(|n| n.id.as_str()).collect::<Vec<_>>(),
            }),
        });
    }

    if !has_end {
        errors.push(ValidationError::new(
            ValidationErrorKind::MissingEnd,
            "Workflow has no end node",
        ));
    }
}

fn check_cycles(nodes: &[GraphNode], edges: &[GraphEdge], errors: &mut Vec<ValidationError>) {
    // Self-loops are reported as invalid connections.
    for cycle in DependencyGraph::build(nodes, edges).find_cycles() {
        if cycle.len() < 2 {
            continue;
        }
        let mut path = cycle.clone();
        path.push(cycle[0].clone());
        errors.push(
            ValidationError::new(
                ValidationErrorKind::Cycle,
                format!("Circular dependency: {}", path.join(" -> ")),
            )
            .with_nodes(cycle),
        );
    }
}

fn check_parameters(nodes: &[GraphNode], schemas: &dyn SchemaSource, errors: &mut Vec<ValidationError>) {
    for node in nodes {
        let Some(specs) = schemas.parameters(&node.kind) else {
            continue;
        };

        for spec in specs {
            let value = node.parameters.get(&spec.name).filter(|v| is_present(v));
            match value {
                None if spec.required => errors.push(
                    ValidationError::new(
                        ValidationErrorKind::MissingParameter,
                        format!("Node '{}' is missing required parameter '{}'", node.id, spec.label),
                    )
                    .with_nodes(vec![node.id.clone()])
                    .with_parameter(&spec.name),
                ),
                None => {}
                Some(value) => {
                    if let Err(reason) = check_value(spec, value) {
                        errors.push(
                            ValidationError::new(
                                ValidationErrorKind::InvalidParameter,
                                format!("Node '{}' parameter '{}' {}", node.id, spec.label, reason),
                            )
                            .with_nodes(vec![node.id.clone()])
                            .with_parameter(&spec.name),
                        );
                    }
                }
            }
        }
    }
}

fn is_present(value: &serde_json::Value) -> bool {
    match value {
        serde_json::Value::Null => false,
        serde_json::Value::String(s) => !s.trim().is_empty(),
        _ => true,
    }
}

/// Check a present value against its spec
///
/// A custom validator replaces the built-in type check.
fn check_value(spec: &ParameterSpec, value: &serde_json::Value) -> Result<(), String> {
    if let Some(validator) = &spec.validator {
        return validator.check(value);
    }

    match &spec.kind {
        ParameterKind::Number { min, max } => {
            let number = match value {
                serde_json::Value::Number(n) => n.as_f64(),
                serde_json::Value::String(s) => s.trim().parse::<f64>().ok(),
                _ => None,
            }
            .filter(|n| n.is_finite())
            .ok_or_else(|| "must be a number".to_string())?;

            if let Some(min) = min {
                if number < *min {
                    return Err(format!("must be at least {}", min));
                }
            }
            if let Some(max) = max {
                if number > *max {
                    return Err(format!("must be at most {}", max));
                }
            }
            Ok(())
        }
        ParameterKind::String => match value {
            serde_json::Value::String(_) => Ok(()),
            _ => Err("must be a non-empty string".to_string()),
        },
        ParameterKind::Enum { options } => match value.as_str() {
            Some(s) if options.iter().any(|o| o == s) => Ok(()),
            _ => Err(format!("must be one of: {}", options.join(", "))),
        },
        ParameterKind::Boolean => match value {
            serde_json::Value::Bool(_) => Ok(()),
            serde_json::Value::String(s) if s == "true" || s == "false" => Ok(()),
            _ => Err("must be true or false".to_string()),
        },
        ParameterKind::Json => match value {
            serde_json::Value::String(s) => serde_json::from_str::<serde_json::Value>(s)
                .map(|_| ())
                .map_err(|e| format!("is not valid JSON: {}", e)),
            _ => Ok(()),
        },
    }
}

fn check_connections(nodes: &[GraphNode], edges: &[GraphEdge], errors: &mut Vec<ValidationError>) {
    let node_ids: HashSet<&str> = nodes.iter().map(|n| n.id.as_str()).collect();

    for edge in edges {
        for (role, endpoint) in [("source", &edge.source), ("target", &edge.target)] {
            if !node_ids.contains(endpoint.as_str()) {
                errors.push(
                    ValidationError::new(
                        ValidationErrorKind::InvalidConnection,
                        format!("Edge '{}' references unknown {} node '{}'", edge.id, role, endpoint),
                    )
                    .with_edge(&edge.id),
                );
            }
        }

        if edge.is_self_loop() {
            errors.push(
                ValidationError::new(
                    ValidationErrorKind::InvalidConnection,
                    format!("Edge '{}' connects node '{}' to itself", edge.id, edge.source),
                )
                .with_edge(&edge.id)
                .with_nodes(vec![edge.source.clone()]),
            );
        }
    }
}

fn check_disconnected(nodes: &[GraphNode], edges: &[GraphEdge], warnings: &mut Vec<ValidationWarning>) {
    let connected: HashSet<&str> = edges
        .iter()
        .flat_map(|e| [e.source.as_str(), e.target.as_str()])
        .collect();

    let mut seen = HashSet::new();
    for node in nodes {
        if node.is_start() || node.is_end() || !seen.insert(node.id.as_str()) {
            continue;
        }
        if !connected.contains(node.id.as_str()) {
            warnings.push(ValidationWarning {
                kind: ValidationWarningKind::DisconnectedNode,
                message: format!("Node '{}' has no connections", node.id),
                node_id: Some(node.id.clone()),
                details: serde_json::Value::Null,
            });
        }
    }
}

fn check_reachability(nodes: &[GraphNode], edges: &[GraphEdge], warnings: &mut Vec<ValidationWarning>) {
    let Some(start) = nodes.iter().find(|n| n.is_start()) else {
        return;
    };

    let mut outgoing: HashMap<&str, Vec<&str>> = HashMap::new();
    for edge in edges {
        outgoing
            .entry(edge.source.as_str())
            .or_default()
            .push(edge.target.as_str());
    }

    let mut reached: HashSet<&str> = HashSet::from([start.id.as_str()]);
    let mut queue: VecDeque<&str> = VecDeque::from([start.id.as_str()]);
    while let Some(current) = queue.pop_front() {
        for &next in outgoing.get(current).into_iter().flatten() {
            if reached.insert(next) {
                queue.push_back(next);
            }
        }
    }

    let mut seen = HashSet::new();
    for node in nodes {
        if !seen.insert(node.id.as_str()) || reached.contains(node.id.as_str()) {
            continue;
        }
        warnings.push(ValidationWarning {
            kind: ValidationWarningKind::UnreachableNode,
            message: format!("Node '{}' is not reachable from start node '{}'", node.id, start.id),
            node_id: Some(node.id.clone()),
            details: serde_json::json!({"start": start.id}),
        });
    }
}

fn check_duplicate_ids(nodes: &[GraphNode], errors: &mut Vec<ValidationError>) {
    let mut counts: HashMap<&str, usize> = HashMap::new();
    let mut order = Vec::new();
    for node in nodes {
        let count = counts.entry(node.id.as_str()).or_insert(0);
        if *count == 0 {
            order.push(node.id.as_str());
        }
        *count += 1;
    }

    for id in order {
        let count = counts[id];
        if count > 1 {
            errors.push(
                ValidationError::new(
                    ValidationErrorKind::DuplicateId,
                    format!("Node id '{}' is used {} times", id, count),
                )
                .with_nodes(vec![id.to_string()])
                .with_details(serde_json::json!({"count": count})),
            );
        }
    }
}

fn suggest(errors: &[ValidationError], warnings: &[ValidationWarning]) -> Vec<Suggestion> {
    let mut suggestions = Vec::new();

    for error in errors {
        let node_id = error.node_ids.first().cloned();
        let suggestion = match error.kind {
            ValidationErrorKind::MissingStart => Suggestion {
                kind: SuggestionKind::AddStart,
                message: "Add a start node".to_string(),
                node_id: None,
                auto_fixable: true,
                details: serde_json::json!({"nodeKind": kinds::START}),
            },
            ValidationErrorKind::MissingEnd => Suggestion {
                kind: SuggestionKind::AddEnd,
                message: "Add an end node".to_string(),
                node_id: None,
                auto_fixable: true,
                details: serde_json::json!({"nodeKind": kinds::END}),
            },
            ValidationErrorKind::MissingParameter | ValidationErrorKind::InvalidParameter => Suggestion {
                kind: SuggestionKind::FixParameter,
                message: format!(
                    "Set a valid value for '{}' on node '{}'",
                    error.parameter.as_deref().unwrap_or_default(),
                    node_id.as_deref().unwrap_or_default()
                ),
                node_id,
                auto_fixable: false,
                details: serde_json::json!({"parameter": error.parameter}),
            },
            ValidationErrorKind::Cycle => Suggestion {
                kind: SuggestionKind::BreakCycle,
                message: format!("Remove one edge of the cycle {}", error.node_ids.join(" -> ")),
                node_id,
                auto_fixable: false,
                details: serde_json::json!({"cycle": error.node_ids}),
            },
            _ => continue,
        };
        suggestions.push(suggestion);
    }

    for warning in warnings {
        if warning.kind == ValidationWarningKind::DisconnectedNode {
            suggestions.push(Suggestion {
                kind: SuggestionKind::ConnectNode,
                message: format!(
                    "Connect node '{}' to the workflow or remove it",
                    warning.node_id.as_deref().unwrap_or_default()
                ),
                node_id: warning.node_id.clone(),
                auto_fixable: false,
                details: serde_json::Value::Null,
            });
        }
    }

    suggestions
}
