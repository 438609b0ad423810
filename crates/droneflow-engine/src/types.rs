//! Core types for workflow graphs
//!
//! These types define the persisted `{nodes, edges}` document the engine
//! executes. Everything else (adjacency, levels) is derived from them.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Unique identifier for a node
pub type NodeId = String;

/// Unique identifier for an edge
pub type EdgeId = String;

/// Free-form node parameters as edited in the UI
pub type Parameters = serde_json::Map<String, serde_json::Value>;

/// Well-known node kinds the engine itself cares about
pub mod kinds {
    /// Entry node of every workflow
    pub const START: &str = "start";
    /// Terminal node of a workflow
    pub const END: &str = "end";
    /// Boolean branch node
    pub const CONDITION_BRANCH: &str = "condition_branch";
}

/// A node instance in a workflow
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphNode {
    /// Unique identifier for this node instance
    pub id: NodeId,
    /// Node kind (resolved against the node registry)
    #[serde(alias = "type")]
    pub kind: String,
    /// Parameter values for this instance
    #[serde(default)]
    pub parameters: Parameters,
}

impl GraphNode {
    /// Create a node with no parameters
    pub fn new(id: impl Into<String>, kind: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            kind: kind.into(),
            parameters: Parameters::new(),
        }
    }

    /// Set a parameter value
    pub fn with_parameter(mut self, name: impl Into<String>, value: serde_json::Value) -> Self {
        self.parameters.insert(name.into(), value);
        self
    }

    /// Whether this is a start node
    pub fn is_start(&self) -> bool {
        self.kind == kinds::START
    }

    /// Whether this is an end node
    pub fn is_end(&self) -> bool {
        self.kind == kinds::END
    }
}

/// A directed edge; the target depends on the source
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphEdge {
    /// Unique identifier for this edge
    pub id: EdgeId,
    /// Source node ID
    pub source: NodeId,
    /// Target node ID
    pub target: NodeId,
    /// Explicit branch label ("true" / "false") for branch nodes
    #[serde(default, skip_serializing_if = "Option::is_none", alias = "sourceHandle")]
    pub label: Option<String>,
}

impl GraphEdge {
    /// Create an unlabeled edge
    pub fn new(id: impl Into<String>, source: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            source: source.into(),
            target: target.into(),
            label: None,
        }
    }

    /// Attach a branch label
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    /// Whether source and target are the same node
    pub fn is_self_loop(&self) -> bool {
        self.source == self.target
    }
}

/// A complete workflow graph
///
/// Edge order is significant: positional branch selection follows the order
/// in which a branch node's outgoing edges were declared.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowGraph {
    /// Identifier for this workflow
    #[serde(default)]
    pub id: String,
    /// Human-readable name
    #[serde(default)]
    pub name: String,
    /// Nodes in declaration order
    #[serde(default)]
    pub nodes: Vec<GraphNode>,
    /// Edges in declaration order
    #[serde(default)]
    pub edges: Vec<GraphEdge>,
}

impl WorkflowGraph {
    /// Create a new empty graph
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            nodes: Vec::new(),
            edges: Vec::new(),
        }
    }

    /// Parse a graph from its JSON document
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Serialize the graph to pretty JSON
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Load a graph document from disk
    pub async fn load(path: impl AsRef<Path>) -> Result<Self> {
        let contents = tokio::fs::read_to_string(path).await?;
        Self::from_json(&contents)
    }

    /// Find a node by ID
    pub fn find_node(&self, id: &str) -> Option<&GraphNode> {
        self.nodes.iter().find(|n| n.id == id)
    }

    /// All start nodes, in declaration order
    pub fn start_nodes(&self) -> Vec<&GraphNode> {
        self.nodes.iter().filter(|n| n.is_start()).collect()
    }

    /// All end nodes, in declaration order
    pub fn end_nodes(&self) -> Vec<&GraphNode> {
        self.nodes.iter().filter(|n| n.is_end()).collect()
    }

    /// Get edges going out of a node, in declaration order
    pub fn outgoing_edges<'a>(&'a self, node_id: &'a str) -> impl Iterator<Item = &'a GraphEdge> + 'a {
        self.edges.iter().filter(move |e| e.source == node_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_document() {
        let json = r#"{
            "nodes": [
                {"id": "s", "type": "start"},
                {"id": "t", "kind": "takeoff", "parameters": {"height": 1.5}},
                {"id": "e", "kind": "end"}
            ],
            "edges": [
                {"id": "e1", "source": "s", "target": "t"},
                {"id": "e2", "source": "t", "target": "e", "sourceHandle": "true"}
            ]
        }"#;

        let graph = WorkflowGraph::from_json(json).unwrap();
        assert_eq!(graph.nodes.len(), 3);
        assert_eq!(graph.nodes[0].kind, "start");
        assert_eq!(graph.nodes[1].parameters["height"], serde_json::json!(1.5));
        assert_eq!(graph.edges[1].label.as_deref(), Some("true"));
        assert_eq!(graph.start_nodes().len(), 1);
        assert_eq!(graph.end_nodes().len(), 1);
    }

    #[test]
    fn test_outgoing_edges_keep_declaration_order() {
        let mut graph = WorkflowGraph::new("wf", "Test");
        graph.nodes.push(GraphNode::new("c", "condition_branch"));
        graph.edges.push(GraphEdge::new("e2", "c", "yes"));
        graph.edges.push(GraphEdge::new("e1", "c", "no"));

        let targets: Vec<&str> = graph.outgoing_edges("c").map(|e| e.target.as_str()).collect();
        assert_eq!(targets, vec!["yes", "no"]);
    }

    #[tokio::test]
    async fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("workflow.json");
        let graph = WorkflowGraph {
            id: "wf".to_string(),
            name: "Saved".to_string(),
            nodes: vec![GraphNode::new("s", "start")],
            edges: vec![],
        };
        tokio::fs::write(&path, graph.to_json().unwrap()).await.unwrap();

        let loaded = WorkflowGraph::load(&path).await.unwrap();
        assert_eq!(loaded, graph);
    }
}
