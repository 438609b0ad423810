//! Fluent builder for workflow graphs
//!
//! Provides a compact API for constructing graphs programmatically.

use crate::types::{GraphEdge, GraphNode, WorkflowGraph};

/// Chainable construction of a [`WorkflowGraph`]
///
/// # Example
///
/// ```ignore
/// let graph = WorkflowBuilder::new("wf-1", "Square patrol")
///     .add_node("start", "start")
///     .add_node("up", "takeoff")
///     .with_parameter("height", serde_json::json!(1.2))
///     .add_node("end", "end")
///     .connect("start", "up")
///     .connect("up", "end")
///     .build();
/// ```
pub struct WorkflowBuilder {
    id: String,
    name: String,
    nodes: Vec<GraphNode>,
    edges: Vec<GraphEdge>,
    edge_counter: usize,
}

impl WorkflowBuilder {
    /// Start an empty graph
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            nodes: Vec::new(),
            edges: Vec::new(),
            edge_counter: 0,
        }
    }

    /// Append a node with no parameters
    pub fn add_node(mut self, id: impl Into<String>, kind: impl Into<String>) -> Self {
        self.nodes.push(GraphNode::new(id, kind));
        self
    }

    /// Set a parameter on the most recently added node
    ///
    /// Must be called after `add_node`.
    pub fn with_parameter(mut self, name: impl Into<String>, value: serde_json::Value) -> Self {
        if let Some(node) = self.nodes.last_mut() {
            node.parameters.insert(name.into(), value);
        }
        self
    }

    /// Connect two nodes; the edge id is `edge-<n>`
    pub fn connect(mut self, source: impl Into<String>, target: impl Into<String>) -> Self {
        self.edge_counter += 1;
        self.edges.push(GraphEdge::new(
            format!("edge-{}", self.edge_counter),
            source,
            target,
        ));
        self
    }

    /// Add a labeled branch edge (auto-generates edge ID)
    pub fn connect_labeled(
        mut self,
        source: impl Into<String>,
        target: impl Into<String>,
        label: impl Into<String>,
    ) -> Self {
        self.edge_counter += 1;
        self.edges.push(
            GraphEdge::new(format!("edge-{}", self.edge_counter), source, target).with_label(label),
        );
        self
    }

    /// Connect two nodes under a caller-chosen edge id
    pub fn connect_with_id(
        mut self,
        edge_id: impl Into<String>,
        source: impl Into<String>,
        target: impl Into<String>,
    ) -> Self {
        self.edges.push(GraphEdge::new(edge_id, source, target));
        self
    }

    /// Finish the graph; nothing is validated here
    pub fn build(self) -> WorkflowGraph {
        let mut graph = WorkflowGraph::new(self.id, self.name);
        graph.nodes = self.nodes;
        graph.edges = self.edges;
        graph
    }
}
