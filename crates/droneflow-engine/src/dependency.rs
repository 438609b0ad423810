//! Dependency analysis and execution-level scheduling
//!
//! Builds the adjacency model for a workflow (a target depends on its
//! source), detects cycles, and partitions nodes into execution levels where
//! every node's dependencies are satisfied by strictly earlier levels. Nodes
//! in the same level can run concurrently.
//!
//! The analyzer is pure: it owns an immutable copy of the nodes it was built
//! from and never touches execution state, so hosts can query it while a run
//! is in flight.

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::error::{EngineError, Result};
use crate::types::{GraphEdge, GraphNode, NodeId};

/// Adjacency for a single node
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeAdjacency {
    /// Nodes that must complete before this one (edge sources)
    pub dependencies: Vec<NodeId>,
    /// Nodes waiting on this one (edge targets)
    pub dependents: Vec<NodeId>,
}

/// A set of nodes that can execute concurrently
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionGroup {
    /// Zero-based level index
    pub level: usize,
    /// Nodes in this level, in declaration order
    pub nodes: Vec<GraphNode>,
}

impl ExecutionGroup {
    /// IDs of the nodes in this level
    pub fn node_ids(&self) -> Vec<&str> {
        self.nodes.iter().map(|n| n.id.as_str()).collect()
    }
}

/// Longest dependency chain through the graph
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CriticalPath {
    /// Node IDs from root to leaf
    pub path: Vec<NodeId>,
    /// Number of nodes on the path
    pub length: usize,
}

/// Scheduling statistics for a workflow
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionStats {
    /// Number of nodes in the graph
    pub total_nodes: usize,
    /// Size of the widest level
    pub max_parallelism: usize,
    /// Number of execution levels
    pub level_count: usize,
    /// Node count of the critical path
    pub critical_path_length: usize,
    /// Mean level width
    pub avg_nodes_per_level: f64,
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Mark {
    White,
    Gray,
    Black,
}

/// Derived dependency model for a workflow
///
/// Built once per run from the node and edge lists and read-only afterward.
/// Rebuild it whenever the node or edge set changes.
#[derive(Debug, Clone, Default)]
pub struct DependencyGraph {
    /// Nodes in declaration order (first occurrence wins for duplicate ids)
    nodes: Vec<GraphNode>,
    adjacency: HashMap<NodeId, NodeAdjacency>,
}

impl DependencyGraph {
    /// Build the adjacency model from nodes and edges
    ///
    /// Edges that reference unknown nodes are ignored here; reporting them is
    /// the validator's job. Parallel edges contribute a single dependency.
    pub fn build(nodes: &[GraphNode], edges: &[GraphEdge]) -> Self {
        let mut ordered = Vec::with_capacity(nodes.len());
        let mut adjacency: HashMap<NodeId, NodeAdjacency> = HashMap::new();

        for node in nodes {
            if adjacency.contains_key(&node.id) {
                continue;
            }
            adjacency.insert(node.id.clone(), NodeAdjacency::default());
            ordered.push(node.clone());
        }

        for edge in edges {
            if !adjacency.contains_key(&edge.source) || !adjacency.contains_key(&edge.target) {
                log::debug!(
                    "Ignoring edge '{}' with unknown endpoint ({} -> {})",
                    edge.id,
                    edge.source,
                    edge.target
                );
                continue;
            }

            if let Some(target) = adjacency.get_mut(&edge.target) {
                if !target.dependencies.contains(&edge.source) {
                    target.dependencies.push(edge.source.clone());
                }
            }
            if let Some(source) = adjacency.get_mut(&edge.source) {
                if !source.dependents.contains(&edge.target) {
                    source.dependents.push(edge.target.clone());
                }
            }
        }

        Self {
            nodes: ordered,
            adjacency,
        }
    }

    /// Number of distinct nodes
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Whether the graph has no nodes
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Nodes in declaration order
    pub fn nodes(&self) -> &[GraphNode] {
        &self.nodes
    }

    /// Adjacency entry for a node
    pub fn adjacency(&self, node_id: &str) -> Option<&NodeAdjacency> {
        self.adjacency.get(node_id)
    }

    /// Upstream nodes of `node_id`
    pub fn dependencies_of(&self, node_id: &str) -> &[NodeId] {
        self.adjacency
            .get(node_id)
            .map(|a| a.dependencies.as_slice())
            .unwrap_or(&[])
    }

    /// Downstream nodes of `node_id`
    pub fn dependents_of(&self, node_id: &str) -> &[NodeId] {
        self.adjacency
            .get(node_id)
            .map(|a| a.dependents.as_slice())
            .unwrap_or(&[])
    }

    /// Nodes with no dependencies, in declaration order
    pub fn roots(&self) -> Vec<&GraphNode> {
        self.nodes
            .iter()
            .filter(|n| self.dependencies_of(&n.id).is_empty())
            .collect()
    }

    /// Partition the graph into execution levels
    ///
    /// Breadth-first topological sweep: level 0 is every dependency-free
    /// node; each following level is the set of dependents whose whole
    /// dependency set has already been scheduled. Fails with
    /// `CircularDependency` when no root exists, when the level count exceeds
    /// the node count, or when nodes remain unscheduled after the sweep.
    pub fn levels(&self) -> Result<Vec<ExecutionGroup>> {
        if self.nodes.is_empty() {
            return Ok(Vec::new());
        }

        let by_id: HashMap<&str, &GraphNode> =
            self.nodes.iter().map(|n| (n.id.as_str(), n)).collect();

        let mut current: Vec<&GraphNode> = self.roots();
        if current.is_empty() {
            return Err(EngineError::CircularDependency(
                "no node is free of dependencies".to_string(),
            ));
        }

        let mut visited: HashSet<&str> = HashSet::new();
        let mut groups = Vec::new();

        while !current.is_empty() {
            if groups.len() >= self.nodes.len() {
                return Err(EngineError::CircularDependency(format!(
                    "level count exceeded node count ({})",
                    self.nodes.len()
                )));
            }

            for node in &current {
                visited.insert(node.id.as_str());
            }

            let mut next: Vec<&GraphNode> = Vec::new();
            let mut queued: HashSet<&str> = HashSet::new();
            for node in &current {
                for dependent in self.dependents_of(&node.id) {
                    let dependent = dependent.as_str();
                    if visited.contains(dependent) || queued.contains(dependent) {
                        continue;
                    }
                    let ready = self
                        .dependencies_of(dependent)
                        .iter()
                        .all(|dep| visited.contains(dep.as_str()));
                    if ready {
                        if let Some(&next_node) = by_id.get(dependent) {
                            queued.insert(dependent);
                            next.push(next_node);
                        }
                    }
                }
            }

            groups.push(ExecutionGroup {
                level: groups.len(),
                nodes: current.into_iter().cloned().collect(),
            });
            current = next;
        }

        if visited.len() < self.nodes.len() {
            let stranded: Vec<&str> = self
                .nodes
                .iter()
                .map(|n| n.id.as_str())
                .filter(|id| !visited.contains(id))
                .collect();
            return Err(EngineError::CircularDependency(format!(
                "nodes never became ready: {}",
                stranded.join(", ")
            )));
        }

        Ok(groups)
    }

    /// Whether the graph contains any cycle (self-loops included)
    pub fn has_cycle(&self) -> bool {
        let mut found = false;
        self.walk_back_edges(|_, _| {
            found = true;
            true
        });
        found
    }

    /// Every cycle found by a white/gray/black DFS, as ordered node ids
    ///
    /// Each back edge yields one cycle: the stack segment from the node the
    /// back edge points at down to the node it leaves from. A self-loop is a
    /// one-node cycle.
    pub fn find_cycles(&self) -> Vec<Vec<NodeId>> {
        let mut cycles: Vec<Vec<NodeId>> = Vec::new();
        self.walk_back_edges(|stack, target| {
            if let Some(start) = stack.iter().position(|id| *id == target) {
                cycles.push(stack[start..].iter().map(|id| id.to_string()).collect());
            }
            false
        });
        cycles
    }

    /// Depth-first walk over dependents with an explicit stack
    ///
    /// `on_back_edge` receives the gray stack and the node the back edge
    /// points at. Returning `true` ends the walk.
    fn walk_back_edges<'a>(&'a self, mut on_back_edge: impl FnMut(&[&'a str], &'a str) -> bool) {
        let mut marks: HashMap<&'a str, Mark> =
            self.nodes.iter().map(|n| (n.id.as_str(), Mark::White)).collect();
        let mut stack: Vec<&'a str> = Vec::new();
        // (node, index of the next dependent to look at)
        let mut frames: Vec<(&'a str, usize)> = Vec::new();

        for node in &self.nodes {
            if marks.get(node.id.as_str()) != Some(&Mark::White) {
                continue;
            }
            marks.insert(node.id.as_str(), Mark::Gray);
            stack.push(node.id.as_str());
            frames.push((node.id.as_str(), 0));

            while let Some(frame) = frames.last_mut() {
                let (node_id, next) = *frame;
                let Some(dependent) = self.dependents_of(node_id).get(next) else {
                    marks.insert(node_id, Mark::Black);
                    stack.pop();
                    frames.pop();
                    continue;
                };
                frame.1 += 1;

                match marks.get(dependent.as_str()) {
                    Some(Mark::Gray) => {
                        if on_back_edge(&stack, dependent.as_str()) {
                            return;
                        }
                    }
                    Some(Mark::White) => {
                        marks.insert(dependent.as_str(), Mark::Gray);
                        stack.push(dependent.as_str());
                        frames.push((dependent.as_str(), 0));
                    }
                    _ => {}
                }
            }
        }
    }

    /// Longest root-to-leaf chain
    ///
    /// Roots are explored in declaration order and dependents in edge order;
    /// on ties the first path found is kept. Fails on cyclic graphs.
    pub fn critical_path(&self) -> Result<CriticalPath> {
        if self.has_cycle() {
            return Err(EngineError::CircularDependency(
                "critical path is undefined for cyclic graphs".to_string(),
            ));
        }

        let chains = self.longest_chains();
        let mut best: Option<(&str, usize)> = None;
        for root in self.roots() {
            let length = chains.get(root.id.as_str()).map_or(1, |c| c.0);
            if best.map_or(true, |(_, l)| length > l) {
                best = Some((root.id.as_str(), length));
            }
        }

        let mut path = Vec::new();
        let mut cursor = best.map(|(id, _)| id);
        while let Some(id) = cursor {
            path.push(id.to_string());
            cursor = chains.get(id).and_then(|c| c.1);
        }

        Ok(CriticalPath {
            length: path.len(),
            path,
        })
    }

    /// Length of the longest chain starting at each node, and the dependent
    /// that continues it
    ///
    /// Post-order over an explicit stack. The graph must be acyclic.
    fn longest_chains(&self) -> HashMap<&str, (usize, Option<&str>)> {
        let mut chains: HashMap<&str, (usize, Option<&str>)> = HashMap::new();
        let mut frames: Vec<(&str, usize)> = Vec::new();

        for root in self.roots() {
            if chains.contains_key(root.id.as_str()) {
                continue;
            }
            frames.push((root.id.as_str(), 0));

            while let Some(frame) = frames.last_mut() {
                let (node_id, next) = *frame;
                let dependents = self.dependents_of(node_id);
                if let Some(dependent) = dependents.get(next) {
                    frame.1 += 1;
                    if !chains.contains_key(dependent.as_str()) {
                        frames.push((dependent.as_str(), 0));
                    }
                    continue;
                }

                let mut tail: (usize, Option<&str>) = (0, None);
                for dependent in dependents {
                    let length = chains.get(dependent.as_str()).map_or(0, |c| c.0);
                    if length > tail.0 {
                        tail = (length, Some(dependent.as_str()));
                    }
                }
                chains.insert(node_id, (tail.0 + 1, tail.1));
                frames.pop();
            }
        }
        chains
    }

    /// Scheduling statistics
    pub fn stats(&self) -> Result<ExecutionStats> {
        let levels = self.levels()?;
        let critical = self.critical_path()?;

        let max_parallelism = levels.iter().map(|g| g.nodes.len()).max().unwrap_or(0);
        let avg_nodes_per_level = if levels.is_empty() {
            0.0
        } else {
            self.nodes.len() as f64 / levels.len() as f64
        };

        Ok(ExecutionStats {
            total_nodes: self.nodes.len(),
            max_parallelism,
            level_count: levels.len(),
            critical_path_length: critical.length,
            avg_nodes_per_level,
        })
    }
}
