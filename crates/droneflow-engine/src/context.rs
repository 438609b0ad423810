//! Run-scoped execution state
//!
//! One `ExecutionContext` exists per run. Only the engine mutates it; hosts
//! and handlers see copies (`snapshot`), so there is never a second writer.

use std::collections::HashMap;

use chrono::Local;
use serde::{Deserialize, Serialize};

use crate::types::NodeId;

/// Mutable state shared across all node executions in one run
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionContext {
    /// Scratch space written by handlers and read by later nodes
    pub variables: HashMap<String, serde_json::Value>,
    /// Per-node results keyed by node id
    pub results: HashMap<NodeId, serde_json::Value>,
    /// Timestamped log lines in append order
    pub logs: Vec<String>,
    /// Node currently being dispatched (sequential mode)
    pub current_node: Option<NodeId>,
    /// Whether a run is in progress
    pub is_running: bool,
    /// Whether cooperative cancellation has been requested
    pub should_stop: bool,
}

impl ExecutionContext {
    /// Create an empty context
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a context seeded with initial variables
    pub fn with_variables(variables: HashMap<String, serde_json::Value>) -> Self {
        Self {
            variables,
            ..Self::default()
        }
    }

    /// Append a timestamped line and return it
    pub fn log(&mut self, message: impl AsRef<str>) -> String {
        let line = format!("[{}] {}", Local::now().format("%H:%M:%S%.3f"), message.as_ref());
        self.logs.push(line.clone());
        line
    }

    /// Get a variable
    pub fn variable(&self, key: &str) -> Option<&serde_json::Value> {
        self.variables.get(key)
    }

    /// Set a variable
    pub fn set_variable(&mut self, key: impl Into<String>, value: serde_json::Value) {
        self.variables.insert(key.into(), value);
    }

    /// Get a node's recorded result
    pub fn result(&self, node_id: &str) -> Option<&serde_json::Value> {
        self.results.get(node_id)
    }

    /// Record a node's result
    pub fn set_result(&mut self, node_id: impl Into<NodeId>, value: serde_json::Value) {
        self.results.insert(node_id.into(), value);
    }

    /// Read-only copy for callers
    pub fn snapshot(&self) -> ExecutionContext {
        self.clone()
    }
}
