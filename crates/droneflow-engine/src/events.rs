//! Run events for hosts that mirror mission progress
//!
//! Events are sent from the engine to the host UI (or any consumer) to report
//! run progress, log lines, node outcomes and context snapshots.

use serde::{Deserialize, Serialize};

use crate::context::ExecutionContext;

/// Destination for run events
///
/// Hosts plug in whatever transport they use (a UI channel, a socket, a log).
pub trait EventSink: Send + Sync {
    /// Deliver one event; failures are logged by the engine and never stop a run
    fn send(&self, event: WorkflowEvent) -> Result<(), EventError>;
}

/// Delivery failure reported by a sink
#[derive(Debug, Clone)]
pub struct EventError {
    pub message: String,
}

impl std::fmt::Display for EventError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Event delivery failed: {}", self.message)
    }
}

impl std::error::Error for EventError {}

/// Everything the engine reports while a workflow runs
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum WorkflowEvent {
    /// A run began
    #[serde(rename_all = "camelCase")]
    WorkflowStarted {
        workflow_id: String,
        execution_id: String,
        mode: String,
    },

    /// Every reachable node resolved without an abort
    #[serde(rename_all = "camelCase")]
    WorkflowCompleted {
        workflow_id: String,
        execution_id: String,
        nodes_executed: usize,
    },

    /// Workflow stopped on request before finishing
    #[serde(rename_all = "camelCase")]
    WorkflowStopped {
        workflow_id: String,
        execution_id: String,
    },

    /// Workflow aborted by a fatal node failure
    #[serde(rename_all = "camelCase")]
    WorkflowAborted {
        workflow_id: String,
        execution_id: String,
        error: String,
    },

    /// An execution level started (parallel mode)
    #[serde(rename_all = "camelCase")]
    LevelStarted {
        execution_id: String,
        level: usize,
        node_ids: Vec<String>,
    },

    /// A node started executing
    #[serde(rename_all = "camelCase")]
    NodeStarted {
        node_id: String,
        execution_id: String,
        kind: String,
    },

    /// A node completed successfully
    #[serde(rename_all = "camelCase")]
    NodeCompleted {
        node_id: String,
        execution_id: String,
        result: serde_json::Value,
    },

    /// A node failed and was skipped
    #[serde(rename_all = "camelCase")]
    NodeSkipped {
        node_id: String,
        execution_id: String,
        error: String,
    },

    /// A node failed and its fallback result was used
    #[serde(rename_all = "camelCase")]
    NodeFallback {
        node_id: String,
        execution_id: String,
        error: String,
    },

    /// A node failed fatally
    #[serde(rename_all = "camelCase")]
    NodeFailed {
        node_id: String,
        execution_id: String,
        error: String,
    },

    /// A line was appended to the run log
    #[serde(rename_all = "camelCase")]
    Log { execution_id: String, line: String },

    /// The execution context changed
    #[serde(rename_all = "camelCase")]
    ContextUpdated {
        execution_id: String,
        snapshot: ExecutionContext,
    },
}

/// Sink that drops every event
pub struct NullEventSink;

impl EventSink for NullEventSink {
    fn send(&self, _event: WorkflowEvent) -> Result<(), EventError> {
        Ok(())
    }
}

/// Sink that keeps every event in memory, for assertions and dry runs
pub struct VecEventSink {
    events: parking_lot::Mutex<Vec<WorkflowEvent>>,
}

impl VecEventSink {
    pub fn new() -> Self {
        Self {
            events: parking_lot::Mutex::new(Vec::new()),
        }
    }

    /// Events received so far, in order
    pub fn events(&self) -> Vec<WorkflowEvent> {
        self.events.lock().clone()
    }

    /// Collected log lines, in order
    pub fn log_lines(&self) -> Vec<String> {
        self.events
            .lock()
            .iter()
            .filter_map(|e| match e {
                WorkflowEvent::Log { line, .. } => Some(line.clone()),
                _ => None,
            })
            .collect()
    }

    /// Forget everything received so far
    pub fn clear(&self) {
        self.events.lock().clear();
    }
}

impl Default for VecEventSink {
    fn default() -> Self {
        Self::new()
    }
}

impl EventSink for VecEventSink {
    fn send(&self, event: WorkflowEvent) -> Result<(), EventError> {
        self.events.lock().push(event);
        Ok(())
    }
}

/// Event sink backed by a host callback
///
/// Hosts use this to receive context snapshots and log lines without
/// implementing the trait themselves.
pub struct CallbackEventSink {
    callback: Box<dyn Fn(WorkflowEvent) + Send + Sync>,
}

impl CallbackEventSink {
    pub fn new(callback: impl Fn(WorkflowEvent) + Send + Sync + 'static) -> Self {
        Self {
            callback: Box::new(callback),
        }
    }
}

impl EventSink for CallbackEventSink {
    fn send(&self, event: WorkflowEvent) -> Result<(), EventError> {
        (self.callback)(event);
        Ok(())
    }
}
