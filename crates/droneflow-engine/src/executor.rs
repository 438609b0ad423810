//! Workflow execution engine
//!
//! `ExecutionEngine` owns the execution context for a run and drives every
//! node through its registered handler, the error policy and the host's
//! command dispatcher.
//!
//! Two traversal modes are supported:
//!
//! - **Sequential**: a depth-first walk from the start node. Each node runs
//!   at most once per run. Branch nodes follow only the edge matching their
//!   boolean `condition` result (labeled edges by label, otherwise the first
//!   edge is the true branch and the second the false branch).
//! - **Parallel**: the dependency analyzer's levels run one after another;
//!   every node inside a level is dispatched concurrently and the level is a
//!   barrier. Branch results are recorded but do not prune the graph.
//!
//! Handlers never mutate the context. They return a [`NodeOutput`] and the
//! engine applies results and variable writes itself, so the context has a
//! single writer even while a level runs concurrently.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use futures_util::future::join_all;
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::config::{EngineConfig, ExecutionMode};
use crate::context::ExecutionContext;
use crate::dependency::{CriticalPath, DependencyGraph, ExecutionGroup, ExecutionStats};
use crate::dispatcher::{CommandDispatcher, TimeoutDispatcher};
use crate::error::{EngineError, Result};
use crate::events::{EventSink, NullEventSink, WorkflowEvent};
use crate::policy::{ErrorAction, ErrorPolicy, ErrorStats, FailureContext, NodeError};
use crate::registry::{NodeInvocation, NodeOutput, NodeRegistry};
use crate::types::{kinds, GraphNode, NodeId, WorkflowGraph};
use crate::validation::{validate_workflow, ValidationResult};

/// Lifecycle of the engine's current (or last) run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    #[default]
    Idle,
    Running,
    Completed,
    /// Ended early by `stop()` or a skip that does not continue
    Stopped,
    Aborted,
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Idle => "idle",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Stopped => "stopped",
            Self::Aborted => "aborted",
        };
        f.write_str(name)
    }
}

/// Summary of a run that completed or was stopped
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunReport {
    pub execution_id: String,
    pub workflow_id: String,
    pub mode: ExecutionMode,
    pub status: RunStatus,
    /// Nodes whose outcome was recorded, in the order they resolved
    pub executed_nodes: Vec<NodeId>,
    /// Final context
    pub context: ExecutionContext,
}

/// A workflow together with its dependency model
struct LoadedWorkflow {
    graph: WorkflowGraph,
    deps: DependencyGraph,
}

/// Per-run bookkeeping shared by the traversal and node execution
struct RunState {
    execution_id: String,
    workflow_id: String,
    cancel: CancellationToken,
    executed: Mutex<Vec<NodeId>>,
}

enum Flow {
    Completed,
    Stopped,
}

/// How a single node resolved after the error policy had its say
enum NodeOutcome {
    Completed(NodeOutput),
    Skipped { error: String, continue_workflow: bool },
    Fallback { error: String, value: serde_json::Value },
    Aborted { reason: String, cleanup: bool },
    Cancelled,
}

impl NodeOutcome {
    fn skipped_marker(error: &str) -> serde_json::Value {
        serde_json::json!({"status": "skipped", "error": error})
    }

    /// Value stored under the node id, if any
    fn recorded_result(&self) -> Option<serde_json::Value> {
        match self {
            Self::Completed(output) => Some(output.result.clone()),
            Self::Skipped { error, .. } => Some(Self::skipped_marker(error)),
            Self::Fallback { value, .. } => Some(value.clone()),
            Self::Aborted { .. } | Self::Cancelled => None,
        }
    }
}

/// Drives workflow runs against a node registry and a command dispatcher
pub struct ExecutionEngine {
    registry: Arc<NodeRegistry>,
    dispatcher: Arc<dyn CommandDispatcher>,
    config: EngineConfig,
    policy: ErrorPolicy,
    event_sink: Arc<dyn EventSink>,
    workflow: RwLock<Option<Arc<LoadedWorkflow>>>,
    context: Mutex<ExecutionContext>,
    status: Mutex<RunStatus>,
    cancel: Mutex<CancellationToken>,
}

impl ExecutionEngine {
    /// Create an engine
    ///
    /// When the config sets a dispatch timeout the dispatcher is wrapped in a
    /// [`TimeoutDispatcher`].
    pub fn new(registry: Arc<NodeRegistry>, dispatcher: Arc<dyn CommandDispatcher>, config: EngineConfig) -> Self {
        let dispatcher: Arc<dyn CommandDispatcher> = match config.dispatch_timeout() {
            Some(timeout) => Arc::new(TimeoutDispatcher::new(dispatcher, timeout)),
            None => dispatcher,
        };
        let policy = ErrorPolicy::from_config(config.policy.clone());

        Self {
            registry,
            dispatcher,
            config,
            policy,
            event_sink: Arc::new(NullEventSink),
            workflow: RwLock::new(None),
            context: Mutex::new(ExecutionContext::new()),
            status: Mutex::new(RunStatus::Idle),
            cancel: Mutex::new(CancellationToken::new()),
        }
    }

    /// Send run events to `sink`
    pub fn with_event_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.event_sink = sink;
        self
    }

    /// Replace the error policy
    pub fn with_policy(mut self, policy: ErrorPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Mutable access to the error policy (e.g. to register overrides)
    pub fn policy_mut(&mut self) -> &mut ErrorPolicy {
        &mut self.policy
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn registry(&self) -> &NodeRegistry {
        &self.registry
    }

    /// Load a workflow and rebuild its dependency model
    pub fn set_workflow(&self, graph: WorkflowGraph) -> Result<()> {
        if self.status() == RunStatus::Running {
            return Err(EngineError::AlreadyRunning);
        }
        let deps = DependencyGraph::build(&graph.nodes, &graph.edges);
        log::debug!(
            "Loaded workflow '{}' with {} nodes and {} edges",
            graph.id,
            graph.nodes.len(),
            graph.edges.len()
        );
        *self.workflow.write() = Some(Arc::new(LoadedWorkflow { graph, deps }));
        Ok(())
    }

    /// The loaded workflow, if any
    pub fn workflow(&self) -> Option<WorkflowGraph> {
        self.workflow.read().as_ref().map(|w| w.graph.clone())
    }

    fn loaded(&self) -> Result<Arc<LoadedWorkflow>> {
        self.workflow.read().clone().ok_or(EngineError::NoWorkflow)
    }

    /// Validate the loaded workflow against the registry's schemas
    pub fn validate(&self) -> Result<ValidationResult> {
        let workflow = self.loaded()?;
        Ok(validate_workflow(&workflow.graph, self.registry.as_ref()))
    }

    /// Scheduling statistics for the loaded workflow
    pub fn execution_stats(&self) -> Result<ExecutionStats> {
        self.loaded()?.deps.stats()
    }

    /// Execution levels for the loaded workflow
    pub fn execution_levels(&self) -> Result<Vec<ExecutionGroup>> {
        self.loaded()?.deps.levels()
    }

    /// Longest dependency chain of the loaded workflow
    pub fn critical_path(&self) -> Result<CriticalPath> {
        self.loaded()?.deps.critical_path()
    }

    /// Direct dependencies of a node
    pub fn node_dependencies(&self, node_id: &str) -> Result<Vec<NodeId>> {
        let workflow = self.loaded()?;
        workflow
            .deps
            .adjacency(node_id)
            .map(|a| a.dependencies.clone())
            .ok_or_else(|| EngineError::UnknownNode(node_id.to_string()))
    }

    /// Whether the loaded workflow contains a cycle
    pub fn has_circular_dependencies(&self) -> bool {
        self.workflow
            .read()
            .as_ref()
            .is_some_and(|w| w.deps.has_cycle())
    }

    pub fn error_stats(&self) -> ErrorStats {
        self.policy.error_stats()
    }

    pub fn error_history(&self) -> Vec<NodeError> {
        self.policy.error_history()
    }

    pub fn clear_error_history(&self) {
        self.policy.clear_error_history();
    }

    /// Copy of the current (or last) run's context
    pub fn context_snapshot(&self) -> ExecutionContext {
        self.context.lock().snapshot()
    }

    pub fn status(&self) -> RunStatus {
        *self.status.lock()
    }

    /// Request cooperative cancellation of the current run
    ///
    /// In-flight dispatches and timers are interrupted; no new node starts.
    pub fn stop(&self) {
        if self.status() != RunStatus::Running {
            log::debug!("Stop requested with no run in progress");
            return;
        }
        log::info!("Stop requested");
        self.context.lock().should_stop = true;
        self.cancel.lock().cancel();
    }

    /// Run the loaded workflow in the configured mode
    pub async fn run_configured(&self) -> Result<RunReport> {
        self.run(self.config.execution_mode).await
    }

    /// Run the loaded workflow
    ///
    /// Returns the report for completed and stopped runs; an abort is
    /// returned as [`EngineError::Aborted`] after the cleanup hook ran.
    pub async fn run(&self, mode: ExecutionMode) -> Result<RunReport> {
        self.run_with_variables(mode, HashMap::new()).await
    }

    /// Run the loaded workflow with the context seeded from `variables`
    pub async fn run_with_variables(
        &self,
        mode: ExecutionMode,
        variables: HashMap<String, serde_json::Value>,
    ) -> Result<RunReport> {
        let workflow = self.loaded()?;

        let levels = match mode {
            ExecutionMode::Sequential => {
                if workflow.graph.start_nodes().is_empty() {
                    return Err(EngineError::NoStartNode);
                }
                Vec::new()
            }
            ExecutionMode::Parallel => {
                if let Some(cycle) = workflow.deps.find_cycles().into_iter().next() {
                    return Err(EngineError::CircularDependency(cycle.join(" -> ")));
                }
                workflow.deps.levels()?
            }
        };

        let run = self.begin(&workflow.graph, variables)?;
        self.emit(WorkflowEvent::WorkflowStarted {
            workflow_id: run.workflow_id.clone(),
            execution_id: run.execution_id.clone(),
            mode: mode.to_string(),
        });
        self.log(
            &run,
            format!("Starting workflow '{}' in {} mode", workflow.graph.name, mode),
        );
        self.publish_context(&run);

        let flow = match mode {
            ExecutionMode::Sequential => self.run_sequential(&run, &workflow.graph).await,
            ExecutionMode::Parallel => self.run_parallel(&run, &levels).await,
        };

        self.finish(run, mode, flow)
    }

    fn begin(&self, graph: &WorkflowGraph, variables: HashMap<String, serde_json::Value>) -> Result<RunState> {
        {
            let mut status = self.status.lock();
            if *status == RunStatus::Running {
                return Err(EngineError::AlreadyRunning);
            }
            *status = RunStatus::Running;
        }

        let cancel = CancellationToken::new();
        *self.cancel.lock() = cancel.clone();
        *self.context.lock() = ExecutionContext {
            is_running: true,
            ..ExecutionContext::with_variables(variables)
        };
        self.policy.reset_retry_counts();

        Ok(RunState {
            execution_id: uuid::Uuid::new_v4().to_string(),
            workflow_id: graph.id.clone(),
            cancel,
            executed: Mutex::new(Vec::new()),
        })
    }

    fn finish(&self, run: RunState, mode: ExecutionMode, flow: Result<Flow>) -> Result<RunReport> {
        let (status, failure) = match flow {
            Ok(Flow::Completed) => (RunStatus::Completed, None),
            Ok(Flow::Stopped) => (RunStatus::Stopped, None),
            Err(err) => (RunStatus::Aborted, Some(err)),
        };

        match &failure {
            None if status == RunStatus::Completed => self.log(&run, "Workflow completed"),
            None => self.log(&run, "Workflow stopped"),
            Some(err) => self.log(&run, format!("Workflow aborted: {}", err)),
        }

        let context = {
            let mut context = self.context.lock();
            context.is_running = false;
            context.current_node = None;
            context.snapshot()
        };
        *self.status.lock() = status;
        self.publish_context(&run);

        let executed_nodes = std::mem::take(&mut *run.executed.lock());
        let workflow_id = run.workflow_id.clone();
        let execution_id = run.execution_id.clone();

        match failure {
            Some(err) => {
                self.emit(WorkflowEvent::WorkflowAborted {
                    workflow_id,
                    execution_id,
                    error: err.to_string(),
                });
                Err(err)
            }
            None => {
                let event = if status == RunStatus::Completed {
                    WorkflowEvent::WorkflowCompleted {
                        workflow_id: workflow_id.clone(),
                        execution_id: execution_id.clone(),
                        nodes_executed: executed_nodes.len(),
                    }
                } else {
                    WorkflowEvent::WorkflowStopped {
                        workflow_id: workflow_id.clone(),
                        execution_id: execution_id.clone(),
                    }
                };
                self.emit(event);
                Ok(RunReport {
                    execution_id,
                    workflow_id,
                    mode,
                    status,
                    executed_nodes,
                    context,
                })
            }
        }
    }

    async fn run_sequential(&self, run: &RunState, graph: &WorkflowGraph) -> Result<Flow> {
        let starts = graph.start_nodes();
        let start = starts.first().ok_or(EngineError::NoStartNode)?;
        if starts.len() > 1 {
            self.log(
                run,
                format!("Found {} start nodes, running from '{}'", starts.len(), start.id),
            );
        }

        let mut pending: Vec<NodeId> = vec![start.id.clone()];
        let mut visited: HashSet<NodeId> = HashSet::new();

        while let Some(node_id) = pending.pop() {
            if !visited.insert(node_id.clone()) {
                continue;
            }
            if self.stop_requested(run) {
                self.log(run, "Stop requested, no further nodes will start");
                return Ok(Flow::Stopped);
            }
            let Some(node) = graph.find_node(&node_id) else {
                log::warn!("Edge points at unknown node '{}', ignoring", node_id);
                continue;
            };

            let variables = {
                let mut context = self.context.lock();
                context.current_node = Some(node.id.clone());
                context.variables.clone()
            };

            let outcome = self.execute_node(run, node, &variables).await;
            self.apply_outcome(run, node, &outcome);

            match &outcome {
                NodeOutcome::Aborted { reason, cleanup } => {
                    if *cleanup {
                        self.run_cleanup(run).await;
                    }
                    return Err(EngineError::Aborted {
                        node_id: node.id.clone(),
                        reason: reason.clone(),
                    });
                }
                NodeOutcome::Cancelled => return Ok(Flow::Stopped),
                NodeOutcome::Skipped {
                    continue_workflow: false,
                    ..
                } => {
                    self.halt(run, &node.id);
                    return Ok(Flow::Stopped);
                }
                _ => {}
            }

            let result = outcome.recorded_result().unwrap_or_default();
            let successors = self.successors(run, graph, node, &result);
            // Reverse so the first declared edge is walked first.
            pending.extend(successors.into_iter().rev());
        }

        Ok(Flow::Completed)
    }

    async fn run_parallel(&self, run: &RunState, levels: &[ExecutionGroup]) -> Result<Flow> {
        for group in levels {
            if self.stop_requested(run) {
                self.log(run, "Stop requested, no further levels will start");
                return Ok(Flow::Stopped);
            }

            self.emit(WorkflowEvent::LevelStarted {
                execution_id: run.execution_id.clone(),
                level: group.level,
                node_ids: group.node_ids().into_iter().map(String::from).collect(),
            });
            self.log(
                run,
                format!("Executing level {} ({} node(s))", group.level, group.nodes.len()),
            );

            // Every node in the level sees the variables as they were at level start.
            let variables = self.context.lock().variables.clone();
            let outcomes = join_all(group.nodes.iter().map(|node| {
                let variables = &variables;
                async move {
                    let outcome = self.execute_node(run, node, variables).await;
                    if matches!(outcome, NodeOutcome::Aborted { .. }) {
                        run.cancel.cancel();
                    }
                    outcome
                }
            }))
            .await;

            let mut abort: Option<(NodeId, String, bool)> = None;
            let mut halted = false;
            for (node, outcome) in group.nodes.iter().zip(&outcomes) {
                self.apply_outcome(run, node, outcome);
                match outcome {
                    NodeOutcome::Aborted { reason, cleanup } if abort.is_none() => {
                        abort = Some((node.id.clone(), reason.clone(), *cleanup));
                    }
                    NodeOutcome::Skipped {
                        continue_workflow: false,
                        ..
                    } => {
                        self.halt(run, &node.id);
                        halted = true;
                    }
                    NodeOutcome::Cancelled => halted = true,
                    _ => {}
                }
            }

            if let Some((node_id, reason, cleanup)) = abort {
                if cleanup {
                    self.run_cleanup(run).await;
                }
                return Err(EngineError::Aborted { node_id, reason });
            }
            if halted {
                return Ok(Flow::Stopped);
            }
        }

        Ok(Flow::Completed)
    }

    /// Run one node through its handler and the error policy
    async fn execute_node(
        &self,
        run: &RunState,
        node: &GraphNode,
        variables: &HashMap<String, serde_json::Value>,
    ) -> NodeOutcome {
        self.emit(WorkflowEvent::NodeStarted {
            node_id: node.id.clone(),
            execution_id: run.execution_id.clone(),
            kind: node.kind.clone(),
        });
        self.log(run, format!("Executing node '{}' ({})", node.id, node.kind));

        let Some(handler) = self.registry.handler(&node.kind) else {
            self.log(
                run,
                format!("Unknown node type '{}' for node '{}', skipping", node.kind, node.id),
            );
            return NodeOutcome::Completed(NodeOutput::new(
                serde_json::json!({"status": "noop", "kind": node.kind}),
            ));
        };

        let invocation = NodeInvocation {
            node_id: &node.id,
            kind: &node.kind,
            parameters: &node.parameters,
            variables,
            dispatcher: self.dispatcher.as_ref(),
            cancel: &run.cancel,
        };
        let handler = handler.as_ref();
        let invocation = &invocation;
        let settings = self.policy.config();

        let first = self
            .policy
            .execute_with_retry(
                &node.id,
                settings.initial_retries,
                settings.retry_delay(),
                &run.cancel,
                move || handler.run(invocation),
            )
            .await;

        let error = match first {
            Ok(output) => return NodeOutcome::Completed(output),
            Err(err) if err.is_cancelled() => return NodeOutcome::Cancelled,
            Err(err) => err,
        };

        match self.policy.classify(&node.id, &node.kind, &error) {
            ErrorAction::Retry { max_retries, delay } => {
                self.log(
                    run,
                    format!("Node '{}' failed ({}), retrying up to {} time(s)", node.id, error, max_retries),
                );
                let retried = self
                    .policy
                    .execute_with_retry(&node.id, max_retries, delay, &run.cancel, move || {
                        handler.run(invocation)
                    })
                    .await;
                match retried {
                    Ok(output) => NodeOutcome::Completed(output),
                    Err(err) if err.is_cancelled() => NodeOutcome::Cancelled,
                    Err(err) => NodeOutcome::Aborted {
                        reason: format!("retries exhausted: {}", err),
                        cleanup: true,
                    },
                }
            }
            ErrorAction::Skip { continue_workflow } => NodeOutcome::Skipped {
                error: error.to_string(),
                continue_workflow,
            },
            ErrorAction::Fallback { fallback } => {
                let message = error.to_string();
                let value = match fallback {
                    Some(fallback) => fallback.call(&FailureContext {
                        node_id: &node.id,
                        node_kind: &node.kind,
                        message: &message,
                    }),
                    None => serde_json::json!({"status": "fallback", "error": message}),
                };
                NodeOutcome::Fallback { error: message, value }
            }
            ErrorAction::Abort { cleanup } => NodeOutcome::Aborted {
                reason: error.to_string(),
                cleanup,
            },
        }
    }

    /// Record a node outcome in the context and report it
    fn apply_outcome(&self, run: &RunState, node: &GraphNode, outcome: &NodeOutcome) {
        let metadata = self.registry.get_metadata(&node.kind);

        let (message, event) = {
            let mut context = self.context.lock();
            if let Some(result) = outcome.recorded_result() {
                context.set_result(node.id.clone(), result);
            }

            match outcome {
                NodeOutcome::Completed(output) => {
                    for (key, value) in &output.variables {
                        if metadata.is_some_and(|m| !m.declares_write(key)) {
                            log::warn!(
                                "Node '{}' ({}) wrote undeclared variable '{}'",
                                node.id,
                                node.kind,
                                key
                            );
                        }
                        context.set_variable(key.clone(), value.clone());
                    }
                    (
                        format!("Node '{}' completed", node.id),
                        Some(WorkflowEvent::NodeCompleted {
                            node_id: node.id.clone(),
                            execution_id: run.execution_id.clone(),
                            result: output.result.clone(),
                        }),
                    )
                }
                NodeOutcome::Skipped { error, .. } => (
                    format!("Node '{}' skipped: {}", node.id, error),
                    Some(WorkflowEvent::NodeSkipped {
                        node_id: node.id.clone(),
                        execution_id: run.execution_id.clone(),
                        error: error.clone(),
                    }),
                ),
                NodeOutcome::Fallback { error, .. } => (
                    format!("Node '{}' used fallback result: {}", node.id, error),
                    Some(WorkflowEvent::NodeFallback {
                        node_id: node.id.clone(),
                        execution_id: run.execution_id.clone(),
                        error: error.clone(),
                    }),
                ),
                NodeOutcome::Aborted { reason, .. } => (
                    format!("Node '{}' failed: {}", node.id, reason),
                    Some(WorkflowEvent::NodeFailed {
                        node_id: node.id.clone(),
                        execution_id: run.execution_id.clone(),
                        error: reason.clone(),
                    }),
                ),
                NodeOutcome::Cancelled => (format!("Node '{}' cancelled", node.id), None),
            }
        };

        if outcome.recorded_result().is_some() {
            run.executed.lock().push(node.id.clone());
        }
        if let Some(event) = event {
            self.emit(event);
        }
        self.log(run, message);
        self.publish_context(run);
    }

    /// Successor node ids in edge declaration order
    fn successors(
        &self,
        run: &RunState,
        graph: &WorkflowGraph,
        node: &GraphNode,
        result: &serde_json::Value,
    ) -> Vec<NodeId> {
        let edges: Vec<_> = graph.outgoing_edges(&node.id).collect();
        if !self.is_branching(node) {
            return edges.iter().map(|e| e.target.clone()).collect();
        }

        let condition = match result.get("condition").and_then(|c| c.as_bool()) {
            Some(condition) => condition,
            None => {
                log::warn!(
                    "Branch node '{}' produced no boolean condition, taking the false branch",
                    node.id
                );
                false
            }
        };

        // Only explicit true/false labels select by label; editor handle ids
        // such as "source-right" fall back to edge order.
        let labeled = edges
            .iter()
            .any(|e| e.label.as_deref().is_some_and(|l| branch_label(l).is_some()));
        let chosen: Vec<NodeId> = if labeled {
            edges
                .iter()
                .filter(|e| e.label.as_deref().and_then(branch_label) == Some(condition))
                .map(|e| e.target.clone())
                .collect()
        } else {
            let index = if condition { 0 } else { 1 };
            edges.get(index).map(|e| e.target.clone()).into_iter().collect()
        };

        self.log(
            run,
            format!(
                "Branch '{}' evaluated to {}, continuing with [{}]",
                node.id,
                condition,
                chosen.join(", ")
            ),
        );
        chosen
    }

    fn is_branching(&self, node: &GraphNode) -> bool {
        node.kind == kinds::CONDITION_BRANCH
            || self
                .registry
                .get_metadata(&node.kind)
                .is_some_and(|m| m.branching)
    }

    /// Dispatch the configured cleanup command after an abort
    async fn run_cleanup(&self, run: &RunState) {
        let Some(command) = self.config.cleanup_command.as_deref() else {
            self.log(run, "No cleanup command configured");
            return;
        };

        self.log(run, format!("Running cleanup command '{}'", command));
        match self.dispatcher.dispatch(command, None).await {
            Ok(_) => self.log(run, "Cleanup completed"),
            Err(err) => {
                log::error!("Cleanup command '{}' failed: {}", command, err);
                self.log(run, format!("Cleanup failed: {}", err));
            }
        }
    }

    fn halt(&self, run: &RunState, node_id: &str) {
        self.context.lock().should_stop = true;
        self.log(run, format!("Node '{}' requested the workflow to stop", node_id));
    }

    fn stop_requested(&self, run: &RunState) -> bool {
        run.cancel.is_cancelled() || self.context.lock().should_stop
    }

    fn log(&self, run: &RunState, message: impl AsRef<str>) {
        let message = message.as_ref();
        log::info!("{}", message);
        let line = self.context.lock().log(message);
        self.emit(WorkflowEvent::Log {
            execution_id: run.execution_id.clone(),
            line,
        });
    }

    fn publish_context(&self, run: &RunState) {
        let snapshot = self.context.lock().snapshot();
        self.emit(WorkflowEvent::ContextUpdated {
            execution_id: run.execution_id.clone(),
            snapshot,
        });
    }

    fn emit(&self, event: WorkflowEvent) {
        if let Err(e) = self.event_sink.send(event) {
            log::warn!("Failed to send workflow event: {}", e);
        }
    }
}

/// Branch outcome named by an edge label, if it names one
fn branch_label(label: &str) -> Option<bool> {
    match label.trim() {
        l if l.eq_ignore_ascii_case("true") => Some(true),
        l if l.eq_ignore_ascii_case("false") => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use async_trait::async_trait;

    use crate::builder::WorkflowBuilder;
    use crate::config::ErrorPolicyConfig;
    use crate::descriptor::{NodeCategory, NodeMetadata};
    use crate::dispatcher::{CallbackDispatcher, RecordingDispatcher};
    use crate::events::VecEventSink;
    use crate::policy::FallbackFn;
    use crate::registry::NodeHandler;

    struct MarkerNode;

    #[async_trait]
    impl NodeHandler for MarkerNode {
        async fn run(&self, _invocation: &NodeInvocation<'_>) -> Result<NodeOutput> {
            Ok(NodeOutput::new(serde_json::json!({"status": "ok"})))
        }
    }

    struct CommandNode(&'static str);

    #[async_trait]
    impl NodeHandler for CommandNode {
        async fn run(&self, invocation: &NodeInvocation<'_>) -> Result<NodeOutput> {
            let payload = serde_json::Value::Object(invocation.parameters.clone());
            let reply = invocation.dispatch(self.0, Some(payload)).await?;
            Ok(NodeOutput::new(reply))
        }
    }

    struct BranchNode;

    #[async_trait]
    impl NodeHandler for BranchNode {
        async fn run(&self, invocation: &NodeInvocation<'_>) -> Result<NodeOutput> {
            let condition = invocation
                .param("condition")
                .and_then(|c| c.as_bool())
                .unwrap_or(false);
            Ok(NodeOutput::new(serde_json::json!({"condition": condition})))
        }
    }

    fn registry() -> Arc<NodeRegistry> {
        let mut registry = NodeRegistry::new();
        registry.register(
            NodeMetadata::new("start", NodeCategory::Control, "Start"),
            Arc::new(MarkerNode),
        );
        registry.register(
            NodeMetadata::new("end", NodeCategory::Control, "End"),
            Arc::new(MarkerNode),
        );
        for (kind, command) in [
            ("takeoff", "takeoff"),
            ("land", "land"),
            ("move", "move"),
            ("hover", "hover"),
            ("unipixel_segmentation", "segment"),
        ] {
            registry.register(
                NodeMetadata::new(kind, NodeCategory::Movement, kind),
                Arc::new(CommandNode(command)),
            );
        }
        registry.register(
            NodeMetadata::new("condition_branch", NodeCategory::Logic, "Condition").branching(),
            Arc::new(BranchNode),
        );
        registry.register_callback(
            NodeMetadata::new("remember", NodeCategory::Logic, "Remember").writes("altitude"),
            |input| async move {
                let previous = input.variables.get("altitude").cloned().unwrap_or_default();
                Ok(NodeOutput::new(serde_json::json!({"previous": previous}))
                    .with_variable("altitude", serde_json::json!(1.5))
                    .with_variable("note", serde_json::json!("undeclared")))
            },
        );
        Arc::new(registry)
    }

    fn fast_config() -> EngineConfig {
        EngineConfig {
            policy: ErrorPolicyConfig {
                retry_delay_ms: 10,
                max_retry_delay_ms: 50,
                ..ErrorPolicyConfig::default()
            },
            ..EngineConfig::default()
        }
    }

    fn engine_with(dispatcher: Arc<RecordingDispatcher>, graph: WorkflowGraph) -> ExecutionEngine {
        let engine = ExecutionEngine::new(registry(), dispatcher, fast_config());
        engine.set_workflow(graph).unwrap();
        engine
    }

    fn mission() -> WorkflowGraph {
        WorkflowBuilder::new("wf-1", "Mission")
            .add_node("start", "start")
            .add_node("t1", "takeoff")
            .add_node("m1", "move")
            .with_parameter("direction", serde_json::json!("forward"))
            .add_node("l1", "land")
            .add_node("end", "end")
            .connect("start", "t1")
            .connect("t1", "m1")
            .connect("m1", "l1")
            .connect("l1", "end")
            .build()
    }

    fn branching(condition: bool, labeled: bool) -> WorkflowGraph {
        let builder = WorkflowBuilder::new("wf-branch", "Branch")
            .add_node("start", "start")
            .add_node("br", "condition_branch")
            .with_parameter("condition", serde_json::json!(condition))
            .add_node("a", "move")
            .add_node("b", "hover")
            .add_node("end", "end")
            .connect("start", "br");
        let builder = if labeled {
            builder
                .connect_labeled("br", "b", "false")
                .connect_labeled("br", "a", "true")
        } else {
            builder.connect("br", "a").connect("br", "b")
        };
        builder.connect("a", "end").connect("b", "end").build()
    }

    fn diamond() -> WorkflowGraph {
        WorkflowBuilder::new("wf-diamond", "Diamond")
            .add_node("start", "start")
            .add_node("a", "move")
            .add_node("b", "hover")
            .add_node("end", "end")
            .connect("start", "a")
            .connect("start", "b")
            .connect("a", "end")
            .connect("b", "end")
            .build()
    }

    #[tokio::test]
    async fn test_sequential_run_dispatches_in_order() {
        let dispatcher = Arc::new(RecordingDispatcher::new());
        let sink = Arc::new(VecEventSink::new());
        let engine = engine_with(dispatcher.clone(), mission()).with_event_sink(sink.clone());

        let report = engine.run(ExecutionMode::Sequential).await.unwrap();

        assert_eq!(report.status, RunStatus::Completed);
        assert_eq!(engine.status(), RunStatus::Completed);
        assert_eq!(report.executed_nodes, vec!["start", "t1", "m1", "l1", "end"]);
        assert_eq!(dispatcher.command_names(), vec!["takeoff", "move", "land"]);
        assert_eq!(dispatcher.calls()[1].payload, Some(serde_json::json!({"direction": "forward"})));
        assert!(!report.context.is_running);
        assert_eq!(report.context.results.len(), 5);
        assert!(report.context.logs.iter().all(|line| line.starts_with('[')));

        let events = sink.events();
        assert!(matches!(events.first(), Some(WorkflowEvent::WorkflowStarted { .. })));
        assert!(matches!(events.last(), Some(WorkflowEvent::WorkflowCompleted { nodes_executed: 5, .. })));
        assert!(events.iter().any(|e| matches!(e, WorkflowEvent::ContextUpdated { .. })));
        assert_eq!(sink.log_lines(), report.context.logs);
    }

    #[tokio::test]
    async fn test_branch_follows_first_edge_when_true() {
        let dispatcher = Arc::new(RecordingDispatcher::new());
        let engine = engine_with(dispatcher.clone(), branching(true, false));

        let report = engine.run(ExecutionMode::Sequential).await.unwrap();
        assert_eq!(dispatcher.command_names(), vec!["move"]);
        assert!(report.context.result("b").is_none());
        assert_eq!(report.context.result("br").unwrap()["condition"], true);
    }

    #[tokio::test]
    async fn test_branch_follows_second_edge_when_false() {
        let dispatcher = Arc::new(RecordingDispatcher::new());
        let engine = engine_with(dispatcher.clone(), branching(false, false));

        engine.run(ExecutionMode::Sequential).await.unwrap();
        assert_eq!(dispatcher.command_names(), vec!["hover"]);
    }

    #[tokio::test]
    async fn test_labeled_branch_ignores_edge_order() {
        let dispatcher = Arc::new(RecordingDispatcher::new());
        let engine = engine_with(dispatcher.clone(), branching(true, true));

        engine.run(ExecutionMode::Sequential).await.unwrap();
        assert_eq!(dispatcher.command_names(), vec!["move"]);
    }

    #[tokio::test]
    async fn test_handle_labels_fall_back_to_edge_order() {
        let graph = WorkflowBuilder::new("wf-handles", "Handles")
            .add_node("start", "start")
            .add_node("br", "condition_branch")
            .with_parameter("condition", serde_json::json!(true))
            .add_node("a", "move")
            .add_node("b", "hover")
            .add_node("end", "end")
            .connect("start", "br")
            .connect_labeled("br", "a", "source-right")
            .connect_labeled("br", "b", "source-bottom")
            .connect("a", "end")
            .connect("b", "end")
            .build();
        let dispatcher = Arc::new(RecordingDispatcher::new());
        let engine = engine_with(dispatcher.clone(), graph);

        let report = engine.run(ExecutionMode::Sequential).await.unwrap();

        assert_eq!(dispatcher.command_names(), vec!["move"]);
        assert_eq!(report.executed_nodes, vec!["start", "br", "a", "end"]);
    }

    #[test]
    fn test_branch_label_names() {
        assert_eq!(branch_label("true"), Some(true));
        assert_eq!(branch_label(" False "), Some(false));
        assert_eq!(branch_label("source-right"), None);
    }

    #[tokio::test]
    async fn test_seeded_variables_are_visible_to_nodes() {
        let graph = WorkflowBuilder::new("wf-seed", "Seed")
            .add_node("start", "start")
            .add_node("r1", "remember")
            .add_node("end", "end")
            .connect("start", "r1")
            .connect("r1", "end")
            .build();
        let engine = engine_with(Arc::new(RecordingDispatcher::new()), graph);
        let seed = HashMap::from([
            ("altitude".to_string(), serde_json::json!(0.8)),
            ("team".to_string(), serde_json::json!("blue")),
        ]);

        let report = engine
            .run_with_variables(ExecutionMode::Sequential, seed)
            .await
            .unwrap();

        assert_eq!(report.context.result("r1").unwrap()["previous"], 0.8);
        assert_eq!(report.context.variable("team"), Some(&serde_json::json!("blue")));
        assert_eq!(report.context.variable("altitude"), Some(&serde_json::json!(1.5)));

        let report = engine.run(ExecutionMode::Sequential).await.unwrap();
        assert!(report.context.variable("team").is_none());
    }

    #[tokio::test]
    async fn test_parallel_diamond_runs_by_level() {
        let dispatcher = Arc::new(RecordingDispatcher::new());
        let sink = Arc::new(VecEventSink::new());
        let engine = engine_with(dispatcher.clone(), diamond()).with_event_sink(sink.clone());

        let report = engine.run(ExecutionMode::Parallel).await.unwrap();

        assert_eq!(report.status, RunStatus::Completed);
        assert_eq!(report.executed_nodes, vec!["start", "a", "b", "end"]);
        assert_eq!(dispatcher.count("move"), 1);
        assert_eq!(dispatcher.count("hover"), 1);

        let levels: Vec<Vec<String>> = sink
            .events()
            .into_iter()
            .filter_map(|e| match e {
                WorkflowEvent::LevelStarted { node_ids, .. } => Some(node_ids),
                _ => None,
            })
            .collect();
        assert_eq!(
            levels,
            vec![vec!["start".to_string()], vec!["a".to_string(), "b".to_string()], vec!["end".to_string()]]
        );
    }

    #[tokio::test]
    async fn test_parallel_rejects_cycles() {
        let graph = WorkflowBuilder::new("wf-cycle", "Cycle")
            .add_node("start", "start")
            .add_node("a", "move")
            .add_node("b", "hover")
            .add_node("end", "end")
            .connect("start", "a")
            .connect("a", "b")
            .connect("b", "a")
            .connect("b", "end")
            .build();
        let engine = engine_with(Arc::new(RecordingDispatcher::new()), graph);

        assert!(engine.has_circular_dependencies());
        let err = engine.run(ExecutionMode::Parallel).await.unwrap_err();
        assert!(matches!(err, EngineError::CircularDependency(_)));
        assert_eq!(engine.status(), RunStatus::Idle);
    }

    #[tokio::test]
    async fn test_failure_is_skipped_and_run_continues() {
        let dispatcher = Arc::new(
            RecordingDispatcher::new().fail_times("move", 1, |_| EngineError::failed("obstacle ahead")),
        );
        let engine = engine_with(dispatcher.clone(), mission());

        let report = engine.run(ExecutionMode::Sequential).await.unwrap();

        assert_eq!(report.status, RunStatus::Completed);
        assert_eq!(report.context.result("m1").unwrap()["status"], "skipped");
        assert_eq!(dispatcher.count("land"), 1);
        assert_eq!(engine.error_history().len(), 1);
        assert_eq!(engine.error_stats().by_kind["move"], 1);

        engine.clear_error_history();
        assert!(engine.error_history().is_empty());
    }

    #[tokio::test]
    async fn test_segmentation_timeout_falls_back() {
        let dispatcher = Arc::new(RecordingDispatcher::new().fail_always("segment", |c| {
            EngineError::Timeout {
                command: c.to_string(),
                after_ms: 3000,
            }
        }));
        let graph = WorkflowBuilder::new("wf-seg", "Segment")
            .add_node("start", "start")
            .add_node("s1", "unipixel_segmentation")
            .add_node("end", "end")
            .connect("start", "s1")
            .connect("s1", "end")
            .build();
        let sink = Arc::new(VecEventSink::new());
        let engine = engine_with(dispatcher.clone(), graph).with_event_sink(sink.clone());

        let report = engine.run(ExecutionMode::Sequential).await.unwrap();

        assert_eq!(report.status, RunStatus::Completed);
        assert_eq!(report.context.result("s1").unwrap()["status"], "fallback");
        assert_eq!(dispatcher.count("segment"), 1);
        assert!(sink
            .events()
            .iter()
            .any(|e| matches!(e, WorkflowEvent::NodeFallback { node_id, .. } if node_id == "s1")));
    }

    #[tokio::test]
    async fn test_fallback_function_supplies_result() {
        let dispatcher = Arc::new(
            RecordingDispatcher::new().fail_always("move", |_| EngineError::failed("wind too strong")),
        );
        let mut engine = ExecutionEngine::new(registry(), dispatcher.clone(), fast_config());
        engine.policy_mut().register_override("move", |_| ErrorAction::Fallback {
            fallback: Some(FallbackFn::new(|failure| {
                serde_json::json!({
                    "status": "estimated",
                    "node": failure.node_id,
                    "reason": failure.message,
                })
            })),
        });
        engine.set_workflow(mission()).unwrap();

        let report = engine.run(ExecutionMode::Sequential).await.unwrap();

        assert_eq!(report.status, RunStatus::Completed);
        let result = report.context.result("m1").unwrap();
        assert_eq!(result["status"], "estimated");
        assert_eq!(result["node"], "m1");
        assert!(result["reason"].as_str().unwrap().contains("wind too strong"));
        assert_eq!(dispatcher.count("move"), 1);
        assert_eq!(dispatcher.count("land"), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_parallel_level_waits_for_slow_sibling() {
        let trace = Arc::new(parking_lot::Mutex::new(Vec::<String>::new()));
        let dispatcher = {
            let trace = trace.clone();
            Arc::new(CallbackDispatcher::new(move |command, _payload| {
                let trace = trace.clone();
                async move {
                    trace.lock().push(format!("{}:begin", command));
                    if command == "hover" {
                        tokio::time::sleep(Duration::from_secs(5)).await;
                    }
                    trace.lock().push(format!("{}:done", command));
                    Ok(serde_json::json!({"status": "ok"}))
                }
            }))
        };
        let graph = WorkflowBuilder::new("wf-barrier", "Barrier")
            .add_node("start", "start")
            .add_node("a", "move")
            .add_node("b", "hover")
            .add_node("l1", "land")
            .add_node("end", "end")
            .connect("start", "a")
            .connect("start", "b")
            .connect("a", "l1")
            .connect("b", "l1")
            .connect("l1", "end")
            .build();
        let engine = ExecutionEngine::new(registry(), dispatcher, fast_config());
        engine.set_workflow(graph).unwrap();

        let report = engine.run(ExecutionMode::Parallel).await.unwrap();
        assert_eq!(report.status, RunStatus::Completed);

        let trace = trace.lock().clone();
        let position = |entry: &str| trace.iter().position(|t| t == entry).unwrap();
        assert!(position("move:done") < position("land:begin"));
        assert!(position("hover:done") < position("land:begin"));
        assert_eq!(trace.last().map(String::as_str), Some("land:done"));
    }

    #[tokio::test]
    async fn test_parallel_skip_and_fallback_continue_to_next_level() {
        let dispatcher = Arc::new(
            RecordingDispatcher::new()
                .fail_always("move", |_| EngineError::failed("obstacle ahead"))
                .fail_always("segment", |c| EngineError::Timeout {
                    command: c.to_string(),
                    after_ms: 3000,
                }),
        );
        let graph = WorkflowBuilder::new("wf-soft", "Soft failures")
            .add_node("start", "start")
            .add_node("a", "move")
            .add_node("s1", "unipixel_segmentation")
            .add_node("l1", "land")
            .add_node("end", "end")
            .connect("start", "a")
            .connect("start", "s1")
            .connect("a", "l1")
            .connect("s1", "l1")
            .connect("l1", "end")
            .build();
        let engine = engine_with(dispatcher.clone(), graph);

        let report = engine.run(ExecutionMode::Parallel).await.unwrap();

        assert_eq!(report.status, RunStatus::Completed);
        assert_eq!(report.context.result("a").unwrap()["status"], "skipped");
        assert_eq!(report.context.result("s1").unwrap()["status"], "fallback");
        assert_eq!(dispatcher.count("land"), 1);
        assert_eq!(report.executed_nodes, vec!["start", "a", "s1", "l1", "end"]);
    }

    #[tokio::test]
    async fn test_takeoff_failure_aborts_and_lands() {
        let dispatcher = Arc::new(
            RecordingDispatcher::new().fail_always("takeoff", |c| EngineError::dispatch(c, "motors disarmed")),
        );
        let engine = engine_with(dispatcher.clone(), mission());

        let err = engine.run(ExecutionMode::Sequential).await.unwrap_err();

        assert!(matches!(err, EngineError::Aborted { ref node_id, .. } if node_id == "t1"));
        assert_eq!(engine.status(), RunStatus::Aborted);
        assert_eq!(dispatcher.command_names(), vec!["takeoff", "land"]);
        let context = engine.context_snapshot();
        assert!(!context.is_running);
        assert!(context.logs.iter().any(|l| l.contains("Running cleanup command 'land'")));
    }

    #[tokio::test(start_paused = true)]
    async fn test_transient_failure_is_retried() {
        let dispatcher = Arc::new(
            RecordingDispatcher::new().fail_times("move", 2, |c| EngineError::dispatch(c, "connection reset")),
        );
        let engine = engine_with(dispatcher.clone(), mission());

        let report = engine.run(ExecutionMode::Sequential).await.unwrap();

        assert_eq!(report.status, RunStatus::Completed);
        assert_eq!(dispatcher.count("move"), 3);
        assert_eq!(report.context.result("m1").unwrap()["status"], "ok");
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhausted_retries_abort_with_cleanup() {
        let dispatcher = Arc::new(
            RecordingDispatcher::new().fail_always("move", |c| EngineError::dispatch(c, "network unreachable")),
        );
        let engine = engine_with(dispatcher.clone(), mission());

        let err = engine.run(ExecutionMode::Sequential).await.unwrap_err();

        assert!(matches!(err, EngineError::Aborted { ref node_id, .. } if node_id == "m1"));
        // One initial attempt plus max_retries + 1 from the retry action
        assert_eq!(dispatcher.count("move"), 5);
        assert_eq!(dispatcher.count("land"), 1);
    }

    #[tokio::test]
    async fn test_parallel_abort_fails_run() {
        let dispatcher = Arc::new(
            RecordingDispatcher::new().fail_always("hover", |_| EngineError::failed("gimbal jammed")),
        );
        let mut engine = ExecutionEngine::new(registry(), dispatcher.clone(), fast_config());
        engine
            .policy_mut()
            .register_override("hover", |_| ErrorAction::Abort { cleanup: true });
        engine.set_workflow(diamond()).unwrap();

        let err = engine.run(ExecutionMode::Parallel).await.unwrap_err();

        assert!(matches!(err, EngineError::Aborted { ref node_id, .. } if node_id == "b"));
        assert_eq!(dispatcher.count("land"), 1);
        assert!(engine.context_snapshot().result("end").is_none());
    }

    #[tokio::test]
    async fn test_skip_without_continue_stops_run() {
        let dispatcher = Arc::new(
            RecordingDispatcher::new().fail_always("move", |_| EngineError::failed("geofence")),
        );
        let mut engine = ExecutionEngine::new(registry(), dispatcher.clone(), fast_config());
        engine.policy_mut().register_override("move", |_| ErrorAction::Skip {
            continue_workflow: false,
        });
        engine.set_workflow(mission()).unwrap();

        let report = engine.run(ExecutionMode::Sequential).await.unwrap();

        assert_eq!(report.status, RunStatus::Stopped);
        assert!(report.context.should_stop);
        assert_eq!(dispatcher.count("land"), 0);
    }

    #[tokio::test]
    async fn test_unknown_kind_is_noop() {
        let graph = WorkflowBuilder::new("wf-unknown", "Unknown")
            .add_node("start", "start")
            .add_node("x", "mystery")
            .add_node("end", "end")
            .connect("start", "x")
            .connect("x", "end")
            .build();
        let engine = engine_with(Arc::new(RecordingDispatcher::new()), graph);

        let report = engine.run(ExecutionMode::Sequential).await.unwrap();

        assert_eq!(report.status, RunStatus::Completed);
        assert_eq!(report.context.result("x").unwrap()["status"], "noop");
        assert!(report.context.logs.iter().any(|l| l.contains("Unknown node type 'mystery'")));
        assert!(report.context.result("end").is_some());
    }

    #[tokio::test]
    async fn test_variable_writes_are_applied_by_engine() {
        let graph = WorkflowBuilder::new("wf-vars", "Vars")
            .add_node("start", "start")
            .add_node("r1", "remember")
            .add_node("r2", "remember")
            .add_node("end", "end")
            .connect("start", "r1")
            .connect("r1", "r2")
            .connect("r2", "end")
            .build();
        let engine = engine_with(Arc::new(RecordingDispatcher::new()), graph);

        let report = engine.run(ExecutionMode::Sequential).await.unwrap();

        assert_eq!(report.context.variable("altitude"), Some(&serde_json::json!(1.5)));
        assert_eq!(report.context.variable("note"), Some(&serde_json::json!("undeclared")));
        assert_eq!(report.context.result("r1").unwrap()["previous"], serde_json::Value::Null);
        assert_eq!(report.context.result("r2").unwrap()["previous"], 1.5);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_interrupts_in_flight_dispatch() {
        let dispatcher = Arc::new(CallbackDispatcher::new(|command, _payload| async move {
            if command == "hover" {
                tokio::time::sleep(Duration::from_secs(30)).await;
            }
            Ok(serde_json::json!({"status": "ok"}))
        }));
        let graph = WorkflowBuilder::new("wf-stop", "Stop")
            .add_node("start", "start")
            .add_node("h1", "hover")
            .add_node("l1", "land")
            .add_node("end", "end")
            .connect("start", "h1")
            .connect("h1", "l1")
            .connect("l1", "end")
            .build();
        let engine = ExecutionEngine::new(registry(), dispatcher, fast_config());
        engine.set_workflow(graph).unwrap();

        let (report, _) = tokio::join!(engine.run(ExecutionMode::Sequential), async {
            tokio::time::sleep(Duration::from_millis(100)).await;
            engine.stop();
        });

        let report = report.unwrap();
        assert_eq!(report.status, RunStatus::Stopped);
        assert!(report.context.result("h1").is_none());
        assert!(report.context.result("l1").is_none());
        assert_eq!(engine.status(), RunStatus::Stopped);
    }

    #[tokio::test]
    async fn test_query_surfaces() {
        let engine = engine_with(Arc::new(RecordingDispatcher::new()), diamond());

        let stats = engine.execution_stats().unwrap();
        assert_eq!(stats.max_parallelism, 2);
        assert_eq!(stats.level_count, 3);
        assert_eq!(engine.node_dependencies("end").unwrap(), vec!["a", "b"]);
        assert!(matches!(
            engine.node_dependencies("ghost"),
            Err(EngineError::UnknownNode(_))
        ));
        assert!(!engine.has_circular_dependencies());
        assert!(engine.validate().unwrap().valid);
        assert_eq!(engine.critical_path().unwrap().length, 3);
    }

    #[tokio::test]
    async fn test_run_without_workflow_or_start() {
        let engine = ExecutionEngine::new(registry(), Arc::new(RecordingDispatcher::new()), fast_config());
        assert!(matches!(
            engine.run(ExecutionMode::Sequential).await,
            Err(EngineError::NoWorkflow)
        ));

        let graph = WorkflowBuilder::new("wf", "No start")
            .add_node("a", "hover")
            .add_node("end", "end")
            .connect("a", "end")
            .build();
        engine.set_workflow(graph).unwrap();
        assert!(matches!(
            engine.run(ExecutionMode::Sequential).await,
            Err(EngineError::NoStartNode)
        ));
    }
}
