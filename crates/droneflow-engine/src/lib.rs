//! Droneflow Engine - Visual workflow execution for drone missions
//!
//! This crate runs node graphs authored in a visual editor against a drone
//! host. It provides:
//!
//! - Dependency analysis: adjacency, execution levels, cycles, critical path
//! - Static validation with errors, warnings and fix suggestions
//! - An error policy that retries, skips, falls back or aborts per failure
//! - An execution engine with sequential (branching) and parallel (level
//!   barrier) traversal
//!
//! # Architecture
//!
//! - `NodeRegistry`: maps node kinds to metadata and `NodeHandler`s
//! - `CommandDispatcher`: the single boundary through which nodes reach the host
//! - `ExecutionEngine`: owns the run context and is its only writer
//! - `EventSink`: generic event streaming (log lines, context snapshots)
//!
//! # Example
//!
//! ```ignore
//! use droneflow_engine::{EngineConfig, ExecutionEngine, ExecutionMode, NodeRegistry, WorkflowGraph};
//!
//! let graph = WorkflowGraph::load("mission.json").await?;
//! let engine = ExecutionEngine::new(Arc::new(NodeRegistry::with_builtins()), dispatcher, EngineConfig::default());
//! engine.set_workflow(graph)?;
//! let report = engine.run(ExecutionMode::Sequential).await?;
//! ```

pub mod builder;
pub mod config;
pub mod constants;
pub mod context;
pub mod dependency;
pub mod descriptor;
pub mod dispatcher;
pub mod error;
pub mod events;
pub mod executor;
pub mod policy;
pub mod registry;
pub mod types;
pub mod validation;

// Re-export key types
pub use builder::WorkflowBuilder;
pub use config::{EngineConfig, ErrorPolicyConfig, ExecutionMode};
pub use context::ExecutionContext;
pub use dependency::{CriticalPath, DependencyGraph, ExecutionGroup, ExecutionStats, NodeAdjacency};
pub use descriptor::{
    CustomValidator, NodeCategory, NodeDescriptor, NodeMetadata, NoSchemas, ParameterKind, ParameterSpec,
    SchemaSource,
};
pub use dispatcher::{
    commands, CallbackDispatcher, CommandDispatcher, DispatchedCommand, RecordingDispatcher, TimeoutDispatcher,
};
pub use error::{EngineError, Result};
pub use events::{CallbackEventSink, EventError, EventSink, NullEventSink, VecEventSink, WorkflowEvent};
pub use executor::{ExecutionEngine, RunReport, RunStatus};
pub use policy::{
    ErrorAction, ErrorFamily, ErrorPolicy, ErrorStats, FailureContext, FallbackFn, FallbackOutcome, NodeError,
};
pub use registry::{CallbackInput, NodeHandler, NodeInvocation, NodeOutput, NodeRegistration, NodeRegistry};
pub use types::{kinds, GraphEdge, GraphNode, NodeId, Parameters, WorkflowGraph};
pub use validation::{
    can_execute, validate, validate_workflow, ExecutionCheck, Suggestion, SuggestionKind, ValidationError,
    ValidationErrorKind, ValidationResult, ValidationWarning, ValidationWarningKind,
};
