//! Node kind registry for dynamic node resolution
//!
//! This module maps node kind strings to handlers and metadata, replacing a
//! hardcoded match over kinds with an open, extensible registry.
//!
//! # Usage
//!
//! ```ignore
//! use droneflow_engine::{NodeRegistry, NodeDescriptor};
//!
//! let mut registry = NodeRegistry::new();
//! registry.register(TakeoffNode::descriptor(), Arc::new(TakeoffNode));
//!
//! // Or pick up every node submitted through `inventory`
//! let registry = NodeRegistry::with_builtins();
//! ```

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::descriptor::{NodeCategory, NodeDescriptor, NodeMetadata, ParameterSpec, SchemaSource};
use crate::dispatcher::CommandDispatcher;
use crate::error::{EngineError, Result};
use crate::types::{NodeId, Parameters};

/// Everything a handler sees for one node execution
///
/// Handlers never touch the execution context directly: they read the
/// variable snapshot here and return writes in [`NodeOutput`].
pub struct NodeInvocation<'a> {
    pub node_id: &'a str,
    pub kind: &'a str,
    pub parameters: &'a Parameters,
    pub variables: &'a HashMap<String, serde_json::Value>,
    pub dispatcher: &'a dyn CommandDispatcher,
    pub cancel: &'a CancellationToken,
}

impl NodeInvocation<'_> {
    /// Raw parameter value
    pub fn param(&self, name: &str) -> Option<&serde_json::Value> {
        self.parameters.get(name)
    }

    /// Numeric parameter, or `default` when absent
    ///
    /// Numeric strings are accepted since the editor stores text inputs.
    pub fn param_f64(&self, name: &str, default: f64) -> Result<f64> {
        match self.parameters.get(name) {
            None | Some(serde_json::Value::Null) => Ok(default),
            Some(serde_json::Value::Number(n)) => n
                .as_f64()
                .ok_or_else(|| EngineError::invalid_parameter(self.node_id, name, "not a finite number")),
            Some(serde_json::Value::String(s)) => s
                .trim()
                .parse::<f64>()
                .ok()
                .filter(|n| n.is_finite())
                .ok_or_else(|| EngineError::invalid_parameter(self.node_id, name, format!("'{}' is not a number", s))),
            Some(other) => Err(EngineError::invalid_parameter(
                self.node_id,
                name,
                format!("expected a number, got {}", other),
            )),
        }
    }

    /// String parameter, or `default` when absent
    pub fn param_str<'p>(&'p self, name: &str, default: &'p str) -> &'p str {
        self.parameters
            .get(name)
            .and_then(|v| v.as_str())
            .unwrap_or(default)
    }

    /// Required string parameter
    pub fn require_str(&self, name: &str) -> Result<&str> {
        self.parameters
            .get(name)
            .and_then(|v| v.as_str())
            .filter(|s| !s.trim().is_empty())
            .ok_or_else(|| EngineError::invalid_parameter(self.node_id, name, "is required"))
    }

    /// Context variable from the snapshot
    pub fn variable(&self, key: &str) -> Option<&serde_json::Value> {
        self.variables.get(key)
    }

    /// Dispatch a command, giving up early if the run is cancelled
    pub async fn dispatch(&self, command: &str, payload: Option<serde_json::Value>) -> Result<serde_json::Value> {
        tokio::select! {
            result = self.dispatcher.dispatch(command, payload) => result,
            _ = self.cancel.cancelled() => Err(EngineError::Cancelled),
        }
    }
}

/// What a handler hands back to the engine
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NodeOutput {
    /// Value stored under the node id in `results`
    pub result: serde_json::Value,
    /// Variable writes applied by the engine after the node resolves
    pub variables: Vec<(String, serde_json::Value)>,
}

impl NodeOutput {
    /// Output with a result and no variable writes
    pub fn new(result: serde_json::Value) -> Self {
        Self {
            result,
            variables: Vec::new(),
        }
    }

    /// Add a variable write
    pub fn with_variable(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.variables.push((key.into(), value));
        self
    }
}

impl From<serde_json::Value> for NodeOutput {
    fn from(result: serde_json::Value) -> Self {
        Self::new(result)
    }
}

/// Behavior of one node kind
#[async_trait]
pub trait NodeHandler: Send + Sync {
    /// Execute the node
    async fn run(&self, invocation: &NodeInvocation<'_>) -> Result<NodeOutput>;
}

/// A registration entry combining metadata with an optional handler
struct RegistryEntry {
    metadata: NodeMetadata,
    handler: Option<Arc<dyn NodeHandler>>,
}

/// Registry of node kinds with their metadata and handlers
///
/// # Composability
///
/// Registries can be composed by merging:
/// ```ignore
/// let mut registry = NodeRegistry::with_builtins();
/// registry.merge(mission_specific_registry);
/// ```
pub struct NodeRegistry {
    entries: HashMap<String, RegistryEntry>,
}

impl NodeRegistry {
    /// Create a new empty registry
    pub fn new() -> Self {
        Self {
            entries: HashMap::new(),
        }
    }

    /// Create a registry holding every node submitted via `inventory`
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        for registration in inventory::iter::<NodeRegistration> {
            registry.register((registration.metadata)(), (registration.handler)());
        }
        log::debug!("Registered {} built-in node kinds", registry.entries.len());
        registry
    }

    /// Register a node kind with metadata and a handler
    pub fn register(&mut self, metadata: NodeMetadata, handler: Arc<dyn NodeHandler>) {
        self.entries.insert(
            metadata.kind.clone(),
            RegistryEntry {
                metadata,
                handler: Some(handler),
            },
        );
    }

    /// Register a node kind backed by an async closure
    ///
    /// The callback receives an owned copy of the invocation data; it cannot
    /// dispatch commands.
    pub fn register_callback<F, Fut>(&mut self, metadata: NodeMetadata, callback: F)
    where
        F: Fn(CallbackInput) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<NodeOutput>> + Send + 'static,
    {
        let handler = Arc::new(CallbackNodeHandler {
            callback: Box::new(move |input| Box::pin(callback(input))),
        });
        self.register(metadata, handler);
    }

    /// Register a node kind with metadata only (no handler)
    ///
    /// Used for palette listings and validation-only hosts.
    pub fn register_metadata(&mut self, metadata: NodeMetadata) {
        self.entries.insert(
            metadata.kind.clone(),
            RegistryEntry {
                metadata,
                handler: None,
            },
        );
    }

    /// Get metadata for a node kind
    pub fn get_metadata(&self, kind: &str) -> Option<&NodeMetadata> {
        self.entries.get(kind).map(|e| &e.metadata)
    }

    /// Get all registered metadata
    pub fn all_metadata(&self) -> Vec<&NodeMetadata> {
        self.entries.values().map(|e| &e.metadata).collect()
    }

    /// Get metadata grouped by category
    pub fn metadata_by_category(&self) -> HashMap<NodeCategory, Vec<&NodeMetadata>> {
        let mut grouped: HashMap<NodeCategory, Vec<&NodeMetadata>> = HashMap::new();
        for entry in self.entries.values() {
            grouped
                .entry(entry.metadata.category)
                .or_default()
                .push(&entry.metadata);
        }
        grouped
    }

    /// Get the handler for a node kind
    pub fn handler(&self, kind: &str) -> Option<Arc<dyn NodeHandler>> {
        self.entries.get(kind).and_then(|e| e.handler.clone())
    }

    /// Check if a node kind is registered
    pub fn has_node_type(&self, kind: &str) -> bool {
        self.entries.contains_key(kind)
    }

    /// List all registered kind strings
    pub fn node_types(&self) -> Vec<&str> {
        self.entries.keys().map(|s| s.as_str()).collect()
    }

    /// Merge another registry into this one
    ///
    /// Entries from `other` override entries in `self` if they share the same kind.
    pub fn merge(&mut self, other: NodeRegistry) {
        self.entries.extend(other.entries);
    }
}

impl Default for NodeRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl SchemaSource for NodeRegistry {
    fn parameters(&self, kind: &str) -> Option<&[ParameterSpec]> {
        self.get_metadata(kind).map(|m| m.parameters.as_slice())
    }
}

/// Owned invocation data passed to callback handlers
#[derive(Debug, Clone)]
pub struct CallbackInput {
    pub node_id: NodeId,
    pub kind: String,
    pub parameters: Parameters,
    pub variables: HashMap<String, serde_json::Value>,
}

type CallbackFuture = Pin<Box<dyn Future<Output = Result<NodeOutput>> + Send>>;

/// Async callback-based handler for scripting hosts and tests
pub struct CallbackNodeHandler {
    callback: Box<dyn Fn(CallbackInput) -> CallbackFuture + Send + Sync>,
}

#[async_trait]
impl NodeHandler for CallbackNodeHandler {
    async fn run(&self, invocation: &NodeInvocation<'_>) -> Result<NodeOutput> {
        let input = CallbackInput {
            node_id: invocation.node_id.to_string(),
            kind: invocation.kind.to_string(),
            parameters: invocation.parameters.clone(),
            variables: invocation.variables.clone(),
        };
        (self.callback)(input).await
    }
}

/// Link-time registration of a node kind
///
/// Both fields are function pointers so registrations can be built in a
/// const context.
///
/// # Example
///
/// ```ignore
/// inventory::submit!(droneflow_engine::NodeRegistration::of::<TakeoffNode>());
/// ```
pub struct NodeRegistration {
    /// Produces the node's metadata
    pub metadata: fn() -> NodeMetadata,
    /// Produces the node's handler
    pub handler: fn() -> Arc<dyn NodeHandler>,
}

impl NodeRegistration {
    /// Registration for a stateless handler type
    pub const fn of<T>() -> Self
    where
        T: NodeDescriptor + NodeHandler + Default + 'static,
    {
        Self {
            metadata: T::descriptor,
            handler: default_handler::<T>,
        }
    }
}

fn default_handler<T: NodeHandler + Default + 'static>() -> Arc<dyn NodeHandler> {
    Arc::new(T::default())
}

inventory::collect!(NodeRegistration);
