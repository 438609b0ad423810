//! Node descriptor trait and metadata types
//!
//! This module provides the `NodeDescriptor` trait that lets node handlers
//! self-describe their metadata: category, label, the parameter schema the
//! validator checks, and the context variables the node writes.
//!
//! The handler implementation is the single source of truth for both its
//! behavior and its metadata.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

/// Trait for node handlers that can describe their metadata
///
/// # Example
///
/// ```ignore
/// impl NodeDescriptor for TakeoffNode {
///     fn descriptor() -> NodeMetadata {
///         NodeMetadata::new("takeoff", NodeCategory::Movement, "Takeoff")
///             .with_parameter(ParameterSpec::optional("height", "Height", ParameterKind::number_range(0.2, 3.0)))
///     }
/// }
/// ```
pub trait NodeDescriptor {
    /// Get the static metadata for this node kind
    fn descriptor() -> NodeMetadata
    where
        Self: Sized;
}

/// Category of a node, used for palette grouping
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeCategory {
    /// Start/end markers
    Control,
    /// Flight commands (takeoff, move, rotate...)
    Movement,
    /// Inference-backed nodes (chat, vision, detection...)
    Ai,
    /// Competition challenge tasks (QR codes, targets...)
    Challenge,
    /// Branching, variables and timing
    Logic,
}

/// Complete metadata for a node kind
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeMetadata {
    /// Unique kind identifier (e.g., "takeoff")
    pub kind: String,
    /// Category for UI grouping
    pub category: NodeCategory,
    /// Human-readable label
    pub label: String,
    /// Description of what the node does
    #[serde(default)]
    pub description: String,
    /// Parameter schema checked by the validator
    #[serde(default)]
    pub parameters: Vec<ParameterSpec>,
    /// Context variable keys this node may write
    #[serde(default)]
    pub writes: Vec<String>,
    /// Whether the node selects one outgoing edge from a boolean result
    #[serde(default)]
    pub branching: bool,
}

impl NodeMetadata {
    /// Create metadata with no parameters
    pub fn new(kind: impl Into<String>, category: NodeCategory, label: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            category,
            label: label.into(),
            description: String::new(),
            parameters: Vec::new(),
            writes: Vec::new(),
            branching: false,
        }
    }

    /// Set the description
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Add a parameter to the schema
    pub fn with_parameter(mut self, parameter: ParameterSpec) -> Self {
        self.parameters.push(parameter);
        self
    }

    /// Declare a context variable this node writes
    pub fn writes(mut self, key: impl Into<String>) -> Self {
        self.writes.push(key.into());
        self
    }

    /// Mark the node as a boolean branch
    pub fn branching(mut self) -> Self {
        self.branching = true;
        self
    }

    /// Whether `key` is a declared variable write
    ///
    /// A `"*"` entry declares writes to arbitrary keys.
    pub fn declares_write(&self, key: &str) -> bool {
        self.writes.iter().any(|w| w == key || w == "*")
    }
}

/// The value shape a parameter accepts
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ParameterKind {
    /// A number, optionally bounded (inclusive)
    Number {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        min: Option<f64>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        max: Option<f64>,
    },
    /// A non-empty string
    String,
    /// One of a fixed set of strings
    Enum { options: Vec<String> },
    /// A boolean
    Boolean,
    /// A JSON value, or a string holding parseable JSON
    Json,
}

impl ParameterKind {
    /// An unbounded number
    pub fn number() -> Self {
        Self::Number { min: None, max: None }
    }

    /// A number within `[min, max]`
    pub fn number_range(min: f64, max: f64) -> Self {
        Self::Number {
            min: Some(min),
            max: Some(max),
        }
    }

    /// An enum over the given options
    pub fn one_of<I, S>(options: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::Enum {
            options: options.into_iter().map(Into::into).collect(),
        }
    }
}

/// Custom validation hook for a parameter
///
/// Returns `Err(message)` when the value is unacceptable. When present it
/// replaces the built-in type check.
#[derive(Clone)]
pub struct CustomValidator(Arc<dyn Fn(&serde_json::Value) -> std::result::Result<(), String> + Send + Sync>);

impl CustomValidator {
    /// Wrap a validation closure
    pub fn new(
        check: impl Fn(&serde_json::Value) -> std::result::Result<(), String> + Send + Sync + 'static,
    ) -> Self {
        Self(Arc::new(check))
    }

    /// Run the check
    pub fn check(&self, value: &serde_json::Value) -> std::result::Result<(), String> {
        (self.0)(value)
    }
}

impl fmt::Debug for CustomValidator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("CustomValidator")
    }
}

/// Schema entry for one node parameter
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParameterSpec {
    /// Parameter name (key in `GraphNode::parameters`)
    pub name: String,
    /// Human-readable label
    pub label: String,
    /// Accepted value shape
    pub kind: ParameterKind,
    /// Whether a value must be present
    pub required: bool,
    /// Value used by handlers when the parameter is absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_value: Option<serde_json::Value>,
    #[serde(skip)]
    pub validator: Option<CustomValidator>,
}

impl ParameterSpec {
    /// Create a required parameter
    pub fn required(name: impl Into<String>, label: impl Into<String>, kind: ParameterKind) -> Self {
        Self {
            name: name.into(),
            label: label.into(),
            kind,
            required: true,
            default_value: None,
            validator: None,
        }
    }

    /// Create an optional parameter
    pub fn optional(name: impl Into<String>, label: impl Into<String>, kind: ParameterKind) -> Self {
        Self {
            required: false,
            ..Self::required(name, label, kind)
        }
    }

    /// Set a default value
    pub fn with_default(mut self, value: serde_json::Value) -> Self {
        self.default_value = Some(value);
        self
    }

    /// Attach a custom validator
    pub fn with_validator(
        mut self,
        check: impl Fn(&serde_json::Value) -> std::result::Result<(), String> + Send + Sync + 'static,
    ) -> Self {
        self.validator = Some(CustomValidator::new(check));
        self
    }
}

/// Source of per-kind parameter schemas for the validator
pub trait SchemaSource {
    /// Parameter schema for a node kind, if the kind is known
    fn parameters(&self, kind: &str) -> Option<&[ParameterSpec]>;
}

impl SchemaSource for HashMap<String, Vec<ParameterSpec>> {
    fn parameters(&self, kind: &str) -> Option<&[ParameterSpec]> {
        self.get(kind).map(Vec::as_slice)
    }
}

/// A schema source that knows no kinds; parameter checks are skipped
pub struct NoSchemas;

impl SchemaSource for NoSchemas {
    fn parameters(&self, _kind: &str) -> Option<&[ParameterSpec]> {
        None
    }
}
