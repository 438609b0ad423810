//! Engine configuration
//!
//! Loaded from JSON (file or string); every field has a default so partial
//! documents are accepted.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::constants::{defaults, node_kinds};
use crate::error::{EngineError, Result};

/// How the engine walks the graph
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionMode {
    /// Depth-first walk from the start node, following branch results
    #[default]
    Sequential,
    /// Level-by-level with concurrent dispatch inside each level
    Parallel,
}

impl std::fmt::Display for ExecutionMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Sequential => write!(f, "sequential"),
            Self::Parallel => write!(f, "parallel"),
        }
    }
}

/// Error-policy settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ErrorPolicyConfig {
    /// Retry budget for transient failures
    pub max_retries: u32,
    /// Base backoff delay in milliseconds
    pub retry_delay_ms: u64,
    /// Ceiling for a single backoff sleep in milliseconds
    pub max_retry_delay_ms: u64,
    /// Retries attempted inside the first dispatch, before classification
    pub initial_retries: u32,
    /// Whether service-unavailable failures may fall back
    pub enable_fallback: bool,
    /// Kinds whose failure always aborts
    pub safety_critical_kinds: Vec<String>,
    /// Kinds that degrade to a fallback result on transient failures
    pub fallback_kinds: Vec<String>,
    /// Maximum error-history length
    pub history_limit: usize,
}

impl Default for ErrorPolicyConfig {
    fn default() -> Self {
        Self {
            max_retries: defaults::MAX_RETRIES,
            retry_delay_ms: defaults::RETRY_DELAY_MS,
            max_retry_delay_ms: defaults::MAX_RETRY_DELAY_MS,
            initial_retries: defaults::INITIAL_RETRIES,
            enable_fallback: true,
            safety_critical_kinds: node_kinds::SAFETY_CRITICAL.iter().map(|s| s.to_string()).collect(),
            fallback_kinds: node_kinds::FALLBACK_CAPABLE.iter().map(|s| s.to_string()).collect(),
            history_limit: defaults::HISTORY_LIMIT,
        }
    }
}

impl ErrorPolicyConfig {
    /// Base retry delay
    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }

    /// Backoff ceiling
    pub fn max_retry_delay(&self) -> Duration {
        Duration::from_millis(self.max_retry_delay_ms)
    }

    /// Whether `kind` is safety-critical
    pub fn is_safety_critical(&self, kind: &str) -> bool {
        self.safety_critical_kinds.iter().any(|k| k == kind)
    }
}

/// Top-level engine configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct EngineConfig {
    /// Default traversal mode
    pub execution_mode: ExecutionMode,
    /// Error policy settings
    pub policy: ErrorPolicyConfig,
    /// Command dispatched by the cleanup hook after an abort (`None` disables it)
    pub cleanup_command: Option<String>,
    /// Hard timeout applied at the dispatcher boundary, in milliseconds
    pub dispatch_timeout_ms: Option<u64>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            execution_mode: ExecutionMode::default(),
            policy: ErrorPolicyConfig::default(),
            cleanup_command: Some(defaults::CLEANUP_COMMAND.to_string()),
            dispatch_timeout_ms: None,
        }
    }
}

impl EngineConfig {
    /// Parse a configuration document
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Load a configuration document from disk
    pub async fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = tokio::fs::read_to_string(path).await?;
        log::debug!("Loaded engine config from {}", path.display());
        Self::from_json(&contents)
    }

    /// Dispatcher timeout, if configured
    pub fn dispatch_timeout(&self) -> Option<Duration> {
        self.dispatch_timeout_ms.map(Duration::from_millis)
    }

    /// Reject settings the policy cannot honor
    pub fn validate(&self) -> Result<()> {
        if self.policy.history_limit == 0 {
            return Err(EngineError::Configuration(
                "historyLimit must be at least 1".to_string(),
            ));
        }
        if self.policy.max_retry_delay_ms < self.policy.retry_delay_ms {
            return Err(EngineError::Configuration(format!(
                "maxRetryDelayMs ({}) is below retryDelayMs ({})",
                self.policy.max_retry_delay_ms, self.policy.retry_delay_ms
            )));
        }
        if self.dispatch_timeout_ms == Some(0) {
            return Err(EngineError::Configuration(
                "dispatchTimeoutMs must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = EngineConfig::default();
        assert_eq!(config.execution_mode, ExecutionMode::Sequential);
        assert_eq!(config.policy.max_retries, 3);
        assert!(config.policy.is_safety_critical("takeoff"));
        assert!(!config.policy.is_safety_critical("move"));
        assert_eq!(config.cleanup_command.as_deref(), Some("land"));
    }

    #[test]
    fn test_partial_document() {
        let config = EngineConfig::from_json(
            r#"{"executionMode": "parallel", "policy": {"maxRetries": 5}}"#,
        )
        .unwrap();
        assert_eq!(config.execution_mode, ExecutionMode::Parallel);
        assert_eq!(config.policy.max_retries, 5);
        assert_eq!(config.policy.retry_delay_ms, defaults::RETRY_DELAY_MS);
    }

    #[test]
    fn test_rejects_inverted_delays() {
        let err = EngineConfig::from_json(
            r#"{"policy": {"retryDelayMs": 5000, "maxRetryDelayMs": 100}}"#,
        )
        .unwrap_err();
        assert!(matches!(err, EngineError::Configuration(_)));
    }

    #[tokio::test]
    async fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("engine.json");
        tokio::fs::write(&path, r#"{"cleanupCommand": null, "dispatchTimeoutMs": 2500}"#)
            .await
            .unwrap();

        let config = EngineConfig::load(&path).await.unwrap();
        assert!(config.cleanup_command.is_none());
        assert_eq!(config.dispatch_timeout(), Some(Duration::from_millis(2500)));
    }
}
