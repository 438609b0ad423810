//! Error policy: failure classification, retry/backoff and error history
//!
//! `classify` maps a node failure to an [`ErrorAction`]. Precedence, first
//! match wins:
//!
//! 1. a node-kind override registered with [`ErrorPolicy::register_override`]
//! 2. keyword families in the error message: transient (network, connection,
//!    timeout) retries, service-unavailable falls back when fallback is
//!    enabled, configuration/validation aborts
//! 3. safety-critical kinds abort
//! 4. everything else is skipped and the workflow continues
//!
//! [`ErrorPolicy::from_config`] registers overrides for every safety-critical
//! kind (always abort) and every fallback-capable kind (transient or
//! unavailable failures fall back), so those kinds are decided by step 1.

use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::config::ErrorPolicyConfig;
use crate::error::{EngineError, Result};
use crate::types::NodeId;

const TRANSIENT_KEYWORDS: &[&str] = &[
    "network",
    "connection",
    "timeout",
    "timed out",
    "econnrefused",
    "econnreset",
    "socket",
];

const UNAVAILABLE_KEYWORDS: &[&str] = &[
    "service unavailable",
    "unavailable",
    "not available",
    "503",
    "offline",
];

const CONFIGURATION_KEYWORDS: &[&str] = &[
    "configuration",
    "config error",
    "validation",
    "invalid parameter",
    "missing parameter",
];

/// Keyword family an error message belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorFamily {
    /// Network, connection and timeout failures
    Transient,
    /// A backing service is down
    Unavailable,
    /// Configuration or validation problems
    Configuration,
}

impl ErrorFamily {
    /// Family of `message`, checked in precedence order
    pub fn of(message: &str) -> Option<Self> {
        let lower = message.to_lowercase();
        let matches = |keywords: &[&str]| keywords.iter().any(|k| lower.contains(k));

        if matches(TRANSIENT_KEYWORDS) {
            Some(Self::Transient)
        } else if matches(UNAVAILABLE_KEYWORDS) {
            Some(Self::Unavailable)
        } else if matches(CONFIGURATION_KEYWORDS) {
            Some(Self::Configuration)
        } else {
            None
        }
    }
}

/// What a classification is about
#[derive(Debug, Clone, Copy)]
pub struct FailureContext<'a> {
    pub node_id: &'a str,
    pub node_kind: &'a str,
    pub message: &'a str,
}

impl FailureContext<'_> {
    /// Keyword family of the failure message
    pub fn family(&self) -> Option<ErrorFamily> {
        ErrorFamily::of(self.message)
    }
}

/// Produces a substitute node result when a fallback is taken
#[derive(Clone)]
pub struct FallbackFn(Arc<dyn Fn(&FailureContext<'_>) -> serde_json::Value + Send + Sync>);

impl FallbackFn {
    pub fn new(f: impl Fn(&FailureContext<'_>) -> serde_json::Value + Send + Sync + 'static) -> Self {
        Self(Arc::new(f))
    }

    pub fn call(&self, failure: &FailureContext<'_>) -> serde_json::Value {
        (self.0)(failure)
    }
}

impl fmt::Debug for FallbackFn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("FallbackFn")
    }
}

/// Policy decision for a failed node
#[derive(Debug, Clone)]
pub enum ErrorAction {
    /// Re-run the node with its own retry budget
    Retry { max_retries: u32, delay: Duration },
    /// Record a skipped marker; stop the run when `continue_workflow` is false
    Skip { continue_workflow: bool },
    /// Record the fallback's value, or a fallback marker when there is none
    Fallback { fallback: Option<FallbackFn> },
    /// Fail the run, optionally running the cleanup hook first
    Abort { cleanup: bool },
}

impl ErrorAction {
    /// Short action name for logs
    pub fn name(&self) -> &'static str {
        match self {
            Self::Retry { .. } => "retry",
            Self::Skip { .. } => "skip",
            Self::Fallback { .. } => "fallback",
            Self::Abort { .. } => "abort",
        }
    }
}

/// Node-kind specific classification
pub type ErrorOverride = Arc<dyn Fn(&FailureContext<'_>) -> ErrorAction + Send + Sync>;

/// One recorded failure
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeError {
    pub node_id: NodeId,
    pub node_kind: String,
    pub error: String,
    pub timestamp: DateTime<Utc>,
    pub retry_count: u32,
}

/// Aggregates over the error history
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorStats {
    pub total_errors: usize,
    pub by_kind: HashMap<String, usize>,
    pub by_node: HashMap<NodeId, usize>,
    pub average_retries: f64,
}

/// Result of [`ErrorPolicy::execute_with_fallback`]
#[derive(Debug, Clone, PartialEq)]
pub struct FallbackOutcome<T> {
    pub value: T,
    pub used_fallback: bool,
}

/// Classification plus retry state and error history
pub struct ErrorPolicy {
    config: ErrorPolicyConfig,
    overrides: HashMap<String, ErrorOverride>,
    retry_counts: Mutex<HashMap<NodeId, u32>>,
    history: Mutex<VecDeque<NodeError>>,
}

impl ErrorPolicy {
    /// Create a policy with no overrides
    pub fn new(config: ErrorPolicyConfig) -> Self {
        Self {
            config,
            overrides: HashMap::new(),
            retry_counts: Mutex::new(HashMap::new()),
            history: Mutex::new(VecDeque::new()),
        }
    }

    /// Create a policy with the standard safety and fallback overrides
    pub fn from_config(config: ErrorPolicyConfig) -> Self {
        let mut policy = Self::new(config);

        for kind in policy.config.safety_critical_kinds.clone() {
            policy.register_override(kind, |_failure| ErrorAction::Abort { cleanup: true });
        }

        let enable_fallback = policy.config.enable_fallback;
        let max_retries = policy.config.max_retries;
        let delay = policy.config.retry_delay();
        for kind in policy.config.fallback_kinds.clone() {
            policy.register_override(kind, move |failure| match failure.family() {
                Some(ErrorFamily::Transient | ErrorFamily::Unavailable) if enable_fallback => {
                    ErrorAction::Fallback { fallback: None }
                }
                Some(ErrorFamily::Transient) => ErrorAction::Retry { max_retries, delay },
                Some(ErrorFamily::Configuration) => ErrorAction::Abort { cleanup: true },
                _ => ErrorAction::Skip {
                    continue_workflow: true,
                },
            });
        }

        policy
    }

    /// Policy settings
    pub fn config(&self) -> &ErrorPolicyConfig {
        &self.config
    }

    /// Register (or replace) the override for a node kind
    pub fn register_override(
        &mut self,
        kind: impl Into<String>,
        decide: impl Fn(&FailureContext<'_>) -> ErrorAction + Send + Sync + 'static,
    ) {
        self.overrides.insert(kind.into(), Arc::new(decide));
    }

    /// Whether a kind has an override
    pub fn has_override(&self, kind: &str) -> bool {
        self.overrides.contains_key(kind)
    }

    /// Decide the action for a failure without recording it
    pub fn decide(&self, failure: &FailureContext<'_>) -> ErrorAction {
        if let Some(decide) = self.overrides.get(failure.node_kind) {
            return decide(failure);
        }

        match failure.family() {
            Some(ErrorFamily::Transient) => {
                return ErrorAction::Retry {
                    max_retries: self.config.max_retries,
                    delay: self.config.retry_delay(),
                }
            }
            Some(ErrorFamily::Unavailable) if self.config.enable_fallback => {
                return ErrorAction::Fallback { fallback: None }
            }
            Some(ErrorFamily::Configuration) => return ErrorAction::Abort { cleanup: true },
            _ => {}
        }

        if self.config.is_safety_critical(failure.node_kind) {
            return ErrorAction::Abort { cleanup: true };
        }

        ErrorAction::Skip {
            continue_workflow: true,
        }
    }

    /// Classify a failure and append it to the error history
    pub fn classify(&self, node_id: &str, node_kind: &str, error: &EngineError) -> ErrorAction {
        let message = error.to_string();
        let failure = FailureContext {
            node_id,
            node_kind,
            message: &message,
        };
        let action = self.decide(&failure);

        log::warn!(
            "Node '{}' ({}) failed: {} -> {}",
            node_id,
            node_kind,
            message,
            action.name()
        );
        self.record(node_id, node_kind, message);
        action
    }

    fn record(&self, node_id: &str, node_kind: &str, error: String) {
        let entry = NodeError {
            node_id: node_id.to_string(),
            node_kind: node_kind.to_string(),
            error,
            timestamp: Utc::now(),
            retry_count: self.retry_count(node_id),
        };

        let mut history = self.history.lock();
        history.push_back(entry);
        while history.len() > self.config.history_limit {
            history.pop_front();
        }
    }

    /// Backoff before retry number `attempt + 1`
    pub fn backoff(&self, delay: Duration, attempt: u32) -> Duration {
        delay
            .saturating_mul(attempt.saturating_add(1))
            .min(self.config.max_retry_delay())
    }

    /// Run `operation` up to `max_retries + 1` times
    ///
    /// A success resets the node's retry counter. Each failure increments it
    /// and, while attempts remain, sleeps `delay * (attempt + 1)` (capped by
    /// the configured ceiling). The sleep ends early on cancellation. When
    /// every attempt fails the last error is returned.
    pub async fn execute_with_retry<T, F, Fut>(
        &self,
        node_id: &str,
        max_retries: u32,
        delay: Duration,
        cancel: &CancellationToken,
        mut operation: F,
    ) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut attempt: u32 = 0;
        loop {
            if cancel.is_cancelled() {
                return Err(EngineError::Cancelled);
            }

            match operation().await {
                Ok(value) => {
                    self.reset_retries(node_id);
                    return Ok(value);
                }
                Err(err) if err.is_cancelled() => return Err(err),
                Err(err) => {
                    let count = self.bump_retries(node_id);
                    if attempt >= max_retries {
                        log::error!(
                            "Node '{}' failed after {} attempt(s): {}",
                            node_id,
                            attempt + 1,
                            err
                        );
                        return Err(err);
                    }

                    let wait = self.backoff(delay, attempt);
                    log::warn!(
                        "Node '{}' attempt {} failed ({}), retry {} in {:?}",
                        node_id,
                        attempt + 1,
                        err,
                        count,
                        wait
                    );
                    tokio::select! {
                        _ = tokio::time::sleep(wait) => {}
                        _ = cancel.cancelled() => return Err(EngineError::Cancelled),
                    }
                    attempt += 1;
                }
            }
        }
    }

    /// Run `primary`; on any failure run `fallback` with the error
    ///
    /// Only an error from the fallback itself is returned.
    pub async fn execute_with_fallback<T, P, F, FFut>(&self, primary: P, fallback: F) -> Result<FallbackOutcome<T>>
    where
        P: Future<Output = Result<T>>,
        F: FnOnce(EngineError) -> FFut,
        FFut: Future<Output = Result<T>>,
    {
        match primary.await {
            Ok(value) => Ok(FallbackOutcome {
                value,
                used_fallback: false,
            }),
            Err(err) => {
                log::warn!("Primary operation failed ({}), using fallback", err);
                let value = fallback(err).await?;
                Ok(FallbackOutcome {
                    value,
                    used_fallback: true,
                })
            }
        }
    }

    /// Current retry counter for a node
    pub fn retry_count(&self, node_id: &str) -> u32 {
        self.retry_counts.lock().get(node_id).copied().unwrap_or(0)
    }

    fn bump_retries(&self, node_id: &str) -> u32 {
        let mut counts = self.retry_counts.lock();
        let count = counts.entry(node_id.to_string()).or_insert(0);
        *count += 1;
        *count
    }

    fn reset_retries(&self, node_id: &str) {
        self.retry_counts.lock().remove(node_id);
    }

    /// Forget all retry counters (start of a run)
    pub fn reset_retry_counts(&self) {
        self.retry_counts.lock().clear();
    }

    /// Recorded failures, oldest first
    pub fn error_history(&self) -> Vec<NodeError> {
        self.history.lock().iter().cloned().collect()
    }

    /// Drop all recorded failures
    pub fn clear_error_history(&self) {
        self.history.lock().clear();
    }

    /// Aggregates over the current history
    pub fn error_stats(&self) -> ErrorStats {
        let history = self.history.lock();
        let mut stats = ErrorStats {
            total_errors: history.len(),
            ..ErrorStats::default()
        };

        let mut retries: u64 = 0;
        for entry in history.iter() {
            *stats.by_kind.entry(entry.node_kind.clone()).or_insert(0) += 1;
            *stats.by_node.entry(entry.node_id.clone()).or_insert(0) += 1;
            retries += u64::from(entry.retry_count);
        }
        if !history.is_empty() {
            stats.average_retries = retries as f64 / history.len() as f64;
        }
        stats
    }
}

impl Default for ErrorPolicy {
    fn default() -> Self {
        Self::from_config(ErrorPolicyConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn timeout_error() -> EngineError {
        EngineError::Timeout {
            command: "segment".to_string(),
            after_ms: 3000,
        }
    }

    #[test]
    fn test_timeout_on_segmentation_falls_back() {
        let policy = ErrorPolicy::default();
        let action = policy.classify("seg-1", "unipixel_segmentation", &timeout_error());
        assert!(matches!(action, ErrorAction::Fallback { fallback: None }));
    }

    #[test]
    fn test_safety_critical_kind_aborts_regardless_of_message() {
        let policy = ErrorPolicy::default();
        let action = policy.classify("t-1", "takeoff", &timeout_error());
        assert!(matches!(action, ErrorAction::Abort { cleanup: true }));

        let action = policy.classify("t-1", "takeoff", &EngineError::failed("battery low"));
        assert!(matches!(action, ErrorAction::Abort { cleanup: true }));
    }

    #[test]
    fn test_keyword_families_without_override() {
        let policy = ErrorPolicy::default();

        let action = policy.classify("m-1", "move", &EngineError::dispatch("move", "connection refused"));
        assert!(matches!(action, ErrorAction::Retry { max_retries: 3, .. }));

        let action = policy.classify(
            "m-1",
            "move",
            &EngineError::ServiceUnavailable("flight controller".to_string()),
        );
        assert!(matches!(action, ErrorAction::Fallback { .. }));

        let action = policy.classify(
            "m-1",
            "move",
            &EngineError::invalid_parameter("m-1", "distance", "must be positive"),
        );
        assert!(matches!(action, ErrorAction::Abort { cleanup: true }));

        let action = policy.classify("m-1", "move", &EngineError::failed("obstacle ahead"));
        assert!(matches!(
            action,
            ErrorAction::Skip {
                continue_workflow: true
            }
        ));
    }

    #[test]
    fn test_unavailable_without_fallback_is_skipped() {
        let config = ErrorPolicyConfig {
            enable_fallback: false,
            ..ErrorPolicyConfig::default()
        };
        let policy = ErrorPolicy::new(config);
        let action = policy.decide(&FailureContext {
            node_id: "r-1",
            node_kind: "rotate",
            message: "Service unavailable: gimbal",
        });
        assert!(matches!(action, ErrorAction::Skip { .. }));
    }

    #[test]
    fn test_safety_critical_without_overrides_checked_after_keywords() {
        let policy = ErrorPolicy::new(ErrorPolicyConfig::default());
        let action = policy.decide(&FailureContext {
            node_id: "l-1",
            node_kind: "land",
            message: "motor fault",
        });
        assert!(matches!(action, ErrorAction::Abort { cleanup: true }));
    }

    #[test]
    fn test_override_fully_determines_action() {
        let mut policy = ErrorPolicy::new(ErrorPolicyConfig::default());
        policy.register_override("hover", |_| ErrorAction::Skip {
            continue_workflow: false,
        });

        let action = policy.classify("h-1", "hover", &timeout_error());
        assert!(matches!(
            action,
            ErrorAction::Skip {
                continue_workflow: false
            }
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_succeeds_after_two_failures() {
        let policy = ErrorPolicy::default();
        let attempts = AtomicU32::new(0);
        let cancel = CancellationToken::new();

        let value = policy
            .execute_with_retry("n1", 2, Duration::from_millis(100), &cancel, || {
                let n = attempts.fetch_add(1, Ordering::SeqCst);
                async move {
                    if n < 2 {
                        Err(EngineError::dispatch("move", "connection reset"))
                    } else {
                        Ok("arrived")
                    }
                }
            })
            .await
            .unwrap();

        assert_eq!(value, "arrived");
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
        assert_eq!(policy.retry_count("n1"), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_exhaustion_makes_three_attempts() {
        let policy = ErrorPolicy::default();
        let attempts = AtomicU32::new(0);
        let cancel = CancellationToken::new();

        let result: Result<()> = policy
            .execute_with_retry("n1", 2, Duration::from_millis(100), &cancel, || {
                attempts.fetch_add(1, Ordering::SeqCst);
                async { Err(EngineError::dispatch("move", "network down")) }
            })
            .await;

        assert!(matches!(result, Err(EngineError::Dispatch { .. })));
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
        assert_eq!(policy.retry_count("n1"), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_backoff_is_linear_and_capped() {
        let config = ErrorPolicyConfig {
            max_retry_delay_ms: 250,
            ..ErrorPolicyConfig::default()
        };
        let policy = ErrorPolicy::new(config);
        let delay = Duration::from_millis(100);

        assert_eq!(policy.backoff(delay, 0), Duration::from_millis(100));
        assert_eq!(policy.backoff(delay, 1), Duration::from_millis(200));
        assert_eq!(policy.backoff(delay, 5), Duration::from_millis(250));

        let start = tokio::time::Instant::now();
        let cancel = CancellationToken::new();
        let _: Result<()> = policy
            .execute_with_retry("n1", 2, delay, &cancel, || async {
                Err(EngineError::failed("nope"))
            })
            .await;
        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_millis(300));
        assert!(elapsed < Duration::from_millis(400));
    }

    #[tokio::test]
    async fn test_retry_observes_cancellation() {
        let policy = ErrorPolicy::default();
        let cancel = CancellationToken::new();
        cancel.cancel();

        let result: Result<()> = policy
            .execute_with_retry("n1", 5, Duration::from_secs(60), &cancel, || async { Ok(()) })
            .await;
        assert!(matches!(result, Err(EngineError::Cancelled)));
    }

    #[tokio::test]
    async fn test_execute_with_fallback() {
        let policy = ErrorPolicy::default();

        let primary_ok = policy
            .execute_with_fallback(async { Ok(1) }, |_err| async { Ok(2) })
            .await
            .unwrap();
        assert_eq!(primary_ok, FallbackOutcome { value: 1, used_fallback: false });

        let fell_back = policy
            .execute_with_fallback(async { Err(EngineError::failed("down")) }, |_err| async { Ok(2) })
            .await
            .unwrap();
        assert_eq!(fell_back, FallbackOutcome { value: 2, used_fallback: true });

        let both_fail: Result<FallbackOutcome<i32>> = policy
            .execute_with_fallback(async { Err(EngineError::failed("down")) }, |_err| async {
                Err(EngineError::failed("also down"))
            })
            .await;
        assert!(both_fail.is_err());
    }

    #[test]
    fn test_history_is_bounded_and_aggregated() {
        let config = ErrorPolicyConfig {
            history_limit: 3,
            ..ErrorPolicyConfig::default()
        };
        let policy = ErrorPolicy::new(config);
        for i in 0..5 {
            policy.classify(&format!("n{}", i % 2), "move", &EngineError::failed("drift"));
        }

        let history = policy.error_history();
        assert_eq!(history.len(), 3);
        assert_eq!(history[0].node_id, "n0");

        let stats = policy.error_stats();
        assert_eq!(stats.total_errors, 3);
        assert_eq!(stats.by_kind["move"], 3);
        assert_eq!(stats.by_node["n0"], 2);
        assert_eq!(stats.by_node["n1"], 1);
        assert_eq!(stats.average_retries, 0.0);

        policy.clear_error_history();
        assert!(policy.error_history().is_empty());
        assert_eq!(policy.error_stats().total_errors, 0);
    }
}
