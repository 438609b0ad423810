//! The command-dispatch boundary
//!
//! Every effect a node has outside the engine goes through a single
//! `CommandDispatcher` supplied by the host. The engine does not know whether
//! the host forwards commands over a socket, HTTP, or an in-process call.
//!
//! Besides the trait this module provides small adapters:
//!
//! - `CallbackDispatcher`: wraps an async closure (FFI and scripting hosts)
//! - `TimeoutDispatcher`: attaches a hard per-command timeout
//! - `RecordingDispatcher`: records calls and replays scripted responses,
//!   used by tests and dry runs

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::error::{EngineError, Result};

/// Well-known command names understood by drone hosts
pub mod commands {
    pub const TAKEOFF: &str = "takeoff";
    pub const LAND: &str = "land";
    pub const MOVE: &str = "move";
    pub const ROTATE: &str = "rotate";
    pub const HOVER: &str = "hover";
    pub const CAPTURE_IMAGE: &str = "capture_image";
    pub const DETECT_OBJECTS: &str = "detect_objects";
    pub const SEGMENT: &str = "segment";
    pub const SCAN_QR: &str = "scan_qr";
    pub const CHAT: &str = "chat";
    pub const VISION: &str = "vision";
}

/// Host-supplied transport for node effects
#[async_trait]
pub trait CommandDispatcher: Send + Sync {
    /// Send a command and wait for its result
    async fn dispatch(
        &self,
        command: &str,
        payload: Option<serde_json::Value>,
    ) -> Result<serde_json::Value>;
}

#[async_trait]
impl<D: CommandDispatcher + ?Sized> CommandDispatcher for Arc<D> {
    async fn dispatch(
        &self,
        command: &str,
        payload: Option<serde_json::Value>,
    ) -> Result<serde_json::Value> {
        (**self).dispatch(command, payload).await
    }
}

type DispatchFuture = Pin<Box<dyn Future<Output = Result<serde_json::Value>> + Send>>;

/// Async callback-based dispatcher
pub struct CallbackDispatcher {
    callback: Box<dyn Fn(String, Option<serde_json::Value>) -> DispatchFuture + Send + Sync>,
}

impl CallbackDispatcher {
    /// Wrap an async closure
    pub fn new<F, Fut>(callback: F) -> Self
    where
        F: Fn(String, Option<serde_json::Value>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<serde_json::Value>> + Send + 'static,
    {
        Self {
            callback: Box::new(move |command, payload| Box::pin(callback(command, payload))),
        }
    }
}

#[async_trait]
impl CommandDispatcher for CallbackDispatcher {
    async fn dispatch(
        &self,
        command: &str,
        payload: Option<serde_json::Value>,
    ) -> Result<serde_json::Value> {
        (self.callback)(command.to_string(), payload).await
    }
}

/// Dispatcher wrapper that fails commands exceeding a deadline
pub struct TimeoutDispatcher<D> {
    inner: D,
    timeout: Duration,
}

impl<D: CommandDispatcher> TimeoutDispatcher<D> {
    /// Wrap `inner` with a per-command timeout
    pub fn new(inner: D, timeout: Duration) -> Self {
        Self { inner, timeout }
    }
}

#[async_trait]
impl<D: CommandDispatcher> CommandDispatcher for TimeoutDispatcher<D> {
    async fn dispatch(
        &self,
        command: &str,
        payload: Option<serde_json::Value>,
    ) -> Result<serde_json::Value> {
        match tokio::time::timeout(self.timeout, self.inner.dispatch(command, payload)).await {
            Ok(result) => result,
            Err(_) => Err(EngineError::Timeout {
                command: command.to_string(),
                after_ms: self.timeout.as_millis() as u64,
            }),
        }
    }
}

/// A command observed by `RecordingDispatcher`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DispatchedCommand {
    pub command: String,
    pub payload: Option<serde_json::Value>,
}

type FailureFactory = Arc<dyn Fn(&str) -> EngineError + Send + Sync>;

struct ScriptedFailure {
    remaining: Option<usize>,
    make_error: FailureFactory,
}

/// Dispatcher that records every call and answers from a script
///
/// Unscripted commands succeed with `{"status": "ok", "command": <name>}`.
#[derive(Default)]
pub struct RecordingDispatcher {
    calls: Mutex<Vec<DispatchedCommand>>,
    responses: Mutex<HashMap<String, serde_json::Value>>,
    failures: Mutex<HashMap<String, ScriptedFailure>>,
}

impl RecordingDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer `command` with a fixed value
    pub fn respond(self, command: &str, value: serde_json::Value) -> Self {
        self.responses.lock().insert(command.to_string(), value);
        self
    }

    /// Fail the next `times` calls to `command`
    pub fn fail_times(
        self,
        command: &str,
        times: usize,
        make_error: impl Fn(&str) -> EngineError + Send + Sync + 'static,
    ) -> Self {
        self.failures.lock().insert(
            command.to_string(),
            ScriptedFailure {
                remaining: Some(times),
                make_error: Arc::new(make_error),
            },
        );
        self
    }

    /// Fail every call to `command`
    pub fn fail_always(
        self,
        command: &str,
        make_error: impl Fn(&str) -> EngineError + Send + Sync + 'static,
    ) -> Self {
        self.failures.lock().insert(
            command.to_string(),
            ScriptedFailure {
                remaining: None,
                make_error: Arc::new(make_error),
            },
        );
        self
    }

    /// All recorded calls, in order
    pub fn calls(&self) -> Vec<DispatchedCommand> {
        self.calls.lock().clone()
    }

    /// Names of recorded commands, in order
    pub fn command_names(&self) -> Vec<String> {
        self.calls.lock().iter().map(|c| c.command.clone()).collect()
    }

    /// Number of times `command` was dispatched
    pub fn count(&self, command: &str) -> usize {
        self.calls.lock().iter().filter(|c| c.command == command).count()
    }

    fn scripted_failure(&self, command: &str) -> Option<EngineError> {
        let mut failures = self.failures.lock();
        let failure = failures.get_mut(command)?;
        match failure.remaining {
            Some(0) => None,
            Some(ref mut n) => {
                *n -= 1;
                Some((failure.make_error)(command))
            }
            None => Some((failure.make_error)(command)),
        }
    }
}

#[async_trait]
impl CommandDispatcher for RecordingDispatcher {
    async fn dispatch(
        &self,
        command: &str,
        payload: Option<serde_json::Value>,
    ) -> Result<serde_json::Value> {
        log::debug!("Dispatching '{}' with payload {:?}", command, payload);
        self.calls.lock().push(DispatchedCommand {
            command: command.to_string(),
            payload,
        });

        if let Some(err) = self.scripted_failure(command) {
            return Err(err);
        }

        let response = self.responses.lock().get(command).cloned();
        Ok(response.unwrap_or_else(|| serde_json::json!({"status": "ok", "command": command})))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_recording_dispatcher_scripts() {
        let dispatcher = RecordingDispatcher::new()
            .respond(commands::SCAN_QR, serde_json::json!({"content": "A7"}))
            .fail_times(commands::MOVE, 1, |c| EngineError::dispatch(c, "connection reset"));

        let qr = dispatcher.dispatch(commands::SCAN_QR, None).await.unwrap();
        assert_eq!(qr["content"], "A7");

        assert!(dispatcher.dispatch(commands::MOVE, None).await.is_err());
        let moved = dispatcher.dispatch(commands::MOVE, None).await.unwrap();
        assert_eq!(moved["status"], "ok");

        assert_eq!(dispatcher.count(commands::MOVE), 2);
        assert_eq!(
            dispatcher.command_names(),
            vec!["scan_qr".to_string(), "move".to_string(), "move".to_string()]
        );
    }

    #[tokio::test]
    async fn test_callback_dispatcher() {
        let dispatcher = CallbackDispatcher::new(|command, payload| async move {
            Ok(serde_json::json!({"echo": command, "payload": payload}))
        });

        let result = dispatcher
            .dispatch(commands::ROTATE, Some(serde_json::json!({"degrees": 90})))
            .await
            .unwrap();
        assert_eq!(result["echo"], "rotate");
        assert_eq!(result["payload"]["degrees"], 90);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_dispatcher() {
        let slow = CallbackDispatcher::new(|_command, _payload| async move {
            tokio::time::sleep(Duration::from_secs(10)).await;
            Ok(serde_json::Value::Null)
        });
        let dispatcher = TimeoutDispatcher::new(slow, Duration::from_millis(200));

        let err = dispatcher.dispatch(commands::VISION, None).await.unwrap_err();
        assert!(matches!(err, EngineError::Timeout { after_ms: 200, .. }));
    }
}
