//! `MockNode` — a test double for `ExecutableNode`.
//!
//! Useful in unit and integration tests where a real handler implementation
//! is either unavailable or irrelevant.

use async_trait::async_trait;
use serde_json::Value;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::traits::{HandlerOutcome, JobContext};
use crate::{ExecutableNode, NodeError};

/// Behaviour injected into `MockNode` at construction time.
pub enum MockBehaviour {
    /// Succeed, optionally carrying an output value.
    Succeed(Option<Value>),
    /// Fail with a `Retryable` error.
    FailRetryable(String),
    /// Fail with a `Fatal` error.
    FailFatal(String),
    /// Sleep for `Duration` before succeeding — used to exercise the
    /// Executor Runtime's timeout path (§4.6, §8 property 3).
    Sleep(Duration),
}

/// A handler that records every call it receives and returns a
/// programmer-specified result.
pub struct MockNode {
    /// Label used in test assertions.
    pub name: String,
    /// What the handler will do when `execute` is called.
    pub behaviour: MockBehaviour,
    /// All contexts seen by this handler (in call order).
    pub calls: Arc<Mutex<Vec<JobContext>>>,
}

impl MockNode {
    /// Create a mock that always succeeds.
    pub fn succeeding(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            behaviour: MockBehaviour::Succeed(None),
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Create a mock that always fails with a `Fatal` error.
    pub fn failing_fatal(name: impl Into<String>, msg: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            behaviour: MockBehaviour::FailFatal(msg.into()),
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Create a mock that always fails with a `Retryable` error.
    pub fn failing_retryable(name: impl Into<String>, msg: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            behaviour: MockBehaviour::FailRetryable(msg.into()),
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Create a mock that sleeps past any reasonable test timeout.
    pub fn sleeping(name: impl Into<String>, duration: Duration) -> Self {
        Self {
            name: name.into(),
            behaviour: MockBehaviour::Sleep(duration),
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Number of times this handler has been invoked.
    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

#[async_trait]
impl ExecutableNode for MockNode {
    async fn execute(&self, ctx: &JobContext) -> Result<HandlerOutcome, NodeError> {
        self.calls.lock().unwrap().push(ctx.clone());

        match &self.behaviour {
            MockBehaviour::Succeed(output) => Ok(HandlerOutcome {
                message: Some(format!("{} ok", self.name)),
                output: output.clone(),
            }),
            MockBehaviour::FailRetryable(msg) => Err(NodeError::Retryable(msg.clone())),
            MockBehaviour::FailFatal(msg) => Err(NodeError::Fatal(msg.clone())),
            MockBehaviour::Sleep(duration) => {
                tokio::time::sleep(*duration).await;
                Ok(HandlerOutcome::with_message(format!("{} woke up", self.name)))
            }
        }
    }
}
