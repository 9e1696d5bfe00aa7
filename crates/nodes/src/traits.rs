//! The `ExecutableNode` trait — the contract every handler must fulfil.

use async_trait::async_trait;
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::NodeError;

/// The context handed to a handler on every invocation (spec §6
/// `HandlerRegistry`/`JobContext`, §9 "ThreadLocal job context becomes an
/// explicit `JobContext` value passed to the handler — no ambient state").
///
/// `shard_range` is `Some` only when the handler is running as one shard of
/// a wide-fanout job (§4.6/§4.7); a non-sharded job always sees `None`.
#[derive(Debug, Clone)]
pub struct JobContext {
    /// ID of the JobRun this invocation belongs to.
    pub job_run_id: Uuid,
    /// Opaque params configured on the job definition (`Job.params`, §3).
    pub params: Value,
    /// How many times this JobRun has already been retried.
    pub retry_count: i32,
    /// `[start, end)` sub-range this invocation covers, for sharded jobs.
    pub shard_range: Option<(i64, i64)>,
    /// Cooperative cancellation signal — set on `kill`/timeout (§4.6, §5).
    /// Handlers that do I/O in a loop should poll `cancel.is_cancelled()`.
    pub cancel: CancellationToken,
}

impl JobContext {
    pub fn span(&self) -> tracing::Span {
        tracing::info_span!("handler", job_run_id = %self.job_run_id, retry_count = self.retry_count)
    }
}

/// Outcome a handler reports on success; distinct from an `Err` (which is
/// always treated as a failure for retry purposes).
#[derive(Debug, Clone, Default)]
pub struct HandlerOutcome {
    pub message: Option<String>,
    pub output: Option<Value>,
}

impl HandlerOutcome {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn with_message(message: impl Into<String>) -> Self {
        Self {
            message: Some(message.into()),
            output: None,
        }
    }
}

/// The core handler trait. Every built-in node and plugin-registered
/// handler implements this; the scheduler's Executor Runtime dispatches
/// through it by `handler_type` name (§6 `HandlerRegistry::getHandler`).
#[async_trait]
pub trait ExecutableNode: Send + Sync {
    /// Run the handler against `ctx`. A `Retryable`/`Fatal` error maps onto
    /// the Executor Runtime's retry policy (§4.6, §7); honouring
    /// `ctx.cancel` cooperatively is the handler's responsibility.
    async fn execute(&self, ctx: &JobContext) -> Result<HandlerOutcome, NodeError>;
}
