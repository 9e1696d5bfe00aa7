//! Engine-level error types.

use thiserror::Error;

/// Errors produced by the workflow executor.
#[derive(Debug, Error)]
pub enum EngineError {
    /// DAG failed validation (duplicate id, dangling edge, cycle).
    #[error("dag error: {0}")]
    Dag(#[from] dag::DagError),

    /// `start_run` was called while a non-terminal run already exists.
    #[error("workflow {0} already has a non-terminal run")]
    NonTerminalRunExists(uuid::Uuid),

    /// `start_run`/`stop_run` targeted a workflow that isn't `online`.
    #[error("workflow {0} is not online")]
    WorkflowNotOnline(uuid::Uuid),

    /// `stop_run`/`rerun_run` lost the CAS race on the workflow-run row —
    /// someone else already transitioned it.
    #[error("workflow run {0} status changed concurrently")]
    ConcurrentRunUpdate(uuid::Uuid),

    /// `retry_job` called on a JobRun that is not `failed`, or whose
    /// `retry_count` has reached `max_retries`.
    #[error("job run {0} is not eligible for retry")]
    RetryNotEligible(uuid::Uuid),

    /// `kill_job_run`/`pass_job_run`/`mark_job_run_failed`/`trigger_job_run`
    /// targeted a JobRun already in a terminal status.
    #[error("job run {0} is already terminal")]
    JobRunAlreadyTerminal(uuid::Uuid),

    /// Persistence error from the db crate.
    #[error("database error: {0}")]
    Database(#[from] db::DbError),
}
