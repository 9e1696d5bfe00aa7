//! Scheduler-crate error type.

use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("database error: {0}")]
    Database(#[from] db::DbError),

    #[error("cluster error: {0}")]
    Cluster(#[from] cluster::ClusterError),

    #[error("engine error: {0}")]
    Engine(#[from] engine::EngineError),

    #[error("dag error: {0}")]
    Dag(#[from] dag::DagError),

    /// No handler registered for the job's `handler_type` — permanent
    /// failure, never retried (§7).
    #[error("no handler registered for job run {0}")]
    HandlerNotFound(Uuid),
}
