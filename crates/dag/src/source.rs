//! The `DagSource` trait — how the pure algorithms in this crate pull data
//! without depending on the `db` crate's connection pool or row types.

use async_trait::async_trait;
use uuid::Uuid;

use crate::error::DagError;
use crate::models::{DagEdge, ParentOutcome};

/// Read-only view of a workflow's DAG and of one run's parent outcomes.
///
/// The `db` crate's repository layer is the production implementation;
/// tests implement this directly over an in-memory map.
#[async_trait]
pub trait DagSource: Send + Sync {
    /// All node IDs and edges that make up a workflow's DAG.
    async fn nodes_and_edges(
        &self,
        workflow_id: Uuid,
    ) -> Result<(Vec<String>, Vec<DagEdge>), DagError>;

    /// For a given job within a given workflow-run, the incoming edges and
    /// each parent's current terminal outcome (`None` if the parent hasn't
    /// reached a terminal status yet).
    async fn parent_outcomes(
        &self,
        job_id: &str,
        workflow_run_id: Uuid,
    ) -> Result<Vec<(DagEdge, Option<ParentOutcome>)>, DagError>;
}
