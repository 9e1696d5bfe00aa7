//! [`dag::DagSource`] implementation over the Postgres-backed repository
//! functions — what `dag::topo_sort`/`dag::downstream_closure`/
//! `dag::dependencies_satisfied` actually run against in production.

use async_trait::async_trait;
use dag::{DagEdge, DagError, DagSource, ParentOutcome};
use uuid::Uuid;

use crate::repository::{job_defs, job_runs};
use crate::DbPool;

pub struct PgDagSource {
    pool: DbPool,
}

impl PgDagSource {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn status_to_outcome(status: &str) -> Option<ParentOutcome> {
    match status {
        "completed" => Some(ParentOutcome::Completed),
        "failed" | "timeout" => Some(ParentOutcome::Failed),
        "skipped" => Some(ParentOutcome::Skipped),
        _ => None,
    }
}

#[async_trait]
impl DagSource for PgDagSource {
    async fn nodes_and_edges(
        &self,
        workflow_id: Uuid,
    ) -> Result<(Vec<String>, Vec<DagEdge>), DagError> {
        let jobs = job_defs::select_jobs_by_workflow(&self.pool, workflow_id)
            .await
            .map_err(|e| DagError::Source(e.to_string()))?;
        let edges = job_defs::select_dependencies(&self.pool, workflow_id)
            .await
            .map_err(|e| DagError::Source(e.to_string()))?;

        let nodes = jobs.into_iter().map(|j| j.id).collect();
        Ok((nodes, edges))
    }

    async fn parent_outcomes(
        &self,
        job_id: &str,
        workflow_run_id: Uuid,
    ) -> Result<Vec<(DagEdge, Option<ParentOutcome>)>, DagError> {
        // Load this job's job-run within the run to get its declared parents,
        // then the workflow's edges to recover each parent's dependency_type,
        // then batch-read the parent run statuses in one round-trip.
        let job_runs_in_run = job_runs::list_job_runs_for_workflow_run(&self.pool, workflow_run_id)
            .await
            .map_err(|e| DagError::Source(e.to_string()))?;

        let Some(this_run) = job_runs_in_run.iter().find(|r| r.job_id == job_id) else {
            return Ok(Vec::new());
        };

        let workflow_id = {
            let wr = crate::repository::workflow_runs::get_workflow_run(&self.pool, workflow_run_id)
                .await
                .map_err(|e| DagError::Source(e.to_string()))?;
            wr.workflow_id
        };
        let edges = job_defs::select_dependencies(&self.pool, workflow_id)
            .await
            .map_err(|e| DagError::Source(e.to_string()))?;
        let incoming: Vec<DagEdge> = edges.into_iter().filter(|e| e.to == job_id).collect();

        let parent_ids = this_run.parent_run_ids();
        let statuses = job_runs::job_run_statuses(&self.pool, &parent_ids)
            .await
            .map_err(|e| DagError::Source(e.to_string()))?;

        // Map parent JobRun id -> job_id -> status, so we can pair each
        // incoming edge with its specific parent's outcome.
        let run_by_id: std::collections::HashMap<Uuid, &crate::models::JobRunRow> = job_runs_in_run
            .iter()
            .map(|r| (r.id, r))
            .collect();
        let status_by_run: std::collections::HashMap<Uuid, &str> = statuses
            .iter()
            .map(|(id, s)| (*id, s.as_str()))
            .collect();

        let result = incoming
            .into_iter()
            .filter_map(|edge| {
                let parent_run = parent_ids
                    .iter()
                    .find(|pid| run_by_id.get(pid).map(|r| r.job_id == edge.from).unwrap_or(false))?;
                let outcome = status_by_run.get(parent_run).and_then(|s| status_to_outcome(s));
                Some((edge, outcome))
            })
            .collect();

        Ok(result)
    }
}
