//! Job-definition and dependency-edge repository functions (§3).

use dag::{DagEdge, DependencyType};
use sqlx::PgPool;
use uuid::Uuid;

use crate::{DbError, models::JobDefRow};

#[allow(clippy::too_many_arguments)]
pub async fn create_job_def(
    pool: &PgPool,
    id: &str,
    workflow_id: Uuid,
    name: &str,
    handler_type: &str,
    params: serde_json::Value,
    timeout_s: i64,
    max_retries: i32,
    retry_interval_s: i64,
    priority: i32,
    shard: Option<(i64, i64, i32)>,
) -> Result<JobDefRow, DbError> {
    let (shard_start, shard_end, shard_parallelism) = match shard {
        Some((s, e, p)) => (Some(s), Some(e), Some(p)),
        None => (None, None, None),
    };

    let row = sqlx::query_as!(
        JobDefRow,
        r#"
        INSERT INTO jobs
            (id, workflow_id, name, handler_type, params, timeout_s, max_retries,
             retry_interval_s, priority, shard_start, shard_end, shard_parallelism)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
        RETURNING id, workflow_id, name, handler_type, params, timeout_s, max_retries,
                  retry_interval_s, priority, shard_start, shard_end, shard_parallelism
        "#,
        id,
        workflow_id,
        name,
        handler_type,
        params,
        timeout_s,
        max_retries,
        retry_interval_s,
        priority,
        shard_start,
        shard_end,
        shard_parallelism,
    )
    .fetch_one(pool)
    .await?;

    Ok(row)
}

/// All jobs belonging to a workflow (spec §6 `selectJobsByWorkflow`).
pub async fn select_jobs_by_workflow(
    pool: &PgPool,
    workflow_id: Uuid,
) -> Result<Vec<JobDefRow>, DbError> {
    let rows = sqlx::query_as!(
        JobDefRow,
        r#"
        SELECT id, workflow_id, name, handler_type, params, timeout_s, max_retries,
               retry_interval_s, priority, shard_start, shard_end, shard_parallelism
        FROM jobs WHERE workflow_id = $1
        "#,
        workflow_id,
    )
    .fetch_all(pool)
    .await?;

    Ok(rows)
}

/// Looks up a job definition by its real primary key, `(workflow_id, id)`.
/// `id` is only a workflow-local DAG node name (e.g. "A") — two workflows
/// may both define a job "A", so every caller must scope the lookup by
/// which workflow it's acting on.
pub async fn get_job_def(
    pool: &PgPool,
    workflow_id: Uuid,
    job_id: &str,
) -> Result<JobDefRow, DbError> {
    sqlx::query_as!(
        JobDefRow,
        r#"
        SELECT id, workflow_id, name, handler_type, params, timeout_s, max_retries,
               retry_interval_s, priority, shard_start, shard_end, shard_parallelism
        FROM jobs WHERE workflow_id = $1 AND id = $2
        "#,
        workflow_id,
        job_id,
    )
    .fetch_optional(pool)
    .await?
    .ok_or(DbError::NotFound)
}

/// Same lookup, scoped from a `workflow_run_id` rather than a `workflow_id`
/// directly — every current caller holds a JobRun (or its run id), not the
/// `Workflow` itself, so this derives `workflow_id` via `workflow_runs` in
/// one round trip instead of making the caller fetch the run first.
pub async fn get_job_def_for_run(
    pool: &PgPool,
    workflow_run_id: Uuid,
    job_id: &str,
) -> Result<JobDefRow, DbError> {
    sqlx::query_as!(
        JobDefRow,
        r#"
        SELECT j.id, j.workflow_id, j.name, j.handler_type, j.params, j.timeout_s,
               j.max_retries, j.retry_interval_s, j.priority, j.shard_start, j.shard_end,
               j.shard_parallelism
        FROM jobs j
        JOIN workflow_runs wr ON wr.workflow_id = j.workflow_id
        WHERE wr.id = $1 AND j.id = $2
        "#,
        workflow_run_id,
        job_id,
    )
    .fetch_optional(pool)
    .await?
    .ok_or(DbError::NotFound)
}

pub async fn create_dependency(
    pool: &PgPool,
    workflow_id: Uuid,
    from_job_id: &str,
    to_job_id: &str,
    dependency_type: DependencyType,
) -> Result<(), DbError> {
    let dep = match dependency_type {
        DependencyType::Success => "SUCCESS",
        DependencyType::Failure => "FAILURE",
        DependencyType::Complete => "COMPLETE",
    };

    sqlx::query!(
        r#"
        INSERT INTO dependencies (workflow_id, from_job_id, to_job_id, dependency_type)
        VALUES ($1, $2, $3, $4)
        "#,
        workflow_id,
        from_job_id,
        to_job_id,
        dep,
    )
    .execute(pool)
    .await?;

    Ok(())
}

/// All edges for a workflow, shaped as [`DagEdge`]s for the `dag` crate.
pub async fn select_dependencies(
    pool: &PgPool,
    workflow_id: Uuid,
) -> Result<Vec<DagEdge>, DbError> {
    let rows = sqlx::query!(
        r#"SELECT from_job_id, to_job_id, dependency_type FROM dependencies WHERE workflow_id = $1"#,
        workflow_id,
    )
    .fetch_all(pool)
    .await?;

    Ok(rows
        .into_iter()
        .map(|r| DagEdge {
            from: r.from_job_id,
            to: r.to_job_id,
            dependency_type: match r.dependency_type.as_str() {
                "SUCCESS" => DependencyType::Success,
                "FAILURE" => DependencyType::Failure,
                _ => DependencyType::Complete,
            },
        })
        .collect())
}
