//! WorkflowRun repository functions (§3, §6 `updateWorkflowRunStatus`).

use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::{DbError, models::WorkflowRunRow};

pub async fn create_workflow_run(
    pool: &PgPool,
    workflow_id: Uuid,
    trigger_correlation: Option<&str>,
) -> Result<WorkflowRunRow, DbError> {
    let id = Uuid::new_v4();
    let now = Utc::now();

    let row = sqlx::query_as!(
        WorkflowRunRow,
        r#"
        INSERT INTO workflow_runs (id, workflow_id, status, start_time, end_time, trigger_correlation)
        VALUES ($1, $2, 'running', $3, NULL, $4)
        RETURNING id, workflow_id, status, start_time, end_time, trigger_correlation
        "#,
        id,
        workflow_id,
        now,
        trigger_correlation,
    )
    .fetch_one(pool)
    .await?;

    Ok(row)
}

pub async fn get_workflow_run(pool: &PgPool, id: Uuid) -> Result<WorkflowRunRow, DbError> {
    sqlx::query_as!(
        WorkflowRunRow,
        r#"SELECT id, workflow_id, status, start_time, end_time, trigger_correlation
           FROM workflow_runs WHERE id = $1"#,
        id,
    )
    .fetch_optional(pool)
    .await?
    .ok_or(DbError::NotFound)
}

/// Unconditional status update (the executor is the sole writer of workflow-run
/// status, driven off job-run terminal events — no concurrent writer to race).
pub async fn update_workflow_run_status(
    pool: &PgPool,
    id: Uuid,
    status: &str,
    end_time: Option<DateTime<Utc>>,
) -> Result<(), DbError> {
    sqlx::query!(
        r#"UPDATE workflow_runs SET status = $1, end_time = $2 WHERE id = $3"#,
        status,
        end_time,
        id,
    )
    .execute(pool)
    .await?;

    Ok(())
}

/// CAS variant used by `stopRun`, which must not stomp on a run that already
/// reached a terminal status concurrently.
pub async fn cas_workflow_run_status(
    pool: &PgPool,
    id: Uuid,
    expected: &str,
    new_status: &str,
    end_time: Option<DateTime<Utc>>,
) -> Result<bool, DbError> {
    let result = sqlx::query!(
        r#"UPDATE workflow_runs SET status = $1, end_time = $2 WHERE id = $3 AND status = $4"#,
        new_status,
        end_time,
        id,
        expected,
    )
    .execute(pool)
    .await?;

    Ok(result.rows_affected() == 1)
}
