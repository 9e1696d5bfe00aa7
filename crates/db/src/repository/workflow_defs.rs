//! Workflow-definition repository functions (§3 Workflow entity).

use sqlx::PgPool;
use uuid::Uuid;

use crate::{DbError, models::WorkflowDefRow};

/// Insert a new workflow in `draft` status.
#[allow(clippy::too_many_arguments)]
pub async fn create_workflow_def(
    pool: &PgPool,
    namespace_id: Uuid,
    name: &str,
    trigger_kind: &str,
    trigger_value: Option<&str>,
    timeout_s: i64,
    max_retries: i32,
    priority: i32,
) -> Result<WorkflowDefRow, DbError> {
    let id = Uuid::new_v4();
    let now = chrono::Utc::now();

    let row = sqlx::query_as!(
        WorkflowDefRow,
        r#"
        INSERT INTO workflow_defs
            (id, namespace_id, name, trigger_kind, trigger_value, status, timeout_s, max_retries, priority, created_at)
        VALUES ($1, $2, $3, $4, $5, 'draft', $6, $7, $8, $9)
        RETURNING id, namespace_id, name, trigger_kind, trigger_value, status, timeout_s, max_retries, priority, created_at
        "#,
        id,
        namespace_id,
        name,
        trigger_kind,
        trigger_value,
        timeout_s,
        max_retries,
        priority,
        now,
    )
    .fetch_one(pool)
    .await?;

    Ok(row)
}

pub async fn get_workflow_def(pool: &PgPool, id: Uuid) -> Result<WorkflowDefRow, DbError> {
    sqlx::query_as!(
        WorkflowDefRow,
        r#"SELECT id, namespace_id, name, trigger_kind, trigger_value, status, timeout_s, max_retries, priority, created_at
           FROM workflow_defs WHERE id = $1"#,
        id,
    )
    .fetch_optional(pool)
    .await?
    .ok_or(DbError::NotFound)
}

/// CAS the workflow's `status` column (e.g. `draft -> online` once its DAG
/// validates). Returns `Ok(false)` if `expected` didn't match.
pub async fn cas_workflow_status(
    pool: &PgPool,
    id: Uuid,
    expected: &str,
    new_status: &str,
) -> Result<bool, DbError> {
    let result = sqlx::query!(
        r#"UPDATE workflow_defs SET status = $1 WHERE id = $2 AND status = $3"#,
        new_status,
        id,
        expected,
    )
    .execute(pool)
    .await?;

    Ok(result.rows_affected() == 1)
}

/// Refuse if the workflow still has a non-terminal run; used by
/// `Executor::start_run` and by workflow deletion.
pub async fn has_nonterminal_run(pool: &PgPool, workflow_id: Uuid) -> Result<bool, DbError> {
    let row = sqlx::query!(
        r#"
        SELECT EXISTS(
            SELECT 1 FROM workflow_runs
            WHERE workflow_id = $1 AND status IN ('pending', 'running')
        ) AS "exists!"
        "#,
        workflow_id,
    )
    .fetch_one(pool)
    .await?;

    Ok(row.exists)
}
