//! ShardAssignment repository functions (§3, §4.6, §4.7).

use sqlx::PgPool;
use uuid::Uuid;

use crate::{DbError, models::ShardAssignmentRow};

pub async fn create_shard_assignment(
    pool: &PgPool,
    job_run_id: Uuid,
    shard_index: i32,
    range_start: i64,
    range_end: i64,
    assignee_worker_id: &str,
) -> Result<ShardAssignmentRow, DbError> {
    let row = sqlx::query_as!(
        ShardAssignmentRow,
        r#"
        INSERT INTO shard_assignments
            (job_run_id, shard_index, range_start, range_end, assignee_worker_id, status)
        VALUES ($1, $2, $3, $4, $5, 'dispatched')
        ON CONFLICT (job_run_id, shard_index) DO UPDATE SET status = shard_assignments.status
        RETURNING job_run_id, shard_index, range_start, range_end, assignee_worker_id, status
        "#,
        job_run_id,
        shard_index,
        range_start,
        range_end,
        assignee_worker_id,
    )
    .fetch_one(pool)
    .await?;

    Ok(row)
}

/// CAS a shard's status — guards against double-processing a duplicate
/// `shard_completed` message (§4.7 idempotency requirement).
pub async fn cas_shard_status(
    pool: &PgPool,
    job_run_id: Uuid,
    shard_index: i32,
    expected: &str,
    new_status: &str,
) -> Result<bool, DbError> {
    let result = sqlx::query!(
        r#"
        UPDATE shard_assignments SET status = $1
        WHERE job_run_id = $2 AND shard_index = $3 AND status = $4
        "#,
        new_status,
        job_run_id,
        shard_index,
        expected,
    )
    .execute(pool)
    .await?;

    Ok(result.rows_affected() == 1)
}

pub async fn list_shard_assignments(
    pool: &PgPool,
    job_run_id: Uuid,
) -> Result<Vec<ShardAssignmentRow>, DbError> {
    let rows = sqlx::query_as!(
        ShardAssignmentRow,
        r#"
        SELECT job_run_id, shard_index, range_start, range_end, assignee_worker_id, status
        FROM shard_assignments WHERE job_run_id = $1 ORDER BY shard_index ASC
        "#,
        job_run_id,
    )
    .fetch_all(pool)
    .await?;

    Ok(rows)
}
