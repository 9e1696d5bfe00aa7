//! JobRun repository functions — the CAS-heavy heart of the persistence
//! layer (§6 `casJobRunStatus`, `findPendingJobRunsByBuckets`,
//! `addDependencyCompletedAtomic`).

use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::bucket::bucket_of;
use crate::{DbError, models::JobRunRow};

/// Create one JobRun per job in a freshly-started workflow run. Jobs with no
/// parents are created `pending`; everything else starts `waiting`.
pub async fn create_job_run(
    pool: &PgPool,
    workflow_run_id: Uuid,
    job_id: &str,
    bucket_count: i32,
    parent_run_ids: &[Uuid],
    trigger_time: DateTime<Utc>,
) -> Result<JobRunRow, DbError> {
    let id = Uuid::new_v4();
    let bucket_id = bucket_of(job_id, bucket_count);
    let status = if parent_run_ids.is_empty() {
        "pending"
    } else {
        "waiting"
    };
    let parent_run_ids_json = serde_json::to_value(parent_run_ids)?;
    let empty: Vec<Uuid> = Vec::new();
    let dependency_completed_json = serde_json::to_value(&empty)?;

    let row = sqlx::query_as!(
        JobRunRow,
        r#"
        INSERT INTO job_runs
            (id, workflow_run_id, job_id, bucket_id, trigger_time, status, retry_count,
             start_time, end_time, parent_run_ids, dependency_completed, version)
        VALUES ($1, $2, $3, $4, $5, $6, 0, NULL, NULL, $7, $8, 0)
        RETURNING id, workflow_run_id, job_id, bucket_id, trigger_time, status, retry_count,
                  start_time, end_time, parent_run_ids, dependency_completed, version
        "#,
        id,
        workflow_run_id,
        job_id,
        bucket_id,
        trigger_time,
        status,
        parent_run_ids_json,
        dependency_completed_json,
    )
    .fetch_one(pool)
    .await?;

    Ok(row)
}

pub async fn get_job_run(pool: &PgPool, id: Uuid) -> Result<JobRunRow, DbError> {
    sqlx::query_as!(
        JobRunRow,
        r#"
        SELECT id, workflow_run_id, job_id, bucket_id, trigger_time, status, retry_count,
               start_time, end_time, parent_run_ids, dependency_completed, version
        FROM job_runs WHERE id = $1
        "#,
        id,
    )
    .fetch_optional(pool)
    .await?
    .ok_or(DbError::NotFound)
}

/// All JobRuns for a workflow-run (spec §6 `GET /workflow-run/{id}/jobs`).
pub async fn list_job_runs_for_workflow_run(
    pool: &PgPool,
    workflow_run_id: Uuid,
) -> Result<Vec<JobRunRow>, DbError> {
    let rows = sqlx::query_as!(
        JobRunRow,
        r#"
        SELECT id, workflow_run_id, job_id, bucket_id, trigger_time, status, retry_count,
               start_time, end_time, parent_run_ids, dependency_completed, version
        FROM job_runs WHERE workflow_run_id = $1
        "#,
        workflow_run_id,
    )
    .fetch_all(pool)
    .await?;

    Ok(rows)
}

/// Batch-read the current status of a set of JobRuns by id — used by
/// `dag::dependencies_satisfied`'s O(1)-round-trip parent lookup.
pub async fn job_run_statuses(
    pool: &PgPool,
    ids: &[Uuid],
) -> Result<Vec<(Uuid, String)>, DbError> {
    let rows = sqlx::query!(
        r#"SELECT id, status FROM job_runs WHERE id = ANY($1)"#,
        ids,
    )
    .fetch_all(pool)
    .await?;

    Ok(rows.into_iter().map(|r| (r.id, r.status)).collect())
}

/// Batch-read all `pending` JobRuns owned by the given buckets, due by
/// `up_to_time`, bounded by `limit` (§4.5 step 1, the scheduler preload).
pub async fn find_pending_job_runs_by_buckets(
    pool: &PgPool,
    buckets: &[i32],
    up_to_time: DateTime<Utc>,
    limit: i64,
) -> Result<Vec<JobRunRow>, DbError> {
    let rows = sqlx::query_as!(
        JobRunRow,
        r#"
        SELECT id, workflow_run_id, job_id, bucket_id, trigger_time, status, retry_count,
               start_time, end_time, parent_run_ids, dependency_completed, version
        FROM job_runs
        WHERE status = 'pending' AND bucket_id = ANY($1) AND trigger_time <= $2
        ORDER BY trigger_time ASC
        LIMIT $3
        "#,
        buckets,
        up_to_time,
        limit,
    )
    .fetch_all(pool)
    .await?;

    Ok(rows)
}

/// CAS a JobRun's status. The sole concurrency primitive schedulers and the
/// executor rely on: only the caller whose `expected` matches the row's
/// current status wins.
pub async fn cas_job_run_status(
    pool: &PgPool,
    id: Uuid,
    expected: &str,
    new_status: &str,
    start_time: Option<DateTime<Utc>>,
) -> Result<bool, DbError> {
    let result = sqlx::query!(
        r#"
        UPDATE job_runs
        SET status = $1, start_time = COALESCE($2, start_time)
        WHERE id = $3 AND status = $4
        "#,
        new_status,
        start_time,
        id,
        expected,
    )
    .execute(pool)
    .await?;

    Ok(result.rows_affected() == 1)
}

/// Same as [`cas_job_run_status`] but also stamps `end_time` and bumps
/// `retry_count` — used for terminal transitions and retries.
pub async fn cas_job_run_terminal(
    pool: &PgPool,
    id: Uuid,
    expected: &str,
    new_status: &str,
    end_time: DateTime<Utc>,
) -> Result<bool, DbError> {
    let result = sqlx::query!(
        r#"UPDATE job_runs SET status = $1, end_time = $2 WHERE id = $3 AND status = $4"#,
        new_status,
        end_time,
        id,
        expected,
    )
    .execute(pool)
    .await?;

    Ok(result.rows_affected() == 1)
}

/// Reset a JobRun back to `pending` for a retry: bumps `retry_count`, clears
/// `dependency_completed` (re-evaluated fresh), clears timestamps.
pub async fn retry_job_run(pool: &PgPool, id: Uuid, expected: &str) -> Result<bool, DbError> {
    let empty: Vec<Uuid> = Vec::new();
    let empty_json = serde_json::to_value(&empty)?;

    let result = sqlx::query!(
        r#"
        UPDATE job_runs
        SET status = 'pending', retry_count = retry_count + 1, version = version + 1,
            dependency_completed = $1, start_time = NULL, end_time = NULL
        WHERE id = $2 AND status = $3
        "#,
        empty_json,
        id,
        expected,
    )
    .execute(pool)
    .await?;

    Ok(result.rows_affected() == 1)
}

/// Reset a JobRun to `waiting`/`pending` for a rerun, clearing
/// `dependency_completed` — same shape as a retry but not gated on the
/// `failed` precondition, and callable regardless of current status.
pub async fn reset_for_rerun(
    pool: &PgPool,
    id: Uuid,
    new_status: &str,
) -> Result<(), DbError> {
    let empty: Vec<Uuid> = Vec::new();
    let empty_json = serde_json::to_value(&empty)?;

    sqlx::query!(
        r#"
        UPDATE job_runs
        SET status = $1, version = version + 1, dependency_completed = $2,
            start_time = NULL, end_time = NULL
        WHERE id = $3
        "#,
        new_status,
        empty_json,
        id,
    )
    .execute(pool)
    .await?;

    Ok(())
}

/// Atomically add `parent_run_id` to `dependency_completed` using an
/// optimistic-locking loop (read version, compute new set, CAS on version) —
/// the fallback strategy spec §9 prescribes when no native atomic set
/// primitive is available (plain Postgres `jsonb`, in this case).
pub async fn add_dependency_completed_atomic(
    pool: &PgPool,
    job_run_id: Uuid,
    parent_run_id: Uuid,
) -> Result<(), DbError> {
    loop {
        let row = get_job_run(pool, job_run_id).await?;
        let mut completed = row.dependency_completed();
        if completed.contains(&parent_run_id) {
            return Ok(()); // already recorded, idempotent
        }
        completed.push(parent_run_id);
        let new_json = serde_json::to_value(&completed)?;

        let result = sqlx::query!(
            r#"
            UPDATE job_runs SET dependency_completed = $1, version = version + 1
            WHERE id = $2 AND version = $3
            "#,
            new_json,
            job_run_id,
            row.version,
        )
        .execute(pool)
        .await?;

        if result.rows_affected() == 1 {
            return Ok(());
        }
        // Lost the race against a concurrent writer; retry with fresh state.
    }
}

/// Terminal/failure counts for one workflow-run's JobRuns, backing both
/// halves of spec §3's completion rule (`completed` iff all terminal and
/// none failed; `failed` iff all terminal and at least one failed).
pub async fn terminal_summary(
    pool: &PgPool,
    workflow_run_id: Uuid,
) -> Result<TerminalSummary, DbError> {
    let row = sqlx::query!(
        r#"
        SELECT
            COUNT(*) AS "total!",
            COUNT(*) FILTER (WHERE status IN ('completed','failed','skipped','timeout')) AS "terminal!",
            COUNT(*) FILTER (WHERE status IN ('failed','timeout')) AS "failed!"
        FROM job_runs WHERE workflow_run_id = $1
        "#,
        workflow_run_id,
    )
    .fetch_one(pool)
    .await?;

    Ok(TerminalSummary {
        total: row.total,
        terminal: row.terminal,
        failed: row.failed,
    })
}

#[derive(Debug, Clone, Copy)]
pub struct TerminalSummary {
    pub total: i64,
    pub terminal: i64,
    pub failed: i64,
}

impl TerminalSummary {
    pub fn all_terminal(&self) -> bool {
        self.total > 0 && self.terminal == self.total
    }

    pub fn has_failure(&self) -> bool {
        self.failed > 0
    }
}

/// JobRuns in the same workflow-run whose parent set includes `parent_job_id`
/// — used by `onJobTerminal` to find downstream runs to notify.
pub async fn downstream_job_runs(
    pool: &PgPool,
    workflow_run_id: Uuid,
    parent_run_id: Uuid,
) -> Result<Vec<JobRunRow>, DbError> {
    let rows = sqlx::query_as!(
        JobRunRow,
        r#"
        SELECT id, workflow_run_id, job_id, bucket_id, trigger_time, status, retry_count,
               start_time, end_time, parent_run_ids, dependency_completed, version
        FROM job_runs
        WHERE workflow_run_id = $1 AND parent_run_ids @> jsonb_build_array($2::text)
        "#,
        workflow_run_id,
        parent_run_id.to_string(),
    )
    .fetch_all(pool)
    .await?;

    Ok(rows)
}
