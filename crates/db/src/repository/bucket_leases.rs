//! BucketLease repository functions (§3, §4.3, §6 `upsertBucketLease`).

use chrono::{DateTime, Utc};
use sqlx::PgPool;

use crate::{DbError, models::BucketLeaseRow};

/// Insert or refresh a bucket's lease. On conflict, only overwrites when the
/// caller's `version` is newer (or the existing lease has already expired),
/// so a stale acquirer racing a fresher one always loses.
pub async fn upsert_bucket_lease(
    pool: &PgPool,
    bucket_id: i32,
    owner_worker_id: &str,
    lease_expiry: DateTime<Utc>,
    version: i32,
) -> Result<bool, DbError> {
    let result = sqlx::query!(
        r#"
        INSERT INTO bucket_leases (bucket_id, owner_worker_id, lease_expiry, version)
        VALUES ($1, $2, $3, $4)
        ON CONFLICT (bucket_id) DO UPDATE
        SET owner_worker_id = EXCLUDED.owner_worker_id,
            lease_expiry = EXCLUDED.lease_expiry,
            version = EXCLUDED.version
        WHERE bucket_leases.version < EXCLUDED.version
           OR bucket_leases.lease_expiry < now()
        "#,
        bucket_id,
        owner_worker_id,
        lease_expiry,
        version,
    )
    .execute(pool)
    .await?;

    Ok(result.rows_affected() == 1)
}

pub async fn get_bucket_lease(
    pool: &PgPool,
    bucket_id: i32,
) -> Result<Option<BucketLeaseRow>, DbError> {
    let row = sqlx::query_as!(
        BucketLeaseRow,
        r#"SELECT bucket_id, owner_worker_id, lease_expiry, version FROM bucket_leases WHERE bucket_id = $1"#,
        bucket_id,
    )
    .fetch_optional(pool)
    .await?;

    Ok(row)
}

pub async fn all_bucket_leases(pool: &PgPool) -> Result<Vec<BucketLeaseRow>, DbError> {
    let rows = sqlx::query_as!(
        BucketLeaseRow,
        r#"SELECT bucket_id, owner_worker_id, lease_expiry, version FROM bucket_leases"#,
    )
    .fetch_all(pool)
    .await?;

    Ok(rows)
}
