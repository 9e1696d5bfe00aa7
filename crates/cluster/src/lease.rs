//! Per-bucket leases: every owned bucket is refreshed on a TTL well above
//! the heartbeat interval, so a worker that misses a couple of heartbeats
//! loses the bucket before it can do more damage than a retryable job.

use std::time::Duration;

use chrono::Utc;
use sqlx::PgPool;
use tracing::{debug, warn};

use crate::error::ClusterError;

/// Lease TTL relative to the heartbeat interval, per §4.3 ("TTL ~= 2x
/// heartbeat").
pub const LEASE_TTL_MULTIPLE: u32 = 2;

pub struct LeaseManager {
    pool: PgPool,
    worker_id: String,
    heartbeat_interval: Duration,
    version: std::sync::atomic::AtomicI32,
}

impl LeaseManager {
    pub fn new(pool: PgPool, worker_id: String, heartbeat_interval: Duration) -> Self {
        Self {
            pool,
            worker_id,
            heartbeat_interval,
            version: std::sync::atomic::AtomicI32::new(0),
        }
    }

    fn ttl(&self) -> chrono::Duration {
        chrono::Duration::from_std(self.heartbeat_interval * LEASE_TTL_MULTIPLE)
            .unwrap_or_else(|_| chrono::Duration::seconds(60))
    }

    /// Refresh (or first-acquire) the lease on a single bucket. Returns
    /// `Err(LeaseLost)` when another worker's CAS has already won the bucket.
    pub async fn refresh(&self, bucket_id: i32) -> Result<(), ClusterError> {
        let version = self
            .version
            .fetch_add(1, std::sync::atomic::Ordering::SeqCst)
            + 1;
        let expiry = Utc::now() + self.ttl();
        let acquired = db::repository::bucket_leases::upsert_bucket_lease(
            &self.pool,
            bucket_id,
            &self.worker_id,
            expiry,
            version,
        )
        .await?;

        if acquired {
            debug!(bucket_id, worker_id = %self.worker_id, "bucket lease refreshed");
            Ok(())
        } else {
            warn!(bucket_id, worker_id = %self.worker_id, "lost bucket lease CAS race");
            Err(ClusterError::LeaseLost(bucket_id))
        }
    }

    /// Refresh every bucket in `buckets`, logging (not failing the whole
    /// batch on) individual losses — a lost lease just means the scheduler
    /// drops that one bucket on its next preload pass.
    pub async fn refresh_all(&self, buckets: &[i32]) -> Vec<i32> {
        let mut lost = Vec::new();
        for &bucket_id in buckets {
            if self.refresh(bucket_id).await.is_err() {
                lost.push(bucket_id);
            }
        }
        lost
    }
}
