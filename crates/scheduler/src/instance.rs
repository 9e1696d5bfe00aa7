//! Job Scheduler, sharded within a worker (§4.5).
//!
//! Each worker runs `N = scheduler_shard_count` instances; instance `k`
//! owns the slice of its worker's buckets where `bucket_id mod N == k`.
//! This is a work partition *within* the owner, not a second layer of
//! cluster sharding — ownership itself is still decided by the
//! `cluster` crate's consistent-hash ring.

use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use cluster::ClusterCoordinator;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use cluster::ClusterMembership;
use db::DbPool;
use transport::Transport;

use crate::clock::Clock;
use crate::error::SchedulerError;
use crate::runtime::ExecutorRuntime;

/// Tuning knobs for one scheduler instance (§4.5, §6 "Bucket count `B`,
/// scheduler shard count `N`... are process-level configuration").
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    pub shard_index: usize,
    pub shard_count: usize,
    pub bucket_count: i32,
    /// Max rows pulled per preload pass.
    pub fetch_size: i64,
    /// How far into the future `trigger_time` is allowed to be and still
    /// get preloaded (§4.5 step 1).
    pub lookahead: Duration,
    /// Fallback sleep between preload passes when nothing wakes the loop
    /// early via a broadcast event.
    pub poll_interval: Duration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            shard_index: 0,
            shard_count: 1,
            bucket_count: 1024,
            fetch_size: 500,
            lookahead: Duration::from_secs(1),
            poll_interval: Duration::from_millis(500),
        }
    }
}

/// One compound-key entry in the dispatch heap: `(trigger_time asc,
/// priority desc, job_run_id asc)` per spec §4.5 step 2.
#[derive(Debug, Clone, Eq, PartialEq)]
struct HeapEntry {
    trigger_time: DateTime<Utc>,
    priority: i32,
    job_run_id: Uuid,
}

impl Ord for HeapEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        self.trigger_time
            .cmp(&other.trigger_time)
            .then_with(|| other.priority.cmp(&self.priority))
            .then_with(|| self.job_run_id.cmp(&other.job_run_id))
    }
}

impl PartialOrd for HeapEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// One shard of the per-worker scheduler. Transient — on crash/restart,
/// recovery is solely from persistence; there is no scheduler-local queue
/// that survives termination (§4.5).
pub struct SchedulerInstance<M: ClusterMembership> {
    pool: DbPool,
    coordinator: Arc<ClusterCoordinator<M>>,
    transport: Arc<dyn Transport>,
    runtime: Arc<ExecutorRuntime>,
    clock: Arc<dyn Clock>,
    config: SchedulerConfig,
}

impl<M: ClusterMembership> SchedulerInstance<M> {
    pub fn new(
        pool: DbPool,
        coordinator: Arc<ClusterCoordinator<M>>,
        transport: Arc<dyn Transport>,
        runtime: Arc<ExecutorRuntime>,
        clock: Arc<dyn Clock>,
        config: SchedulerConfig,
    ) -> Self {
        Self {
            pool,
            coordinator,
            transport,
            runtime,
            clock,
            config,
        }
    }

    /// This instance's slice of the worker's owned buckets: owned buckets
    /// intersected with `{b : b mod N == k}` (§4.5).
    fn my_slice(&self) -> Vec<i32> {
        let n = self.config.shard_count.max(1) as i32;
        let k = self.config.shard_index as i32;
        self.coordinator
            .owned_buckets()
            .into_iter()
            .filter(|b| b.rem_euclid(n) == k)
            .collect()
    }

    /// One preload/order/dispatch pass. Returns the next wake-up delay the
    /// caller should sleep for absent an earlier broadcast wake.
    #[instrument(skip(self), fields(shard = self.config.shard_index))]
    pub async fn tick(&self) -> Result<Duration, SchedulerError> {
        let slice = self.my_slice();
        if slice.is_empty() {
            return Ok(self.config.poll_interval);
        }

        let now = self.clock.now();
        let up_to = now + chrono::Duration::from_std(self.config.lookahead).unwrap_or_default();

        let due = db::repository::job_runs::find_pending_job_runs_by_buckets(
            &self.pool,
            &slice,
            up_to,
            self.config.fetch_size,
        )
        .await?;

        if due.is_empty() {
            return Ok(self.config.poll_interval);
        }

        let mut heap: BinaryHeap<std::cmp::Reverse<HeapEntry>> = BinaryHeap::new();
        let mut priority_of = std::collections::HashMap::new();
        for row in &due {
            let priority = match db::repository::job_defs::get_job_def_for_run(
                &self.pool,
                row.workflow_run_id,
                &row.job_id,
            )
            .await
            {
                Ok(def) => def.priority,
                Err(_) => 0,
            };
            priority_of.insert(row.id, priority);
            heap.push(std::cmp::Reverse(HeapEntry {
                trigger_time: row.trigger_time,
                priority,
                job_run_id: row.id,
            }));
        }

        let mut next_future: Option<DateTime<Utc>> = None;

        while let Some(std::cmp::Reverse(entry)) = heap.pop() {
            if entry.trigger_time > now {
                next_future = Some(entry.trigger_time);
                break;
            }

            let won = db::repository::job_runs::cas_job_run_status(
                &self.pool,
                entry.job_run_id,
                "pending",
                "running",
                Some(now),
            )
            .await?;

            if !won {
                debug!(job_run_id = %entry.job_run_id, "lost CAS race, discarding");
                continue;
            }

            info!(job_run_id = %entry.job_run_id, "dispatching job run to executor runtime");
            self.runtime.spawn(entry.job_run_id);
        }

        let delay = match next_future {
            Some(t) => (t - now)
                .to_std()
                .unwrap_or(Duration::ZERO)
                .min(self.config.poll_interval.max(Duration::from_millis(1)) * 4),
            None => self.config.poll_interval,
        };

        Ok(delay)
    }

    /// Runs until `shutdown` fires, sleeping between preload passes and
    /// waking early whenever a `ControlMessage` arrives on the cluster
    /// topic — a `trigger`/`retry` broadcast for a bucket this instance
    /// owns should not wait out a stale poll interval.
    pub async fn run(&self, shutdown: tokio_util::sync::CancellationToken) {
        let mut wake = self.transport.subscribe("cluster");
        loop {
            let delay = match self.tick().await {
                Ok(d) => d,
                Err(err) => {
                    warn!(shard = self.config.shard_index, error = %err, "scheduler tick failed");
                    self.config.poll_interval
                }
            };

            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = self.clock.sleep(delay) => {},
                recv = wake.recv() => {
                    if matches!(recv, Err(tokio::sync::broadcast::error::RecvError::Closed)) {
                        break;
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration as ChronoDuration;

    fn entry(secs: i64, priority: i32, id: Uuid) -> HeapEntry {
        HeapEntry {
            trigger_time: Utc::now() + ChronoDuration::seconds(secs),
            priority,
            job_run_id: id,
        }
    }

    #[test]
    fn heap_pops_earliest_trigger_time_first() {
        let a = entry(10, 0, Uuid::new_v4());
        let b = entry(1, 0, Uuid::new_v4());
        let mut heap = BinaryHeap::new();
        heap.push(std::cmp::Reverse(a.clone()));
        heap.push(std::cmp::Reverse(b.clone()));
        let std::cmp::Reverse(first) = heap.pop().unwrap();
        assert_eq!(first.job_run_id, b.job_run_id);
    }

    #[test]
    fn heap_breaks_ties_by_priority_descending() {
        let now = Utc::now();
        let low = HeapEntry { trigger_time: now, priority: 1, job_run_id: Uuid::new_v4() };
        let high = HeapEntry { trigger_time: now, priority: 9, job_run_id: Uuid::new_v4() };
        let mut heap = BinaryHeap::new();
        heap.push(std::cmp::Reverse(low));
        heap.push(std::cmp::Reverse(high.clone()));
        let std::cmp::Reverse(first) = heap.pop().unwrap();
        assert_eq!(first.job_run_id, high.job_run_id);
    }
}
