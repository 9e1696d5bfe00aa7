//! Shard Coordinator (§4.6 step 5) and Shard Receiver (§4.7) — the
//! wide-fanout half of the Executor Runtime.
//!
//! A job with `shard.parallelism > 1` never runs a handler directly on the
//! worker that claimed it; instead the claiming worker becomes a
//! coordinator, splits the key range, and farms sub-ranges out to whatever
//! worker a `ShardReceiver` is running on (possibly itself, for one shard).
//! Coordination rides the same best-effort broadcast bus as every other
//! control message — `shard_exec`/`shard_completed` are just two more
//! `ControlMessage` variants, deduplicated and reassembled from persisted
//! `shard_assignments` rows rather than any in-memory transport ordering
//! guarantee.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use dashmap::DashMap;
use tracing::{info, instrument, warn};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use cluster::ClusterMembership;
use db::DbPool;
use engine::{JobOutcome, WorkflowExecutor};
use nodes::{HandlerRegistry, JobContext};
use transport::{ControlMessage, Transport};

use crate::clock::Clock;
use crate::error::SchedulerError;

/// Splits `[start, end)` into `parallelism` approximately-equal,
/// non-overlapping sub-ranges (§4.6 step 1). The last range absorbs any
/// remainder so the union is always exactly `[start, end)`.
pub fn split_range(start: i64, end: i64, parallelism: i32) -> Vec<(i64, i64)> {
    assert!(parallelism > 0, "parallelism must be positive");
    let total = (end - start).max(0);
    let parallelism = parallelism as i64;
    let chunk = total / parallelism;
    let remainder = total % parallelism;

    let mut ranges = Vec::with_capacity(parallelism as usize);
    let mut cursor = start;
    for i in 0..parallelism {
        let mut size = chunk;
        if i == parallelism - 1 {
            size += remainder;
        }
        let range_end = cursor + size;
        ranges.push((cursor, range_end));
        cursor = range_end;
    }
    ranges
}

/// Runs on the worker that claimed a sharded JobRun; fans the range out and
/// waits for every shard to report back.
pub struct ShardCoordinator {
    pool: DbPool,
    transport: Arc<dyn Transport>,
    executor: Arc<WorkflowExecutor>,
    clock: Arc<dyn Clock>,
    local_worker_id: String,
}

impl ShardCoordinator {
    pub fn new(
        pool: DbPool,
        transport: Arc<dyn Transport>,
        executor: Arc<WorkflowExecutor>,
        clock: Arc<dyn Clock>,
        local_worker_id: String,
    ) -> Self {
        Self {
            pool,
            transport,
            executor,
            clock,
            local_worker_id,
        }
    }

    /// Picks assignees round-robin starting at the local worker, so a
    /// single-node deployment degenerates to "every shard runs locally".
    fn pick_assignees(&self, members: &[String], shard_count: usize) -> Vec<String> {
        if members.is_empty() {
            return vec![self.local_worker_id.clone(); shard_count];
        }
        let start = members
            .iter()
            .position(|m| m == &self.local_worker_id)
            .unwrap_or(0);
        (0..shard_count)
            .map(|i| members[(start + i) % members.len()].clone())
            .collect()
    }

    #[instrument(skip(self), fields(%job_run_id))]
    pub async fn run(
        &self,
        job_run_id: Uuid,
        range_start: i64,
        range_end: i64,
        parallelism: i32,
        timeout_s: i64,
    ) -> Result<(), SchedulerError> {
        self.run_with_membership(job_run_id, range_start, range_end, parallelism, timeout_s, &[])
            .await
    }

    /// Same as [`run`](Self::run) but takes an explicit membership snapshot
    /// — split out so tests can exercise multi-worker assignment without a
    /// live `ClusterMembership`.
    pub async fn run_with_membership(
        &self,
        job_run_id: Uuid,
        range_start: i64,
        range_end: i64,
        parallelism: i32,
        timeout_s: i64,
        members: &[String],
    ) -> Result<(), SchedulerError> {
        let ranges = split_range(range_start, range_end, parallelism);
        let assignees = self.pick_assignees(members, ranges.len());

        let mut rx = self.transport.subscribe("cluster");

        for (shard_index, ((start, end), assignee)) in
            ranges.iter().zip(assignees.iter()).enumerate()
        {
            db::repository::shard_assignments::create_shard_assignment(
                &self.pool,
                job_run_id,
                shard_index as i32,
                *start,
                *end,
                assignee,
            )
            .await?;

            let _ = self
                .transport
                .send_to(
                    assignee,
                    ControlMessage::ShardExec {
                        event_id: Uuid::new_v4(),
                        timestamp: Utc::now(),
                        job_run_id,
                        shard_index: shard_index as i32,
                        range_start: *start,
                        range_end: *end,
                    },
                )
                .await;
        }

        let shard_count = ranges.len();
        let mut outcomes: HashMap<i32, bool> = HashMap::new();
        let deadline = Duration::from_secs(timeout_s.max(0) as u64);

        let wait = async {
            while outcomes.len() < shard_count {
                match rx.recv().await {
                    Ok(ControlMessage::ShardCompleted {
                        job_run_id: jr,
                        shard_index,
                        success,
                        ..
                    }) if jr == job_run_id => {
                        outcomes.entry(shard_index).or_insert(success);
                    }
                    Ok(_) => continue,
                    Err(tokio::sync::broadcast::error::RecvError::Lagged(_)) => continue,
                    Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
                }
            }
        };

        let timed_out = tokio::time::timeout(deadline, wait).await.is_err();

        let now = Utc::now();
        if timed_out {
            warn!(%job_run_id, reported = outcomes.len(), shard_count, "shard job timed out");
            db::repository::job_runs::cas_job_run_terminal(
                &self.pool, job_run_id, "running", "timeout", now,
            )
            .await?;
            self.executor.on_job_terminal(job_run_id, JobOutcome::Timeout).await?;
            return Ok(());
        }

        let all_succeeded = outcomes.len() == shard_count && outcomes.values().all(|ok| *ok);
        info!(%job_run_id, all_succeeded, shard_count, "shard job aggregated");

        let new_status = if all_succeeded { "completed" } else { "failed" };
        db::repository::job_runs::cas_job_run_terminal(
            &self.pool, job_run_id, "running", new_status, now,
        )
        .await?;
        self.executor
            .on_job_terminal(
                job_run_id,
                if all_succeeded {
                    JobOutcome::Completed
                } else {
                    JobOutcome::Failed
                },
            )
            .await?;

        Ok(())
    }
}

/// Convenience wrapper that reads the current membership snapshot before
/// delegating to [`ShardCoordinator::run_with_membership`].
pub async fn run_shard_job_with_live_membership(
    coordinator: &ShardCoordinator,
    membership: &dyn ClusterMembership,
    job_run_id: Uuid,
    range_start: i64,
    range_end: i64,
    parallelism: i32,
    timeout_s: i64,
) -> Result<(), SchedulerError> {
    let members = membership.snapshot().await;
    coordinator
        .run_with_membership(job_run_id, range_start, range_end, parallelism, timeout_s, &members)
        .await
}

/// Cached outcome of one already-completed shard, kept so a duplicate
/// `shard_exec` (at-least-once delivery, §4.4) re-emits the same result
/// instead of re-running the handler (§4.7 idempotency requirement).
#[derive(Debug, Clone)]
struct CachedShard {
    success: bool,
}

/// Runs on every worker; handles `shard_exec` addressed to it by running
/// the named handler against the received sub-range and reporting back.
pub struct ShardReceiver {
    local_worker_id: String,
    pool: DbPool,
    registry: Arc<HandlerRegistry>,
    transport: Arc<dyn Transport>,
    completed: DashMap<(Uuid, i32), CachedShard>,
}

impl ShardReceiver {
    pub fn new(
        local_worker_id: String,
        pool: DbPool,
        registry: Arc<HandlerRegistry>,
        transport: Arc<dyn Transport>,
    ) -> Self {
        Self {
            local_worker_id,
            pool,
            registry,
            transport,
            completed: DashMap::new(),
        }
    }

    /// Runs until the worker's private inbox closes, dispatching every
    /// `shard_exec` addressed to it. Call this once per worker, spawned on
    /// its own task.
    pub async fn run(self: Arc<Self>) {
        let mut rx = self.transport.subscribe_worker(&self.local_worker_id);
        loop {
            match rx.recv().await {
                Ok(ControlMessage::ShardExec {
                    job_run_id,
                    shard_index,
                    range_start,
                    range_end,
                    ..
                }) => {
                    let this = Arc::clone(&self);
                    tokio::spawn(async move {
                        this.handle(job_run_id, shard_index, range_start, range_end).await;
                    });
                }
                Ok(_) => continue,
                Err(tokio::sync::broadcast::error::RecvError::Lagged(_)) => continue,
                Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
            }
        }
    }

    async fn handle(&self, job_run_id: Uuid, shard_index: i32, range_start: i64, range_end: i64) {
        if let Some(cached) = self.completed.get(&(job_run_id, shard_index)) {
            self.report(job_run_id, shard_index, cached.success).await;
            return;
        }

        let job_run = match db::repository::job_runs::get_job_run(&self.pool, job_run_id).await {
            Ok(jr) => jr,
            Err(err) => {
                warn!(%job_run_id, shard_index, error = %err, "shard_exec for unknown job run");
                return;
            }
        };
        let job_def = match db::repository::job_defs::get_job_def_for_run(
            &self.pool,
            job_run.workflow_run_id,
            &job_run.job_id,
        )
        .await
        {
            Ok(jd) => jd,
            Err(err) => {
                warn!(%job_run_id, shard_index, error = %err, "shard_exec missing job def");
                return;
            }
        };

        let success = match self.registry.get(&job_def.handler_type) {
            None => false,
            Some(handler) => {
                let ctx = JobContext {
                    job_run_id,
                    params: job_def.params.clone(),
                    retry_count: job_run.retry_count,
                    shard_range: Some((range_start, range_end)),
                    cancel: CancellationToken::new(),
                };
                handler.execute(&ctx).await.is_ok()
            }
        };

        self.completed.insert((job_run_id, shard_index), CachedShard { success });
        self.report(job_run_id, shard_index, success).await;
    }

    async fn report(&self, job_run_id: Uuid, shard_index: i32, success: bool) {
        let _ = self
            .transport
            .broadcast(
                "cluster",
                ControlMessage::ShardCompleted {
                    event_id: Uuid::new_v4(),
                    timestamp: Utc::now(),
                    job_run_id,
                    shard_index,
                    success,
                },
            )
            .await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_range_covers_whole_span_with_no_gaps() {
        let ranges = split_range(0, 1000, 4);
        assert_eq!(ranges, vec![(0, 250), (250, 500), (500, 750), (750, 1000)]);
    }

    #[test]
    fn split_range_absorbs_remainder_into_last_chunk() {
        let ranges = split_range(0, 10, 3);
        assert_eq!(ranges, vec![(0, 3), (3, 6), (6, 10)]);
        let total: i64 = ranges.iter().map(|(s, e)| e - s).sum();
        assert_eq!(total, 10);
    }

    #[test]
    fn single_shard_is_identity() {
        assert_eq!(split_range(5, 20, 1), vec![(5, 20)]);
    }
}
