//! Executor Runtime (§4.6) — looks up the handler, enforces a timeout,
//! manages automatic retries, and publishes the terminal status back to the
//! `engine` crate's `WorkflowExecutor`. Wide-fanout jobs hand off to the
//! `shard` module's `ShardCoordinator` instead of running a handler
//! directly.

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use rand::Rng;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use cluster::ClusterMembership;
use db::DbPool;
use engine::{JobOutcome, WorkflowExecutor};
use nodes::{HandlerRegistry, JobContext};
use transport::{ControlMessage, DedupLru, Transport};

use crate::clock::Clock;
use crate::error::SchedulerError;
use crate::shard::ShardCoordinator;

/// Tuning knobs for the runtime, independent of any one job's own
/// `timeout_s`/`retry_interval_s` (those live on the `Job` row).
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    /// +/- fraction of jitter applied to a job's own `retry_interval_s`
    /// before an automatic retry fires, so a burst of identical failures
    /// doesn't retry in lockstep (spec §7, §9 Open Question — see
    /// DESIGN.md for the jitter decision).
    pub retry_jitter: f64,
    /// Local worker id, used as the default shard assignee and to label
    /// spans.
    pub worker_id: String,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            retry_jitter: 0.1,
            worker_id: "worker-local".to_string(),
        }
    }
}

/// Cancellation tokens for runs currently executing on this worker, keyed
/// by job-run id, so a `kill` broadcast can reach a handler without either
/// side needing to know which worker it landed on (§4.2/§5 "running
/// handlers receive a cancellation signal"). Split out from
/// `ExecutorRuntime` so it's testable without a live `DbPool`.
#[derive(Default)]
struct InflightRegistry {
    tokens: DashMap<Uuid, CancellationToken>,
}

impl InflightRegistry {
    fn register(&self, job_run_id: Uuid, token: CancellationToken) {
        self.tokens.insert(job_run_id, token);
    }

    fn clear(&self, job_run_id: Uuid) {
        self.tokens.remove(&job_run_id);
    }

    /// Fires the token for `job_run_id` if this worker is running it.
    /// Returns `true` if a matching in-flight run was found and cancelled.
    fn cancel(&self, job_run_id: Uuid) -> bool {
        match self.tokens.get(&job_run_id) {
            Some(token) => {
                token.cancel();
                true
            }
            None => false,
        }
    }
}

/// Runs handlers for JobRuns a `SchedulerInstance` has claimed, and the
/// shard coordinator/receiver for wide-fanout jobs.
pub struct ExecutorRuntime {
    pool: DbPool,
    registry: Arc<HandlerRegistry>,
    transport: Arc<dyn Transport>,
    executor: Arc<WorkflowExecutor>,
    clock: Arc<dyn Clock>,
    membership: Option<Arc<dyn ClusterMembership>>,
    config: RuntimeConfig,
    inflight: InflightRegistry,
    dedup: DedupLru,
}

impl ExecutorRuntime {
    pub fn new(
        pool: DbPool,
        registry: Arc<HandlerRegistry>,
        transport: Arc<dyn Transport>,
        executor: Arc<WorkflowExecutor>,
        clock: Arc<dyn Clock>,
        membership: Option<Arc<dyn ClusterMembership>>,
        config: RuntimeConfig,
    ) -> Self {
        Self {
            pool,
            registry,
            transport,
            executor,
            clock,
            membership,
            config,
            inflight: InflightRegistry::default(),
            dedup: DedupLru::default(),
        }
    }

    /// Runs until the `cluster` topic closes, watching for `kill` broadcasts
    /// and firing the matching in-flight run's `CancellationToken`, if this
    /// worker happens to be the one executing it. Call once per worker,
    /// spawned on its own task alongside the scheduler instances.
    pub async fn listen_for_kills(self: Arc<Self>) {
        let mut rx = self.transport.subscribe("cluster");
        loop {
            match rx.recv().await {
                Ok(ControlMessage::Kill {
                    event_id,
                    job_run_id,
                    ..
                }) => {
                    if !self.dedup.check_and_insert(event_id) {
                        continue;
                    }
                    if self.inflight.cancel(job_run_id) {
                        info!(%job_run_id, "cancelling locally in-flight run on kill");
                    } else {
                        debug!(%job_run_id, "kill for a run not in flight here, ignoring");
                    }
                }
                Ok(_) => continue,
                Err(tokio::sync::broadcast::error::RecvError::Lagged(_)) => continue,
                Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
            }
        }
    }

    /// Spawns the run on a fresh task; the scheduler instance calls this
    /// immediately after winning the `pending -> running` CAS and never
    /// awaits it directly (§4.5 step 3 "enqueue to Executor Runtime").
    pub fn spawn(self: &Arc<Self>, job_run_id: Uuid) {
        let this = Arc::clone(self);
        tokio::spawn(async move {
            if let Err(err) = this.run(job_run_id).await {
                warn!(%job_run_id, error = %err, "executor runtime failed to run job");
            }
        });
    }

    #[instrument(skip(self), fields(%job_run_id))]
    async fn run(&self, job_run_id: Uuid) -> Result<(), SchedulerError> {
        let job_run = db::repository::job_runs::get_job_run(&self.pool, job_run_id).await?;
        let job_def = db::repository::job_defs::get_job_def_for_run(
            &self.pool,
            job_run.workflow_run_id,
            &job_run.job_id,
        )
        .await?;

        if let Some((start, end, parallelism)) = job_def.shard_descriptor() {
            let coordinator = ShardCoordinator::new(
                self.pool.clone(),
                Arc::clone(&self.transport),
                Arc::clone(&self.executor),
                Arc::clone(&self.clock),
                self.config.worker_id.clone(),
            );
            let members = match &self.membership {
                Some(m) => m.snapshot().await,
                None => Vec::new(),
            };
            coordinator
                .run_with_membership(job_run_id, start, end, parallelism, job_def.timeout_s, &members)
                .await?;
            return Ok(());
        }

        let Some(handler) = self.registry.get(&job_def.handler_type) else {
            warn!(%job_run_id, handler_type = %job_def.handler_type, "handler_not_found");
            let now = chrono::Utc::now();
            db::repository::job_runs::cas_job_run_terminal(
                &self.pool, job_run_id, "running", "failed", now,
            )
            .await?;
            self.executor.on_job_terminal(job_run_id, JobOutcome::Failed).await?;
            return Ok(());
        };

        let cancel = CancellationToken::new();
        let ctx = JobContext {
            job_run_id,
            params: job_def.params.clone(),
            retry_count: job_run.retry_count,
            shard_range: None,
            cancel: cancel.clone(),
        };

        self.inflight.register(job_run_id, cancel.clone());
        let timeout = Duration::from_secs(job_def.timeout_s.max(0) as u64);
        let outcome = tokio::time::timeout(timeout, handler.execute(&ctx)).await;
        self.inflight.clear(job_run_id);

        match outcome {
            Err(_elapsed) => {
                cancel.cancel();
                let now = chrono::Utc::now();
                db::repository::job_runs::cas_job_run_terminal(
                    &self.pool, job_run_id, "running", "timeout", now,
                )
                .await?;
                self.executor.on_job_terminal(job_run_id, JobOutcome::Timeout).await?;
            }
            Ok(Ok(result)) => {
                info!(%job_run_id, message = ?result.message, "job run completed");
                let now = chrono::Utc::now();
                db::repository::job_runs::cas_job_run_terminal(
                    &self.pool, job_run_id, "running", "completed", now,
                )
                .await?;
                self.executor.on_job_terminal(job_run_id, JobOutcome::Completed).await?;
            }
            Ok(Err(nodes::NodeError::Fatal(msg))) => {
                warn!(%job_run_id, error = %msg, "handler_exception (fatal, no retry)");
                self.fail_permanently(job_run_id).await?;
            }
            Ok(Err(nodes::NodeError::Retryable(msg))) => {
                warn!(%job_run_id, error = %msg, "handler_exception (retryable)");
                self.fail_and_maybe_retry(job_run_id, &job_def, job_run.retry_count)
                    .await?;
            }
        }

        Ok(())
    }

    async fn fail_permanently(&self, job_run_id: Uuid) -> Result<(), SchedulerError> {
        let now = chrono::Utc::now();
        db::repository::job_runs::cas_job_run_terminal(
            &self.pool, job_run_id, "running", "failed", now,
        )
        .await?;
        self.executor.on_job_terminal(job_run_id, JobOutcome::Failed).await?;
        Ok(())
    }

    async fn fail_and_maybe_retry(
        &self,
        job_run_id: Uuid,
        job_def: &db::models::JobDefRow,
        current_retry_count: i32,
    ) -> Result<(), SchedulerError> {
        let now = chrono::Utc::now();
        db::repository::job_runs::cas_job_run_terminal(
            &self.pool, job_run_id, "running", "failed", now,
        )
        .await?;

        if current_retry_count < job_def.max_retries {
            // This `failed` row is about to flip back to `pending` on its
            // own; it isn't a permanently unsatisfiable predicate yet (§4.2
            // only allows `waiting -> skipped` for a permanent failure), so
            // skip-propagation to SUCCESS-dependent downstream runs and
            // workflow-completion evaluation both wait until the retry
            // either succeeds or exhausts its budget.
            self.schedule_automatic_retry(job_run_id, job_def.retry_interval_s);
        } else {
            self.executor.on_job_terminal(job_run_id, JobOutcome::Failed).await?;
        }
        Ok(())
    }

    /// Backs off `retry_interval_s`, jittered by `+/- retry_jitter`, then
    /// calls `Executor::retry_job`. Runs on its own task so it never blocks
    /// the caller (§4.2 `failed -> pending` transition, §7 backoff policy).
    fn schedule_automatic_retry(&self, job_run_id: Uuid, retry_interval_s: i64) {
        let jitter_frac = self.config.retry_jitter;
        let base = Duration::from_secs(retry_interval_s.max(0) as u64);
        let jittered = jitter(base, jitter_frac);

        let executor = Arc::clone(&self.executor);
        let clock = Arc::clone(&self.clock);
        tokio::spawn(async move {
            clock.sleep(jittered).await;
            if let Err(err) = executor.retry_job(job_run_id).await {
                warn!(%job_run_id, error = %err, "automatic retry failed to CAS");
            }
        });
    }
}

/// Apply `+/- fraction` jitter to `base`, per spec §7 ("jittered by ±10%").
fn jitter(base: Duration, fraction: f64) -> Duration {
    if fraction <= 0.0 {
        return base;
    }
    let mut rng = rand::rng();
    let factor = 1.0 + rng.random_range(-fraction..=fraction);
    Duration::from_secs_f64((base.as_secs_f64() * factor).max(0.0))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn jitter_stays_within_bound() {
        let base = Duration::from_secs(10);
        for _ in 0..100 {
            let d = jitter(base, 0.1);
            assert!(d.as_secs_f64() >= 9.0 && d.as_secs_f64() <= 11.0);
        }
    }

    #[test]
    fn zero_jitter_is_identity() {
        let base = Duration::from_secs(5);
        assert_eq!(jitter(base, 0.0), base);
    }

    #[test]
    fn cancel_fires_registered_token_and_reports_found() {
        let registry = InflightRegistry::default();
        let job_run_id = Uuid::new_v4();
        let token = CancellationToken::new();
        registry.register(job_run_id, token.clone());

        assert!(registry.cancel(job_run_id));
        assert!(token.is_cancelled());
    }

    #[test]
    fn cancel_for_unknown_run_is_a_harmless_no_op() {
        let registry = InflightRegistry::default();
        assert!(!registry.cancel(Uuid::new_v4()));
    }

    #[test]
    fn clear_removes_a_completed_run_so_a_late_kill_is_a_no_op() {
        let registry = InflightRegistry::default();
        let job_run_id = Uuid::new_v4();
        registry.register(job_run_id, CancellationToken::new());
        registry.clear(job_run_id);

        assert!(!registry.cancel(job_run_id));
    }
}
