//! `WorkflowExecutor` — the state machine for workflow-runs and job-runs
//! (§4.2). Entry point for user-initiated start/rerun/kill/retry; the
//! per-bucket scheduling and dispatch of individual runs lives in the
//! `scheduler` crate, which calls back into [`WorkflowExecutor::on_job_terminal`]
//! once a handler finishes.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use dag::DagSource;
use transport::{ControlMessage, Transport};

use crate::models::{JobOutcome, JobRunSubset};
use crate::EngineError;

/// Tuning knobs for the executor: `bucket_count` (needed to assign a new
/// JobRun's shard at creation time) and `retry_jitter` (see DESIGN.md's
/// Open Question decision on jitter).
#[derive(Debug, Clone)]
pub struct ExecutorConfig {
    /// Number of hash buckets (`B`) jobs are partitioned into.
    pub bucket_count: i32,
    /// Base delay automatic retries back off by, doubled per attempt.
    pub retry_base_delay: Duration,
    /// +/- fraction of jitter applied to `retry_base_delay` so a bursty
    /// failure across many jobs doesn't retry in lockstep.
    pub retry_jitter: f64,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            bucket_count: 1024,
            retry_base_delay: Duration::from_millis(500),
            retry_jitter: 0.1,
        }
    }
}

pub struct WorkflowExecutor {
    pool: db::DbPool,
    dag_source: Arc<dyn DagSource>,
    transport: Arc<dyn Transport>,
    config: ExecutorConfig,
}

impl WorkflowExecutor {
    pub fn new(
        pool: db::DbPool,
        dag_source: Arc<dyn DagSource>,
        transport: Arc<dyn Transport>,
        config: ExecutorConfig,
    ) -> Self {
        Self {
            pool,
            dag_source,
            transport,
            config,
        }
    }

    /// Refuses if the workflow has a non-terminal run; validates the DAG;
    /// creates the WorkflowRun (`running`) and one JobRun per job (`waiting`
    /// or `pending` if it has no parents); publishes `workflow_triggered`.
    #[instrument(skip(self), fields(%workflow_id))]
    pub async fn start_run(&self, workflow_id: Uuid) -> Result<Uuid, EngineError> {
        let workflow = db::repository::workflow_defs::get_workflow_def(&self.pool, workflow_id)
            .await?;
        if workflow.status != "online" {
            return Err(EngineError::WorkflowNotOnline(workflow_id));
        }
        if db::repository::workflow_defs::has_nonterminal_run(&self.pool, workflow_id).await? {
            return Err(EngineError::NonTerminalRunExists(workflow_id));
        }

        let (nodes, edges) = self
            .dag_source
            .nodes_and_edges(workflow_id)
            .await
            .map_err(EngineError::Dag)?;
        let sorted = dag::validate(&nodes, &edges)?;

        let run = db::repository::workflow_runs::create_workflow_run(&self.pool, workflow_id, None)
            .await?;

        let mut parents_by_job: HashMap<&str, Vec<&str>> = HashMap::new();
        for edge in &edges {
            parents_by_job
                .entry(edge.to.as_str())
                .or_default()
                .push(edge.from.as_str());
        }

        let mut run_id_by_job: HashMap<String, Uuid> = HashMap::new();
        let trigger_time = Utc::now();

        for job_id in &sorted {
            let parent_run_ids: Vec<Uuid> = parents_by_job
                .get(job_id.as_str())
                .map(|parents| {
                    parents
                        .iter()
                        .filter_map(|p| run_id_by_job.get(*p).copied())
                        .collect()
                })
                .unwrap_or_default();

            let job_run = db::repository::job_runs::create_job_run(
                &self.pool,
                run.id,
                job_id,
                self.config.bucket_count,
                &parent_run_ids,
                trigger_time,
            )
            .await?;
            run_id_by_job.insert(job_id.clone(), job_run.id);
        }

        info!(workflow_run_id = %run.id, jobs = sorted.len(), "workflow run started");

        let _ = self
            .transport
            .broadcast(
                "cluster",
                ControlMessage::WorkflowTriggered {
                    event_id: Uuid::new_v4(),
                    timestamp: trigger_time,
                    workflow_id,
                    workflow_run_id: run.id,
                },
            )
            .await;

        Ok(run.id)
    }

    /// CAS the workflow-run to `stopped`; publishes `kill` for each
    /// non-terminal JobRun still executing, and directly transitions unreached
    /// (`waiting`, `pending`) JobRuns to `skipped` rather than relying on a
    /// scheduler noticing the workflow-run's status — a `pending` row has no
    /// handler running yet for `kill`'s cancellation signal to reach.
    #[instrument(skip(self), fields(%workflow_run_id))]
    pub async fn stop_run(&self, workflow_run_id: Uuid) -> Result<(), EngineError> {
        let now = Utc::now();
        let run = db::repository::workflow_runs::get_workflow_run(&self.pool, workflow_run_id)
            .await?;
        if run.status != "pending" && run.status != "running" {
            return Err(EngineError::ConcurrentRunUpdate(workflow_run_id));
        }

        let transitioned = db::repository::workflow_runs::cas_workflow_run_status(
            &self.pool,
            workflow_run_id,
            &run.status,
            "stopped",
            Some(now),
        )
        .await?;
        if !transitioned {
            return Err(EngineError::ConcurrentRunUpdate(workflow_run_id));
        }

        let job_runs =
            db::repository::job_runs::list_job_runs_for_workflow_run(&self.pool, workflow_run_id)
                .await?;

        for jr in job_runs {
            match jr.status.as_str() {
                "running" => {
                    let _ = self
                        .transport
                        .broadcast(
                            "cluster",
                            ControlMessage::Kill {
                                event_id: Uuid::new_v4(),
                                timestamp: now,
                                job_run_id: jr.id,
                            },
                        )
                        .await;
                }
                "pending" => {
                    let skipped = db::repository::job_runs::cas_job_run_terminal(
                        &self.pool, jr.id, "pending", "skipped", now,
                    )
                    .await?;
                    if !skipped {
                        // Lost the race to a scheduler that CAS'd it to
                        // `running` first — fall back to `kill` so the
                        // now-running handler still gets cancelled.
                        let _ = self
                            .transport
                            .broadcast(
                                "cluster",
                                ControlMessage::Kill {
                                    event_id: Uuid::new_v4(),
                                    timestamp: now,
                                    job_run_id: jr.id,
                                },
                            )
                            .await;
                    }
                }
                "waiting" => {
                    let _ = db::repository::job_runs::cas_job_run_terminal(
                        &self.pool, jr.id, "waiting", "skipped", now,
                    )
                    .await?;
                }
                _ => {}
            }
        }

        let _ = self
            .transport
            .broadcast(
                "cluster",
                ControlMessage::WorkflowKilled {
                    event_id: Uuid::new_v4(),
                    timestamp: now,
                    workflow_run_id,
                },
            )
            .await;

        Ok(())
    }

    /// Resets the selected JobRuns (or every non-terminal run plus terminal
    /// failures, when `job_run_subset` is `None`) back to `waiting`/`pending`,
    /// clears `dependency_completed`, and re-triggers.
    #[instrument(skip(self, job_run_subset), fields(%workflow_run_id))]
    pub async fn rerun_run(
        &self,
        workflow_run_id: Uuid,
        job_run_subset: JobRunSubset,
    ) -> Result<(), EngineError> {
        let run = db::repository::workflow_runs::get_workflow_run(&self.pool, workflow_run_id)
            .await?;
        let all =
            db::repository::job_runs::list_job_runs_for_workflow_run(&self.pool, workflow_run_id)
                .await?;

        let targets: Vec<_> = match &job_run_subset {
            Some(ids) => all.into_iter().filter(|r| ids.contains(&r.id)).collect(),
            None => all
                .into_iter()
                .filter(|r| !matches!(r.status.as_str(), "completed" | "skipped"))
                .collect(),
        };

        let now = Utc::now();
        for jr in &targets {
            let new_status = if jr.parent_run_ids().is_empty() {
                "pending"
            } else {
                "waiting"
            };
            db::repository::job_runs::reset_for_rerun(&self.pool, jr.id, new_status).await?;

            if new_status == "pending" {
                let _ = self
                    .transport
                    .broadcast(
                        "cluster",
                        ControlMessage::Trigger {
                            event_id: Uuid::new_v4(),
                            timestamp: now,
                            job_run_id: jr.id,
                        },
                    )
                    .await;
            }
        }

        db::repository::workflow_runs::update_workflow_run_status(
            &self.pool,
            workflow_run_id,
            "running",
            None,
        )
        .await?;

        let _ = self
            .transport
            .broadcast(
                "cluster",
                ControlMessage::WorkflowTriggered {
                    event_id: Uuid::new_v4(),
                    timestamp: now,
                    workflow_id: run.workflow_id,
                    workflow_run_id,
                },
            )
            .await;

        info!(reset = targets.len(), "workflow run rerun");
        Ok(())
    }

    /// Only valid when the JobRun is terminal-failed (`failed`/`timeout`) and
    /// `retry_count < max_retries`. CAS to `pending`, bump `retry_count`,
    /// clear `dependency_completed`.
    #[instrument(skip(self), fields(%job_run_id))]
    pub async fn retry_job(&self, job_run_id: Uuid) -> Result<(), EngineError> {
        let row = db::repository::job_runs::get_job_run(&self.pool, job_run_id).await?;
        if row.status != "failed" && row.status != "timeout" {
            return Err(EngineError::RetryNotEligible(job_run_id));
        }

        let job_def = db::repository::job_defs::get_job_def_for_run(
            &self.pool,
            row.workflow_run_id,
            &row.job_id,
        )
        .await?;
        if row.retry_count >= job_def.max_retries {
            return Err(EngineError::RetryNotEligible(job_run_id));
        }

        let transitioned =
            db::repository::job_runs::retry_job_run(&self.pool, job_run_id, &row.status).await?;
        if !transitioned {
            return Err(EngineError::RetryNotEligible(job_run_id));
        }

        let _ = self
            .transport
            .broadcast(
                "cluster",
                ControlMessage::Retry {
                    event_id: Uuid::new_v4(),
                    timestamp: Utc::now(),
                    job_run_id,
                },
            )
            .await;

        Ok(())
    }

    /// Broadcasts `kill` for one JobRun (§6 `POST /job-run/{id}/kill`). The
    /// current owner's scheduler/runtime observes it on its next CAS
    /// attempt and aborts dispatch; a running handler's cancellation token
    /// fires the same way `stop_run` cancels a whole workflow-run.
    #[instrument(skip(self), fields(%job_run_id))]
    pub async fn kill_job_run(&self, job_run_id: Uuid) -> Result<(), EngineError> {
        let row = db::repository::job_runs::get_job_run(&self.pool, job_run_id).await?;
        if matches!(row.status.as_str(), "completed" | "failed" | "skipped" | "timeout") {
            return Err(EngineError::JobRunAlreadyTerminal(job_run_id));
        }

        let _ = self
            .transport
            .broadcast(
                "cluster",
                ControlMessage::Kill {
                    event_id: Uuid::new_v4(),
                    timestamp: Utc::now(),
                    job_run_id,
                },
            )
            .await;
        Ok(())
    }

    /// Manually forces a non-terminal JobRun to `completed`, bypassing its
    /// handler, and runs it through the same downstream-propagation path as
    /// a handler-reported success (§6 `POST /job-run/{id}/pass`).
    #[instrument(skip(self), fields(%job_run_id))]
    pub async fn pass_job_run(&self, job_run_id: Uuid) -> Result<(), EngineError> {
        let row = db::repository::job_runs::get_job_run(&self.pool, job_run_id).await?;
        if matches!(row.status.as_str(), "completed" | "failed" | "skipped" | "timeout") {
            return Err(EngineError::JobRunAlreadyTerminal(job_run_id));
        }

        let _ = self
            .transport
            .broadcast(
                "cluster",
                ControlMessage::Pass {
                    event_id: Uuid::new_v4(),
                    timestamp: Utc::now(),
                    job_run_id,
                },
            )
            .await;
        self.on_job_terminal(job_run_id, JobOutcome::Completed).await
    }

    /// Manually forces a non-terminal JobRun to `failed`, bypassing its
    /// handler (§6 `POST /job-run/{id}/mark-failed`). Downstream propagation
    /// and automatic retry eligibility follow the normal failure path.
    #[instrument(skip(self), fields(%job_run_id))]
    pub async fn mark_job_run_failed(&self, job_run_id: Uuid) -> Result<(), EngineError> {
        let row = db::repository::job_runs::get_job_run(&self.pool, job_run_id).await?;
        if matches!(row.status.as_str(), "completed" | "failed" | "skipped" | "timeout") {
            return Err(EngineError::JobRunAlreadyTerminal(job_run_id));
        }

        let _ = self
            .transport
            .broadcast(
                "cluster",
                ControlMessage::MarkFailed {
                    event_id: Uuid::new_v4(),
                    timestamp: Utc::now(),
                    job_run_id,
                },
            )
            .await;
        self.on_job_terminal(job_run_id, JobOutcome::Failed).await
    }

    /// Forces a `waiting` JobRun straight to `pending`, skipping its
    /// dependency wait (§6 `POST /job-run/{id}/trigger`).
    #[instrument(skip(self), fields(%job_run_id))]
    pub async fn trigger_job_run(&self, job_run_id: Uuid) -> Result<(), EngineError> {
        let advanced = db::repository::job_runs::cas_job_run_status(
            &self.pool, job_run_id, "waiting", "pending", None,
        )
        .await?;
        if !advanced {
            return Err(EngineError::JobRunAlreadyTerminal(job_run_id));
        }

        let _ = self
            .transport
            .broadcast(
                "cluster",
                ControlMessage::Trigger {
                    event_id: Uuid::new_v4(),
                    timestamp: Utc::now(),
                    job_run_id,
                },
            )
            .await;
        Ok(())
    }

    /// Records end-time; for each downstream JobRun in the same
    /// workflow-run, atomically adds this run-id to its `dependency_completed`
    /// set and evaluates the parent-predicate — CAS to `pending` when
    /// satisfied, or `skipped` when the predicate can never hold. Finally
    /// evaluates workflow-run completion. Propagation through a chain of
    /// skips is handled iteratively rather than by recursing, since a skip
    /// can itself unblock (or permanently block) further downstream runs.
    ///
    /// The CAS `expected` status is read from the row rather than assumed,
    /// so this serves both the scheduler's post-execution callback (always
    /// `running`) and manual `pass`/`mark-failed` overrides issued from the
    /// control surface (§6), which may target a `pending` or `waiting` run.
    #[instrument(skip(self), fields(%job_run_id, ?outcome))]
    pub async fn on_job_terminal(
        &self,
        job_run_id: Uuid,
        outcome: JobOutcome,
    ) -> Result<(), EngineError> {
        let current = db::repository::job_runs::get_job_run(&self.pool, job_run_id).await?;
        let mut queue: VecDeque<(Uuid, String, JobOutcome)> = VecDeque::new();
        queue.push_back((job_run_id, current.status, outcome));

        let mut workflow_run_id = None;

        while let Some((id, expected, outcome)) = queue.pop_front() {
            let row = db::repository::job_runs::get_job_run(&self.pool, id).await?;
            workflow_run_id.get_or_insert(row.workflow_run_id);
            let now = Utc::now();

            let transitioned = db::repository::job_runs::cas_job_run_terminal(
                &self.pool,
                id,
                &expected,
                outcome.status_str(),
                now,
            )
            .await?;
            if !transitioned {
                // Already terminal — idempotent no-op (spec §4.2).
                continue;
            }

            let downstream = db::repository::job_runs::downstream_job_runs(
                &self.pool,
                row.workflow_run_id,
                id,
            )
            .await?;

            for dr in downstream {
                db::repository::job_runs::add_dependency_completed_atomic(&self.pool, dr.id, id)
                    .await?;

                let parent_outcomes = self
                    .dag_source
                    .parent_outcomes(&dr.job_id, row.workflow_run_id)
                    .await
                    .map_err(EngineError::Dag)?;

                let permanently_blocked = parent_outcomes.iter().any(|(edge, oc)| {
                    matches!(oc, Some(o) if !edge.dependency_type.is_satisfied_by(*o))
                });
                let all_satisfied = !parent_outcomes.is_empty()
                    && parent_outcomes.iter().all(|(edge, oc)| {
                        oc.map(|o| edge.dependency_type.is_satisfied_by(o))
                            .unwrap_or(false)
                    });

                if permanently_blocked {
                    queue.push_back((dr.id, "waiting".to_string(), JobOutcome::Skipped));
                } else if all_satisfied {
                    let advanced = db::repository::job_runs::cas_job_run_status(
                        &self.pool, dr.id, "waiting", "pending", None,
                    )
                    .await?;
                    if advanced {
                        let _ = self
                            .transport
                            .broadcast(
                                "cluster",
                                ControlMessage::Trigger {
                                    event_id: Uuid::new_v4(),
                                    timestamp: now,
                                    job_run_id: dr.id,
                                },
                            )
                            .await;
                    }
                }
            }
        }

        if let Some(run_id) = workflow_run_id {
            self.evaluate_workflow_completion(run_id).await?;
        }

        Ok(())
    }

    async fn evaluate_workflow_completion(&self, workflow_run_id: Uuid) -> Result<(), EngineError> {
        let summary = db::repository::job_runs::terminal_summary(&self.pool, workflow_run_id)
            .await?;
        if !summary.all_terminal() {
            return Ok(());
        }

        let failed = summary.has_failure();
        let status = if failed { "failed" } else { "completed" };
        let now = Utc::now();

        db::repository::workflow_runs::update_workflow_run_status(
            &self.pool,
            workflow_run_id,
            status,
            Some(now),
        )
        .await?;

        warn!(%workflow_run_id, failed, "workflow run reached terminal status");

        let _ = self
            .transport
            .broadcast(
                "cluster",
                ControlMessage::WorkflowCompleted {
                    event_id: Uuid::new_v4(),
                    timestamp: now,
                    workflow_run_id,
                    failed,
                },
            )
            .await;

        Ok(())
    }
}
