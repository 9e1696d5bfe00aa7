//! Row structs that map 1-to-1 onto database tables.
//!
//! These are *persistence* models — they carry no domain behaviour.
//! Domain types live in the `engine` crate.

use std::str::FromStr;

use chrono::{DateTime, Utc};
use dag::DependencyType;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

// ---------------------------------------------------------------------------
// workflow_defs — Workflow entity (§3)
// ---------------------------------------------------------------------------

/// A workflow's lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowStatus {
    Draft,
    Online,
    Offline,
}

impl std::fmt::Display for WorkflowStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Draft => write!(f, "draft"),
            Self::Online => write!(f, "online"),
            Self::Offline => write!(f, "offline"),
        }
    }
}

impl FromStr for WorkflowStatus {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "draft" => Ok(Self::Draft),
            "online" => Ok(Self::Online),
            "offline" => Ok(Self::Offline),
            other => Err(format!("unknown workflow status: {other}")),
        }
    }
}

/// How a workflow is triggered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerKind {
    Manual,
    Cron,
    Event,
}

impl std::fmt::Display for TriggerKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Manual => write!(f, "manual"),
            Self::Cron => write!(f, "cron"),
            Self::Event => write!(f, "event"),
        }
    }
}

impl FromStr for TriggerKind {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "manual" => Ok(Self::Manual),
            "cron" => Ok(Self::Cron),
            "event" => Ok(Self::Event),
            other => Err(format!("unknown trigger kind: {other}")),
        }
    }
}

/// A workflow definition row: the DAG's node list lives in `jobs`/`dependencies`;
/// this row carries the workflow-level metadata from spec §3.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct WorkflowDefRow {
    pub id: Uuid,
    pub namespace_id: Uuid,
    pub name: String,
    pub trigger_kind: String,
    pub trigger_value: Option<String>,
    pub status: String,
    pub timeout_s: i64,
    pub max_retries: i32,
    pub priority: i32,
    pub created_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// jobs — Job entity (§3)
// ---------------------------------------------------------------------------

/// A job definition row. `id` doubles as the DAG node id within its workflow.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct JobDefRow {
    pub id: String,
    pub workflow_id: Uuid,
    pub name: String,
    pub handler_type: String,
    pub params: serde_json::Value,
    pub timeout_s: i64,
    pub max_retries: i32,
    pub retry_interval_s: i64,
    pub priority: i32,
    /// Present only for shard jobs.
    pub shard_start: Option<i64>,
    pub shard_end: Option<i64>,
    pub shard_parallelism: Option<i32>,
}

impl JobDefRow {
    pub fn shard_descriptor(&self) -> Option<(i64, i64, i32)> {
        match (self.shard_start, self.shard_end, self.shard_parallelism) {
            (Some(s), Some(e), Some(p)) if p > 1 => Some((s, e, p)),
            _ => None,
        }
    }
}

// ---------------------------------------------------------------------------
// dependencies — Dependency entity (§3)
// ---------------------------------------------------------------------------

/// A directed dependency edge between two jobs in the same workflow.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct DependencyRow {
    pub workflow_id: Uuid,
    pub from_job_id: String,
    pub to_job_id: String,
    pub dependency_type: String,
}

impl DependencyRow {
    pub fn dependency_type(&self) -> DependencyType {
        match self.dependency_type.as_str() {
            "SUCCESS" => DependencyType::Success,
            "FAILURE" => DependencyType::Failure,
            _ => DependencyType::Complete,
        }
    }
}

// ---------------------------------------------------------------------------
// workflow_runs — WorkflowRun entity (§3)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowRunStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Stopped,
}

impl std::fmt::Display for WorkflowRunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Stopped => "stopped",
        };
        write!(f, "{s}")
    }
}

impl FromStr for WorkflowRunStatus {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "running" => Ok(Self::Running),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            "stopped" => Ok(Self::Stopped),
            other => Err(format!("unknown workflow run status: {other}")),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct WorkflowRunRow {
    pub id: Uuid,
    pub workflow_id: Uuid,
    pub status: String,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    /// Correlates this run back to whatever triggered it (manual caller id,
    /// cron fire timestamp, or event id) — opaque to the executor.
    pub trigger_correlation: Option<String>,
}

// ---------------------------------------------------------------------------
// job_runs — JobRun entity (§3)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobRunStatus {
    Waiting,
    Pending,
    Running,
    Completed,
    Failed,
    Skipped,
    Timeout,
}

impl std::fmt::Display for JobRunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Waiting => "waiting",
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Skipped => "skipped",
            Self::Timeout => "timeout",
        };
        write!(f, "{s}")
    }
}

impl FromStr for JobRunStatus {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "waiting" => Ok(Self::Waiting),
            "pending" => Ok(Self::Pending),
            "running" => Ok(Self::Running),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            "skipped" => Ok(Self::Skipped),
            "timeout" => Ok(Self::Timeout),
            other => Err(format!("unknown job run status: {other}")),
        }
    }
}

impl JobRunStatus {
    /// Terminal statuses, per spec §3's workflow-run completion rule.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            Self::Completed | Self::Failed | Self::Skipped | Self::Timeout
        )
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct JobRunRow {
    pub id: Uuid,
    pub workflow_run_id: Uuid,
    pub job_id: String,
    pub bucket_id: i32,
    pub trigger_time: DateTime<Utc>,
    pub status: String,
    pub retry_count: i32,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    /// JSON array of parent JobRun ids this run depends on.
    pub parent_run_ids: serde_json::Value,
    /// JSON array of parent JobRun ids that have reported a terminal outcome.
    pub dependency_completed: serde_json::Value,
    /// Optimistic-lock version, bumped on every atomic update to
    /// `dependency_completed`.
    pub version: i32,
}

impl JobRunRow {
    pub fn parent_run_ids(&self) -> Vec<Uuid> {
        serde_json::from_value(self.parent_run_ids.clone()).unwrap_or_default()
    }

    pub fn dependency_completed(&self) -> Vec<Uuid> {
        serde_json::from_value(self.dependency_completed.clone()).unwrap_or_default()
    }
}

// ---------------------------------------------------------------------------
// bucket_leases — BucketLease entity (§3, §4.3)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct BucketLeaseRow {
    pub bucket_id: i32,
    pub owner_worker_id: String,
    pub lease_expiry: DateTime<Utc>,
    pub version: i32,
}

// ---------------------------------------------------------------------------
// shard_assignments — ShardAssignment entity (§3)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct ShardAssignmentRow {
    pub job_run_id: Uuid,
    pub shard_index: i32,
    pub range_start: i64,
    pub range_end: i64,
    pub assignee_worker_id: String,
    pub status: String,
}
