//! `ControlMessage` — the tagged union carried over the broadcast bus (§6).
//!
//! Every variant carries an `event_id` and `timestamp` so any consumer can
//! dedup on `(event_id)` alone regardless of payload shape.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ControlMessage {
    WorkflowTriggered {
        event_id: Uuid,
        timestamp: DateTime<Utc>,
        workflow_id: Uuid,
        workflow_run_id: Uuid,
    },
    WorkflowKilled {
        event_id: Uuid,
        timestamp: DateTime<Utc>,
        workflow_run_id: Uuid,
    },
    WorkflowCompleted {
        event_id: Uuid,
        timestamp: DateTime<Utc>,
        workflow_run_id: Uuid,
        failed: bool,
    },
    Trigger {
        event_id: Uuid,
        timestamp: DateTime<Utc>,
        job_run_id: Uuid,
    },
    Retry {
        event_id: Uuid,
        timestamp: DateTime<Utc>,
        job_run_id: Uuid,
    },
    Kill {
        event_id: Uuid,
        timestamp: DateTime<Utc>,
        job_run_id: Uuid,
    },
    Pass {
        event_id: Uuid,
        timestamp: DateTime<Utc>,
        job_run_id: Uuid,
    },
    MarkFailed {
        event_id: Uuid,
        timestamp: DateTime<Utc>,
        job_run_id: Uuid,
    },
    ShardExec {
        event_id: Uuid,
        timestamp: DateTime<Utc>,
        job_run_id: Uuid,
        shard_index: i32,
        range_start: i64,
        range_end: i64,
    },
    ShardCompleted {
        event_id: Uuid,
        timestamp: DateTime<Utc>,
        job_run_id: Uuid,
        shard_index: i32,
        success: bool,
    },
}

impl ControlMessage {
    pub fn event_id(&self) -> Uuid {
        match self {
            Self::WorkflowTriggered { event_id, .. }
            | Self::WorkflowKilled { event_id, .. }
            | Self::WorkflowCompleted { event_id, .. }
            | Self::Trigger { event_id, .. }
            | Self::Retry { event_id, .. }
            | Self::Kill { event_id, .. }
            | Self::Pass { event_id, .. }
            | Self::MarkFailed { event_id, .. }
            | Self::ShardExec { event_id, .. }
            | Self::ShardCompleted { event_id, .. } => *event_id,
        }
    }
}
