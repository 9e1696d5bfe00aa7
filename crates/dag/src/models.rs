//! Node/edge types the DAG engine operates over.
//!
//! These are intentionally minimal: the engine only needs identity and the
//! dependency predicate, not the full `Job`/`Workflow` domain types that
//! live in the `engine` crate. Callers (the `db` crate via a `DagSource`
//! implementation, or the `engine` crate directly) adapt their own richer
//! types down to these before calling into `dag`.

use serde::{Deserialize, Serialize};

/// How a child job's eligibility depends on one parent's terminal status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum DependencyType {
    /// Parent must have completed successfully.
    Success,
    /// Parent must have failed.
    Failure,
    /// Parent must have reached any terminal status (completed, failed or skipped).
    Complete,
}

/// A directed edge `from -> to` within one workflow's DAG.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DagEdge {
    pub from: String,
    pub to: String,
    pub dependency_type: DependencyType,
}

/// The terminal status a parent JobRun reached, as seen by the predicate
/// table in `dependencies_satisfied`. Non-terminal statuses simply aren't
/// represented here — a parent without one of these is not yet satisfied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParentOutcome {
    Completed,
    Failed,
    Skipped,
}

impl DependencyType {
    /// Does this parent outcome satisfy this dependency's predicate?
    pub fn is_satisfied_by(self, outcome: ParentOutcome) -> bool {
        match self {
            DependencyType::Success => outcome == ParentOutcome::Completed,
            DependencyType::Failure => outcome == ParentOutcome::Failed,
            DependencyType::Complete => true, // any terminal outcome counts
        }
    }
}
